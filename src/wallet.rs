use bitcoin::{ecdsa, Amount, FeeRate, OutPoint, Script, ScriptBuf, Transaction};
use secp::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An unspent output owned by one of the contractors, offered as an input
/// to the funding transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub amount: Amount,
    pub script_pubkey: ScriptBuf,
}

/// The result of coin selection: the chosen inputs, and the change left over
/// once the requested amount and the fees for those inputs are paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoSelection {
    pub utxos: Vec<Utxo>,
    pub change: Amount,
}

impl UtxoSelection {
    pub fn total(&self) -> Amount {
        self.utxos.iter().map(|utxo| utxo.amount).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("need {required}, but only {available} is spendable")]
    InsufficientFunds { required: Amount, available: Amount },

    #[error("no key is known for the requested pubkey or script")]
    UnknownKey,

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("{0}")]
    Other(String),
}

/// The key management and coin selection capability of one contractor.
///
/// The contract builder never sees private keys. Every signature it needs,
/// whether over settlement transactions or over the contractor's own funding
/// inputs, is requested through [`Wallet::witness_signature`].
pub trait Wallet {
    /// Generate a fresh public key owned by this wallet.
    fn new_pubkey(&mut self) -> Result<Point, WalletError>;

    /// Select unspent P2WPKH outputs worth at least `target`, plus the fees
    /// for spending the selected outputs themselves at `fee_rate`.
    fn select_unspent(
        &mut self,
        target: Amount,
        fee_rate: FeeRate,
    ) -> Result<UtxoSelection, WalletError>;

    /// Produce a `SIGHASH_ALL` segwit v0 signature over the given input of `tx`
    /// with the key behind `pubkey`. `amount` is the value of the output being
    /// spent. `script` is its witness script when it is a P2WSH output, or its
    /// script pubkey when it is a P2WPKH output.
    fn witness_signature(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: Amount,
        script: &Script,
        pubkey: &Point,
    ) -> Result<ecdsa::Signature, WalletError>;

    /// Look up the pubkey which controls one of this wallet's P2WPKH outputs.
    fn pubkey_for_script(&self, script_pubkey: &Script) -> Result<Point, WalletError>;
}
