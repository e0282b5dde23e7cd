mod funding;
mod payout;

use bitcoin::{
    hashes::Hash as _,
    sighash::{EcdsaSighashType, SighashCache},
    Amount, Script, Transaction,
};
use secp::Point;
use secp256k1::{Message, SECP256K1};

use crate::{errors::Error, serialization::TxSignature};

pub(crate) use funding::FundingSpendInfo;
pub(crate) use payout::PayoutSpendInfo;

/// Compute the BIP143 signature hash for an input spending a P2WSH output,
/// as a message ready for ECDSA signing or verification.
pub(crate) fn p2wsh_sighash(
    tx: &Transaction,
    input_index: usize,
    witness_script: &Script,
    value: Amount,
) -> Result<Message, Error> {
    let sighash = SighashCache::new(tx).p2wsh_signature_hash(
        input_index,
        witness_script,
        value,
        EcdsaSighashType::All,
    )?;
    Ok(Message::from_digest(sighash.to_byte_array()))
}

/// Returns true if `sig` is a valid `SIGHASH_ALL` signature by `pubkey`
/// over the given input, which spends a P2WSH output.
pub(crate) fn verify_p2wsh_signature(
    tx: &Transaction,
    input_index: usize,
    witness_script: &Script,
    value: Amount,
    sig: &TxSignature,
    pubkey: &Point,
) -> Result<bool, Error> {
    if sig.0.hash_ty != EcdsaSighashType::All {
        return Ok(false);
    }
    let msg = p2wsh_sighash(tx, input_index, witness_script, value)?;
    let pubkey = secp256k1::PublicKey::from(*pubkey);
    Ok(SECP256K1.verify_ecdsa(&msg, &sig.0.sig, &pubkey).is_ok())
}
