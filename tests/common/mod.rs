#![allow(dead_code)]

use dlcpair::bitcoin::{
    self, ecdsa,
    hashes::Hash as _,
    sighash::{EcdsaSighashType, SighashCache},
    Amount, FeeRate, OutPoint, Script, ScriptBuf, Transaction, Txid, WPubkeyHash,
};
use dlcpair::secp::{Point, Scalar};
use dlcpair::{
    schnorr, Conditions, Deal, OraclePubkeySet, OracleSignSet, PartyPair, Utxo, UtxoSelection,
    Wallet, WalletError,
};
use secp256k1::{Message, SecretKey, SECP256K1};

use std::time::{SystemTime, UNIX_EPOCH};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn p2wpkh_script(pubkey: &Point) -> ScriptBuf {
    ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&pubkey.serialize()))
}

/// An in-memory wallet holding a single spendable UTXO. Coin selection always
/// returns that UTXO along with a preset change amount.
pub struct TestWallet {
    keys: Vec<Scalar>,
    utxo: Utxo,
    change: Amount,
}

impl TestWallet {
    pub fn new(seed: u8, utxo_value: Amount, change: Amount) -> TestWallet {
        let mut rng = rand::thread_rng();
        let funding_key = Scalar::random(&mut rng);
        let utxo = Utxo {
            outpoint: OutPoint::new(Txid::from_byte_array([seed; 32]), seed as u32),
            amount: utxo_value,
            script_pubkey: p2wpkh_script(&funding_key.base_point_mul()),
        };
        TestWallet {
            keys: vec![funding_key],
            utxo,
            change,
        }
    }

    pub fn utxo(&self) -> &Utxo {
        &self.utxo
    }

    fn seckey_for(&self, pubkey: &Point) -> Option<Scalar> {
        self.keys
            .iter()
            .copied()
            .find(|seckey| &seckey.base_point_mul() == pubkey)
    }
}

impl Wallet for TestWallet {
    fn new_pubkey(&mut self) -> Result<Point, WalletError> {
        let seckey = Scalar::random(&mut rand::thread_rng());
        self.keys.push(seckey);
        Ok(seckey.base_point_mul())
    }

    fn select_unspent(
        &mut self,
        target: Amount,
        _fee_rate: FeeRate,
    ) -> Result<UtxoSelection, WalletError> {
        if self.utxo.amount < target {
            return Err(WalletError::InsufficientFunds {
                required: target,
                available: self.utxo.amount,
            });
        }
        Ok(UtxoSelection {
            utxos: vec![self.utxo.clone()],
            change: self.change,
        })
    }

    fn witness_signature(
        &self,
        tx: &Transaction,
        input_index: usize,
        amount: Amount,
        script: &Script,
        pubkey: &Point,
    ) -> Result<ecdsa::Signature, WalletError> {
        let seckey = self.seckey_for(pubkey).ok_or(WalletError::UnknownKey)?;
        let mut cache = SighashCache::new(tx);
        let sighash = if script.is_p2wpkh() {
            cache.p2wpkh_signature_hash(input_index, script, amount, EcdsaSighashType::All)
        } else {
            cache.p2wsh_signature_hash(input_index, script, amount, EcdsaSighashType::All)
        }
        .map_err(|err| WalletError::Signing(err.to_string()))?;
        let msg = Message::from_digest(sighash.to_byte_array());
        let sig = SECP256K1.sign_ecdsa(&msg, &SecretKey::from(seckey));
        Ok(ecdsa::Signature::sighash_all(sig))
    }

    fn pubkey_for_script(&self, script_pubkey: &Script) -> Result<Point, WalletError> {
        self.keys
            .iter()
            .map(|seckey| seckey.base_point_mul())
            .find(|pubkey| p2wpkh_script(pubkey).as_script() == script_pubkey)
            .ok_or(WalletError::UnknownKey)
    }
}

/// An oracle attesting to an event with a fixed number of message positions.
pub struct TestOracle {
    seckey: Scalar,
    secnonces: Vec<Scalar>,
}

impl TestOracle {
    pub fn new(positions: usize) -> TestOracle {
        let mut rng = rand::thread_rng();
        TestOracle {
            seckey: Scalar::random(&mut rng),
            secnonces: (0..positions).map(|_| Scalar::random(&mut rng)).collect(),
        }
    }

    pub fn pubkey_set(&self) -> OraclePubkeySet {
        OraclePubkeySet {
            pubkey: self.seckey.base_point_mul(),
            committed_r_points: self
                .secnonces
                .iter()
                .map(|secnonce| secnonce.base_point_mul())
                .collect(),
        }
    }

    pub fn attest(&self, msgs: &[Vec<u8>]) -> OracleSignSet {
        OracleSignSet {
            msgs: msgs.to_vec(),
            signs: self
                .secnonces
                .iter()
                .zip(msgs)
                .map(|(&secnonce, msg)| schnorr::attest(self.seckey, secnonce, msg))
                .collect(),
        }
    }
}

pub fn fixing_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 86400
}

/// Two-digit outcomes: the first party takes everything on "10" or "11",
/// the second party on "01", and the funds are split evenly on "00".
pub fn digit_deals(fund_amount: Amount) -> Vec<Deal> {
    let pot = fund_amount * 2;
    vec![
        Deal::new(pot, Amount::ZERO, vec![b"1".to_vec(), b"0".to_vec()]),
        Deal::new(pot, Amount::ZERO, vec![b"1".to_vec(), b"1".to_vec()]),
        Deal::new(Amount::ZERO, pot, vec![b"0".to_vec(), b"1".to_vec()]),
        Deal::new(
            fund_amount,
            fund_amount,
            vec![b"0".to_vec(), b"0".to_vec()],
        ),
    ]
}

pub fn conditions(fund_amount: Amount, deals: Vec<Deal>) -> Conditions {
    Conditions::new(
        fixing_time(),
        PartyPair::new(fund_amount, fund_amount),
        FeeRate::from_sat_per_vb_unchecked(10),
        FeeRate::from_sat_per_vb_unchecked(5),
        800_000,
        deals,
    )
    .unwrap()
}

/// Checks that every input of a fully witnessed funding transaction carries a
/// valid P2WPKH signature from the key controlling the spent output.
pub fn verify_p2wpkh_witnesses(tx: &Transaction, spent: &[Utxo]) -> bool {
    assert_eq!(tx.input.len(), spent.len());
    tx.input.iter().zip(spent).enumerate().all(|(index, (input, utxo))| {
        let elements: Vec<&[u8]> = input.witness.iter().collect();
        if elements.len() != 2 {
            return false;
        }
        let Ok(pubkey) = Point::from_slice(elements[1]) else {
            return false;
        };
        if p2wpkh_script(&pubkey) != utxo.script_pubkey {
            return false;
        }
        let Ok(sig) = ecdsa::Signature::from_slice(elements[0]) else {
            return false;
        };
        let sighash = SighashCache::new(tx)
            .p2wpkh_signature_hash(
                index,
                &utxo.script_pubkey,
                utxo.amount,
                EcdsaSighashType::All,
            )
            .unwrap();
        let msg = Message::from_digest(sighash.to_byte_array());
        SECP256K1
            .verify_ecdsa(&msg, &sig.sig, &secp256k1::PublicKey::from(pubkey))
            .is_ok()
    })
}

/// Serializes a transaction with the consensus encoding.
pub fn tx_bytes(tx: &Transaction) -> Vec<u8> {
    bitcoin::consensus::encode::serialize(tx)
}
