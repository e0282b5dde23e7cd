use bitcoin::{
    hashes::Hash as _, transaction::InputWeightPrediction, ScriptBuf, WPubkeyHash,
    Witness,
};
use secp::Point;

use crate::serialization::TxSignature;

/// Spending information for a single-owner P2WPKH output. Settlement and
/// refund transactions pay each contractor through one of these, locked to the
/// contractor's contract pubkey.
#[derive(Debug, Clone)]
pub(crate) struct PayoutSpendInfo {
    pubkey: Point,
}

impl PayoutSpendInfo {
    pub(crate) fn new(pubkey: Point) -> PayoutSpendInfo {
        PayoutSpendInfo { pubkey }
    }

    pub(crate) fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&self.pubkey.serialize()))
    }

    pub(crate) fn input_weight() -> InputWeightPrediction {
        InputWeightPrediction::P2WPKH_MAX
    }

    pub(crate) fn witness(&self, sig: &TxSignature) -> Witness {
        Witness::from_slice(&[sig.to_vec(), self.pubkey.serialize().to_vec()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::P2WPKH_SCRIPT_PUBKEY_SIZE;

    #[test]
    fn payout_script_matches_p2wpkh_address() {
        let pubkey: Point = "03a0434d9e47f3c86235477c7b1ae6ae5d3442d49b1943c2b752a68e2a47e247c7"
            .parse()
            .unwrap();
        let info = PayoutSpendInfo::new(pubkey);

        let address = bitcoin::Address::p2wpkh(
            &bitcoin::PublicKey::new(secp256k1::PublicKey::from(pubkey)),
            bitcoin::Network::Bitcoin,
        )
        .unwrap();

        assert_eq!(info.script_pubkey(), address.script_pubkey());
        assert_eq!(info.script_pubkey().len(), P2WPKH_SCRIPT_PUBKEY_SIZE);
        assert!(info.script_pubkey().is_p2wpkh());
    }
}
