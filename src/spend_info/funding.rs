use bitcoin::{
    opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_2},
    script::Builder,
    transaction::InputWeightPrediction,
    Address, Amount, Network, Script, ScriptBuf, Transaction, TxOut, Witness,
};
use secp::Point;

use crate::{
    consts::{FUNDING_SCRIPT_SIZE, MAX_ECDSA_SIGNATURE_SIZE},
    errors::Error,
    parties::{Contractor, PartyPair},
    serialization::TxSignature,
};

/// Spending information for the shared 2-of-2 funding output. Every
/// settlement transaction and the refund transaction spend this output
/// with the same witness script.
#[derive(Debug, Clone)]
pub(crate) struct FundingSpendInfo {
    pubkeys: PartyPair<Point>,

    /// Contractors sorted by the lexicographic order of their compressed pubkeys.
    key_order: [Contractor; 2],

    witness_script: ScriptBuf,
    funding_value: Amount,
}

impl FundingSpendInfo {
    pub(crate) fn new(pubkeys: PartyPair<Point>, funding_value: Amount) -> FundingSpendInfo {
        let mut key_order = Contractor::ALL;
        key_order.sort_by_key(|&party| pubkeys[party].serialize());

        let witness_script = key_order
            .iter()
            .fold(Builder::new().push_opcode(OP_PUSHNUM_2), |builder, &party| {
                builder.push_key(&bitcoin::PublicKey::new(secp256k1::PublicKey::from(
                    pubkeys[party],
                )))
            })
            .push_opcode(OP_PUSHNUM_2)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script();

        FundingSpendInfo {
            pubkeys,
            key_order,
            witness_script,
            funding_value,
        }
    }

    /// The `OP_2 <pk> <pk> OP_2 OP_CHECKMULTISIG` script committed to by the funding output.
    pub(crate) fn witness_script(&self) -> &Script {
        &self.witness_script
    }

    pub(crate) fn funding_value(&self) -> Amount {
        self.funding_value
    }

    /// Returns the P2WSH locking script for the funding output.
    pub(crate) fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2wsh(&self.witness_script.wscript_hash())
    }

    pub(crate) fn address(&self, network: Network) -> Address {
        Address::p2wsh(&self.witness_script, network)
    }

    /// Returns the transaction output which the funding transaction should pay to.
    pub(crate) fn funding_output(&self) -> TxOut {
        TxOut {
            script_pubkey: self.script_pubkey(),
            value: self.funding_value,
        }
    }

    /// Predicts the weight of an input spending the funding output.
    pub(crate) fn input_weight() -> InputWeightPrediction {
        InputWeightPrediction::new(
            0,
            [
                0,
                MAX_ECDSA_SIGNATURE_SIZE,
                MAX_ECDSA_SIGNATURE_SIZE,
                FUNDING_SCRIPT_SIZE,
            ],
        )
    }

    /// Check a contractor's signature on a transaction spending the funding output.
    pub(crate) fn verify_signature(
        &self,
        tx: &Transaction,
        party: Contractor,
        sig: &TxSignature,
    ) -> Result<bool, Error> {
        super::verify_p2wsh_signature(
            tx,
            0,
            &self.witness_script,
            self.funding_value,
            sig,
            &self.pubkeys[party],
        )
    }

    /// Assemble the witness spending the funding output. `OP_CHECKMULTISIG`
    /// consumes one extra stack element, and expects signatures in key order.
    pub(crate) fn witness(&self, sigs: &PartyPair<TxSignature>) -> Witness {
        let mut witness = Witness::new();
        witness.push(Vec::<u8>::new());
        for &party in &self.key_order {
            witness.push(sigs[party].to_vec());
        }
        witness.push(self.witness_script.as_bytes());
        witness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::P2WSH_SCRIPT_PUBKEY_SIZE;

    use secp::Scalar;

    #[test]
    fn funding_script_independent_of_role() {
        let pk1 = Scalar::try_from(10).unwrap().base_point_mul();
        let pk2 = Scalar::try_from(11).unwrap().base_point_mul();

        let info = FundingSpendInfo::new(PartyPair::new(pk1, pk2), Amount::from_sat(5000));
        let swapped = FundingSpendInfo::new(PartyPair::new(pk2, pk1), Amount::from_sat(5000));

        assert_eq!(info.witness_script(), swapped.witness_script());
        assert_eq!(info.witness_script().len(), FUNDING_SCRIPT_SIZE);
        assert_eq!(info.script_pubkey().len(), P2WSH_SCRIPT_PUBKEY_SIZE);
        assert!(info.script_pubkey().is_p2wsh());
        assert_eq!(
            info.address(Network::Regtest).script_pubkey(),
            info.script_pubkey()
        );
        assert_eq!(info.funding_output().value, Amount::from_sat(5000));
    }
}
