use bitcoin::{
    absolute::LockTime, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};

use std::ops::Range;

use crate::{
    consts::TX_VERSION,
    dlc::Dlc,
    errors::{Error, Field},
    parties::Contractor,
};

impl Dlc {
    /// Assembles the funding transaction.
    ///
    /// Inputs are the first party's selected UTXOs followed by the second
    /// party's. Outputs are the shared 2-of-2 funding output, followed by each
    /// party's change output in contractor order. A party whose change is zero
    /// gets no change output. Witnesses are attached for every party whose
    /// funding witnesses are known, so once both parties' witnesses are merged
    /// the result is ready to broadcast.
    pub fn fund_tx(&self) -> Result<Transaction, Error> {
        let funding_spend_info = self.funding_spend_info()?;

        let mut input = Vec::new();
        let mut output = vec![funding_spend_info.funding_output()];

        for party in Contractor::ALL {
            let selection = self.fund_inputs(party)?;
            let witnesses = self.fund_witnesses.get(party).as_deref();

            input.extend(selection.utxos.iter().enumerate().map(|(i, utxo)| TxIn {
                previous_output: utxo.outpoint,
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: witnesses
                    .and_then(|ws| ws.get(i))
                    .cloned()
                    .unwrap_or_else(Witness::new),
            }));
        }

        for party in Contractor::ALL {
            let change = self.fund_inputs(party)?.change;
            if change > Amount::ZERO {
                output.push(TxOut {
                    value: change,
                    script_pubkey: self.change_script(party)?.clone(),
                });
            }
        }

        Ok(Transaction {
            version: TX_VERSION,
            lock_time: LockTime::ZERO,
            input,
            output,
        })
    }

    /// The funding output is always the first output of the funding transaction.
    /// Its txid does not depend on witnesses, so it is known before signing.
    pub fn funding_outpoint(&self) -> Result<OutPoint, Error> {
        Ok(OutPoint::new(self.fund_tx()?.txid(), 0))
    }

    /// The positions of a party's inputs within the funding transaction.
    pub(crate) fn fund_input_range(&self, party: Contractor) -> Result<Range<usize>, Error> {
        let first_count = self.fund_inputs(Contractor::FirstParty)?.utxos.len();
        match party {
            Contractor::FirstParty => Ok(0..first_count),
            Contractor::SecondParty => {
                let second_count = self.fund_inputs(Contractor::SecondParty)?.utxos.len();
                Ok(first_count..first_count + second_count)
            }
        }
    }

    /// Returns true once both parties' funding witnesses are merged.
    pub fn is_fund_tx_complete(&self) -> bool {
        Contractor::ALL
            .into_iter()
            .all(|party| self.fund_witnesses.is_set(party))
    }

    pub(crate) fn set_fund_witnesses(
        &mut self,
        party: Contractor,
        witnesses: Vec<Witness>,
    ) -> Result<(), Error> {
        let expected = self.fund_inputs(party)?.utxos.len();
        if witnesses.len() != expected {
            return Err(Error::WitnessCountMismatch {
                expected,
                actual: witnesses.len(),
            });
        }
        self.fund_witnesses
            .set_once(party, witnesses, Field::FundWitnesses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dlc::tests::negotiated_dlc;

    #[test]
    fn fund_tx_shape() {
        let dlc = negotiated_dlc();
        let tx = dlc.fund_tx().unwrap();

        assert_eq!(tx.input.len(), 2);
        assert_eq!(
            tx.input[0].previous_output,
            dlc.fund_inputs(Contractor::FirstParty).unwrap().utxos[0].outpoint
        );
        assert_eq!(
            tx.input[1].previous_output,
            dlc.fund_inputs(Contractor::SecondParty).unwrap().utxos[0].outpoint
        );

        assert_eq!(tx.output.len(), 3);
        assert!(tx.output[0].script_pubkey.is_p2wsh());
        assert_eq!(tx.output[0].value, Amount::from_sat(200_000));
        assert_eq!(
            &tx.output[1].script_pubkey,
            dlc.change_script(Contractor::FirstParty).unwrap()
        );
        assert_eq!(
            &tx.output[2].script_pubkey,
            dlc.change_script(Contractor::SecondParty).unwrap()
        );

        assert_eq!(dlc.fund_input_range(Contractor::SecondParty).unwrap(), 1..2);
        assert!(!dlc.is_fund_tx_complete());
    }

    #[test]
    fn zero_change_omits_output() {
        let mut dlc = negotiated_dlc();
        if let Some(selection) = dlc.fund_inputs.first_party.as_mut() {
            selection.change = Amount::ZERO;
        }
        let tx = dlc.fund_tx().unwrap();
        assert_eq!(tx.output.len(), 2);
        assert_eq!(
            &tx.output[1].script_pubkey,
            dlc.change_script(Contractor::SecondParty).unwrap()
        );
    }

    #[test]
    fn witness_count_checked() {
        let mut dlc = negotiated_dlc();
        let err = dlc
            .set_fund_witnesses(Contractor::FirstParty, vec![])
            .unwrap_err();
        assert!(matches!(
            err,
            Error::WitnessCountMismatch {
                expected: 1,
                actual: 0
            }
        ));

        let witness = Witness::from_slice(&[vec![1u8; 71], vec![2u8; 33]]);
        dlc.set_fund_witnesses(Contractor::FirstParty, vec![witness.clone()])
            .unwrap();
        let tx = dlc.fund_tx().unwrap();
        assert_eq!(tx.input[0].witness, witness);
        assert!(tx.input[1].witness.is_empty());

        // Witnesses do not change the txid.
        assert_eq!(
            dlc.funding_outpoint().unwrap(),
            negotiated_dlc().funding_outpoint().unwrap()
        );
    }
}
