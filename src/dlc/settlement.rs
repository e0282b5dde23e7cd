use bitcoin::{
    absolute::LockTime, Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness,
};
use secp::Point;

use crate::{
    consts::TX_VERSION,
    contract::{
        fees::{fee_calc_safe, fee_subtract_safe, payout_values},
        DealIndex,
    },
    dlc::Dlc,
    errors::{Error, Field},
    parties::{Contractor, PartyPair},
    serialization::TxSignature,
    spend_info::PayoutSpendInfo,
};

/// An unsigned transaction sweeping one contractor's settlement payout
/// to its settlement address.
#[derive(Debug, Clone)]
pub struct ClosingTx {
    pub tx: Transaction,

    /// The value of the payout output being spent.
    pub prevout_value: Amount,

    /// The contract pubkey which must sign the closing transaction.
    pub pubkey: Point,
}

impl Dlc {
    /// Builds a single-owner output paying `amount` to `party`'s contract pubkey.
    pub fn closing_tx_out(&self, party: Contractor, amount: Amount) -> Result<TxOut, Error> {
        let pubkey = self.pubkey(party)?;
        Ok(TxOut {
            value: amount,
            script_pubkey: PayoutSpendInfo::new(pubkey).script_pubkey(),
        })
    }

    /// Builds a transaction spending the funding output, paying the given
    /// amounts to each party. The fee is split evenly between the paid parties,
    /// and outputs which would be left at or below the dust limit are dropped.
    fn payout_tx(
        &self,
        amounts: &PartyPair<Amount>,
        lock_time: LockTime,
        sequence: Sequence,
    ) -> Result<Transaction, Error> {
        let funding_outpoint = self.funding_outpoint()?;

        let output = payout_values(self.conditions.settlement_fee_rate(), amounts)?
            .iter()
            .filter_map(|(party, value)| value.map(|value| self.closing_tx_out(party, value)))
            .collect::<Result<Vec<TxOut>, Error>>()?;
        if output.is_empty() {
            return Err(Error::Fee("every payout is below the dust limit after fees"));
        }

        Ok(Transaction {
            version: TX_VERSION,
            lock_time,
            input: vec![TxIn {
                previous_output: funding_outpoint,
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::new(),
            }],
            output,
        })
    }

    /// Builds the unsigned settlement transaction for the deal at `index`.
    pub fn contract_execution_tx(&self, index: DealIndex) -> Result<Transaction, Error> {
        let deal = self
            .conditions
            .deals()
            .get(index)
            .ok_or(Error::DealNotFound)?;
        self.payout_tx(&deal.amounts, LockTime::ZERO, Sequence::MAX)
    }

    /// Builds every settlement transaction, aligned with the contract's deals.
    pub fn contract_execution_txs(&self) -> Result<Vec<Transaction>, Error> {
        (0..self.conditions.deals().len())
            .map(|index| self.contract_execution_tx(index))
            .collect()
    }

    /// Builds the unsigned refund transaction, which returns each party's fund
    /// amount once the refund locktime has passed.
    pub fn refund_tx(&self) -> Result<Transaction, Error> {
        self.payout_tx(
            self.conditions.fund_amounts(),
            LockTime::from_consensus(self.conditions.refund_locktime()),
            Sequence::ENABLE_LOCKTIME_NO_RBF,
        )
    }

    /// Returns the refund transaction with both parties' signatures attached.
    pub fn signed_refund_tx(&self) -> Result<Transaction, Error> {
        let sigs = PartyPair::new(
            *self
                .refund_sigs
                .require(Contractor::FirstParty, Field::RefundSignature)?,
            *self
                .refund_sigs
                .require(Contractor::SecondParty, Field::RefundSignature)?,
        );
        let mut tx = self.refund_tx()?;
        tx.input[0].witness = self.funding_spend_info()?.witness(&sigs);
        Ok(tx)
    }

    /// Returns the settlement transaction of the fixed deal with both parties'
    /// signatures attached. This is the only settlement transaction which may
    /// be broadcast.
    pub fn signed_contract_execution_tx(&self) -> Result<Transaction, Error> {
        let (index, _) = self.fixed_deal()?;

        let settlement_sig = |party: Contractor| -> Result<TxSignature, Error> {
            let sigs = self
                .exec_sigs
                .require(party, Field::SettlementSignatures)?;
            sigs.get(index)
                .copied()
                .ok_or(Error::SignatureCountMismatch {
                    expected: self.conditions.deals().len(),
                    actual: sigs.len(),
                })
        };
        let sigs = PartyPair::new(
            settlement_sig(Contractor::FirstParty)?,
            settlement_sig(Contractor::SecondParty)?,
        );

        let mut tx = self.contract_execution_tx(index)?;
        tx.input[0].witness = self.funding_spend_info()?.witness(&sigs);
        Ok(tx)
    }

    /// Builds the unsigned transaction sweeping `party`'s payout from the
    /// fixed settlement transaction to its settlement address.
    pub fn closing_tx(&self, party: Contractor) -> Result<ClosingTx, Error> {
        let (index, _) = self.fixed_deal()?;
        let settlement_tx = self.contract_execution_tx(index)?;

        let pubkey = self.pubkey(party)?;
        let payout_script = PayoutSpendInfo::new(pubkey).script_pubkey();
        let (vout, payout) = settlement_tx
            .output
            .iter()
            .enumerate()
            .find(|(_, txout)| txout.script_pubkey == payout_script)
            .ok_or(Error::Fee("party receives no payout from the fixed deal"))?;

        let destination = self.settlement_script(party)?.clone();
        let fee = fee_calc_safe(
            self.conditions.settlement_fee_rate(),
            [PayoutSpendInfo::input_weight()],
            [destination.len()],
        )?;
        let value = fee_subtract_safe(payout.value, fee, destination.dust_value())
            .ok_or(Error::Fee("payout is too small to cover the closing fee"))?;

        let tx = Transaction {
            version: TX_VERSION,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::new(settlement_tx.txid(), vout as u32),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value,
                script_pubkey: destination,
            }],
        };

        Ok(ClosingTx {
            tx,
            prevout_value: payout.value,
            pubkey,
        })
    }
}
