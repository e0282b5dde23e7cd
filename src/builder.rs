use bitcoin::{Amount, Network, Script, ScriptBuf, Transaction, Witness};
use log::{debug, info, warn};
use secp::Point;

use crate::{
    contract::{fees, Conditions, Deal, DealIndex},
    dlc::{ContractId, Dlc},
    errors::{Error, Field},
    messages::PartyOffer,
    oracles::{OraclePubkeySet, OracleSignSet},
    parties::Contractor,
    serialization::TxSignature,
    spend_info::PayoutSpendInfo,
    wallet::{Utxo, UtxoSelection, Wallet},
};

/// The negotiation steps of one contractor, in the order they must happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Init,
    PubkeyPrepared,
    FundInputsPrepared,
    CounterpartyAccepted,
    SettlementsSigned,
    CounterpartySettlementsAccepted,
    FundTxSigned,
    CounterpartyFundWitnessAccepted,
    Finalized,
}

/// One contractor's side of a contract negotiation.
///
/// A `Builder` owns its contractor's [`Dlc`] and a handle to the contractor's
/// [`Wallet`]. Local steps ask the wallet for keys, coins and signatures, while
/// `accept_*` steps merge data received from the counterparty. Each step is only
/// permitted in one [`Phase`], so steps cannot be skipped, reordered or repeated.
pub struct Builder<W: Wallet> {
    role: Contractor,
    wallet: W,
    dlc: Dlc,
    phase: Phase,
    settlements_signed: bool,
    refund_signed: bool,
    counterparty_settlements_accepted: bool,
    counterparty_refund_accepted: bool,
}

impl<W: Wallet> Builder<W> {
    /// Start negotiating a contract under the given conditions.
    pub fn new(role: Contractor, wallet: W, network: Network, conditions: Conditions) -> Builder<W> {
        Builder {
            role,
            wallet,
            dlc: Dlc::new(network, conditions),
            phase: Phase::Init,
            settlements_signed: false,
            refund_signed: false,
            counterparty_settlements_accepted: false,
            counterparty_refund_accepted: false,
        }
    }

    pub fn role(&self) -> Contractor {
        self.role
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn dlc(&self) -> &Dlc {
        &self.dlc
    }

    pub fn into_dlc(self) -> Dlc {
        self.dlc
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    pub fn conditions(&self) -> &Conditions {
        self.dlc.conditions()
    }

    fn counterparty(&self) -> Contractor {
        self.role.counterparty()
    }

    fn require_phase(&self, operation: &'static str, expected: Phase) -> Result<(), Error> {
        if self.phase != expected {
            return Err(Error::WrongPhase {
                operation,
                expected,
                actual: self.phase,
            });
        }
        Ok(())
    }

    /// Settlement and change addresses must be standard output scripts, so
    /// that the transactions paying them relay.
    fn check_destination(script: &Script, field: Field) -> Result<(), Error> {
        if script.is_witness_program() || script.is_p2pkh() || script.is_p2sh() {
            return Ok(());
        }
        Err(Error::InvalidAddress(format!(
            "{} {} is not a standard output script",
            field,
            script.to_hex_string()
        )))
    }

    fn require_oracle(&self, operation: &'static str) -> Result<(), Error> {
        if self.dlc.oracle().pubkey_set().is_none() {
            warn!("{}: {} before oracle commitments were prepared", self.role, operation);
            return Err(Error::OracleNotPrepared);
        }
        Ok(())
    }

    fn advance(&mut self, phase: Phase) {
        debug!("{}: {:?} -> {:?}", self.role, self.phase, phase);
        self.phase = phase;
    }

    /// Choose where this contractor's settlement payout and funding change are
    /// sent. Addresses which are not given are derived from fresh wallet keys
    /// when the funding inputs are prepared.
    pub fn set_destination_addresses(
        &mut self,
        settlement: Option<ScriptBuf>,
        change: Option<ScriptBuf>,
    ) -> Result<(), Error> {
        if self.phase > Phase::PubkeyPrepared {
            return Err(Error::WrongPhase {
                operation: "set_destination_addresses",
                expected: Phase::PubkeyPrepared,
                actual: self.phase,
            });
        }
        if let Some(script) = &settlement {
            Self::check_destination(script, Field::SettlementAddress)?;
        }
        if let Some(script) = &change {
            Self::check_destination(script, Field::ChangeAddress)?;
        }
        if let Some(script) = settlement {
            self.dlc
                .settlement_scripts
                .set_once(self.role, script, Field::SettlementAddress)?;
        }
        if let Some(script) = change {
            self.dlc
                .change_scripts
                .set_once(self.role, script, Field::ChangeAddress)?;
        }
        Ok(())
    }

    /// Provide the oracle's public parameters for the event this contract
    /// settles on. The parameters are bound into the contract identifier, and
    /// signing fails with [`Error::OracleNotPrepared`] until they are set.
    pub fn set_oracle_pubkey_set(&mut self, pubkey_set: OraclePubkeySet) -> Result<(), Error> {
        if self.phase >= Phase::SettlementsSigned {
            return Err(Error::WrongPhase {
                operation: "set_oracle_pubkey_set",
                expected: Phase::CounterpartyAccepted,
                actual: self.phase,
            });
        }
        self.dlc.prepare_oracle_commitments(pubkey_set)?;
        debug!("{}: oracle commitments prepared", self.role);
        Ok(())
    }

    /// Request a fresh contract key from the wallet. A contractor has exactly
    /// one contract key, so this can only be done once.
    pub fn prepare_pubkey(&mut self) -> Result<Point, Error> {
        self.require_phase("prepare_pubkey", Phase::Init)?;
        let pubkey = self.wallet.new_pubkey()?;
        self.dlc.pubkeys.set_once(self.role, pubkey, Field::Pubkey)?;
        self.advance(Phase::PubkeyPrepared);
        Ok(pubkey)
    }

    /// Select this contractor's funding inputs. The wallet must cover the
    /// contractor's fund amount and its share of the funding transaction fee.
    pub fn prepare_fund_tx_ins(&mut self) -> Result<(), Error> {
        self.require_phase("prepare_fund_tx_ins", Phase::PubkeyPrepared)?;

        let fund_amount = self.conditions().fund_amount(self.role);
        let fee_rate = self.conditions().fund_fee_rate();
        let target = fund_amount
            .checked_add(fees::fund_tx_party_fee(fee_rate)?)
            .ok_or(Error::Fee("funding target overflows"))?;

        let selection = self.wallet.select_unspent(target, fee_rate)?;
        debug!(
            "{}: selected {} utxos worth {} for target {}, change {}",
            self.role,
            selection.utxos.len(),
            selection.total(),
            target,
            selection.change
        );

        if !self.dlc.settlement_scripts.is_set(self.role) {
            let script = PayoutSpendInfo::new(self.wallet.new_pubkey()?).script_pubkey();
            self.dlc
                .settlement_scripts
                .set_once(self.role, script, Field::SettlementAddress)?;
        }
        if !self.dlc.change_scripts.is_set(self.role) {
            let script = PayoutSpendInfo::new(self.wallet.new_pubkey()?).script_pubkey();
            self.dlc
                .change_scripts
                .set_once(self.role, script, Field::ChangeAddress)?;
        }

        self.dlc
            .fund_inputs
            .set_once(self.role, selection, Field::FundInputs)?;
        self.advance(Phase::FundInputsPrepared);
        Ok(())
    }

    /// Package this contractor's pre-signature data for the counterparty.
    pub fn offer(&self) -> Result<PartyOffer, Error> {
        if self.phase < Phase::FundInputsPrepared {
            return Err(Error::WrongPhase {
                operation: "offer",
                expected: Phase::FundInputsPrepared,
                actual: self.phase,
            });
        }
        let selection = self.dlc.fund_inputs(self.role)?;
        Ok(PartyOffer {
            pubkey: self.dlc.pubkey(self.role)?.serialize().to_vec(),
            utxos: selection.utxos.clone(),
            change: selection.change,
            change_script: self.dlc.change_script(self.role)?.clone(),
            settlement_script: self.dlc.settlement_script(self.role)?.clone(),
        })
    }

    /// Once every required counterparty input is present, the negotiation
    /// moves on to signing.
    fn try_complete_acceptance(&mut self) {
        let counterparty = self.counterparty();
        if self.dlc.pubkeys.is_set(counterparty)
            && self.dlc.fund_inputs.is_set(counterparty)
            && self.dlc.change_scripts.is_set(counterparty)
        {
            self.advance(Phase::CounterpartyAccepted);
        }
    }

    fn parse_counterparty_pubkey(&self, raw_key: &[u8]) -> Result<Point, Error> {
        Point::from_slice(raw_key).map_err(|err| {
            warn!("{}: rejected counterparty pubkey: {}", self.role, err);
            Error::from(err)
        })
    }

    /// Accept the counterparty's contract key in compressed serialized form.
    pub fn accept_pubkey(&mut self, raw_key: &[u8]) -> Result<(), Error> {
        self.require_phase("accept_pubkey", Phase::FundInputsPrepared)?;
        let pubkey = self.parse_counterparty_pubkey(raw_key)?;
        self.dlc
            .pubkeys
            .set_once(self.counterparty(), pubkey, Field::Pubkey)?;
        debug!(
            "{}: accepted counterparty pubkey {}",
            self.role,
            hex::encode(pubkey.serialize())
        );
        self.try_complete_acceptance();
        Ok(())
    }

    /// Accept the counterparty's funding inputs and change amount. These are
    /// taken as given: whether they exist and are unspent is only established
    /// when the funding transaction is broadcast.
    pub fn accept_utxos(&mut self, utxos: Vec<Utxo>, change: Amount) -> Result<(), Error> {
        self.require_phase("accept_utxos", Phase::FundInputsPrepared)?;
        debug!(
            "{}: accepted {} counterparty utxos, change {}",
            self.role,
            utxos.len(),
            change
        );
        self.dlc.fund_inputs.set_once(
            self.counterparty(),
            UtxoSelection { utxos, change },
            Field::FundInputs,
        )?;
        self.try_complete_acceptance();
        Ok(())
    }

    pub fn accept_change_address(&mut self, script: ScriptBuf) -> Result<(), Error> {
        self.require_phase("accept_change_address", Phase::FundInputsPrepared)?;
        Self::check_destination(&script, Field::ChangeAddress)?;
        self.dlc
            .change_scripts
            .set_once(self.counterparty(), script, Field::ChangeAddress)?;
        self.try_complete_acceptance();
        Ok(())
    }

    /// The counterparty's settlement address is kept as a record of the
    /// negotiation only. Nothing this contractor signs pays to it.
    pub fn accept_settlement_address(&mut self, script: ScriptBuf) -> Result<(), Error> {
        self.require_phase("accept_settlement_address", Phase::FundInputsPrepared)?;
        Self::check_destination(&script, Field::SettlementAddress)?;
        self.dlc.settlement_scripts.set_once(
            self.counterparty(),
            script,
            Field::SettlementAddress,
        )
    }

    /// Merge every field of the counterparty's offer. The whole offer is
    /// validated before anything is stored, so a rejected offer leaves the
    /// builder able to accept a corrected one.
    pub fn accept_offer(&mut self, offer: PartyOffer) -> Result<(), Error> {
        self.require_phase("accept_offer", Phase::FundInputsPrepared)?;

        let pubkey = self.parse_counterparty_pubkey(&offer.pubkey)?;
        Self::check_destination(&offer.change_script, Field::ChangeAddress)?;
        Self::check_destination(&offer.settlement_script, Field::SettlementAddress)?;

        let counterparty = self.counterparty();
        let filled = [
            (self.dlc.pubkeys.is_set(counterparty), Field::Pubkey),
            (self.dlc.fund_inputs.is_set(counterparty), Field::FundInputs),
            (self.dlc.change_scripts.is_set(counterparty), Field::ChangeAddress),
            (
                self.dlc.settlement_scripts.is_set(counterparty),
                Field::SettlementAddress,
            ),
        ];
        if let Some(&(_, field)) = filled.iter().find(|(is_set, _)| *is_set) {
            return Err(Error::AlreadySet {
                party: counterparty,
                field,
            });
        }

        debug!(
            "{}: accepted counterparty offer with pubkey {} and {} utxos, change {}",
            self.role,
            hex::encode(pubkey.serialize()),
            offer.utxos.len(),
            offer.change
        );
        self.dlc
            .pubkeys
            .set_once(counterparty, pubkey, Field::Pubkey)?;
        self.dlc.fund_inputs.set_once(
            counterparty,
            UtxoSelection {
                utxos: offer.utxos,
                change: offer.change,
            },
            Field::FundInputs,
        )?;
        self.dlc
            .change_scripts
            .set_once(counterparty, offer.change_script, Field::ChangeAddress)?;
        self.dlc.settlement_scripts.set_once(
            counterparty,
            offer.settlement_script,
            Field::SettlementAddress,
        )?;
        self.try_complete_acceptance();
        Ok(())
    }

    /// Returns the contract identifier. Both contractors must compare their
    /// identifiers and see them match before anything is signed or persisted.
    pub fn contract_id(&self) -> Result<ContractId, Error> {
        self.dlc.contract_id()
    }

    fn complete_own_signing(&mut self) {
        if self.settlements_signed && self.refund_signed {
            self.advance(Phase::SettlementsSigned);
        }
    }

    fn sign_funding_spend(&self, tx: &Transaction) -> Result<TxSignature, Error> {
        let funding_spend_info = self.dlc.funding_spend_info()?;
        let sig = self.wallet.witness_signature(
            tx,
            0,
            funding_spend_info.funding_value(),
            funding_spend_info.witness_script(),
            &self.dlc.pubkey(self.role)?,
        )?;
        Ok(TxSignature(sig))
    }

    /// Sign every settlement transaction. The returned signatures are aligned
    /// with the contract's deals, for transmission to the counterparty.
    pub fn sign_contract_execution_txs(&mut self) -> Result<Vec<TxSignature>, Error> {
        self.require_phase("sign_contract_execution_txs", Phase::CounterpartyAccepted)?;
        self.require_oracle("sign_contract_execution_txs")?;
        if self.settlements_signed {
            return Err(Error::AlreadyPerformed {
                operation: "sign_contract_execution_txs",
            });
        }

        let sigs = self
            .dlc
            .contract_execution_txs()?
            .iter()
            .map(|tx| self.sign_funding_spend(tx))
            .collect::<Result<Vec<_>, Error>>()?;

        self.dlc
            .exec_sigs
            .set_once(self.role, sigs.clone(), Field::SettlementSignatures)?;
        self.settlements_signed = true;
        debug!("{}: signed {} settlement transactions", self.role, sigs.len());
        self.complete_own_signing();
        Ok(sigs)
    }

    pub fn sign_refund_tx(&mut self) -> Result<TxSignature, Error> {
        self.require_phase("sign_refund_tx", Phase::CounterpartyAccepted)?;
        self.require_oracle("sign_refund_tx")?;
        if self.refund_signed {
            return Err(Error::AlreadyPerformed {
                operation: "sign_refund_tx",
            });
        }

        let sig = self.sign_funding_spend(&self.dlc.refund_tx()?)?;
        self.dlc
            .refund_sigs
            .set_once(self.role, sig, Field::RefundSignature)?;
        self.refund_signed = true;
        debug!("{}: signed refund transaction", self.role);
        self.complete_own_signing();
        Ok(sig)
    }

    fn complete_counterparty_signing(&mut self) {
        if self.counterparty_settlements_accepted && self.counterparty_refund_accepted {
            self.advance(Phase::CounterpartySettlementsAccepted);
        }
    }

    /// Accept the counterparty's settlement signatures. Every signature is
    /// verified against the counterparty's contract key, and nothing is stored
    /// unless all of them are valid.
    pub fn accept_cetx_signatures(&mut self, sigs: Vec<TxSignature>) -> Result<(), Error> {
        self.require_phase("accept_cetx_signatures", Phase::SettlementsSigned)?;

        let expected = self.conditions().deals().len();
        if sigs.len() != expected {
            warn!(
                "{}: counterparty sent {} settlement signatures, expected {}",
                self.role,
                sigs.len(),
                expected
            );
            return Err(Error::SignatureCountMismatch {
                expected,
                actual: sigs.len(),
            });
        }

        let counterparty = self.counterparty();
        let funding_spend_info = self.dlc.funding_spend_info()?;
        for (index, (tx, sig)) in self
            .dlc
            .contract_execution_txs()?
            .iter()
            .zip(&sigs)
            .enumerate()
        {
            if !funding_spend_info.verify_signature(tx, counterparty, sig)? {
                warn!(
                    "{}: invalid counterparty signature on settlement transaction {}",
                    self.role, index
                );
                return Err(Error::InvalidSettlementSignature(index));
            }
        }

        self.dlc
            .exec_sigs
            .set_once(counterparty, sigs, Field::SettlementSignatures)?;
        self.counterparty_settlements_accepted = true;
        self.complete_counterparty_signing();
        Ok(())
    }

    pub fn accept_refund_tx_signature(&mut self, sig: TxSignature) -> Result<(), Error> {
        self.require_phase("accept_refund_tx_signature", Phase::SettlementsSigned)?;

        let counterparty = self.counterparty();
        let refund_tx = self.dlc.refund_tx()?;
        if !self
            .dlc
            .funding_spend_info()?
            .verify_signature(&refund_tx, counterparty, &sig)?
        {
            warn!("{}: invalid counterparty refund signature", self.role);
            return Err(Error::InvalidRefundSignature);
        }

        self.dlc
            .refund_sigs
            .set_once(counterparty, sig, Field::RefundSignature)?;
        self.counterparty_refund_accepted = true;
        self.complete_counterparty_signing();
        Ok(())
    }

    /// Sign this contractor's own inputs of the funding transaction. Each
    /// witness is a standard P2WPKH witness of `[signature, pubkey]`.
    pub fn sign_fund_tx(&mut self) -> Result<Vec<Witness>, Error> {
        self.require_phase("sign_fund_tx", Phase::CounterpartySettlementsAccepted)?;

        let fund_tx = self.dlc.fund_tx()?;
        let input_range = self.dlc.fund_input_range(self.role)?;
        let utxos = &self.dlc.fund_inputs(self.role)?.utxos;

        let witnesses = input_range
            .zip(utxos)
            .map(|(input_index, utxo)| {
                let pubkey = self.wallet.pubkey_for_script(&utxo.script_pubkey)?;
                let spend_info = PayoutSpendInfo::new(pubkey);
                let sig = self.wallet.witness_signature(
                    &fund_tx,
                    input_index,
                    utxo.amount,
                    &utxo.script_pubkey,
                    &pubkey,
                )?;
                Ok(spend_info.witness(&TxSignature(sig)))
            })
            .collect::<Result<Vec<Witness>, Error>>()?;

        self.dlc.set_fund_witnesses(self.role, witnesses.clone())?;
        self.advance(Phase::FundTxSigned);
        Ok(witnesses)
    }

    pub fn accept_fund_witnesses(&mut self, witnesses: Vec<Witness>) -> Result<(), Error> {
        self.require_phase("accept_fund_witnesses", Phase::FundTxSigned)?;
        self.dlc
            .set_fund_witnesses(self.counterparty(), witnesses)
            .inspect_err(|err| warn!("{}: rejected funding witnesses: {}", self.role, err))?;
        self.advance(Phase::CounterpartyFundWitnessAccepted);
        Ok(())
    }

    /// Completes the negotiation, returning the fully witnessed funding
    /// transaction, ready to broadcast.
    pub fn finalize(&mut self) -> Result<Transaction, Error> {
        self.require_phase("finalize", Phase::CounterpartyFundWitnessAccepted)?;
        let fund_tx = self.dlc.fund_tx()?;
        let funding_address = self
            .dlc
            .funding_spend_info()?
            .address(self.dlc.network());
        self.advance(Phase::Finalized);
        info!(
            "{}: funding transaction {} finalized, paying {} to {}",
            self.role,
            fund_tx.txid(),
            fund_tx.output[0].value,
            funding_address
        );
        Ok(fund_tx)
    }

    pub fn fund_tx(&self) -> Result<Transaction, Error> {
        self.dlc.fund_tx()
    }

    /// Verify the oracle's attestation and fix the deal it selects.
    pub fn fix_deal(&mut self, sign_set: &OracleSignSet) -> Result<DealIndex, Error> {
        self.dlc.fix_deal(sign_set).inspect_err(|err| {
            warn!("{}: rejected oracle attestation: {}", self.role, err)
        })
    }

    pub fn fixed_deal(&self) -> Result<(DealIndex, &Deal), Error> {
        self.dlc.fixed_deal()
    }

    fn require_finalized(&self, operation: &'static str) -> Result<(), Error> {
        self.require_phase(operation, Phase::Finalized)
    }

    /// Returns the broadcastable settlement transaction for the fixed deal.
    pub fn signed_contract_execution_tx(&self) -> Result<Transaction, Error> {
        self.require_finalized("signed_contract_execution_tx")?;
        self.dlc.signed_contract_execution_tx()
    }

    /// Returns the broadcastable refund transaction. It only becomes valid
    /// once the refund locktime has passed.
    pub fn signed_refund_tx(&self) -> Result<Transaction, Error> {
        self.require_finalized("signed_refund_tx")?;
        self.dlc.signed_refund_tx()
    }

    /// Returns a signed transaction sweeping this contractor's payout from the
    /// fixed settlement transaction to its settlement address.
    pub fn signed_closing_tx(&self) -> Result<Transaction, Error> {
        self.require_finalized("signed_closing_tx")?;

        let closing = self.dlc.closing_tx(self.role)?;
        let spend_info = PayoutSpendInfo::new(closing.pubkey);
        let sig = self.wallet.witness_signature(
            &closing.tx,
            0,
            closing.prevout_value,
            &spend_info.script_pubkey(),
            &closing.pubkey,
        )?;

        let mut tx = closing.tx;
        tx.input[0].witness = spend_info.witness(&TxSignature(sig));
        Ok(tx)
    }
}
