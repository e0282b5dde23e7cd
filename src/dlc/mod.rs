mod fund_tx;
mod settlement;

use bitcoin::{Network, ScriptBuf, Witness};
use secp::Point;
use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::{
    contract::{Conditions, Deal, DealIndex},
    errors::{Error, Field},
    oracles::{OraclePubkeySet, OracleRequirements, OracleSignSet},
    parties::{Contractor, PartyPair},
    serialization::TxSignature,
    spend_info::FundingSpendInfo,
    wallet::UtxoSelection,
};

use std::fmt;

pub use settlement::ClosingTx;

/// The identifier of a negotiated contract. Both contractors derive it
/// independently, and must agree on it before signing anything.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContractId(#[serde(with = "crate::serialization::byte_array")] [u8; 32]);

impl ContractId {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ContractId({})", self)
    }
}

/// The shared state of a contract, as held by one contractor.
///
/// Each contractor owns its own `Dlc`. Data received from the counterparty is
/// copied into it, and every per-party slot can be filled exactly once.
/// Reading a slot which has not been filled yet fails with [`Error::MissingField`].
#[derive(Debug, Clone, PartialEq)]
pub struct Dlc {
    pub(crate) network: Network,
    pub(crate) conditions: Conditions,
    pub(crate) oracle: OracleRequirements,
    pub(crate) pubkeys: PartyPair<Option<Point>>,

    /// Only a contractor's own settlement script is ever paid to, by its
    /// closing transaction. The counterparty's is kept as a record.
    pub(crate) settlement_scripts: PartyPair<Option<ScriptBuf>>,
    pub(crate) change_scripts: PartyPair<Option<ScriptBuf>>,
    pub(crate) fund_inputs: PartyPair<Option<UtxoSelection>>,
    pub(crate) fund_witnesses: PartyPair<Option<Vec<Witness>>>,
    pub(crate) refund_sigs: PartyPair<Option<TxSignature>>,

    /// Settlement transaction signatures, indexed by signer and aligned with
    /// the deals of the contract.
    pub(crate) exec_sigs: PartyPair<Option<Vec<TxSignature>>>,
}

impl Dlc {
    pub fn new(network: Network, conditions: Conditions) -> Dlc {
        Dlc {
            network,
            conditions,
            oracle: OracleRequirements::new(),
            pubkeys: PartyPair::default(),
            settlement_scripts: PartyPair::default(),
            change_scripts: PartyPair::default(),
            fund_inputs: PartyPair::default(),
            fund_witnesses: PartyPair::default(),
            refund_sigs: PartyPair::default(),
            exec_sigs: PartyPair::default(),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub fn oracle(&self) -> &OracleRequirements {
        &self.oracle
    }

    pub fn pubkey(&self, party: Contractor) -> Result<Point, Error> {
        self.pubkeys.require(party, Field::Pubkey).copied()
    }

    pub fn settlement_script(&self, party: Contractor) -> Result<&ScriptBuf, Error> {
        self.settlement_scripts
            .require(party, Field::SettlementAddress)
    }

    pub fn change_script(&self, party: Contractor) -> Result<&ScriptBuf, Error> {
        self.change_scripts.require(party, Field::ChangeAddress)
    }

    pub fn fund_inputs(&self, party: Contractor) -> Result<&UtxoSelection, Error> {
        self.fund_inputs.require(party, Field::FundInputs)
    }

    /// Computes one verification commitment per deal from the oracle's
    /// public parameters. Must be called before any attestation can be fixed.
    pub fn prepare_oracle_commitments(&mut self, pubkey_set: OraclePubkeySet) -> Result<(), Error> {
        self.oracle
            .prepare_commitments(pubkey_set, self.conditions.deals())
    }

    /// Verifies the oracle's attestation and records it. Returns the index of
    /// the deal whose settlement transaction may now be broadcast.
    pub fn fix_deal(&mut self, sign_set: &OracleSignSet) -> Result<DealIndex, Error> {
        let index = self.oracle.fix_deal(self.conditions.deals(), sign_set)?;
        log::info!("fixed deal {} from oracle attestation", index);
        Ok(index)
    }

    /// Returns the deal selected by the fixed attestation.
    pub fn fixed_deal(&self) -> Result<(DealIndex, &Deal), Error> {
        let msgs = self.oracle.signed_msgs().ok_or(Error::NoFixedDeal)?;
        self.conditions.deal_by_msgs(msgs)
    }

    pub fn has_deal_fixed(&self) -> bool {
        self.oracle.has_deal_fixed()
    }

    pub(crate) fn funding_spend_info(&self) -> Result<FundingSpendInfo, Error> {
        let pubkeys = PartyPair::new(
            self.pubkey(Contractor::FirstParty)?,
            self.pubkey(Contractor::SecondParty)?,
        );
        let funding_value = self
            .conditions
            .fund_total()
            .ok_or(Error::Fee("total funding amount overflows"))?;
        Ok(FundingSpendInfo::new(pubkeys, funding_value))
    }

    /// Computes the contract identifier: a SHA256 hash over the conditions,
    /// both pubkeys, both change scripts and the oracle's public parameters,
    /// always encoded in contractor order so that both sides agree.
    pub fn contract_id(&self) -> Result<ContractId, Error> {
        let oracle = self.oracle.pubkey_set().ok_or(Error::OracleNotPrepared)?;

        let mut hasher = sha2::Sha256::new();
        hasher.update(self.conditions.canonical_bytes());
        for party in Contractor::ALL {
            hasher.update(self.pubkey(party)?.serialize());
        }
        for party in Contractor::ALL {
            let script = self.change_script(party)?;
            hasher.update((script.len() as u64).to_be_bytes());
            hasher.update(script.as_bytes());
        }
        hasher.update(oracle.pubkey.serialize());
        hasher.update((oracle.committed_r_points.len() as u64).to_be_bytes());
        for r_point in &oracle.committed_r_points {
            hasher.update(r_point.serialize());
        }

        Ok(ContractId(hasher.finalize().into()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        contract::tests::sample_conditions, oracles::tests::TestOracle,
        spend_info::PayoutSpendInfo,
    };

    use bitcoin::{Amount, OutPoint};
    use secp::Scalar;

    pub(crate) fn pubkey(n: u128) -> Point {
        Scalar::try_from(n).unwrap().base_point_mul()
    }

    /// A contract with every pre-signature slot filled for both parties.
    pub(crate) fn negotiated_dlc() -> Dlc {
        let mut dlc = Dlc::new(Network::Regtest, sample_conditions());
        dlc.prepare_oracle_commitments(TestOracle::new().pubkey_set())
            .unwrap();

        for (party, n) in [(Contractor::FirstParty, 1), (Contractor::SecondParty, 2)] {
            let pk = pubkey(n);
            dlc.pubkeys.set_once(party, pk, Field::Pubkey).unwrap();
            let change = PayoutSpendInfo::new(pubkey(n + 10)).script_pubkey();
            dlc.change_scripts
                .set_once(party, change, Field::ChangeAddress)
                .unwrap();
            let settlement = PayoutSpendInfo::new(pubkey(n + 20)).script_pubkey();
            dlc.settlement_scripts
                .set_once(party, settlement, Field::SettlementAddress)
                .unwrap();

            let funding_script = PayoutSpendInfo::new(pubkey(n + 30)).script_pubkey();
            let selection = UtxoSelection {
                utxos: vec![crate::wallet::Utxo {
                    outpoint: OutPoint::new(
                        "0000000000000000000000000000000000000000000000000000000000000001"
                            .parse()
                            .unwrap(),
                        n as u32,
                    ),
                    amount: Amount::from_sat(150_000),
                    script_pubkey: funding_script,
                }],
                change: Amount::from_sat(40_000),
            };
            dlc.fund_inputs
                .set_once(party, selection, Field::FundInputs)
                .unwrap();
        }
        dlc
    }

    #[test]
    fn missing_slots_fail_explicitly() {
        let dlc = Dlc::new(Network::Regtest, sample_conditions());
        assert!(matches!(
            dlc.pubkey(Contractor::SecondParty),
            Err(Error::MissingField {
                party: Contractor::SecondParty,
                field: Field::Pubkey
            })
        ));
        assert!(matches!(dlc.contract_id(), Err(Error::OracleNotPrepared)));
        assert!(matches!(dlc.fixed_deal(), Err(Error::NoFixedDeal)));
    }

    #[test]
    fn contract_id_covers_change_scripts() {
        let dlc = negotiated_dlc();
        let id = dlc.contract_id().unwrap();
        assert_eq!(id, dlc.clone().contract_id().unwrap());

        let mut corrupted = dlc.clone();
        corrupted.change_scripts.first_party =
            Some(PayoutSpendInfo::new(pubkey(99)).script_pubkey());
        assert_ne!(corrupted.contract_id().unwrap(), id);

        let mut swapped = dlc.clone();
        swapped.pubkeys = PartyPair::new(
            swapped.pubkeys.second_party,
            swapped.pubkeys.first_party,
        );
        assert_ne!(swapped.contract_id().unwrap(), id);
    }

    #[test]
    fn dlc_serde_round_trip() {
        let mut dlc = negotiated_dlc();
        let oracle = TestOracle::new();
        let msgs = dlc.conditions().deals()[0].messages.clone();
        dlc.fix_deal(&oracle.sign_set(&msgs)).unwrap();

        let json = serde_json::to_string(&dlc).unwrap();
        let decoded: Dlc = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, dlc);
        assert_eq!(decoded.fixed_deal().unwrap().0, 0);

        let cbor = serde_cbor::to_vec(&dlc).unwrap();
        let decoded: Dlc = serde_cbor::from_slice(&cbor).unwrap();
        assert_eq!(decoded, dlc);
    }
}
