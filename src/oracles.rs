use secp::{MaybePoint, MaybeScalar, Point};
use serde::{Deserialize, Serialize};

use crate::{
    contract::{Deal, DealIndex},
    errors::Error,
    schnorr,
};

/// An oracle's public parameters for one event: its public key, and the
/// `R` points with which it promises to sign each message position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePubkeySet {
    /// The signing oracle's pubkey.
    pub pubkey: Point,

    /// One committed nonce point per message position.
    pub committed_r_points: Vec<Point>,
}

/// An oracle's published attestation: the messages describing the real-world
/// outcome, and one signature share per message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleSignSet {
    #[serde(with = "crate::serialization::vec_of_byte_vecs")]
    pub msgs: Vec<Vec<u8>>,
    pub signs: Vec<MaybeScalar>,
}

/// A verified attestation, fixed once and never replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct FixedAttestation {
    #[serde(with = "crate::serialization::vec_of_byte_vecs")]
    signed_msgs: Vec<Vec<u8>>,
    sign: MaybeScalar,
}

/// Oracle-binding state of a contract.
///
/// Commitments are derived once from the oracle's public parameters, index-aligned
/// with the contract's deals. Once the outcome is known, the attestation is
/// verified against the matching commitment and recorded. Both steps are write-once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRequirements {
    pubkey_set: Option<OraclePubkeySet>,
    commitments: Vec<MaybePoint>,
    attestation: Option<FixedAttestation>,
}

impl OracleRequirements {
    pub fn new() -> OracleRequirements {
        OracleRequirements::default()
    }

    /// Computes one commitment per deal from the oracle's public parameters.
    pub(crate) fn prepare_commitments(
        &mut self,
        pubkey_set: OraclePubkeySet,
        deals: &[Deal],
    ) -> Result<(), Error> {
        if self.pubkey_set.is_some() {
            return Err(Error::OracleAlreadyPrepared);
        }

        let nonces = pubkey_set.committed_r_points.len();
        if let Some((index, deal)) = deals
            .iter()
            .enumerate()
            .find(|(_, deal)| deal.messages.len() != nonces)
        {
            return Err(Error::OracleNonceCountMismatch {
                index,
                nonces,
                messages: deal.messages.len(),
            });
        }

        self.commitments = deals
            .iter()
            .map(|deal| {
                schnorr::commit_multi(
                    &pubkey_set.pubkey,
                    &pubkey_set.committed_r_points,
                    &deal.messages,
                )
            })
            .collect();
        self.pubkey_set = Some(pubkey_set);
        Ok(())
    }

    /// Verifies the oracle's attestation against the commitment of the deal it
    /// names, and records it. Nothing is modified if verification fails.
    ///
    /// Fixing the same messages again is a no-op. Fixing different messages
    /// after an attestation was recorded fails with [`Error::DealAlreadyFixed`].
    pub(crate) fn fix_deal(
        &mut self,
        deals: &[Deal],
        sign_set: &OracleSignSet,
    ) -> Result<DealIndex, Error> {
        let sign = schnorr::sum_signs(&sign_set.signs);
        self.fix_aggregated(deals, &sign_set.msgs, sign)
    }

    fn fix_aggregated(
        &mut self,
        deals: &[Deal],
        msgs: &[Vec<u8>],
        sign: MaybeScalar,
    ) -> Result<DealIndex, Error> {
        let index = deals
            .iter()
            .position(|deal| deal.matches(msgs))
            .ok_or(Error::DealNotFound)?;

        if let Some(attestation) = &self.attestation {
            if attestation.signed_msgs == msgs {
                return Ok(index);
            }
            return Err(Error::DealAlreadyFixed);
        }

        let &commitment = self
            .commitments
            .get(index)
            .ok_or(Error::OracleNotPrepared)?;

        if !schnorr::verify(commitment, sign) {
            return Err(Error::InvalidOracleSignature);
        }

        self.attestation = Some(FixedAttestation {
            signed_msgs: msgs.to_vec(),
            sign,
        });
        Ok(index)
    }

    /// Rebuilds the oracle state of a stored contract, recomputing the
    /// commitments and re-verifying the aggregated attestation if present.
    pub(crate) fn restore(
        pubkey_set: Option<OraclePubkeySet>,
        attestation: Option<(Vec<Vec<u8>>, MaybeScalar)>,
        deals: &[Deal],
    ) -> Result<OracleRequirements, Error> {
        let mut reqs = OracleRequirements::new();
        if let Some(pubkey_set) = pubkey_set {
            reqs.prepare_commitments(pubkey_set, deals)?;
        }
        if let Some((msgs, sign)) = attestation {
            reqs.fix_aggregated(deals, &msgs, sign)?;
        }
        Ok(reqs)
    }

    pub fn pubkey_set(&self) -> Option<&OraclePubkeySet> {
        self.pubkey_set.as_ref()
    }

    /// The commitment for the given deal, if commitments have been prepared.
    pub fn commitment(&self, index: DealIndex) -> Option<MaybePoint> {
        self.commitments.get(index).copied()
    }

    pub fn signed_msgs(&self) -> Option<&[Vec<u8>]> {
        self.attestation
            .as_ref()
            .map(|att| att.signed_msgs.as_slice())
    }

    pub fn sign(&self) -> Option<MaybeScalar> {
        self.attestation.as_ref().map(|att| att.sign)
    }

    pub fn has_deal_fixed(&self) -> bool {
        self.attestation
            .as_ref()
            .is_some_and(|att| !att.signed_msgs.is_empty())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::contract::tests::sample_deals;

    use secp::Scalar;

    /// A deterministic oracle with two message positions.
    pub(crate) struct TestOracle {
        pub(crate) seckey: Scalar,
        pub(crate) secnonces: Vec<Scalar>,
    }

    impl TestOracle {
        pub(crate) fn new() -> TestOracle {
            TestOracle {
                seckey: Scalar::try_from(0xface_u128).unwrap(),
                secnonces: vec![
                    Scalar::try_from(0xaaaa_u128).unwrap(),
                    Scalar::try_from(0xbbbb_u128).unwrap(),
                ],
            }
        }

        pub(crate) fn pubkey_set(&self) -> OraclePubkeySet {
            OraclePubkeySet {
                pubkey: self.seckey.base_point_mul(),
                committed_r_points: self.secnonces.iter().map(|k| k.base_point_mul()).collect(),
            }
        }

        pub(crate) fn sign_set(&self, msgs: &[Vec<u8>]) -> OracleSignSet {
            OracleSignSet {
                msgs: msgs.to_vec(),
                signs: self
                    .secnonces
                    .iter()
                    .zip(msgs)
                    .map(|(&k, msg)| schnorr::attest(self.seckey, k, msg))
                    .collect(),
            }
        }
    }

    #[test]
    fn fix_deal_with_valid_attestation() {
        let deals = sample_deals();
        let oracle = TestOracle::new();

        let mut reqs = OracleRequirements::new();
        reqs.prepare_commitments(oracle.pubkey_set(), &deals).unwrap();
        assert!(!reqs.has_deal_fixed());

        let sign_set = oracle.sign_set(&deals[2].messages);
        assert_eq!(reqs.fix_deal(&deals, &sign_set).unwrap(), 2);
        assert!(reqs.has_deal_fixed());
        assert_eq!(reqs.signed_msgs(), Some(deals[2].messages.as_slice()));

        // Re-fixing the same attestation is a no-op.
        assert_eq!(reqs.fix_deal(&deals, &sign_set).unwrap(), 2);

        // A different attestation cannot replace the fixed one.
        let other = oracle.sign_set(&deals[0].messages);
        assert!(matches!(
            reqs.fix_deal(&deals, &other),
            Err(Error::DealAlreadyFixed)
        ));
        assert_eq!(reqs.signed_msgs(), Some(deals[2].messages.as_slice()));
    }

    #[test]
    fn forged_attestation_rejected() {
        let deals = sample_deals();
        let oracle = TestOracle::new();

        let mut reqs = OracleRequirements::new();
        reqs.prepare_commitments(oracle.pubkey_set(), &deals).unwrap();

        // Signatures for deal 0, but claiming the messages of deal 1.
        let mut forged = oracle.sign_set(&deals[0].messages);
        forged.msgs = deals[1].messages.clone();
        assert!(matches!(
            reqs.fix_deal(&deals, &forged),
            Err(Error::InvalidOracleSignature)
        ));
        assert!(!reqs.has_deal_fixed());
        assert_eq!(reqs.sign(), None);

        // Messages matching no deal at all.
        let unknown = oracle.sign_set(&[b"9".to_vec(), b"9".to_vec()]);
        assert!(matches!(
            reqs.fix_deal(&deals, &unknown),
            Err(Error::DealNotFound)
        ));
    }

    #[test]
    fn restore_reverifies_attestation() {
        let deals = sample_deals();
        let oracle = TestOracle::new();
        let sign_set = oracle.sign_set(&deals[1].messages);
        let sign = schnorr::sum_signs(&sign_set.signs);

        let restored = OracleRequirements::restore(
            Some(oracle.pubkey_set()),
            Some((deals[1].messages.clone(), sign)),
            &deals,
        )
        .unwrap();
        assert_eq!(restored.signed_msgs(), Some(deals[1].messages.as_slice()));
        assert_eq!(restored.commitment(2), {
            let mut reqs = OracleRequirements::new();
            reqs.prepare_commitments(oracle.pubkey_set(), &deals).unwrap();
            reqs.commitment(2)
        });

        let tampered = OracleRequirements::restore(
            Some(oracle.pubkey_set()),
            Some((deals[0].messages.clone(), sign)),
            &deals,
        );
        assert!(matches!(tampered, Err(Error::InvalidOracleSignature)));
    }

    #[test]
    fn commitments_required_before_fixing() {
        let deals = sample_deals();
        let oracle = TestOracle::new();
        let mut reqs = OracleRequirements::new();
        assert!(matches!(
            reqs.fix_deal(&deals, &oracle.sign_set(&deals[0].messages)),
            Err(Error::OracleNotPrepared)
        ));
    }

    #[test]
    fn nonce_count_must_match_messages() {
        let deals = sample_deals();
        let mut pubkey_set = TestOracle::new().pubkey_set();
        pubkey_set.committed_r_points.pop();

        let mut reqs = OracleRequirements::new();
        assert!(matches!(
            reqs.prepare_commitments(pubkey_set, &deals),
            Err(Error::OracleNonceCountMismatch {
                index: 0,
                nonces: 1,
                messages: 2
            })
        ));
        assert!(reqs.pubkey_set().is_none());

        let oracle = TestOracle::new();
        reqs.prepare_commitments(oracle.pubkey_set(), &deals).unwrap();
        assert!(matches!(
            reqs.prepare_commitments(oracle.pubkey_set(), &deals),
            Err(Error::OracleAlreadyPrepared)
        ));
    }
}
