use bitcoin::{Network, ScriptBuf, Witness};
use secp::{MaybeScalar, Point};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    contract::Conditions,
    dlc::Dlc,
    oracles::{OraclePubkeySet, OracleRequirements},
    parties::PartyPair,
    wallet::UtxoSelection,
};

use std::fmt;

/// A DER-encoded ECDSA signature with its sighash type byte, as placed in a
/// transaction witness. Signatures are exchanged between contractors in this form.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TxSignature(pub bitcoin::ecdsa::Signature);

impl TxSignature {
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_slice(bytes: &[u8]) -> Result<TxSignature, bitcoin::ecdsa::Error> {
        bitcoin::ecdsa::Signature::from_slice(bytes).map(TxSignature)
    }
}

impl From<bitcoin::ecdsa::Signature> for TxSignature {
    fn from(sig: bitcoin::ecdsa::Signature) -> Self {
        TxSignature(sig)
    }
}

impl fmt::Debug for TxSignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TxSignature({})", hex::encode(self.to_vec()))
    }
}

impl Serialize for TxSignature {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        serdect::slice::serialize_hex_lower_or_bin(&self.to_vec(), ser)
    }
}

impl<'de> Deserialize<'de> for TxSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<TxSignature, D::Error> {
        let bytes = serdect::slice::deserialize_hex_or_bin_vec(deserializer)?;
        TxSignature::from_slice(&bytes).map_err(|err| {
            D::Error::custom(format!("invalid transaction signature: {}", err))
        })
    }
}

/// The oracle commitments in a [`Dlc`] are derived data, so we store only
/// the oracle's public parameters and the aggregated attestation. Both are
/// re-verified when a contract is loaded.
#[derive(Serialize)]
struct CompactDlcRef<'a> {
    network: Network,
    conditions: &'a Conditions,
    oracle_pubkey_set: Option<&'a OraclePubkeySet>,
    #[serde(with = "option_vec_of_byte_vecs")]
    signed_msgs: Option<Vec<Vec<u8>>>,
    sign: Option<MaybeScalar>,
    pubkeys: &'a PartyPair<Option<Point>>,
    settlement_scripts: &'a PartyPair<Option<ScriptBuf>>,
    change_scripts: &'a PartyPair<Option<ScriptBuf>>,
    fund_inputs: &'a PartyPair<Option<UtxoSelection>>,
    fund_witnesses: &'a PartyPair<Option<Vec<Witness>>>,
    refund_sigs: &'a PartyPair<Option<TxSignature>>,
    exec_sigs: &'a PartyPair<Option<Vec<TxSignature>>>,
}

#[derive(Deserialize)]
struct CompactDlc {
    network: Network,
    conditions: Conditions,
    oracle_pubkey_set: Option<OraclePubkeySet>,
    #[serde(with = "option_vec_of_byte_vecs")]
    signed_msgs: Option<Vec<Vec<u8>>>,
    sign: Option<MaybeScalar>,
    pubkeys: PartyPair<Option<Point>>,
    settlement_scripts: PartyPair<Option<ScriptBuf>>,
    change_scripts: PartyPair<Option<ScriptBuf>>,
    fund_inputs: PartyPair<Option<UtxoSelection>>,
    fund_witnesses: PartyPair<Option<Vec<Witness>>>,
    refund_sigs: PartyPair<Option<TxSignature>>,
    exec_sigs: PartyPair<Option<Vec<TxSignature>>>,
}

impl Serialize for Dlc {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        CompactDlcRef {
            network: self.network,
            conditions: &self.conditions,
            oracle_pubkey_set: self.oracle.pubkey_set(),
            signed_msgs: self.oracle.signed_msgs().map(|msgs| msgs.to_vec()),
            sign: self.oracle.sign(),
            pubkeys: &self.pubkeys,
            settlement_scripts: &self.settlement_scripts,
            change_scripts: &self.change_scripts,
            fund_inputs: &self.fund_inputs,
            fund_witnesses: &self.fund_witnesses,
            refund_sigs: &self.refund_sigs,
            exec_sigs: &self.exec_sigs,
        }
        .serialize(ser)
    }
}

impl<'de> Deserialize<'de> for Dlc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Dlc, D::Error> {
        let compact = CompactDlc::deserialize(deserializer)?;

        let oracle = OracleRequirements::restore(
            compact.oracle_pubkey_set,
            compact.signed_msgs.zip(compact.sign),
            compact.conditions.deals(),
        )
        .map_err(|err| {
            D::Error::custom(format!("failed to restore oracle requirements: {}", err))
        })?;

        Ok(Dlc {
            network: compact.network,
            conditions: compact.conditions,
            oracle,
            pubkeys: compact.pubkeys,
            settlement_scripts: compact.settlement_scripts,
            change_scripts: compact.change_scripts,
            fund_inputs: compact.fund_inputs,
            fund_witnesses: compact.fund_witnesses,
            refund_sigs: compact.refund_sigs,
            exec_sigs: compact.exec_sigs,
        })
    }
}

pub(crate) mod byte_array {
    use serde::{Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &[u8; 32], ser: S) -> Result<S::Ok, S::Error> {
        serdect::array::serialize_hex_lower_or_bin(value, ser)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; 32], D::Error> {
        let mut bytes = [0u8; 32];
        serdect::array::deserialize_hex_or_bin(&mut bytes, deserializer)?;
        Ok(bytes)
    }
}

pub(crate) mod byte_vec {
    use serde::{Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(value: &Vec<u8>, ser: S) -> Result<S::Ok, S::Error> {
        serdect::slice::serialize_hex_lower_or_bin(value, ser)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        serdect::slice::deserialize_hex_or_bin_vec(deserializer)
    }
}

pub(crate) mod vec_of_byte_vecs {
    use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};
    use serdect::slice::HexOrBin;

    pub(crate) fn serialize<S: Serializer>(vecs: &Vec<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        if !ser.is_human_readable() {
            return vecs.serialize(ser);
        }
        let mut seq = ser.serialize_seq(Some(vecs.len()))?;
        for vec in vecs {
            seq.serialize_element(&hex::encode(vec))?;
        }
        seq.end()
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        if !deserializer.is_human_readable() {
            return Vec::<Vec<u8>>::deserialize(deserializer);
        }
        Ok(Vec::<HexOrBin<false>>::deserialize(deserializer)?
            .into_iter()
            .map(|HexOrBin(vec)| vec)
            .collect())
    }
}

mod option_vec_of_byte_vecs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(transparent)]
    struct Wrapper(#[serde(with = "super::vec_of_byte_vecs")] Vec<Vec<u8>>);

    pub(super) fn serialize<S: Serializer>(
        value: &Option<Vec<Vec<u8>>>,
        ser: S,
    ) -> Result<S::Ok, S::Error> {
        value.clone().map(Wrapper).serialize(ser)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Vec<u8>>>, D::Error> {
        Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(vecs)| vecs))
    }
}
