//! Payloads exchanged between the two contractors during negotiation.
//!
//! Contractors never share state. Everything one side needs from the other
//! travels as one of these messages over a [`Channel`].

use bitcoin::{Amount, ScriptBuf, Witness};
use serde::{Deserialize, Serialize};

use crate::{dlc::ContractId, serialization::TxSignature, wallet::Utxo};

use std::fmt;

/// A contractor's pre-signature data: its contract key, funding inputs
/// and destination addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyOffer {
    /// Compressed serialized contract pubkey.
    #[serde(with = "crate::serialization::byte_vec")]
    pub pubkey: Vec<u8>,
    pub utxos: Vec<Utxo>,
    pub change: Amount,
    pub change_script: ScriptBuf,

    /// Where the sender sweeps its own payout. The receiver keeps it only
    /// as a record of the negotiation.
    pub settlement_script: ScriptBuf,
}

/// A contractor's signatures on every settlement transaction and on the
/// refund transaction, tagged with the contract identifier the signer computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementSignatures {
    pub contract_id: ContractId,
    pub cet_signatures: Vec<TxSignature>,
    pub refund_signature: TxSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundWitnesses {
    pub witnesses: Vec<Witness>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Offer(PartyOffer),
    Accept(PartyOffer),
    SettlementSignatures(SettlementSignatures),
    FundWitnesses(FundWitnesses),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Offer(_) => "offer",
            Message::Accept(_) => "accept",
            Message::SettlementSignatures(_) => "settlement signatures",
            Message::FundWitnesses(_) => "fund witnesses",
        }
    }
}

/// A bidirectional, ordered transport between the two contractors.
pub trait Channel {
    type Error: fmt::Display;

    fn send(&mut self, msg: Message) -> Result<(), Self::Error>;
    fn recv(&mut self) -> Result<Message, Self::Error>;
}
