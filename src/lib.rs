//! Negotiation, construction and settlement of two-party Discreet Log Contracts.
//!
//! Two contractors agree on [`Conditions`]: how much each puts into a shared
//! 2-of-2 funding output, and how the funds are split under each possible
//! [`Deal`]. Each contractor runs a [`Builder`], and the two exchange keys,
//! funding inputs and signatures until both hold a fully signed funding
//! transaction, one pre-signed settlement transaction per deal, and a
//! pre-signed refund transaction. Once the oracle attests to the outcome,
//! its attestation selects the one settlement transaction which may be broadcast.

mod builder;
mod consts;
mod contract;
mod dlc;
mod errors;
mod oracles;
mod parties;
mod serialization;
mod spend_info;
mod wallet;

pub mod messages;
pub mod schnorr;
pub mod session;
pub mod store;

pub use bitcoin;
pub use secp;

pub use builder::{Builder, Phase};
pub use consts::P2WPKH_DUST_VALUE;
pub use contract::{Conditions, Deal, DealIndex};
pub use dlc::{ClosingTx, ContractId, Dlc};
pub use errors::{ConditionViolation, Error, ErrorCategory, Field};
pub use oracles::{OraclePubkeySet, OracleRequirements, OracleSignSet};
pub use parties::{Contractor, PartyPair};
pub use serialization::TxSignature;
pub use wallet::{Utxo, UtxoSelection, Wallet, WalletError};
