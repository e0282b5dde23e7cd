use bitcoin::Amount;
use thiserror::Error;

use crate::{builder::Phase, parties::Contractor, wallet::WalletError};

use std::fmt;

/// Identifies a per-party slot in the [`Dlc`][crate::Dlc] state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pubkey,
    SettlementAddress,
    ChangeAddress,
    FundInputs,
    FundWitnesses,
    RefundSignature,
    SettlementSignatures,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Field::Pubkey => "public key",
            Field::SettlementAddress => "settlement address",
            Field::ChangeAddress => "change address",
            Field::FundInputs => "funding inputs",
            Field::FundWitnesses => "funding witnesses",
            Field::RefundSignature => "refund signature",
            Field::SettlementSignatures => "settlement signatures",
        };
        f.write_str(name)
    }
}

/// A single violated constraint found while validating [`Conditions`][crate::Conditions].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionViolation {
    #[error("fixing time {fixing_time} is not in the future (now: {now})")]
    FixingTimeNotFuture { fixing_time: u64, now: u64 },

    #[error("fund amount of {0} must be positive")]
    ZeroFundAmount(Contractor),

    #[error("fund fee rate must be positive")]
    ZeroFundFeeRate,

    #[error("settlement fee rate must be positive")]
    ZeroSettlementFeeRate,

    #[error("refund locktime must be positive")]
    ZeroRefundLocktime,

    #[error("contract has no deals")]
    NoDeals,

    #[error("deal {0} has no oracle messages")]
    EmptyDealMessages(usize),

    #[error("deal {index} pays out {payout}, more than the total funding {funding}")]
    DealExceedsFunding {
        index: usize,
        payout: Amount,
        funding: Amount,
    },

    #[error("deal {index} has the same messages as deal {duplicate_of}")]
    DuplicateDeal { index: usize, duplicate_of: usize },

    #[error("deal {0} pays nothing to either party")]
    DealPaysNothing(usize),

    #[error("deal {0} leaves every payout at or below the dust limit after fees")]
    DealPaysOnlyDust(usize),

    #[error("refund leaves every payout at or below the dust limit after fees")]
    RefundPaysOnlyDust,
}

/// Broad classification of an [`Error`], so that callers can decide whether to
/// abort, re-negotiate, or request more funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed or missing conditions, keys, addresses or signatures.
    Validation,
    /// An operation was invoked before its prerequisite step.
    Precondition,
    /// The wallet cannot fund the contract.
    Resource,
    /// The two parties disagree about the contract.
    ProtocolAgreement,
    /// A signature failed cryptographic verification.
    CryptographicVerification,
    /// Transaction construction, serialization, storage or transport failures.
    Internal,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid contract conditions: {}", join_violations(.0))]
    InvalidConditions(Vec<ConditionViolation>),

    #[error("invalid public key: {0}")]
    InvalidPubkey(#[from] secp::errors::InvalidPointBytes),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("missing {field} of {party}")]
    MissingField { party: Contractor, field: Field },

    #[error("{field} of {party} is already set")]
    AlreadySet { party: Contractor, field: Field },

    #[error("{operation} requires phase {expected:?}, but builder is in phase {actual:?}")]
    WrongPhase {
        operation: &'static str,
        expected: Phase,
        actual: Phase,
    },

    #[error("{operation} was already performed")]
    AlreadyPerformed { operation: &'static str },

    #[error("insufficient funds: {0}")]
    InsufficientFunds(WalletError),

    #[error("wallet failure: {0}")]
    Wallet(WalletError),

    #[error("expected {expected} settlement signatures, got {actual}")]
    SignatureCountMismatch { expected: usize, actual: usize },

    #[error("expected {expected} funding witnesses, got {actual}")]
    WitnessCountMismatch { expected: usize, actual: usize },

    #[error("contract ids differ: ours {ours}, theirs {theirs}")]
    ContractIdMismatch { ours: String, theirs: String },

    #[error("no deal matches the attested messages")]
    DealNotFound,

    #[error("deal already fixed with different messages")]
    DealAlreadyFixed,

    #[error("no deal has been fixed")]
    NoFixedDeal,

    #[error("oracle commitments are not prepared")]
    OracleNotPrepared,

    #[error("oracle commitments are already prepared")]
    OracleAlreadyPrepared,

    #[error("oracle committed {nonces} nonces, but deal {index} has {messages} messages")]
    OracleNonceCountMismatch {
        index: usize,
        nonces: usize,
        messages: usize,
    },

    #[error("oracle signature does not verify against the deal commitment")]
    InvalidOracleSignature,

    #[error("counterparty signature on settlement transaction {0} is invalid")]
    InvalidSettlementSignature(usize),

    #[error("counterparty signature on refund transaction is invalid")]
    InvalidRefundSignature,

    #[error("fee calculation failed: {0}")]
    Fee(&'static str),

    #[error("failed to compute sighash: {0}")]
    Sighash(#[from] bitcoin::sighash::Error),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected message: expected {expected}, got {actual}")]
    UnexpectedMessage {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("serialization failure: {0}")]
    Serialization(String),

    #[error("contract {0} does not exist")]
    ContractNotFound(String),
}

impl Error {
    /// Returns the broad category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidConditions(_)
            | Error::InvalidPubkey(_)
            | Error::InvalidAddress(_)
            | Error::AlreadySet { .. }
            | Error::OracleAlreadyPrepared
            | Error::OracleNonceCountMismatch { .. } => ErrorCategory::Validation,

            Error::MissingField { .. }
            | Error::WrongPhase { .. }
            | Error::AlreadyPerformed { .. }
            | Error::NoFixedDeal
            | Error::OracleNotPrepared => ErrorCategory::Precondition,

            Error::InsufficientFunds(_) => ErrorCategory::Resource,

            Error::SignatureCountMismatch { .. }
            | Error::WitnessCountMismatch { .. }
            | Error::ContractIdMismatch { .. }
            | Error::DealNotFound
            | Error::DealAlreadyFixed
            | Error::UnexpectedMessage { .. } => ErrorCategory::ProtocolAgreement,

            Error::InvalidOracleSignature
            | Error::InvalidSettlementSignature(_)
            | Error::InvalidRefundSignature => ErrorCategory::CryptographicVerification,

            Error::Wallet(_)
            | Error::Fee(_)
            | Error::Sighash(_)
            | Error::Transport(_)
            | Error::Serialization(_)
            | Error::ContractNotFound(_) => ErrorCategory::Internal,
        }
    }
}

impl From<WalletError> for Error {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::InsufficientFunds { .. } => Error::InsufficientFunds(err),
            err => Error::Wallet(err),
        }
    }
}

fn join_violations(violations: &[ConditionViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
