//! Error taxonomy for position transitions and ledger operations

/// A chain invariant that a candidate state would break.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    #[error("quantity must be strictly positive")]
    PositiveQuantity,
    #[error("face value currency is fixed for the lifetime of a lineage")]
    CurrencyImmutable,
    #[error("maturity date may not move backwards")]
    MaturityMonotonic,
    #[error("version must advance by exactly one")]
    VersionSequence,
    #[error("predecessor must reference the superseded head")]
    PredecessorLink,
}

/// Rejection raised by a pure transition or by draft finalisation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("invariant violated: {0}")]
    InvariantViolation(Invariant),
}

/// Failure of a ledger operation. `StaleVersion` is the only variant a
/// caller is expected to retry, with a freshly read head version.
#[derive(thiserror::Error, Debug)]
pub enum LedgerError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("stale version: expected head at {expected}, found {actual}")]
    StaleVersion { expected: u64, actual: u64 },
    #[error("a lineage for this issuance already exists")]
    DuplicateIssuance,
    #[error("lineage has been terminated")]
    LineageTerminated,
    #[error("lineage not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("codec failure: {0}")]
    Codec(String),
    #[error("store inconsistency: {0}")]
    Inconsistent(String),
}
