//! Error types for the Spreadbook exchange.
//!
//! All errors use the `SB_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Bid validation errors
//! - 2xx: Lease errors
//! - 3xx: Matching errors
//! - 4xx: Persistence errors
//! - 5xx: Results feed errors
//! - 6xx: Settlement errors
//! - 9xx: General / internal errors

use thiserror::Error;

use crate::{Amount, OutcomeId};

/// Central error enum for all Spreadbook operations.
#[derive(Debug, Error)]
pub enum SpreadbookError {
    // =================================================================
    // Bid Validation Errors (1xx)
    // =================================================================
    /// The bid failed structural validation (missing fields, bad names).
    #[error("SB_ERR_100: Invalid bid: {reason}")]
    InvalidBid { reason: String },

    /// The stake is outside the allowed `(min, max]` window.
    #[error("SB_ERR_101: Bid amount {amount} outside allowed range [{min}, {max}]")]
    AmountOutOfRange { amount: i64, min: Amount, max: Amount },

    /// The chosen competitor is neither the away nor the home competitor.
    #[error("SB_ERR_102: Unknown competitor '{competitor}' for event {event}")]
    UnknownCompetitor { competitor: String, event: String },

    /// The event has already started; the market is closed.
    #[error("SB_ERR_103: Market closed for event {event}")]
    MarketClosed { event: String },

    /// Too many bids in a single submission.
    #[error("SB_ERR_104: Submission too large: {count} bids (max {max})")]
    SubmissionTooLarge { count: usize, max: usize },

    // =================================================================
    // Lease Errors (2xx)
    // =================================================================
    /// The lease could not be acquired before the maximum wait elapsed.
    #[error("SB_ERR_200: Could not acquire lease {key} within {waited_ms}ms")]
    LeaseTimeout { key: String, waited_ms: u64 },

    /// The lease expired and was taken over (or renewal was refused).
    #[error("SB_ERR_201: Lease lost: {key}")]
    LeaseLost { key: String },

    // =================================================================
    // Matching Errors (3xx)
    // =================================================================
    /// Amounts entering a match did not equal amounts leaving it.
    #[error("SB_ERR_300: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// A bid from a different event was fed to an event book.
    #[error("SB_ERR_301: Event mismatch: expected {expected}, got {actual}")]
    EventMismatch { expected: String, actual: String },

    // =================================================================
    // Persistence Errors (4xx)
    // =================================================================
    /// The underlying store rejected or failed an operation.
    #[error("SB_ERR_400: Store error: {0}")]
    Store(String),

    /// A conditional write lost against an existing record.
    #[error("SB_ERR_401: Condition failed for {key}")]
    ConditionFailed { key: String },

    /// A persisted key or record could not be decoded.
    #[error("SB_ERR_402: Record decode error: {reason}")]
    RecordDecode { reason: String },

    /// Some chunks of a batch write failed.
    #[error("SB_ERR_403: Partial write: {failed_ops} of {total_ops} operations failed")]
    PartialWrite { failed_ops: usize, total_ops: usize },

    /// A batch exceeded the store's per-request limit.
    #[error("SB_ERR_404: Batch of {size} exceeds limit {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    // =================================================================
    // Results Feed Errors (5xx)
    // =================================================================
    /// The results feed failed to answer for a kind.
    #[error("SB_ERR_500: Feed error for {kind}: {reason}")]
    Feed { kind: String, reason: String },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// This outcome was already recorded (idempotency guard).
    #[error("SB_ERR_600: Outcome already recorded: {0}")]
    OutcomeAlreadyRecorded(OutcomeId),

    /// A settlement task failed to complete (panicked or aborted).
    #[error("SB_ERR_601: Settlement task failed: {reason}")]
    SettlementTask { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("SB_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("SB_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("SB_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("SB_ERR_903: I/O error: {0}")]
    Io(String),

    /// The operation context was cancelled.
    #[error("SB_ERR_904: Operation cancelled")]
    Cancelled,

    /// The operation context deadline passed.
    #[error("SB_ERR_905: Deadline exceeded")]
    DeadlineExceeded,
}

impl SpreadbookError {
    /// The `SB_ERR_nnn` code at the head of the message.
    #[must_use]
    pub fn code(&self) -> String {
        let msg = self.to_string();
        msg.split(':').next().unwrap_or_default().to_string()
    }

    /// Whether this error was produced by input validation (caller-visible,
    /// no side effects happened).
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidBid { .. }
                | Self::AmountOutOfRange { .. }
                | Self::UnknownCompetitor { .. }
                | Self::MarketClosed { .. }
                | Self::SubmissionTooLarge { .. }
        )
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, SpreadbookError>;

impl From<std::io::Error> for SpreadbookError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SpreadbookError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
