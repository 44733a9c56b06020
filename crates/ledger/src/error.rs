//! Error and warning types for ledger operations.
//!
//! Every failure a caller can observe is a [`LedgerError`] variant, and every
//! variant maps to a distinct [`ErrorCode`] carrying a stable string code and
//! an HTTP-style status. Soft failures that do not undo a committed balance
//! change are reported as [`LedgerWarning`]s on the successful outcome.
//!
//! `AccessDenied` and `AccountNotFound` deliberately carry no balance data.

use std::fmt;

use coffer_storage::{BoxError, StorageError};
use thiserror::Error;

use crate::ids::{AccountId, OwnerId, RecordId};

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors returned by ledger operations.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// The amount is zero or would overflow the balance.
    #[error("Invalid amount: {reason}")]
    InvalidAmount {
        /// Why the amount was rejected.
        reason: &'static str,
    },

    /// No account exists under the given id.
    #[error("Account not found: {account_id}")]
    AccountNotFound {
        /// The account that was looked up.
        account_id: AccountId,
    },

    /// The caller does not own the account.
    #[error("Access denied to account {account_id}")]
    AccessDenied {
        /// The account the caller tried to access.
        account_id: AccountId,
    },

    /// The withdrawal exceeds the balance observed by the attempt that
    /// evaluated it.
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        /// Amount the caller asked to withdraw.
        requested: u64,
        /// Balance at the revision the withdrawal was evaluated against.
        available: u64,
    },

    /// Every attempt lost its conditional write to a concurrent writer.
    ///
    /// The balance is unchanged; the caller may resubmit.
    #[error("Concurrent update conflict: gave up after {attempts} attempts")]
    ConcurrentUpdateConflict {
        /// Number of read-compute-write attempts made.
        attempts: u32,
    },

    /// The store failed or timed out.
    ///
    /// The outcome of a write that timed out is unknown.
    #[error("Store unavailable: {source}")]
    StoreUnavailable {
        /// The storage failure.
        #[source]
        source: StorageError,
    },

    /// The owner already has an account.
    #[error("Account already exists for owner {owner_id}")]
    AccountAlreadyExists {
        /// The owner whose index entry is taken.
        owner_id: OwnerId,
    },

    /// A record could not be decoded from, or encoded for, the store.
    #[error("Corrupt record at {key}: {message}")]
    CorruptRecord {
        /// Key the record was read from or bound for.
        key: String,
        /// Description of the codec failure.
        message: String,
        /// The underlying serde error.
        #[source]
        source: Option<BoxError>,
    },
}

impl LedgerError {
    /// Creates a new `InvalidAmount` error.
    #[must_use]
    pub fn invalid_amount(reason: &'static str) -> Self {
        Self::InvalidAmount { reason }
    }

    /// Creates a new `CorruptRecord` error with a source.
    #[must_use]
    pub fn corrupt_record(
        key: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            message: source.to_string(),
            source: Some(std::sync::Arc::new(source)),
        }
    }

    /// Returns the stable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidAmount { .. } => ErrorCode::InvalidAmount,
            Self::AccountNotFound { .. } => ErrorCode::AccountNotFound,
            Self::AccessDenied { .. } => ErrorCode::AccessDenied,
            Self::InsufficientFunds { .. } => ErrorCode::InsufficientFunds,
            Self::ConcurrentUpdateConflict { .. } => ErrorCode::ConcurrentUpdateConflict,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::AccountAlreadyExists { .. } => ErrorCode::AccountAlreadyExists,
            Self::CorruptRecord { .. } => ErrorCode::CorruptRecord,
        }
    }

    /// Returns `true` if resubmitting the same request may succeed.
    ///
    /// The ledger itself never retries these; it is a hint for the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentUpdateConflict { .. } | Self::StoreUnavailable { .. })
    }
}

impl From<StorageError> for LedgerError {
    fn from(source: StorageError) -> Self {
        Self::StoreUnavailable { source }
    }
}

/// Stable, client-facing classification of ledger errors and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidAmount,
    AccountNotFound,
    AccessDenied,
    InsufficientFunds,
    ConcurrentUpdateConflict,
    StoreUnavailable,
    AccountAlreadyExists,
    CorruptRecord,
    /// Soft: attached to successful outcomes only.
    HistoryWriteFailed,
    /// Soft: attached to successful outcomes only.
    OwnerIndexNotReleased,
}

impl ErrorCode {
    /// Returns the machine-readable code string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::AccountNotFound => "ACCOUNT_NOT_FOUND",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::InsufficientFunds => "INSUFFICIENT_FUNDS",
            Self::ConcurrentUpdateConflict => "CONCURRENT_UPDATE_CONFLICT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::AccountAlreadyExists => "ACCOUNT_ALREADY_EXISTS",
            Self::CorruptRecord => "CORRUPT_RECORD",
            Self::HistoryWriteFailed => "HISTORY_WRITE_FAILED",
            Self::OwnerIndexNotReleased => "OWNER_INDEX_NOT_RELEASED",
        }
    }

    /// Returns the HTTP status a transport layer should answer with.
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidAmount => 400,
            Self::AccessDenied => 403,
            Self::AccountNotFound => 404,
            Self::ConcurrentUpdateConflict | Self::AccountAlreadyExists => 409,
            Self::InsufficientFunds => 422,
            Self::CorruptRecord => 500,
            Self::StoreUnavailable => 503,
            Self::HistoryWriteFailed | Self::OwnerIndexNotReleased => 200,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A soft failure attached to an otherwise successful outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LedgerWarning {
    /// The balance change committed but its history record was not stored.
    HistoryWriteFailed {
        /// `"deposit"`, `"withdrawal"`, or `"balance_inquiry"`.
        kind: &'static str,
        /// Id the lost record would have had.
        record_id: RecordId,
        /// Description of the storage failure.
        message: String,
    },

    /// The account was closed but its owner still maps to it, so the owner
    /// cannot open a new account until the entry is removed.
    OwnerIndexNotReleased {
        /// Owner whose index entry was left behind.
        owner_id: OwnerId,
        /// Description of the storage failure.
        message: String,
    },
}

impl LedgerWarning {
    /// Returns the stable code for this warning.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::HistoryWriteFailed { .. } => ErrorCode::HistoryWriteFailed,
            Self::OwnerIndexNotReleased { .. } => ErrorCode::OwnerIndexNotReleased,
        }
    }
}

impl fmt::Display for LedgerWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HistoryWriteFailed { kind, record_id, message } => {
                write!(f, "{kind} record {record_id} was not stored: {message}")
            },
            Self::OwnerIndexNotReleased { owner_id, message } => {
                write!(f, "owner {owner_id} still maps to a closed account: {message}")
            },
        }
    }
}

/// Errors raised when validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A numeric or duration setting is below its allowed minimum.
    #[error("{field} must be at least {min}, got {value}")]
    BelowMinimum {
        /// Name of the offending field.
        field: &'static str,
        /// Smallest accepted value, formatted.
        min: String,
        /// Rejected value, formatted.
        value: String,
    },
}
