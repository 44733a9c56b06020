//! Account ledger with optimistic concurrency over a revisioned key-value
//! store.
//!
//! Each owner holds one account. Deposits and withdrawals are
//! read-modify-write cycles committed with a write conditioned on the
//! revision that was read, so concurrent requests (from this process or any
//! other sharing the store) never lose each other's updates. Every committed
//! change leaves an immutable history record, written best-effort.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ caller (already authenticated, supplies an OwnerId)          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Ledger         open / deposit / withdraw / inquire / close   │
//! │                ownership and amount rules                    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ occ::update    read → transition → conditional write → retry │
//! ├──────────────────────────────────────────────────────────────┤
//! │ codec / keys   JSON records under accounts/, owners/, ...    │
//! ├──────────────────────────────────────────────────────────────┤
//! │ coffer-storage TimeoutBackend<B: StorageBackend>             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Error Handling
//!
//! Operations return [`LedgerError`]. Only revision conflicts are retried,
//! inside the ledger, up to [`LedgerConfig::max_attempts`]; everything else
//! surfaces on the first occurrence. [`ErrorCode`] gives each error a stable
//! string code and status for transport layers.
//!
//! # Feature Flags
//!
//! - **`failpoints`**: Compiles `fail` crate fail points into the engine (`occ-before-write`,
//!   `ledger-history-write`) and the memory backend.

#![deny(unsafe_code)]

mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
mod keys;
pub mod metrics;
pub mod model;
mod occ;

pub use config::LedgerConfig;
pub use engine::{BalanceReport, ClosedAccount, Ledger, Receipt};
pub use error::{ConfigError, ErrorCode, LedgerError, LedgerWarning, Result};
pub use ids::{AccountId, OwnerId, RecordId};
pub use metrics::{LedgerMetrics, LedgerMetricsSnapshot};
pub use model::{Account, AccountHistory, BalanceInquiry, Deposit, Withdrawal};
