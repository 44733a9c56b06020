//! Revisioned key-value storage abstraction for the Coffer ledger.
//!
//! This crate provides the [`StorageBackend`] trait and the types that every
//! ledger operation is built on. Each stored value carries an opaque
//! [`Revision`], and writes can be made conditional on that revision, which is
//! all the ledger needs to run optimistic read-modify-write cycles without
//! locks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      coffer-ledger                          │
//! │     (accounts, deposits, withdrawals, balance inquiries)    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     TimeoutBackend                          │
//! │                (per-call deadline wrapper)                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │                     coffer-storage                          │
//! │                  StorageBackend trait                       │
//! │  (get, set, compare_and_set, compare_and_delete, get_range) │
//! ├─────────────────────────────────────────────────────────────┤
//! │  MemoryBackend (tests, development, single-process use)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use coffer_storage::{MemoryBackend, StorageBackend, StorageError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = MemoryBackend::new();
//!
//!     // Insert only if the key does not exist yet.
//!     let rev = backend.compare_and_set(b"accounts/1", None, b"100".to_vec()).await?;
//!
//!     // Update only if nobody wrote since we read `rev`.
//!     backend.compare_and_set(b"accounts/1", Some(rev), b"150".to_vec()).await?;
//!
//!     // A second writer holding the old revision loses.
//!     let stale = backend.compare_and_set(b"accounts/1", Some(rev), b"90".to_vec()).await;
//!     assert!(matches!(stale, Err(StorageError::Conflict)));
//!
//!     Ok(())
//! }
//! ```
//!
//! # Implementing a Backend
//!
//! 1. Implement the [`StorageBackend`] trait
//! 2. Produce a fresh [`Revision`] for every successful write, deletes included
//! 3. Map backend-specific failures to [`StorageError`], reporting precondition failures as
//!    [`StorageError::Conflict`] and nothing else
//!
//! The `conformance` module (behind `testutil`) checks these rules against
//! any backend.
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module (fault-injecting backend, assertion macro) and
//!   the `conformance` suite. Enable this in `[dev-dependencies]`.
//! - **`failpoints`**: Compiles `fail` crate fail points into the memory backend.

#![deny(unsafe_code)]

pub mod backend;
#[cfg(any(test, feature = "testutil"))]
pub mod conformance;
pub mod error;
pub mod memory;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
pub mod timeout;
pub mod types;

// Re-export primary types at crate root for convenience
pub use backend::StorageBackend;
pub use error::{BoxError, StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use timeout::TimeoutBackend;
pub use types::{KeyValue, Revision, Versioned, prefix_range};
