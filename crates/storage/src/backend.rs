//! Storage backend trait definition.
//!
//! This module defines the [`StorageBackend`] trait, the key-value abstraction
//! the ledger is written against. All storage implementations
//! ([`MemoryBackend`](crate::MemoryBackend), [`TimeoutBackend`](crate::TimeoutBackend),
//! and any replicated store adapter) implement this trait.
//!
//! # Design Philosophy
//!
//! The trait provides a minimal, generic key-value interface:
//! - **Keys and values are bytes**: No assumptions about serialization format
//! - **Every value is revisioned**: Reads return the [`Revision`] of the write that produced the
//!   value, and conditional writes are guarded by it
//! - **Async by default**: All operations are async for non-blocking I/O
//! - **Range queries supported**: Ordered scans for enumerating records under a prefix
//!
//! Domain logic (accounts, history records) lives in the ledger crate built on
//! top of this trait, not in the storage backends.

use std::ops::RangeBounds;

use async_trait::async_trait;

use crate::{
    error::StorageResult,
    types::{KeyValue, Revision, Versioned},
};

/// Abstract storage backend for revisioned key-value operations.
///
/// Backends are expected to be thread-safe (`Send + Sync`) and support
/// concurrent operations from many tasks and, for replicated stores, from
/// many processes.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](StorageBackend::get) | Retrieve a value and its revision |
/// | [`set`](StorageBackend::set) | Unconditionally store a value |
/// | [`compare_and_set`](StorageBackend::compare_and_set) | Store only if the revision is unchanged |
/// | [`compare_and_delete`](StorageBackend::compare_and_delete) | Delete only if the revision is unchanged |
/// | [`delete`](StorageBackend::delete) | Unconditionally remove a key |
/// | [`get_range`](StorageBackend::get_range) | Retrieve multiple keys in a range |
/// | [`health_check`](StorageBackend::health_check) | Verify backend availability |
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use coffer_storage::{MemoryBackend, StorageBackend};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let backend = MemoryBackend::new();
///
/// let rev = backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
/// let current = backend.get(b"key").await.unwrap().unwrap();
/// assert_eq!(current.value, Bytes::from("value"));
/// assert_eq!(current.revision, rev);
/// # });
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a value and the revision it was written at.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(versioned))` if the key exists
    /// - `Ok(None)` if the key doesn't exist
    /// - `Err(...)` on storage errors
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Versioned>>;

    /// Stores a key-value pair unconditionally and returns the new revision.
    ///
    /// If the key already exists, its value is overwritten. Use this only for
    /// keys that are never contended (for example records written once under
    /// a freshly generated identifier).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<Revision>;

    /// Atomically stores `new_value` if the key's current revision matches.
    ///
    /// # Semantics
    ///
    /// - **`expected: None`**: insert-if-absent. Succeeds only when the key does not exist.
    /// - **`expected: Some(rev)`**: update-if-unchanged. Succeeds only when the key exists and
    ///   its current revision equals `rev`.
    ///
    /// The check and the write happen as one atomic step with respect to
    /// every other write to the same key. Two callers that read the same
    /// revision can never both succeed.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) when the precondition does not
    ///   hold.
    ///
    /// # Retry Pattern
    ///
    /// `Conflict` is **not** transient. Retrying the same call cannot
    /// succeed; re-read the key and recompute instead:
    ///
    /// ```no_run
    /// use coffer_storage::{MemoryBackend, StorageBackend, StorageError};
    ///
    /// async fn increment(backend: &MemoryBackend, key: &[u8]) -> Result<(), StorageError> {
    ///     loop {
    ///         let current = backend.get(key).await?;
    ///         let (expected, next) = match current {
    ///             Some(v) => {
    ///                 let n: u64 = String::from_utf8_lossy(&v.value).parse().unwrap_or(0);
    ///                 (Some(v.revision), (n + 1).to_string().into_bytes())
    ///             },
    ///             None => (None, b"1".to_vec()),
    ///         };
    ///         match backend.compare_and_set(key, expected, next).await {
    ///             Ok(_) => return Ok(()),
    ///             Err(StorageError::Conflict) => continue,
    ///             Err(e) => return Err(e),
    ///         }
    ///     }
    /// }
    /// ```
    #[must_use = "compare-and-set may fail with a conflict and errors must be handled"]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<Revision>,
        new_value: Vec<u8>,
    ) -> StorageResult<Revision>;

    /// Atomically deletes a key if its current revision matches `expected`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Conflict`](crate::StorageError::Conflict) when the key is absent or was
    ///   rewritten since `expected` was read.
    #[must_use = "compare-and-delete may fail with a conflict and errors must be handled"]
    async fn compare_and_delete(&self, key: &[u8], expected: Revision) -> StorageResult<()>;

    /// Deletes a key.
    ///
    /// If the key doesn't exist, this is a no-op (returns `Ok(())`).
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn delete(&self, key: &[u8]) -> StorageResult<()>;

    /// Retrieves all key-value pairs within a range, in key order.
    ///
    /// The range uses Rust's standard [`RangeBounds`] trait. Use
    /// [`prefix_range`](crate::prefix_range) to scan every key under a prefix.
    #[must_use = "storage operations may fail and errors must be handled"]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send;

    /// Checks that the backend can serve requests.
    #[must_use = "health check results indicate backend availability and must be inspected"]
    async fn health_check(&self) -> StorageResult<()>;
}
