//! Conformance test suite for [`StorageBackend`] implementations.
//!
//! Every backend, whether in-memory, deadline-wrapped, or an adapter for a
//! replicated store, can run the same suite to show that it honours the
//! revision and conditional-write contract the ledger depends on.
//!
//! # Usage
//!
//! Enable the `testutil` feature and call each conformance function with
//! a fresh backend instance:
//!
//! ```no_run
//! use coffer_storage::{MemoryBackend, conformance};
//!
//! #[tokio::test]
//! async fn memory_backend_conforms() {
//!     conformance::run_all(MemoryBackend::new).await;
//! }
//! ```
//!
//! # Test Categories
//!
//! | Category | Contract aspect |
//! |----------|-----------------|
//! | CRUD | Basic get/set/delete semantics |
//! | Revision | Every write yields a fresh revision; reads report it |
//! | CAS | `compare_and_set` / `compare_and_delete` preconditions |
//! | Range | Ordering and prefix boundaries |
//! | Concurrent | Exactly one winner among writers holding the same revision |

#![allow(clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use bytes::Bytes;

use crate::{assert_storage_error, backend::StorageBackend, error::StorageError, prefix_range};

/// Number of tasks racing in the concurrent checks.
const CONCURRENCY: usize = 16;

// ============================================================================
// CRUD
// ============================================================================

/// `get` on a nonexistent key returns `Ok(None)`.
pub async fn crud_get_returns_none_for_missing_key<B: StorageBackend>(backend: &B) {
    let result = backend.get(b"nonexistent").await;
    assert!(result.is_ok(), "get should not error on missing key: {result:?}");
    assert_eq!(result.expect("checked above"), None, "missing key should return None");
}

/// `set` then `get` round-trips the value.
pub async fn crud_set_then_get_returns_value<B: StorageBackend>(backend: &B) {
    backend.set(b"k1".to_vec(), b"v1".to_vec()).await.expect("set should succeed");
    let val = backend.get(b"k1").await.expect("get should succeed").expect("key should exist");
    assert_eq!(val.value, Bytes::from("v1"));
}

/// `set` on an existing key overwrites the value.
pub async fn crud_set_overwrites_existing<B: StorageBackend>(backend: &B) {
    backend.set(b"k1".to_vec(), b"original".to_vec()).await.expect("set");
    backend.set(b"k1".to_vec(), b"updated".to_vec()).await.expect("overwrite");
    let val = backend.get(b"k1").await.expect("get").expect("key should exist");
    assert_eq!(val.value, Bytes::from("updated"));
}

/// `delete` on a nonexistent key is a silent no-op, and removes existing keys.
pub async fn crud_delete_semantics<B: StorageBackend>(backend: &B) {
    let result = backend.delete(b"ghost").await;
    assert!(result.is_ok(), "delete of nonexistent key should not error: {result:?}");

    backend.set(b"k2".to_vec(), b"val".to_vec()).await.expect("set");
    backend.delete(b"k2").await.expect("delete");
    let val = backend.get(b"k2").await.expect("get after delete");
    assert_eq!(val, None, "key should be gone after delete");
}

// ============================================================================
// Revision
// ============================================================================

/// The revision returned by a write is the one a subsequent read reports.
pub async fn revision_read_matches_write<B: StorageBackend>(backend: &B) {
    let rev = backend.set(b"rev".to_vec(), b"v".to_vec()).await.expect("set");
    let read = backend.get(b"rev").await.expect("get").expect("key should exist");
    assert_eq!(read.revision, rev, "read must report the revision of the last write");
}

/// Rewriting identical bytes still moves the revision on.
pub async fn revision_changes_on_every_write<B: StorageBackend>(backend: &B) {
    let first = backend.set(b"rev".to_vec(), b"same".to_vec()).await.expect("set");
    let second = backend.set(b"rev".to_vec(), b"same".to_vec()).await.expect("set again");
    assert_ne!(first, second, "identical rewrite must still produce a new revision");
}

// ============================================================================
// CAS
// ============================================================================

/// Insert-if-absent succeeds once, then conflicts.
pub async fn cas_insert_if_absent<B: StorageBackend>(backend: &B) {
    backend.compare_and_set(b"cas", None, b"first".to_vec()).await.expect("insert");
    assert_storage_error!(
        backend.compare_and_set(b"cas", None, b"second".to_vec()).await,
        StorageError::Conflict
    );
    let val = backend.get(b"cas").await.expect("get").expect("key should exist");
    assert_eq!(val.value, Bytes::from("first"));
}

/// Update-if-unchanged succeeds with the current revision and fails with a stale one.
pub async fn cas_guarded_by_revision<B: StorageBackend>(backend: &B) {
    let stale = backend.set(b"cas".to_vec(), b"v1".to_vec()).await.expect("set");
    let current = backend.compare_and_set(b"cas", Some(stale), b"v2".to_vec()).await.expect("cas");

    assert_storage_error!(
        backend.compare_and_set(b"cas", Some(stale), b"v3".to_vec()).await,
        StorageError::Conflict
    );
    let val = backend.get(b"cas").await.expect("get").expect("key should exist");
    assert_eq!(val.value, Bytes::from("v2"));
    assert_eq!(val.revision, current);
}

/// Update-if-unchanged on a missing key conflicts and does not create it.
pub async fn cas_missing_key_conflicts<B: StorageBackend>(backend: &B) {
    let rev = backend.set(b"other".to_vec(), b"v".to_vec()).await.expect("set");
    assert_storage_error!(
        backend.compare_and_set(b"missing", Some(rev), b"v".to_vec()).await,
        StorageError::Conflict
    );
    assert_eq!(backend.get(b"missing").await.expect("get"), None);
}

/// Conditional delete honours the revision guard.
pub async fn cas_delete_guarded_by_revision<B: StorageBackend>(backend: &B) {
    let stale = backend.set(b"del".to_vec(), b"v1".to_vec()).await.expect("set");
    let current = backend.set(b"del".to_vec(), b"v2".to_vec()).await.expect("set");

    assert_storage_error!(backend.compare_and_delete(b"del", stale).await, StorageError::Conflict);
    backend.compare_and_delete(b"del", current).await.expect("delete with current revision");
    assert_eq!(backend.get(b"del").await.expect("get"), None);
    assert_storage_error!(
        backend.compare_and_delete(b"del", current).await,
        StorageError::Conflict
    );
}

// ============================================================================
// Range
// ============================================================================

/// `get_range` returns results in key order.
pub async fn range_results_are_ordered<B: StorageBackend>(backend: &B) {
    for key in [b"r:c", b"r:a", b"r:b"] {
        backend.set(key.to_vec(), b"v".to_vec()).await.expect("set");
    }
    let results = backend.get_range(b"r:".to_vec()..b"r:~".to_vec()).await.expect("get_range");
    let keys: Vec<&[u8]> = results.iter().map(|kv| kv.key.as_ref()).collect();
    assert_eq!(keys, vec![b"r:a".as_slice(), b"r:b", b"r:c"], "range results must be sorted");
}

/// Prefix scans exclude keys that merely share a shorter prefix.
pub async fn range_prefix_is_exact<B: StorageBackend>(backend: &B) {
    for key in [b"p/a/1".as_slice(), b"p/a/2", b"p/ab/1", b"p/b/1"] {
        backend.set(key.to_vec(), b"v".to_vec()).await.expect("set");
    }
    let results = backend.get_range(prefix_range(b"p/a/")).await.expect("get_range");
    let keys: Vec<&[u8]> = results.iter().map(|kv| kv.key.as_ref()).collect();
    assert_eq!(keys, vec![b"p/a/1".as_slice(), b"p/a/2"]);
}

/// Range results carry the same revision a point read reports.
pub async fn range_reports_revisions<B: StorageBackend>(backend: &B) {
    let rev = backend.set(b"rr/1".to_vec(), b"v".to_vec()).await.expect("set");
    let results = backend.get_range(prefix_range(b"rr/")).await.expect("get_range");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].revision, rev);
}

// ============================================================================
// Concurrent
// ============================================================================

/// Writers racing with the same expected revision: exactly one wins.
pub async fn concurrent_cas_exactly_one_winner<B: StorageBackend + 'static>(backend: Arc<B>) {
    let rev = backend.set(b"race".to_vec(), b"start".to_vec()).await.expect("set");

    let mut set = tokio::task::JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let backend = Arc::clone(&backend);
        set.spawn(async move {
            backend
                .compare_and_set(b"race", Some(rev), format!("winner-{task_id}").into_bytes())
                .await
        });
    }

    let mut successes = 0usize;
    let mut conflicts = 0usize;
    while let Some(result) = set.join_next().await {
        match result.expect("task should not panic") {
            Ok(_) => successes += 1,
            Err(StorageError::Conflict) => conflicts += 1,
            Err(e) => panic!("unexpected error during CAS race: {e}"),
        }
    }

    assert_eq!(successes, 1, "exactly one CAS should succeed, got {successes}");
    assert_eq!(conflicts, CONCURRENCY - 1, "all other CAS calls should conflict");
}

/// Runs every conformance check, each against a fresh backend from `make`.
pub async fn run_all<B, F>(make: F)
where
    B: StorageBackend + 'static,
    F: Fn() -> B,
{
    crud_get_returns_none_for_missing_key(&make()).await;
    crud_set_then_get_returns_value(&make()).await;
    crud_set_overwrites_existing(&make()).await;
    crud_delete_semantics(&make()).await;
    revision_read_matches_write(&make()).await;
    revision_changes_on_every_write(&make()).await;
    cas_insert_if_absent(&make()).await;
    cas_guarded_by_revision(&make()).await;
    cas_missing_key_conflicts(&make()).await;
    cas_delete_guarded_by_revision(&make()).await;
    range_results_are_ordered(&make()).await;
    range_prefix_is_exact(&make()).await;
    range_reports_revisions(&make()).await;
    concurrent_cas_exactly_one_winner(Arc::new(make())).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{MemoryBackend, TimeoutBackend, testutil::FaultyBackend};

    #[tokio::test]
    async fn memory_backend_conforms() {
        run_all(MemoryBackend::new).await;
    }

    #[tokio::test]
    async fn timeout_backend_conforms() {
        run_all(|| TimeoutBackend::new(MemoryBackend::new(), Duration::from_secs(5))).await;
    }

    #[tokio::test]
    async fn faulty_backend_without_faults_conforms() {
        run_all(|| FaultyBackend::new(MemoryBackend::new())).await;
    }
}
