//! In-memory storage backend implementation.
//!
//! This module provides [`MemoryBackend`], an in-memory implementation of
//! [`StorageBackend`] suitable for testing and development.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Ordered storage**: Keys are stored in a [`BTreeMap`] for efficient range queries
//! - **Store-wide revisions**: A single counter is bumped on every write, so revisions are
//!   unique across keys (the same scheme etcd uses for `mod_revision`)
//!
//! # Example
//!
//! ```
//! use coffer_storage::{MemoryBackend, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = MemoryBackend::new();
//!
//!     backend.set(b"greeting".to_vec(), b"hello".to_vec()).await.unwrap();
//!     let value = backend.get(b"greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().value.as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - No replication; only tasks sharing one process (and one clone family) see the same data

use std::{
    collections::BTreeMap,
    ops::{Bound, RangeBounds},
    sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use fail::fail_point;
use parking_lot::RwLock;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    types::{KeyValue, Revision, Versioned},
};

/// Map contents plus the last revision handed out.
///
/// Both live under one lock so that a conditional write checks the current
/// revision and installs the next one in a single critical section.
#[derive(Debug, Default)]
struct Store {
    entries: BTreeMap<Vec<u8>, Versioned>,
    revision: u64,
}

impl Store {
    fn next_revision(&mut self) -> Revision {
        self.revision += 1;
        Revision::new(self.revision)
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> Revision {
        let revision = self.next_revision();
        self.entries.insert(key, Versioned::new(Bytes::from(value), revision));
        revision
    }
}

/// In-memory storage backend using [`BTreeMap`].
///
/// # Cloning
///
/// `MemoryBackend` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying data store, which is how tests simulate several service
/// instances talking to one replicated store.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    store: Arc<RwLock<Store>>,
}

impl MemoryBackend {
    /// Creates a new, empty in-memory storage backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.read().entries.len()
    }

    /// Returns `true` if no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.read().entries.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Versioned>> {
        fail_point!("memory-get", |_| Err(StorageError::connection("injected get failure")));

        let store = self.store.read();
        Ok(store.entries.get(key).cloned())
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len(), value_len = value.len()))]
    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<Revision> {
        fail_point!("memory-set", |_| Err(StorageError::connection("injected set failure")));

        let mut store = self.store.write();
        Ok(store.put(key, value))
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len(), expected = ?expected))]
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<Revision>,
        new_value: Vec<u8>,
    ) -> StorageResult<Revision> {
        fail_point!("memory-compare-and-set", |_| {
            Err(StorageError::connection("injected compare-and-set failure"))
        });

        let mut store = self.store.write();

        let current = store.entries.get(key).map(|v| v.revision);
        if current != expected {
            return Err(StorageError::Conflict);
        }

        Ok(store.put(key.to_vec(), new_value))
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len(), expected = %expected))]
    async fn compare_and_delete(&self, key: &[u8], expected: Revision) -> StorageResult<()> {
        let mut store = self.store.write();

        match store.entries.get(key) {
            Some(current) if current.revision == expected => {
                store.entries.remove(key);
                // Deletes consume a revision too, so a re-created key never
                // reuses a revision a reader may still hold.
                store.next_revision();
                Ok(())
            },
            _ => Err(StorageError::Conflict),
        }
    }

    #[tracing::instrument(skip_all, fields(key_len = key.len()))]
    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        let mut store = self.store.write();
        if store.entries.remove(key).is_some() {
            store.next_revision();
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        let start = match range.start_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        let end = match range.end_bound() {
            Bound::Included(b) => Bound::Included(b.as_slice()),
            Bound::Excluded(b) => Bound::Excluded(b.as_slice()),
            Bound::Unbounded => Bound::Unbounded,
        };

        // BTreeMap::range panics on inverted or doubly-excluded empty bounds.
        if is_empty_range(start, end) {
            return Ok(Vec::new());
        }

        let store = self.store.read();
        let results = store
            .entries
            .range::<[u8], _>((start, end))
            .map(|(k, v)| KeyValue::new(Bytes::copy_from_slice(k), v.value.clone(), v.revision))
            .collect();

        Ok(results)
    }

    async fn health_check(&self) -> StorageResult<()> {
        fail_point!("memory-health-check", |_| {
            Err(StorageError::internal("injected health failure"))
        });

        // Acquire the read lock to verify we're not deadlocked
        let _unused = self.store.read();
        Ok(())
    }
}

fn is_empty_range(start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    match (start, end) {
        (Bound::Excluded(s), Bound::Excluded(e)) => s >= e,
        (Bound::Included(s) | Bound::Excluded(s), Bound::Included(e) | Bound::Excluded(e)) => s > e,
        _ => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::prefix_range;

    #[tokio::test]
    async fn test_basic_operations() {
        let backend = MemoryBackend::new();

        backend.set(b"key1".to_vec(), b"value1".to_vec()).await.unwrap();
        let value = backend.get(b"key1").await.unwrap().unwrap();
        assert_eq!(value.value, Bytes::from("value1"));

        backend.delete(b"key1").await.unwrap();
        assert_eq!(backend.get(b"key1").await.unwrap(), None);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_every_write_produces_a_new_revision() {
        let backend = MemoryBackend::new();

        let r1 = backend.set(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        let r2 = backend.set(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        let r3 = backend.set(b"b".to_vec(), b"1".to_vec()).await.unwrap();

        // Identical bytes still get a fresh revision.
        assert_ne!(r1, r2);
        assert_ne!(r2, r3);
        assert_eq!(backend.get(b"a").await.unwrap().unwrap().revision, r2);
    }

    #[tokio::test]
    async fn test_compare_and_set_success() {
        let backend = MemoryBackend::new();
        let rev = backend.set(b"key".to_vec(), b"value1".to_vec()).await.unwrap();

        let next = backend.compare_and_set(b"key", Some(rev), b"value2".to_vec()).await.unwrap();

        let current = backend.get(b"key").await.unwrap().unwrap();
        assert_eq!(current.value, Bytes::from("value2"));
        assert_eq!(current.revision, next);
    }

    #[tokio::test]
    async fn test_compare_and_set_stale_revision_conflicts() {
        let backend = MemoryBackend::new();
        let stale = backend.set(b"key".to_vec(), b"value1".to_vec()).await.unwrap();
        backend.set(b"key".to_vec(), b"value1".to_vec()).await.unwrap();

        // Same bytes, different revision: the write must be rejected.
        let result = backend.compare_and_set(b"key", Some(stale), b"value2".to_vec()).await;
        assert!(matches!(result, Err(StorageError::Conflict)));

        let current = backend.get(b"key").await.unwrap().unwrap();
        assert_eq!(current.value, Bytes::from("value1"));
    }

    #[tokio::test]
    async fn test_compare_and_set_insert_if_absent() {
        let backend = MemoryBackend::new();

        backend.compare_and_set(b"new_key", None, b"value".to_vec()).await.unwrap();
        let again = backend.compare_and_set(b"new_key", None, b"other".to_vec()).await;

        assert!(matches!(again, Err(StorageError::Conflict)));
        let current = backend.get(b"new_key").await.unwrap().unwrap();
        assert_eq!(current.value, Bytes::from("value"));
    }

    #[tokio::test]
    async fn test_compare_and_set_missing_key_with_expected_revision() {
        let backend = MemoryBackend::new();

        let result =
            backend.compare_and_set(b"missing", Some(Revision::new(1)), b"new".to_vec()).await;

        assert!(matches!(result, Err(StorageError::Conflict)));
        assert_eq!(backend.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let backend = MemoryBackend::new();
        let stale = backend.set(b"key".to_vec(), b"v1".to_vec()).await.unwrap();
        let current = backend.set(b"key".to_vec(), b"v2".to_vec()).await.unwrap();

        let rejected = backend.compare_and_delete(b"key", stale).await;
        assert!(matches!(rejected, Err(StorageError::Conflict)));
        assert!(backend.get(b"key").await.unwrap().is_some());

        backend.compare_and_delete(b"key", current).await.unwrap();
        assert_eq!(backend.get(b"key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_recreated_key_gets_fresh_revision() {
        let backend = MemoryBackend::new();
        let first = backend.compare_and_set(b"key", None, b"v".to_vec()).await.unwrap();
        backend.compare_and_delete(b"key", first).await.unwrap();

        let second = backend.compare_and_set(b"key", None, b"v".to_vec()).await.unwrap();

        assert_ne!(first, second);
        let stale = backend.compare_and_set(b"key", Some(first), b"w".to_vec()).await;
        assert!(matches!(stale, Err(StorageError::Conflict)));
    }

    #[tokio::test]
    async fn test_range_operations() {
        let backend = MemoryBackend::new();

        backend.set(b"a".to_vec(), b"1".to_vec()).await.unwrap();
        backend.set(b"b".to_vec(), b"2".to_vec()).await.unwrap();
        backend.set(b"c".to_vec(), b"3".to_vec()).await.unwrap();

        let range = backend.get_range(b"a".to_vec()..b"c".to_vec()).await.unwrap();
        assert_eq!(range.len(), 2);
        assert_eq!(range[0].key, Bytes::from("a"));
        assert_eq!(range[1].key, Bytes::from("b"));
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let backend = MemoryBackend::new();

        backend.set(b"deposits/a/1".to_vec(), b"x".to_vec()).await.unwrap();
        backend.set(b"deposits/a/2".to_vec(), b"y".to_vec()).await.unwrap();
        backend.set(b"deposits/ab/1".to_vec(), b"z".to_vec()).await.unwrap();
        backend.set(b"deposits/b/1".to_vec(), b"w".to_vec()).await.unwrap();

        let results = backend.get_range(prefix_range(b"deposits/a/")).await.unwrap();
        let keys: Vec<_> = results.iter().map(|kv| kv.key.clone()).collect();
        assert_eq!(keys, vec![Bytes::from("deposits/a/1"), Bytes::from("deposits/a/2")]);
    }

    #[tokio::test]
    async fn test_inverted_range_is_empty() {
        let backend = MemoryBackend::new();
        backend.set(b"m".to_vec(), b"1".to_vec()).await.unwrap();

        let results = backend
            .get_range((Bound::Included(b"z".to_vec()), Bound::Excluded(b"a".to_vec())))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = MemoryBackend::new();
        assert!(backend.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_clone_shares_data() {
        let backend1 = MemoryBackend::new();
        let backend2 = backend1.clone();

        backend1.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();

        let value = backend2.get(b"key").await.unwrap().unwrap();
        assert_eq!(value.value, Bytes::from("value"));
        assert_eq!(backend2.len(), 1);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        /// Strategy for generating a sorted, deduplicated set of keys.
        fn arb_sorted_keys() -> impl Strategy<Value = Vec<Vec<u8>>> {
            proptest::collection::vec(proptest::collection::vec(any::<u8>(), 1..16), 0..30)
                .prop_map(|mut keys| {
                    keys.sort();
                    keys.dedup();
                    keys
                })
        }

        proptest! {
            /// The count of keys returned by `get_range` must equal the count of
            /// stored keys that fall within the bounds, and results are sorted.
            #[test]
            fn range_query_matches_model(
                keys in arb_sorted_keys(),
                a in proptest::collection::vec(any::<u8>(), 1..8),
                b in proptest::collection::vec(any::<u8>(), 1..8),
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async {
                    let backend = MemoryBackend::new();
                    for key in &keys {
                        backend.set(key.clone(), b"v".to_vec()).await.unwrap();
                    }

                    let (start, end) = if a <= b { (a, b) } else { (b, a) };

                    let results = backend.get_range(start.clone()..end.clone()).await.unwrap();
                    let expected_count = keys
                        .iter()
                        .filter(|k| **k >= start && **k < end)
                        .count();
                    prop_assert_eq!(results.len(), expected_count);
                    for pair in results.windows(2) {
                        prop_assert!(pair[0].key < pair[1].key);
                    }

                    Ok(())
                })?;
            }

            /// A chain of conditional writes, each guarded by the previous
            /// revision, always succeeds; replaying any older revision fails.
            #[test]
            fn stale_revisions_never_win(updates in 1usize..20, replay in 0usize..20) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("runtime");

                rt.block_on(async {
                    let backend = MemoryBackend::new();
                    let first = backend.compare_and_set(b"k", None, b"0".to_vec()).await.unwrap();
                    let mut seen = vec![first];
                    for i in 1..=updates {
                        let prev = *seen.last().unwrap();
                        let next = backend
                            .compare_and_set(b"k", Some(prev), i.to_string().into_bytes())
                            .await
                            .unwrap();
                        seen.push(next);
                    }

                    let stale = seen[replay.min(seen.len() - 2)];
                    let result = backend.compare_and_set(b"k", Some(stale), b"x".to_vec()).await;
                    prop_assert!(matches!(result, Err(StorageError::Conflict)));

                    Ok(())
                })?;
            }
        }
    }
}
