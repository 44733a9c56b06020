//! Optimistic read-modify-write over a single key.
//!
//! [`update`] reads a record together with its revision, hands it to a
//! caller-supplied transition, and commits the transition's decision with a
//! write conditioned on that revision. If another writer got there first the
//! whole cycle starts again from a fresh read, so the transition always
//! decides against current data.
//!
//! # Retry Policy
//!
//! - Only [`StorageError::Conflict`] is retried, up to `max_attempts` cycles in total.
//! - There is no backoff: conflicts are short in-store races, not congestion.
//! - An error returned by the transition ends the loop immediately.
//! - Any other storage failure (including a timeout) ends the loop immediately as
//!   [`LedgerError::StoreUnavailable`].

use coffer_storage::{StorageBackend, StorageError};
use fail::fail_point;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec,
    error::{LedgerError, Result},
    metrics::LedgerMetrics,
};

/// What a transition wants written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Mutation<T> {
    /// Replace the record with a new value.
    Replace(T),
    /// Delete the record.
    Remove,
}

/// Result of a committed cycle.
#[derive(Debug)]
pub(crate) struct Committed<O> {
    /// Whatever the winning transition returned alongside its mutation.
    pub(crate) output: O,
    /// Cycles run, the committing one included.
    pub(crate) attempts: u32,
}

/// Runs the read-transition-conditional-write cycle on `key`.
///
/// `missing` builds the error returned when the key holds no record.
#[tracing::instrument(
    skip_all,
    fields(key = %String::from_utf8_lossy(key), max_attempts = max_attempts),
)]
pub(crate) async fn update<B, T, O, M, F>(
    backend: &B,
    key: &[u8],
    max_attempts: u32,
    metrics: &LedgerMetrics,
    missing: M,
    mut transition: F,
) -> Result<Committed<O>>
where
    B: StorageBackend,
    T: Serialize + DeserializeOwned,
    M: Fn() -> LedgerError,
    F: FnMut(T) -> Result<(Mutation<T>, O)>,
{
    for attempt in 1..=max_attempts {
        let Some(current) = backend.get(key).await? else {
            return Err(missing());
        };
        let record: T = codec::decode(key, &current.value)?;
        let (mutation, output) = transition(record)?;

        fail_point!("occ-before-write", |_| {
            Err(LedgerError::from(StorageError::connection("injected conditional write failure")))
        });

        let written = match &mutation {
            Mutation::Replace(next) => {
                let bytes = codec::encode(key, next)?;
                backend.compare_and_set(key, Some(current.revision), bytes).await.map(|_| ())
            },
            Mutation::Remove => backend.compare_and_delete(key, current.revision).await,
        };

        match written {
            Ok(()) => {
                metrics.record_commit();
                if attempt > 1 {
                    tracing::debug!(attempt, "conditional write committed after retry");
                }
                return Ok(Committed { output, attempts: attempt });
            },
            Err(StorageError::Conflict) if attempt < max_attempts => {
                metrics.record_conflict();
                tracing::debug!(
                    attempt,
                    max_attempts,
                    read_revision = %current.revision,
                    "revision conflict, re-reading",
                );
            },
            Err(StorageError::Conflict) => {
                metrics.record_conflict_exhausted();
                tracing::warn!(attempts = max_attempts, "revision conflicts exhausted attempts");
                return Err(LedgerError::ConcurrentUpdateConflict { attempts: max_attempts });
            },
            Err(e) => return Err(e.into()),
        }
    }

    Err(LedgerError::ConcurrentUpdateConflict { attempts: max_attempts })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use coffer_storage::{MemoryBackend, testutil::FaultyBackend};

    use super::*;

    const KEY: &[u8] = b"counter";

    fn missing() -> LedgerError {
        LedgerError::invalid_amount("missing")
    }

    async fn seeded(value: u64) -> FaultyBackend {
        let backend = FaultyBackend::new(MemoryBackend::new());
        backend.set(KEY.to_vec(), codec::encode(KEY, &value).unwrap()).await.unwrap();
        backend
    }

    async fn read(backend: &FaultyBackend) -> u64 {
        let current = backend.get(KEY).await.unwrap().unwrap();
        codec::decode(KEY, &current.value).unwrap()
    }

    #[tokio::test]
    async fn test_commits_on_first_attempt() {
        let backend = seeded(10).await;
        let metrics = LedgerMetrics::new();

        let committed = update(&backend, KEY, 5, &metrics, missing, |n: u64| {
            Ok((Mutation::Replace(n + 1), n + 1))
        })
        .await
        .unwrap();

        assert_eq!(committed.output, 11);
        assert_eq!(committed.attempts, 1);
        assert_eq!(read(&backend).await, 11);
        assert_eq!(metrics.snapshot().commits, 1);
    }

    #[tokio::test]
    async fn test_conflict_rereads_and_retries() {
        let backend = seeded(10).await;
        let competitor = backend.inner().clone();
        backend.interleave_once(move || async move {
            competitor.set(KEY.to_vec(), codec::encode(KEY, &100u64).unwrap()).await.unwrap();
        });
        let metrics = LedgerMetrics::new();
        let mut seen = Vec::new();

        let committed = update(&backend, KEY, 5, &metrics, missing, |n: u64| {
            seen.push(n);
            Ok((Mutation::Replace(n + 1), ()))
        })
        .await
        .unwrap();

        assert_eq!(committed.attempts, 2);
        assert_eq!(seen, vec![10, 100]);
        assert_eq!(read(&backend).await, 101);
        assert_eq!(metrics.snapshot().conflict_retries, 1);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_conflict() {
        let backend = seeded(10).await;
        backend.inject_conflicts(usize::MAX);
        let metrics = LedgerMetrics::new();

        let err = update(&backend, KEY, 3, &metrics, missing, |n: u64| {
            Ok((Mutation::Replace(n + 1), ()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LedgerError::ConcurrentUpdateConflict { attempts: 3 }));
        assert_eq!(backend.compare_and_set_calls(), 3);
        assert_eq!(read(&backend).await, 10);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.conflict_retries, 2);
        assert_eq!(snapshot.conflicts_exhausted, 1);
    }

    #[tokio::test]
    async fn test_transition_error_short_circuits() {
        let backend = seeded(10).await;
        let calls = AtomicU32::new(0);

        let err = update(&backend, KEY, 5, &LedgerMetrics::new(), missing, |_: u64| {
            calls.fetch_add(1, Ordering::Relaxed);
            Err::<(Mutation<u64>, ()), _>(LedgerError::InsufficientFunds {
                requested: 20,
                available: 10,
            })
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(backend.compare_and_set_calls(), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_retried() {
        let backend = seeded(10).await;
        backend.fail_writes_with_prefix(KEY);
        let calls = AtomicU32::new(0);

        let err = update(&backend, KEY, 5, &LedgerMetrics::new(), missing, |n: u64| {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok((Mutation::Replace(n + 1), ()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LedgerError::StoreUnavailable { .. }));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_missing_record_uses_missing_error() {
        let backend = FaultyBackend::new(MemoryBackend::new());

        let err = update(&backend, KEY, 5, &LedgerMetrics::new(), missing, |n: u64| {
            Ok((Mutation::Replace(n), ()))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LedgerError::InvalidAmount { reason: "missing" }));
    }

    #[tokio::test]
    async fn test_remove_is_guarded_by_revision() {
        let backend = seeded(10).await;
        let competitor = backend.inner().clone();
        backend.interleave_once(move || async move {
            competitor.set(KEY.to_vec(), codec::encode(KEY, &11u64).unwrap()).await.unwrap();
        });
        let mut seen = Vec::new();

        let committed = update(&backend, KEY, 5, &LedgerMetrics::new(), missing, |n: u64| {
            seen.push(n);
            Ok((Mutation::Remove, n))
        })
        .await
        .unwrap();

        assert_eq!(seen, vec![10, 11]);
        assert_eq!(committed.output, 11);
        assert_eq!(committed.attempts, 2);
        assert!(backend.get(KEY).await.unwrap().is_none());
    }
}
