//! Shared test utilities for storage backend testing.
//!
//! This module provides a fault-injecting backend wrapper and an
//! assertion macro. It is feature-gated behind `testutil` to prevent leaking
//! into production builds.
//!
//! # Usage
//!
//! In integration tests of dependent crates, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! coffer-storage = { path = "../storage", features = ["testutil"] }
//! ```

use std::{
    future::Future,
    ops::RangeBounds,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    StorageBackend,
    error::{StorageError, StorageResult},
    memory::MemoryBackend,
    types::{KeyValue, Revision, Versioned},
};

/// Assert that a [`StorageResult`] is an error matching the given pattern.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use coffer_storage::{StorageError, assert_storage_error};
///
/// let result: Result<(), StorageError> = Err(StorageError::Conflict);
/// assert_storage_error!(result, StorageError::Conflict);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {},
            other => panic!("expected Err({}), got {:?}", stringify!($pattern), other),
        }
    };
}

/// Action run once, immediately before the next conditional write.
type Interleave = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// A wrapper that injects faults into an inner backend.
///
/// Clones share their fault configuration, so a test can keep one handle to
/// reconfigure faults while another handle is owned by the code under test.
///
/// Supported faults:
///
/// - **Delay**: every call sleeps before delegating (drives timeouts).
/// - **Failing reads**: `get` and `get_range` return [`StorageError::Connection`].
/// - **Failing writes by prefix**: `set` and `compare_and_set` on keys with a registered prefix
///   return [`StorageError::Connection`].
/// - **Injected conflicts**: the next `n` conditional writes or deletes find the key rewritten
///   by a phantom concurrent writer, so they fail with [`StorageError::Conflict`].
/// - **Stalled acknowledgements**: a conditional write to a key with a registered prefix is
///   applied, then the call sleeps before returning, so a caller's deadline can expire after
///   the write already landed.
/// - **Interleave**: an arbitrary async action runs once before the next conditional write or
///   delete, modelling a competing request that lands between a read and its write.
#[derive(Clone)]
pub struct FaultyBackend<B = MemoryBackend> {
    inner: B,
    delay: Arc<Mutex<Duration>>,
    fail_reads: Arc<AtomicBool>,
    failing_write_prefixes: Arc<Mutex<Vec<Vec<u8>>>>,
    injected_conflicts: Arc<AtomicUsize>,
    interleave: Arc<Mutex<Option<Interleave>>>,
    stalled_acks: Arc<Mutex<Vec<(Vec<u8>, Duration)>>>,
    compare_and_set_calls: Arc<AtomicUsize>,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner` with no faults configured.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            delay: Arc::new(Mutex::new(Duration::ZERO)),
            fail_reads: Arc::new(AtomicBool::new(false)),
            failing_write_prefixes: Arc::new(Mutex::new(Vec::new())),
            injected_conflicts: Arc::new(AtomicUsize::new(0)),
            interleave: Arc::new(Mutex::new(None)),
            stalled_acks: Arc::new(Mutex::new(Vec::new())),
            compare_and_set_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    /// Delays every subsequent call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    /// Makes reads fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Makes writes to keys starting with `prefix` fail.
    pub fn fail_writes_with_prefix(&self, prefix: impl Into<Vec<u8>>) {
        self.failing_write_prefixes.lock().push(prefix.into());
    }

    /// Makes the next `count` conditional writes lose to a phantom writer.
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::Relaxed);
    }

    /// Applies conditional writes to keys starting with `prefix`, then holds
    /// the reply back for `stall`.
    pub fn stall_acks_with_prefix(&self, prefix: impl Into<Vec<u8>>, stall: Duration) {
        self.stalled_acks.lock().push((prefix.into(), stall));
    }

    /// Runs `action` once, right before the next conditional write.
    pub fn interleave_once<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.interleave.lock() = Some(Box::new(move || Box::pin(action())));
    }

    /// Number of `compare_and_set` calls observed so far.
    #[must_use]
    pub fn compare_and_set_calls(&self) -> usize {
        self.compare_and_set_calls.load(Ordering::Relaxed)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(StorageError::connection("injected read failure"));
        }
        Ok(())
    }

    fn check_write(&self, key: &[u8]) -> StorageResult<()> {
        if self.failing_write_prefixes.lock().iter().any(|p| key.starts_with(p)) {
            return Err(StorageError::connection("injected write failure"));
        }
        Ok(())
    }

    async fn stall_ack(&self, key: &[u8]) {
        let stall = self
            .stalled_acks
            .lock()
            .iter()
            .find(|(prefix, _)| key.starts_with(prefix))
            .map(|(_, stall)| *stall);
        if let Some(stall) = stall {
            tokio::time::sleep(stall).await;
        }
    }

    /// Runs the pending interleave action, then lets an injected phantom
    /// writer rewrite `key` with its current bytes so its revision moves on.
    async fn before_conditional_write(&self, key: &[u8]) -> StorageResult<()> {
        let action = self.interleave.lock().take();
        if let Some(action) = action {
            action().await;
        }

        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if injected && let Some(current) = self.inner.get(key).await? {
            self.inner.set(key.to_vec(), current.value.to_vec()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Versioned>> {
        self.pause().await;
        self.check_reads()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<Revision> {
        self.pause().await;
        self.check_write(&key)?;
        self.inner.set(key, value).await
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<Revision>,
        new_value: Vec<u8>,
    ) -> StorageResult<Revision> {
        self.pause().await;
        self.compare_and_set_calls.fetch_add(1, Ordering::Relaxed);
        self.check_write(key)?;
        self.before_conditional_write(key).await?;
        let revision = self.inner.compare_and_set(key, expected, new_value).await?;
        self.stall_ack(key).await;
        Ok(revision)
    }

    async fn compare_and_delete(&self, key: &[u8], expected: Revision) -> StorageResult<()> {
        self.pause().await;
        self.check_write(key)?;
        self.before_conditional_write(key).await?;
        self.inner.compare_and_delete(key, expected).await?;
        self.stall_ack(key).await;
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.pause().await;
        self.check_write(key)?;
        self.inner.delete(key).await
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        self.pause().await;
        self.check_reads()?;
        self.inner.get_range(range).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.pause().await;
        self.inner.health_check().await
    }
}
