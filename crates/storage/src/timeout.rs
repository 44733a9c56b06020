//! Per-call deadline enforcement for storage backends.
//!
//! [`TimeoutBackend`] wraps any [`StorageBackend`] and bounds every call with
//! [`tokio::time::timeout`]. A call that exceeds the deadline is abandoned and
//! reported as [`StorageError::Timeout`]. The wrapper never retries: whether a
//! timed-out operation should be repeated is the caller's decision.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use coffer_storage::{MemoryBackend, StorageBackend, TimeoutBackend};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let backend = TimeoutBackend::new(MemoryBackend::new(), Duration::from_secs(5));
//! backend.set(b"key".to_vec(), b"value".to_vec()).await.unwrap();
//! # });
//! ```

use std::{future::Future, ops::RangeBounds, time::Duration};

use async_trait::async_trait;

use crate::{
    backend::StorageBackend,
    error::{StorageError, StorageResult},
    types::{KeyValue, Revision, Versioned},
};

/// A [`StorageBackend`] wrapper that bounds every call with a fixed deadline.
#[derive(Debug, Clone)]
pub struct TimeoutBackend<B> {
    inner: B,
    timeout: Duration,
}

impl<B> TimeoutBackend<B> {
    /// Wraps `inner`, bounding each call by `timeout`.
    pub fn new(inner: B, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Returns the per-call deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns a reference to the wrapped backend.
    pub fn inner(&self) -> &B {
        &self.inner
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>> + Send,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_elapsed) => {
                tracing::warn!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "storage operation timed out",
                );
                Err(StorageError::timeout())
            },
        }
    }
}

#[async_trait]
impl<B: StorageBackend> StorageBackend for TimeoutBackend<B> {
    async fn get(&self, key: &[u8]) -> StorageResult<Option<Versioned>> {
        self.bounded("get", self.inner.get(key)).await
    }

    async fn set(&self, key: Vec<u8>, value: Vec<u8>) -> StorageResult<Revision> {
        self.bounded("set", self.inner.set(key, value)).await
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<Revision>,
        new_value: Vec<u8>,
    ) -> StorageResult<Revision> {
        self.bounded("compare_and_set", self.inner.compare_and_set(key, expected, new_value)).await
    }

    async fn compare_and_delete(&self, key: &[u8], expected: Revision) -> StorageResult<()> {
        self.bounded("compare_and_delete", self.inner.compare_and_delete(key, expected)).await
    }

    async fn delete(&self, key: &[u8]) -> StorageResult<()> {
        self.bounded("delete", self.inner.delete(key)).await
    }

    async fn get_range<R>(&self, range: R) -> StorageResult<Vec<KeyValue>>
    where
        R: RangeBounds<Vec<u8>> + Send,
    {
        self.bounded("get_range", self.inner.get_range(range)).await
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.bounded("health_check", self.inner.health_check()).await
    }
}
