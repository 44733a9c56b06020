//! Common types used across storage operations.
//!
//! This module defines the revision marker attached to every stored value and
//! the shapes returned from point reads and range scans.

use std::ops::Bound;

use bytes::Bytes;

/// Opaque revision marker attached to a stored value.
///
/// Every successful write to a key produces a new revision. Two reads of the
/// same key observe the same revision if and only if no write landed in
/// between, which makes the revision the guard for
/// [`compare_and_set`](crate::StorageBackend::compare_and_set).
///
/// Revisions are only meaningful for equality comparison against values
/// previously returned by the same backend. Callers must not derive ordering
/// or arithmetic from them.
///
/// # Examples
///
/// ```
/// use coffer_storage::Revision;
///
/// let rev = Revision::new(7);
/// assert_eq!(rev.get(), 7);
/// assert_eq!(rev.to_string(), "7");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Revision(u64);

impl Revision {
    /// Wraps a backend-specific revision number.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the backend-specific revision number.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored value together with the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// The stored bytes.
    pub value: Bytes,

    /// Revision of the write that produced `value`.
    pub revision: Revision,
}

impl Versioned {
    /// Creates a new versioned value.
    pub fn new(value: Bytes, revision: Revision) -> Self {
        Self { value, revision }
    }
}

/// Key-value pair returned from range queries.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use coffer_storage::{KeyValue, Revision};
///
/// let kv = KeyValue {
///     key: Bytes::from("accounts/42"),
///     value: Bytes::from(r#"{"balance":1000}"#),
///     revision: Revision::new(3),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// The key identifying this entry.
    pub key: Bytes,

    /// The value stored at this key.
    pub value: Bytes,

    /// Revision of the write that produced `value`.
    pub revision: Revision,
}

impl KeyValue {
    /// Creates a new key-value pair.
    pub fn new(key: Bytes, value: Bytes, revision: Revision) -> Self {
        Self { key, value, revision }
    }
}

/// Builds the range covering every key that starts with `prefix`.
///
/// The upper bound is the smallest byte string greater than every key with
/// the prefix: trailing `0xFF` bytes are dropped and the last remaining byte
/// is incremented. A prefix made only of `0xFF` bytes (or an empty prefix)
/// has no upper bound.
///
/// # Examples
///
/// ```
/// use std::ops::Bound;
/// use coffer_storage::prefix_range;
///
/// let (start, end) = prefix_range(b"deposits/");
/// assert_eq!(start, Bound::Included(b"deposits/".to_vec()));
/// assert_eq!(end, Bound::Excluded(b"deposits0".to_vec()));
/// ```
#[must_use]
pub fn prefix_range(prefix: &[u8]) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    let start = Bound::Included(prefix.to_vec());

    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return (start, Bound::Excluded(upper));
        }
    }

    (start, Bound::Unbounded)
}
