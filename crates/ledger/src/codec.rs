//! JSON encoding of ledger records.
//!
//! Records are stored as `serde_json` documents. A record that cannot be
//! encoded or decoded is reported as [`LedgerError::CorruptRecord`] together
//! with the key it was bound for or read from. Neither case touches the store.

use serde::{Serialize, de::DeserializeOwned};

use crate::error::{LedgerError, Result};

pub(crate) fn encode<T: Serialize>(key: &[u8], record: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(record)
        .map_err(|e| LedgerError::corrupt_record(String::from_utf8_lossy(key), e))
}

pub(crate) fn decode<T: DeserializeOwned>(key: &[u8], bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| LedgerError::corrupt_record(String::from_utf8_lossy(key), e))
}
