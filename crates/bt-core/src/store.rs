//! Key/value persistence seam for session snapshots.

use std::collections::BTreeMap;
use std::error::Error as StdError;

use thiserror::Error;

/// Storage backend failure.
#[derive(Debug, Error)]
#[error("store unavailable: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// A string-keyed store of opaque blobs.
///
/// This trait allows the session controller to work with different backends
/// (e.g., the `SQLite` database in bt-db, or [`MemoryStore`] in tests).
pub trait BlobStore {
    /// Returns the blob stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Stores `blob` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError>;

    /// Removes `key`. Returns whether a value was present.
    fn remove(&mut self, key: &str) -> Result<bool, StoreError>;

    /// Lists every stored key.
    fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// In-memory [`BlobStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    blobs: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.blobs.get(key).cloned())
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError> {
        self.blobs.insert(key.to_string(), blob.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.blobs.remove(key).is_some())
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.blobs.keys().cloned().collect())
    }
}
