//! Key/value persistence port for server configurations.
//!
//! The manager persists configs through this trait; durability and on-disk
//! format are the embedder's concern. A hash-map backed implementation is
//! provided for tests and embedders that do not need persistence.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by config store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with the given id exists under the kind.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Key/value persistence interface for server configurations.
///
/// Records are grouped by `kind` (a namespace string) and addressed by id.
/// Values are opaque JSON documents; the store never interprets them.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch every record of a kind as `(id, value)` pairs.
    async fn get_all(&self, kind: &str) -> Result<Vec<(String, Value)>, StoreError>;

    /// Insert or replace one record.
    async fn set(&self, kind: &str, id: &str, value: Value) -> Result<(), StoreError>;

    /// Delete one record. Deleting an absent record is a no-op.
    async fn delete(&self, kind: &str, id: &str) -> Result<(), StoreError>;
}

/// In-memory `ConfigStore` for tests and ephemeral embedders.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    records: Mutex<HashMap<(String, String), Value>>,
}

impl MemoryConfigStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get_all(&self, kind: &str) -> Result<Vec<(String, Value)>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(records
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|((_, id), value)| (id.clone(), value.clone()))
            .collect())
    }

    async fn set(&self, kind: &str, id: &str, value: Value) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        records.insert((kind.to_string(), id.to_string()), value);
        Ok(())
    }

    async fn delete(&self, kind: &str, id: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        records.remove(&(kind.to_string(), id.to_string()));
        Ok(())
    }
}
