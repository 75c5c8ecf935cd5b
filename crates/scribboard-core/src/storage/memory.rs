//! In-memory key-value backend.

use super::{KeyValueBackend, StoreError, StoreResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory backend for tests and ephemeral boards.
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored keys, in no particular order.
    pub fn keys(&self) -> StoreResult<Vec<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        Ok(entries.keys().cloned().collect())
    }
}

impl KeyValueBackend for MemoryBackend {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        entries.remove(key);
        Ok(())
    }
}
