//! Browser localStorage backend for WASM.

use super::{KeyValueBackend, StoreError, StoreResult};
use web_sys::Storage;

/// Backend over `window.localStorage`.
///
/// The storage handle is looked up on every call so the backend holds no
/// JS values and stays `Send + Sync`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebStorageBackend;

impl WebStorageBackend {
    pub fn new() -> Self {
        Self
    }

    /// Whether localStorage is reachable in this context.
    pub fn is_available() -> bool {
        storage().is_ok()
    }
}

fn storage() -> StoreResult<Storage> {
    let window = web_sys::window()
        .ok_or_else(|| StoreError::Unavailable("No window object".to_string()))?;
    window
        .local_storage()
        .map_err(|e| StoreError::Unavailable(format!("localStorage error: {:?}", e)))?
        .ok_or_else(|| StoreError::Unavailable("localStorage not available".to_string()))
}

impl KeyValueBackend for WebStorageBackend {
    fn read(&self, key: &str) -> StoreResult<Option<String>> {
        storage()?
            .get_item(key)
            .map_err(|e| StoreError::Unavailable(format!("Failed to read {}: {:?}", key, e)))
    }

    fn write(&self, key: &str, value: &str) -> StoreResult<()> {
        // Quota exceeded surfaces here.
        storage()?
            .set_item(key, value)
            .map_err(|e| StoreError::Unavailable(format!("Failed to write {}: {:?}", key, e)))
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        storage()?
            .remove_item(key)
            .map_err(|e| StoreError::Unavailable(format!("Failed to delete {}: {:?}", key, e)))
    }
}
