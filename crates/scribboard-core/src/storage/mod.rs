//! Stroke storage: one interface, local and remote adapters.

mod local;
mod memory;
mod remote;
mod snapshot;
mod subscription;

#[cfg(not(target_arch = "wasm32"))]
mod file;

#[cfg(target_arch = "wasm32")]
mod web;

pub use local::{LocalStrokeStore, board_key};
pub use memory::MemoryBackend;
pub use remote::RemoteStrokeStore;
pub use snapshot::{decode_snapshot, encode_snapshot};
pub use subscription::{ChangeCallback, SubscriberRegistry, Subscription};

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileBackend;

#[cfg(target_arch = "wasm32")]
pub use web::WebStorageBackend;

use crate::stroke::{Stroke, StrokeId};
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed snapshot for board {board}: {reason}")]
    MalformedSnapshot { board: String, reason: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Rejected by server: {0}")]
    Rejected(String),
}

/// Whether a store can currently deliver writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Ready,
    /// Writes are being kept until the store is reachable again.
    Offline { queued: usize },
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only stroke persistence with change notification.
///
/// Every notification carries the full, ordered stroke list of the board.
pub trait StrokeStore: Send + Sync {
    /// Persist one committed stroke at the end of the board.
    fn append(&self, board_id: &str, stroke: &Stroke) -> StoreResult<()>;

    /// Watch a board. The returned handle unsubscribes when dropped.
    ///
    /// If the current snapshot is known it is delivered before returning.
    fn subscribe(&self, board_id: &str, on_change: ChangeCallback) -> StoreResult<Subscription>;

    /// Remove strokes by id (scribble erase). Unknown ids are ignored.
    fn remove(&self, board_id: &str, ids: &[StrokeId]) -> StoreResult<()>;

    /// Remove every stroke from the board.
    fn clear(&self, board_id: &str) -> StoreResult<()>;

    /// Deliver completed asynchronous work. Local stores have none.
    fn poll(&self) {}

    fn status(&self) -> StoreStatus {
        StoreStatus::Ready
    }

    /// Errors reported asynchronously since the last call.
    fn take_errors(&self) -> Vec<StoreError> {
        Vec::new()
    }
}

/// Synchronous key-value backend used by the local adapter.
pub trait KeyValueBackend: Send + Sync {
    fn read(&self, key: &str) -> StoreResult<Option<String>>;

    fn write(&self, key: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, key: &str) -> StoreResult<()>;
}
