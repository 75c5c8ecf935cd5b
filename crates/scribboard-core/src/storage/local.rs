//! Local-device stroke store over a key-value backend.

use super::snapshot::{decode_snapshot, encode_snapshot};
use super::{
    ChangeCallback, KeyValueBackend, StoreError, StoreResult, StrokeStore, SubscriberRegistry,
    Subscription,
};
use crate::stroke::{Stroke, StrokeId};
use std::sync::Mutex;

/// Storage key for a board.
pub fn board_key(board_id: &str) -> String {
    format!("board-{}", board_id)
}

fn corrupt_key(board_id: &str) -> String {
    format!("{}.corrupt", board_key(board_id))
}

/// Stroke store persisting each board as one JSON array.
///
/// Every write re-serialises the whole board. Subscribers are notified
/// synchronously, after the write lock is released.
pub struct LocalStrokeStore<B: KeyValueBackend> {
    backend: B,
    subscribers: SubscriberRegistry,
    write_lock: Mutex<()>,
}

impl<B: KeyValueBackend> LocalStrokeStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            subscribers: SubscriberRegistry::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Current strokes of a board, oldest first.
    ///
    /// A payload that is not a stroke list is moved aside and the board
    /// reads as empty.
    pub fn load(&self, board_id: &str) -> StoreResult<Vec<Stroke>> {
        let Some(payload) = self.backend.read(&board_key(board_id))? else {
            return Ok(Vec::new());
        };

        match decode_snapshot(board_id, &payload) {
            Ok(strokes) => Ok(strokes),
            Err(e @ StoreError::MalformedSnapshot { .. }) => {
                log::warn!("{}; backing up as {}", e, corrupt_key(board_id));
                self.backend.write(&corrupt_key(board_id), &payload)?;
                self.backend.remove(&board_key(board_id))?;
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write a board under the write lock, then notify.
    fn update<F>(&self, board_id: &str, edit: F) -> StoreResult<()>
    where
        F: FnOnce(&mut Vec<Stroke>) -> bool,
    {
        let strokes = {
            let _guard = self
                .write_lock
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;

            let mut strokes = self.load(board_id)?;
            if !edit(&mut strokes) {
                return Ok(());
            }
            self.backend.write(&board_key(board_id), &encode_snapshot(&strokes)?)?;
            strokes
        };

        self.subscribers.notify(board_id, &strokes);
        Ok(())
    }
}

impl<B: KeyValueBackend> StrokeStore for LocalStrokeStore<B> {
    fn append(&self, board_id: &str, stroke: &Stroke) -> StoreResult<()> {
        self.update(board_id, |strokes| {
            strokes.push(stroke.clone());
            true
        })?;
        log::debug!("Appended stroke {} to board {}", stroke.id(), board_id);
        Ok(())
    }

    fn subscribe(&self, board_id: &str, on_change: ChangeCallback) -> StoreResult<Subscription> {
        let strokes = self.load(board_id)?;
        let subscription = self.subscribers.subscribe(board_id, on_change);
        self.subscribers.notify_one(&subscription, &strokes);
        Ok(subscription)
    }

    fn remove(&self, board_id: &str, ids: &[StrokeId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.update(board_id, |strokes| {
            let before = strokes.len();
            strokes.retain(|s| !ids.contains(&s.id()));
            strokes.len() != before
        })
    }

    fn clear(&self, board_id: &str) -> StoreResult<()> {
        self.update(board_id, |strokes| {
            strokes.clear();
            true
        })
    }
}
