//! Board change subscriptions.

use crate::stroke::Stroke;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

/// Callback receiving the full stroke list of a board after every change.
pub type ChangeCallback = Box<dyn FnMut(&[Stroke]) + Send>;

type SharedCallback = Arc<Mutex<ChangeCallback>>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    boards: HashMap<String, Vec<(u64, SharedCallback)>>,
}

/// Subscribers keyed by board id.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for `board_id`.
    pub fn subscribe(&self, board_id: &str, on_change: ChangeCallback) -> Subscription {
        let mut registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        registry.next_id += 1;
        let id = registry.next_id;
        registry
            .boards
            .entry(board_id.to_string())
            .or_default()
            .push((id, Arc::new(Mutex::new(on_change))));

        Subscription {
            id,
            board_id: board_id.to_string(),
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver `strokes` to every subscriber of `board_id`.
    ///
    /// Callbacks run without the registry lock held, so they may subscribe
    /// or drop subscriptions.
    pub fn notify(&self, board_id: &str, strokes: &[Stroke]) {
        let callbacks: Vec<SharedCallback> = {
            let registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            registry
                .boards
                .get(board_id)
                .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default()
        };

        for callback in callbacks {
            match callback.lock() {
                Ok(mut callback) => callback(strokes),
                Err(_) => log::warn!("Skipping poisoned subscriber for board {}", board_id),
            }
        }
    }

    /// Deliver `strokes` to one subscription only.
    pub fn notify_one(&self, subscription: &Subscription, strokes: &[Stroke]) {
        let callback = {
            let registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            registry.boards.get(&subscription.board_id).and_then(|subs| {
                subs.iter()
                    .find(|(id, _)| *id == subscription.id)
                    .map(|(_, cb)| Arc::clone(cb))
            })
        };

        if let Some(callback) = callback {
            if let Ok(mut callback) = callback.lock() {
                callback(strokes);
            }
        }
    }

    pub fn has_subscribers(&self, board_id: &str) -> bool {
        let registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        registry.boards.get(board_id).is_some_and(|subs| !subs.is_empty())
    }

    /// Board ids with at least one subscriber.
    pub fn boards(&self) -> Vec<String> {
        let registry = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        registry.boards.keys().cloned().collect()
    }
}

/// Handle to a board subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    board_id: String,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn board_id(&self) -> &str {
        &self.board_id
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(self) {}
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("board_id", &self.board_id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let mut registry = registry.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(subs) = registry.boards.get_mut(&self.board_id) {
            subs.retain(|(id, _)| *id != self.id);
            if subs.is_empty() {
                registry.boards.remove(&self.board_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{InkColor, StrokePoint};

    fn stroke() -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(0.0, 0.0), StrokePoint::new(1.0, 1.0)],
            InkColor::BLACK,
            3.0,
            false,
        )
        .unwrap()
    }

    fn counter() -> (Arc<Mutex<usize>>, ChangeCallback) {
        let count = Arc::new(Mutex::new(0));
        let inner = Arc::clone(&count);
        let callback: ChangeCallback = Box::new(move |strokes: &[Stroke]| {
            *inner.lock().unwrap() += strokes.len();
        });
        (count, callback)
    }

    #[test]
    fn test_notify_reaches_board_subscribers() {
        let registry = SubscriberRegistry::new();
        let (a_count, a) = counter();
        let (b_count, b) = counter();
        let _a = registry.subscribe("a", a);
        let _b = registry.subscribe("b", b);

        registry.notify("a", &[stroke(), stroke()]);

        assert_eq!(*a_count.lock().unwrap(), 2);
        assert_eq!(*b_count.lock().unwrap(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let registry = SubscriberRegistry::new();
        let (count, callback) = counter();
        let subscription = registry.subscribe("a", callback);
        assert!(registry.has_subscribers("a"));

        drop(subscription);
        registry.notify("a", &[stroke()]);

        assert_eq!(*count.lock().unwrap(), 0);
        assert!(!registry.has_subscribers("a"));
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let registry = SubscriberRegistry::new();
        let (_count, callback) = counter();
        registry.subscribe("a", callback).unsubscribe();
        assert!(registry.boards().is_empty());
    }

    #[test]
    fn test_subscription_outlives_registry() {
        let registry = SubscriberRegistry::new();
        let (_count, callback) = counter();
        let subscription = registry.subscribe("a", callback);
        drop(registry);
        drop(subscription);
    }

    #[test]
    fn test_notify_one() {
        let registry = SubscriberRegistry::new();
        let (first_count, first) = counter();
        let (second_count, second) = counter();
        let first = registry.subscribe("a", first);
        let _second = registry.subscribe("a", second);

        registry.notify_one(&first, &[stroke()]);

        assert_eq!(*first_count.lock().unwrap(), 1);
        assert_eq!(*second_count.lock().unwrap(), 0);
    }
}
