//! Remote-shared stroke store over the relay protocol.

use super::snapshot::decode_entries;
use super::{
    ChangeCallback, StoreError, StoreResult, StoreStatus, StrokeStore, SubscriberRegistry,
    Subscription,
};
use crate::stroke::{Stroke, StrokeId};
use crate::sync::{ClientMessage, ConnectionState, SyncEvent, Transport};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use web_time::{Duration, Instant};

/// First wait before reconnecting to a lost relay.
pub const RECONNECT_INITIAL: Duration = Duration::from_millis(500);
/// Longest wait between reconnect attempts.
pub const RECONNECT_MAX: Duration = Duration::from_secs(30);

/// Reconnect schedule. The delay doubles after every attempt.
struct Backoff {
    initial: Duration,
    max: Duration,
    delay: Duration,
    retry_at: Option<Instant>,
}

impl Backoff {
    fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            delay: initial,
            retry_at: None,
        }
    }

    fn reset(&mut self) {
        self.delay = self.initial;
        self.retry_at = None;
    }

    /// True once the current wait is over; schedules the next one.
    fn due(&mut self, now: Instant) -> bool {
        let retry_at = *self.retry_at.get_or_insert(now + self.delay);
        if now < retry_at {
            return false;
        }
        self.delay = (self.delay * 2).min(self.max);
        self.retry_at = Some(now + self.delay);
        true
    }
}

struct Remote<T> {
    transport: T,
    /// Messages not yet handed to a live connection, flushed in order on connect.
    outgoing: VecDeque<String>,
    /// Last snapshot received per board.
    snapshots: HashMap<String, Vec<Stroke>>,
    /// Boards we have asked the relay to send us.
    joined: HashSet<String>,
    /// Set between `Connected` and `Disconnected`.
    online: bool,
    backoff: Backoff,
    errors: Vec<StoreError>,
}

impl<T: Transport> Remote<T> {
    fn send_now(&self, payload: &str) -> bool {
        if !self.transport.is_connected() {
            return false;
        }
        match self.transport.send(payload) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Relay send failed: {}", e);
                false
            }
        }
    }

    fn send_or_queue(&mut self, msg: &ClientMessage) -> StoreResult<()> {
        let payload = encode(msg)?;
        if !self.send_now(&payload) {
            log::debug!("Relay offline, queueing message ({} pending)", self.outgoing.len() + 1);
            self.outgoing.push_back(payload);
        }
        Ok(())
    }

    fn flush(&mut self) {
        while let Some(payload) = self.outgoing.pop_front() {
            if !self.send_now(&payload) {
                self.outgoing.push_front(payload);
                break;
            }
        }
    }

    fn join(&mut self, board_id: &str) -> StoreResult<()> {
        if self.joined.insert(board_id.to_string()) {
            // Joins are not queued: every joined board is re-joined on connect.
            let payload = encode(&ClientMessage::Join { board: board_id.to_string() })?;
            self.send_now(&payload);
        }
        Ok(())
    }

    /// Apply one transport event. Returns a snapshot to deliver, if any.
    fn handle_event(&mut self, event: SyncEvent) -> Option<(String, Vec<Stroke>)> {
        match event {
            SyncEvent::Connected => {
                log::info!("Relay connected, joining {} board(s)", self.joined.len());
                self.online = true;
                self.backoff.reset();
                let boards: Vec<String> = self.joined.iter().cloned().collect();
                for board in boards {
                    if let Ok(payload) = encode(&ClientMessage::Join { board }) {
                        self.send_now(&payload);
                    }
                }
                self.flush();
            }
            SyncEvent::Disconnected => {
                self.online = false;
                log::warn!("Relay disconnected, {} message(s) queued", self.outgoing.len());
            }
            SyncEvent::Unsent { messages } => {
                for payload in messages.into_iter().rev() {
                    self.outgoing.push_front(payload);
                }
            }
            SyncEvent::Snapshot { board, strokes } => {
                let strokes = decode_entries(&board, strokes);
                self.snapshots.insert(board.clone(), strokes.clone());
                return Some((board, strokes));
            }
            // Only the server speaks on a live connection.
            SyncEvent::Error { message } if self.online => {
                log::error!("Relay rejected a request: {}", message);
                self.errors.push(StoreError::Rejected(message));
            }
            SyncEvent::Error { message } => log::warn!("Relay unreachable: {}", message),
        }
        None
    }

    fn maybe_reconnect(&mut self) {
        match self.transport.state() {
            ConnectionState::Connected | ConnectionState::Connecting => {}
            ConnectionState::Disconnected | ConnectionState::Error => {
                if self.backoff.due(Instant::now()) {
                    if let Err(e) = self.transport.reconnect() {
                        log::warn!("Relay reconnect failed: {}", e);
                    }
                }
            }
        }
    }
}

fn encode(msg: &ClientMessage) -> StoreResult<String> {
    serde_json::to_string(msg).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Stroke store shared through a relay server.
///
/// Writes return as soon as the message is handed to the transport (or
/// queued while offline). Snapshots from the relay are delivered to
/// subscribers on `poll()`, which also reconnects a lost transport.
pub struct RemoteStrokeStore<T: Transport> {
    inner: Mutex<Remote<T>>,
    subscribers: SubscriberRegistry,
}

impl<T: Transport> RemoteStrokeStore<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Mutex::new(Remote {
                transport,
                outgoing: VecDeque::new(),
                snapshots: HashMap::new(),
                joined: HashSet::new(),
                online: false,
                backoff: Backoff::new(RECONNECT_INITIAL, RECONNECT_MAX),
                errors: Vec::new(),
            }),
            subscribers: SubscriberRegistry::new(),
        }
    }

    /// Override the reconnect schedule.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        if let Ok(remote) = self.inner.get_mut() {
            remote.backoff = Backoff::new(initial, max);
        }
        self
    }

    /// Number of messages waiting for a connection.
    pub fn pending(&self) -> usize {
        self.inner.lock().map(|r| r.outgoing.len()).unwrap_or(0)
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().map(|r| r.transport.is_connected()).unwrap_or(false)
    }

    fn with_remote<R>(&self, f: impl FnOnce(&mut Remote<T>) -> StoreResult<R>) -> StoreResult<R> {
        let mut remote = self
            .inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Lock error: {}", e)))?;
        f(&mut remote)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl RemoteStrokeStore<crate::sync::NativeWebSocket> {
    /// Open a WebSocket to `url` and wrap it in a store.
    pub fn connect(url: &str) -> StoreResult<Self> {
        let mut socket = crate::sync::NativeWebSocket::new();
        socket.connect(url).map_err(StoreError::Unavailable)?;
        Ok(Self::new(socket))
    }
}

impl<T: Transport> StrokeStore for RemoteStrokeStore<T> {
    fn append(&self, board_id: &str, stroke: &Stroke) -> StoreResult<()> {
        self.with_remote(|remote| {
            remote.send_or_queue(&ClientMessage::Append {
                board: board_id.to_string(),
                stroke: stroke.clone(),
            })
        })
    }

    fn subscribe(&self, board_id: &str, on_change: ChangeCallback) -> StoreResult<Subscription> {
        let cached = self.with_remote(|remote| {
            remote.join(board_id)?;
            Ok(remote.snapshots.get(board_id).cloned())
        })?;

        let subscription = self.subscribers.subscribe(board_id, on_change);
        if let Some(strokes) = cached {
            self.subscribers.notify_one(&subscription, &strokes);
        }
        Ok(subscription)
    }

    fn remove(&self, board_id: &str, ids: &[StrokeId]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.with_remote(|remote| {
            remote.send_or_queue(&ClientMessage::Remove {
                board: board_id.to_string(),
                ids: ids.to_vec(),
            })
        })
    }

    fn clear(&self, board_id: &str) -> StoreResult<()> {
        self.with_remote(|remote| {
            remote.send_or_queue(&ClientMessage::Clear { board: board_id.to_string() })
        })
    }

    fn poll(&self) {
        let updates = self.with_remote(|remote| {
            let events = remote.transport.poll_events();
            let updates: Vec<(String, Vec<Stroke>)> =
                events.into_iter().filter_map(|e| remote.handle_event(e)).collect();
            remote.maybe_reconnect();

            // Leave boards nobody watches any more.
            let stale: Vec<String> = remote
                .joined
                .iter()
                .filter(|board| !self.subscribers.has_subscribers(board))
                .cloned()
                .collect();
            for board in stale {
                remote.joined.remove(&board);
                remote.snapshots.remove(&board);
                if let Ok(payload) = encode(&ClientMessage::Leave { board }) {
                    remote.send_now(&payload);
                }
            }

            Ok(updates)
        });
        match updates {
            Ok(updates) => {
                for (board, strokes) in updates {
                    self.subscribers.notify(&board, &strokes);
                }
            }
            Err(e) => log::error!("Relay poll failed: {}", e),
        }
    }

    fn status(&self) -> StoreStatus {
        self.inner
            .lock()
            .map(|remote| {
                if remote.transport.is_connected() {
                    StoreStatus::Ready
                } else {
                    StoreStatus::Offline { queued: remote.outgoing.len() }
                }
            })
            .unwrap_or(StoreStatus::Offline { queued: 0 })
    }

    fn take_errors(&self) -> Vec<StoreError> {
        self.with_remote(|remote| Ok(std::mem::take(&mut remote.errors)))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{InkColor, StrokePoint};
    use serde_json::Value;
    use std::sync::Arc;

    /// In-process stand-in for the relay: applies client messages to
    /// per-board lists and answers with snapshots, like the server does.
    #[derive(Default)]
    struct Relay {
        boards: HashMap<String, Vec<Value>>,
        members: HashSet<String>,
        events: Vec<SyncEvent>,
        received: Vec<ClientMessage>,
    }

    impl Relay {
        fn snapshot(&mut self, board: &str) {
            if self.members.contains(board) {
                let strokes = self.boards.get(board).cloned().unwrap_or_default();
                self.events.push(SyncEvent::Snapshot { board: board.to_string(), strokes });
            }
        }

        fn apply(&mut self, msg: ClientMessage) {
            self.received.push(msg.clone());
            match msg {
                ClientMessage::Join { board } => {
                    self.members.insert(board.clone());
                    self.snapshot(&board);
                }
                ClientMessage::Leave { board } => {
                    self.members.remove(&board);
                }
                ClientMessage::Append { board, stroke } => {
                    let value = serde_json::to_value(&stroke).unwrap();
                    self.boards.entry(board.clone()).or_default().push(value);
                    self.snapshot(&board);
                }
                ClientMessage::Remove { board, ids } => {
                    let ids: Vec<Value> = ids.iter().map(|id| Value::String(id.to_string())).collect();
                    if let Some(strokes) = self.boards.get_mut(&board) {
                        strokes.retain(|s| !ids.contains(&s["id"]));
                    }
                    self.snapshot(&board);
                }
                ClientMessage::Clear { board } => {
                    self.boards.remove(&board);
                    self.snapshot(&board);
                }
            }
        }
    }

    #[derive(Clone)]
    struct Loopback {
        relay: Arc<Mutex<Relay>>,
        connected: Arc<Mutex<bool>>,
        reachable: Arc<Mutex<bool>>,
        reconnects: Arc<Mutex<usize>>,
    }

    impl Loopback {
        fn new(connected: bool) -> Self {
            Self {
                relay: Arc::new(Mutex::new(Relay::default())),
                connected: Arc::new(Mutex::new(connected)),
                reachable: Arc::new(Mutex::new(true)),
                reconnects: Arc::new(Mutex::new(0)),
            }
        }

        fn set_reachable(&self, reachable: bool) {
            *self.reachable.lock().unwrap() = reachable;
        }

        /// Drop the link the way the socket worker does: undelivered
        /// messages come back, then the disconnect.
        fn drop_link(&self, undelivered: Vec<String>) {
            *self.connected.lock().unwrap() = false;
            let mut relay = self.relay.lock().unwrap();
            relay.members.clear();
            if !undelivered.is_empty() {
                relay.events.push(SyncEvent::Unsent { messages: undelivered });
            }
            relay.events.push(SyncEvent::Disconnected);
        }

        fn reconnects(&self) -> usize {
            *self.reconnects.lock().unwrap()
        }

        fn go_online(&self) {
            *self.connected.lock().unwrap() = true;
            self.relay.lock().unwrap().events.push(SyncEvent::Connected);
        }

        fn received(&self) -> Vec<ClientMessage> {
            self.relay.lock().unwrap().received.clone()
        }

        fn inject(&self, event: SyncEvent) {
            self.relay.lock().unwrap().events.push(event);
        }
    }

    impl Transport for Loopback {
        fn send(&self, msg: &str) -> Result<(), String> {
            if !*self.connected.lock().unwrap() {
                return Err("Not connected".to_string());
            }
            let msg: ClientMessage = serde_json::from_str(msg).map_err(|e| e.to_string())?;
            self.relay.lock().unwrap().apply(msg);
            Ok(())
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            std::mem::take(&mut self.relay.lock().unwrap().events)
        }

        fn state(&self) -> ConnectionState {
            if *self.connected.lock().unwrap() {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            }
        }

        fn reconnect(&mut self) -> Result<(), String> {
            *self.reconnects.lock().unwrap() += 1;
            if !*self.reachable.lock().unwrap() {
                return Err("Connection refused".to_string());
            }
            self.go_online();
            Ok(())
        }
    }

    fn stroke(x: f64) -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(x, 0.0), StrokePoint::new(x + 10.0, 0.0)],
            InkColor::BLACK,
            3.0,
            false,
        )
        .unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<Vec<Stroke>>>>, ChangeCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = Arc::clone(&seen);
        let callback: ChangeCallback = Box::new(move |strokes: &[Stroke]| {
            inner.lock().unwrap().push(strokes.to_vec());
        });
        (seen, callback)
    }

    #[test]
    fn test_append_round_trips_through_relay() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();

        let (a, b) = (stroke(0.0), stroke(30.0));
        store.append("main", &a).unwrap();
        store.append("main", &b).unwrap();
        store.poll();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.last().unwrap(), &vec![a, b]);
    }

    #[test]
    fn test_late_subscriber_gets_cached_snapshot() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (_first_seen, first) = recorder();
        let _first = store.subscribe("main", first).unwrap();
        store.append("main", &stroke(0.0)).unwrap();
        store.poll();

        let (seen, second) = recorder();
        let _second = store.subscribe("main", second).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0].len(), 1);

        let joins = transport
            .received()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Join { .. }))
            .count();
        assert_eq!(joins, 1);
    }

    #[test]
    fn test_offline_writes_queue_and_flush_in_order() {
        let transport = Loopback::new(false);
        let store = RemoteStrokeStore::new(transport.clone());
        let (seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();

        let (a, b) = (stroke(0.0), stroke(30.0));
        store.append("main", &a).unwrap();
        store.append("main", &b).unwrap();
        assert_eq!(store.pending(), 2);
        assert!(transport.received().is_empty());

        transport.go_online();
        store.poll();
        assert_eq!(store.pending(), 0);
        assert!(matches!(transport.received()[0], ClientMessage::Join { .. }));

        store.poll();
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec![a, b]);
    }

    #[test]
    fn test_remove_and_clear() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();

        let (a, b) = (stroke(0.0), stroke(30.0));
        store.append("main", &a).unwrap();
        store.append("main", &b).unwrap();
        store.remove("main", &[a.id()]).unwrap();
        store.poll();
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec![b]);

        store.clear("main").unwrap();
        store.poll();
        assert!(seen.lock().unwrap().last().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();
        store.poll();

        let good = serde_json::to_value(stroke(0.0)).unwrap();
        transport.inject(SyncEvent::Snapshot {
            board: "main".to_string(),
            strokes: vec![good, serde_json::json!({"points": []}), Value::Null],
        });
        store.poll();

        assert_eq!(seen.lock().unwrap().last().unwrap().len(), 1);
    }

    #[test]
    fn test_dropping_last_subscription_leaves_board() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (seen, callback) = recorder();
        let subscription = store.subscribe("main", callback).unwrap();
        store.poll();
        drop(subscription);
        store.poll();

        assert!(matches!(transport.received().last(), Some(ClientMessage::Leave { .. })));

        // A write from elsewhere no longer reaches us.
        store.append("main", &stroke(0.0)).unwrap();
        store.poll();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reconnect_rejoins() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        let (_seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();
        store.poll();

        transport.inject(SyncEvent::Disconnected);
        transport.go_online();
        store.poll();

        let joins = transport
            .received()
            .iter()
            .filter(|m| matches!(m, ClientMessage::Join { .. }))
            .count();
        assert_eq!(joins, 2);
    }

    #[test]
    fn test_lost_link_reconnects_and_resends_undelivered() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone())
            .with_backoff(Duration::ZERO, Duration::ZERO);
        let (seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();
        store.poll();

        let (a, b) = (stroke(0.0), stroke(30.0));
        let lost = serde_json::to_string(&ClientMessage::Append {
            board: "main".to_string(),
            stroke: a.clone(),
        })
        .unwrap();
        transport.drop_link(vec![lost]);
        store.append("main", &b).unwrap();
        assert_eq!(store.status(), StoreStatus::Offline { queued: 1 });

        // Picks up the returned message and reconnects.
        store.poll();
        assert_eq!(transport.reconnects(), 1);
        assert_eq!(store.pending(), 2);

        // Re-joins, then flushes in the original order.
        store.poll();
        assert_eq!(store.pending(), 0);
        assert_eq!(store.status(), StoreStatus::Ready);
        store.poll();
        assert_eq!(seen.lock().unwrap().last().unwrap(), &vec![a, b]);
    }

    #[test]
    fn test_unreachable_relay_stays_offline_with_queue() {
        let transport = Loopback::new(false);
        transport.set_reachable(false);
        let store = RemoteStrokeStore::new(transport.clone())
            .with_backoff(Duration::ZERO, Duration::ZERO);
        let (_seen, callback) = recorder();
        let _subscription = store.subscribe("main", callback).unwrap();

        store.append("main", &stroke(0.0)).unwrap();
        store.poll();
        store.poll();

        assert_eq!(transport.reconnects(), 2);
        assert_eq!(store.status(), StoreStatus::Offline { queued: 1 });
        assert!(transport.received().is_empty());
    }

    #[test]
    fn test_backoff_waits_before_retrying() {
        let transport = Loopback::new(false);
        transport.set_reachable(false);
        let store = RemoteStrokeStore::new(transport.clone());
        store.poll();
        store.poll();
        assert_eq!(transport.reconnects(), 0);
    }

    #[test]
    fn test_backoff_doubles_up_to_max() {
        let start = Instant::now();
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(3));
        assert!(!backoff.due(start));
        assert!(backoff.due(start + Duration::from_secs(1)));
        assert!(!backoff.due(start + Duration::from_secs(2)));
        assert!(backoff.due(start + Duration::from_secs(3)));
        assert_eq!(backoff.delay, Duration::from_secs(3));
        backoff.reset();
        assert_eq!(backoff.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_server_error_reported_as_rejection() {
        let transport = Loopback::new(true);
        let store = RemoteStrokeStore::new(transport.clone());
        transport.inject(SyncEvent::Connected);
        store.poll();

        transport.inject(SyncEvent::Error { message: "board main is full".to_string() });
        store.poll();

        assert_eq!(
            store.take_errors(),
            vec![StoreError::Rejected("board main is full".to_string())]
        );
        assert!(store.take_errors().is_empty());
    }

    #[test]
    fn test_connect_failure_is_not_a_rejection() {
        let transport = Loopback::new(false);
        let store = RemoteStrokeStore::new(transport.clone());
        transport.inject(SyncEvent::Error { message: "Connection failed".to_string() });
        store.poll();
        assert!(store.take_errors().is_empty());
    }
}
