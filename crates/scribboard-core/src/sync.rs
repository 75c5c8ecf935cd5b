//! Relay protocol and WebSocket transport.
//!
//! The remote stroke store talks to the relay server with JSON text frames.
//! Every change to a board makes the server broadcast the board's full
//! stroke list to all members.

use crate::stroke::{Stroke, StrokeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messages sent to the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a board
    Join { board: String },
    /// Stop receiving snapshots of a board
    Leave { board: String },
    /// Push one committed stroke to the end of a board
    Append { board: String, stroke: Stroke },
    /// Remove strokes by id
    Remove { board: String, ids: Vec<StrokeId> },
    /// Remove every stroke of a board
    Clear { board: String },
}

/// Messages received from the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full stroke collection of a board, oldest first.
    ///
    /// Entries are kept as raw JSON so one bad stroke cannot reject the rest.
    Snapshot { board: String, strokes: Vec<Value> },
    /// Error message
    Error { message: String },
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Events from a transport
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connected to server
    Connected,
    /// Disconnected from server
    Disconnected,
    /// A board snapshot arrived
    Snapshot { board: String, strokes: Vec<Value> },
    /// Error occurred
    Error { message: String },
    /// Messages accepted by `send` that never reached the server, oldest first
    Unsent { messages: Vec<String> },
}

impl From<ServerMessage> for SyncEvent {
    fn from(msg: ServerMessage) -> Self {
        match msg {
            ServerMessage::Snapshot { board, strokes } => SyncEvent::Snapshot { board, strokes },
            ServerMessage::Error { message } => SyncEvent::Error { message },
        }
    }
}

/// Parse a server text frame into an event.
pub fn parse_server_text(text: &str) -> Option<SyncEvent> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Some(msg.into()),
        Err(e) => {
            log::warn!("Failed to parse server message: {}", e);
            None
        }
    }
}

/// First 100 characters of a frame, for logs.
#[cfg(not(target_arch = "wasm32"))]
fn preview(msg: &str) -> String {
    msg.chars().take(100).collect()
}

/// A message pipe to the relay.
///
/// `send` must not block; received traffic is collected until `poll_events`.
/// A message that was accepted but could not be delivered comes back in a
/// `SyncEvent::Unsent` before the matching `Disconnected`.
pub trait Transport: Send {
    fn send(&self, msg: &str) -> Result<(), String>;

    fn poll_events(&mut self) -> Vec<SyncEvent>;

    fn state(&self) -> ConnectionState;

    /// Open the connection again after it closed or failed.
    fn reconnect(&mut self) -> Result<(), String>;

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}

// ============================================================================
// Native WebSocket Client
// ============================================================================

#[cfg(not(target_arch = "wasm32"))]
mod native_client {
    use super::*;
    use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;
    use tungstenite::{Message, connect};
    use url::Url;

    /// Commands sent to the WebSocket thread.
    enum WsCommand {
        Send(String),
        Close,
    }

    /// WebSocket client for native platforms.
    ///
    /// Uses a background thread for non-blocking operation.
    pub struct NativeWebSocket {
        state: ConnectionState,
        url: Option<String>,
        cmd_tx: Option<Sender<WsCommand>>,
        event_rx: Option<Receiver<SyncEvent>>,
        _thread: Option<JoinHandle<()>>,
    }

    impl NativeWebSocket {
        pub fn new() -> Self {
            Self {
                state: ConnectionState::Disconnected,
                url: None,
                cmd_tx: None,
                event_rx: None,
                _thread: None,
            }
        }

        /// Connect to a relay, e.g. `ws://localhost:3030/ws`.
        pub fn connect(&mut self, url: &str) -> Result<(), String> {
            if self.cmd_tx.is_some() {
                return Err("Already connected".to_string());
            }

            let parsed_url = Url::parse(url).map_err(|e| format!("Invalid URL: {}", e))?;
            if parsed_url.scheme() != "ws" && parsed_url.scheme() != "wss" {
                return Err(format!("Invalid WebSocket URL scheme: {}", parsed_url.scheme()));
            }

            self.url = Some(url.to_string());
            self.state = ConnectionState::Connecting;

            let (cmd_tx, cmd_rx) = channel::<WsCommand>();
            let (event_tx, event_rx) = channel::<SyncEvent>();
            let url = url.to_string();

            let handle = thread::spawn(move || {
                log::info!("WebSocket thread: connecting to {}", url);

                let (mut socket, response) = match connect(&url) {
                    Ok(connected) => connected,
                    Err(e) => {
                        log::error!("WebSocket connection failed: {}", e);
                        let unsent = drain_unsent(&cmd_rx, Vec::new());
                        if !unsent.is_empty() {
                            let _ = event_tx.send(SyncEvent::Unsent { messages: unsent });
                        }
                        let _ = event_tx.send(SyncEvent::Error {
                            message: format!("Connection failed: {}", e),
                        });
                        return;
                    }
                };

                log::info!("WebSocket connected, status: {}", response.status());
                let _ = event_tx.send(SyncEvent::Connected);

                // Short read timeout turns the blocking read into a poll.
                if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
                    let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
                    let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
                }

                let mut failed = Vec::new();
                loop {
                    match cmd_rx.try_recv() {
                        Ok(WsCommand::Send(msg)) => {
                            log::debug!("WebSocket sending: {}", preview(&msg));
                            if let Err(e) = socket.send(Message::Text(msg.clone())) {
                                log::error!("WebSocket send error: {}", e);
                                failed.push(msg);
                                break;
                            }
                        }
                        Ok(WsCommand::Close) => {
                            log::info!("WebSocket close requested");
                            let _ = socket.close(None);
                            break;
                        }
                        Err(TryRecvError::Disconnected) => break,
                        Err(TryRecvError::Empty) => {}
                    }

                    match socket.read() {
                        Ok(Message::Text(txt)) => {
                            if let Some(event) = parse_server_text(&txt) {
                                let _ = event_tx.send(event);
                            }
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = socket.send(Message::Pong(data));
                        }
                        Ok(Message::Close(_)) => {
                            log::info!("WebSocket received close frame");
                            break;
                        }
                        Ok(_) => {}
                        Err(tungstenite::Error::Io(ref e))
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            log::error!("WebSocket read error: {}", e);
                            break;
                        }
                    }
                }

                log::info!("WebSocket thread exiting");
                let unsent = drain_unsent(&cmd_rx, failed);
                if !unsent.is_empty() {
                    log::warn!("Returning {} undelivered message(s)", unsent.len());
                    let _ = event_tx.send(SyncEvent::Unsent { messages: unsent });
                }
                let _ = event_tx.send(SyncEvent::Disconnected);
            });

            self.cmd_tx = Some(cmd_tx);
            self.event_rx = Some(event_rx);
            self._thread = Some(handle);
            Ok(())
        }

        pub fn disconnect(&mut self) {
            if let Some(tx) = self.cmd_tx.take() {
                let _ = tx.send(WsCommand::Close);
            }
            self.event_rx = None;
            self._thread = None;
            self.state = ConnectionState::Disconnected;
        }

    }

    /// Collect queued sends the worker never wrote, after `failed`.
    fn drain_unsent(cmd_rx: &Receiver<WsCommand>, mut failed: Vec<String>) -> Vec<String> {
        failed.extend(cmd_rx.try_iter().filter_map(|cmd| match cmd {
            WsCommand::Send(msg) => Some(msg),
            WsCommand::Close => None,
        }));
        failed
    }

    impl Transport for NativeWebSocket {
        fn send(&self, msg: &str) -> Result<(), String> {
            match self.cmd_tx {
                Some(ref tx) => tx
                    .send(WsCommand::Send(msg.to_string()))
                    .map_err(|e| format!("Send failed: {}", e)),
                None => Err("Not connected".to_string()),
            }
        }

        fn poll_events(&mut self) -> Vec<SyncEvent> {
            let mut events = Vec::new();
            let mut closed = false;
            if let Some(ref rx) = self.event_rx {
                while let Ok(event) = rx.try_recv() {
                    match &event {
                        SyncEvent::Connected => self.state = ConnectionState::Connected,
                        SyncEvent::Disconnected => {
                            self.state = ConnectionState::Disconnected;
                            closed = true;
                        }
                        SyncEvent::Error { .. } if self.state != ConnectionState::Connected => {
                            self.state = ConnectionState::Error;
                            closed = true;
                        }
                        _ => {}
                    }
                    events.push(event);
                }
            }
            // The worker thread has exited; allow a fresh connect().
            if closed {
                self.cmd_tx = None;
                self.event_rx = None;
                self._thread = None;
            }
            events
        }

        fn state(&self) -> ConnectionState {
            self.state
        }

        fn reconnect(&mut self) -> Result<(), String> {
            if self.cmd_tx.is_some() {
                return Ok(());
            }
            let url = self.url.clone().ok_or_else(|| "No relay URL".to_string())?;
            log::info!("Reconnecting to {}", url);
            self.connect(&url)
        }
    }

    impl Default for NativeWebSocket {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Drop for NativeWebSocket {
        fn drop(&mut self) {
            self.disconnect();
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native_client::NativeWebSocket;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{InkColor, StrokePoint};

    #[test]
    fn test_client_message_serialize() {
        let msg = ClientMessage::Join { board: "main".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"join","board":"main"}"#);
    }

    #[test]
    fn test_append_carries_stroke() {
        let stroke = Stroke::new(
            vec![StrokePoint::new(10.0, 10.0), StrokePoint::new(20.0, 10.0)],
            InkColor::BLACK,
            3.0,
            false,
        )
        .unwrap();
        let msg = ClientMessage::Append { board: "main".to_string(), stroke: stroke.clone() };
        let value: Value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "append");
        assert_eq!(value["stroke"]["color"], "#000000");
        assert_eq!(value["stroke"]["isEraser"], false);

        let back: ClientMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_server_snapshot_deserialize() {
        let json = r#"{"type":"snapshot","board":"main","strokes":[{"anything":1}]}"#;
        match parse_server_text(json) {
            Some(SyncEvent::Snapshot { board, strokes }) => {
                assert_eq!(board, "main");
                assert_eq!(strokes.len(), 1);
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_server_error_deserialize() {
        let json = r#"{"type":"error","message":"nope"}"#;
        assert_eq!(
            parse_server_text(json),
            Some(SyncEvent::Error { message: "nope".to_string() })
        );
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_preview_cuts_on_char_boundary() {
        let msg = format!("{}é{}", "a".repeat(99), "b".repeat(50));
        assert_eq!(preview(&msg), format!("{}é", "a".repeat(99)));
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn test_unknown_server_message_ignored() {
        assert_eq!(parse_server_text(r#"{"type":"joined","room":"x"}"#), None);
        assert_eq!(parse_server_text("garbage"), None);
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_rejects_bad_scheme() {
        let mut ws = NativeWebSocket::new();
        assert!(ws.connect("http://localhost:3030/ws").is_err());
        assert!(ws.connect("not a url").is_err());
        assert!(!ws.is_connected());
        assert!(ws.send("{}").is_err());
        assert!(ws.reconnect().is_err());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_native_failed_connect_can_reconnect() {
        // Nothing listens on the discard port.
        let mut ws = NativeWebSocket::new();
        ws.connect("ws://127.0.0.1:9/ws").unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut events = Vec::new();
        while ws.state() == ConnectionState::Connecting && std::time::Instant::now() < deadline {
            events.extend(ws.poll_events());
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert_eq!(ws.state(), ConnectionState::Error);
        assert!(events.iter().any(|e| matches!(e, SyncEvent::Error { .. })));
        assert!(ws.send("{}").is_err());
        assert!(ws.reconnect().is_ok());
        assert_eq!(ws.state(), ConnectionState::Connecting);
    }
}
