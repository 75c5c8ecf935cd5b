//! Scribboard Board Server
//!
//! Keeps the stroke list of every board in memory and sends the full list
//! to every member of a board whenever it changes.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "board": "board-id" }
//! { "type": "append", "board": "board-id", "stroke": { "id": "...", "points": [...], ... } }
//! { "type": "remove", "board": "board-id", "ids": ["..."] }
//! { "type": "clear", "board": "board-id" }
//! { "type": "leave", "board": "board-id" }
//! ```
//! The server answers with `snapshot` (to every member, sender included) or
//! `error` (to the sender only).

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    net::SocketAddr,
    sync::Arc,
};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server configuration
const DEFAULT_ADDR: &str = "0.0.0.0:3030";
const MAX_BOARD_STROKES: usize = 10_000;
const CHANNEL_CAPACITY: usize = 256;

/// A message from a client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving snapshots of a board
    Join { board: String },
    /// Stop receiving snapshots of a board
    Leave { board: String },
    /// Append one stroke to the end of a board
    Append { board: String, stroke: Value },
    /// Remove strokes by id
    Remove { board: String, ids: Vec<String> },
    /// Remove every stroke of a board
    Clear { board: String },
}

/// A message sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full stroke list of a board, oldest first
    Snapshot { board: String, strokes: Vec<Value> },
    /// Error message
    Error { message: String },
}

fn encode(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_else(|e| {
        format!(r#"{{"type":"error","message":"encode failed: {}"}}"#, e)
    })
}

/// Board state
struct Board {
    /// Broadcast channel carrying encoded snapshots
    tx: broadcast::Sender<String>,
    /// Connected peer IDs
    peers: HashSet<String>,
    /// Strokes in append order
    strokes: Vec<Value>,
}

impl Board {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: HashSet::new(),
            strokes: Vec::new(),
        }
    }

    fn snapshot(&self, board_id: &str) -> String {
        encode(&ServerMessage::Snapshot {
            board: board_id.to_string(),
            strokes: self.strokes.clone(),
        })
    }

    fn publish(&self, board_id: &str) {
        // No receivers is fine.
        let _ = self.tx.send(self.snapshot(board_id));
    }
}

/// Shared application state
struct AppState {
    boards: DashMap<String, Board>,
}

impl AppState {
    fn new() -> Self {
        Self {
            boards: DashMap::new(),
        }
    }

    /// Add peer to board. Returns the receiver and the snapshot taken at the
    /// moment of subscribing.
    fn join(&self, board_id: &str, peer_id: &str) -> (broadcast::Receiver<String>, String) {
        let mut board = self.boards.entry(board_id.to_string()).or_insert_with(Board::new);
        board.peers.insert(peer_id.to_string());
        (board.tx.subscribe(), board.snapshot(board_id))
    }

    /// Remove peer from board. A board with no members and no strokes is dropped.
    fn leave(&self, board_id: &str, peer_id: &str) {
        if let Some(mut board) = self.boards.get_mut(board_id) {
            board.peers.remove(peer_id);
        }
        self.boards
            .remove_if(board_id, |_, board| board.peers.is_empty() && board.strokes.is_empty());
    }

    fn member_count(&self, board_id: &str) -> usize {
        self.boards.get(board_id).map(|b| b.peers.len()).unwrap_or(0)
    }

    fn append(&self, board_id: &str, mut stroke: Value) -> Result<(), String> {
        let Some(fields) = stroke.as_object_mut() else {
            return Err("stroke must be a JSON object".to_string());
        };
        if !fields.get("id").is_some_and(Value::is_string) {
            fields.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }

        let mut board = self.boards.entry(board_id.to_string()).or_insert_with(Board::new);
        // Clients resend appends they could not confirm.
        if board.strokes.iter().any(|s| s.get("id") == stroke.get("id")) {
            debug!("Ignoring duplicate stroke on board {}", board_id);
            return Ok(());
        }
        if board.strokes.len() >= MAX_BOARD_STROKES {
            return Err(format!("board {} is full", board_id));
        }
        board.strokes.push(stroke);
        board.publish(board_id);
        Ok(())
    }

    fn remove(&self, board_id: &str, ids: &[String]) {
        let Some(mut board) = self.boards.get_mut(board_id) else {
            return;
        };
        let before = board.strokes.len();
        board.strokes.retain(|stroke| {
            !stroke
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| ids.iter().any(|x| x == id))
        });
        if board.strokes.len() != before {
            board.publish(board_id);
        }
    }

    fn clear(&self, board_id: &str) {
        let mut board = self.boards.entry(board_id.to_string()).or_insert_with(Board::new);
        board.strokes.clear();
        board.publish(board_id);
    }

    fn stroke_count(&self, board_id: &str) -> usize {
        self.boards.get(board_id).map(|b| b.strokes.len()).unwrap_or(0)
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribboard_server=info,tower_http=info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var("SCRIBBOARD_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("Scribboard board server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

/// Index page
async fn index() -> &'static str {
    "Scribboard Board Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Forward a board's broadcasts into one connection's outbox.
fn forward(board_id: String, mut rx: broadcast::Receiver<String>, out: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(json) => {
                    if out.send(json).is_err() {
                        break;
                    }
                }
                // Snapshots are complete, so skipped ones are harmless.
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!("Skipped {} snapshots of board {}", n, board_id);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Apply one client message. Returns an error to report back to the sender.
fn handle_message(
    state: &AppState,
    peer_id: &str,
    msg: ClientMessage,
    joined: &mut HashMap<String, JoinHandle<()>>,
    out: &mpsc::UnboundedSender<String>,
) -> Option<String> {
    match msg {
        ClientMessage::Join { board } => {
            let (rx, snapshot) = state.join(&board, peer_id);
            // The join snapshot goes out before any broadcast it may precede.
            let _ = out.send(snapshot);
            if let Some(previous) = joined.insert(board.clone(), forward(board.clone(), rx, out.clone())) {
                previous.abort();
            }
            info!("Peer {} joined board {} ({} members)", peer_id, board, state.member_count(&board));
            None
        }
        ClientMessage::Leave { board } => {
            if let Some(task) = joined.remove(&board) {
                task.abort();
            }
            state.leave(&board, peer_id);
            info!("Peer {} left board {} ({} members)", peer_id, board, state.member_count(&board));
            None
        }
        ClientMessage::Append { board, stroke } => match state.append(&board, stroke) {
            Ok(()) => {
                debug!("Board {} now has {} strokes", board, state.stroke_count(&board));
                None
            }
            Err(e) => Some(e),
        },
        ClientMessage::Remove { board, ids } => {
            state.remove(&board, &ids);
            None
        }
        ClientMessage::Clear { board } => {
            state.clear(&board);
            info!("Peer {} cleared board {}", peer_id, board);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let error = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => handle_message(&state, &peer_id, client_msg, &mut joined, &out_tx),
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                Some(format!("Invalid message: {}", e))
                            }
                        };
                        if let Some(message) = error {
                            let _ = out_tx.send(encode(&ServerMessage::Error { message }));
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Snapshots and errors queued for this peer
            Some(json) = out_rx.recv() => {
                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Cleanup on disconnect
    for (board, task) in joined {
        task.abort();
        state.leave(&board, &peer_id);
    }
    info!("Connection closed: {}", peer_id);
}
