//! SketchParty WebSocket Relay Server
//!
//! Routes game payloads between clients in the same room without inspecting
//! them. The server tracks the roster in join order and elects the first
//! joiner as leader; beyond that, all game semantics live in the clients.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id", "name": "Alice" }
//! { "type": "broadcast", "payload": { ... } }
//! { "type": "direct", "to": "<participant-id>", "payload": { ... } }
//! ```

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 3030);

/// A message sent by clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room under a display name
    Join { room: String, name: String },
    /// Leave current room
    Leave,
    /// Broadcast a payload to everyone in the room, sender included
    Broadcast { payload: serde_json::Value },
    /// Send a payload to one participant
    Direct { to: String, payload: serde_json::Value },
}

/// A participant as announced to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

/// A message sent to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirm room join with the current roster
    Joined {
        room: String,
        participant_id: String,
        leader_id: String,
        peers: Vec<PeerInfo>,
    },
    /// Peer joined the room
    PeerJoined { peer: PeerInfo },
    /// Peer left the room
    PeerLeft { peer_id: String },
    /// The leader left and the oldest remaining peer took over
    LeaderChanged { leader_id: String },
    /// Routed payload from a peer
    Relay {
        from: String,
        payload: serde_json::Value,
    },
    /// Error message
    Error { message: String },
}

/// Who a routed message is for.
#[derive(Debug, Clone)]
enum Target {
    All,
    AllExcept(String),
    One(String),
}

impl Target {
    fn matches(&self, peer_id: &str) -> bool {
        match self {
            Target::All => true,
            Target::AllExcept(id) => id != peer_id,
            Target::One(id) => id == peer_id,
        }
    }
}

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<(Target, ServerMessage)>,
    /// Connected peers in join order; the first entry is the leader.
    peers: Vec<PeerInfo>,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            peers: Vec::new(),
        }
    }

    fn leader_id(&self) -> Option<&str> {
        self.peers.first().map(|p| p.id.as_str())
    }
}

/// Shared application state
struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
}

/// Outcome of removing a peer from a room.
#[derive(Debug, PartialEq)]
enum LeaveOutcome {
    /// The peer was not the leader, or the room emptied out.
    Left,
    /// The leader left; the given peer took over.
    NewLeader(String),
}

impl AppState {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add a peer to a room, creating it on first join. Returns the
    /// subscription, the leader id and a roster snapshot.
    fn join_room(
        &self,
        room_id: &str,
        peer_id: &str,
        name: &str,
    ) -> (
        broadcast::Receiver<(Target, ServerMessage)>,
        String,
        Vec<PeerInfo>,
    ) {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(Room::new);
        room.peers.push(PeerInfo {
            id: peer_id.to_string(),
            name: name.to_string(),
        });
        let rx = room.tx.subscribe();
        let leader = room
            .leader_id()
            .unwrap_or(peer_id)
            .to_string();
        (rx, leader, room.peers.clone())
    }

    /// Remove a peer, re-electing the oldest remaining peer when the leader
    /// leaves. Empty rooms are dropped.
    fn leave_room(&self, room_id: &str, peer_id: &str) -> LeaveOutcome {
        let mut outcome = LeaveOutcome::Left;
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            let was_leader = room.leader_id() == Some(peer_id);
            room.peers.retain(|p| p.id != peer_id);
            if room.peers.is_empty() {
                drop(room);
                self.rooms.remove(room_id);
                return LeaveOutcome::Left;
            }
            if was_leader {
                if let Some(leader) = room.leader_id() {
                    outcome = LeaveOutcome::NewLeader(leader.to_string());
                }
            }
        }
        outcome
    }

    /// Route a message into a room's channel.
    fn route(&self, room_id: &str, target: Target, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((target, msg));
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sketchparty_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("SKETCHPARTY_ADDR")
        .ok()
        .and_then(|s| s.parse::<SocketAddr>().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR));
    info!("SketchParty relay server listening on {}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

/// Index page
async fn index() -> &'static str {
    "SketchParty Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let peer_id = Uuid::new_v4().to_string();
    info!("New connection: {}", peer_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<(Target, ServerMessage)>> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                match client_msg {
                                    ClientMessage::Join { room, name } => {
                                        // Leave current room if any
                                        if let Some(ref old_room) = current_room {
                                            announce_leave(&state, old_room, &peer_id);
                                        }

                                        // Join new room
                                        let (rx, leader_id, peers) = state.join_room(&room, &peer_id, &name);
                                        room_rx = Some(rx);
                                        current_room = Some(room.clone());

                                        // Send joined confirmation
                                        let joined = ServerMessage::Joined {
                                            room: room.clone(),
                                            participant_id: peer_id.clone(),
                                            leader_id,
                                            peers,
                                        };
                                        if sender.send(Message::Text(serde_json::to_string(&joined).unwrap().into())).await.is_err() {
                                            break;
                                        }

                                        // Notify others
                                        state.route(&room, Target::AllExcept(peer_id.clone()), ServerMessage::PeerJoined {
                                            peer: PeerInfo { id: peer_id.clone(), name: name.clone() },
                                        });

                                        info!("Peer {} ({}) joined room {}", peer_id, name, room);
                                    }
                                    ClientMessage::Leave => {
                                        if let Some(ref room) = current_room {
                                            announce_leave(&state, room, &peer_id);
                                            info!("Peer {} left room {}", peer_id, room);
                                        }
                                        current_room = None;
                                        room_rx = None;
                                    }
                                    ClientMessage::Broadcast { payload } => {
                                        if let Some(ref room) = current_room {
                                            // The sender hears its own broadcasts.
                                            state.route(room, Target::All, ServerMessage::Relay {
                                                from: peer_id.clone(),
                                                payload,
                                            });
                                        }
                                    }
                                    ClientMessage::Direct { to, payload } => {
                                        if let Some(ref room) = current_room {
                                            state.route(room, Target::One(to), ServerMessage::Relay {
                                                from: peer_id.clone(),
                                                payload,
                                            });
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!("Invalid message from {}: {}", peer_id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                let _ = sender.send(Message::Text(serde_json::to_string(&err).unwrap().into())).await;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore binary, ping, pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", peer_id, e);
                        break;
                    }
                }
            }

            // Forward routed messages from the room
            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // No room joined, just wait forever
                        std::future::pending::<Option<(Target, ServerMessage)>>().await
                    }
                }
            } => {
                if let Some((target, server_msg)) = msg {
                    if target.matches(&peer_id) {
                        let json = serde_json::to_string(&server_msg).unwrap();
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref room) = current_room {
        announce_leave(&state, room, &peer_id);
    }
    info!("Connection closed: {}", peer_id);
}

/// Remove a peer and notify the room, including a leader hand-over when the
/// leader is the one leaving.
fn announce_leave(state: &AppState, room: &str, peer_id: &str) {
    let outcome = state.leave_room(room, peer_id);
    state.route(
        room,
        Target::AllExcept(peer_id.to_string()),
        ServerMessage::PeerLeft {
            peer_id: peer_id.to_string(),
        },
    );
    if let LeaveOutcome::NewLeader(leader_id) = outcome {
        info!("Room {}: leader changed to {}", room, leader_id);
        state.route(
            room,
            Target::All,
            ServerMessage::LeaderChanged { leader_id },
        );
    }
}
