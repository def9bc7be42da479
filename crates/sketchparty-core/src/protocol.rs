//! Wire protocol between nodes and the relay server.
//!
//! Messages are JSON. The relay routes them without inspecting game
//! payloads; all game semantics live in [`GamePayload`], which travels
//! inside `Broadcast`/`Direct` envelopes and comes back wrapped in
//! `Relay`. Delivery is reliable but unordered; the engine does not rely
//! on any total message order.

use crate::command::{DrawingCommand, DrawingSession};
use crate::state_store::StateUpdate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A payload that could not be parsed. The message is dropped and the
    /// receiver's state is left untouched.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages sent to the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room under a display name.
    Join { room: String, name: String },
    /// Leave the current room.
    Leave,
    /// Broadcast a game payload to everyone in the room (including the
    /// sender, which is how "broadcast to all participants including
    /// itself" is realized).
    Broadcast { payload: GamePayload },
    /// Send a game payload point-to-point to one participant.
    Direct { to: String, payload: GamePayload },
}

/// A participant as announced by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub name: String,
}

/// Messages received from the relay server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms a room join; carries this node's assigned id, the current
    /// leader and the ordered peer list (join order), from which every
    /// node computes the same turn order.
    Joined {
        room: String,
        participant_id: String,
        leader_id: String,
        peers: Vec<PeerInfo>,
    },
    PeerJoined { peer: PeerInfo },
    PeerLeft { peer_id: String },
    /// The leader disconnected and the oldest remaining peer took over.
    LeaderChanged { leader_id: String },
    /// A routed game payload.
    Relay { from: String, payload: GamePayload },
    Error { message: String },
}

/// Game-level payloads routed by the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GamePayload {
    /// Leader broadcast: every participant must reply with its session
    /// (or an empty sentinel), point-to-point, at most once.
    RequestSubmissions,
    /// A participant's reply to `RequestSubmissions`.
    SubmitSession { session: DrawingSession },
    /// The leader's frozen canonical list. Receivers replace their slot
    /// stores wholesale with it.
    CanonicalSessions { sessions: Vec<DrawingSession> },
    /// Commands harvested from one committed turn.
    TurnContribution {
        author_id: String,
        commands: Vec<DrawingCommand>,
    },
    /// Shared-state store synchronization.
    StateUpdate { update: StateUpdate },
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl ServerMessage {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
