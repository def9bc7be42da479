//! Small versioned shared-state store with typed change notifications.
//!
//! Replaces the room-wide string-keyed property bag the surrounding game
//! flow would otherwise use for cross-node signaling (turn index, round
//! flags). Anyone can read the latest value; local writes bump a
//! per-key version and yield an update payload for broadcast; stale remote
//! updates (version not newer than what is held) are ignored, so all nodes
//! converge on the highest-versioned value per key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Typed keys for the shared room state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateKey {
    /// Index into the turn order, advanced only by the leader.
    TurnIndex,
    /// Whether a confirmation is pending for the current turn.
    AwaitingConfirmation,
    /// Expected participant count for the running aggregation round.
    AggregationExpected,
    /// Whether a drawing round is in progress.
    RoundActive,
}

/// Value stored under a state key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StateValue {
    Unsigned(u64),
    Bool(bool),
    Text(String),
}

/// A versioned update, broadcast to all peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub key: StateKey,
    pub version: u64,
    pub value: StateValue,
}

/// A change notification delivered to local subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub key: StateKey,
    pub value: StateValue,
    pub version: u64,
    /// Whether the change came from a remote update rather than a local set.
    pub remote: bool,
}

#[derive(Debug, Clone)]
struct VersionedValue {
    version: u64,
    value: StateValue,
}

/// Per-node view of the shared room state.
#[derive(Debug, Default)]
pub struct SharedStateStore {
    entries: HashMap<StateKey, VersionedValue>,
    changes: Vec<StateChange>,
    outgoing: Vec<StateUpdate>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest value for a key, if any node has ever set it.
    pub fn get(&self, key: StateKey) -> Option<&StateValue> {
        self.entries.get(&key).map(|v| &v.value)
    }

    pub fn get_u64(&self, key: StateKey) -> Option<u64> {
        match self.get(key) {
            Some(StateValue::Unsigned(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: StateKey) -> Option<bool> {
        match self.get(key) {
            Some(StateValue::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    /// Set a value locally. Bumps the key's version, notifies subscribers,
    /// and queues the update for broadcast.
    pub fn set(&mut self, key: StateKey, value: StateValue) -> StateUpdate {
        let version = self.entries.get(&key).map_or(1, |v| v.version + 1);
        self.entries.insert(
            key,
            VersionedValue {
                version,
                value: value.clone(),
            },
        );
        let update = StateUpdate {
            key,
            version,
            value: value.clone(),
        };
        self.changes.push(StateChange {
            key,
            value,
            version,
            remote: false,
        });
        self.outgoing.push(update.clone());
        update
    }

    /// Apply an update received from a peer. Returns `false` when the
    /// update is stale (version not newer than the held one) and was
    /// ignored.
    pub fn apply_remote(&mut self, update: StateUpdate) -> bool {
        if let Some(held) = self.entries.get(&update.key) {
            if update.version <= held.version {
                return false;
            }
        }
        self.entries.insert(
            update.key,
            VersionedValue {
                version: update.version,
                value: update.value.clone(),
            },
        );
        self.changes.push(StateChange {
            key: update.key,
            value: update.value,
            version: update.version,
            remote: true,
        });
        true
    }

    /// Drain typed change notifications for local subscribers.
    pub fn take_changes(&mut self) -> Vec<StateChange> {
        std::mem::take(&mut self.changes)
    }

    /// Drain updates queued for broadcast.
    pub fn take_outgoing(&mut self) -> Vec<StateUpdate> {
        std::mem::take(&mut self.outgoing)
    }

    /// Forget everything (phase reset).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.changes.clear();
        self.outgoing.clear();
    }
}
