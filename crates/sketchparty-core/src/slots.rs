//! Fixed-capacity indexed cache of drawing sessions.
//!
//! Holds the sessions available for later replay and selection. On every
//! node the store is replaced wholesale by the leader's canonical list at
//! the end of aggregation, which is what makes the indexed set identical
//! across peers.

use crate::command::DrawingSession;
use thiserror::Error;

/// Default number of slots.
pub const DEFAULT_SLOT_CAPACITY: usize = 8;

/// Slot store errors.
#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot index {index} out of range ({count} sessions stored)")]
    OutOfRange { index: usize, count: usize },
}

/// Indexed session cache with FIFO eviction.
#[derive(Debug, Clone)]
pub struct SlotStore {
    sessions: Vec<DrawingSession>,
    capacity: usize,
}

impl Default for SlotStore {
    fn default() -> Self {
        Self::new(DEFAULT_SLOT_CAPACITY)
    }
}

impl SlotStore {
    /// Create a store with the given capacity (at least one slot).
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of stored sessions.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Save a session, evicting the oldest entry when the store is full.
    /// Returns the index the session landed in.
    pub fn save(&mut self, session: DrawingSession) -> usize {
        if self.sessions.len() == self.capacity {
            self.sessions.remove(0);
        }
        self.sessions.push(session);
        self.sessions.len() - 1
    }

    /// Look up a session by slot index. Out-of-range indices are rejected
    /// without state change.
    pub fn get(&self, index: usize) -> Result<&DrawingSession, SlotError> {
        self.sessions.get(index).ok_or(SlotError::OutOfRange {
            index,
            count: self.sessions.len(),
        })
    }

    /// Remove every stored session (phase reset).
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    /// Replace the whole store with a canonical list: empty sentinel
    /// sessions are filtered out and slot indices follow the list's order.
    /// Nothing previously held survives.
    pub fn replace_all(&mut self, sessions: Vec<DrawingSession>) {
        self.sessions = sessions.into_iter().filter(|s| !s.is_empty()).collect();
        if self.sessions.len() > self.capacity {
            self.sessions.truncate(self.capacity);
        }
    }

    /// Stored sessions in slot order.
    pub fn sessions(&self) -> &[DrawingSession] {
        &self.sessions
    }
}
