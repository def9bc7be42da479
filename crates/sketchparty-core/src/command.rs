//! Drawing command log data model.
//!
//! A [`DrawingSession`] is one author's append-only ordered log of
//! [`DrawingCommand`]s. Commands are immutable once created; the timestamp
//! is a per-node monotonic value, so cross-author ordering is only
//! approximate (clocks are not synchronized between nodes).

use crate::color::SerializableColor;
use kurbo::{Point, Size};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Kind of geometric outline a geometry command paints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Ellipse,
    Line,
}

/// One immutable drawing action.
///
/// Geometry commands describe an outlined shape; flood-fill commands carry a
/// seed position already translated into the canvas's local coordinate frame,
/// so replay is independent of any per-node camera offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DrawingCommand {
    Geometry {
        shape: ShapeKind,
        /// Shape center in logical drawing-area coordinates.
        /// For lines this is the first endpoint.
        position: Point,
        /// Full extent of the shape. For lines, the vector to the second
        /// endpoint.
        size: Size,
        /// Rotation around the center, radians. Unused for lines.
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
        timestamp: u64,
        author_id: String,
        author_name: String,
    },
    FloodFill {
        /// Fill seed in logical drawing-area coordinates.
        position: Point,
        color: SerializableColor,
        timestamp: u64,
        author_id: String,
        author_name: String,
    },
}

impl DrawingCommand {
    /// Creation timestamp on the authoring node (milliseconds, monotonic
    /// per node only).
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Geometry { timestamp, .. } | Self::FloodFill { timestamp, .. } => *timestamp,
        }
    }

    /// Id of the participant that authored this command.
    pub fn author_id(&self) -> &str {
        match self {
            Self::Geometry { author_id, .. } | Self::FloodFill { author_id, .. } => author_id,
        }
    }

    /// Display name of the author.
    pub fn author_name(&self) -> &str {
        match self {
            Self::Geometry { author_name, .. } | Self::FloodFill { author_name, .. } => author_name,
        }
    }

    /// Whether this is a flood-fill command.
    pub fn is_flood_fill(&self) -> bool {
        matches!(self, Self::FloodFill { .. })
    }
}

/// One author's ordered command log for a drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingSession {
    /// Globally unique session identifier.
    pub session_id: Uuid,
    pub author_name: String,
    pub author_id: String,
    /// Creation timestamp on the authoring node (milliseconds).
    pub created_at: u64,
    /// Commands in local creation order. This order is not globally
    /// meaningful across sessions; replay re-sorts by timestamp.
    pub commands: Vec<DrawingCommand>,
}

impl DrawingSession {
    /// Create a new empty session for an author.
    ///
    /// A session with zero commands is a valid "drew nothing" sentinel and
    /// is filtered out before being treated as a real drawing.
    pub fn new(author_id: impl Into<String>, author_name: impl Into<String>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            author_name: author_name.into(),
            author_id: author_id.into(),
            created_at: now_millis(),
            commands: Vec::new(),
        }
    }

    /// Append a command in local creation order.
    pub fn push(&mut self, command: DrawingCommand) {
        self.commands.push(command);
    }

    /// Whether this session is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of commands in the log.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Serialize the session to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize a session from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Per-node monotonic timestamp source.
///
/// Successive calls always return strictly increasing values, even when the
/// wall clock stalls within a millisecond. Values from different nodes are
/// only approximately comparable.
#[derive(Debug, Default)]
pub struct LogicalClock {
    last: u64,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next timestamp, strictly greater than every previous one.
    pub fn next(&mut self) -> u64 {
        let now = now_millis();
        self.last = now.max(self.last + 1);
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry(ts: u64) -> DrawingCommand {
        DrawingCommand::Geometry {
            shape: ShapeKind::Rectangle,
            position: Point::new(10.0, 10.0),
            size: Size::new(4.0, 4.0),
            rotation: 0.0,
            color: SerializableColor::black(),
            thickness: 1.0,
            timestamp: ts,
            author_id: "a".to_string(),
            author_name: "Alice".to_string(),
        }
    }

    #[test]
    fn test_empty_session_is_sentinel() {
        let session = DrawingSession::new("a", "Alice");
        assert!(session.is_empty());
        assert_eq!(session.len(), 0);
    }

    #[test]
    fn test_push_preserves_order() {
        let mut session = DrawingSession::new("a", "Alice");
        session.push(geometry(1));
        session.push(geometry(2));
        assert_eq!(session.len(), 2);
        assert_eq!(session.commands[0].timestamp(), 1);
        assert_eq!(session.commands[1].timestamp(), 2);
    }

    #[test]
    fn test_session_json_roundtrip() {
        let mut session = DrawingSession::new("a", "Alice");
        session.push(geometry(7));
        session.push(DrawingCommand::FloodFill {
            position: Point::new(3.0, 4.0),
            color: SerializableColor::new(255, 0, 0, 255),
            timestamp: 8,
            author_id: "a".to_string(),
            author_name: "Alice".to_string(),
        });

        let json = session.to_json().unwrap();
        let back = DrawingSession::from_json(&json).unwrap();
        assert_eq!(session, back);
        assert!(back.commands[1].is_flood_fill());
    }

    #[test]
    fn test_logical_clock_strictly_increases() {
        let mut clock = LogicalClock::new();
        let mut last = 0;
        for _ in 0..100 {
            let ts = clock.next();
            assert!(ts > last);
            last = ts;
        }
    }
}
