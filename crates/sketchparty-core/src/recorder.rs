//! Session recorder, the only writer of a command log.
//!
//! Turns completed user actions (a finished shape outline, a performed
//! flood fill) into [`DrawingCommand`]s and appends them to the current
//! session. Recording never fails; callers filter logically invalid
//! commands (zero-size shapes and the like) before recording.

use crate::color::SerializableColor;
use crate::command::{DrawingCommand, DrawingSession, LogicalClock, ShapeKind};
use kurbo::{Point, Size};

/// Appends drawing commands to the per-node current session.
///
/// Exactly one session is current per node at a time; starting a new one
/// discards any in-progress session. Every successful record is queued as a
/// notification for the turn-awareness collaborator (drained via
/// [`Recorder::take_notifications`]), which the surrounding game flow uses
/// to invalidate its undo stack.
#[derive(Debug, Default)]
pub struct Recorder {
    session: Option<DrawingSession>,
    paused: bool,
    clock: LogicalClock,
    notifications: Vec<DrawingCommand>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any in-progress session and begin a new empty one.
    pub fn start_new_session(&mut self, author_id: impl Into<String>, author_name: impl Into<String>) {
        self.session = Some(DrawingSession::new(author_id, author_name));
        self.notifications.clear();
    }

    /// Append a pre-built command unless recording is paused.
    pub fn record(&mut self, command: DrawingCommand) {
        if self.paused {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.push(command.clone());
        self.notifications.push(command);
    }

    /// Record a completed shape outline.
    pub fn record_shape(
        &mut self,
        shape: ShapeKind,
        position: Point,
        size: Size,
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
    ) {
        let Some(command) = self.build_geometry(shape, position, size, rotation, color, thickness)
        else {
            return;
        };
        self.record(command);
    }

    /// Record a performed flood fill. The position must already be in the
    /// canvas's local coordinate frame.
    pub fn record_fill(&mut self, position: Point, color: SerializableColor) {
        let Some((author_id, author_name)) = self.author() else {
            return;
        };
        let command = DrawingCommand::FloodFill {
            position,
            color,
            timestamp: self.clock.next(),
            author_id,
            author_name,
        };
        self.record(command);
    }

    /// Make `record` a no-op without losing the current session.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume recording after a pause.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The current session, if one was started.
    pub fn session(&self) -> Option<&DrawingSession> {
        self.session.as_ref()
    }

    /// Take the current session out of the recorder (e.g. to submit it).
    pub fn take_session(&mut self) -> Option<DrawingSession> {
        self.session.take()
    }

    /// A clone of the current session, or an empty sentinel for the given
    /// author when nothing was recorded.
    pub fn session_or_empty(&self, author_id: &str, author_name: &str) -> DrawingSession {
        self.session
            .clone()
            .unwrap_or_else(|| DrawingSession::new(author_id, author_name))
    }

    /// Number of commands in the current session. Used as the turn-start
    /// marker by the turn controller.
    pub fn len(&self) -> usize {
        self.session.as_ref().map_or(0, DrawingSession::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every command recorded at or after `marker`. Used by turn
    /// cancellation together with the canvas snapshot restore.
    pub fn truncate(&mut self, marker: usize) {
        if let Some(session) = self.session.as_mut() {
            session.commands.truncate(marker);
        }
    }

    /// Commands recorded at or after `marker`, in creation order. Used to
    /// harvest one turn's contribution for broadcast.
    pub fn commands_since(&self, marker: usize) -> Vec<DrawingCommand> {
        self.session
            .as_ref()
            .map(|s| s.commands.get(marker..).unwrap_or_default().to_vec())
            .unwrap_or_default()
    }

    /// Drain pending new-command notifications.
    pub fn take_notifications(&mut self) -> Vec<DrawingCommand> {
        std::mem::take(&mut self.notifications)
    }

    fn author(&self) -> Option<(String, String)> {
        self.session
            .as_ref()
            .map(|s| (s.author_id.clone(), s.author_name.clone()))
    }

    fn build_geometry(
        &mut self,
        shape: ShapeKind,
        position: Point,
        size: Size,
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
    ) -> Option<DrawingCommand> {
        let (author_id, author_name) = self.author()?;
        Some(DrawingCommand::Geometry {
            shape,
            position,
            size,
            rotation,
            color,
            thickness,
            timestamp: self.clock.next(),
            author_id,
            author_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_one(recorder: &mut Recorder) {
        recorder.record_shape(
            ShapeKind::Rectangle,
            Point::new(10.0, 10.0),
            Size::new(4.0, 4.0),
            0.0,
            SerializableColor::black(),
            1.0,
        );
    }

    #[test]
    fn test_record_requires_session() {
        let mut recorder = Recorder::new();
        record_one(&mut recorder);
        assert!(recorder.session().is_none());
        assert!(recorder.take_notifications().is_empty());
    }

    #[test]
    fn test_record_appends_and_notifies() {
        let mut recorder = Recorder::new();
        recorder.start_new_session("a", "Alice");
        record_one(&mut recorder);
        recorder.record_fill(Point::new(1.0, 2.0), SerializableColor::new(255, 0, 0, 255));

        assert_eq!(recorder.len(), 2);
        let notes = recorder.take_notifications();
        assert_eq!(notes.len(), 2);
        assert!(notes[1].is_flood_fill());
        // Drained.
        assert!(recorder.take_notifications().is_empty());
    }

    #[test]
    fn test_pause_resume() {
        let mut recorder = Recorder::new();
        recorder.start_new_session("a", "Alice");

        recorder.pause();
        record_one(&mut recorder);
        assert_eq!(recorder.len(), 0);

        recorder.resume();
        record_one(&mut recorder);
        assert_eq!(recorder.len(), 1);
    }

    #[test]
    fn test_new_session_discards_previous() {
        let mut recorder = Recorder::new();
        recorder.start_new_session("a", "Alice");
        record_one(&mut recorder);

        recorder.start_new_session("a", "Alice");
        assert_eq!(recorder.len(), 0);
        assert!(recorder.take_notifications().is_empty());
    }

    #[test]
    fn test_timestamps_increase() {
        let mut recorder = Recorder::new();
        recorder.start_new_session("a", "Alice");
        record_one(&mut recorder);
        record_one(&mut recorder);

        let session = recorder.session().unwrap();
        assert!(session.commands[0].timestamp() < session.commands[1].timestamp());
    }

    #[test]
    fn test_truncate_and_commands_since() {
        let mut recorder = Recorder::new();
        recorder.start_new_session("a", "Alice");
        record_one(&mut recorder);
        let marker = recorder.len();
        record_one(&mut recorder);
        record_one(&mut recorder);

        assert_eq!(recorder.commands_since(marker).len(), 2);
        recorder.truncate(marker);
        assert_eq!(recorder.len(), 1);
        assert!(recorder.commands_since(marker).is_empty());
    }

    #[test]
    fn test_session_or_empty_sentinel() {
        let recorder = Recorder::new();
        let session = recorder.session_or_empty("b", "Bob");
        assert!(session.is_empty());
        assert_eq!(session.author_id, "b");
    }
}
