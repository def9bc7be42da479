//! Deterministic replay of command logs onto a canvas.
//!
//! Replay always performs a full reset first (clear and recreate the
//! rasterization target); incremental replay onto a dirty canvas is
//! disallowed because stale canvas state causes silent rendering
//! divergence. Commands are stable-sorted by timestamp before execution so
//! the visual result is independent of arrival order; ties keep their
//! original order.

use crate::command::{DrawingCommand, DrawingSession};
use crate::raster::Canvas;
use std::time::Duration;

/// Fixed delay between commands in paced playback.
pub const INTER_COMMAND_DELAY: Duration = Duration::from_millis(400);

/// How a replay executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayMode {
    /// Execute every command back-to-back in one pass.
    #[default]
    Instant,
    /// Execute one command, yield for [`INTER_COMMAND_DELAY`], repeat.
    Paced,
}

/// Replays command lists and sessions onto a canvas.
///
/// Each executed command is also queued as an applied-command notification
/// (drained via [`ReplayEngine::take_applied`]) so the presentation layer
/// can mirror the outline objects; flood fill itself depends on bitmap
/// state, which is why geometry is re-rasterized rather than only
/// re-created as scene objects.
#[derive(Debug, Default)]
pub struct ReplayEngine {
    applied: Vec<DrawingCommand>,
}

impl ReplayEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay a command list instantly.
    pub fn replay_instant(&mut self, commands: &[DrawingCommand], canvas: &mut Canvas) {
        canvas.reinitialize();
        for command in sorted_for_replay(commands) {
            canvas.apply(&command);
            self.applied.push(command);
        }
    }

    /// Replay a session instantly. A missing or empty session clears the
    /// canvas and nothing else happens; that is success, not an error.
    pub fn replay_session(&mut self, session: Option<&DrawingSession>, canvas: &mut Canvas) {
        match session {
            Some(s) if !s.is_empty() => self.replay_instant(&s.commands, canvas),
            _ => canvas.reinitialize(),
        }
    }

    /// Begin paced playback. The canvas is reset immediately; the caller
    /// then drives [`PacedPlayback::advance`] from its timer, waiting the
    /// reported delay between steps.
    pub fn begin_paced(&self, commands: &[DrawingCommand], canvas: &mut Canvas) -> PacedPlayback {
        canvas.reinitialize();
        PacedPlayback {
            commands: sorted_for_replay(commands),
            next: 0,
            cancelled: false,
        }
    }

    /// Drain applied-command notifications for the presentation layer.
    pub fn take_applied(&mut self) -> Vec<DrawingCommand> {
        std::mem::take(&mut self.applied)
    }
}

/// Stable timestamp-ascending order; ties break by original position.
fn sorted_for_replay(commands: &[DrawingCommand]) -> Vec<DrawingCommand> {
    let mut sorted = commands.to_vec();
    sorted.sort_by_key(DrawingCommand::timestamp);
    sorted
}

/// One step of a paced replay.
#[derive(Debug, Clone)]
pub struct PacedStep {
    /// The command just executed.
    pub command: DrawingCommand,
    /// Delay before the next `advance` call; `None` after the last command.
    pub delay: Option<Duration>,
}

/// An explicit, cancellable paced-playback task.
///
/// The playback does not own a timer; the surrounding event loop calls
/// [`PacedPlayback::advance`] and schedules the next call after the
/// returned delay, so broadcast and turn messages keep being handled in
/// between.
#[derive(Debug)]
pub struct PacedPlayback {
    commands: Vec<DrawingCommand>,
    next: usize,
    cancelled: bool,
}

impl PacedPlayback {
    /// Execute the next command. Returns `None` when playback is finished
    /// or cancelled.
    pub fn advance(&mut self, canvas: &mut Canvas) -> Option<PacedStep> {
        if self.cancelled || self.next >= self.commands.len() {
            return None;
        }
        let command = self.commands[self.next].clone();
        canvas.apply(&command);
        self.next += 1;
        let delay = (self.next < self.commands.len()).then_some(INTER_COMMAND_DELAY);
        Some(PacedStep { command, delay })
    }

    /// Stop playback; subsequent `advance` calls return `None`.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_finished(&self) -> bool {
        self.cancelled || self.next >= self.commands.len()
    }

    /// Commands remaining to execute.
    pub fn remaining(&self) -> usize {
        if self.cancelled {
            0
        } else {
            self.commands.len() - self.next
        }
    }
}
