//! Round-robin turn arbitration for exclusive drawing rights.
//!
//! One participant at a time holds the turn; the leader alone advances the
//! shared index, every other node observes index changes and computes
//! whose turn it is locally. The gate is advisory: it is enforced at the
//! recorder/input layer, not cryptographically.
//!
//! State machine per drawing round:
//! `Idle -> TurnActive(p) -> AwaitingConfirmation(p) ->`
//! `{Committed -> next TurnActive, Cancelled -> same TurnActive}`.

use log::debug;
use thiserror::Error;

/// Phase of the current drawing round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No round running.
    #[default]
    Idle,
    /// The current participant may draw.
    TurnActive,
    /// The current participant finished drawing; input is revoked while
    /// the confirm/cancel decision is pending.
    AwaitingConfirmation,
}

/// Turn controller errors.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("no eligible participants")]
    NoParticipants,
    #[error("no turn is active")]
    NotActive,
    #[error("no confirmation is pending")]
    NotAwaitingConfirmation,
}

/// Arbitrates exclusive drawing turns over an ordered participant list
/// (leader excluded).
#[derive(Debug, Default)]
pub struct TurnController {
    /// Eligible participant ids in turn order.
    participants: Vec<String>,
    current: usize,
    phase: TurnPhase,
    /// Command-log length at the start of the current turn. Commands at or
    /// past this marker are the turn's contribution (commit) or the rollback
    /// set (cancel).
    marker: usize,
}

impl TurnController {
    /// Create a controller over the ordered non-leader participant list.
    pub fn new(participants: Vec<String>) -> Self {
        Self {
            participants,
            current: 0,
            phase: TurnPhase::Idle,
            marker: 0,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// The participant holding (or confirming) the current turn.
    pub fn current_participant(&self) -> Option<&str> {
        if self.phase == TurnPhase::Idle {
            return None;
        }
        self.participants.get(self.current).map(String::as_str)
    }

    /// Turn-start marker for the current turn.
    pub fn marker(&self) -> usize {
        self.marker
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    /// Whether `participant` currently holds exclusive drawing rights.
    /// Input is granted only while the turn is active, never while a
    /// confirmation is pending.
    pub fn may_draw(&self, participant: &str) -> bool {
        self.phase == TurnPhase::TurnActive
            && self.current_participant() == Some(participant)
    }

    /// Start a round: the first participant enters `TurnActive` with the
    /// given log length as their turn-start marker.
    pub fn begin_round(&mut self, log_len: usize) -> Result<&str, TurnError> {
        if self.participants.is_empty() {
            return Err(TurnError::NoParticipants);
        }
        self.current = 0;
        self.marker = log_len;
        self.phase = TurnPhase::TurnActive;
        debug!("round started, first turn: {}", self.participants[0]);
        Ok(&self.participants[0])
    }

    /// The active participant finished drawing; revoke input immediately
    /// and wait for confirm or cancel.
    pub fn draw_completed(&mut self) -> Result<(), TurnError> {
        if self.phase != TurnPhase::TurnActive {
            return Err(TurnError::NotActive);
        }
        self.phase = TurnPhase::AwaitingConfirmation;
        Ok(())
    }

    /// Commit the pending turn: the next participant (wrapping modulo the
    /// list length) enters `TurnActive` with `log_len` as their marker.
    /// Returns the new active participant. Only the leader drives this.
    pub fn commit(&mut self, log_len: usize) -> Result<&str, TurnError> {
        if self.phase != TurnPhase::AwaitingConfirmation {
            return Err(TurnError::NotAwaitingConfirmation);
        }
        self.current = (self.current + 1) % self.participants.len();
        self.marker = log_len;
        self.phase = TurnPhase::TurnActive;
        debug!("turn committed, next: {}", self.participants[self.current]);
        Ok(&self.participants[self.current])
    }

    /// Cancel the pending turn: the same participant re-enters
    /// `TurnActive`. Returns the turn-start marker so the caller can roll
    /// the log and canvas back to it. Cancellation is local-only.
    pub fn cancel(&mut self) -> Result<usize, TurnError> {
        if self.phase != TurnPhase::AwaitingConfirmation {
            return Err(TurnError::NotAwaitingConfirmation);
        }
        self.phase = TurnPhase::TurnActive;
        debug!(
            "turn cancelled, retrying: {:?}",
            self.current_participant()
        );
        Ok(self.marker)
    }

    /// Round-wide timeout: a pending confirmation is forced straight to
    /// committed so the round always terminates. Returns the new active
    /// participant if a commit happened.
    pub fn force_timeout(&mut self, log_len: usize) -> Option<&str> {
        if self.phase == TurnPhase::AwaitingConfirmation {
            debug!("timeout forced pending confirmation to commit");
            return self.commit(log_len).ok();
        }
        None
    }

    /// Adopt a turn index observed from the leader. Followers use this to
    /// converge on whose turn it is without advancing the index themselves.
    pub fn apply_remote_index(&mut self, index: usize, log_len: usize) {
        if self.participants.is_empty() {
            return;
        }
        self.current = index % self.participants.len();
        self.marker = log_len;
        self.phase = TurnPhase::TurnActive;
    }

    /// Current index into the participant list, for broadcasting.
    pub fn index(&self) -> usize {
        self.current
    }

    /// End the round and return to `Idle`.
    pub fn end_round(&mut self) {
        self.phase = TurnPhase::Idle;
        self.current = 0;
        self.marker = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controller() -> TurnController {
        TurnController::new(vec!["b".to_string(), "c".to_string(), "d".to_string()])
    }

    #[test]
    fn test_begin_round_grants_first() {
        let mut tc = controller();
        assert_eq!(tc.begin_round(0).unwrap(), "b");
        assert!(tc.may_draw("b"));
        assert!(!tc.may_draw("c"));
    }

    #[test]
    fn test_empty_participant_list_rejected() {
        let mut tc = TurnController::new(Vec::new());
        assert!(matches!(tc.begin_round(0), Err(TurnError::NoParticipants)));
    }

    #[test]
    fn test_round_robin_full_cycle() {
        let mut tc = controller();
        tc.begin_round(0).unwrap();

        let mut visited = vec![tc.current_participant().unwrap().to_string()];
        for _ in 0..2 {
            tc.draw_completed().unwrap();
            let next = tc.commit(0).unwrap().to_string();
            visited.push(next);
        }
        assert_eq!(visited, vec!["b", "c", "d"]);

        // Wraps modulo N back to the first participant.
        tc.draw_completed().unwrap();
        assert_eq!(tc.commit(0).unwrap(), "b");
    }

    #[test]
    fn test_confirmation_revokes_input() {
        let mut tc = controller();
        tc.begin_round(0).unwrap();
        tc.draw_completed().unwrap();

        assert_eq!(tc.phase(), TurnPhase::AwaitingConfirmation);
        // Input revoked while the decision is pending.
        assert!(!tc.may_draw("b"));
    }

    #[test]
    fn test_cancel_keeps_participant_and_marker() {
        let mut tc = controller();
        tc.begin_round(5).unwrap();
        tc.draw_completed().unwrap();

        let marker = tc.cancel().unwrap();
        assert_eq!(marker, 5);
        assert_eq!(tc.current_participant(), Some("b"));
        assert!(tc.may_draw("b"));
    }

    #[test]
    fn test_commit_updates_marker() {
        let mut tc = controller();
        tc.begin_round(0).unwrap();
        tc.draw_completed().unwrap();
        tc.commit(7).unwrap();
        assert_eq!(tc.marker(), 7);
    }

    #[test]
    fn test_timeout_forces_commit() {
        let mut tc = controller();
        tc.begin_round(0).unwrap();

        // Nothing pending: timeout is a no-op.
        assert!(tc.force_timeout(0).is_none());

        tc.draw_completed().unwrap();
        assert_eq!(tc.force_timeout(3), Some("c"));
        assert_eq!(tc.phase(), TurnPhase::TurnActive);
    }

    #[test]
    fn test_invalid_transitions_rejected() {
        let mut tc = controller();
        assert!(matches!(tc.draw_completed(), Err(TurnError::NotActive)));
        assert!(matches!(
            tc.commit(0),
            Err(TurnError::NotAwaitingConfirmation)
        ));
        assert!(matches!(
            tc.cancel(),
            Err(TurnError::NotAwaitingConfirmation)
        ));
    }

    #[test]
    fn test_apply_remote_index() {
        let mut tc = controller();
        tc.apply_remote_index(2, 4);
        assert_eq!(tc.current_participant(), Some("d"));
        assert_eq!(tc.marker(), 4);
        assert!(tc.may_draw("d"));
    }
}
