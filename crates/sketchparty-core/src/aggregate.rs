//! Leader-side aggregation of per-participant sessions.
//!
//! The leader collects exactly one session per participant (an empty
//! sentinel counts as a reply), freezes the collection into a canonical
//! ordered list once every expected participant has replied, and
//! broadcasts that list so all nodes replace their slot stores with the
//! same indexed set. Session contents are never merged; conflicts are
//! resolved by whole-session replacement.
//!
//! There is no timeout here: if a participant never replies, aggregation
//! stalls and the surrounding phase controller must drive an explicit
//! abort or retry.

use crate::command::DrawingSession;
use log::{debug, warn};

/// Outcome of accepting one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// First reply from this author; the effective count grew.
    Accepted,
    /// A repeat reply from an author that already submitted. The stored
    /// session is replaced but the effective count does not change.
    Duplicate,
    /// The round is not running (never started, aborted, or frozen).
    NotCollecting,
}

/// Leader-only aggregation state for one round.
#[derive(Debug, Default)]
pub struct AggregationCoordinator {
    expected: usize,
    collecting: bool,
    /// Received sessions in first-arrival order, at most one per author id.
    received: Vec<DrawingSession>,
    /// Canonical list, present once the collection is complete and frozen.
    canonical: Option<Vec<DrawingSession>>,
}

impl AggregationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a collection round: set the expected participant count and
    /// clear everything from previous rounds.
    pub fn begin(&mut self, expected: usize) {
        debug!("aggregation round started, expecting {expected} submissions");
        self.expected = expected;
        self.collecting = expected > 0;
        self.received.clear();
        self.canonical = None;
        if expected == 0 {
            // Nothing to wait for; freeze the empty list immediately.
            self.canonical = Some(Vec::new());
        }
    }

    /// Accept one participant's reply. At-most-once per author id: repeats
    /// replace the stored session without growing the effective count.
    pub fn submit(&mut self, session: DrawingSession) -> SubmissionOutcome {
        if !self.collecting {
            warn!(
                "submission from {} ignored, no aggregation round in progress",
                session.author_id
            );
            return SubmissionOutcome::NotCollecting;
        }

        if let Some(existing) = self
            .received
            .iter_mut()
            .find(|s| s.author_id == session.author_id)
        {
            debug!("duplicate submission from {}", session.author_id);
            *existing = session;
            return SubmissionOutcome::Duplicate;
        }

        debug!(
            "submission from {} ({} commands), {}/{} received",
            session.author_id,
            session.len(),
            self.received.len() + 1,
            self.expected
        );
        self.received.push(session);

        if self.received.len() >= self.expected {
            self.freeze();
        }
        SubmissionOutcome::Accepted
    }

    /// Number of distinct authors that have replied.
    pub fn received_count(&self) -> usize {
        self.received.len()
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Whether the collection reached the expected count and was frozen.
    pub fn is_complete(&self) -> bool {
        self.canonical.is_some()
    }

    /// Whether a round is running and still waiting for replies.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// The frozen canonical list, in the order submissions first arrived at
    /// the leader. Identical on every node because only this exact list is
    /// broadcast. `None` until the round completes.
    pub fn canonical(&self) -> Option<&[DrawingSession]> {
        self.canonical.as_deref()
    }

    /// Abandon the round, discarding everything received so far. Called by
    /// the surrounding phase controller when a stalled round times out.
    pub fn abort(&mut self) {
        if self.collecting || !self.received.is_empty() {
            debug!(
                "aggregation aborted with {}/{} submissions",
                self.received.len(),
                self.expected
            );
        }
        self.collecting = false;
        self.received.clear();
        self.canonical = None;
        self.expected = 0;
    }

    fn freeze(&mut self) {
        debug!("aggregation complete, freezing canonical list");
        self.collecting = false;
        self.canonical = Some(self.received.clone());
    }
}
