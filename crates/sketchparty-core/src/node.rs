//! Per-node coordination façade.
//!
//! A [`DrawingNode`] owns the recorder, canvas, replay engine, slot store,
//! aggregation coordinator, turn controller and shared-state view for one
//! participant, and routes game payloads between them. Networking stays
//! outside: the node queues [`OutgoingMessage`]s for the caller to send and
//! consumes payloads the caller received, so the same node drives a
//! networked room, a hotseat game on one machine, or a test harness.

use crate::aggregate::{AggregationCoordinator, SubmissionOutcome};
use crate::color::SerializableColor;
use crate::command::{DrawingCommand, DrawingSession, ShapeKind};
use crate::protocol::{GamePayload, PeerInfo};
use crate::raster::{Canvas, CanvasSnapshot, RasterError};
use crate::recorder::Recorder;
use crate::replay::{PacedPlayback, PacedStep, ReplayEngine, ReplayMode};
use crate::slots::{SlotError, SlotStore};
use crate::state_store::{SharedStateStore, StateKey, StateValue};
use crate::storage::{BoxFuture, Storage, StorageResult};
use crate::turn::{TurnController, TurnError, TurnPhase};
use kurbo::{Point, Size};
use log::warn;

/// Messages queued for the caller to send through the relay.
#[derive(Debug, Clone)]
pub enum OutgoingMessage {
    /// Broadcast to the whole room, including this node.
    Broadcast(GamePayload),
    /// Point-to-point to one participant.
    Direct { to: String, payload: GamePayload },
}

/// Events for the presentation layer, drained via
/// [`DrawingNode::take_events`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    /// The pixel buffer changed and should be re-presented.
    CanvasChanged,
    /// A participant's turn began.
    TurnStarted { participant_id: String },
    /// The active participant finished drawing; confirm or cancel pending.
    ConfirmationPending { participant_id: String },
    /// A turn was committed.
    TurnCommitted { participant_id: String },
    /// The pending turn was cancelled locally and rolled back.
    TurnCancelled,
    /// The drawing round ended.
    RoundEnded,
    /// Leader-side aggregation progress.
    SubmissionProgress { received: usize, expected: usize },
    /// Aggregation was abandoned (e.g. a participant left mid-round).
    AggregationAborted,
    /// The slot store was replaced by the canonical list.
    SlotsReplaced { count: usize },
    /// A session was saved to a slot without aggregation (hotseat mode).
    SessionSaved { index: usize },
}

/// One participant's engine state.
pub struct DrawingNode {
    participant_id: String,
    participant_name: String,
    /// `None` means hotseat mode: no relay, everything resolves locally.
    leader_id: Option<String>,
    /// Room roster in join order.
    roster: Vec<PeerInfo>,
    recorder: Recorder,
    canvas: Canvas,
    replay: ReplayEngine,
    slots: SlotStore,
    aggregation: AggregationCoordinator,
    turn: TurnController,
    state: SharedStateStore,
    /// Every command applied this round, own and remote, in arrival order.
    round_log: Vec<DrawingCommand>,
    round_marker: usize,
    /// Whether this node already broadcast its contribution for the
    /// current turn. A forced commit must not lose unsent commands, a
    /// confirmed one must not send them twice.
    contribution_sent: bool,
    /// Buffer state at the start of the current turn, for cancellation.
    turn_snapshot: Option<CanvasSnapshot>,
    playback: Option<PacedPlayback>,
    events: Vec<NodeEvent>,
    outgoing: Vec<OutgoingMessage>,
}

impl DrawingNode {
    pub fn new(
        participant_id: impl Into<String>,
        participant_name: impl Into<String>,
        width: usize,
        height: usize,
        area: Size,
    ) -> Result<Self, RasterError> {
        Ok(Self {
            participant_id: participant_id.into(),
            participant_name: participant_name.into(),
            leader_id: None,
            roster: Vec::new(),
            recorder: Recorder::new(),
            canvas: Canvas::new(width, height, area)?,
            replay: ReplayEngine::new(),
            slots: SlotStore::default(),
            aggregation: AggregationCoordinator::new(),
            turn: TurnController::new(Vec::new()),
            state: SharedStateStore::new(),
            round_log: Vec::new(),
            round_marker: 0,
            contribution_sent: false,
            turn_snapshot: None,
            playback: None,
            events: Vec::new(),
            outgoing: Vec::new(),
        })
    }

    pub fn participant_id(&self) -> &str {
        &self.participant_id
    }

    pub fn is_leader(&self) -> bool {
        self.leader_id.as_deref() == Some(self.participant_id.as_str())
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Raw RGBA8 buffer for the presentation layer.
    pub fn pixels(&self) -> &[u8] {
        self.canvas.pixels()
    }

    pub fn turn_phase(&self) -> TurnPhase {
        self.turn.phase()
    }

    pub fn current_participant(&self) -> Option<&str> {
        self.turn.current_participant()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.count()
    }

    pub fn slot(&self, index: usize) -> Result<&DrawingSession, SlotError> {
        self.slots.get(index)
    }

    pub fn clear_slots(&mut self) {
        self.slots.clear();
    }

    // ------------------------------------------------------------------
    // Room membership
    // ------------------------------------------------------------------

    /// Adopt the room roster and leader reported on join.
    ///
    /// Roster changes rebuild the turn order (leader excluded, join order
    /// preserved) and reset arbitration to idle.
    pub fn set_room(&mut self, leader_id: impl Into<String>, peers: Vec<PeerInfo>) {
        self.leader_id = Some(leader_id.into());
        self.roster = peers;
        self.rebuild_turn();
    }

    pub fn peer_joined(&mut self, peer: PeerInfo) {
        if self.roster.iter().any(|p| p.id == peer.id) {
            return;
        }
        self.roster.push(peer);
        self.rebuild_turn();
    }

    pub fn peer_left(&mut self, peer_id: &str) {
        self.roster.retain(|p| p.id != peer_id);
        self.rebuild_turn();
        if self.is_leader() && self.aggregation.is_collecting() {
            // The expected count can no longer be reached.
            self.aggregation.abort();
            self.events.push(NodeEvent::AggregationAborted);
        }
    }

    pub fn leader_changed(&mut self, leader_id: impl Into<String>) {
        self.leader_id = Some(leader_id.into());
        self.rebuild_turn();
    }

    /// Hotseat mode: a local turn order with no relay behind it.
    pub fn set_local_participants(&mut self, participants: Vec<String>) {
        self.leader_id = None;
        self.roster.clear();
        self.turn = TurnController::new(participants);
    }

    fn rebuild_turn(&mut self) {
        let eligible = self
            .roster
            .iter()
            .filter(|p| Some(p.id.as_str()) != self.leader_id.as_deref())
            .map(|p| p.id.clone())
            .collect();
        self.turn = TurnController::new(eligible);
    }

    // ------------------------------------------------------------------
    // Drawing
    // ------------------------------------------------------------------

    /// Start a fresh session and clear the canvas.
    pub fn begin_drawing(&mut self) {
        self.recorder
            .start_new_session(self.participant_id.clone(), self.participant_name.clone());
        self.canvas.reinitialize();
        self.round_log.clear();
        self.round_marker = 0;
        self.events.push(NodeEvent::CanvasChanged);
    }

    /// Whether drawing input is currently accepted on this node.
    pub fn can_draw(&self) -> bool {
        match self.turn.phase() {
            TurnPhase::Idle => true,
            TurnPhase::AwaitingConfirmation => false,
            TurnPhase::TurnActive => {
                // Hotseat: whoever is at the keyboard is the active player.
                self.leader_id.is_none() || self.turn.may_draw(&self.participant_id)
            }
        }
    }

    /// Draw a shape outline. Returns `false` when input is gated off or the
    /// shape was rejected as logically invalid.
    pub fn draw_shape(
        &mut self,
        shape: ShapeKind,
        position: Point,
        size: Size,
        rotation: f64,
        color: SerializableColor,
        thickness: f64,
    ) -> bool {
        if !self.can_draw() {
            return false;
        }
        self.recorder
            .record_shape(shape, position, size, rotation, color, thickness);
        let recorded = self.recorder.take_notifications();
        if recorded.is_empty() {
            return false;
        }
        for command in &recorded {
            self.canvas.apply(command);
        }
        self.round_log.extend(recorded);
        self.events.push(NodeEvent::CanvasChanged);
        true
    }

    /// Flood fill at a logical position. A refused fill (boundary seed,
    /// matching color, out of bounds) records nothing and returns `false`.
    pub fn flood_fill(&mut self, position: Point, color: SerializableColor) -> bool {
        if !self.can_draw() {
            return false;
        }
        if !self.canvas.flood_fill(position, color) {
            return false;
        }
        self.recorder.record_fill(position, color);
        self.round_log.extend(self.recorder.take_notifications());
        self.events.push(NodeEvent::CanvasChanged);
        true
    }

    // ------------------------------------------------------------------
    // Turn arbitration
    // ------------------------------------------------------------------

    /// Begin a drawing round. Driven by the leader (or locally in hotseat
    /// mode); followers pick the round up from the shared state.
    pub fn start_round(&mut self) -> Result<(), TurnError> {
        self.turn
            .begin_round(self.recorder.len())
            .map(str::to_string)?;
        self.state
            .set(StateKey::RoundActive, StateValue::Bool(true));
        self.state.set(
            StateKey::TurnIndex,
            StateValue::Unsigned(self.turn.index() as u64),
        );
        self.flush_state();
        self.begin_turn();
        Ok(())
    }

    /// The active participant finished drawing; input is revoked until the
    /// confirm/cancel decision.
    pub fn finish_drawing(&mut self) -> Result<(), TurnError> {
        self.turn.draw_completed()?;
        self.recorder.pause();
        self.state
            .set(StateKey::AwaitingConfirmation, StateValue::Bool(true));
        self.flush_state();
        if let Some(p) = self.turn.current_participant().map(str::to_string) {
            self.events
                .push(NodeEvent::ConfirmationPending { participant_id: p });
        }
        Ok(())
    }

    /// Confirm the pending turn. Networked nodes broadcast their
    /// contribution and let the leader advance the turn; hotseat commits
    /// locally.
    pub fn confirm(&mut self) -> Result<(), TurnError> {
        if self.turn.phase() != TurnPhase::AwaitingConfirmation {
            return Err(TurnError::NotAwaitingConfirmation);
        }
        self.recorder.resume();
        let commands = self.recorder.commands_since(self.turn.marker());
        if self.leader_id.is_some() {
            self.outgoing
                .push(OutgoingMessage::Broadcast(GamePayload::TurnContribution {
                    author_id: self.participant_id.clone(),
                    commands,
                }));
            self.contribution_sent = true;
            self.state
                .set(StateKey::AwaitingConfirmation, StateValue::Bool(false));
            self.flush_state();
        } else {
            let author = self
                .turn
                .current_participant()
                .unwrap_or(self.participant_id.as_str())
                .to_string();
            self.commit_turn(&author);
        }
        Ok(())
    }

    /// Cancel the pending turn. Local-only: the rollback never leaves this
    /// node because the cancelled commands were never broadcast.
    pub fn cancel(&mut self) -> Result<(), TurnError> {
        let marker = self.turn.cancel()?;
        self.recorder.truncate(marker);
        self.round_log.truncate(self.round_marker);
        if let Some(snapshot) = self.turn_snapshot.as_ref() {
            if let Err(e) = self.canvas.restore(snapshot) {
                log::error!("snapshot restore failed: {e}");
            }
        }
        self.recorder.resume();
        self.events.push(NodeEvent::TurnCancelled);
        self.events.push(NodeEvent::CanvasChanged);
        Ok(())
    }

    /// Force a stalled confirmation to commit so the round terminates.
    pub fn force_timeout(&mut self) {
        let pending = self.turn.current_participant().map(str::to_string);
        let forced = self
            .turn
            .force_timeout(self.recorder.len())
            .map(str::to_string);
        if forced.is_some() {
            if let Some(author) = pending {
                self.events.push(NodeEvent::TurnCommitted {
                    participant_id: author,
                });
            }
            self.state.set(
                StateKey::TurnIndex,
                StateValue::Unsigned(self.turn.index() as u64),
            );
            self.flush_state();
            self.begin_turn();
        }
    }

    /// End the round and return everyone to idle.
    pub fn end_round(&mut self) {
        self.turn.end_round();
        self.state
            .set(StateKey::RoundActive, StateValue::Bool(false));
        self.flush_state();
        self.events.push(NodeEvent::RoundEnded);
    }

    fn commit_turn(&mut self, author_id: &str) {
        if self.turn.phase() == TurnPhase::TurnActive {
            let _ = self.turn.draw_completed();
        }
        let committed = self
            .turn
            .commit(self.recorder.len())
            .map(str::to_string);
        match committed {
            Ok(_next) => {
                self.events.push(NodeEvent::TurnCommitted {
                    participant_id: author_id.to_string(),
                });
                self.state.set(
                    StateKey::TurnIndex,
                    StateValue::Unsigned(self.turn.index() as u64),
                );
                self.flush_state();
                self.begin_turn();
            }
            Err(e) => warn!("turn commit rejected: {e}"),
        }
    }

    fn begin_turn(&mut self) {
        self.turn_snapshot = Some(self.canvas.snapshot());
        self.round_marker = self.round_log.len();
        self.contribution_sent = false;
        if let Some(p) = self.turn.current_participant().map(str::to_string) {
            self.events
                .push(NodeEvent::TurnStarted { participant_id: p });
        }
    }

    // ------------------------------------------------------------------
    // Aggregation
    // ------------------------------------------------------------------

    /// Collect one session per participant. The leader broadcasts the
    /// request and waits for replies; a hotseat node stores its session
    /// directly.
    pub fn request_submissions(&mut self) {
        if self.leader_id.is_none() {
            let session = self.submission();
            if !session.is_empty() {
                let index = self.slots.save(session);
                self.events.push(NodeEvent::SessionSaved { index });
            }
            return;
        }
        if !self.is_leader() {
            warn!("only the leader requests submissions");
            return;
        }
        let expected = self.roster.len();
        self.aggregation.begin(expected);
        self.state.set(
            StateKey::AggregationExpected,
            StateValue::Unsigned(expected as u64),
        );
        self.flush_state();
        self.outgoing
            .push(OutgoingMessage::Broadcast(GamePayload::RequestSubmissions));
    }

    /// The current session, or an empty sentinel so the reply still counts.
    fn submission(&mut self) -> DrawingSession {
        self.recorder.take_session().unwrap_or_else(|| {
            DrawingSession::new(self.participant_id.clone(), self.participant_name.clone())
        })
    }

    fn accept_submission(&mut self, session: DrawingSession) {
        let outcome = self.aggregation.submit(session);
        if outcome == SubmissionOutcome::NotCollecting {
            return;
        }
        self.events.push(NodeEvent::SubmissionProgress {
            received: self.aggregation.received_count(),
            expected: self.aggregation.expected(),
        });
        if self.aggregation.is_complete() {
            if let Some(canonical) = self.aggregation.canonical() {
                let sessions = canonical.to_vec();
                self.outgoing
                    .push(OutgoingMessage::Broadcast(GamePayload::CanonicalSessions {
                        sessions,
                    }));
            }
        }
    }

    // ------------------------------------------------------------------
    // Replay
    // ------------------------------------------------------------------

    /// Replay a stored session onto the canvas. `Paced` starts a playback
    /// driven by [`DrawingNode::advance_playback`].
    pub fn load_slot(&mut self, index: usize, mode: ReplayMode) -> Result<(), SlotError> {
        let session = self.slots.get(index)?.clone();
        match mode {
            ReplayMode::Instant => {
                self.replay.replay_session(Some(&session), &mut self.canvas);
            }
            ReplayMode::Paced => {
                self.playback = Some(self.replay.begin_paced(&session.commands, &mut self.canvas));
            }
        }
        self.events.push(NodeEvent::CanvasChanged);
        Ok(())
    }

    /// Execute the next paced-playback step. The caller schedules the next
    /// call after the returned delay.
    pub fn advance_playback(&mut self) -> Option<PacedStep> {
        let playback = self.playback.as_mut()?;
        match playback.advance(&mut self.canvas) {
            Some(step) => {
                if playback.is_finished() {
                    self.playback = None;
                }
                self.events.push(NodeEvent::CanvasChanged);
                Some(step)
            }
            None => {
                self.playback = None;
                None
            }
        }
    }

    /// Stop a running paced playback.
    pub fn cancel_playback(&mut self) {
        if let Some(mut playback) = self.playback.take() {
            playback.cancel();
        }
    }

    /// Drain applied-command notifications from the last replay, for
    /// presentation layers that mirror the outline objects.
    pub fn take_applied_commands(&mut self) -> Vec<DrawingCommand> {
        self.replay.take_applied()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write every stored slot session to a storage backend, keyed by
    /// session id, so a round's drawings survive the process.
    pub fn archive_slots<'a>(
        &'a self,
        storage: &'a dyn Storage,
    ) -> BoxFuture<'a, StorageResult<usize>> {
        let sessions: Vec<DrawingSession> = (0..self.slots.count())
            .filter_map(|i| self.slots.get(i).ok().cloned())
            .collect();
        Box::pin(async move {
            let count = sessions.len();
            for session in &sessions {
                storage
                    .save(&session.session_id.to_string(), session)
                    .await?;
            }
            Ok(count)
        })
    }

    /// Refill the slot store from archived sessions, oldest first.
    pub fn restore_archived<'a>(
        &'a mut self,
        storage: &'a dyn Storage,
    ) -> BoxFuture<'a, StorageResult<usize>> {
        Box::pin(async move {
            let mut sessions = Vec::new();
            for id in storage.list().await? {
                sessions.push(storage.load(&id).await?);
            }
            sessions.sort_by_key(|s| s.created_at);
            self.slots.replace_all(sessions);
            let count = self.slots.count();
            self.events.push(NodeEvent::SlotsReplaced { count });
            Ok(count)
        })
    }

    // ------------------------------------------------------------------
    // Payload routing
    // ------------------------------------------------------------------

    /// Route one relayed game payload.
    pub fn handle_payload(&mut self, from: &str, payload: GamePayload) {
        match payload {
            GamePayload::RequestSubmissions => {
                if Some(from) != self.leader_id.as_deref() {
                    warn!("submission request from non-leader {from} ignored");
                    return;
                }
                let session = self.submission();
                if self.is_leader() {
                    self.accept_submission(session);
                } else if let Some(leader) = self.leader_id.clone() {
                    self.outgoing.push(OutgoingMessage::Direct {
                        to: leader,
                        payload: GamePayload::SubmitSession { session },
                    });
                }
            }
            GamePayload::SubmitSession { session } => {
                if !self.is_leader() {
                    warn!("submission from {from} ignored, this node is not the leader");
                    return;
                }
                self.accept_submission(session);
            }
            GamePayload::CanonicalSessions { sessions } => {
                if Some(from) != self.leader_id.as_deref() {
                    warn!("canonical list from non-leader {from} ignored");
                    return;
                }
                self.slots.replace_all(sessions);
                self.events.push(NodeEvent::SlotsReplaced {
                    count: self.slots.count(),
                });
            }
            GamePayload::TurnContribution {
                author_id,
                commands,
            } => {
                if from != self.participant_id {
                    for command in &commands {
                        self.canvas.apply(command);
                    }
                    self.round_log.extend(commands);
                    self.events.push(NodeEvent::CanvasChanged);
                }
                // A contribution that arrives after a forced commit already
                // advanced the turn must not advance it again.
                if self.is_leader()
                    && self.turn.current_participant() == Some(author_id.as_str())
                {
                    self.commit_turn(&author_id);
                }
            }
            GamePayload::StateUpdate { update } => {
                if self.state.apply_remote(update) {
                    self.drain_state_changes();
                }
            }
        }
    }

    /// Broadcast this node's commands when the leader advanced the turn
    /// before the local confirm ran (a timeout-forced commit). Without this
    /// the forced participant's drawing would exist only on its own canvas.
    fn flush_pending_contribution(&mut self) {
        if self.contribution_sent
            || self.leader_id.is_none()
            || self.turn.phase() != TurnPhase::AwaitingConfirmation
            || self.turn.current_participant() != Some(self.participant_id.as_str())
        {
            return;
        }
        let commands = self.recorder.commands_since(self.turn.marker());
        if !commands.is_empty() {
            self.outgoing
                .push(OutgoingMessage::Broadcast(GamePayload::TurnContribution {
                    author_id: self.participant_id.clone(),
                    commands,
                }));
        }
        self.contribution_sent = true;
    }

    fn drain_state_changes(&mut self) {
        for change in self.state.take_changes() {
            if !change.remote {
                continue;
            }
            match (change.key, change.value) {
                (StateKey::TurnIndex, StateValue::Unsigned(index)) => {
                    self.flush_pending_contribution();
                    // A new turn always lifts a leftover pause, e.g. after a
                    // forced commit that skipped the local confirm.
                    self.recorder.resume();
                    self.turn
                        .apply_remote_index(index as usize, self.recorder.len());
                    self.begin_turn();
                }
                (StateKey::RoundActive, StateValue::Bool(false)) => {
                    self.turn.end_round();
                    self.events.push(NodeEvent::RoundEnded);
                }
                (StateKey::AwaitingConfirmation, StateValue::Bool(true)) => {
                    if self.turn.phase() == TurnPhase::TurnActive
                        && self.turn.current_participant() != Some(self.participant_id.as_str())
                    {
                        let _ = self.turn.draw_completed();
                        if let Some(p) = self.turn.current_participant().map(str::to_string) {
                            self.events
                                .push(NodeEvent::ConfirmationPending { participant_id: p });
                        }
                    }
                }
                (StateKey::AwaitingConfirmation, StateValue::Bool(false)) => {
                    // Resolved by the commit's turn-index update.
                }
                _ => {}
            }
        }
    }

    fn flush_state(&mut self) {
        let updates = self.state.take_outgoing();
        // Local changes need no reaction; drop the notifications.
        self.state.take_changes();
        if self.leader_id.is_none() {
            return;
        }
        for update in updates {
            self.outgoing
                .push(OutgoingMessage::Broadcast(GamePayload::StateUpdate {
                    update,
                }));
        }
    }

    // ------------------------------------------------------------------
    // Drains
    // ------------------------------------------------------------------

    /// Drain queued presentation events.
    pub fn take_events(&mut self) -> Vec<NodeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain messages queued for the relay.
    pub fn take_outgoing(&mut self) -> Vec<OutgoingMessage> {
        std::mem::take(&mut self.outgoing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIZE: usize = 64;

    fn node(id: &str) -> DrawingNode {
        DrawingNode::new(id, id.to_uppercase(), SIZE, SIZE, Size::new(64.0, 64.0)).unwrap()
    }

    fn peers(ids: &[&str]) -> Vec<PeerInfo> {
        ids.iter()
            .map(|id| PeerInfo {
                id: id.to_string(),
                name: id.to_uppercase(),
            })
            .collect()
    }

    fn rect(node: &mut DrawingNode) -> bool {
        node.draw_shape(
            ShapeKind::Rectangle,
            Point::new(32.0, 32.0),
            Size::new(20.0, 20.0),
            0.0,
            SerializableColor::black(),
            2.0,
        )
    }

    /// Deliver every queued message until the room goes quiet.
    fn pump(nodes: &mut [DrawingNode]) {
        loop {
            let mut deliveries = Vec::new();
            for node in nodes.iter_mut() {
                let from = node.participant_id().to_string();
                for msg in node.take_outgoing() {
                    deliveries.push((from.clone(), msg));
                }
            }
            if deliveries.is_empty() {
                break;
            }
            for (from, msg) in deliveries {
                match msg {
                    OutgoingMessage::Broadcast(payload) => {
                        for node in nodes.iter_mut() {
                            node.handle_payload(&from, payload.clone());
                        }
                    }
                    OutgoingMessage::Direct { to, payload } => {
                        if let Some(node) =
                            nodes.iter_mut().find(|n| n.participant_id() == to)
                        {
                            node.handle_payload(&from, payload);
                        }
                    }
                }
            }
        }
    }

    fn room() -> Vec<DrawingNode> {
        let mut nodes = vec![node("a"), node("b"), node("c")];
        for n in nodes.iter_mut() {
            n.set_room("a", peers(&["a", "b", "c"]));
            n.begin_drawing();
            n.take_events();
        }
        nodes
    }

    #[test]
    fn test_free_draw_without_round() {
        let mut n = node("solo");
        n.begin_drawing();
        assert!(rect(&mut n));
        assert!(n.flood_fill(Point::new(32.0, 32.0), SerializableColor::new(255, 0, 0, 255)));
        assert!(n.take_events().contains(&NodeEvent::CanvasChanged));
    }

    #[test]
    fn test_refused_fill_records_nothing() {
        let mut n = node("solo");
        n.begin_drawing();
        // Filling the background with the background color is refused.
        assert!(!n.flood_fill(Point::new(5.0, 5.0), SerializableColor::white()));
        assert_eq!(n.recorder.len(), 0);
    }

    #[test]
    fn test_turn_gate_blocks_non_current() {
        let mut nodes = room();
        nodes[0].start_round().unwrap();
        pump(&mut nodes);

        // First eligible participant is b; the leader and c are gated off.
        assert_eq!(nodes[0].current_participant(), Some("b"));
        assert!(!rect(&mut nodes[0]));
        assert!(!rect(&mut nodes[2]));
        assert!(rect(&mut nodes[1]));
    }

    #[test]
    fn test_round_flow_converges() {
        let mut nodes = room();
        nodes[0].start_round().unwrap();
        pump(&mut nodes);

        // b draws and commits.
        assert!(rect(&mut nodes[1]));
        nodes[1].finish_drawing().unwrap();
        assert!(!rect(&mut nodes[1]));
        nodes[1].confirm().unwrap();
        pump(&mut nodes);

        // Turn advanced to c everywhere, canvases identical.
        for n in nodes.iter() {
            assert_eq!(n.current_participant(), Some("c"));
        }
        assert_eq!(nodes[0].pixels(), nodes[1].pixels());
        assert_eq!(nodes[1].pixels(), nodes[2].pixels());

        // c commits an empty turn; the order wraps back to b.
        nodes[2].finish_drawing().unwrap();
        nodes[2].confirm().unwrap();
        pump(&mut nodes);
        for n in nodes.iter() {
            assert_eq!(n.current_participant(), Some("b"));
        }
    }

    #[test]
    fn test_cancel_rolls_back_locally() {
        let mut nodes = room();
        nodes[0].start_round().unwrap();
        pump(&mut nodes);

        let clean = nodes[1].pixels().to_vec();
        assert!(rect(&mut nodes[1]));
        assert_ne!(nodes[1].pixels(), clean.as_slice());

        nodes[1].finish_drawing().unwrap();
        nodes[1].cancel().unwrap();
        pump(&mut nodes);

        assert_eq!(nodes[1].pixels(), clean.as_slice());
        assert_eq!(nodes[1].recorder.len(), 0);
        // The same participant retries.
        assert_eq!(nodes[1].current_participant(), Some("b"));
        assert!(rect(&mut nodes[1]));
    }

    #[test]
    fn test_timeout_forces_commit() {
        let mut nodes = room();
        nodes[0].start_round().unwrap();
        pump(&mut nodes);

        assert!(rect(&mut nodes[1]));
        nodes[1].finish_drawing().unwrap();
        pump(&mut nodes);

        // The leader mirrors the pending confirmation and can force it.
        assert_eq!(nodes[0].turn_phase(), TurnPhase::AwaitingConfirmation);
        nodes[0].force_timeout();
        pump(&mut nodes);

        for n in nodes.iter() {
            assert_eq!(n.current_participant(), Some("c"));
        }
        // The forced commit still delivers b's drawing to everyone.
        assert_eq!(nodes[0].pixels(), nodes[1].pixels());
        assert_eq!(nodes[1].pixels(), nodes[2].pixels());
    }

    #[test]
    fn test_aggregation_replaces_all_slot_stores() {
        let mut nodes = room();
        nodes[0].start_round().unwrap();
        pump(&mut nodes);

        assert!(rect(&mut nodes[1]));
        nodes[1].finish_drawing().unwrap();
        nodes[1].confirm().unwrap();
        pump(&mut nodes);
        nodes[2].finish_drawing().unwrap();
        nodes[2].confirm().unwrap();
        pump(&mut nodes);
        nodes[0].end_round();
        pump(&mut nodes);

        nodes[0].request_submissions();
        pump(&mut nodes);

        // Only b drew anything; every node holds the same single slot.
        for n in nodes.iter() {
            assert_eq!(n.slot_count(), 1);
            assert_eq!(n.slot(0).unwrap().author_id, "b");
        }
    }

    #[test]
    fn test_hotseat_save_and_replay() {
        let mut n = node("solo");
        n.begin_drawing();
        assert!(rect(&mut n));
        let drawn = n.pixels().to_vec();

        n.request_submissions();
        assert_eq!(n.slot_count(), 1);

        n.begin_drawing();
        assert_ne!(n.pixels(), drawn.as_slice());

        n.load_slot(0, ReplayMode::Instant).unwrap();
        assert_eq!(n.pixels(), drawn.as_slice());
    }

    #[test]
    fn test_paced_slot_playback() {
        let mut n = node("solo");
        n.begin_drawing();
        assert!(rect(&mut n));
        assert!(n.flood_fill(Point::new(32.0, 32.0), SerializableColor::new(0, 200, 0, 255)));
        let drawn = n.pixels().to_vec();
        n.request_submissions();

        n.load_slot(0, ReplayMode::Paced).unwrap();
        let mut steps = 0;
        while n.advance_playback().is_some() {
            steps += 1;
        }
        assert_eq!(steps, 2);
        assert_eq!(n.pixels(), drawn.as_slice());
    }

    #[test]
    fn test_hotseat_round_rotation() {
        let mut n = node("host");
        n.set_local_participants(vec!["p1".to_string(), "p2".to_string()]);
        n.begin_drawing();
        n.start_round().unwrap();
        assert_eq!(n.current_participant(), Some("p1"));

        assert!(rect(&mut n));
        n.finish_drawing().unwrap();
        n.confirm().unwrap();
        assert_eq!(n.current_participant(), Some("p2"));

        n.finish_drawing().unwrap();
        n.confirm().unwrap();
        assert_eq!(n.current_participant(), Some("p1"));
    }

    #[test]
    fn test_archived_slots_survive_into_a_fresh_node() {
        use crate::storage::{MemoryStorage, block_on};

        let storage = MemoryStorage::new();
        let mut n = node("solo");
        n.begin_drawing();
        assert!(rect(&mut n));
        n.request_submissions();
        assert_eq!(block_on(n.archive_slots(&storage)).unwrap(), 1);
        n.load_slot(0, ReplayMode::Instant).unwrap();
        let drawn = n.pixels().to_vec();

        let mut fresh = node("solo");
        assert_eq!(block_on(fresh.restore_archived(&storage)).unwrap(), 1);
        assert_eq!(fresh.slot_count(), 1);
        fresh.load_slot(0, ReplayMode::Instant).unwrap();
        assert_eq!(fresh.pixels(), drawn.as_slice());
    }

    #[test]
    fn test_out_of_range_slot_rejected() {
        let mut n = node("solo");
        assert!(n.load_slot(3, ReplayMode::Instant).is_err());
    }
}
