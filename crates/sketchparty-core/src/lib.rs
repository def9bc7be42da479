//! SketchParty Core Library
//!
//! Command log, deterministic replay and room-coordination logic for the
//! SketchParty collaborative drawing game.

pub mod aggregate;
pub mod client;
pub mod color;
pub mod command;
pub mod node;
pub mod protocol;
pub mod raster;
pub mod recorder;
pub mod replay;
pub mod slots;
pub mod state_store;
pub mod storage;
pub mod turn;

pub use aggregate::{AggregationCoordinator, SubmissionOutcome};
pub use client::{ConnectionState, NetEvent, RelayClient};
pub use color::SerializableColor;
pub use command::{DrawingCommand, DrawingSession, ShapeKind};
pub use node::{DrawingNode, NodeEvent, OutgoingMessage};
pub use protocol::{ClientMessage, GamePayload, PeerInfo, ServerMessage};
pub use raster::{Canvas, CanvasSnapshot};
pub use recorder::Recorder;
pub use replay::{PacedPlayback, PacedStep, ReplayEngine, ReplayMode, INTER_COMMAND_DELAY};
pub use slots::{SlotStore, DEFAULT_SLOT_CAPACITY};
pub use state_store::{SharedStateStore, StateKey, StateValue};
pub use turn::{TurnController, TurnPhase};
