//! Core event/action model for the Veriqo committee node.
//!
//! This crate provides the foundational pieces of the node architecture:
//!
//! - [`Event`]: All possible inputs to the node state machine
//! - [`Action`]: All possible outputs from the node state machine
//! - [`ConsensusMessage`]: The tagged sum of all inter-node envelopes
//! - [`StateMachine`]: The trait the node state machine implements
//! - [`EventSink`]: Injected collaborator recording protocol events
//!
//! # Architecture
//!
//! The node is built on a simple event-driven model:
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is:
//! - **Synchronous**: No async, no .await
//! - **Deterministic**: Same state + event = same actions
//! - **Pure-ish**: Mutates self, but performs no I/O
//!
//! All I/O is handled by the runner (simulation or production) which:
//! 1. Delivers events to the state machine
//! 2. Executes the returned actions
//! 3. Converts transport and timer results back into events

mod action;
mod event;
mod message;
mod sink;
mod traits;

pub use action::Action;
pub use event::Event;
pub use message::{
    phase_signing_bytes, supplementary_signing_bytes, ConsensusMessage, ConsensusType,
    ControlFrame, Envelope, PhaseVote, PrePrepare, StatusUpdate, SupplementarySignal,
};
pub use sink::{EventSink, MemoryEventSink, NodeEvent, NodeEventKind, TracingEventSink};
pub use traits::StateMachine;

use veriqo_types::TaskId;

/// Timer identification.
///
/// The supplementary timer is per-task; the GC timer is a periodic sweep.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Supplementary-verification timeout for one task.
    Supplementary(TaskId),
    /// Hourly garbage-collection sweep.
    Gc,
}
