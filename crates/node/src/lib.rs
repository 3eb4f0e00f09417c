//! Committee node state machine.
//!
//! [`NodeState`] is the per-node task pipeline: it owns the task status
//! table, runs local validation, queues and drives PBFT consensus through
//! the engine, and implements the supplementary two-stage protocol for
//! conflicted tasks.
//!
//! The pipeline is a synchronous [`veriqo_core::StateMachine`]: ingress
//! submissions, inbound peer messages and timer fires all arrive as events,
//! and every outward effect (broadcasts, peer sends, timers, status
//! publications) leaves as an action for the runner to execute. The node
//! state is single-owner; runners serialize all access.

mod state;

pub use state::{NodeState, GC_INTERVAL, SUPPLEMENTARY_TIMEOUT};
