//! PBFT consensus engine.
//!
//! This crate provides a synchronous three-phase PBFT implementation driven
//! entirely by the task pipeline: one replicated-log slot at a time, with
//! late-message buffering and a completed-sequence set.
//!
//! # Architecture
//!
//! The engine processes messages synchronously and returns any outgoing
//! message to the caller:
//!
//! - `start_consensus` → leader assigns a sequence and emits a PrePrepare
//! - `handle_pre_prepare` → adopt the proposal, emit a Prepare
//! - `handle_prepare` → collect; at quorum emit a Commit
//! - `handle_commit` → collect; at quorum return a [`ConsensusDecision`]
//!
//! All I/O (broadcasting, feeding the node's own votes back in) is performed
//! by the pipeline. Consensus completion surfaces as a returned decision
//! value rather than a callback, so the engine holds no reference back to
//! the pipeline.
//!
//! # Safety properties
//!
//! - Phase transitions are monotone per `(view, seq)` slot.
//! - Votes arriving before the node enters the requisite phase are buffered
//!   and drained exactly once, atomically with the unblocking transition,
//!   and only after the node's own vote has seeded the set.
//! - Sequences in the completed set never mutate engine state again.

mod engine;

pub use engine::{quorum_threshold, ConsensusDecision, PbftEngine, PbftPhase};
