//! Event types for the node state machine.

use crate::message::ConsensusMessage;
use std::sync::Arc;
use veriqo_types::{QosProof, TaskId};

/// All possible inputs to a committee node.
///
/// Events are **passive data** - they describe something that happened.
/// The state machine processes events and returns actions.
#[derive(Debug, Clone)]
pub enum Event {
    /// An attestation arrived from the ingress surface.
    ProofReceived { proof: Arc<QosProof> },

    /// A supplementary attestation arrived for a conflicted task. The
    /// ingress has already rewritten the proof's task id from the URL.
    SupplementaryProofReceived {
        task_id: TaskId,
        proof: Arc<QosProof>,
    },

    /// A consensus or supplementary envelope arrived from a peer.
    MessageReceived { message: ConsensusMessage },

    /// The per-task supplementary-verification window elapsed.
    SupplementaryTimeout { task_id: TaskId },

    /// Hourly garbage-collection sweep.
    GcTimer,
}

impl Event {
    /// Get the event type name for logging and stats.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ProofReceived { .. } => "ProofReceived",
            Event::SupplementaryProofReceived { .. } => "SupplementaryProofReceived",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::SupplementaryTimeout { .. } => "SupplementaryTimeout",
            Event::GcTimer => "GcTimer",
        }
    }
}
