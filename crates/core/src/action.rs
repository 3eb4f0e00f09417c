//! Action types for the node state machine.

use crate::message::ConsensusMessage;
use crate::TimerId;
use std::time::Duration;
use veriqo_types::{NodeId, TaskStatus};

/// Actions the state machine wants to perform.
///
/// Actions are **commands** - they describe something to do.
/// The runner executes actions and may convert results back into events.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a message to every committee peer.
    Broadcast { message: ConsensusMessage },

    /// Send a message to a single peer.
    Send {
        to: NodeId,
        message: ConsensusMessage,
    },

    /// Set a timer to fire after a duration. Replaces any timer with the
    /// same id.
    SetTimer { id: TimerId, duration: Duration },

    /// Cancel a previously set timer.
    CancelTimer { id: TimerId },

    /// Publish a task's updated status for external observers.
    ///
    /// The production runner copies this into the status cache backing the
    /// `GET /proof/:taskId/status` endpoint.
    EmitTaskStatus { status: TaskStatus },
}

impl Action {
    /// Get the action type name for logging and stats.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::Send { .. } => "Send",
            Action::SetTimer { .. } => "SetTimer",
            Action::CancelTimer { .. } => "CancelTimer",
            Action::EmitTaskStatus { .. } => "EmitTaskStatus",
        }
    }

    /// Check if this action produces network I/O.
    pub fn is_network(&self) -> bool {
        matches!(self, Action::Broadcast { .. } | Action::Send { .. })
    }
}
