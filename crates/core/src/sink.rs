//! Protocol event recording.
//!
//! The sink is an injected collaborator: the engine and pipeline receive an
//! `Arc<dyn EventSink>` at construction and record protocol milestones
//! through it. There is no process-global registry.

use parking_lot::Mutex;
use veriqo_types::{NodeId, TaskId};

/// Kinds of protocol events worth recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEventKind {
    ProofReceived,
    ProofRejected,
    DuplicateProof,
    ConsensusStarted,
    ConsensusReachNormal,
    ConsensusReachConflict,
    SupplementaryReceived,
    SupplementaryTimeout,
    TaskExpired,
}

impl NodeEventKind {
    /// Stable uppercase names as they appear in the event log.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeEventKind::ProofReceived => "PROOF_RECEIVED",
            NodeEventKind::ProofRejected => "PROOF_REJECTED",
            NodeEventKind::DuplicateProof => "DUPLICATE_PROOF",
            NodeEventKind::ConsensusStarted => "CONSENSUS_STARTED",
            NodeEventKind::ConsensusReachNormal => "CONSENSUS_REACH_NORMAL",
            NodeEventKind::ConsensusReachConflict => "CONSENSUS_REACH_CONFLICT",
            NodeEventKind::SupplementaryReceived => "SUPPLEMENTARY_RECEIVED",
            NodeEventKind::SupplementaryTimeout => "SUPPLEMENTARY_TIMEOUT",
            NodeEventKind::TaskExpired => "TASK_EXPIRED",
        }
    }
}

/// One recorded protocol event.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
    pub kind: NodeEventKind,
    pub node_id: NodeId,
    pub task_id: TaskId,
    /// Milliseconds since epoch, from the state machine's injected clock.
    pub timestamp: u64,
    pub detail: Option<String>,
}

/// Receives protocol events from the engine and pipeline.
pub trait EventSink: Send + Sync {
    fn record(&self, event: NodeEvent);
}

/// Sink that forwards events to the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn record(&self, event: NodeEvent) {
        tracing::info!(
            kind = event.kind.as_str(),
            node = %event.node_id,
            task = %event.task_id,
            detail = event.detail.as_deref().unwrap_or(""),
            "protocol event"
        );
    }
}

/// Sink that retains events in memory; used by tests and the status surface.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<NodeEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.lock().clone()
    }

    /// Count events of one kind for a task.
    pub fn count(&self, kind: NodeEventKind, task_id: &TaskId) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind == kind && &e.task_id == task_id)
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn record(&self, event: NodeEvent) {
        self.events.lock().push(event);
    }
}
