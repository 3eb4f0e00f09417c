//! Inter-node wire messages.
//!
//! All PBFT and supplementary envelopes form a single tagged sum,
//! [`ConsensusMessage`]; handlers match it exhaustively so a new variant
//! forces every handler to be updated. Frames on the wire are JSON, tagged
//! by a `"type"` field.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use veriqo_types::{NodeId, QosProof, TaskId, TaskState};

/// Tag distinguishing the two runs of the three-phase protocol.
///
/// `Conflict` signals to all replicas that successful consensus transitions
/// the task to awaiting-supplementary rather than finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusType {
    Normal,
    Conflict,
}

/// Leader's proposal opening a consensus round. Carries the full proof
/// payload so followers can re-derive and check the digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrePrepare {
    pub consensus_type: ConsensusType,
    pub view_number: u64,
    pub sequence_number: u64,
    pub node_id: NodeId,
    pub task_id: TaskId,
    pub digest: String,
    pub signature: String,
    pub data: Arc<QosProof>,
}

/// A prepare or commit vote. The enclosing [`ConsensusMessage`] variant
/// determines which phase the vote belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseVote {
    pub consensus_type: ConsensusType,
    pub view_number: u64,
    pub sequence_number: u64,
    pub node_id: NodeId,
    pub task_id: TaskId,
    pub digest: String,
    pub signature: String,
}

/// Reserved broadcast of a task-state change. No handler acts on it today.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub consensus_type: ConsensusType,
    pub view_number: u64,
    pub sequence_number: u64,
    pub node_id: NodeId,
    pub task_id: TaskId,
    pub digest: String,
    pub signature: String,
    pub state: TaskState,
}

/// Two-stage supplementary handshake frame, used for both the leader's
/// readiness announcement and the followers' acknowledgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementarySignal {
    pub node_id: NodeId,
    pub task_id: TaskId,
    pub supplementary_proof_id: String,
    pub timestamp: u64,
    pub signature: String,
}

/// The tagged sum of every inter-node message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConsensusMessage {
    PrePrepare(PrePrepare),
    Prepare(PhaseVote),
    Commit(PhaseVote),
    StatusUpdate(StatusUpdate),
    SupplementaryReady(SupplementarySignal),
    SupplementaryAck(SupplementarySignal),
}

impl ConsensusMessage {
    /// The task this message refers to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            ConsensusMessage::PrePrepare(m) => &m.task_id,
            ConsensusMessage::Prepare(m) | ConsensusMessage::Commit(m) => &m.task_id,
            ConsensusMessage::StatusUpdate(m) => &m.task_id,
            ConsensusMessage::SupplementaryReady(m) | ConsensusMessage::SupplementaryAck(m) => {
                &m.task_id
            }
        }
    }

    /// The sending node.
    pub fn sender(&self) -> &NodeId {
        match self {
            ConsensusMessage::PrePrepare(m) => &m.node_id,
            ConsensusMessage::Prepare(m) | ConsensusMessage::Commit(m) => &m.node_id,
            ConsensusMessage::StatusUpdate(m) => &m.node_id,
            ConsensusMessage::SupplementaryReady(m) | ConsensusMessage::SupplementaryAck(m) => {
                &m.node_id
            }
        }
    }

    /// Human-readable name for logging and metrics.
    pub fn type_name(&self) -> &'static str {
        match self {
            ConsensusMessage::PrePrepare(_) => "PrePrepare",
            ConsensusMessage::Prepare(_) => "Prepare",
            ConsensusMessage::Commit(_) => "Commit",
            ConsensusMessage::StatusUpdate(_) => "StatusUpdate",
            ConsensusMessage::SupplementaryReady(_) => "SupplementaryReady",
            ConsensusMessage::SupplementaryAck(_) => "SupplementaryAck",
        }
    }
}

/// Connection-level control frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ControlFrame {
    /// First frame after connect, identifying the dialing peer.
    #[serde(rename = "IDENT", rename_all = "camelCase")]
    Ident { node_id: NodeId },
    /// Cooperative close.
    #[serde(rename = "DISCONNECT", rename_all = "camelCase")]
    Disconnect { node_id: NodeId },
}

/// Everything that can appear as one frame on a peer stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Control(ControlFrame),
    Consensus(ConsensusMessage),
}

/// Message bytes signed for a pre-prepare, prepare or commit.
///
/// Covers `(type, consensusType, view, seq, digest)` with a domain tag, so a
/// vote for one phase or slot cannot be replayed for another.
pub fn phase_signing_bytes(
    kind: &str,
    consensus_type: ConsensusType,
    view_number: u64,
    sequence_number: u64,
    digest: &str,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(64 + digest.len());
    message.extend_from_slice(b"veriqo-phase:");
    message.extend_from_slice(kind.as_bytes());
    message.push(b':');
    message.push(match consensus_type {
        ConsensusType::Normal => b'n',
        ConsensusType::Conflict => b'c',
    });
    message.extend_from_slice(&view_number.to_le_bytes());
    message.extend_from_slice(&sequence_number.to_le_bytes());
    message.extend_from_slice(digest.as_bytes());
    message
}

/// Message bytes signed for a supplementary ready/ack signal.
pub fn supplementary_signing_bytes(
    kind: &str,
    task_id: &TaskId,
    supplementary_proof_id: &str,
    timestamp: u64,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(64);
    message.extend_from_slice(b"veriqo-supplementary:");
    message.extend_from_slice(kind.as_bytes());
    message.push(b':');
    message.extend_from_slice(task_id.as_str().as_bytes());
    message.push(b':');
    message.extend_from_slice(supplementary_proof_id.as_bytes());
    message.extend_from_slice(&timestamp.to_le_bytes());
    message
}
