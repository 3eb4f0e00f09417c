//! Per-task records and the task state machine.

use crate::identifiers::{TaskId, VerifierId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a task on one committee node.
///
/// Transitions:
///
/// ```text
/// Pending → Validating → {Consensus, Rejected} → {Finalized, Conflict}
///   → AwaitingSupplementary → {Validated, Failed, NeedsManualReview}
///   → Consensus → Finalized
/// ```
///
/// Any pending task additionally expires after 24 h without update.
/// `Verified` and `Rejected` are reserved: the protocol never assigns them
/// today, but the wire format and status surface keep them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Pending,
    Validating,
    Verified,
    Consensus,
    Conflict,
    AwaitingSupplementary,
    Validated,
    Finalized,
    Rejected,
    Failed,
    NeedsManualReview,
    Expired,
}

impl TaskState {
    /// Human-readable tag used on the HTTP status surface. Bit-exact for
    /// interoperability.
    pub fn human_tag(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Validating => "validating",
            TaskState::Verified => "verified",
            TaskState::Consensus => "in_consensus",
            TaskState::Conflict => "conflict_detected",
            TaskState::AwaitingSupplementary => "awaiting_supplementary_verification",
            TaskState::Validated => "validated",
            TaskState::Finalized => "finalized",
            TaskState::Rejected => "rejected",
            TaskState::Failed => "failed",
            TaskState::NeedsManualReview => "needs_manual_review",
            TaskState::Expired => "expired",
        }
    }

    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Finalized
                | TaskState::Rejected
                | TaskState::Failed
                | TaskState::NeedsManualReview
                | TaskState::Expired
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.human_tag())
    }
}

/// Classification of a cross-attestation disagreement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    /// Codec, resolution, audio presence, GOP or audio-score mismatch.
    Structural,
    /// Numeric deviation in video score or bitrate.
    Score,
    /// No conflict.
    None,
}

/// Validation and conflict-resolution bookkeeping for a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_type: Option<ConflictType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_result: Option<String>,
    #[serde(default)]
    pub supplementary_requested: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplementary_request_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Consensus outcome for a finalized task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// When consensus was reached, milliseconds since epoch.
    pub consensus_timestamp: u64,
    /// On-chain finalization handle, filled in by an external collaborator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

/// Per-task record held by each committee node.
///
/// Invariants: `proof_count == verifier_ids.len()`; `verifier_ids` holds no
/// duplicates; `state` moves only along the task state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub task_id: TaskId,
    pub state: TaskState,
    pub proof_count: usize,
    /// Verifiers whose proofs were accepted, in arrival order.
    pub verifier_ids: Vec<VerifierId>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supplementary_verifier_ids: Vec<VerifierId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_info: Option<ValidationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl TaskStatus {
    /// Fresh record for a task's first accepted proof.
    pub fn new(task_id: TaskId, now_ms: u64) -> Self {
        Self {
            task_id,
            state: TaskState::Pending,
            proof_count: 0,
            verifier_ids: Vec::new(),
            created_at: now_ms,
            updated_at: now_ms,
            supplementary_verifier_ids: Vec::new(),
            validation_info: None,
            result: None,
        }
    }

    /// Mutable access to the validation info, creating it on first use.
    pub fn validation_info_mut(&mut self) -> &mut ValidationInfo {
        self.validation_info.get_or_insert_with(ValidationInfo::default)
    }
}
