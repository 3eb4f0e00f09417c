//! Request/response types for the ingress API.

use serde::{Deserialize, Serialize};
use veriqo_types::{TaskResult, TaskStatus, ValidationInfo, VerifierId};

/// Response for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Connection summary inside `GET /status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionsResponse {
    pub total: usize,
    pub connected: usize,
    pub peers: Vec<String>,
}

/// Response for `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatusResponse {
    pub node_id: String,
    pub is_leader: bool,
    pub pbft_state: String,
    pub connections: ConnectionsResponse,
}

/// Response for accepted proof submissions (202).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofAcceptedResponse {
    pub message: String,
    pub task_id: String,
}

/// Per-item outcome inside a batch submission response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemResult {
    pub task_id: String,
    /// "accepted", "rejected" or "failed".
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Response for `POST /proofs/batch` (202).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResponse {
    pub message: String,
    pub results: Vec<BatchItemResult>,
}

/// Response for `GET /proof/:taskId/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// Human-readable state tag.
    pub state: String,
    pub proof_count: usize,
    pub verifier_ids: Vec<VerifierId>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflict_info: Option<ValidationInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl From<&TaskStatus> for TaskStatusResponse {
    fn from(status: &TaskStatus) -> Self {
        Self {
            task_id: status.task_id.0.clone(),
            state: status.state.human_tag().to_string(),
            proof_count: status.proof_count,
            verifier_ids: status.verifier_ids.clone(),
            created_at: status.created_at,
            updated_at: status.updated_at,
            conflict_info: status.validation_info.clone(),
            result: status.result.clone(),
        }
    }
}

/// Generic error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
