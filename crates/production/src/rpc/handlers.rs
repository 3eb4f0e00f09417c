//! HTTP request handlers for the ingress API.

use super::types::*;
use crate::metrics::metrics;
use crate::network::ConnectionsSnapshot;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use prometheus::{Encoder, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error};
use veriqo_core::Event;
use veriqo_types::{NodeId, ProofVerifier, QosProof, TaskId, TaskStatus};
use veriqo_validator::quick_validate;

/// Shared state for the ingress handlers.
///
/// Handlers never touch the node state machine directly: submissions go
/// through the event channel, reads come from caches the runner maintains.
#[derive(Clone)]
pub struct IngressState {
    pub node_id: NodeId,
    pub is_leader: bool,
    /// Channel into the node's event loop.
    pub event_tx: mpsc::Sender<Event>,
    /// Task statuses, updated by the runner from `EmitTaskStatus` actions.
    pub task_statuses: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
    /// Engine phase tag, refreshed by the runner after every event.
    pub pbft_state: Arc<RwLock<String>>,
    /// Transport connection summary, refreshed periodically.
    pub connections: Arc<RwLock<ConnectionsSnapshot>>,
    /// Used to pre-screen batch items for the per-item outcome report.
    pub proof_verifier: Arc<dyn ProofVerifier>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════
// Health & status
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `GET /health` - liveness probe.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

/// Handler for `GET /status` - node status.
pub async fn status_handler(State(state): State<IngressState>) -> impl IntoResponse {
    let pbft_state = state.pbft_state.read().await.clone();
    let connections = state.connections.read().await.clone();
    Json(NodeStatusResponse {
        node_id: state.node_id.0.clone(),
        is_leader: state.is_leader,
        pbft_state,
        connections: ConnectionsResponse {
            total: connections.total,
            connected: connections.connected,
            peers: connections.peers,
        },
    })
}

/// Handler for `GET /metrics` - Prometheus metrics.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = ?e, "failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics".to_string(),
        )
            .into_response();
    }

    (
        [(
            axum::http::header::CONTENT_TYPE,
            encoder.format_type().to_string(),
        )],
        buffer,
    )
        .into_response()
}

// ═══════════════════════════════════════════════════════════════════════════
// Proof submission
// ═══════════════════════════════════════════════════════════════════════════

/// Handler for `POST /proof` - submit one attestation.
pub async fn submit_proof_handler(
    State(state): State<IngressState>,
    proof: Result<Json<QosProof>, JsonRejection>,
) -> impl IntoResponse {
    let Json(proof) = match proof {
        Ok(proof) => proof,
        Err(rejection) => {
            debug!(%rejection, "malformed proof body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("missing or malformed field")),
            )
                .into_response();
        }
    };

    let task_id = proof.task_id.0.clone();
    metrics().proofs_received.inc();
    if state
        .event_tx
        .send(Event::ProofReceived {
            proof: Arc::new(proof),
        })
        .await
        .is_err()
    {
        error!("event channel closed, cannot accept proof");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("internal error")),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(ProofAcceptedResponse {
            message: "proof accepted for processing".to_string(),
            task_id,
        }),
    )
        .into_response()
}

/// Handler for `POST /proofs/batch` - submit several attestations at once.
pub async fn submit_batch_handler(
    State(state): State<IngressState>,
    body: Result<Json<serde_json::Value>, JsonRejection>,
) -> impl IntoResponse {
    let Json(body) = match body {
        Ok(body) => body,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("body must be a non-empty array")),
            )
                .into_response();
        }
    };
    let Some(items) = body.as_array().filter(|a| !a.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("body must be a non-empty array")),
        )
            .into_response();
    };

    let now = now_ms();
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let task_id = item
            .get("taskId")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        match serde_json::from_value::<QosProof>(item.clone()) {
            Ok(proof) => {
                let verdict = quick_validate(&proof, now, state.proof_verifier.as_ref());
                if !verdict.valid {
                    metrics().proofs_rejected.inc();
                    results.push(BatchItemResult {
                        task_id,
                        status: "rejected".to_string(),
                        error: Some(verdict.details),
                    });
                    continue;
                }
                metrics().proofs_received.inc();
                let sent = state
                    .event_tx
                    .send(Event::ProofReceived {
                        proof: Arc::new(proof),
                    })
                    .await
                    .is_ok();
                results.push(BatchItemResult {
                    task_id,
                    status: if sent { "accepted" } else { "failed" }.to_string(),
                    error: (!sent).then(|| "internal error".to_string()),
                });
            }
            Err(error) => {
                results.push(BatchItemResult {
                    task_id,
                    status: "failed".to_string(),
                    error: Some(error.to_string()),
                });
            }
        }
    }

    (
        StatusCode::ACCEPTED,
        Json(BatchResponse {
            message: "batch accepted for processing".to_string(),
            results,
        }),
    )
        .into_response()
}

/// Handler for `POST /proof/:taskId/supplementary`.
///
/// The URL parameter wins over whatever task id the body carries.
pub async fn submit_supplementary_handler(
    State(state): State<IngressState>,
    Path(task_id): Path<String>,
    proof: Result<Json<QosProof>, JsonRejection>,
) -> impl IntoResponse {
    let Json(mut proof) = match proof {
        Ok(proof) => proof,
        Err(rejection) => {
            debug!(%rejection, "malformed supplementary body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("missing or malformed field")),
            )
                .into_response();
        }
    };

    let task_id = TaskId::from(task_id);
    proof.task_id = task_id.clone();
    metrics().supplementary_received.inc();

    if state
        .event_tx
        .send(Event::SupplementaryProofReceived {
            task_id: task_id.clone(),
            proof: Arc::new(proof),
        })
        .await
        .is_err()
    {
        error!("event channel closed, cannot accept supplementary proof");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("internal error")),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(ProofAcceptedResponse {
            message: "supplementary proof accepted for processing".to_string(),
            task_id: task_id.0,
        }),
    )
        .into_response()
}

/// Handler for `GET /proof/:taskId/status`.
pub async fn task_status_handler(
    State(state): State<IngressState>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let task_id = TaskId::from(task_id);
    let statuses = state.task_statuses.read().await;
    match statuses.get(&task_id) {
        Some(status) => Json(TaskStatusResponse::from(status)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("unknown task")),
        )
            .into_response(),
    }
}
