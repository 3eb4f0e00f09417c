//! Route configuration for the ingress API.

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};

/// Create the full ingress router.
pub fn create_router(state: IngressState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/metrics", get(metrics_handler))
        .route("/proof", post(submit_proof_handler))
        .route("/proofs/batch", post(submit_batch_handler))
        .route(
            "/proof/{task_id}/supplementary",
            post(submit_supplementary_handler),
        )
        .route("/proof/{task_id}/status", get(task_status_handler))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ConnectionsSnapshot;
    use axum::{body::Body, http::Request};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::{mpsc, RwLock};
    use tower::ServiceExt;
    use veriqo_core::Event;
    use veriqo_types::test_utils::test_proof;
    use veriqo_types::{NodeId, PresenceProofVerifier, TaskId, TaskStatus};

    fn test_state() -> (IngressState, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let state = IngressState {
            node_id: NodeId::from("node1"),
            is_leader: true,
            event_tx,
            task_statuses: Arc::new(RwLock::new(HashMap::new())),
            pbft_state: Arc::new(RwLock::new("idle".to_string())),
            connections: Arc::new(RwLock::new(ConnectionsSnapshot {
                total: 3,
                connected: 2,
                peers: vec!["node2".to_string(), "node3".to_string()],
            })),
            proof_verifier: Arc::new(PresenceProofVerifier),
        };
        (state, event_rx)
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_reports_node_and_connections() {
        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json = body_json(response).await;
        assert_eq!(json["nodeId"], "node1");
        assert_eq!(json["isLeader"], true);
        assert_eq!(json["pbftState"], "idle");
        assert_eq!(json["connections"]["total"], 3);
        assert_eq!(json["connections"]["connected"], 2);
    }

    #[tokio::test]
    async fn test_submit_proof_accepted() {
        let (state, mut rx) = test_state();
        let proof = test_proof("task-A", "v1", now_ms());
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proof")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&proof).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let json = body_json(response).await;
        assert_eq!(json["taskId"], "task-A");

        match rx.recv().await.expect("event forwarded") {
            Event::ProofReceived { proof } => assert_eq!(proof.task_id, TaskId::from("task-A")),
            other => panic!("unexpected event {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_submit_proof_missing_field_is_400() {
        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proof")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"taskId": "task-A"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_batch_mixed_outcomes() {
        let (state, _rx) = test_state();
        let good = test_proof("task-A", "v1", now_ms());
        let mut stale = test_proof("task-A", "v2", now_ms());
        stale.timestamp = 1; // ancient, rejected by quick validation
        let body = serde_json::json!([good, stale, {"taskId": "task-B"}]);

        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proofs/batch")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&body).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let json = body_json(response).await;
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0]["status"], "accepted");
        assert_eq!(results[1]["status"], "rejected");
        assert_eq!(results[2]["status"], "failed");
    }

    #[tokio::test]
    async fn test_batch_rejects_non_array() {
        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proofs/batch")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"not": "an array"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proofs/batch")
                    .header("content-type", "application/json")
                    .body(Body::from("[]"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 400);
    }

    #[tokio::test]
    async fn test_supplementary_overwrites_task_id() {
        let (state, mut rx) = test_state();
        // Body claims task-X; the URL parameter wins.
        let proof = test_proof("task-X", "v3", now_ms());
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/proof/task-A/supplementary")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&proof).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 202);
        let json = body_json(response).await;
        assert_eq!(json["taskId"], "task-A");

        match rx.recv().await.expect("event forwarded") {
            Event::SupplementaryProofReceived { task_id, proof } => {
                assert_eq!(task_id, TaskId::from("task-A"));
                assert_eq!(proof.task_id, TaskId::from("task-A"));
            }
            other => panic!("unexpected event {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_task_status_found_and_missing() {
        let (state, _rx) = test_state();
        state.task_statuses.write().await.insert(
            TaskId::from("task-A"),
            TaskStatus::new(TaskId::from("task-A"), 7),
        );

        let app = create_router(state);
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/proof/task-A/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let json = body_json(response).await;
        assert_eq!(json["taskId"], "task-A");
        assert_eq!(json["state"], "pending");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/proof/task-unknown/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, _rx) = test_state();
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}
