//! Production metrics using the native Prometheus client.
//!
//! Metrics are domain-specific rather than generic event counters. Use
//! traces for event-level granularity during investigations.

use prometheus::{register_counter, register_gauge, Counter, Gauge};
use std::sync::OnceLock;

static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Domain-specific metrics for production monitoring.
pub struct Metrics {
    // === Attestations ===
    pub proofs_received: Counter,
    pub proofs_rejected: Counter,
    pub supplementary_received: Counter,

    // === Consensus ===
    pub consensus_rounds_started: Counter,
    pub tasks_finalized: Counter,
    pub tasks_manual_review: Counter,

    // === Network ===
    pub messages_sent: Counter,
    pub messages_received: Counter,
    pub peers_connected: Gauge,

    // === Event channel ===
    pub event_channel_depth: Gauge,
}

impl Metrics {
    fn register() -> Self {
        Self {
            proofs_received: register_counter!(
                "veriqo_proofs_received_total",
                "Attestations accepted by the ingress"
            )
            .expect("metric registration"),
            proofs_rejected: register_counter!(
                "veriqo_proofs_rejected_total",
                "Attestations rejected at quick validation"
            )
            .expect("metric registration"),
            supplementary_received: register_counter!(
                "veriqo_supplementary_received_total",
                "Supplementary attestations accepted by the ingress"
            )
            .expect("metric registration"),
            consensus_rounds_started: register_counter!(
                "veriqo_consensus_rounds_started_total",
                "PBFT rounds opened by this node"
            )
            .expect("metric registration"),
            tasks_finalized: register_counter!(
                "veriqo_tasks_finalized_total",
                "Tasks that reached the finalized state"
            )
            .expect("metric registration"),
            tasks_manual_review: register_counter!(
                "veriqo_tasks_manual_review_total",
                "Tasks parked for manual review"
            )
            .expect("metric registration"),
            messages_sent: register_counter!(
                "veriqo_network_messages_sent_total",
                "Consensus messages written to peers"
            )
            .expect("metric registration"),
            messages_received: register_counter!(
                "veriqo_network_messages_received_total",
                "Consensus messages read from peers"
            )
            .expect("metric registration"),
            peers_connected: register_gauge!(
                "veriqo_peers_connected",
                "Currently connected committee peers"
            )
            .expect("metric registration"),
            event_channel_depth: register_gauge!(
                "veriqo_event_channel_depth",
                "Events waiting in the node's inbox"
            )
            .expect("metric registration"),
        }
    }
}

/// Global metrics handle, registered on first use.
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::register)
}
