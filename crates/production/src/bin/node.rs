//! Veriqo committee node.
//!
//! Production binary for one committee member. Configuration comes from
//! the environment (or equivalent CLI flags):
//!
//! ```bash
//! NODE_ID=node1 IS_LEADER=true PORT=9000 TOTAL_NODES=4 \
//!   PEERS=node2:10.0.0.2:9000,node3:10.0.0.3:9000,node4:10.0.0.4:9000 \
//!   veriqo-node
//! ```
//!
//! Followers additionally set `LEADER_ID`. The transport listens on `PORT`;
//! the HTTP ingress listens on `PORT + 1000`.

use anyhow::Context;
use clap::Parser;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tracing::info;
use veriqo_core::{EventSink, TracingEventSink};
use veriqo_node::NodeState;
use veriqo_production::network::{ConnectionsSnapshot, TransportAdapter};
use veriqo_production::rpc::{IngressServer, IngressServerConfig, IngressState};
use veriqo_production::{init_telemetry, NodeConfig, ProductionRunner, TimerManager};
use veriqo_types::{CommitteeAuthenticator, MessageAuthenticator, PresenceProofVerifier, ProofVerifier};

/// Veriqo committee node.
///
/// Participates in PBFT consensus over media-transcoding QoS attestations.
#[derive(Parser, Debug)]
#[command(name = "veriqo-node")]
#[command(version, about, long_about = None)]
struct Cli {
    /// This node's identifier.
    #[arg(long, env = "NODE_ID")]
    node_id: String,

    /// Whether this node is the designated leader.
    #[arg(long, env = "IS_LEADER", default_value_t = false)]
    is_leader: bool,

    /// The leader's identifier (followers only).
    #[arg(long, env = "LEADER_ID")]
    leader_id: Option<String>,

    /// Transport listen port. The HTTP ingress binds this + 1000.
    #[arg(long, env = "PORT")]
    port: u16,

    /// Comma list of peers as nodeId:host:port.
    #[arg(long, env = "PEERS", default_value = "")]
    peers: String,

    /// Committee size.
    #[arg(long, env = "TOTAL_NODES")]
    total_nodes: usize,
}

/// Event channel depth. Inbound work beyond this applies backpressure to
/// the transport readers and ingress handlers.
const EVENT_QUEUE_DEPTH: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry();
    let cli = Cli::parse();
    let config = NodeConfig::from_parts(
        cli.node_id,
        cli.is_leader,
        cli.leader_id,
        cli.port,
        &cli.peers,
        cli.total_nodes,
    )
    .context("invalid configuration")?;

    info!(
        node = %config.node_id,
        is_leader = config.is_leader,
        total_nodes = config.total_nodes,
        port = config.port,
        http_port = config.http_port(),
        "starting committee node"
    );

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);

    // Transport.
    let transport = TransportAdapter::start(
        config.node_id.clone(),
        config.port,
        config.peers.clone(),
        event_tx.clone(),
    )
    .await
    .context("failed to start transport")?;

    // Node state machine.
    let committee = config.committee();
    let authenticator: Arc<dyn MessageAuthenticator> =
        Arc::new(CommitteeAuthenticator::derive(&config.node_id, &committee));
    let proof_verifier: Arc<dyn ProofVerifier> = Arc::new(PresenceProofVerifier);
    let events: Arc<dyn EventSink> = Arc::new(TracingEventSink);
    let node = NodeState::new(
        config.node_id.clone(),
        config.leader_id.clone(),
        config.total_nodes,
        authenticator,
        proof_verifier.clone(),
        events,
    );

    // Shared caches between the runner and the HTTP layer.
    let task_statuses = Arc::new(RwLock::new(HashMap::new()));
    let pbft_state = Arc::new(RwLock::new("idle".to_string()));
    let connections = Arc::new(RwLock::new(ConnectionsSnapshot::default()));

    // Keep the connection summary fresh for GET /status.
    {
        let transport = transport.clone();
        let connections = connections.clone();
        tokio::spawn(async move {
            loop {
                *connections.write().await = transport.connections().await;
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        });
    }

    // HTTP ingress.
    let listen_addr: SocketAddr = ([0, 0, 0, 0], config.http_port()).into();
    let ingress = IngressServer::new(
        IngressServerConfig { listen_addr },
        IngressState {
            node_id: config.node_id.clone(),
            is_leader: config.is_leader,
            event_tx: event_tx.clone(),
            task_statuses: task_statuses.clone(),
            pbft_state: pbft_state.clone(),
            connections,
            proof_verifier,
        },
    );
    let ingress_task = ingress.start().await.context("failed to start ingress")?;

    // Event loop.
    let timers = TimerManager::new(event_tx.clone());
    let runner = ProductionRunner::new(
        node,
        event_rx,
        transport,
        timers,
        task_statuses,
        pbft_state,
    );
    let runner_task = tokio::spawn(runner.run());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    runner_task.abort();
    ingress_task.abort();
    Ok(())
}
