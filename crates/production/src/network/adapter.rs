//! TCP transport adapter.
//!
//! Owns one listener plus one dial loop per configured peer. Connections
//! carry length-delimited JSON frames; inbound consensus messages are fed
//! to the node's event channel. The adapter deduplicates peer identities
//! (a new IDENT from a peer replaces the previous connection) and the dial
//! loops reconnect with exponential backoff.

use super::codec::{decode_frame, encode_frame};
use crate::config::PeerConfig;
use crate::metrics::metrics;
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, info, trace, warn};
use veriqo_core::{ConsensusMessage, ControlFrame, Envelope, Event};
use veriqo_types::NodeId;

/// Initial dial retry delay; doubles up to [`MAX_BACKOFF`].
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Outbound queue depth per peer connection.
const PEER_QUEUE_DEPTH: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Connection summary for the status surface.
#[derive(Debug, Clone, Default)]
pub struct ConnectionsSnapshot {
    pub total: usize,
    pub connected: usize,
    pub peers: Vec<String>,
}

struct PeerHandle {
    outbound: mpsc::Sender<Envelope>,
}

/// The node's shared transport endpoint.
pub struct TransportAdapter {
    node_id: NodeId,
    configured_peers: Vec<PeerConfig>,
    /// Live connections keyed by peer id. A new IDENT replaces the old
    /// handle; dropping the old sender ends its writer task.
    connections: RwLock<HashMap<NodeId, PeerHandle>>,
    event_tx: mpsc::Sender<Event>,
}

impl TransportAdapter {
    /// Bind the listener, spawn the accept and dial loops, and return the
    /// shared adapter.
    pub async fn start(
        node_id: NodeId,
        listen_port: u16,
        peers: Vec<PeerConfig>,
        event_tx: mpsc::Sender<Event>,
    ) -> Result<Arc<Self>, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", listen_port)).await?;
        info!(node = %node_id, port = listen_port, "transport listening");

        let adapter = Arc::new(Self {
            node_id,
            configured_peers: peers.clone(),
            connections: RwLock::new(HashMap::new()),
            event_tx,
        });

        let accept_adapter = adapter.clone();
        tokio::spawn(async move {
            accept_adapter.accept_loop(listener).await;
        });

        for peer in peers {
            let dial_adapter = adapter.clone();
            tokio::spawn(async move {
                dial_adapter.dial_loop(peer).await;
            });
        }

        Ok(adapter)
    }

    /// Send a consensus message to every connected peer.
    pub async fn broadcast(&self, message: ConsensusMessage) {
        let envelope = Envelope::Consensus(message);
        let connections = self.connections.read().await;
        for (peer, handle) in connections.iter() {
            if handle.outbound.send(envelope.clone()).await.is_err() {
                debug!(peer = %peer, "peer queue closed during broadcast");
            } else {
                metrics().messages_sent.inc();
            }
        }
    }

    /// Send a consensus message to one peer. Dropped with a log line when
    /// the peer is not connected.
    pub async fn send(&self, to: &NodeId, message: ConsensusMessage) {
        let envelope = Envelope::Consensus(message);
        let connections = self.connections.read().await;
        match connections.get(to) {
            Some(handle) => {
                if handle.outbound.send(envelope).await.is_err() {
                    debug!(peer = %to, "peer queue closed during send");
                } else {
                    metrics().messages_sent.inc();
                }
            }
            None => debug!(peer = %to, "peer not connected, dropping message"),
        }
    }

    /// Connection summary for `GET /status`.
    pub async fn connections(&self) -> ConnectionsSnapshot {
        let connections = self.connections.read().await;
        let mut peers: Vec<String> = connections.keys().map(|id| id.0.clone()).collect();
        peers.sort();
        ConnectionsSnapshot {
            total: self.configured_peers.len(),
            connected: connections.len(),
            peers,
        }
    }

    // ─── Connection lifecycle ───

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    trace!(%addr, "inbound connection");
                    let adapter = self.clone();
                    tokio::spawn(async move {
                        adapter.run_inbound(stream).await;
                    });
                }
                Err(error) => {
                    warn!(?error, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Inbound side: wait for the peer's IDENT, then serve the stream.
    async fn run_inbound(self: Arc<Self>, stream: TcpStream) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
        let writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

        let peer_id = match reader.next().await {
            Some(Ok(frame)) => match decode_frame(&frame) {
                Ok(Envelope::Control(ControlFrame::Ident { node_id })) => node_id,
                Ok(other) => {
                    warn!(?other, "first frame was not IDENT, closing");
                    return;
                }
                Err(error) => {
                    warn!(?error, "undecodable first frame, closing");
                    return;
                }
            },
            _ => return,
        };

        debug!(peer = %peer_id, "peer identified");
        self.serve_connection(peer_id, reader, writer).await;
    }

    /// Outbound side: dial, identify ourselves, serve, and reconnect with
    /// backoff when the connection drops.
    async fn dial_loop(self: Arc<Self>, peer: PeerConfig) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            match TcpStream::connect(peer.address()).await {
                Ok(stream) => {
                    backoff = INITIAL_BACKOFF;
                    let (read_half, write_half) = stream.into_split();
                    let reader = FramedRead::new(read_half, LengthDelimitedCodec::new());
                    let mut writer = FramedWrite::new(write_half, LengthDelimitedCodec::new());

                    let ident = Envelope::Control(ControlFrame::Ident {
                        node_id: self.node_id.clone(),
                    });
                    match encode_frame(&ident) {
                        Ok(bytes) => {
                            if writer.send(bytes).await.is_err() {
                                continue;
                            }
                        }
                        Err(error) => {
                            warn!(?error, "could not encode IDENT");
                            continue;
                        }
                    }

                    info!(peer = %peer.node_id, address = %peer.address(), "peer connected");
                    self.clone()
                        .serve_connection(peer.node_id.clone(), reader, writer)
                        .await;
                    debug!(peer = %peer.node_id, "connection closed, redialing");
                }
                Err(error) => {
                    trace!(peer = %peer.node_id, ?error, "dial failed");
                }
            }
            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    /// Register the connection and pump frames both ways until either side
    /// closes. The writer task drains the peer's outbound queue; the read
    /// loop feeds decoded consensus messages into the node's event channel.
    async fn serve_connection(
        self: Arc<Self>,
        peer_id: NodeId,
        mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, LengthDelimitedCodec>,
        mut writer: FramedWrite<tokio::net::tcp::OwnedWriteHalf, LengthDelimitedCodec>,
    ) {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<Envelope>(PEER_QUEUE_DEPTH);

        // Register, evicting any previous (possibly half-open) connection.
        {
            let mut connections = self.connections.write().await;
            if connections
                .insert(
                    peer_id.clone(),
                    PeerHandle {
                        outbound: outbound_tx.clone(),
                    },
                )
                .is_some()
            {
                debug!(peer = %peer_id, "replaced existing connection");
            }
            metrics().peers_connected.set(connections.len() as f64);
        }

        let writer_peer = peer_id.clone();
        let writer_task = tokio::spawn(async move {
            while let Some(envelope) = outbound_rx.recv().await {
                match encode_frame(&envelope) {
                    Ok(bytes) => {
                        if writer.send(bytes).await.is_err() {
                            debug!(peer = %writer_peer, "write failed, stopping writer");
                            break;
                        }
                    }
                    Err(error) => warn!(?error, "encode failed, skipping frame"),
                }
            }
        });

        while let Some(frame) = reader.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(error) => {
                    debug!(peer = %peer_id, ?error, "read failed, closing");
                    break;
                }
            };
            match decode_frame(&frame) {
                Ok(Envelope::Consensus(message)) => {
                    metrics().messages_received.inc();
                    if self
                        .event_tx
                        .send(Event::MessageReceived { message })
                        .await
                        .is_err()
                    {
                        debug!("event channel closed, stopping transport read loop");
                        break;
                    }
                }
                Ok(Envelope::Control(ControlFrame::Disconnect { node_id })) => {
                    debug!(peer = %node_id, "peer disconnected cooperatively");
                    break;
                }
                Ok(Envelope::Control(ControlFrame::Ident { node_id })) => {
                    trace!(peer = %node_id, "redundant IDENT ignored");
                }
                Err(error) => {
                    warn!(peer = %peer_id, ?error, "undecodable frame, dropping");
                }
            }
        }

        writer_task.abort();
        // Deregister only if this connection is still the registered one
        // (a replacement may have raced us).
        let mut connections = self.connections.write().await;
        if let Some(handle) = connections.get(&peer_id) {
            if handle.outbound.same_channel(&outbound_tx) {
                connections.remove(&peer_id);
            }
        }
        metrics().peers_connected.set(connections.len() as f64);
    }
}
