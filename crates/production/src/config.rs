//! Node configuration from the environment.
//!
//! The committee is configured per process:
//!
//! - `NODE_ID`: this node's identifier
//! - `IS_LEADER`: "true" on exactly one node
//! - `PORT`: transport listen port; the HTTP ingress binds `PORT + 1000`
//! - `PEERS`: comma list of `nodeId:host:port` entries
//! - `TOTAL_NODES`: committee size

use std::env;
use thiserror::Error;
use veriqo_types::NodeId;

/// Offset between the transport port and the HTTP ingress port.
const HTTP_PORT_OFFSET: u16 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("invalid peer entry {0:?}, expected nodeId:host:port")]
    InvalidPeer(String),
}

/// One committee peer's transport address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
}

impl PeerConfig {
    /// Parse a `nodeId:host:port` entry.
    pub fn parse(entry: &str) -> Result<Self, ConfigError> {
        let mut parts = entry.splitn(3, ':');
        let (Some(node_id), Some(host), Some(port)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(ConfigError::InvalidPeer(entry.to_string()));
        };
        if node_id.is_empty() || host.is_empty() {
            return Err(ConfigError::InvalidPeer(entry.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPeer(entry.to_string()))?;
        Ok(Self {
            node_id: NodeId::from(node_id),
            host: host.to_string(),
            port,
        })
    }

    /// The `host:port` dial address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Full configuration of one committee node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: NodeId,
    pub is_leader: bool,
    /// The designated leader. Equals `node_id` on the leading node;
    /// followers read it from `LEADER_ID`.
    pub leader_id: NodeId,
    /// Transport listen port.
    pub port: u16,
    pub peers: Vec<PeerConfig>,
    pub total_nodes: usize,
}

impl NodeConfig {
    /// Read the configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let node_id = require("NODE_ID")?;
        let is_leader = match require("IS_LEADER")?.as_str() {
            "true" => true,
            "false" => false,
            other => {
                return Err(ConfigError::Invalid {
                    name: "IS_LEADER",
                    value: other.to_string(),
                })
            }
        };
        let leader_id = if is_leader {
            node_id.clone()
        } else {
            require("LEADER_ID")?
        };
        let port = parse_var("PORT", require("PORT")?)?;
        let total_nodes = parse_var("TOTAL_NODES", require("TOTAL_NODES")?)?;
        let peers = parse_peers(&env::var("PEERS").unwrap_or_default())?;

        Ok(Self {
            node_id: NodeId::from(node_id),
            is_leader,
            leader_id: NodeId::from(leader_id),
            port,
            peers,
            total_nodes,
        })
    }

    /// Build a configuration from already-parsed CLI values.
    pub fn from_parts(
        node_id: String,
        is_leader: bool,
        leader_id: Option<String>,
        port: u16,
        peers: &str,
        total_nodes: usize,
    ) -> Result<Self, ConfigError> {
        let leader_id = match (is_leader, leader_id) {
            (true, _) => node_id.clone(),
            (false, Some(id)) => id,
            (false, None) => return Err(ConfigError::Missing("LEADER_ID")),
        };
        Ok(Self {
            node_id: NodeId::from(node_id),
            is_leader,
            leader_id: NodeId::from(leader_id),
            port,
            peers: parse_peers(peers)?,
            total_nodes,
        })
    }

    /// HTTP ingress port.
    pub fn http_port(&self) -> u16 {
        self.port + HTTP_PORT_OFFSET
    }

    /// Committee membership for key derivation: this node plus all peers.
    pub fn committee(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.peers.iter().map(|p| p.node_id.clone()).collect();
        ids.push(self.node_id.clone());
        ids.sort();
        ids
    }
}

fn require(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid { name, value })
}

fn parse_peers(raw: &str) -> Result<Vec<PeerConfig>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(PeerConfig::parse)
        .collect()
}
