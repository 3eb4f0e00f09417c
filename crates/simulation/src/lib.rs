//! Deterministic committee simulation.
//!
//! Runs a full committee of [`veriqo_node::NodeState`] machines in a single
//! thread with simulated time: no tokio, no sockets. Broadcast and send
//! actions become queued message-received events with sampled latency;
//! timers become queued timer events. Given the same seed, a simulation
//! produces identical results every run, which makes the end-to-end
//! consensus scenarios assertable.

mod network;
mod runner;

pub use network::{CommitteeNetwork, NetworkConfig};
pub use runner::{SimulationRunner, SimulationStats, SIM_EPOCH_MS};

/// Index of a node within the simulated committee. Node 0 is the leader.
pub type NodeIndex = u32;
