//! Simulated network with deterministic latency, packet loss, and partitions.

use crate::NodeIndex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for the simulated committee network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Number of committee nodes. Node 0 is the leader.
    pub total_nodes: u32,
    /// Base one-way message latency.
    pub latency: Duration,
    /// Jitter as a fraction of base latency (0.0 - 1.0).
    pub jitter_fraction: f64,
    /// Messages are dropped with this probability.
    pub packet_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            total_nodes: 4,
            latency: Duration::from_millis(10),
            jitter_fraction: 0.1,
            packet_loss_rate: 0.0,
        }
    }
}

/// Deterministic message-delivery decisions for the committee.
///
/// Supports configurable latency with jitter, probabilistic packet loss, and
/// directional partitions between node pairs.
#[derive(Debug)]
pub struct CommitteeNetwork {
    config: NetworkConfig,
    /// Partitioned pairs. If (a, b) is present, messages from a to b drop.
    partitions: HashSet<(NodeIndex, NodeIndex)>,
}

impl CommitteeNetwork {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            config,
            partitions: HashSet::new(),
        }
    }

    pub fn total_nodes(&self) -> u32 {
        self.config.total_nodes
    }

    // ─── Partition management ───

    pub fn is_partitioned(&self, from: NodeIndex, to: NodeIndex) -> bool {
        self.partitions.contains(&(from, to))
    }

    /// Drop messages from `from` to `to`.
    pub fn partition_unidirectional(&mut self, from: NodeIndex, to: NodeIndex) {
        self.partitions.insert((from, to));
    }

    /// Drop messages both ways between two nodes.
    pub fn partition_bidirectional(&mut self, a: NodeIndex, b: NodeIndex) {
        self.partitions.insert((a, b));
        self.partitions.insert((b, a));
    }

    /// Cut a node off from the entire committee.
    pub fn isolate_node(&mut self, node: NodeIndex) {
        for other in 0..self.config.total_nodes {
            if other != node {
                self.partitions.insert((node, other));
                self.partitions.insert((other, node));
            }
        }
    }

    /// Restore full connectivity.
    pub fn heal_all(&mut self) {
        self.partitions.clear();
    }

    // ─── Delivery decision ───

    /// Decide whether a message is delivered and with what latency.
    /// `None` means the message is dropped.
    pub fn should_deliver(
        &self,
        from: NodeIndex,
        to: NodeIndex,
        rng: &mut ChaCha8Rng,
    ) -> Option<Duration> {
        if self.is_partitioned(from, to) {
            return None;
        }
        if self.config.packet_loss_rate > 0.0 && rng.gen::<f64>() < self.config.packet_loss_rate {
            return None;
        }
        Some(self.sample_latency(rng))
    }

    fn sample_latency(&self, rng: &mut ChaCha8Rng) -> Duration {
        let base = self.config.latency.as_secs_f64();
        if self.config.jitter_fraction <= 0.0 {
            return self.config.latency;
        }
        let jitter_range = base * self.config.jitter_fraction;
        let jitter = rng.gen_range(-jitter_range..jitter_range);
        Duration::from_secs_f64((base + jitter).max(0.0001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_partitioned_pair_drops_messages() {
        let mut network = CommitteeNetwork::new(NetworkConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        network.partition_bidirectional(0, 1);
        assert!(network.should_deliver(0, 1, &mut rng).is_none());
        assert!(network.should_deliver(1, 0, &mut rng).is_none());
        assert!(network.should_deliver(0, 2, &mut rng).is_some());

        network.heal_all();
        assert!(network.should_deliver(0, 1, &mut rng).is_some());
    }

    #[test]
    fn test_isolated_node() {
        let mut network = CommitteeNetwork::new(NetworkConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        network.isolate_node(2);
        for other in [0u32, 1, 3] {
            assert!(network.should_deliver(2, other, &mut rng).is_none());
            assert!(network.should_deliver(other, 2, &mut rng).is_none());
        }
    }

    #[test]
    fn test_latency_stays_near_base() {
        let network = CommitteeNetwork::new(NetworkConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let latency = network.should_deliver(0, 1, &mut rng).unwrap();
            assert!(latency >= Duration::from_millis(8));
            assert!(latency <= Duration::from_millis(12));
        }
    }
}
