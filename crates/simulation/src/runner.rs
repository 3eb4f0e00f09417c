//! Deterministic simulation runner.

use crate::network::{CommitteeNetwork, NetworkConfig};
use crate::NodeIndex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};
use veriqo_core::{
    Action, Event, MemoryEventSink, StateMachine, TimerId,
};
use veriqo_node::NodeState;
use veriqo_types::{CommitteeAuthenticator, NodeId, PresenceProofVerifier, QosProof, TaskId};

/// Wall-clock base of the simulated epoch, milliseconds. Proof timestamps in
/// scenarios are expressed relative to this.
pub const SIM_EPOCH_MS: u64 = 1_700_000_000_000;

/// Deterministic ordering key for queued events: fire time, then insertion
/// sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EventKey {
    at: Duration,
    seq: u64,
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub actions_generated: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub timers_set: u64,
    pub timers_cancelled: u64,
    pub statuses_emitted: u64,
}

/// Deterministic committee runner.
///
/// Processes events in time order and executes actions inline. Given the
/// same seed and the same schedule of submissions, every run produces
/// identical node states.
pub struct SimulationRunner {
    nodes: Vec<NodeState>,
    node_ids: Vec<NodeId>,
    sinks: Vec<Arc<MemoryEventSink>>,

    event_queue: BTreeMap<EventKey, (NodeIndex, Event)>,
    sequence: u64,
    now: Duration,

    network: CommitteeNetwork,
    rng: ChaCha8Rng,

    /// Registered timers, for replace/cancel semantics.
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    stats: SimulationStats,
}

impl SimulationRunner {
    /// Create a committee of `config.total_nodes` nodes. Node 0 is the
    /// leader. Initial node actions (the GC timer) are scheduled
    /// immediately.
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        let node_ids: Vec<NodeId> = (0..config.total_nodes)
            .map(|i| NodeId::from(format!("node{i}")))
            .collect();

        let mut sinks = Vec::new();
        let mut nodes = Vec::new();
        for id in &node_ids {
            let sink = Arc::new(MemoryEventSink::new());
            let mut node = NodeState::new(
                id.clone(),
                node_ids[0].clone(),
                config.total_nodes as usize,
                Arc::new(CommitteeAuthenticator::derive(id, &node_ids)),
                Arc::new(PresenceProofVerifier),
                sink.clone(),
            );
            node.set_now(SIM_EPOCH_MS);
            sinks.push(sink);
            nodes.push(node);
        }

        info!(
            total_nodes = config.total_nodes,
            seed, "created committee simulation"
        );

        let mut runner = Self {
            nodes,
            node_ids,
            sinks,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network: CommitteeNetwork::new(config),
            rng: ChaCha8Rng::seed_from_u64(seed),
            timers: HashMap::new(),
            stats: SimulationStats::default(),
        };

        for index in 0..runner.nodes.len() {
            let actions = runner.nodes[index].start();
            runner.execute_actions(index as NodeIndex, actions);
        }
        runner
    }

    // ─── Accessors ───

    pub fn node(&self, index: NodeIndex) -> Option<&NodeState> {
        self.nodes.get(index as usize)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn events_sink(&self, index: NodeIndex) -> Option<&Arc<MemoryEventSink>> {
        self.sinks.get(index as usize)
    }

    pub fn network_mut(&mut self) -> &mut CommitteeNetwork {
        &mut self.network
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Current simulated wall clock, milliseconds since epoch.
    pub fn now_ms(&self) -> u64 {
        SIM_EPOCH_MS + self.now.as_millis() as u64
    }

    // ─── Scheduling ───

    /// Queue an event for a node at `now + delay`.
    pub fn schedule_event(&mut self, node: NodeIndex, delay: Duration, event: Event) -> Duration {
        let at = self.now + delay;
        let key = EventKey {
            at,
            seq: self.sequence,
        };
        self.sequence += 1;
        self.event_queue.insert(key, (node, event));
        at
    }

    /// Submit a verifier proof to one node's ingress.
    pub fn submit_proof(&mut self, node: NodeIndex, proof: QosProof) {
        self.schedule_event(
            node,
            Duration::ZERO,
            Event::ProofReceived {
                proof: Arc::new(proof),
            },
        );
    }

    /// Submit a supplementary proof to one node's ingress.
    pub fn submit_supplementary(&mut self, node: NodeIndex, task_id: TaskId, proof: QosProof) {
        self.schedule_event(
            node,
            Duration::ZERO,
            Event::SupplementaryProofReceived {
                task_id,
                proof: Arc::new(proof),
            },
        );
    }

    // ─── Execution ───

    /// Process queued events until the simulated clock reaches `until`.
    pub fn run_until(&mut self, until: Duration) {
        while let Some((&key, _)) = self.event_queue.iter().next() {
            if key.at > until {
                break;
            }
            self.step();
        }
        if self.now < until {
            self.now = until;
        }
    }

    /// Process exactly one queued event. Returns false when the queue is
    /// empty.
    pub fn step(&mut self) -> bool {
        let Some((&key, _)) = self.event_queue.iter().next() else {
            return false;
        };
        let (node_index, event) = self
            .event_queue
            .remove(&key)
            .expect("peeked key must exist");
        self.now = key.at;
        self.stats.events_processed += 1;

        // A fired timer is no longer cancellable.
        if let Some(timer_id) = timer_id_of(&event) {
            self.timers.remove(&(node_index, timer_id));
        }

        trace!(node = node_index, at = ?key.at, event = event.type_name(), "dispatch");
        let now_ms = self.now_ms();
        let node = &mut self.nodes[node_index as usize];
        node.set_now(now_ms);
        let actions = node.handle(event);
        self.execute_actions(node_index, actions);
        true
    }

    fn execute_actions(&mut self, from: NodeIndex, actions: Vec<Action>) {
        self.stats.actions_generated += actions.len() as u64;
        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    for to in 0..self.nodes.len() as NodeIndex {
                        if to == from {
                            continue;
                        }
                        match self.network.should_deliver(from, to, &mut self.rng) {
                            Some(latency) => {
                                self.stats.messages_sent += 1;
                                self.schedule_event(
                                    to,
                                    latency,
                                    Event::MessageReceived {
                                        message: message.clone(),
                                    },
                                );
                            }
                            None => self.stats.messages_dropped += 1,
                        }
                    }
                }
                Action::Send { to, message } => {
                    let Some(target) = self.index_of(&to) else {
                        debug!(to = %to, "send to unknown peer, dropping");
                        continue;
                    };
                    match self.network.should_deliver(from, target, &mut self.rng) {
                        Some(latency) => {
                            self.stats.messages_sent += 1;
                            self.schedule_event(
                                target,
                                latency,
                                Event::MessageReceived { message },
                            );
                        }
                        None => self.stats.messages_dropped += 1,
                    }
                }
                Action::SetTimer { id, duration } => {
                    self.stats.timers_set += 1;
                    // Replace any timer with the same id.
                    if let Some(key) = self.timers.remove(&(from, id.clone())) {
                        self.event_queue.remove(&key);
                    }
                    let event = match &id {
                        TimerId::Supplementary(task_id) => Event::SupplementaryTimeout {
                            task_id: task_id.clone(),
                        },
                        TimerId::Gc => Event::GcTimer,
                    };
                    let at = self.schedule_event(from, duration, event);
                    let key = EventKey {
                        at,
                        seq: self.sequence - 1,
                    };
                    self.timers.insert((from, id), key);
                }
                Action::CancelTimer { id } => {
                    self.stats.timers_cancelled += 1;
                    if let Some(key) = self.timers.remove(&(from, id)) {
                        self.event_queue.remove(&key);
                    }
                }
                Action::EmitTaskStatus { .. } => {
                    self.stats.statuses_emitted += 1;
                }
            }
        }
    }

    fn index_of(&self, id: &NodeId) -> Option<NodeIndex> {
        self.node_ids
            .iter()
            .position(|n| n == id)
            .map(|i| i as NodeIndex)
    }
}

fn timer_id_of(event: &Event) -> Option<TimerId> {
    match event {
        Event::SupplementaryTimeout { task_id } => {
            Some(TimerId::Supplementary(task_id.clone()))
        }
        Event::GcTimer => Some(TimerId::Gc),
        _ => None,
    }
}
