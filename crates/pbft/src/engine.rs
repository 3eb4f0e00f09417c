//! The PBFT engine state machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use veriqo_core::{
    phase_signing_bytes, ConsensusMessage, ConsensusType, EventSink, NodeEvent, NodeEventKind,
    PhaseVote, PrePrepare,
};
use veriqo_types::{proof_digest, MessageAuthenticator, NodeId, QosProof, TaskId};

/// One consensus slot, identified by view and sequence number.
type SlotKey = (u64, u64);

/// Minimum distinct senders required in the prepare and commit sets:
/// `2·⌊(N−1)/3⌋ + 1`.
pub fn quorum_threshold(total_nodes: usize) -> usize {
    2 * ((total_nodes.saturating_sub(1)) / 3) + 1
}

/// Phase of the current consensus slot. Monotone per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PbftPhase {
    Idle,
    PrePrepared,
    Prepared,
    Committed,
}

impl PbftPhase {
    /// Lowercase tag for the status surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            PbftPhase::Idle => "idle",
            PbftPhase::PrePrepared => "pre_prepared",
            PbftPhase::Prepared => "prepared",
            PbftPhase::Committed => "committed",
        }
    }
}

/// Produced when a commit quorum forms. The pipeline consumes this in place
/// of a consensus-reached callback.
#[derive(Debug, Clone)]
pub struct ConsensusDecision {
    pub task_id: TaskId,
    pub sequence_number: u64,
    pub proposal: Arc<QosProof>,
    pub consensus_type: ConsensusType,
}

/// Three-phase PBFT engine for one node.
///
/// Runs one replicated-log slot at a time. Prepare/commit votes arriving
/// before this node has entered the requisite phase are buffered per slot
/// and drained exactly once, when the node's own vote seeds the set.
pub struct PbftEngine {
    node_id: NodeId,
    is_leader: bool,
    quorum: usize,

    /// Monotone, starts at 0. There is no view change; the leader is fixed
    /// by configuration.
    view_number: u64,
    /// Leader-assigned, monotone.
    sequence_number: u64,
    phase: PbftPhase,

    current_proposal: Option<Arc<QosProof>>,
    current_digest: Option<String>,
    current_consensus_type: ConsensusType,
    current_task_id: Option<TaskId>,
    current_slot: Option<SlotKey>,

    /// Accepted votes per slot, keyed by sender.
    prepares: HashMap<SlotKey, BTreeMap<NodeId, PhaseVote>>,
    commits: HashMap<SlotKey, BTreeMap<NodeId, PhaseVote>>,

    /// Votes that arrived before this node entered the requisite phase.
    pending_prepares: HashMap<SlotKey, BTreeMap<NodeId, PhaseVote>>,
    pending_commits: HashMap<SlotKey, BTreeMap<NodeId, PhaseVote>>,

    /// Sequences finalized on this node. Checked before anything else.
    completed_sequences: HashSet<u64>,

    authenticator: Arc<dyn MessageAuthenticator>,
    events: Arc<dyn EventSink>,
    /// Injected clock, milliseconds since epoch.
    now_ms: u64,
}

impl std::fmt::Debug for PbftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PbftEngine")
            .field("node_id", &self.node_id)
            .field("is_leader", &self.is_leader)
            .field("phase", &self.phase)
            .field("view", &self.view_number)
            .field("seq", &self.sequence_number)
            .field("completed", &self.completed_sequences.len())
            .finish()
    }
}

impl PbftEngine {
    pub fn new(
        node_id: NodeId,
        is_leader: bool,
        total_nodes: usize,
        authenticator: Arc<dyn MessageAuthenticator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            node_id,
            is_leader,
            quorum: quorum_threshold(total_nodes),
            view_number: 0,
            sequence_number: 0,
            phase: PbftPhase::Idle,
            current_proposal: None,
            current_digest: None,
            current_consensus_type: ConsensusType::Normal,
            current_task_id: None,
            current_slot: None,
            prepares: HashMap::new(),
            commits: HashMap::new(),
            pending_prepares: HashMap::new(),
            pending_commits: HashMap::new(),
            completed_sequences: HashSet::new(),
            authenticator,
            events,
            now_ms: 0,
        }
    }

    // ─── Accessors ───

    pub fn phase(&self) -> PbftPhase {
        self.phase
    }

    pub fn view_number(&self) -> u64 {
        self.view_number
    }

    pub fn quorum(&self) -> usize {
        self.quorum
    }

    pub fn current_task_id(&self) -> Option<&TaskId> {
        self.current_task_id.as_ref()
    }

    pub fn is_completed(&self, sequence: u64) -> bool {
        self.completed_sequences.contains(&sequence)
    }

    pub fn completed_sequences(&self) -> &HashSet<u64> {
        &self.completed_sequences
    }

    /// Inject the current time. Set by the pipeline before each handler.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
    }

    // ─── Protocol ───

    /// Open a consensus slot for a proposal. Leader only, idle only; any
    /// other caller gets `None` and a log line.
    pub fn start_consensus(
        &mut self,
        task_id: TaskId,
        proposal: Arc<QosProof>,
        consensus_type: ConsensusType,
    ) -> Option<ConsensusMessage> {
        if !self.is_leader {
            warn!(node = %self.node_id, "start_consensus on a follower, ignoring");
            return None;
        }
        if self.phase != PbftPhase::Idle {
            warn!(
                node = %self.node_id,
                phase = ?self.phase,
                "start_consensus while a slot is active, ignoring"
            );
            return None;
        }

        self.sequence_number += 1;
        let sequence = self.sequence_number;
        let view = self.view_number;
        let digest = proof_digest(&proposal);
        let signature = self.authenticator.sign(&phase_signing_bytes(
            "PrePrepare",
            consensus_type,
            view,
            sequence,
            &digest,
        ));

        self.current_proposal = Some(proposal.clone());
        self.current_digest = Some(digest.clone());
        self.current_consensus_type = consensus_type;
        self.current_task_id = Some(task_id.clone());
        self.current_slot = Some((view, sequence));
        self.phase = PbftPhase::PrePrepared;

        self.events.record(NodeEvent {
            kind: NodeEventKind::ConsensusStarted,
            node_id: self.node_id.clone(),
            task_id: task_id.clone(),
            timestamp: self.now_ms,
            detail: Some(format!("seq {sequence}")),
        });
        debug!(node = %self.node_id, task = %task_id, sequence, "opened consensus slot");

        Some(ConsensusMessage::PrePrepare(PrePrepare {
            consensus_type,
            view_number: view,
            sequence_number: sequence,
            node_id: self.node_id.clone(),
            task_id,
            digest,
            signature,
            data: proposal,
        }))
    }

    /// Accept a leader proposal and vote for it.
    ///
    /// Valid in `Idle` (follower) or when the leader consumes its own
    /// PrePrepare in `PrePrepared`. The returned Prepare is also stored in
    /// this engine's own prepare set, so the sender counts toward its own
    /// quorum; seeding the set drains any buffered prepares for the slot.
    pub fn handle_pre_prepare(&mut self, msg: &PrePrepare) -> Option<ConsensusMessage> {
        if self.completed_sequences.contains(&msg.sequence_number) {
            trace!(seq = msg.sequence_number, "pre-prepare for completed sequence, dropping");
            return None;
        }
        if msg.view_number != self.view_number {
            debug!(
                got = msg.view_number,
                ours = self.view_number,
                "pre-prepare from a different view, dropping"
            );
            return None;
        }
        let signing = phase_signing_bytes(
            "PrePrepare",
            msg.consensus_type,
            msg.view_number,
            msg.sequence_number,
            &msg.digest,
        );
        if !self.authenticator.verify(&msg.node_id, &signing, &msg.signature) {
            warn!(sender = %msg.node_id, "pre-prepare signature invalid, dropping");
            return None;
        }
        if proof_digest(&msg.data) != msg.digest {
            warn!(sender = %msg.node_id, "pre-prepare digest mismatch, dropping");
            return None;
        }

        let own_echo = self.is_leader
            && self.phase == PbftPhase::PrePrepared
            && msg.node_id == self.node_id;
        if self.phase != PbftPhase::Idle && !own_echo {
            debug!(phase = ?self.phase, "pre-prepare outside idle, dropping");
            return None;
        }

        let slot = (msg.view_number, msg.sequence_number);
        self.current_proposal = Some(msg.data.clone());
        self.current_digest = Some(msg.digest.clone());
        self.current_consensus_type = msg.consensus_type;
        self.current_task_id = Some(msg.task_id.clone());
        self.current_slot = Some(slot);
        if self.phase == PbftPhase::Idle {
            self.phase = PbftPhase::PrePrepared;
        }

        let prepare = self.make_vote("Prepare", msg.consensus_type, slot, &msg.task_id, &msg.digest);
        self.prepares
            .entry(slot)
            .or_default()
            .insert(self.node_id.clone(), prepare.clone());
        self.drain_pending_prepares(slot);

        Some(ConsensusMessage::Prepare(prepare))
    }

    /// Collect a prepare vote. At quorum while `PrePrepared`, advance to
    /// `Prepared` and return this node's Commit (already pre-seeded into the
    /// commit set).
    pub fn handle_prepare(&mut self, vote: &PhaseVote) -> Option<ConsensusMessage> {
        if self.completed_sequences.contains(&vote.sequence_number) {
            trace!(seq = vote.sequence_number, "prepare for completed sequence, dropping");
            return None;
        }
        if !self.verify_vote("Prepare", vote) {
            return None;
        }

        let slot = (vote.view_number, vote.sequence_number);
        if self.phase > PbftPhase::PrePrepared {
            trace!(phase = ?self.phase, "late prepare, dropping");
            return None;
        }
        if self.phase < PbftPhase::PrePrepared {
            trace!(sender = %vote.node_id, seq = vote.sequence_number, "buffering early prepare");
            self.pending_prepares
                .entry(slot)
                .or_default()
                .insert(vote.node_id.clone(), vote.clone());
            return None;
        }

        let set = self.prepares.entry(slot).or_default();
        set.entry(vote.node_id.clone()).or_insert_with(|| vote.clone());
        self.drain_pending_prepares(slot);

        if self.current_slot == Some(slot)
            && self.phase == PbftPhase::PrePrepared
            && self.prepare_count(slot) >= self.quorum
        {
            self.phase = PbftPhase::Prepared;
            let (task_id, digest) = match (&self.current_task_id, &self.current_digest) {
                (Some(task), Some(digest)) => (task.clone(), digest.clone()),
                _ => {
                    warn!("prepared without an adopted proposal, dropping");
                    return None;
                }
            };
            let commit = self.make_vote(
                "Commit",
                self.current_consensus_type,
                slot,
                &task_id,
                &digest,
            );
            self.commits
                .entry(slot)
                .or_default()
                .insert(self.node_id.clone(), commit.clone());
            self.drain_pending_commits(slot);
            debug!(node = %self.node_id, task = %task_id, "prepare quorum reached");
            return Some(ConsensusMessage::Commit(commit));
        }
        None
    }

    /// Collect a commit vote. At quorum while `Prepared`, finalize the slot
    /// and return the decision; the engine resets to idle.
    pub fn handle_commit(&mut self, vote: &PhaseVote) -> Option<ConsensusDecision> {
        if self.completed_sequences.contains(&vote.sequence_number) {
            trace!(seq = vote.sequence_number, "commit for completed sequence, dropping");
            return None;
        }
        if !self.verify_vote("Commit", vote) {
            return None;
        }

        let slot = (vote.view_number, vote.sequence_number);
        if self.phase > PbftPhase::Prepared {
            trace!(phase = ?self.phase, "late commit, dropping");
            return None;
        }
        if self.phase < PbftPhase::Prepared {
            trace!(sender = %vote.node_id, seq = vote.sequence_number, "buffering early commit");
            self.pending_commits
                .entry(slot)
                .or_default()
                .insert(vote.node_id.clone(), vote.clone());
            return None;
        }

        let set = self.commits.entry(slot).or_default();
        set.entry(vote.node_id.clone()).or_insert_with(|| vote.clone());
        self.drain_pending_commits(slot);

        if self.current_slot == Some(slot)
            && self.phase == PbftPhase::Prepared
            && self.commit_count(slot) >= self.quorum
        {
            self.phase = PbftPhase::Committed;
            self.completed_sequences.insert(slot.1);

            let decision = match (&self.current_task_id, &self.current_proposal) {
                (Some(task_id), Some(proposal)) => ConsensusDecision {
                    task_id: task_id.clone(),
                    sequence_number: slot.1,
                    proposal: proposal.clone(),
                    consensus_type: self.current_consensus_type,
                },
                _ => {
                    warn!("commit quorum without an adopted proposal, dropping");
                    self.reset_slot(slot);
                    return None;
                }
            };

            debug!(
                node = %self.node_id,
                task = %decision.task_id,
                seq = decision.sequence_number,
                "commit quorum reached"
            );
            self.reset_slot(slot);
            return Some(decision);
        }
        None
    }

    // ─── Internals ───

    fn make_vote(
        &self,
        kind: &str,
        consensus_type: ConsensusType,
        slot: SlotKey,
        task_id: &TaskId,
        digest: &str,
    ) -> PhaseVote {
        let signature = self.authenticator.sign(&phase_signing_bytes(
            kind,
            consensus_type,
            slot.0,
            slot.1,
            digest,
        ));
        PhaseVote {
            consensus_type,
            view_number: slot.0,
            sequence_number: slot.1,
            node_id: self.node_id.clone(),
            task_id: task_id.clone(),
            digest: digest.to_string(),
            signature,
        }
    }

    fn verify_vote(&self, kind: &str, vote: &PhaseVote) -> bool {
        if vote.view_number != self.view_number {
            debug!(
                got = vote.view_number,
                ours = self.view_number,
                "{kind} from a different view, dropping"
            );
            return false;
        }
        let signing = phase_signing_bytes(
            kind,
            vote.consensus_type,
            vote.view_number,
            vote.sequence_number,
            &vote.digest,
        );
        if !self.authenticator.verify(&vote.node_id, &signing, &vote.signature) {
            warn!(sender = %vote.node_id, "{kind} signature invalid, dropping");
            return false;
        }
        true
    }

    /// Move buffered prepares into the live set. Only fires once the node's
    /// own vote is present, preserving the own-vote-seeds-the-set invariant.
    fn drain_pending_prepares(&mut self, slot: SlotKey) {
        let own_present = self
            .prepares
            .get(&slot)
            .is_some_and(|set| set.contains_key(&self.node_id));
        if !own_present {
            return;
        }
        if let Some(buffered) = self.pending_prepares.remove(&slot) {
            let set = self.prepares.entry(slot).or_default();
            for (sender, vote) in buffered {
                set.entry(sender).or_insert(vote);
            }
        }
    }

    /// Mirror of [`Self::drain_pending_prepares`] for commits.
    fn drain_pending_commits(&mut self, slot: SlotKey) {
        let own_present = self
            .commits
            .get(&slot)
            .is_some_and(|set| set.contains_key(&self.node_id));
        if !own_present {
            return;
        }
        if let Some(buffered) = self.pending_commits.remove(&slot) {
            let set = self.commits.entry(slot).or_default();
            for (sender, vote) in buffered {
                set.entry(sender).or_insert(vote);
            }
        }
    }

    fn prepare_count(&self, slot: SlotKey) -> usize {
        self.prepares.get(&slot).map_or(0, BTreeMap::len)
    }

    fn commit_count(&self, slot: SlotKey) -> usize {
        self.commits.get(&slot).map_or(0, BTreeMap::len)
    }

    fn reset_slot(&mut self, slot: SlotKey) {
        self.phase = PbftPhase::Idle;
        self.current_proposal = None;
        self.current_digest = None;
        self.current_task_id = None;
        self.current_slot = None;
        self.pending_prepares.remove(&slot);
        self.pending_commits.remove(&slot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriqo_core::MemoryEventSink;
    use veriqo_types::test_utils::test_proof;
    use veriqo_types::CommitteeAuthenticator;

    const NOW: u64 = 1_700_000_000_000;

    fn committee(n: usize) -> Vec<NodeId> {
        (0..n).map(|i| NodeId::from(format!("node{i}"))).collect()
    }

    fn engines(n: usize) -> Vec<PbftEngine> {
        let ids = committee(n);
        ids.iter()
            .enumerate()
            .map(|(i, id)| {
                PbftEngine::new(
                    id.clone(),
                    i == 0,
                    n,
                    Arc::new(CommitteeAuthenticator::derive(id, &ids)),
                    Arc::new(MemoryEventSink::new()),
                )
            })
            .collect()
    }

    fn proposal() -> (TaskId, Arc<QosProof>) {
        (
            TaskId::from("task-A"),
            Arc::new(test_proof("task-A", "v1", NOW)),
        )
    }

    fn as_pre_prepare(msg: &ConsensusMessage) -> &PrePrepare {
        match msg {
            ConsensusMessage::PrePrepare(m) => m,
            other => panic!("expected PrePrepare, got {}", other.type_name()),
        }
    }

    fn as_prepare(msg: &ConsensusMessage) -> &PhaseVote {
        match msg {
            ConsensusMessage::Prepare(m) => m,
            other => panic!("expected Prepare, got {}", other.type_name()),
        }
    }

    fn as_commit(msg: &ConsensusMessage) -> &PhaseVote {
        match msg {
            ConsensusMessage::Commit(m) => m,
            other => panic!("expected Commit, got {}", other.type_name()),
        }
    }

    #[test]
    fn test_quorum_threshold() {
        assert_eq!(quorum_threshold(4), 3);
        assert_eq!(quorum_threshold(7), 5);
        assert_eq!(quorum_threshold(10), 7);
        assert_eq!(quorum_threshold(1), 1);
    }

    #[test]
    fn test_follower_cannot_start_consensus() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        assert!(nodes[1]
            .start_consensus(task, proof, ConsensusType::Normal)
            .is_none());
        assert_eq!(nodes[1].phase(), PbftPhase::Idle);
    }

    #[test]
    fn test_leader_cannot_start_while_busy() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        assert!(nodes[0]
            .start_consensus(task.clone(), proof.clone(), ConsensusType::Normal)
            .is_some());
        assert!(nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .is_none());
    }

    /// Run a full round across all engines, mimicking the pipeline's
    /// broadcast-and-feed-back rules. Returns the decisions per node.
    fn run_full_round(nodes: &mut [PbftEngine]) -> Vec<Option<ConsensusDecision>> {
        let (task, proof) = proposal();
        let pre_prepare_msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .expect("leader should open a slot");
        let pre_prepare = as_pre_prepare(&pre_prepare_msg).clone();

        // Every node (leader included) handles the PrePrepare and emits a
        // Prepare.
        let prepares: Vec<PhaseVote> = nodes
            .iter_mut()
            .map(|n| {
                as_prepare(&n.handle_pre_prepare(&pre_prepare).expect("prepare")).clone()
            })
            .collect();

        // All prepares (own included) reach every node.
        let mut commits: Vec<PhaseVote> = Vec::new();
        for node in nodes.iter_mut() {
            for prepare in &prepares {
                if let Some(msg) = node.handle_prepare(prepare) {
                    commits.push(as_commit(&msg).clone());
                }
            }
        }

        let mut decisions: Vec<Option<ConsensusDecision>> = vec![None; nodes.len()];
        for (i, node) in nodes.iter_mut().enumerate() {
            for commit in &commits {
                if let Some(decision) = node.handle_commit(commit) {
                    decisions[i] = Some(decision);
                }
            }
        }
        decisions
    }

    #[test]
    fn test_full_round_reaches_decision_on_all_nodes() {
        let mut nodes = engines(4);
        let decisions = run_full_round(&mut nodes);
        for (i, decision) in decisions.iter().enumerate() {
            let decision = decision.as_ref().unwrap_or_else(|| panic!("node{i} decided"));
            assert_eq!(decision.task_id, TaskId::from("task-A"));
            assert_eq!(decision.sequence_number, 1);
            assert_eq!(decision.consensus_type, ConsensusType::Normal);
        }
        for node in &nodes {
            assert_eq!(node.phase(), PbftPhase::Idle);
            assert!(node.is_completed(1));
        }
    }

    #[test]
    fn test_completed_sequence_suppresses_late_messages() {
        let mut nodes = engines(4);
        let _ = run_full_round(&mut nodes);

        // Replay a prepare for the finalized sequence; nothing may change.
        let ids = committee(4);
        let auth = CommitteeAuthenticator::derive(&ids[1], &ids);
        let digest = proof_digest(&test_proof("task-A", "v1", NOW));
        let signature = auth.sign(&phase_signing_bytes(
            "Prepare",
            ConsensusType::Normal,
            0,
            1,
            &digest,
        ));
        let late = PhaseVote {
            consensus_type: ConsensusType::Normal,
            view_number: 0,
            sequence_number: 1,
            node_id: ids[1].clone(),
            task_id: TaskId::from("task-A"),
            digest,
            signature,
        };
        assert!(nodes[0].handle_prepare(&late).is_none());
        assert!(nodes[0].handle_commit(&late).is_none());
        assert_eq!(nodes[0].phase(), PbftPhase::Idle);
    }

    #[test]
    fn test_early_prepares_are_buffered_and_drained_once() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let pre_prepare_msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let pre_prepare = as_pre_prepare(&pre_prepare_msg).clone();

        // Nodes 0, 2, 3 produce prepares; node 1 has not seen the
        // pre-prepare yet.
        let p0 = as_prepare(&nodes[0].handle_pre_prepare(&pre_prepare).unwrap()).clone();
        let p2 = as_prepare(&nodes[2].handle_pre_prepare(&pre_prepare).unwrap()).clone();
        let p3 = as_prepare(&nodes[3].handle_pre_prepare(&pre_prepare).unwrap()).clone();

        // Early prepares reach node 1 while still idle: buffered, no output.
        assert!(nodes[1].handle_prepare(&p0).is_none());
        assert!(nodes[1].handle_prepare(&p2).is_none());
        assert_eq!(nodes[1].phase(), PbftPhase::Idle);

        // The pre-prepare finally arrives. Seeding node 1's own prepare
        // drains the buffer; feeding its own prepare back then finds
        // 3 prepares >= quorum and yields the commit.
        let p1_msg = nodes[1].handle_pre_prepare(&pre_prepare).unwrap();
        let p1 = as_prepare(&p1_msg).clone();
        assert_eq!(nodes[1].phase(), PbftPhase::PrePrepared);
        let commit = nodes[1].handle_prepare(&p1);
        assert!(commit.is_some(), "drained prepares should complete quorum");
        assert_eq!(nodes[1].phase(), PbftPhase::Prepared);

        // The late third-party prepare is a no-op now.
        assert!(nodes[1].handle_prepare(&p3).is_none());
        assert_eq!(nodes[1].phase(), PbftPhase::Prepared);
    }

    #[test]
    fn test_early_commits_are_buffered_until_prepared() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let pre_prepare_msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let pre_prepare = as_pre_prepare(&pre_prepare_msg).clone();

        // Other nodes race far ahead and their commits arrive at node 3
        // before it even saw the pre-prepare.
        let prepares: Vec<PhaseVote> = [0usize, 1, 2]
            .iter()
            .map(|&i| as_prepare(&nodes[i].handle_pre_prepare(&pre_prepare).unwrap()).clone())
            .collect();
        let mut commits = Vec::new();
        for i in [0usize, 1, 2] {
            for prepare in &prepares {
                if let Some(msg) = nodes[i].handle_prepare(prepare) {
                    commits.push(as_commit(&msg).clone());
                }
            }
        }
        assert_eq!(commits.len(), 3);

        for commit in &commits {
            assert!(nodes[3].handle_commit(commit).is_none());
        }
        assert_eq!(nodes[3].phase(), PbftPhase::Idle);

        // Node 3 catches up: pre-prepare, then prepares. Reaching the
        // prepare quorum seeds its own commit and drains the buffered
        // commits, which immediately completes the round.
        let p3_msg = nodes[3].handle_pre_prepare(&pre_prepare).unwrap();
        let p3 = as_prepare(&p3_msg).clone();
        let mut decision = None;
        let own_commit = nodes[3].handle_prepare(&p3);
        if let Some(msg) = &own_commit {
            decision = nodes[3].handle_commit(as_commit(msg));
        }
        if decision.is_none() {
            for prepare in &prepares {
                if let Some(msg) = nodes[3].handle_prepare(prepare) {
                    decision = nodes[3].handle_commit(as_commit(&msg));
                }
            }
        }
        assert!(decision.is_some(), "buffered commits should finalize the slot");
        assert!(nodes[3].is_completed(1));
    }

    #[test]
    fn test_digest_mismatch_rejected() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let mut pre_prepare = as_pre_prepare(&msg).clone();
        pre_prepare.data = Arc::new(test_proof("task-A", "v9", NOW));

        assert!(nodes[1].handle_pre_prepare(&pre_prepare).is_none());
        assert_eq!(nodes[1].phase(), PbftPhase::Idle);
    }

    #[test]
    fn test_wrong_view_rejected() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let mut pre_prepare = as_pre_prepare(&msg).clone();
        pre_prepare.view_number = 5;

        assert!(nodes[1].handle_pre_prepare(&pre_prepare).is_none());
    }

    #[test]
    fn test_bad_signature_rejected() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let mut pre_prepare = as_pre_prepare(&msg).clone();
        pre_prepare.signature = "deadbeef".to_string();

        assert!(nodes[1].handle_pre_prepare(&pre_prepare).is_none());
    }

    #[test]
    fn test_duplicate_prepares_do_not_double_count() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Normal)
            .unwrap();
        let pre_prepare = as_pre_prepare(&msg).clone();

        let own = as_prepare(&nodes[1].handle_pre_prepare(&pre_prepare).unwrap()).clone();
        let other = as_prepare(&nodes[2].handle_pre_prepare(&pre_prepare).unwrap()).clone();

        // Two distinct senders (self + node2) plus replays: still below the
        // quorum of 3.
        assert!(nodes[1].handle_prepare(&own).is_none());
        assert!(nodes[1].handle_prepare(&other).is_none());
        assert!(nodes[1].handle_prepare(&other).is_none());
        assert_eq!(nodes[1].phase(), PbftPhase::PrePrepared);
    }

    #[test]
    fn test_conflict_type_is_carried_through() {
        let mut nodes = engines(4);
        let (task, proof) = proposal();
        let msg = nodes[0]
            .start_consensus(task, proof, ConsensusType::Conflict)
            .unwrap();
        let pre_prepare = as_pre_prepare(&msg).clone();

        let prepares: Vec<PhaseVote> = nodes
            .iter_mut()
            .map(|n| as_prepare(&n.handle_pre_prepare(&pre_prepare).unwrap()).clone())
            .collect();
        let mut commits = Vec::new();
        for node in nodes.iter_mut() {
            for prepare in &prepares {
                if let Some(msg) = node.handle_prepare(prepare) {
                    commits.push(as_commit(&msg).clone());
                }
            }
        }
        let mut decision = None;
        for node in nodes.iter_mut() {
            for commit in &commits {
                if let Some(d) = node.handle_commit(commit) {
                    decision = Some(d);
                }
            }
        }
        assert_eq!(
            decision.expect("decision").consensus_type,
            ConsensusType::Conflict
        );
    }
}
