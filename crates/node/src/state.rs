//! The task pipeline state machine.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use veriqo_core::{
    supplementary_signing_bytes, Action, ConsensusMessage, ConsensusType, Event, EventSink,
    NodeEvent, NodeEventKind, PrePrepare, StateMachine, SupplementarySignal, TimerId,
};
use veriqo_pbft::{ConsensusDecision, PbftEngine};
use veriqo_types::{
    proof_digest, MessageAuthenticator, NodeId, ProofVerifier, QosProof, SupplementaryInfo,
    TaskId, TaskResult, TaskState, TaskStatus,
};
use veriqo_validator::{
    classify_conflict, deep_validate, quick_validate, resolve_with_supplementary, Resolution,
};

/// How long a conflicted task waits for its supplementary attestation.
pub const SUPPLEMENTARY_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Interval between garbage-collection sweeps.
pub const GC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Tasks still pending after this long are expired by the sweep.
const TASK_EXPIRY_MS: u64 = 24 * 60 * 60 * 1000;

/// Everything a node holds about one task.
struct TaskRecord {
    status: TaskStatus,
    /// Original proofs in arrival order. `status.verifier_ids` mirrors this.
    proofs: Vec<Arc<QosProof>>,
    supplementary_proofs: Vec<Arc<QosProof>>,
}

impl TaskRecord {
    fn new(task_id: TaskId, now_ms: u64) -> Self {
        Self {
            status: TaskStatus::new(task_id, now_ms),
            proofs: Vec::new(),
            supplementary_proofs: Vec::new(),
        }
    }
}

/// The per-node task pipeline.
///
/// Owns the task table and the serial consensus queue, wires the validator
/// and the PBFT engine together, and implements the supplementary two-stage
/// protocol. At most one consensus slot is active per node at a time; other
/// ready tasks wait in the FIFO queue.
pub struct NodeState {
    node_id: NodeId,
    leader_id: NodeId,
    is_leader: bool,

    tasks: HashMap<TaskId, TaskRecord>,

    /// FIFO of tasks ready for consensus. Leader only.
    consensus_queue: VecDeque<(TaskId, ConsensusType)>,
    /// One-at-a-time consensus window.
    processing_consensus: bool,
    /// Inbound PBFT phase messages for other tasks are dropped while set.
    current_consensus_task_id: Option<TaskId>,

    /// PrePrepares that arrived before this node had two local proofs.
    pending_pre_prepare: HashMap<TaskId, PrePrepare>,
    /// Second-round PrePrepares that arrived before supplementary handling
    /// finished locally.
    pending_final_pre_prepare: HashMap<TaskId, PrePrepare>,

    /// Replicas that acknowledged the supplementary proof. Leader only.
    supplementary_ready: HashMap<TaskId, BTreeSet<NodeId>>,
    /// Deferred second-round payloads awaiting the ready quorum. Leader only.
    pending_supplementary_consensus: HashMap<TaskId, Arc<QosProof>>,
    /// Final rounds whose ready quorum completed while another task held
    /// the consensus window. Retried when the window frees. Leader only.
    deferred_final_rounds: VecDeque<TaskId>,

    engine: PbftEngine,
    authenticator: Arc<dyn MessageAuthenticator>,
    proof_verifier: Arc<dyn ProofVerifier>,
    events: Arc<dyn EventSink>,
    now_ms: u64,
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("node_id", &self.node_id)
            .field("is_leader", &self.is_leader)
            .field("tasks", &self.tasks.len())
            .field("queue", &self.consensus_queue.len())
            .field("processing", &self.processing_consensus)
            .field("engine", &self.engine)
            .finish()
    }
}

impl NodeState {
    pub fn new(
        node_id: NodeId,
        leader_id: NodeId,
        total_nodes: usize,
        authenticator: Arc<dyn MessageAuthenticator>,
        proof_verifier: Arc<dyn ProofVerifier>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let is_leader = node_id == leader_id;
        let engine = PbftEngine::new(
            node_id.clone(),
            is_leader,
            total_nodes,
            authenticator.clone(),
            events.clone(),
        );
        Self {
            node_id,
            leader_id,
            is_leader,
            tasks: HashMap::new(),
            consensus_queue: VecDeque::new(),
            processing_consensus: false,
            current_consensus_task_id: None,
            pending_pre_prepare: HashMap::new(),
            pending_final_pre_prepare: HashMap::new(),
            supplementary_ready: HashMap::new(),
            pending_supplementary_consensus: HashMap::new(),
            deferred_final_rounds: VecDeque::new(),
            engine,
            authenticator,
            proof_verifier,
            events,
            now_ms: 0,
        }
    }

    /// Initial actions: arm the periodic GC sweep.
    pub fn start(&mut self) -> Vec<Action> {
        vec![Action::SetTimer {
            id: TimerId::Gc,
            duration: GC_INTERVAL,
        }]
    }

    // ─── Accessors ───

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader
    }

    pub fn engine(&self) -> &PbftEngine {
        &self.engine
    }

    pub fn task_status(&self, task_id: &TaskId) -> Option<&TaskStatus> {
        self.tasks.get(task_id).map(|r| &r.status)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn queue_len(&self) -> usize {
        self.consensus_queue.len()
    }

    pub fn processing_consensus(&self) -> bool {
        self.processing_consensus
    }

    /// Seed a task record directly. Test scaffolding only.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn seed_pending_task(&mut self, task_id: TaskId, updated_at: u64) {
        let mut record = TaskRecord::new(task_id.clone(), updated_at);
        record.status.updated_at = updated_at;
        self.tasks.insert(task_id, record);
    }

    // ─── Ingest ───

    fn on_proof(&mut self, proof: Arc<QosProof>, actions: &mut Vec<Action>) {
        let task_id = proof.task_id.clone();
        self.record_event(NodeEventKind::ProofReceived, &task_id, None);

        let verdict = quick_validate(&proof, self.now_ms, self.proof_verifier.as_ref());
        if !verdict.valid {
            debug!(task = %task_id, reason = %verdict.details, "proof failed quick validation, dropping");
            self.record_event(NodeEventKind::ProofRejected, &task_id, Some(verdict.details));
            return;
        }

        let duplicate = self
            .tasks
            .get(&task_id)
            .is_some_and(|r| r.status.verifier_ids.contains(&proof.verifier_id));
        if duplicate {
            debug!(task = %task_id, verifier = %proof.verifier_id, "duplicate verifier, dropping");
            self.record_event(NodeEventKind::DuplicateProof, &task_id, None);
            return;
        }

        let now_ms = self.now_ms;
        let record = self
            .tasks
            .entry(task_id.clone())
            .or_insert_with(|| TaskRecord::new(task_id.clone(), now_ms));

        record.proofs.push(proof.clone());
        record.status.proof_count += 1;
        record.status.verifier_ids.push(proof.verifier_id.clone());
        record.status.updated_at = now_ms;
        if record.status.state == TaskState::Pending {
            record.status.state = TaskState::Validating;
        }

        if self.is_leader
            && record.status.proof_count >= 2
            && record.status.state == TaskState::Validating
        {
            let deep = deep_validate(&record.proofs);
            let consensus_type = if !deep.valid && deep.has_conflict {
                let conflict = classify_conflict(&deep);
                let validation = record.status.validation_info_mut();
                validation.conflict_type = Some(conflict);
                validation.conflict_details = deep.reason.clone();
                info!(task = %task_id, ?conflict, "conflict detected, queueing conflict consensus");
                ConsensusType::Conflict
            } else {
                ConsensusType::Normal
            };
            record.status.state = TaskState::Consensus;
            self.consensus_queue.push_back((task_id.clone(), consensus_type));
        }

        self.emit_status(&task_id, actions);

        if self.is_leader {
            self.drain_queue(actions);
        } else if let Some(pre) = self.pending_pre_prepare.remove(&task_id) {
            // Another proof may unblock a buffered leader proposal.
            self.dispatch_pre_prepare(pre, actions);
        }
    }

    // ─── Consensus queue ───

    /// Pop ready tasks off the queue and open a slot for the first eligible
    /// one. Leader only, serial: the consensus-reached path clears the
    /// window and re-enters.
    fn drain_queue(&mut self, actions: &mut Vec<Action>) {
        while !self.processing_consensus {
            let Some((task_id, consensus_type)) = self.consensus_queue.pop_front() else {
                return;
            };
            let Some(record) = self.tasks.get(&task_id) else {
                continue;
            };
            // Tasks awaiting their supplementary round are deliberately not
            // driven through the ordinary queue.
            if record.status.state == TaskState::AwaitingSupplementary {
                trace!(task = %task_id, "skipping task awaiting supplementary");
                continue;
            }
            if record.status.state != TaskState::Consensus {
                trace!(task = %task_id, state = %record.status.state, "skipping non-consensus task");
                continue;
            }
            let Some(first_proof) = record.proofs.first().cloned() else {
                continue;
            };

            self.processing_consensus = true;
            self.current_consensus_task_id = Some(task_id.clone());

            match self
                .engine
                .start_consensus(task_id.clone(), first_proof, consensus_type)
            {
                Some(pre_prepare_msg) => {
                    actions.push(Action::Broadcast {
                        message: pre_prepare_msg.clone(),
                    });
                    if let ConsensusMessage::PrePrepare(pre) = pre_prepare_msg {
                        // Synthesize and broadcast the leader's own Prepare.
                        self.dispatch_pre_prepare(pre, actions);
                    }
                }
                None => {
                    // Engine busy (e.g. a final round in flight). Put the
                    // task back and stop; the next drain retries.
                    warn!(task = %task_id, "engine not idle, requeueing");
                    self.consensus_queue.push_front((task_id, consensus_type));
                    self.processing_consensus = false;
                    self.current_consensus_task_id = None;
                    return;
                }
            }
        }
    }

    // ─── Inbound messages ───

    fn on_message(&mut self, message: ConsensusMessage, actions: &mut Vec<Action>) {
        match message {
            ConsensusMessage::PrePrepare(pre) => {
                if self.filtered(pre.task_id.clone()) {
                    return;
                }
                self.dispatch_pre_prepare(pre, actions);
            }
            ConsensusMessage::Prepare(vote) => {
                if self.filtered(vote.task_id.clone()) {
                    return;
                }
                if let Some(commit_msg) = self.engine.handle_prepare(&vote) {
                    actions.push(Action::Broadcast {
                        message: commit_msg.clone(),
                    });
                    if let ConsensusMessage::Commit(commit) = &commit_msg {
                        if let Some(decision) = self.engine.handle_commit(commit) {
                            self.on_consensus_reached(decision, actions);
                        }
                    }
                }
            }
            ConsensusMessage::Commit(vote) => {
                if self.filtered(vote.task_id.clone()) {
                    return;
                }
                if let Some(decision) = self.engine.handle_commit(&vote) {
                    self.on_consensus_reached(decision, actions);
                }
            }
            ConsensusMessage::StatusUpdate(update) => {
                // Reserved; recorded for observability only.
                debug!(
                    task = %update.task_id,
                    sender = %update.node_id,
                    state = %update.state,
                    "status update received"
                );
            }
            ConsensusMessage::SupplementaryReady(signal) => {
                self.on_supplementary_ready(signal, actions);
            }
            ConsensusMessage::SupplementaryAck(signal) => {
                self.on_supplementary_ack(signal, actions);
            }
        }
    }

    /// PBFT phase messages for tasks other than the active one are dropped.
    fn filtered(&self, task_id: TaskId) -> bool {
        match &self.current_consensus_task_id {
            Some(current) if *current != task_id => {
                trace!(task = %task_id, current = %current, "message for inactive task, dropping");
                true
            }
            _ => false,
        }
    }

    /// Run a PrePrepare through `process_pre_prepare` and, when it yields
    /// this node's Prepare, broadcast it and feed it back so the node counts
    /// its own vote; any resulting Commit follows the same path.
    fn dispatch_pre_prepare(&mut self, pre: PrePrepare, actions: &mut Vec<Action>) {
        let Some(prepare_msg) = self.process_pre_prepare(pre, actions) else {
            return;
        };
        actions.push(Action::Broadcast {
            message: prepare_msg.clone(),
        });
        let ConsensusMessage::Prepare(prepare) = &prepare_msg else {
            return;
        };
        if let Some(commit_msg) = self.engine.handle_prepare(prepare) {
            actions.push(Action::Broadcast {
                message: commit_msg.clone(),
            });
            if let ConsensusMessage::Commit(commit) = &commit_msg {
                if let Some(decision) = self.engine.handle_commit(commit) {
                    self.on_consensus_reached(decision, actions);
                }
            }
        }
    }

    /// Admit a leader proposal into the local pipeline.
    ///
    /// Buffers the message when fewer than two local proofs exist; detects
    /// second-round proposals from local state; otherwise validates the
    /// payload and local proof set before handing the message to the engine.
    fn process_pre_prepare(
        &mut self,
        pre: PrePrepare,
        actions: &mut Vec<Action>,
    ) -> Option<ConsensusMessage> {
        let task_id = pre.task_id.clone();
        self.current_consensus_task_id = Some(task_id.clone());

        let proof_count = self.tasks.get(&task_id).map_or(0, |r| r.proofs.len());
        if proof_count < 2 {
            debug!(task = %task_id, proof_count, "buffering pre-prepare until enough proofs");
            self.pending_pre_prepare.insert(task_id, pre);
            return None;
        }

        let state = self.tasks.get(&task_id).map(|r| r.status.state)?;

        // Second-round detection: a Normal proposal against a task that has
        // been through supplementary resolution locally.
        if pre.consensus_type == ConsensusType::Normal {
            if state == TaskState::Validated {
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::Consensus;
                    record.status.updated_at = self.now_ms;
                }
                self.emit_status(&task_id, actions);
                return self.engine.handle_pre_prepare(&pre);
            }
            if state == TaskState::AwaitingSupplementary {
                // We have not processed the supplementary yet; hold the
                // final-round proposal until we do.
                debug!(task = %task_id, "buffering final-round pre-prepare");
                self.pending_final_pre_prepare.insert(task_id, pre);
                return None;
            }
        }

        let verdict = quick_validate(&pre.data, self.now_ms, self.proof_verifier.as_ref());
        if !verdict.valid {
            debug!(task = %task_id, reason = %verdict.details, "pre-prepare payload invalid, dropping");
            return None;
        }

        if let Some(record) = self.tasks.get_mut(&task_id) {
            let deep = deep_validate(&record.proofs);
            if !deep.valid && deep.has_conflict {
                let conflict = classify_conflict(&deep);
                let validation = record.status.validation_info_mut();
                validation.conflict_type = Some(conflict);
                validation.conflict_details = deep.reason.clone();
            }
            record.status.state = TaskState::Consensus;
            record.status.updated_at = self.now_ms;
        }
        self.emit_status(&task_id, actions);

        self.engine.handle_pre_prepare(&pre)
    }

    // ─── Consensus reached ───

    fn on_consensus_reached(&mut self, decision: ConsensusDecision, actions: &mut Vec<Action>) {
        let task_id = decision.task_id.clone();
        info!(
            node = %self.node_id,
            task = %task_id,
            seq = decision.sequence_number,
            consensus_type = ?decision.consensus_type,
            "consensus reached"
        );

        let now_ms = self.now_ms;
        if let Some(record) = self.tasks.get_mut(&task_id) {
            let event_kind = match decision.consensus_type {
                ConsensusType::Normal => {
                    record.status.state = TaskState::Finalized;
                    record.status.updated_at = now_ms;
                    record.status.result = Some(TaskResult {
                        consensus_timestamp: now_ms,
                        tx_hash: None,
                    });
                    NodeEventKind::ConsensusReachNormal
                }
                ConsensusType::Conflict => {
                    record.status.state = TaskState::AwaitingSupplementary;
                    record.status.updated_at = now_ms;
                    let validation = record.status.validation_info_mut();
                    validation.supplementary_requested = true;
                    validation.supplementary_request_time = Some(now_ms);
                    actions.push(Action::SetTimer {
                        id: TimerId::Supplementary(task_id.clone()),
                        duration: SUPPLEMENTARY_TIMEOUT,
                    });
                    NodeEventKind::ConsensusReachConflict
                }
            };
            self.record_event(event_kind, &task_id, None);
            self.emit_status(&task_id, actions);
        } else {
            warn!(task = %task_id, "consensus reached for unknown task");
        }

        if self
            .consensus_queue
            .front()
            .is_some_and(|(head, _)| *head == task_id)
        {
            self.consensus_queue.pop_front();
        }
        self.processing_consensus = false;
        self.current_consensus_task_id = None;
        if self.is_leader {
            // Final rounds deferred on a busy window take the freed slot
            // before queued first rounds. Each is attempted once; a still
            // unstartable round re-defers itself.
            let deferred: Vec<TaskId> = self.deferred_final_rounds.drain(..).collect();
            for deferred_task in deferred {
                self.start_final_consensus(deferred_task, actions);
            }
            self.drain_queue(actions);
        }
    }

    // ─── Supplementary protocol ───

    fn on_supplementary_proof(
        &mut self,
        task_id: TaskId,
        proof: Arc<QosProof>,
        actions: &mut Vec<Action>,
    ) {
        let Some(record) = self.tasks.get(&task_id) else {
            debug!(task = %task_id, "supplementary proof for unknown task, dropping");
            return;
        };
        if record.status.state != TaskState::AwaitingSupplementary || record.proofs.len() < 2 {
            debug!(
                task = %task_id,
                state = %record.status.state,
                "supplementary proof outside awaiting state, dropping"
            );
            return;
        }

        let verdict = quick_validate(&proof, self.now_ms, self.proof_verifier.as_ref());
        if !verdict.valid {
            if let Some(record) = self.tasks.get_mut(&task_id) {
                record.status.state = TaskState::Failed;
                record.status.updated_at = self.now_ms;
                record.status.validation_info_mut().error_message =
                    Some(format!("supplementary proof invalid: {}", verdict.details));
            }
            actions.push(Action::CancelTimer {
                id: TimerId::Supplementary(task_id.clone()),
            });
            self.emit_status(&task_id, actions);
            return;
        }

        // Assign a synthetic id when the verifier did not provide one.
        let proof = if proof.id.is_none() {
            let mut assigned = (*proof).clone();
            assigned.id = Some(format!("supp-{}", &proof_digest(&assigned)[..16]));
            Arc::new(assigned)
        } else {
            proof
        };
        let supplementary_id = proof.id.clone().unwrap_or_default();

        let resolution = {
            let record = match self.tasks.get_mut(&task_id) {
                Some(record) => record,
                None => return,
            };
            record.supplementary_proofs.push(proof.clone());
            record
                .status
                .supplementary_verifier_ids
                .push(proof.verifier_id.clone());
            record.status.updated_at = self.now_ms;

            let deep = deep_validate(&record.proofs);
            resolve_with_supplementary(&record.proofs, &proof, &deep)
        };
        self.record_event(
            NodeEventKind::SupplementaryReceived,
            &task_id,
            Some(supplementary_id.clone()),
        );

        match &resolution {
            Resolution::Majority { .. } | Resolution::Statistical { .. } => {
                let resolved_value = resolution.resolved_value().unwrap_or_default();
                let (reliable, unreliable) = match &resolution {
                    Resolution::Majority {
                        reliable,
                        unreliable,
                        ..
                    }
                    | Resolution::Statistical {
                        reliable,
                        unreliable,
                        ..
                    } => (reliable.clone(), unreliable.clone()),
                    _ => unreachable!(),
                };
                info!(
                    task = %task_id,
                    resolved_by = resolution.resolved_by(),
                    value = %resolved_value,
                    "supplementary resolution succeeded"
                );
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::Validated;
                    record.status.updated_at = self.now_ms;
                    record.status.validation_info_mut().resolved_result =
                        Some(resolution.resolved_by().to_string());
                }
                actions.push(Action::CancelTimer {
                    id: TimerId::Supplementary(task_id.clone()),
                });

                if self.is_leader {
                    self.stage_final_round(
                        &task_id,
                        &proof,
                        &supplementary_id,
                        resolution.resolved_by(),
                        resolved_value,
                        reliable,
                        unreliable,
                        actions,
                    );
                    self.emit_status(&task_id, actions);
                } else {
                    self.emit_status(&task_id, actions);
                    if let Some(pre) = self.pending_final_pre_prepare.remove(&task_id) {
                        // The leader's final-round proposal was already here.
                        self.dispatch_pre_prepare(pre, actions);
                    } else {
                        let ack = self.make_supplementary_signal(
                            "SupplementaryAck",
                            &task_id,
                            &supplementary_id,
                        );
                        actions.push(Action::Send {
                            to: self.leader_id.clone(),
                            message: ConsensusMessage::SupplementaryAck(ack),
                        });
                    }
                }
            }
            Resolution::ManualReview { reason } => {
                info!(task = %task_id, reason = %reason, "resolution needs manual review");
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::NeedsManualReview;
                    record.status.updated_at = self.now_ms;
                    record.status.validation_info_mut().resolved_result =
                        Some("manual".to_string());
                }
                actions.push(Action::CancelTimer {
                    id: TimerId::Supplementary(task_id.clone()),
                });
                self.emit_status(&task_id, actions);
            }
            Resolution::Invalid { reason } => {
                warn!(task = %task_id, reason = %reason, "resolution failed");
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::Failed;
                    record.status.updated_at = self.now_ms;
                    record.status.validation_info_mut().error_message = Some(reason.clone());
                }
                actions.push(Action::CancelTimer {
                    id: TimerId::Supplementary(task_id.clone()),
                });
                self.emit_status(&task_id, actions);
            }
        }
    }

    /// Leader side of a successful resolution: build the second-round
    /// payload, defer it until enough replicas are ready, and announce
    /// readiness.
    #[allow(clippy::too_many_arguments)]
    fn stage_final_round(
        &mut self,
        task_id: &TaskId,
        supplementary: &Arc<QosProof>,
        supplementary_id: &str,
        resolved_by: &str,
        resolved_value: String,
        reliable: Vec<veriqo_types::VerifierId>,
        unreliable: Vec<veriqo_types::VerifierId>,
        actions: &mut Vec<Action>,
    ) {
        let Some(record) = self.tasks.get(task_id) else {
            return;
        };
        let Some(first_proof) = record.proofs.first() else {
            return;
        };

        let mut payload = (**first_proof).clone();
        payload.supplementary_info = Some(SupplementaryInfo {
            supplementary_proof_id: supplementary_id.to_string(),
            supplementary_verifier_id: supplementary.verifier_id.clone(),
            resolved_by: resolved_by.to_string(),
            resolved_value,
            reliable_verifiers: reliable,
            unreliable_verifiers: unreliable,
        });
        self.pending_supplementary_consensus
            .insert(task_id.clone(), Arc::new(payload));

        let ready = self.make_supplementary_signal("SupplementaryReady", task_id, supplementary_id);
        actions.push(Action::Broadcast {
            message: ConsensusMessage::SupplementaryReady(ready),
        });
        self.supplementary_ready
            .entry(task_id.clone())
            .or_default()
            .insert(self.node_id.clone());
    }

    fn make_supplementary_signal(
        &self,
        kind: &str,
        task_id: &TaskId,
        supplementary_id: &str,
    ) -> SupplementarySignal {
        let signature = self.authenticator.sign(&supplementary_signing_bytes(
            kind,
            task_id,
            supplementary_id,
            self.now_ms,
        ));
        SupplementarySignal {
            node_id: self.node_id.clone(),
            task_id: task_id.clone(),
            supplementary_proof_id: supplementary_id.to_string(),
            timestamp: self.now_ms,
            signature,
        }
    }

    fn verify_supplementary_signal(&self, kind: &str, signal: &SupplementarySignal) -> bool {
        let signing = supplementary_signing_bytes(
            kind,
            &signal.task_id,
            &signal.supplementary_proof_id,
            signal.timestamp,
        );
        if !self
            .authenticator
            .verify(&signal.node_id, &signing, &signal.signature)
        {
            warn!(sender = %signal.node_id, "{kind} signature invalid, dropping");
            return false;
        }
        true
    }

    /// Follower reaction to the leader's readiness announcement.
    fn on_supplementary_ready(&mut self, signal: SupplementarySignal, actions: &mut Vec<Action>) {
        if !self.verify_supplementary_signal("SupplementaryReady", &signal) {
            return;
        }
        let task_id = signal.task_id.clone();
        let Some(record) = self.tasks.get(&task_id) else {
            debug!(task = %task_id, "ready signal for unknown task");
            return;
        };

        // Already past supplementary processing: acknowledge immediately.
        if matches!(
            record.status.state,
            TaskState::Validated | TaskState::Consensus | TaskState::Finalized
        ) {
            let ack = self.make_supplementary_signal(
                "SupplementaryAck",
                &task_id,
                &signal.supplementary_proof_id,
            );
            actions.push(Action::Send {
                to: signal.node_id.clone(),
                message: ConsensusMessage::SupplementaryAck(ack),
            });
            return;
        }

        let held = record
            .supplementary_proofs
            .iter()
            .any(|p| p.id.as_deref() == Some(signal.supplementary_proof_id.as_str()));
        if !held {
            // No automatic fetch; the supplementary must reach us through
            // the ingress like any other proof.
            info!(
                task = %task_id,
                supplementary = %signal.supplementary_proof_id,
                "supplementary proof required but not held"
            );
        }
    }

    /// Leader accumulation of follower acknowledgements. At the quorum
    /// threshold the deferred second round starts.
    fn on_supplementary_ack(&mut self, signal: SupplementarySignal, actions: &mut Vec<Action>) {
        if !self.is_leader {
            debug!("supplementary ack on a follower, dropping");
            return;
        }
        if !self.verify_supplementary_signal("SupplementaryAck", &signal) {
            return;
        }
        let task_id = signal.task_id.clone();
        let Some(record) = self.tasks.get(&task_id) else {
            return;
        };
        if matches!(
            record.status.state,
            TaskState::Consensus | TaskState::Finalized
        ) {
            trace!(task = %task_id, "ack after final round started, ignoring");
            return;
        }

        let ready = self.supplementary_ready.entry(task_id.clone()).or_default();
        ready.insert(signal.node_id.clone());
        ready.insert(self.node_id.clone());
        let ready_count = ready.len();
        debug!(task = %task_id, ready_count, quorum = self.engine.quorum(), "supplementary ack");

        if ready_count >= self.engine.quorum()
            && self.pending_supplementary_consensus.contains_key(&task_id)
        {
            self.start_final_consensus(task_id, actions);
        }
    }

    /// Open the second consensus round over the resolved payload. Lands the
    /// task in `Finalized` through the normal consensus-reached path.
    ///
    /// At most one slot is active per node, so a round completing its ready
    /// quorum while another task holds the window is deferred, with the
    /// staged payload and ready set left in place; the consensus-reached
    /// path retries it as soon as the window frees. Task state is only
    /// touched once the engine actually opens the slot.
    fn start_final_consensus(&mut self, task_id: TaskId, actions: &mut Vec<Action>) {
        if self.processing_consensus {
            debug!(task = %task_id, "consensus window busy, deferring final round");
            if !self.deferred_final_rounds.contains(&task_id) {
                self.deferred_final_rounds.push_back(task_id);
            }
            return;
        }

        let state = self.tasks.get(&task_id).map(|r| r.status.state);
        if state != Some(TaskState::Validated) {
            warn!(task = %task_id, ?state, "final consensus outside validated state, discarding");
            self.pending_supplementary_consensus.remove(&task_id);
            self.supplementary_ready.remove(&task_id);
            return;
        }
        let Some(payload) = self.pending_supplementary_consensus.remove(&task_id) else {
            return;
        };
        self.supplementary_ready.remove(&task_id);

        if let Some(record) = self.tasks.get_mut(&task_id) {
            record.status.state = TaskState::Consensus;
            record.status.updated_at = self.now_ms;
        }
        self.processing_consensus = true;
        self.current_consensus_task_id = Some(task_id.clone());
        self.emit_status(&task_id, actions);

        match self
            .engine
            .start_consensus(task_id.clone(), payload.clone(), ConsensusType::Normal)
        {
            Some(pre_prepare_msg) => {
                actions.push(Action::Broadcast {
                    message: pre_prepare_msg.clone(),
                });
                if let ConsensusMessage::PrePrepare(pre) = pre_prepare_msg {
                    self.dispatch_pre_prepare(pre, actions);
                }
            }
            None => {
                // The engine holds a slot the window bookkeeping did not
                // know about. Restore the staged state and retry later.
                warn!(task = %task_id, "engine not idle for final consensus, deferring");
                if let Some(record) = self.tasks.get_mut(&task_id) {
                    record.status.state = TaskState::Validated;
                    record.status.updated_at = self.now_ms;
                }
                self.pending_supplementary_consensus
                    .insert(task_id.clone(), payload);
                self.processing_consensus = false;
                self.current_consensus_task_id = None;
                self.emit_status(&task_id, actions);
                if !self.deferred_final_rounds.contains(&task_id) {
                    self.deferred_final_rounds.push_back(task_id);
                }
            }
        }
    }

    // ─── Timers ───

    /// Idempotent: no-ops unless the task is still waiting with no
    /// supplementary received.
    fn on_supplementary_timeout(&mut self, task_id: TaskId, actions: &mut Vec<Action>) {
        let Some(record) = self.tasks.get_mut(&task_id) else {
            return;
        };
        if record.status.state != TaskState::AwaitingSupplementary {
            trace!(task = %task_id, state = %record.status.state, "timeout after task moved on");
            return;
        }
        if !record.status.supplementary_verifier_ids.is_empty() {
            return;
        }
        record.status.state = TaskState::NeedsManualReview;
        record.status.updated_at = self.now_ms;
        record.status.validation_info_mut().timeout_reason =
            Some("supplementary verification timeout".to_string());
        self.record_event(NodeEventKind::SupplementaryTimeout, &task_id, None);
        self.emit_status(&task_id, actions);
    }

    fn on_gc(&mut self, actions: &mut Vec<Action>) {
        let now_ms = self.now_ms;
        let mut expired = Vec::new();
        for (task_id, record) in &mut self.tasks {
            if record.status.state == TaskState::Pending
                && now_ms.saturating_sub(record.status.updated_at) > TASK_EXPIRY_MS
            {
                record.status.state = TaskState::Expired;
                record.status.updated_at = now_ms;
                expired.push(task_id.clone());
            }
        }
        for task_id in expired {
            self.record_event(NodeEventKind::TaskExpired, &task_id, None);
            self.emit_status(&task_id, actions);
        }
        actions.push(Action::SetTimer {
            id: TimerId::Gc,
            duration: GC_INTERVAL,
        });
    }

    // ─── Helpers ───

    fn emit_status(&self, task_id: &TaskId, actions: &mut Vec<Action>) {
        if let Some(record) = self.tasks.get(task_id) {
            actions.push(Action::EmitTaskStatus {
                status: record.status.clone(),
            });
        }
    }

    fn record_event(&self, kind: NodeEventKind, task_id: &TaskId, detail: Option<String>) {
        self.events.record(NodeEvent {
            kind,
            node_id: self.node_id.clone(),
            task_id: task_id.clone(),
            timestamp: self.now_ms,
            detail,
        });
    }
}

impl StateMachine for NodeState {
    fn set_now(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        self.engine.set_now(now_ms);
    }

    fn handle(&mut self, event: Event) -> Vec<Action> {
        let mut actions = Vec::new();
        match event {
            Event::ProofReceived { proof } => self.on_proof(proof, &mut actions),
            Event::SupplementaryProofReceived { task_id, proof } => {
                self.on_supplementary_proof(task_id, proof, &mut actions)
            }
            Event::MessageReceived { message } => self.on_message(message, &mut actions),
            Event::SupplementaryTimeout { task_id } => {
                self.on_supplementary_timeout(task_id, &mut actions)
            }
            Event::GcTimer => self.on_gc(&mut actions),
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriqo_core::MemoryEventSink;
    use veriqo_pbft::PbftPhase;
    use veriqo_types::test_utils::test_proof;
    use veriqo_types::{CommitteeAuthenticator, PresenceProofVerifier};

    const NOW: u64 = 1_700_000_000_000;

    fn committee(n: usize) -> Vec<NodeId> {
        (0..n).map(|i| NodeId::from(format!("node{i}"))).collect()
    }

    fn make_node(index: usize, total: usize) -> (NodeState, Arc<MemoryEventSink>) {
        let ids = committee(total);
        let events = Arc::new(MemoryEventSink::new());
        let mut node = NodeState::new(
            ids[index].clone(),
            ids[0].clone(),
            total,
            Arc::new(CommitteeAuthenticator::derive(&ids[index], &ids)),
            Arc::new(PresenceProofVerifier),
            events.clone(),
        );
        node.set_now(NOW);
        (node, events)
    }

    fn ingest(node: &mut NodeState, proof: QosProof) -> Vec<Action> {
        node.handle(Event::ProofReceived {
            proof: Arc::new(proof),
        })
    }

    fn broadcasts(actions: &[Action]) -> Vec<&ConsensusMessage> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Broadcast { message } => Some(message),
                _ => None,
            })
            .collect()
    }

    fn find_pre_prepare(actions: &[Action]) -> Option<PrePrepare> {
        broadcasts(actions).into_iter().find_map(|m| match m {
            ConsensusMessage::PrePrepare(p) => Some(p.clone()),
            _ => None,
        })
    }

    #[test]
    fn test_proof_ingest_creates_task() {
        let (mut node, events) = make_node(1, 4);
        let actions = ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));

        let status = node.task_status(&TaskId::from("task-A")).expect("task exists");
        assert_eq!(status.state, TaskState::Validating);
        assert_eq!(status.proof_count, 1);
        assert_eq!(status.verifier_ids.len(), status.proof_count);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::EmitTaskStatus { .. })));
        assert_eq!(
            events.count(NodeEventKind::ProofReceived, &TaskId::from("task-A")),
            1
        );
    }

    #[test]
    fn test_invalid_proof_dropped_without_task() {
        let (mut node, events) = make_node(1, 4);
        // Future timestamp fails quick validation.
        let actions = ingest(&mut node, test_proof("task-A", "v1", NOW + 5000));

        assert!(node.task_status(&TaskId::from("task-A")).is_none());
        assert!(actions.is_empty());
        assert_eq!(
            events.count(NodeEventKind::ProofRejected, &TaskId::from("task-A")),
            1
        );
    }

    #[test]
    fn test_duplicate_verifier_dropped() {
        let (mut node, events) = make_node(1, 4);
        ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));
        ingest(&mut node, test_proof("task-A", "v1", NOW - 500));

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.proof_count, 1);
        assert_eq!(status.verifier_ids.len(), 1);
        assert_eq!(
            events.count(NodeEventKind::DuplicateProof, &TaskId::from("task-A")),
            1
        );
    }

    #[test]
    fn test_leader_opens_consensus_after_two_proofs() {
        let (mut node, _) = make_node(0, 4);
        let first = ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));
        assert!(find_pre_prepare(&first).is_none());

        let second = ingest(&mut node, test_proof("task-A", "v2", NOW - 900));
        let pre = find_pre_prepare(&second).expect("leader should propose");
        assert_eq!(pre.consensus_type, ConsensusType::Normal);
        assert_eq!(pre.sequence_number, 1);

        // The leader's own prepare is broadcast alongside.
        assert!(broadcasts(&second)
            .iter()
            .any(|m| matches!(m, ConsensusMessage::Prepare(_))));

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::Consensus);
        assert!(node.processing_consensus());
        assert_eq!(node.engine().phase(), PbftPhase::PrePrepared);
    }

    #[test]
    fn test_conflicting_proofs_open_conflict_consensus() {
        let (mut node, _) = make_node(0, 4);
        ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));
        let mut conflicting = test_proof("task-A", "v2", NOW - 900);
        conflicting.media_specs.codec = "H.265".to_string();
        let actions = ingest(&mut node, conflicting);

        let pre = find_pre_prepare(&actions).expect("leader should propose");
        assert_eq!(pre.consensus_type, ConsensusType::Conflict);

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        let validation = status.validation_info.as_ref().expect("validation info");
        assert_eq!(validation.conflict_type, Some(veriqo_types::ConflictType::Structural));
        assert!(validation.conflict_details.is_some());
    }

    // A two-node committee has a quorum threshold of one, so the leader's
    // own votes complete each phase and whole rounds run solo. That makes
    // the full pipeline testable without wiring peers together.
    #[test]
    fn test_solo_leader_round_finalizes() {
        let (mut node, events) = make_node(0, 2);
        ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));
        ingest(&mut node, test_proof("task-A", "v2", NOW - 900));

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::Finalized);
        let result = status.result.as_ref().expect("result stamped");
        assert_eq!(result.consensus_timestamp, NOW);
        assert!(node.engine().is_completed(1));
        assert!(!node.processing_consensus());
        assert_eq!(
            events.count(NodeEventKind::ConsensusReachNormal, &TaskId::from("task-A")),
            1
        );
    }

    fn run_conflict_to_awaiting(node: &mut NodeState) -> Vec<Action> {
        ingest(node, test_proof("task-A", "v1", NOW - 1000));
        let mut conflicting = test_proof("task-A", "v2", NOW - 900);
        conflicting.media_specs.codec = "H.265".to_string();
        ingest(node, conflicting)
    }

    #[test]
    fn test_conflict_round_lands_awaiting_supplementary() {
        let (mut node, events) = make_node(0, 2);
        let actions = run_conflict_to_awaiting(&mut node);

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::AwaitingSupplementary);
        let validation = status.validation_info.as_ref().unwrap();
        assert!(validation.supplementary_requested);
        assert_eq!(validation.supplementary_request_time, Some(NOW));
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::SetTimer {
                id: TimerId::Supplementary(_),
                ..
            }
        )));
        assert_eq!(
            events.count(NodeEventKind::ConsensusReachConflict, &TaskId::from("task-A")),
            1
        );
    }

    #[test]
    fn test_supplementary_majority_resolution_then_finalize() {
        let (mut node, _) = make_node(0, 2);
        run_conflict_to_awaiting(&mut node);

        // Supplementary agrees with v1's codec.
        let supplementary = test_proof("task-A", "v3", NOW - 800);
        let actions = node.handle(Event::SupplementaryProofReceived {
            task_id: TaskId::from("task-A"),
            proof: Arc::new(supplementary),
        });

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::Validated);
        assert_eq!(
            status.validation_info.as_ref().unwrap().resolved_result.as_deref(),
            Some("majority")
        );
        let ready = broadcasts(&actions)
            .into_iter()
            .find_map(|m| match m {
                ConsensusMessage::SupplementaryReady(s) => Some(s.clone()),
                _ => None,
            })
            .expect("leader announces readiness");

        // node1 acknowledges; the ready quorum (1) triggers the final round.
        let ids = committee(2);
        let follower_auth = CommitteeAuthenticator::derive(&ids[1], &ids);
        let signature = follower_auth.sign(&supplementary_signing_bytes(
            "SupplementaryAck",
            &TaskId::from("task-A"),
            &ready.supplementary_proof_id,
            NOW,
        ));
        let actions = node.handle(Event::MessageReceived {
            message: ConsensusMessage::SupplementaryAck(SupplementarySignal {
                node_id: ids[1].clone(),
                task_id: TaskId::from("task-A"),
                supplementary_proof_id: ready.supplementary_proof_id.clone(),
                timestamp: NOW,
                signature,
            }),
        });

        // Second round carries the resolution summary and finalizes solo.
        let final_pre = find_pre_prepare(&actions).expect("final round proposal");
        assert_eq!(final_pre.consensus_type, ConsensusType::Normal);
        let info = final_pre
            .data
            .supplementary_info
            .as_ref()
            .expect("payload carries supplementary info");
        assert_eq!(info.resolved_by, "majority");
        assert_eq!(info.resolved_value, "H.264");

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::Finalized);
        assert!(node.engine().is_completed(2));
    }

    #[test]
    fn test_supplementary_three_way_split_needs_manual_review() {
        let (mut node, _) = make_node(0, 2);
        run_conflict_to_awaiting(&mut node);

        let mut supplementary = test_proof("task-A", "v3", NOW - 800);
        supplementary.media_specs.codec = "VP9".to_string();
        node.handle(Event::SupplementaryProofReceived {
            task_id: TaskId::from("task-A"),
            proof: Arc::new(supplementary),
        });

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::NeedsManualReview);
        assert_eq!(
            status.validation_info.as_ref().unwrap().resolved_result.as_deref(),
            Some("manual")
        );
    }

    #[test]
    fn test_invalid_supplementary_fails_task() {
        let (mut node, _) = make_node(0, 2);
        run_conflict_to_awaiting(&mut node);

        let mut supplementary = test_proof("task-A", "v3", NOW - 800);
        supplementary.video_quality_data.gop_scores.clear();
        node.handle(Event::SupplementaryProofReceived {
            task_id: TaskId::from("task-A"),
            proof: Arc::new(supplementary),
        });

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::Failed);
        assert!(status
            .validation_info
            .as_ref()
            .unwrap()
            .error_message
            .as_deref()
            .unwrap()
            .contains("supplementary proof invalid"));
    }

    #[test]
    fn test_supplementary_timeout_goes_to_manual_review() {
        let (mut node, events) = make_node(0, 2);
        run_conflict_to_awaiting(&mut node);

        node.set_now(NOW + SUPPLEMENTARY_TIMEOUT.as_millis() as u64);
        node.handle(Event::SupplementaryTimeout {
            task_id: TaskId::from("task-A"),
        });

        let status = node.task_status(&TaskId::from("task-A")).unwrap();
        assert_eq!(status.state, TaskState::NeedsManualReview);
        assert!(status
            .validation_info
            .as_ref()
            .unwrap()
            .timeout_reason
            .as_deref()
            .unwrap()
            .contains("timeout"));
        assert_eq!(
            events.count(NodeEventKind::SupplementaryTimeout, &TaskId::from("task-A")),
            1
        );
    }

    #[test]
    fn test_supplementary_timeout_is_idempotent_after_resolution() {
        let (mut node, _) = make_node(0, 2);
        run_conflict_to_awaiting(&mut node);
        node.handle(Event::SupplementaryProofReceived {
            task_id: TaskId::from("task-A"),
            proof: Arc::new(test_proof("task-A", "v3", NOW - 800)),
        });
        let before = node.task_status(&TaskId::from("task-A")).unwrap().state;

        node.handle(Event::SupplementaryTimeout {
            task_id: TaskId::from("task-A"),
        });
        assert_eq!(node.task_status(&TaskId::from("task-A")).unwrap().state, before);
    }

    #[test]
    fn test_follower_buffers_pre_prepare_until_enough_proofs() {
        let (mut leader, _) = make_node(0, 4);
        let (mut follower, _) = make_node(1, 4);

        ingest(&mut leader, test_proof("task-A", "v1", NOW - 1000));
        let actions = ingest(&mut leader, test_proof("task-A", "v2", NOW - 900));
        let pre = find_pre_prepare(&actions).unwrap();

        // Proposal arrives before the follower holds any proofs: buffered.
        let actions = follower.handle(Event::MessageReceived {
            message: ConsensusMessage::PrePrepare(pre),
        });
        assert!(broadcasts(&actions).is_empty());
        assert_eq!(follower.engine().phase(), PbftPhase::Idle);

        // Local proofs arrive; the second one unblocks the buffered
        // proposal and the follower votes.
        ingest(&mut follower, test_proof("task-A", "v1", NOW - 1000));
        let actions = ingest(&mut follower, test_proof("task-A", "v2", NOW - 900));
        assert!(broadcasts(&actions)
            .iter()
            .any(|m| matches!(m, ConsensusMessage::Prepare(_))));
        assert_eq!(follower.engine().phase(), PbftPhase::PrePrepared);
        assert_eq!(
            follower.task_status(&TaskId::from("task-A")).unwrap().state,
            TaskState::Consensus
        );
    }

    #[test]
    fn test_phase_messages_for_other_tasks_are_filtered() {
        let (mut leader, _) = make_node(0, 4);
        ingest(&mut leader, test_proof("task-A", "v1", NOW - 1000));
        let actions = ingest(&mut leader, test_proof("task-A", "v2", NOW - 900));
        let pre = find_pre_prepare(&actions).unwrap();

        // A prepare for an unrelated task while task-A is active.
        let ids = committee(4);
        let auth = CommitteeAuthenticator::derive(&ids[1], &ids);
        let digest = "0".repeat(64);
        let signature = auth.sign(&veriqo_core::phase_signing_bytes(
            "Prepare",
            ConsensusType::Normal,
            0,
            pre.sequence_number,
            &digest,
        ));
        let foreign = veriqo_core::PhaseVote {
            consensus_type: ConsensusType::Normal,
            view_number: 0,
            sequence_number: pre.sequence_number,
            node_id: ids[1].clone(),
            task_id: TaskId::from("task-B"),
            digest,
            signature,
        };
        let actions = leader.handle(Event::MessageReceived {
            message: ConsensusMessage::Prepare(foreign),
        });
        assert!(actions.is_empty());
        assert_eq!(leader.engine().phase(), PbftPhase::PrePrepared);
    }

    #[test]
    fn test_status_update_is_a_noop() {
        let (mut node, _) = make_node(1, 4);
        let ids = committee(4);
        let actions = node.handle(Event::MessageReceived {
            message: ConsensusMessage::StatusUpdate(veriqo_core::StatusUpdate {
                consensus_type: ConsensusType::Normal,
                view_number: 0,
                sequence_number: 9,
                node_id: ids[0].clone(),
                task_id: TaskId::from("task-A"),
                digest: String::new(),
                signature: String::new(),
                state: TaskState::Rejected,
            }),
        });
        assert!(actions.is_empty());
        assert_eq!(node.task_count(), 0);
    }

    #[test]
    fn test_gc_expires_stale_pending_tasks() {
        let (mut node, events) = make_node(1, 4);
        node.seed_pending_task(TaskId::from("task-old"), NOW);
        node.seed_pending_task(TaskId::from("task-new"), NOW + TASK_EXPIRY_MS);

        node.set_now(NOW + TASK_EXPIRY_MS + 1);
        let actions = node.handle(Event::GcTimer);

        assert_eq!(
            node.task_status(&TaskId::from("task-old")).unwrap().state,
            TaskState::Expired
        );
        assert_eq!(
            node.task_status(&TaskId::from("task-new")).unwrap().state,
            TaskState::Pending
        );
        assert_eq!(
            events.count(NodeEventKind::TaskExpired, &TaskId::from("task-old")),
            1
        );
        // The sweep re-arms itself.
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { id: TimerId::Gc, .. })));
    }

    #[test]
    fn test_queue_serializes_multiple_tasks() {
        let (mut node, _) = make_node(0, 4);
        ingest(&mut node, test_proof("task-A", "v1", NOW - 1000));
        ingest(&mut node, test_proof("task-A", "v2", NOW - 900));
        assert!(node.processing_consensus());

        // A second task becomes ready while task-A's round is in flight; it
        // queues instead of opening a slot.
        ingest(&mut node, test_proof("task-B", "v1", NOW - 800));
        let actions = ingest(&mut node, test_proof("task-B", "v2", NOW - 700));
        assert!(find_pre_prepare(&actions).is_none());
        assert_eq!(node.queue_len(), 1);
        assert_eq!(
            node.task_status(&TaskId::from("task-B")).unwrap().state,
            TaskState::Consensus
        );
    }
}
