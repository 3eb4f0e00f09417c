//! The production event loop.

use crate::metrics::metrics;
use crate::network::TransportAdapter;
use crate::timers::TimerManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, trace};
use veriqo_core::{Action, Event, StateMachine};
use veriqo_node::NodeState;
use veriqo_types::{TaskId, TaskStatus};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Owns the node state machine and executes its actions.
///
/// A single task receives all events (ingress, transport, timers) from one
/// mpsc channel, so the state machine needs no locking. Action side effects
/// go back out through the transport adapter, the timer manager and the
/// shared status caches read by the HTTP layer.
pub struct ProductionRunner {
    node: NodeState,
    event_rx: mpsc::Receiver<Event>,
    transport: Arc<TransportAdapter>,
    timers: TimerManager,
    task_statuses: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
    pbft_state: Arc<RwLock<String>>,
}

impl ProductionRunner {
    pub fn new(
        node: NodeState,
        event_rx: mpsc::Receiver<Event>,
        transport: Arc<TransportAdapter>,
        timers: TimerManager,
        task_statuses: Arc<RwLock<HashMap<TaskId, TaskStatus>>>,
        pbft_state: Arc<RwLock<String>>,
    ) -> Self {
        Self {
            node,
            event_rx,
            transport,
            timers,
            task_statuses,
            pbft_state,
        }
    }

    /// Run until the event channel closes.
    pub async fn run(mut self) {
        info!(node = %self.node.node_id(), is_leader = self.node.is_leader(), "runner started");

        let initial = self.node.start();
        self.execute_actions(initial).await;

        while let Some(event) = self.event_rx.recv().await {
            metrics()
                .event_channel_depth
                .set(self.event_rx.len() as f64);
            trace!(event = event.type_name(), "dispatch");

            self.node.set_now(now_ms());
            let actions = self.node.handle(event);
            self.execute_actions(actions).await;

            let phase = self.node.engine().phase().as_str().to_string();
            *self.pbft_state.write().await = phase;
        }
        info!("event channel closed, runner stopping");
    }

    async fn execute_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast { message } => {
                    self.transport.broadcast(message).await;
                }
                Action::Send { to, message } => {
                    self.transport.send(&to, message).await;
                }
                Action::SetTimer { id, duration } => {
                    self.timers.set_timer(id, duration);
                }
                Action::CancelTimer { id } => {
                    self.timers.cancel_timer(&id);
                }
                Action::EmitTaskStatus { status } => {
                    self.update_status_cache(status).await;
                }
            }
        }
    }

    /// Refresh the HTTP-visible status cache, counting terminal
    /// transitions along the way.
    async fn update_status_cache(&self, status: TaskStatus) {
        let mut cache = self.task_statuses.write().await;
        let previous_state = cache.get(&status.task_id).map(|s| s.state);
        if previous_state != Some(status.state) {
            use veriqo_types::TaskState;
            match status.state {
                TaskState::Finalized => metrics().tasks_finalized.inc(),
                TaskState::NeedsManualReview => metrics().tasks_manual_review.inc(),
                TaskState::Consensus => metrics().consensus_rounds_started.inc(),
                _ => {}
            }
        }
        cache.insert(status.task_id.clone(), status);
    }
}
