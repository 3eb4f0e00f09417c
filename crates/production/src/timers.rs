//! Timer management for the production runner.
//!
//! Timers are spawned as tokio tasks that sleep and then push the matching
//! event into the node's channel. Setting a timer with an id that is
//! already armed replaces it.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use veriqo_core::{Event, TimerId};

/// Convert a TimerId to the event it fires.
fn timer_event(id: TimerId) -> Event {
    match id {
        TimerId::Supplementary(task_id) => Event::SupplementaryTimeout { task_id },
        TimerId::Gc => Event::GcTimer,
    }
}

/// Manages timers for the production runner.
pub struct TimerManager {
    /// Active timers (id -> task handle).
    timers: HashMap<TimerId, JoinHandle<()>>,
    /// Event sender for timer fires.
    event_tx: mpsc::Sender<Event>,
}

impl TimerManager {
    pub fn new(event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            timers: HashMap::new(),
            event_tx,
        }
    }

    /// Set a timer that fires after `duration`. An existing timer with the
    /// same id is cancelled first.
    pub fn set_timer(&mut self, id: TimerId, duration: Duration) {
        self.cancel_timer(&id);

        let event_tx = self.event_tx.clone();
        let fire_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(id = ?fire_id, "timer fired");
            let _ = event_tx.send(timer_event(fire_id)).await;
        });

        debug!(?id, ?duration, "timer set");
        self.timers.insert(id, handle);
    }

    /// Cancel a timer. No-op if it does not exist or already fired.
    pub fn cancel_timer(&mut self, id: &TimerId) {
        if let Some(handle) = self.timers.remove(id) {
            handle.abort();
            debug!(?id, "timer cancelled");
        }
    }

    /// Cancel all timers. Called during shutdown.
    pub fn cancel_all(&mut self) {
        for (id, handle) in self.timers.drain() {
            handle.abort();
            trace!(?id, "timer cancelled (shutdown)");
        }
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TimerManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veriqo_types::TaskId;

    #[tokio::test]
    async fn test_timer_fires() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(
            TimerId::Supplementary(TaskId::from("task-A")),
            Duration::from_millis(10),
        );

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        match event {
            Event::SupplementaryTimeout { task_id } => {
                assert_eq!(task_id, TaskId::from("task-A"));
            }
            other => panic!("unexpected event {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_timer_cancel() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::Gc, Duration::from_millis(50));
        manager.cancel_timer(&TimerId::Gc);

        let result = tokio::time::timeout(Duration::from_millis(150), event_rx.recv()).await;
        assert!(result.is_err(), "cancelled timer must not fire");
    }

    #[tokio::test]
    async fn test_timer_replace() {
        let (event_tx, mut event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(TimerId::Gc, Duration::from_secs(60));
        manager.set_timer(TimerId::Gc, Duration::from_millis(10));
        assert_eq!(manager.active_count(), 1);

        let event = tokio::time::timeout(Duration::from_millis(200), event_rx.recv())
            .await
            .expect("replacement timer should fire quickly")
            .expect("channel closed");
        assert!(matches!(event, Event::GcTimer));
    }

    #[tokio::test]
    async fn test_per_task_timers_are_independent() {
        let (event_tx, _event_rx) = mpsc::channel(10);
        let mut manager = TimerManager::new(event_tx);

        manager.set_timer(
            TimerId::Supplementary(TaskId::from("task-A")),
            Duration::from_secs(60),
        );
        manager.set_timer(
            TimerId::Supplementary(TaskId::from("task-B")),
            Duration::from_secs(60),
        );
        assert_eq!(manager.active_count(), 2);

        manager.cancel_timer(&TimerId::Supplementary(TaskId::from("task-A")));
        assert_eq!(manager.active_count(), 1);
    }
}
