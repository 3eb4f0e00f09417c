//! State machine trait.

use crate::{Action, Event};

/// A synchronous, deterministic state machine.
///
/// Runners call [`StateMachine::set_now`] before each [`StateMachine::handle`]
/// so the machine reads time without performing I/O. Handlers never block and
/// never panic on malformed input; rejects are silent drops with a log line.
pub trait StateMachine {
    /// Inject the current wall-clock time, milliseconds since epoch.
    fn set_now(&mut self, now_ms: u64);

    /// Process one event and return the actions to perform.
    fn handle(&mut self, event: Event) -> Vec<Action>;
}
