//! Core traits for state machines.

use crate::{Action, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// The coordinator is implemented as a state machine that is:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self, but performs no I/O
///
/// The same implementation is driven by the tokio runner in production and
/// by the seeded event queue in simulation.
///
/// # Example
///
/// ```ignore
/// impl StateMachine for CoordinatorState {
///     fn handle(&mut self, event: Event) -> Vec<Action> {
///         match event {
///             Event::MessageReceived { connection, message } => {
///                 self.on_message(connection, message)
///             }
///             Event::ClockSyncTimer => self.on_clock_sync_timer(),
///             // ... etc
///         }
///     }
///
///     fn set_time(&mut self, now: Duration) {
///         self.now = now;
///     }
/// }
/// ```
pub trait StateMachine {
    /// Process one event and return what the runner must do.
    ///
    /// Actions for the same connection must be performed in order; sends
    /// before a close are flushed before the socket goes away.
    fn handle(&mut self, event: Event) -> Vec<Action>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call with the time since
    /// the runner started. Only used for timeouts, never for tags.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    ///
    /// Returns the time that was last set via `set_time()`.
    fn now(&self) -> Duration;
}
