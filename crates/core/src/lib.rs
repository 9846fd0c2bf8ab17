//! Core types for the federation RTI.
//!
//! The coordinator is written as a synchronous state machine: the runner
//! feeds it [`Event`]s and performs the [`Action`]s it returns. All socket
//! and timer I/O lives in the runner.

mod action;
mod connection;
mod event;
mod traits;

pub use action::{Action, ClockSyncKind};
pub use connection::ConnectionId;
pub use event::Event;
pub use traits::StateMachine;
