//! Coordinator state machine for the federation RTI.
//!
//! This crate provides a synchronous implementation of the RTI that is
//! driven by the production runner and by the simulation alike.
//!
//! # Architecture
//!
//! [`CoordinatorState`] processes events one at a time:
//!
//! - `Event::ConnectionOpened` → Track the connection until it joins
//! - `Event::MessageReceived` → Join handshake, then time advance, stop
//!   negotiation, start time, address directory and message forwarding
//! - `Event::MalformedMessage` → Reject, then close
//! - `Event::ConnectionLost` → Treat the federate as resigned
//! - `Event::ClockSyncProbe` / `Event::ClockSyncTimer` → Clock sync cycles
//!
//! All I/O is performed by the runner via returned `Action`s.

mod address;
mod clock_sync;
mod config;
mod record;
mod registry;
mod start_time;
mod state;
mod stop;
mod time_advance;

pub use address::{AddressDirectory, PeerAddress};
pub use clock_sync::ClockSyncScheduler;
pub use config::{ClockSyncConfig, CoordinatorConfig};
pub use record::FederateRecord;
pub use registry::FederateRegistry;
pub use start_time::{StartOutcome, StartTimeNegotiation};
pub use state::CoordinatorState;
pub use stop::{StopNegotiation, StopOutcome};
pub use time_advance::{admissible_bound, propagate, Grant};
