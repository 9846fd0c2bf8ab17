//! Production runner for the federation RTI.
//!
//! Wraps [`rti_coordinator::CoordinatorState`] with real sockets:
//!
//! ```text
//!  accept loop ──▶ per-connection reader ──┐
//!  UDP receiver ───────────────────────────┼──▶ event channel ──▶ coordinator task
//!  clock-sync timer ───────────────────────┘                          │
//!                                                                     ▼
//!                          per-connection writer ◀── actions ── UDP sender
//! ```
//!
//! The coordinator task is the only owner of federate state. Writers own
//! their socket halves, so a slow federate never stalls recomputation.

pub mod config;
mod error;
pub mod network;
mod runner;
pub mod telemetry;

pub use config::RtiConfig;
pub use error::NetworkError;
pub use runner::{start, RunningRti, ServerConfig};
