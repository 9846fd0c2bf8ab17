//! Federate-side client for the federation RTI.
//!
//! - [`RtiClient`]: find the RTI, join, and exchange coordination messages
//! - [`ClockSyncEstimator`]: turn clock-sync exchanges into a clock offset
//! - [`p2p`]: the handshake on direct federate-to-federate sockets

mod client;
mod clock_sync;
mod config;
mod error;
pub mod p2p;

pub use client::RtiClient;
pub use clock_sync::{run_udp_clock_sync, ClockSyncEstimator, SampleOutcome};
pub use config::FederateConfig;
pub use error::{FederateError, Result};
