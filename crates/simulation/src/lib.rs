//! Deterministic simulation runner.
//!
//! This crate drives the coordinator state machine with simulated
//! federates over a simulated network. Given the same seed, it produces
//! identical results every run. Every emitted grant and stop decision is
//! checked against the coordinator's safety properties as it happens.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  SimulationRunner                       │
//! │                                                         │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │     Event Queue (BTreeMap<EventKey, SimEvent>)     │ │
//! │  │     Ordered by: time, sequence                     │ │
//! │  └────────────────────────┬───────────────────────────┘ │
//! │                           │                             │
//! │              ┌────────────┴─────────────┐               │
//! │              ▼                          ▼               │
//! │  ┌──────────────────────┐   ┌───────────────────────┐   │
//! │  │  CoordinatorState    │   │  SimulatedFederate × N│   │
//! │  └──────────┬───────────┘   └──────────┬────────────┘   │
//! │             │                          │                │
//! │             ▼                          ▼                │
//! │  ┌────────────────────────────────────────────────────┐ │
//! │  │  Actions / outputs → SimulatedNetwork → new events │ │
//! │  └────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────┘
//! ```

mod error;
mod event_queue;
mod federate;
mod network;
mod runner;

pub use error::SimulationError;
pub use event_queue::{EventKey, EventQueue, SimEvent};
pub use federate::{Ending, FederateOutput, FederateScript, SimulatedFederate};
pub use network::{Link, NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationConfig, SimulationRunner, SimulationStats};
