//! Core types for the federation RTI.
//!
//! This crate holds the vocabulary shared by every other crate in the
//! workspace:
//!
//! - [`Tag`] and [`Interval`]: logical time
//! - [`FederateId`] and [`PortId`]: identifiers carried on the wire
//! - [`FederationTopology`]: the static dependency graph between federates
//! - [`constants`]: protocol defaults (ports, timeouts, retry intervals)

pub mod constants;
mod identifiers;
mod tag;
mod topology;

pub use identifiers::{ExecutionMode, FederateId, FederateState, PortId};
pub use tag::{physical_time_ns, Interval, Tag};
pub use topology::{FederationTopology, TopologyBuilder, TopologyError};
