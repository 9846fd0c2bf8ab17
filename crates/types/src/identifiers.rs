//! Domain-specific identifier types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Federate identifier, unique within a federation and in `[0, N)`.
///
/// Carried as a 2-byte field on the wire.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct FederateId(pub u16);

impl FederateId {
    /// Index into per-federate arenas.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for FederateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Federate({})", self.0)
    }
}

/// Destination port identifier inside a federate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortId(pub u16);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Port({})", self.0)
    }
}

/// Coordination state of a federate as seen by the RTI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FederateState {
    /// Configured but no live connection.
    #[default]
    NotConnected,
    /// Most recent next-event tag has been granted.
    Granted,
    /// Waiting for upstream federates.
    Pending,
    /// Left the federation; never blocks anyone again.
    Resigned,
}

impl FederateState {
    /// Whether the federate currently holds a live, joined connection.
    pub fn is_connected(self) -> bool {
        matches!(self, FederateState::Granted | FederateState::Pending)
    }
}

impl fmt::Display for FederateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FederateState::NotConnected => "NOT_CONNECTED",
            FederateState::Granted => "GRANTED",
            FederateState::Pending => "PENDING",
            FederateState::Resigned => "RESIGNED",
        };
        f.write_str(name)
    }
}

/// How a federate paces its execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// As fast as possible, no physical-time pacing.
    #[default]
    Fast,
    /// Paced by physical time; needs clock-sync corrections.
    Realtime,
}
