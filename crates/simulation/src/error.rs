//! Safety violations detected while simulating.

use rti_types::{FederateId, Tag, TopologyError};
use std::time::Duration;
use thiserror::Error;

/// Why a simulation run failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("Invalid topology: {0}")]
    Topology(#[from] TopologyError),

    #[error("Grant to {federate} went backwards: {previous} -> {granted}")]
    GrantRegressed {
        federate: FederateId,
        previous: Tag,
        granted: Tag,
    },

    #[error("Grant {granted} to {federate} exceeds admissible bound {bound:?}")]
    GrantExceedsBound {
        federate: FederateId,
        granted: Tag,
        bound: Option<Tag>,
    },

    #[error("Grant {granted} to {federate} is past the stop tag {stop}")]
    GrantPastStop {
        federate: FederateId,
        granted: Tag,
        stop: Tag,
    },

    #[error("Federate {federate} completed {completed} past its next event {next_event}")]
    CompletedPastNextEvent {
        federate: FederateId,
        completed: Tag,
        next_event: Tag,
    },

    #[error("Stop tag {stop} is below {proposal} proposed by {federate}")]
    StopBelowProposal {
        federate: FederateId,
        proposal: Tag,
        stop: Tag,
    },

    #[error("Federates were told different start times: {first} and {second}")]
    StartTimeMismatch { first: i64, second: i64 },

    #[error("Federation stalled at {at:?} with {stalled:?} still waiting")]
    Stalled {
        at: Duration,
        stalled: Vec<FederateId>,
    },
}
