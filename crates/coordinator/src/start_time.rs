//! Start time negotiation.
//!
//! Each federate proposes a physical start time after joining. Once every
//! configured federate has proposed (or left), the start time is the largest
//! proposal plus a fixed delay, and it is sent to everyone connected.

use crate::FederateRegistry;
use rti_types::constants::DELAY_START;
use rti_types::{FederateId, FederateState};
use tracing::{debug, info};

/// What to do after a proposal or departure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Still waiting on other federates.
    Waiting,
    /// The start time was just fixed; send it to every connected federate.
    Fixed(i64),
    /// The start time was already fixed; send it to the proposer only.
    Late(i64),
}

#[derive(Debug, Clone)]
pub struct StartTimeNegotiation {
    proposed: Vec<bool>,
    max_proposal: Option<i64>,
    start_time: Option<i64>,
}

impl StartTimeNegotiation {
    pub fn new(num_federates: usize) -> Self {
        Self {
            proposed: vec![false; num_federates],
            max_proposal: None,
            start_time: None,
        }
    }

    /// The agreed physical start time, once fixed.
    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn on_proposal(
        &mut self,
        from: FederateId,
        proposal: i64,
        registry: &FederateRegistry,
    ) -> StartOutcome {
        if let Some(start) = self.start_time {
            debug!(federate = %from, start_time = start, "Late start time proposal");
            return StartOutcome::Late(start);
        }
        if let Some(slot) = self.proposed.get_mut(from.index()) {
            *slot = true;
        }
        self.max_proposal = Some(self.max_proposal.map_or(proposal, |m| m.max(proposal)));
        debug!(federate = %from, proposal, "Start time proposed");
        self.try_fix(registry)
    }

    /// Re-check after a federate left without proposing.
    pub fn on_departure(&mut self, registry: &FederateRegistry) -> StartOutcome {
        if self.start_time.is_some() {
            return StartOutcome::Waiting;
        }
        self.try_fix(registry)
    }

    fn try_fix(&mut self, registry: &FederateRegistry) -> StartOutcome {
        let all_in = registry.records().all(|record| {
            self.proposed
                .get(record.id().index())
                .copied()
                .unwrap_or(false)
                || record.state() == FederateState::Resigned
        });
        match (all_in, self.max_proposal) {
            (true, Some(max)) => {
                let start = max.saturating_add(DELAY_START.as_nanos());
                info!(start_time = start, "Start time fixed");
                self.start_time = Some(start);
                StartOutcome::Fixed(start)
            }
            _ => StartOutcome::Waiting,
        }
    }
}
