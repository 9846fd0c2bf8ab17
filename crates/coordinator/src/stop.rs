//! Stop negotiation.
//!
//! The first stop request opens a round: the request is forwarded to every
//! other connected federate, and each answer raises the candidate stop tag
//! to the max seen. The round closes once nobody is left to answer.
//!
//! Concurrent requests from different federates each carry their own
//! proposal, so the agreed tag depends on message ordering. That is known
//! behavior and is not resolved here.

use rti_types::{FederateId, Tag};
use std::collections::BTreeSet;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
enum StopPhase {
    Idle,
    Negotiating {
        candidate: Tag,
        pending: BTreeSet<FederateId>,
    },
    Granted(Tag),
}

/// Result of feeding a stop message (or a departure) into the negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Not counted: stale, duplicate, or after agreement.
    Ignored,
    /// A round started; forward the proposal to these federates.
    Forward { to: Vec<FederateId>, proposal: Tag },
    /// Counted; still waiting for other replies.
    Waiting,
    /// Everyone has answered; broadcast this tag.
    Agreed(Tag),
}

/// Global stop negotiation state.
#[derive(Debug, Clone)]
pub struct StopNegotiation {
    phase: StopPhase,
}

impl Default for StopNegotiation {
    fn default() -> Self {
        Self::new()
    }
}

impl StopNegotiation {
    pub fn new() -> Self {
        Self {
            phase: StopPhase::Idle,
        }
    }

    /// The agreed stop tag, once the round has closed.
    pub fn stop_tag(&self) -> Option<Tag> {
        match self.phase {
            StopPhase::Granted(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_negotiating(&self) -> bool {
        matches!(self.phase, StopPhase::Negotiating { .. })
    }

    /// Federates whose answer is still awaited.
    pub fn pending(&self) -> Vec<FederateId> {
        match &self.phase {
            StopPhase::Negotiating { pending, .. } => pending.iter().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// A stop request from `from`.
    ///
    /// `connected` is every federate with a live session. During an open
    /// round the request is folded in like a reply.
    pub fn on_request(
        &mut self,
        from: FederateId,
        proposal: Tag,
        connected: impl IntoIterator<Item = FederateId>,
    ) -> StopOutcome {
        match self.phase {
            StopPhase::Idle => {
                let pending: BTreeSet<FederateId> =
                    connected.into_iter().filter(|id| *id != from).collect();
                info!(
                    federate = %from,
                    proposal = %proposal,
                    awaiting = pending.len(),
                    "Stop requested"
                );
                if pending.is_empty() {
                    return self.close(proposal);
                }
                let to = pending.iter().copied().collect();
                self.phase = StopPhase::Negotiating {
                    candidate: proposal,
                    pending,
                };
                StopOutcome::Forward { to, proposal }
            }
            StopPhase::Negotiating { .. } => self.fold(from, proposal),
            StopPhase::Granted(_) => {
                debug!(federate = %from, "Stop request after agreement ignored");
                StopOutcome::Ignored
            }
        }
    }

    /// A reply from `from` carrying its current tag.
    pub fn on_reply(&mut self, from: FederateId, tag: Tag) -> StopOutcome {
        match self.phase {
            StopPhase::Negotiating { .. } => self.fold(from, tag),
            _ => {
                debug!(federate = %from, "Stop reply outside negotiation ignored");
                StopOutcome::Ignored
            }
        }
    }

    /// `from` resigned or lost its connection.
    ///
    /// Counts as an implicit reply with its last completed tag.
    pub fn on_departure(&mut self, from: FederateId, completed: Tag) -> StopOutcome {
        let awaited = match &self.phase {
            StopPhase::Negotiating { pending, .. } => pending.contains(&from),
            _ => false,
        };
        if awaited {
            self.fold(from, completed)
        } else {
            StopOutcome::Ignored
        }
    }

    fn fold(&mut self, from: FederateId, tag: Tag) -> StopOutcome {
        let StopPhase::Negotiating { candidate, pending } = &mut self.phase else {
            return StopOutcome::Ignored;
        };
        if !pending.remove(&from) {
            debug!(federate = %from, "Stale or duplicate stop answer ignored");
            return StopOutcome::Ignored;
        }
        *candidate = (*candidate).max(tag);
        debug!(
            federate = %from,
            tag = %tag,
            candidate = %candidate,
            remaining = pending.len(),
            "Stop answer counted"
        );
        if pending.is_empty() {
            let agreed = *candidate;
            self.close(agreed)
        } else {
            StopOutcome::Waiting
        }
    }

    fn close(&mut self, tag: Tag) -> StopOutcome {
        info!(stop_tag = %tag, "Stop tag agreed");
        self.phase = StopPhase::Granted(tag);
        StopOutcome::Agreed(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn fed(id: u16) -> FederateId {
        FederateId(id)
    }

    #[traced_test]
    #[test]
    fn test_max_of_replies_is_agreed() {
        let mut stop = StopNegotiation::new();
        let outcome = stop.on_request(fed(0), Tag::new(500, 0), [fed(0), fed(1)]);
        assert_eq!(
            outcome,
            StopOutcome::Forward {
                to: vec![fed(1)],
                proposal: Tag::new(500, 0)
            }
        );

        let outcome = stop.on_reply(fed(1), Tag::new(480, 2));
        assert_eq!(outcome, StopOutcome::Agreed(Tag::new(500, 0)));
        assert_eq!(stop.stop_tag(), Some(Tag::new(500, 0)));
    }

    #[traced_test]
    #[test]
    fn test_later_reply_raises_candidate() {
        let mut stop = StopNegotiation::new();
        stop.on_request(fed(0), Tag::new(500, 0), [fed(0), fed(1), fed(2)]);
        assert_eq!(stop.on_reply(fed(1), Tag::new(700, 0)), StopOutcome::Waiting);
        assert_eq!(
            stop.on_reply(fed(2), Tag::new(600, 0)),
            StopOutcome::Agreed(Tag::new(700, 0))
        );
    }

    #[traced_test]
    #[test]
    fn test_sole_federate_agrees_immediately() {
        let mut stop = StopNegotiation::new();
        let outcome = stop.on_request(fed(0), Tag::new(10, 0), [fed(0)]);
        assert_eq!(outcome, StopOutcome::Agreed(Tag::new(10, 0)));
    }

    #[traced_test]
    #[test]
    fn test_duplicate_reply_ignored() {
        let mut stop = StopNegotiation::new();
        stop.on_request(fed(0), Tag::new(500, 0), [fed(0), fed(1), fed(2)]);
        assert_eq!(stop.on_reply(fed(1), Tag::new(900, 0)), StopOutcome::Waiting);
        assert_eq!(stop.on_reply(fed(1), Tag::new(900, 0)), StopOutcome::Ignored);
        assert_eq!(stop.pending(), vec![fed(2)]);
    }

    #[traced_test]
    #[test]
    fn test_departure_counts_as_reply() {
        let mut stop = StopNegotiation::new();
        stop.on_request(fed(0), Tag::new(500, 0), [fed(0), fed(1)]);
        assert_eq!(
            stop.on_departure(fed(1), Tag::NEVER),
            StopOutcome::Agreed(Tag::new(500, 0))
        );
    }

    #[traced_test]
    #[test]
    fn test_concurrent_request_folded_as_reply() {
        // Two federates propose independently; the agreed tag is the max of
        // what arrived, which depends on arrival order.
        let mut stop = StopNegotiation::new();
        stop.on_request(fed(0), Tag::new(500, 0), [fed(0), fed(1)]);
        assert_eq!(
            stop.on_request(fed(1), Tag::new(650, 0), [fed(0), fed(1)]),
            StopOutcome::Agreed(Tag::new(650, 0))
        );
    }

    #[traced_test]
    #[test]
    fn test_messages_after_agreement_ignored() {
        let mut stop = StopNegotiation::new();
        stop.on_request(fed(0), Tag::new(5, 0), [fed(0)]);
        assert_eq!(
            stop.on_request(fed(0), Tag::new(9, 0), [fed(0)]),
            StopOutcome::Ignored
        );
        assert_eq!(stop.on_reply(fed(0), Tag::new(9, 0)), StopOutcome::Ignored);
        assert_eq!(stop.stop_tag(), Some(Tag::new(5, 0)));
    }
}
