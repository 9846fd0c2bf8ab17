//! Time advance grant computation.
//!
//! A federate may advance to the smaller of its own next-event tag and, for
//! every upstream dependency, that upstream's completed tag plus the edge
//! delay. Any `NEVER` in that minimum means "unknown" and yields no bound.

use crate::FederateRegistry;
use rti_types::{FederateId, Tag};
use std::collections::VecDeque;
use tracing::{debug, trace};

/// A grant to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub federate: FederateId,
    pub tag: Tag,
}

/// The largest tag `id` can safely be granted, or `None` if some input to
/// the bound is still unknown.
pub fn admissible_bound(registry: &FederateRegistry, id: FederateId) -> Option<Tag> {
    let record = registry.get(id)?;
    if record.next_event().is_never() {
        return None;
    }

    let mut bound = record.next_event();
    for (upstream, delay) in registry.upstream(id) {
        let completed = registry.get(upstream)?.effective_completed();
        if completed.is_never() {
            return None;
        }
        bound = bound.min(completed.delayed(delay));
    }
    Some(bound)
}

/// Re-evaluate `seeds` and everything reachable downstream of a federate
/// whose grant increased, until no grant increases.
///
/// Each emitted grant is strictly greater than the federate's previous one
/// and is recorded before this returns. Once `stop_tag` is agreed no grant
/// exceeds it.
pub fn propagate(
    registry: &mut FederateRegistry,
    seeds: impl IntoIterator<Item = FederateId>,
    stop_tag: Option<Tag>,
) -> Vec<Grant> {
    let mut grants = Vec::new();
    let mut queued = vec![false; registry.num_federates()];
    let mut worklist = VecDeque::new();

    for id in seeds {
        if let Some(slot) = queued.get_mut(id.index()) {
            if !*slot {
                *slot = true;
                worklist.push_back(id);
            }
        }
    }

    while let Some(id) = worklist.pop_front() {
        queued[id.index()] = false;

        let connected = registry.get(id).is_some_and(|r| r.is_connected());
        if !connected {
            continue;
        }

        let bound = admissible_bound(registry, id).map(|tag| match stop_tag {
            Some(stop) => tag.min(stop),
            None => tag,
        });

        let Some(record) = registry.get_mut(id) else {
            continue;
        };
        let granted = match bound {
            Some(tag) if tag > record.last_granted => {
                record.last_granted = tag;
                true
            }
            _ => false,
        };
        record.refresh_state();

        if !granted {
            trace!(federate = %id, bound = ?bound, "No grant increase");
            continue;
        }

        let tag = record.last_granted;
        debug!(federate = %id, tag = %tag, "Grant increased");
        grants.push(Grant { federate: id, tag });

        let downstream: Vec<FederateId> = registry.downstream(id).iter().copied().collect();
        for down in downstream {
            if !queued[down.index()] {
                queued[down.index()] = true;
                worklist.push_back(down);
            }
        }
    }

    grants
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_core::ConnectionId;
    use rti_test_helpers::{chain_topology, topology_with_edges};
    use rti_types::{FederateState, Interval};
    use std::net::{IpAddr, Ipv4Addr};
    use tracing_test::traced_test;

    fn fed(id: u16) -> FederateId {
        FederateId(id)
    }

    fn join_all(registry: &mut FederateRegistry) {
        for i in 0..registry.num_federates() {
            registry
                .get_mut(fed(i as u16))
                .unwrap()
                .join(ConnectionId(i as u64), IpAddr::V4(Ipv4Addr::LOCALHOST));
        }
    }

    #[traced_test]
    #[test]
    fn test_no_upstream_granted_next_event() {
        let mut registry = FederateRegistry::new(chain_topology(1, Interval::ZERO));
        join_all(&mut registry);
        registry.get_mut(fed(0)).unwrap().next_event = Tag::new(100, 0);

        let grants = propagate(&mut registry, [fed(0)], None);
        assert_eq!(
            grants,
            vec![Grant {
                federate: fed(0),
                tag: Tag::new(100, 0)
            }]
        );
        assert_eq!(registry.get(fed(0)).unwrap().state(), FederateState::Granted);
    }

    #[traced_test]
    #[test]
    fn test_never_upstream_blocks() {
        let mut registry = FederateRegistry::new(chain_topology(2, Interval::ZERO));
        join_all(&mut registry);
        registry.get_mut(fed(1)).unwrap().next_event = Tag::new(100, 0);

        assert_eq!(admissible_bound(&registry, fed(1)), None);
        assert!(propagate(&mut registry, [fed(1)], None).is_empty());
        assert_eq!(registry.get(fed(1)).unwrap().state(), FederateState::Pending);
    }

    #[traced_test]
    #[test]
    fn test_bound_is_min_of_upstream_plus_delay() {
        let topology = topology_with_edges(
            3,
            &[(0, 2, Interval::from_nanos(10)), (1, 2, Interval::from_nanos(50))],
        );
        let mut registry = FederateRegistry::new(topology);
        join_all(&mut registry);
        registry.get_mut(fed(0)).unwrap().completed = Tag::new(100, 0);
        registry.get_mut(fed(1)).unwrap().completed = Tag::new(40, 0);
        registry.get_mut(fed(2)).unwrap().next_event = Tag::new(200, 0);

        // min(200, 100 + 10, 40 + 50)
        assert_eq!(admissible_bound(&registry, fed(2)), Some(Tag::new(90, 0)));
    }

    #[traced_test]
    #[test]
    fn test_resigned_upstream_never_blocks() {
        let mut registry = FederateRegistry::new(chain_topology(2, Interval::ZERO));
        join_all(&mut registry);
        registry.get_mut(fed(1)).unwrap().next_event = Tag::new(100, 0);
        registry.get_mut(fed(0)).unwrap().leave();

        let grants = propagate(&mut registry, [fed(1)], None);
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].tag, Tag::new(100, 0));
    }

    #[traced_test]
    #[test]
    fn test_equal_bound_is_not_regranted() {
        let mut registry = FederateRegistry::new(chain_topology(1, Interval::ZERO));
        join_all(&mut registry);
        registry.get_mut(fed(0)).unwrap().next_event = Tag::new(100, 0);

        assert_eq!(propagate(&mut registry, [fed(0)], None).len(), 1);
        assert!(propagate(&mut registry, [fed(0)], None).is_empty());

        // A lower next-event never regresses the grant.
        registry.get_mut(fed(0)).unwrap().next_event = Tag::new(50, 0);
        assert!(propagate(&mut registry, [fed(0)], None).is_empty());
        assert_eq!(registry.get(fed(0)).unwrap().last_granted(), Tag::new(100, 0));
    }

    #[traced_test]
    #[test]
    fn test_grants_clamped_to_stop_tag() {
        let mut registry = FederateRegistry::new(chain_topology(1, Interval::ZERO));
        join_all(&mut registry);
        registry.get_mut(fed(0)).unwrap().next_event = Tag::new(900, 0);

        let grants = propagate(&mut registry, [fed(0)], Some(Tag::new(500, 0)));
        assert_eq!(grants[0].tag, Tag::new(500, 0));
        assert_eq!(registry.get(fed(0)).unwrap().state(), FederateState::Pending);
    }

    #[traced_test]
    #[test]
    fn test_propagation_reaches_chain_in_one_sweep() {
        let mut registry = FederateRegistry::new(chain_topology(4, Interval::from_nanos(5)));
        join_all(&mut registry);
        for i in 0..4 {
            let record = registry.get_mut(fed(i)).unwrap();
            record.next_event = Tag::new(1_000, 0);
            record.completed = Tag::new(100, 0);
        }

        let grants = propagate(&mut registry, [fed(0)], None);
        let granted: Vec<_> = grants.iter().map(|g| g.federate).collect();
        assert_eq!(granted, vec![fed(0), fed(1), fed(2), fed(3)]);
        assert_eq!(grants[0].tag, Tag::new(1_000, 0));
        assert_eq!(grants[1].tag, Tag::new(105, 0));
    }

    #[traced_test]
    #[test]
    fn test_cycle_with_delay_terminates() {
        let topology = topology_with_edges(
            2,
            &[(0, 1, Interval::from_nanos(1)), (1, 0, Interval::from_nanos(1))],
        );
        let mut registry = FederateRegistry::new(topology);
        join_all(&mut registry);
        for i in 0..2 {
            let record = registry.get_mut(fed(i)).unwrap();
            record.next_event = Tag::new(10, 0);
            record.completed = Tag::new(5, 0);
        }

        let grants = propagate(&mut registry, [fed(0), fed(1)], None);
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.tag == Tag::new(6, 0)));
    }

    #[traced_test]
    #[test]
    fn test_unconnected_federates_skipped() {
        let mut registry = FederateRegistry::new(chain_topology(1, Interval::ZERO));
        registry.get_mut(fed(0)).unwrap().next_event = Tag::new(1, 0);
        assert!(propagate(&mut registry, [fed(0), fed(9)], None).is_empty());
    }
}
