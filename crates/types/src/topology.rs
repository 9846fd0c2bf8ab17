//! Federation topology: the static dependency graph between federates.

use crate::{FederateId, Interval};
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Maximum length of a federation id (it is length-prefixed by one byte).
pub const MAX_FEDERATION_ID_LEN: usize = u8::MAX as usize;

/// Errors that can occur when validating a federation topology.
///
/// All of these are configuration errors: they are detected before any
/// connection is accepted and are fatal to the RTI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// A federation needs at least one federate.
    #[error("federation has no federates")]
    Empty,

    /// Federate ids are two bytes on the wire.
    #[error("federation has {0} federates, at most 65536 are supported")]
    TooManyFederates(usize),

    /// Federation id must fit its one-byte length prefix.
    #[error("federation id is {0} bytes long, at most 255 are supported")]
    FederationIdTooLong(usize),

    /// An edge references a federate outside `[0, N)`.
    #[error("{id} is out of range for a federation of {num_federates}")]
    OutOfRange { id: FederateId, num_federates: usize },

    /// Connection delays cannot be negative.
    #[error("negative delay {delay} on {upstream} -> {downstream}")]
    NegativeDelay {
        upstream: FederateId,
        downstream: FederateId,
        delay: Interval,
    },

    /// A cycle whose edges all carry zero delay can never make progress.
    #[error("zero-delay cycle through {cycle:?}")]
    ZeroDelayCycle { cycle: Vec<FederateId> },
}

/// The dependency graph for one federation instance.
///
/// `upstream[f]` is an ordered set of `(upstream id, minimum delay)`;
/// `downstream[f]` is its inverse. Both are indexed by federate id.
#[derive(Debug, Clone)]
pub struct FederationTopology {
    federation_id: String,
    upstream: Vec<IndexMap<FederateId, Interval>>,
    downstream: Vec<BTreeSet<FederateId>>,
}

impl FederationTopology {
    /// Start building a topology for `num_federates` federates.
    pub fn builder(federation_id: impl Into<String>, num_federates: usize) -> TopologyBuilder {
        TopologyBuilder {
            federation_id: federation_id.into(),
            num_federates,
            edges: Vec::new(),
        }
    }

    /// The federation id federates must present when joining.
    pub fn federation_id(&self) -> &str {
        &self.federation_id
    }

    /// Number of configured federates.
    pub fn num_federates(&self) -> usize {
        self.upstream.len()
    }

    /// Whether `id` is in `[0, N)`.
    pub fn contains(&self, id: FederateId) -> bool {
        id.index() < self.num_federates()
    }

    /// All federate ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = FederateId> + '_ {
        (0..self.num_federates()).map(|i| FederateId(i as u16))
    }

    /// Upstream dependencies of a federate with their minimum delays.
    pub fn upstream(&self, id: FederateId) -> &IndexMap<FederateId, Interval> {
        &self.upstream[id.index()]
    }

    /// Federates that depend on `id`.
    pub fn downstream(&self, id: FederateId) -> &BTreeSet<FederateId> {
        &self.downstream[id.index()]
    }
}

/// Builder that validates the graph on [`TopologyBuilder::build`].
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    federation_id: String,
    num_federates: usize,
    edges: Vec<(FederateId, FederateId, Interval)>,
}

impl TopologyBuilder {
    /// Declare that `downstream` depends on `upstream` with the given delay.
    pub fn connect(mut self, upstream: FederateId, downstream: FederateId, delay: Interval) -> Self {
        self.edges.push((upstream, downstream, delay));
        self
    }

    /// Validate and build the topology.
    pub fn build(self) -> Result<FederationTopology, TopologyError> {
        let n = self.num_federates;
        if n == 0 {
            return Err(TopologyError::Empty);
        }
        if n > u16::MAX as usize + 1 {
            return Err(TopologyError::TooManyFederates(n));
        }
        if self.federation_id.len() > MAX_FEDERATION_ID_LEN {
            return Err(TopologyError::FederationIdTooLong(
                self.federation_id.len(),
            ));
        }

        let mut upstream: Vec<IndexMap<FederateId, Interval>> = vec![IndexMap::new(); n];
        let mut downstream: Vec<BTreeSet<FederateId>> = vec![BTreeSet::new(); n];

        for (up, down, delay) in self.edges {
            for id in [up, down] {
                if id.index() >= n {
                    return Err(TopologyError::OutOfRange {
                        id,
                        num_federates: n,
                    });
                }
            }
            if delay.as_nanos() < 0 {
                return Err(TopologyError::NegativeDelay {
                    upstream: up,
                    downstream: down,
                    delay,
                });
            }
            // Several connections between the same pair: the smallest delay
            // is the binding one.
            upstream[down.index()]
                .entry(up)
                .and_modify(|d| *d = (*d).min(delay))
                .or_insert(delay);
            downstream[up.index()].insert(down);
        }

        let topology = FederationTopology {
            federation_id: self.federation_id,
            upstream,
            downstream,
        };

        if let Some(cycle) = find_zero_delay_cycle(&topology) {
            return Err(TopologyError::ZeroDelayCycle { cycle });
        }

        Ok(topology)
    }
}

/// Find a cycle made only of zero-delay edges, if any.
///
/// Iterative three-colour DFS over the zero-delay subgraph following
/// upstream -> downstream edges.
fn find_zero_delay_cycle(topology: &FederationTopology) -> Option<Vec<FederateId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Colour {
        White,
        Grey,
        Black,
    }

    let n = topology.num_federates();
    let zero_successors = |id: FederateId| -> Vec<FederateId> {
        topology
            .downstream(id)
            .iter()
            .copied()
            .filter(|down| {
                topology
                    .upstream(*down)
                    .get(&id)
                    .is_some_and(|delay| delay.is_zero())
            })
            .collect()
    };

    let mut colour = vec![Colour::White; n];
    for root in topology.ids() {
        if colour[root.index()] != Colour::White {
            continue;
        }
        // Stack of (node, successors, next successor index); `path` mirrors
        // the grey nodes so the cycle can be reported.
        let mut stack = vec![(root, zero_successors(root), 0usize)];
        let mut path = vec![root];
        colour[root.index()] = Colour::Grey;

        while let Some((node, successors, next)) = stack.last_mut() {
            if let Some(&succ) = successors.get(*next) {
                *next += 1;
                match colour[succ.index()] {
                    Colour::White => {
                        colour[succ.index()] = Colour::Grey;
                        path.push(succ);
                        stack.push((succ, zero_successors(succ), 0));
                    }
                    Colour::Grey => {
                        let start = path.iter().position(|id| *id == succ).unwrap_or(0);
                        return Some(path[start..].to_vec());
                    }
                    Colour::Black => {}
                }
            } else {
                colour[node.index()] = Colour::Black;
                path.pop();
                stack.pop();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fed(id: u16) -> FederateId {
        FederateId(id)
    }

    #[test]
    fn test_chain_builds_with_inverse_edges() {
        let topology = FederationTopology::builder("fed", 3)
            .connect(fed(0), fed(1), Interval::ZERO)
            .connect(fed(1), fed(2), Interval::from_millis(10))
            .build()
            .unwrap();

        assert_eq!(topology.num_federates(), 3);
        assert_eq!(topology.upstream(fed(1)).get(&fed(0)), Some(&Interval::ZERO));
        assert!(topology.downstream(fed(0)).contains(&fed(1)));
        assert!(topology.downstream(fed(2)).is_empty());
        assert!(topology.upstream(fed(0)).is_empty());
    }

    #[test]
    fn test_duplicate_edge_keeps_smallest_delay() {
        let topology = FederationTopology::builder("fed", 2)
            .connect(fed(0), fed(1), Interval::from_millis(10))
            .connect(fed(0), fed(1), Interval::from_millis(2))
            .build()
            .unwrap();

        assert_eq!(
            topology.upstream(fed(1)).get(&fed(0)),
            Some(&Interval::from_millis(2))
        );
    }

    #[test]
    fn test_zero_delay_cycle_rejected() {
        let result = FederationTopology::builder("fed", 3)
            .connect(fed(0), fed(1), Interval::ZERO)
            .connect(fed(1), fed(2), Interval::ZERO)
            .connect(fed(2), fed(0), Interval::ZERO)
            .build();

        match result {
            Err(TopologyError::ZeroDelayCycle { cycle }) => {
                assert_eq!(cycle.len(), 3);
                assert!(cycle.contains(&fed(0)));
            }
            other => panic!("expected zero-delay cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_delay_self_loop_rejected() {
        let result = FederationTopology::builder("fed", 1)
            .connect(fed(0), fed(0), Interval::ZERO)
            .build();
        assert!(matches!(result, Err(TopologyError::ZeroDelayCycle { .. })));
    }

    #[test]
    fn test_cycle_with_delay_allowed() {
        let topology = FederationTopology::builder("fed", 2)
            .connect(fed(0), fed(1), Interval::ZERO)
            .connect(fed(1), fed(0), Interval::from_millis(1))
            .build();
        assert!(topology.is_ok());
    }

    #[test]
    fn test_out_of_range_edge_rejected() {
        let result = FederationTopology::builder("fed", 2)
            .connect(fed(0), fed(5), Interval::ZERO)
            .build();
        assert_eq!(
            result.unwrap_err(),
            TopologyError::OutOfRange {
                id: fed(5),
                num_federates: 2
            }
        );
    }

    #[test]
    fn test_negative_delay_rejected() {
        let result = FederationTopology::builder("fed", 2)
            .connect(fed(0), fed(1), Interval::from_nanos(-1))
            .build();
        assert!(matches!(result, Err(TopologyError::NegativeDelay { .. })));
    }

    #[test]
    fn test_empty_and_long_id_rejected() {
        assert_eq!(
            FederationTopology::builder("fed", 0).build().unwrap_err(),
            TopologyError::Empty
        );
        let long_id = "x".repeat(300);
        assert_eq!(
            FederationTopology::builder(long_id, 1).build().unwrap_err(),
            TopologyError::FederationIdTooLong(300)
        );
    }
}
