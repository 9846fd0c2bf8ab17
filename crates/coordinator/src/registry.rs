//! The arena of federate records for one federation.

use crate::FederateRecord;
use rti_types::{FederateId, FederateState, FederationTopology, Interval};
use std::collections::BTreeSet;

/// All federate records plus the dependency graph.
///
/// Records are addressed by id only; nothing holds a reference from one
/// record to another.
#[derive(Debug, Clone)]
pub struct FederateRegistry {
    topology: FederationTopology,
    records: Vec<FederateRecord>,
}

impl FederateRegistry {
    /// One `NotConnected` record per configured federate.
    pub fn new(topology: FederationTopology) -> Self {
        let records = topology.ids().map(FederateRecord::new).collect();
        Self { topology, records }
    }

    pub fn topology(&self) -> &FederationTopology {
        &self.topology
    }

    pub fn num_federates(&self) -> usize {
        self.records.len()
    }

    /// Look up a record; `None` if `id` is out of range.
    pub fn get(&self, id: FederateId) -> Option<&FederateRecord> {
        self.records.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: FederateId) -> Option<&mut FederateRecord> {
        self.records.get_mut(id.index())
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &FederateRecord> {
        self.records.iter()
    }

    /// Upstream dependencies of `id` with their minimum delays.
    pub fn upstream(&self, id: FederateId) -> impl Iterator<Item = (FederateId, Interval)> + '_ {
        self.topology
            .upstream(id)
            .iter()
            .map(|(up, delay)| (*up, *delay))
    }

    /// Federates whose bound depends on `id`'s completion.
    pub fn downstream(&self, id: FederateId) -> &BTreeSet<FederateId> {
        self.topology.downstream(id)
    }

    /// Ids of all federates with a live session.
    pub fn connected(&self) -> Vec<FederateId> {
        self.records
            .iter()
            .filter(|r| r.is_connected())
            .map(|r| r.id())
            .collect()
    }

    /// Whether every configured federate has joined and then left.
    pub fn all_resigned(&self) -> bool {
        self.records
            .iter()
            .all(|r| r.state() == FederateState::Resigned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_test_helpers::chain_topology;

    #[test]
    fn test_registry_starts_unconnected() {
        let registry = FederateRegistry::new(chain_topology(3, Interval::ZERO));
        assert_eq!(registry.num_federates(), 3);
        assert!(registry.connected().is_empty());
        assert!(!registry.all_resigned());
        assert!(registry.get(FederateId(3)).is_none());
    }

    #[test]
    fn test_edges_come_from_topology() {
        let registry = FederateRegistry::new(chain_topology(3, Interval::from_millis(1)));
        let upstream: Vec<_> = registry.upstream(FederateId(1)).collect();
        assert_eq!(upstream, vec![(FederateId(0), Interval::from_millis(1))]);
        assert!(registry.downstream(FederateId(1)).contains(&FederateId(2)));
    }
}
