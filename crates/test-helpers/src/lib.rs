//! Test helpers for the federation RTI.
//!
//! Topology fixtures shared by unit tests, end-to-end tests and the
//! simulation.

use rti_types::{FederateId, FederationTopology, Interval};

/// Federation id used by every fixture.
pub const FEDERATION_ID: &str = "test-federation";

/// `0 -> 1 -> ... -> n-1`, every edge carrying `delay`.
///
/// # Panics
///
/// Panics if the topology is invalid (`n == 0`).
pub fn chain_topology(n: usize, delay: Interval) -> FederationTopology {
    let mut builder = FederationTopology::builder(FEDERATION_ID, n);
    for i in 1..n {
        builder = builder.connect(FederateId(i as u16 - 1), FederateId(i as u16), delay);
    }
    builder.build().expect("chain topology is valid")
}

/// A topology from `(upstream, downstream, delay)` triples.
///
/// # Panics
///
/// Panics if the edges do not form a valid topology.
pub fn topology_with_edges(n: usize, edges: &[(u16, u16, Interval)]) -> FederationTopology {
    edges
        .iter()
        .fold(
            FederationTopology::builder(FEDERATION_ID, n),
            |builder, (up, down, delay)| builder.connect(FederateId(*up), FederateId(*down), *delay),
        )
        .build()
        .expect("fixture topology is valid")
}

/// `0 -> {1, 2} -> 3` with zero delay on every edge.
pub fn diamond_topology() -> FederationTopology {
    topology_with_edges(
        4,
        &[
            (0, 1, Interval::ZERO),
            (0, 2, Interval::ZERO),
            (1, 3, Interval::ZERO),
            (2, 3, Interval::ZERO),
        ],
    )
}
