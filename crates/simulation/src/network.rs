//! Simulated network between the federates and the coordinator.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rti_types::FederateId;
use std::collections::HashMap;
use std::time::Duration;

/// One direction of one federate's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    ToRti(FederateId),
    ToFederate(FederateId),
}

/// Network latency model.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Base one-way latency.
    pub latency: Duration,
    /// Extra random delay added per message, up to this much.
    pub jitter: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            jitter: Duration::from_millis(2),
        }
    }
}

/// Assigns delivery times. Each link is FIFO like the TCP stream it models:
/// jitter never lets a message overtake an earlier one on the same link.
#[derive(Debug)]
pub struct SimulatedNetwork {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    last_delivery: HashMap<Link, Duration>,
}

impl SimulatedNetwork {
    pub fn new(config: NetworkConfig, rng: ChaCha8Rng) -> Self {
        Self {
            config,
            rng,
            last_delivery: HashMap::new(),
        }
    }

    /// When a message sent on `link` at `now` arrives.
    pub fn delivery_time(&mut self, now: Duration, link: Link) -> Duration {
        let jitter_nanos = self.config.jitter.as_nanos() as u64;
        let jitter = if jitter_nanos == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.rng.gen_range(0..=jitter_nanos))
        };
        let candidate = now + self.config.latency + jitter;
        let last = self.last_delivery.entry(link).or_default();
        let at = candidate.max(*last);
        *last = at;
        at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_link_stays_fifo_under_jitter() {
        let config = NetworkConfig {
            latency: Duration::from_millis(1),
            jitter: Duration::from_millis(50),
        };
        let mut network = SimulatedNetwork::new(config, ChaCha8Rng::seed_from_u64(7));
        let link = Link::ToRti(FederateId(0));
        let mut previous = Duration::ZERO;
        for i in 0..100 {
            let at = network.delivery_time(Duration::from_micros(i * 10), link);
            assert!(at >= previous);
            previous = at;
        }
    }
}
