//! Simulation runner.

use crate::event_queue::{EventQueue, SimEvent};
use crate::federate::{Ending, FederateOutput, FederateScript, SimulatedFederate};
use crate::network::{Link, NetworkConfig, SimulatedNetwork};
use crate::SimulationError;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rti_coordinator::{admissible_bound, ClockSyncConfig, CoordinatorConfig, CoordinatorState};
use rti_core::{Action, ConnectionId, Event, StateMachine};
use rti_messages::Message;
use rti_types::{FederateId, FederationTopology, Interval, Tag};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Parameters for a randomized run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub seed: u64,
    pub num_federates: usize,
    /// Chance that federate `i` depends on federate `j > i`.
    pub edge_probability: f64,
    /// Largest edge delay in nanoseconds; edges get `0..=max_delay_ns`.
    pub max_delay_ns: i64,
    pub tags_per_federate: usize,
    /// Chance that a federate drops its socket instead of resigning.
    pub disconnect_probability: f64,
    /// Federate 0 requests a stop after this many tags.
    pub stop_after: Option<usize>,
    pub network: NetworkConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            num_federates: 4,
            edge_probability: 0.5,
            max_delay_ns: 5,
            tags_per_federate: 20,
            disconnect_probability: 0.0,
            stop_after: None,
            network: NetworkConfig::default(),
        }
    }
}

impl SimulationConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_federates(mut self, num_federates: usize) -> Self {
        self.num_federates = num_federates;
        self
    }

    pub fn with_disconnect_probability(mut self, probability: f64) -> Self {
        self.disconnect_probability = probability;
        self
    }

    pub fn with_stop_after(mut self, tags: usize) -> Self {
        self.stop_after = Some(tags);
        self
    }
}

/// Counters from a finished run.
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub grants: u64,
    pub messages_to_rti: u64,
    pub stop_tag: Option<Tag>,
    pub start_time: Option<i64>,
    pub finished: bool,
    pub end_time: Duration,
}

/// Drives a [`CoordinatorState`] with simulated federates.
///
/// Federate `i` always uses connection `i`.
pub struct SimulationRunner {
    federation_id: String,
    state: CoordinatorState,
    federates: Vec<SimulatedFederate>,
    queue: EventQueue,
    network: SimulatedNetwork,
    now: Duration,
    /// Last grant sent to each federate.
    granted: Vec<Tag>,
    /// Stop proposals and replies sent so far.
    stop_proposals: Vec<(FederateId, Tag)>,
    stats: SimulationStats,
}

impl SimulationRunner {
    /// Build a random acyclic federation from `config`.
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let n = config.num_federates;

        let mut builder = FederationTopology::builder(format!("sim-{}", config.seed), n);
        for up in 0..n {
            for down in (up + 1)..n {
                if rng.gen_bool(config.edge_probability) {
                    let delay = Interval::from_nanos(rng.gen_range(0..=config.max_delay_ns));
                    builder = builder.connect(FederateId(up as u16), FederateId(down as u16), delay);
                }
            }
        }
        let topology = builder.build()?;

        let scripts = (0..n)
            .map(|i| {
                let mut time = 0i64;
                let tags = (0..config.tags_per_federate)
                    .map(|_| {
                        time += rng.gen_range(1..=100);
                        Tag::new(time, rng.gen_range(0..2))
                    })
                    .collect();
                let ending = if rng.gen_bool(config.disconnect_probability) {
                    Ending::Disconnect
                } else {
                    Ending::Resign
                };
                FederateScript {
                    tags,
                    ending,
                    stop_after: if i == 0 { config.stop_after } else { None },
                }
            })
            .collect();

        Ok(Self::with_scripts(topology, scripts, config.network, rng))
    }

    /// Run the given scripts over `topology`. Federate `i` runs `scripts[i]`.
    pub fn with_scripts(
        topology: FederationTopology,
        scripts: Vec<FederateScript>,
        network: NetworkConfig,
        mut rng: ChaCha8Rng,
    ) -> Self {
        let federation_id = topology.federation_id().to_string();
        let n = topology.num_federates();
        let state = CoordinatorState::new(
            topology,
            CoordinatorConfig::default().with_clock_sync(ClockSyncConfig::disabled()),
        );

        let mut queue = EventQueue::new();
        let federates = scripts
            .into_iter()
            .enumerate()
            .map(|(i, script)| {
                let id = FederateId(i as u16);
                queue.push(
                    Duration::from_micros(rng.gen_range(0..1_000)),
                    SimEvent::Start(id),
                );
                SimulatedFederate::new(id, script)
            })
            .collect();
        let network = SimulatedNetwork::new(network, ChaCha8Rng::seed_from_u64(rng.gen()));

        Self {
            federation_id,
            state,
            federates,
            queue,
            network,
            now: Duration::ZERO,
            granted: vec![Tag::NEVER; n],
            stop_proposals: Vec::new(),
            stats: SimulationStats::default(),
        }
    }

    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    pub fn federates(&self) -> &[SimulatedFederate] {
        &self.federates
    }

    /// Run until no events remain.
    ///
    /// Fails at the first safety violation, or at the end if some federate
    /// never got to finish its work.
    pub fn run(&mut self) -> Result<SimulationStats, SimulationError> {
        while let Some((key, event)) = self.queue.pop() {
            self.now = key.time;
            self.stats.events_processed += 1;
            match event {
                SimEvent::Start(federate) => self.start_federate(federate),
                SimEvent::ToRti(event) => self.deliver_to_rti(event)?,
                SimEvent::ToFederate { federate, message } => {
                    self.deliver_to_federate(federate, message)?
                }
            }
        }

        self.stats.end_time = self.now;
        self.stats.stop_tag = self.state.stop_tag();
        self.stats.start_time = self.state.start_time();
        self.stats.finished = self.state.is_finished();

        let stalled: Vec<FederateId> = self
            .federates
            .iter()
            .filter(|f| !f.is_done())
            .map(|f| f.id())
            .collect();
        if !stalled.is_empty() || !self.stats.finished {
            return Err(SimulationError::Stalled {
                at: self.now,
                stalled,
            });
        }
        info!(
            events = self.stats.events_processed,
            grants = self.stats.grants,
            end = ?self.now,
            "Simulation finished"
        );
        Ok(self.stats.clone())
    }

    fn connection(federate: FederateId) -> ConnectionId {
        ConnectionId(u64::from(federate.0))
    }

    fn peer(federate: FederateId) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40_000 + federate.0)
    }

    fn start_federate(&mut self, federate: FederateId) {
        let connection = Self::connection(federate);
        let join = self.federates[federate.index()].join(&self.federation_id);
        debug!(federate = %federate, "Federate starting");
        self.send_to_rti(
            federate,
            Event::ConnectionOpened {
                connection,
                peer: Self::peer(federate),
            },
        );
        self.send_to_rti(
            federate,
            Event::MessageReceived {
                connection,
                message: join,
            },
        );
    }

    fn send_to_rti(&mut self, federate: FederateId, event: Event) {
        let at = self.network.delivery_time(self.now, Link::ToRti(federate));
        self.queue.push(at, SimEvent::ToRti(event));
    }

    fn deliver_to_rti(&mut self, event: Event) -> Result<(), SimulationError> {
        if matches!(event, Event::MessageReceived { .. }) {
            self.stats.messages_to_rti += 1;
        }
        self.state.set_time(self.now);
        trace!(event = event.type_name(), "RTI handling");
        let actions = self.state.handle(event);
        for action in actions {
            self.perform(action)?;
        }
        self.check_records()
    }

    fn perform(&mut self, action: Action) -> Result<(), SimulationError> {
        match action {
            Action::Send {
                connection,
                message,
            } => {
                let federate = FederateId(connection.as_u64() as u16);
                self.check_outgoing(federate, &message)?;
                let at = self.network.delivery_time(self.now, Link::ToFederate(federate));
                self.queue
                    .push(at, SimEvent::ToFederate { federate, message });
            }
            Action::CloseConnection { connection } => {
                trace!(connection = %connection, "RTI closed connection");
            }
            Action::SendClockSync { .. } => {}
            Action::FederationFinished => {
                debug!("Federation finished");
            }
        }
        Ok(())
    }

    fn deliver_to_federate(&mut self, federate: FederateId, message: Message) -> Result<(), SimulationError> {
        let now_ns = self.now.as_nanos() as i64;
        let outputs = self.federates[federate.index()].on_message(message, now_ns);
        for output in outputs {
            match output {
                FederateOutput::Send(message) => {
                    match &message {
                        Message::StopRequest(time) | Message::StopRequestReply(time) => {
                            self.stop_proposals.push((federate, Tag::at(*time)));
                        }
                        _ => {}
                    }
                    self.send_to_rti(
                        federate,
                        Event::MessageReceived {
                            connection: Self::connection(federate),
                            message,
                        },
                    );
                }
                FederateOutput::Disconnect => {
                    self.send_to_rti(
                        federate,
                        Event::ConnectionLost {
                            connection: Self::connection(federate),
                        },
                    );
                }
            }
        }
        self.check_start_times()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Invariant checks
    // ═══════════════════════════════════════════════════════════════════════

    /// Checks on each message as the RTI emits it.
    fn check_outgoing(&mut self, federate: FederateId, message: &Message) -> Result<(), SimulationError> {
        match message {
            Message::TimeAdvanceGrant(granted) => {
                let granted = *granted;
                let previous = self.granted[federate.index()];
                if granted < previous {
                    return Err(SimulationError::GrantRegressed {
                        federate,
                        previous,
                        granted,
                    });
                }
                let bound = admissible_bound(self.state.registry(), federate);
                if bound.map_or(true, |bound| granted > bound) {
                    return Err(SimulationError::GrantExceedsBound {
                        federate,
                        granted,
                        bound,
                    });
                }
                if let Some(stop) = self.state.stop_tag() {
                    if granted > stop {
                        return Err(SimulationError::GrantPastStop {
                            federate,
                            granted,
                            stop,
                        });
                    }
                }
                self.granted[federate.index()] = granted;
                self.stats.grants += 1;
            }
            Message::StopGranted(time) => {
                let stop = Tag::at(*time);
                if let Some((from, proposal)) = self
                    .stop_proposals
                    .iter()
                    .find(|(_, proposal)| *proposal > stop)
                {
                    return Err(SimulationError::StopBelowProposal {
                        federate: *from,
                        proposal: *proposal,
                        stop,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn check_records(&self) -> Result<(), SimulationError> {
        for record in self.state.registry().records() {
            if !record.is_connected() {
                continue;
            }
            let (completed, next_event) = (record.completed(), record.next_event());
            if !completed.is_never() && !next_event.is_never() && completed > next_event {
                return Err(SimulationError::CompletedPastNextEvent {
                    federate: record.id(),
                    completed,
                    next_event,
                });
            }
        }
        Ok(())
    }

    fn check_start_times(&self) -> Result<(), SimulationError> {
        let mut starts = self.federates.iter().filter_map(|f| f.start_time());
        if let Some(first) = starts.next() {
            if let Some(second) = starts.find(|start| *start != first) {
                return Err(SimulationError::StartTimeMismatch { first, second });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rti_test_helpers::{chain_topology, diamond_topology};
    use tracing_test::traced_test;

    fn scripts(tags: &[&[i64]]) -> Vec<FederateScript> {
        tags.iter()
            .map(|times| FederateScript {
                tags: times.iter().map(|t| Tag::new(*t, 0)).collect(),
                ending: Ending::Resign,
                stop_after: None,
            })
            .collect()
    }

    #[traced_test]
    #[test]
    fn test_chain_runs_to_completion() {
        let mut runner = SimulationRunner::with_scripts(
            chain_topology(3, Interval::ZERO),
            scripts(&[&[10, 20, 30], &[15, 25], &[5, 40]]),
            NetworkConfig::default(),
            ChaCha8Rng::seed_from_u64(1),
        );
        let stats = runner.run().unwrap();
        assert!(stats.finished);
        assert!(stats.start_time.is_some());
        assert_eq!(
            runner.federates()[2].completed(),
            Tag::new(40, 0)
        );
    }

    #[traced_test]
    #[test]
    fn test_diamond_with_disconnect_does_not_stall() {
        let mut scripts = scripts(&[&[10, 50], &[20], &[30, 60], &[70]]);
        scripts[1].ending = Ending::Disconnect;
        let mut runner = SimulationRunner::with_scripts(
            diamond_topology(),
            scripts,
            NetworkConfig::default(),
            ChaCha8Rng::seed_from_u64(2),
        );
        let stats = runner.run().unwrap();
        assert!(stats.finished);
    }

    #[traced_test]
    #[test]
    fn test_same_seed_same_run() {
        let config = SimulationConfig::default().with_seed(42).with_stop_after(5);
        let a = SimulationRunner::new(config.clone()).unwrap().run().unwrap();
        let b = SimulationRunner::new(config).unwrap().run().unwrap();
        assert_eq!(a.events_processed, b.events_processed);
        assert_eq!(a.grants, b.grants);
        assert_eq!(a.stop_tag, b.stop_tag);
        assert_eq!(a.end_time, b.end_time);
    }

    #[traced_test]
    #[test]
    fn test_random_federations_hold_invariants() {
        for seed in 0..25 {
            let config = SimulationConfig::default()
                .with_seed(seed)
                .with_federates(2 + (seed as usize % 5))
                .with_disconnect_probability(0.2);
            let result = SimulationRunner::new(config).unwrap().run();
            assert!(result.is_ok(), "seed {seed}: {result:?}");
        }
    }

    #[traced_test]
    #[test]
    fn test_random_stops_agree_on_max() {
        for seed in 100..115 {
            let config = SimulationConfig::default()
                .with_seed(seed)
                .with_federates(4)
                .with_stop_after(3);
            let stats = SimulationRunner::new(config)
                .unwrap()
                .run()
                .unwrap_or_else(|e| panic!("seed {seed}: {e}"));
            assert!(stats.stop_tag.is_some(), "seed {seed}: no stop agreed");
        }
    }
}
