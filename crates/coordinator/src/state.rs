//! The coordinator state machine.

use crate::time_advance::{propagate, Grant};
use crate::{
    AddressDirectory, ClockSyncScheduler, CoordinatorConfig, FederateRegistry, StartOutcome,
    StartTimeNegotiation, StopNegotiation, StopOutcome,
};
use rti_core::{Action, ConnectionId, Event, StateMachine};
use rti_messages::{Message, RejectReason};
use rti_types::{ExecutionMode, FederateId, FederateState, FederationTopology, Tag};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    /// Accepted; the first message must be a join.
    Handshaking { peer: SocketAddr },
    /// Joined as this federate.
    Joined(FederateId),
}

/// Why a federate's session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Departure {
    Resigned,
    ConnectionLost,
    ProtocolViolation,
}

/// The RTI.
///
/// Owns every federate record and all negotiation state. Processes one
/// event at a time, so every recomputation sees a consistent registry.
pub struct CoordinatorState {
    config: CoordinatorConfig,
    registry: FederateRegistry,
    sessions: HashMap<ConnectionId, Session>,
    stop: StopNegotiation,
    start: StartTimeNegotiation,
    directory: AddressDirectory,
    clock_sync: ClockSyncScheduler,
    finished: bool,
    now: Duration,
}

impl std::fmt::Debug for CoordinatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorState")
            .field("federation_id", &self.registry.topology().federation_id())
            .field("num_federates", &self.registry.num_federates())
            .field("sessions", &self.sessions.len())
            .field("stop_tag", &self.stop.stop_tag())
            .field("finished", &self.finished)
            .finish()
    }
}

impl CoordinatorState {
    pub fn new(topology: FederationTopology, config: CoordinatorConfig) -> Self {
        let n = topology.num_federates();
        Self {
            clock_sync: ClockSyncScheduler::new(config.clock_sync.clone(), n),
            config,
            registry: FederateRegistry::new(topology),
            sessions: HashMap::new(),
            stop: StopNegotiation::new(),
            start: StartTimeNegotiation::new(n),
            directory: AddressDirectory::new(n),
            finished: false,
            now: Duration::ZERO,
        }
    }

    pub fn registry(&self) -> &FederateRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn stop_tag(&self) -> Option<Tag> {
        self.stop.stop_tag()
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start.start_time()
    }

    pub fn directory(&self) -> &AddressDirectory {
        &self.directory
    }

    /// Whether every federate has resigned.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The federate joined on `connection`, if any.
    pub fn federate_of(&self, connection: ConnectionId) -> Option<FederateId> {
        match self.sessions.get(&connection) {
            Some(Session::Joined(federate)) => Some(*federate),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn on_connection_opened(&mut self, connection: ConnectionId, peer: SocketAddr) -> Vec<Action> {
        debug!(connection = %connection, peer = %peer, "Connection opened");
        self.sessions
            .insert(connection, Session::Handshaking { peer });
        vec![]
    }

    fn on_message(&mut self, connection: ConnectionId, message: Message) -> Vec<Action> {
        match self.sessions.get(&connection).copied() {
            Some(Session::Handshaking { peer }) => self.on_handshake(connection, peer, message),
            Some(Session::Joined(federate)) => self.on_federate_message(federate, message),
            None => {
                trace!(connection = %connection, "Message on unknown connection dropped");
                vec![]
            }
        }
    }

    fn on_handshake(
        &mut self,
        connection: ConnectionId,
        peer: SocketAddr,
        message: Message,
    ) -> Vec<Action> {
        let (federate, federation_id) = match message {
            Message::Join {
                federate,
                federation_id,
            } => (federate, federation_id),
            other => {
                warn!(
                    connection = %connection,
                    message = other.type_name(),
                    "Expected a join as first message"
                );
                return self.reject(connection, RejectReason::UnexpectedMessage);
            }
        };

        let topology = self.registry.topology();
        let reason = if federation_id != topology.federation_id() {
            Some(RejectReason::FederationIdDoesNotMatch)
        } else if !topology.contains(federate) {
            Some(RejectReason::FederateIdOutOfRange)
        } else if self
            .registry
            .get(federate)
            .is_some_and(|record| record.is_connected())
        {
            Some(RejectReason::FederateIdInUse)
        } else {
            None
        };
        if let Some(reason) = reason {
            warn!(
                connection = %connection,
                federate = %federate,
                federation_id = %federation_id,
                reason = %reason,
                "Join rejected"
            );
            return self.reject(connection, reason);
        }

        let Some(record) = self.registry.get_mut(federate) else {
            return self.reject(connection, RejectReason::FederateIdOutOfRange);
        };
        let rejoin = record.state() == FederateState::Resigned;
        record.join(connection, peer.ip());
        self.sessions.insert(connection, Session::Joined(federate));
        info!(
            federate = %federate,
            connection = %connection,
            peer = %peer,
            rejoin,
            "Federate joined"
        );

        vec![Action::Send {
            connection,
            message: Message::Ack {
                udp_port: self.config.advertised_udp_port(),
            },
        }]
    }

    fn reject(&mut self, connection: ConnectionId, reason: RejectReason) -> Vec<Action> {
        self.sessions.remove(&connection);
        vec![
            Action::Send {
                connection,
                message: Message::Reject(reason),
            },
            Action::CloseConnection { connection },
        ]
    }

    fn on_malformed(&mut self, connection: ConnectionId, reason: RejectReason) -> Vec<Action> {
        match self.sessions.get(&connection).copied() {
            Some(Session::Handshaking { peer }) => {
                warn!(connection = %connection, peer = %peer, reason = %reason, "Undecodable join");
                self.reject(connection, reason)
            }
            Some(Session::Joined(federate)) => {
                warn!(federate = %federate, "Undecodable frame from joined federate");
                self.disconnect_violator(federate, connection)
            }
            None => vec![Action::CloseConnection { connection }],
        }
    }

    fn on_connection_lost(&mut self, connection: ConnectionId) -> Vec<Action> {
        match self.sessions.remove(&connection) {
            Some(Session::Joined(federate)) => {
                self.depart(federate, connection, Departure::ConnectionLost)
            }
            Some(Session::Handshaking { peer }) => {
                debug!(connection = %connection, peer = %peer, "Connection lost before join");
                vec![Action::CloseConnection { connection }]
            }
            None => vec![],
        }
    }

    fn on_handshake_timeout(&mut self, connection: ConnectionId) -> Vec<Action> {
        match self.sessions.get(&connection) {
            Some(Session::Handshaking { peer }) => {
                warn!(connection = %connection, peer = %peer, "Join timed out");
                self.sessions.remove(&connection);
                vec![Action::CloseConnection { connection }]
            }
            _ => vec![],
        }
    }

    /// End `federate`'s session. It no longer blocks anyone downstream.
    fn depart(
        &mut self,
        federate: FederateId,
        connection: ConnectionId,
        departure: Departure,
    ) -> Vec<Action> {
        self.sessions.remove(&connection);
        let Some(record) = self.registry.get_mut(federate) else {
            return vec![Action::CloseConnection { connection }];
        };
        let completed = record.completed();
        record.leave();
        self.clock_sync.forget(federate);
        self.directory.forget(federate);

        match departure {
            Departure::Resigned => info!(federate = %federate, completed = %completed, "Federate resigned"),
            Departure::ConnectionLost => {
                warn!(federate = %federate, completed = %completed, "Connection lost, treating federate as resigned")
            }
            Departure::ProtocolViolation => {
                warn!(federate = %federate, completed = %completed, "Protocol violation, federate disconnected")
            }
        }

        let mut actions = vec![Action::CloseConnection { connection }];

        let outcome = self.stop.on_departure(federate, completed);
        actions.extend(self.apply_stop_outcome(outcome));

        if let StartOutcome::Fixed(start) = self.start.on_departure(&self.registry) {
            actions.extend(self.broadcast(Message::Timestamp(start)));
        }

        let downstream: Vec<FederateId> = self.registry.downstream(federate).iter().copied().collect();
        actions.extend(self.advance(downstream));

        if !self.finished && self.registry.all_resigned() {
            info!("All federates resigned, federation finished");
            self.finished = true;
            actions.push(Action::FederationFinished);
        }
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Steady state
    // ═══════════════════════════════════════════════════════════════════════

    fn on_federate_message(&mut self, federate: FederateId, message: Message) -> Vec<Action> {
        trace!(federate = %federate, message = message.type_name(), "Received");
        match message {
            Message::Timestamp(proposal) => self.on_timestamp(federate, proposal),
            Message::NextEventTag(tag) => self.on_next_event(federate, tag),
            Message::LogicalTagComplete(tag) => self.on_completed(federate, tag),
            Message::Message(msg) => {
                let dest = msg.federate;
                self.forward(federate, dest, Message::Message(msg))
            }
            Message::TimedMessage(msg) => {
                let dest = msg.federate;
                self.forward(federate, dest, Message::TimedMessage(msg))
            }
            Message::StopRequest(time) => self.on_stop_request(federate, Tag::at(time)),
            Message::StopRequestReply(time) => self.on_stop_reply(federate, Tag::at(time)),
            Message::AddressQuery(target) => self.on_address_query(federate, target),
            Message::AddressAd { port } => self.on_address_ad(federate, port),
            Message::Resign => match self.connection_of(federate) {
                Some(connection) => self.depart(federate, connection, Departure::Resigned),
                None => vec![],
            },
            other => {
                warn!(
                    federate = %federate,
                    message = other.type_name(),
                    "Unexpected message from joined federate"
                );
                match self.connection_of(federate) {
                    Some(connection) => self.disconnect_violator(federate, connection),
                    None => vec![],
                }
            }
        }
    }

    /// Reject a joined federate that broke protocol and drop it.
    fn disconnect_violator(&mut self, federate: FederateId, connection: ConnectionId) -> Vec<Action> {
        let mut actions = vec![Action::Send {
            connection,
            message: Message::Reject(RejectReason::UnexpectedMessage),
        }];
        actions.extend(self.depart(federate, connection, Departure::ProtocolViolation));
        actions
    }

    fn on_next_event(&mut self, federate: FederateId, tag: Tag) -> Vec<Action> {
        let Some(record) = self.registry.get_mut(federate) else {
            return vec![];
        };
        if tag < record.completed() {
            warn!(
                federate = %federate,
                tag = %tag,
                completed = %record.completed(),
                "Next event tag earlier than completed tag ignored"
            );
            return vec![];
        }
        debug!(federate = %federate, tag = %tag, "Next event tag");
        record.next_event = tag;
        self.advance([federate])
    }

    fn on_completed(&mut self, federate: FederateId, tag: Tag) -> Vec<Action> {
        let Some(record) = self.registry.get_mut(federate) else {
            return vec![];
        };
        if tag <= record.completed() {
            debug!(
                federate = %federate,
                tag = %tag,
                completed = %record.completed(),
                "Non-advancing completion ignored"
            );
            return vec![];
        }
        record.completed = tag;
        if tag > record.next_event() {
            debug!(
                federate = %federate,
                tag = %tag,
                next_event = %record.next_event(),
                "Completion past next event, raising next event"
            );
            record.next_event = tag;
        }
        debug!(federate = %federate, tag = %tag, "Logical tag complete");

        let downstream: Vec<FederateId> = self.registry.downstream(federate).iter().copied().collect();
        self.advance(downstream)
    }

    /// Run grant propagation from `seeds` and turn grants into sends.
    fn advance(&mut self, seeds: impl IntoIterator<Item = FederateId>) -> Vec<Action> {
        let grants = propagate(&mut self.registry, seeds, self.stop.stop_tag());
        grants
            .into_iter()
            .filter_map(|Grant { federate, tag }| {
                let connection = self.connection_of(federate)?;
                info!(federate = %federate, tag = %tag, "Time advance granted");
                Some(Action::Send {
                    connection,
                    message: Message::TimeAdvanceGrant(tag),
                })
            })
            .collect()
    }

    fn forward(&mut self, from: FederateId, dest: FederateId, message: Message) -> Vec<Action> {
        match self.connection_of(dest) {
            Some(connection) => {
                trace!(from = %from, to = %dest, message = message.type_name(), "Forwarding");
                vec![Action::Send {
                    connection,
                    message,
                }]
            }
            None => {
                warn!(
                    from = %from,
                    to = %dest,
                    message = message.type_name(),
                    "Destination not connected, message dropped"
                );
                vec![]
            }
        }
    }

    fn on_timestamp(&mut self, federate: FederateId, proposal: i64) -> Vec<Action> {
        match self.start.on_proposal(federate, proposal, &self.registry) {
            StartOutcome::Waiting => vec![],
            StartOutcome::Fixed(start) => self.broadcast(Message::Timestamp(start)),
            StartOutcome::Late(start) => self.send_to(federate, Message::Timestamp(start)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Stop negotiation
    // ═══════════════════════════════════════════════════════════════════════

    fn on_stop_request(&mut self, federate: FederateId, proposal: Tag) -> Vec<Action> {
        if self.already_counted(federate) {
            return vec![];
        }
        let connected = self.registry.connected();
        let outcome = self.stop.on_request(federate, proposal, connected);
        self.mark_counted(federate, &outcome);
        self.apply_stop_outcome(outcome)
    }

    fn on_stop_reply(&mut self, federate: FederateId, tag: Tag) -> Vec<Action> {
        if self.already_counted(federate) {
            return vec![];
        }
        let outcome = self.stop.on_reply(federate, tag);
        self.mark_counted(federate, &outcome);
        self.apply_stop_outcome(outcome)
    }

    fn already_counted(&self, federate: FederateId) -> bool {
        let counted = self
            .registry
            .get(federate)
            .is_some_and(|record| record.requested_stop());
        if counted {
            debug!(federate = %federate, "Stop message from already counted federate ignored");
        }
        counted
    }

    fn mark_counted(&mut self, federate: FederateId, outcome: &StopOutcome) {
        if *outcome == StopOutcome::Ignored {
            return;
        }
        if let Some(record) = self.registry.get_mut(federate) {
            record.requested_stop = true;
        }
    }

    fn apply_stop_outcome(&mut self, outcome: StopOutcome) -> Vec<Action> {
        match outcome {
            StopOutcome::Ignored | StopOutcome::Waiting => vec![],
            StopOutcome::Forward { to, proposal } => to
                .into_iter()
                .flat_map(|federate| self.send_to(federate, Message::StopRequest(proposal.time)))
                .collect(),
            StopOutcome::Agreed(tag) => self.broadcast(Message::StopGranted(tag.time)),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Address directory
    // ═══════════════════════════════════════════════════════════════════════

    fn on_address_query(&mut self, federate: FederateId, target: FederateId) -> Vec<Action> {
        let reply = self.directory.reply(target);
        debug!(federate = %federate, target = %target, reply = ?reply, "Address query");
        self.send_to(federate, reply)
    }

    fn on_address_ad(&mut self, federate: FederateId, port: u16) -> Vec<Action> {
        let Some(host) = self.registry.get(federate).and_then(|r| r.host()) else {
            return vec![];
        };
        info!(federate = %federate, host = %host, port, "Address advertised");
        self.directory.advertise(federate, host, port);
        vec![]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Clock synchronization
    // ═══════════════════════════════════════════════════════════════════════

    fn on_clock_sync_probe(&mut self, federate: FederateId, addr: SocketAddr) -> Vec<Action> {
        if !self.clock_sync.is_enabled() {
            return vec![];
        }
        let Some(record) = self.registry.get_mut(federate) else {
            warn!(federate = %federate, addr = %addr, "T3 from unknown federate");
            return vec![];
        };
        if !record.is_connected() {
            debug!(federate = %federate, addr = %addr, "T3 from federate without a session");
            return vec![];
        }
        if record.udp_addr() != Some(addr) {
            info!(federate = %federate, addr = %addr, "Clock sync endpoint registered");
            record.udp_addr = Some(addr);
            record.mode = ExecutionMode::Realtime;
        }
        self.clock_sync.on_probe(federate, addr, self.now)
    }

    fn on_clock_sync_timer(&mut self) -> Vec<Action> {
        let targets: Vec<(FederateId, SocketAddr)> = self
            .registry
            .records()
            .filter(|r| r.is_connected() && r.mode() == ExecutionMode::Realtime)
            .filter_map(|r| r.udp_addr().map(|addr| (r.id(), addr)))
            .collect();
        self.clock_sync.on_timer(self.now, targets)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn connection_of(&self, federate: FederateId) -> Option<ConnectionId> {
        self.registry.get(federate).and_then(|r| r.connection())
    }

    fn send_to(&self, federate: FederateId, message: Message) -> Vec<Action> {
        self.connection_of(federate)
            .map(|connection| Action::Send {
                connection,
                message,
            })
            .into_iter()
            .collect()
    }

    /// Send `message` to every connected federate.
    fn broadcast(&self, message: Message) -> Vec<Action> {
        self.registry
            .records()
            .filter_map(|r| r.connection())
            .map(|connection| Action::Send {
                connection,
                message: message.clone(),
            })
            .collect()
    }
}

impl StateMachine for CoordinatorState {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        match event {
            Event::ConnectionOpened { connection, peer } => {
                self.on_connection_opened(connection, peer)
            }
            Event::MessageReceived {
                connection,
                message,
            } => self.on_message(connection, message),
            Event::MalformedMessage { connection, reason } => {
                self.on_malformed(connection, reason)
            }
            Event::ConnectionLost { connection } => self.on_connection_lost(connection),
            Event::HandshakeTimedOut { connection } => self.on_handshake_timeout(connection),
            Event::ClockSyncProbe { federate, addr } => self.on_clock_sync_probe(federate, addr),
            Event::ClockSyncTimer => self.on_clock_sync_timer(),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}
