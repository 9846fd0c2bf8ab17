//! Per-federate coordination state.

use rti_core::ConnectionId;
use rti_types::{ExecutionMode, FederateId, FederateState, Tag};
use std::net::{IpAddr, SocketAddr};

/// What the RTI knows about one federate.
///
/// Created as `NotConnected` with every tag `NEVER` when the topology is
/// configured, before any socket exists. Dependency edges live in the
/// registry's topology, not here.
#[derive(Debug, Clone)]
pub struct FederateRecord {
    id: FederateId,
    pub(crate) state: FederateState,
    /// Largest tag confirmed complete; never decreases within a session.
    pub(crate) completed: Tag,
    /// Earliest pending tag, as last reported.
    pub(crate) next_event: Tag,
    /// Last tag sent in a grant; never decreases within a session.
    pub(crate) last_granted: Tag,
    pub(crate) mode: ExecutionMode,
    pub(crate) connection: Option<ConnectionId>,
    /// Peer address of the coordinator connection.
    pub(crate) host: Option<IpAddr>,
    /// Clock-sync endpoint, learned from the first T3 datagram.
    pub(crate) udp_addr: Option<SocketAddr>,
    /// Whether this federate's stop request or reply has been counted.
    pub(crate) requested_stop: bool,
}

impl FederateRecord {
    /// A fresh, unconnected record.
    pub fn new(id: FederateId) -> Self {
        Self {
            id,
            state: FederateState::NotConnected,
            completed: Tag::NEVER,
            next_event: Tag::NEVER,
            last_granted: Tag::NEVER,
            mode: ExecutionMode::Fast,
            connection: None,
            host: None,
            udp_addr: None,
            requested_stop: false,
        }
    }

    pub fn id(&self) -> FederateId {
        self.id
    }

    pub fn state(&self) -> FederateState {
        self.state
    }

    pub fn completed(&self) -> Tag {
        self.completed
    }

    pub fn next_event(&self) -> Tag {
        self.next_event
    }

    pub fn last_granted(&self) -> Tag {
        self.last_granted
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn host(&self) -> Option<IpAddr> {
        self.host
    }

    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    pub fn requested_stop(&self) -> bool {
        self.requested_stop
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Completion as seen by downstream federates.
    ///
    /// A resigned federate never blocks anyone again, so it counts as having
    /// completed everything.
    pub fn effective_completed(&self) -> Tag {
        match self.state {
            FederateState::Resigned => Tag::FOREVER,
            _ => self.completed,
        }
    }

    /// Start a new session on `connection`.
    ///
    /// Tags are reset: a federate rejoining after a resign starts over.
    pub(crate) fn join(&mut self, connection: ConnectionId, host: IpAddr) {
        self.state = FederateState::Pending;
        self.completed = Tag::NEVER;
        self.next_event = Tag::NEVER;
        self.last_granted = Tag::NEVER;
        self.mode = ExecutionMode::Fast;
        self.connection = Some(connection);
        self.host = Some(host);
        self.udp_addr = None;
        self.requested_stop = false;
    }

    /// End the session, by resignation or connection loss.
    pub(crate) fn leave(&mut self) {
        self.state = FederateState::Resigned;
        self.connection = None;
        self.udp_addr = None;
    }

    /// Refresh `Granted`/`Pending` after a grant or a new next-event tag.
    pub(crate) fn refresh_state(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.state = if !self.next_event.is_never() && self.last_granted >= self.next_event {
            FederateState::Granted
        } else {
            FederateState::Pending
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_new_record_is_unconnected_and_never() {
        let record = FederateRecord::new(FederateId(1));
        assert_eq!(record.state(), FederateState::NotConnected);
        assert_eq!(record.completed(), Tag::NEVER);
        assert_eq!(record.next_event(), Tag::NEVER);
        assert_eq!(record.effective_completed(), Tag::NEVER);
    }

    #[test]
    fn test_resigned_record_is_forever() {
        let mut record = FederateRecord::new(FederateId(0));
        record.join(ConnectionId(1), IpAddr::V4(Ipv4Addr::LOCALHOST));
        record.completed = Tag::new(10, 0);
        record.leave();

        assert_eq!(record.state(), FederateState::Resigned);
        assert_eq!(record.completed(), Tag::new(10, 0));
        assert_eq!(record.effective_completed(), Tag::FOREVER);
        assert_eq!(record.connection(), None);
    }

    #[test]
    fn test_rejoin_resets_tags() {
        let mut record = FederateRecord::new(FederateId(0));
        record.join(ConnectionId(1), IpAddr::V4(Ipv4Addr::LOCALHOST));
        record.completed = Tag::new(10, 0);
        record.next_event = Tag::new(20, 0);
        record.last_granted = Tag::new(20, 0);
        record.leave();

        record.join(ConnectionId(2), IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(record.state(), FederateState::Pending);
        assert_eq!(record.completed(), Tag::NEVER);
        assert_eq!(record.last_granted(), Tag::NEVER);
        assert_eq!(record.connection(), Some(ConnectionId(2)));
    }

    #[test]
    fn test_refresh_state() {
        let mut record = FederateRecord::new(FederateId(0));
        record.join(ConnectionId(1), IpAddr::V4(Ipv4Addr::LOCALHOST));
        record.next_event = Tag::new(5, 0);
        record.refresh_state();
        assert_eq!(record.state(), FederateState::Pending);

        record.last_granted = Tag::new(5, 0);
        record.refresh_state();
        assert_eq!(record.state(), FederateState::Granted);
    }
}
