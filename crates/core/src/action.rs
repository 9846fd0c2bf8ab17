//! Outputs of the coordinator state machine.

use crate::ConnectionId;
use rti_messages::Message;
use rti_types::FederateId;
use std::net::SocketAddr;

/// Which clock-sync datagram(s) to send.
///
/// The timestamps are taken by the runner at send time, so the state
/// machine never reads the physical clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSyncKind {
    /// Start an exchange: T1 carrying the RTI's physical time.
    T1,
    /// Answer a T3: T4 followed immediately by the coded probe.
    T4WithProbe,
}

/// Actions the runner performs on behalf of the coordinator.
///
/// Sends to the same connection must be performed in the order they are
/// returned; that is what keeps grants to one federate monotone on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a message to a connection.
    Send {
        connection: ConnectionId,
        message: Message,
    },

    /// Close a connection after all queued sends are flushed.
    CloseConnection { connection: ConnectionId },

    /// Send clock-sync datagram(s) to a federate's UDP endpoint.
    SendClockSync {
        federate: FederateId,
        addr: SocketAddr,
        kind: ClockSyncKind,
    },

    /// Every federate has resigned; the run is over.
    FederationFinished,
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Send { .. } => "Send",
            Action::CloseConnection { .. } => "CloseConnection",
            Action::SendClockSync { .. } => "SendClockSync",
            Action::FederationFinished => "FederationFinished",
        }
    }

    /// The message carried by a [`Action::Send`] to `connection`, if any.
    pub fn message_to(&self, connection: ConnectionId) -> Option<&Message> {
        match self {
            Action::Send {
                connection: c,
                message,
            } if *c == connection => Some(message),
            _ => None,
        }
    }
}
