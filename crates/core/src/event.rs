//! Inputs to the coordinator state machine.

use crate::ConnectionId;
use rti_messages::{Message, RejectReason};
use rti_types::FederateId;
use std::net::SocketAddr;

/// Everything the runner can tell the coordinator.
#[derive(Debug, Clone)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Connection lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// A TCP connection was accepted. The first message must be a join.
    ConnectionOpened {
        connection: ConnectionId,
        peer: SocketAddr,
    },

    /// A complete message was decoded from a connection.
    MessageReceived {
        connection: ConnectionId,
        message: Message,
    },

    /// Bytes on the connection could not be decoded.
    ///
    /// The reader stops; the connection stays open until the coordinator
    /// closes it, so a REJECT with `reason` can still be written.
    MalformedMessage {
        connection: ConnectionId,
        reason: RejectReason,
    },

    /// The connection's read side ended (EOF or socket error).
    ConnectionLost { connection: ConnectionId },

    /// The TCP timeout elapsed since [`Event::ConnectionOpened`].
    ///
    /// Ignored if the join already completed.
    HandshakeTimedOut { connection: ConnectionId },

    // ═══════════════════════════════════════════════════════════════════════
    // Clock synchronization
    // ═══════════════════════════════════════════════════════════════════════
    /// A T3 datagram arrived on the clock-sync UDP socket.
    ClockSyncProbe {
        federate: FederateId,
        addr: SocketAddr,
    },

    /// Periodic clock-sync cycle timer fired.
    ClockSyncTimer,
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::ConnectionOpened { .. } => "ConnectionOpened",
            Event::MessageReceived { .. } => "MessageReceived",
            Event::MalformedMessage { .. } => "MalformedMessage",
            Event::ConnectionLost { .. } => "ConnectionLost",
            Event::HandshakeTimedOut { .. } => "HandshakeTimedOut",
            Event::ClockSyncProbe { .. } => "ClockSyncProbe",
            Event::ClockSyncTimer => "ClockSyncTimer",
        }
    }
}
