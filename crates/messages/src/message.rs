//! Protocol message types.

use crate::RejectReason;
use bytes::Bytes;
use rti_types::{FederateId, PortId, Tag};
use std::net::Ipv4Addr;

/// Type bytes, one per message kind.
pub mod message_type {
    pub const REJECT: u8 = 0;
    pub const JOIN: u8 = 1;
    pub const TIMESTAMP: u8 = 2;
    pub const MESSAGE: u8 = 3;
    pub const RESIGN: u8 = 4;
    pub const TIMED_MESSAGE: u8 = 5;
    pub const NEXT_EVENT_TAG: u8 = 6;
    pub const TIME_ADVANCE_GRANT: u8 = 7;
    pub const LOGICAL_TAG_COMPLETE: u8 = 8;
    pub const STOP_REQUEST: u8 = 9;
    pub const STOP_REQUEST_REPLY: u8 = 10;
    pub const STOP_GRANTED: u8 = 11;
    pub const ADDRESS_QUERY: u8 = 12;
    pub const ADDRESS_AD: u8 = 13;
    pub const P2P_SENDING_FED_ID: u8 = 14;
    pub const P2P_MESSAGE: u8 = 15;
    pub const P2P_TIMED_MESSAGE: u8 = 16;
    pub const CLOCK_SYNC_T1: u8 = 17;
    pub const CLOCK_SYNC_T3: u8 = 18;
    pub const CLOCK_SYNC_T4: u8 = 19;
    pub const CLOCK_SYNC_CODED_PROBE: u8 = 20;
    pub const ACK: u8 = 255;
}

/// Application payload forwarded without a logical tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UntimedMessage {
    /// Destination port inside the destination federate.
    pub port: PortId,
    /// Destination federate.
    pub federate: FederateId,
    /// Opaque payload.
    pub payload: Bytes,
}

/// Application payload carrying the sender's tag.
///
/// Forwarding must keep `tag` (including the microstep) unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedMessage {
    /// Destination port inside the destination federate.
    pub port: PortId,
    /// Destination federate.
    pub federate: FederateId,
    /// Tag at which the sender produced the message.
    pub tag: Tag,
    /// Opaque payload.
    pub payload: Bytes,
}

/// Every message of the RTI protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    // ═══════════════════════════════════════════════════════════════════════
    // Handshake
    // ═══════════════════════════════════════════════════════════════════════
    /// Refusal of the previous message.
    Reject(RejectReason),

    /// Acknowledgment of a join, with the RTI's clock-sync UDP port if any.
    Ack { udp_port: Option<u16> },

    /// First message from a federate to the RTI.
    Join {
        federate: FederateId,
        federation_id: String,
    },

    /// Physical start time: proposed by a federate, fixed by the RTI.
    Timestamp(i64),

    /// The federate is leaving the federation.
    Resign,

    // ═══════════════════════════════════════════════════════════════════════
    // Forwarded application traffic
    // ═══════════════════════════════════════════════════════════════════════
    /// Untimed message routed through the RTI.
    Message(UntimedMessage),

    /// Timed message routed through the RTI.
    TimedMessage(TimedMessage),

    // ═══════════════════════════════════════════════════════════════════════
    // Time advance
    // ═══════════════════════════════════════════════════════════════════════
    /// Earliest pending tag on the sending federate (NET).
    NextEventTag(Tag),

    /// Permission to process up to and including a tag (TAG).
    TimeAdvanceGrant(Tag),

    /// The federate finished processing a tag (LTC).
    LogicalTagComplete(Tag),

    // ═══════════════════════════════════════════════════════════════════════
    // Stop negotiation
    // ═══════════════════════════════════════════════════════════════════════
    /// Request to stop, with a proposed timestamp.
    StopRequest(i64),

    /// Reply to a forwarded stop request, with the replier's current time.
    StopRequestReply(i64),

    /// Agreed stop timestamp.
    StopGranted(i64),

    // ═══════════════════════════════════════════════════════════════════════
    // Address directory
    // ═══════════════════════════════════════════════════════════════════════
    /// Ask the RTI for another federate's peer-to-peer endpoint.
    AddressQuery(FederateId),

    /// RTI reply to [`Message::AddressQuery`]; `port` is `None` when unknown.
    AddressQueryReply { port: Option<u16>, ip: Ipv4Addr },

    /// A federate advertises its peer-to-peer server port.
    AddressAd { port: u16 },

    // ═══════════════════════════════════════════════════════════════════════
    // Peer-to-peer (never handled by the RTI)
    // ═══════════════════════════════════════════════════════════════════════
    /// First message on a direct federate-to-federate socket.
    P2pSendingFedId {
        federate: FederateId,
        federation_id: String,
    },

    /// Untimed message on a direct socket.
    P2pMessage(UntimedMessage),

    /// Timed message on a direct socket.
    P2pTimedMessage(TimedMessage),

    // ═══════════════════════════════════════════════════════════════════════
    // Clock synchronization
    // ═══════════════════════════════════════════════════════════════════════
    /// RTI physical time at send (T1).
    ClockSyncT1(i64),

    /// Federate reply prompting a T4; identifies the sender.
    ClockSyncT3 { federate: FederateId },

    /// RTI physical time at send of the reply (T4).
    ClockSyncT4(i64),

    /// Second RTI timestamp sent right after T4.
    ClockSyncCodedProbe(i64),
}

impl Message {
    /// The wire type byte for this message.
    pub fn type_byte(&self) -> u8 {
        use message_type::*;
        match self {
            Message::Reject(_) => REJECT,
            Message::Ack { .. } => ACK,
            Message::Join { .. } => JOIN,
            Message::Timestamp(_) => TIMESTAMP,
            Message::Resign => RESIGN,
            Message::Message(_) => MESSAGE,
            Message::TimedMessage(_) => TIMED_MESSAGE,
            Message::NextEventTag(_) => NEXT_EVENT_TAG,
            Message::TimeAdvanceGrant(_) => TIME_ADVANCE_GRANT,
            Message::LogicalTagComplete(_) => LOGICAL_TAG_COMPLETE,
            Message::StopRequest(_) => STOP_REQUEST,
            Message::StopRequestReply(_) => STOP_REQUEST_REPLY,
            Message::StopGranted(_) => STOP_GRANTED,
            Message::AddressQuery(_) | Message::AddressQueryReply { .. } => ADDRESS_QUERY,
            Message::AddressAd { .. } => ADDRESS_AD,
            Message::P2pSendingFedId { .. } => P2P_SENDING_FED_ID,
            Message::P2pMessage(_) => P2P_MESSAGE,
            Message::P2pTimedMessage(_) => P2P_TIMED_MESSAGE,
            Message::ClockSyncT1(_) => CLOCK_SYNC_T1,
            Message::ClockSyncT3 { .. } => CLOCK_SYNC_T3,
            Message::ClockSyncT4(_) => CLOCK_SYNC_T4,
            Message::ClockSyncCodedProbe(_) => CLOCK_SYNC_CODED_PROBE,
        }
    }

    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Reject(_) => "Reject",
            Message::Ack { .. } => "Ack",
            Message::Join { .. } => "Join",
            Message::Timestamp(_) => "Timestamp",
            Message::Resign => "Resign",
            Message::Message(_) => "Message",
            Message::TimedMessage(_) => "TimedMessage",
            Message::NextEventTag(_) => "NextEventTag",
            Message::TimeAdvanceGrant(_) => "TimeAdvanceGrant",
            Message::LogicalTagComplete(_) => "LogicalTagComplete",
            Message::StopRequest(_) => "StopRequest",
            Message::StopRequestReply(_) => "StopRequestReply",
            Message::StopGranted(_) => "StopGranted",
            Message::AddressQuery(_) => "AddressQuery",
            Message::AddressQueryReply { .. } => "AddressQueryReply",
            Message::AddressAd { .. } => "AddressAd",
            Message::P2pSendingFedId { .. } => "P2pSendingFedId",
            Message::P2pMessage(_) => "P2pMessage",
            Message::P2pTimedMessage(_) => "P2pTimedMessage",
            Message::ClockSyncT1(_) => "ClockSyncT1",
            Message::ClockSyncT3 { .. } => "ClockSyncT3",
            Message::ClockSyncT4(_) => "ClockSyncT4",
            Message::ClockSyncCodedProbe(_) => "ClockSyncCodedProbe",
        }
    }

    /// Check if this message only travels on direct federate sockets.
    pub fn is_p2p(&self) -> bool {
        matches!(
            self,
            Message::P2pSendingFedId { .. } | Message::P2pMessage(_) | Message::P2pTimedMessage(_)
        )
    }

    /// Check if this is a clock-sync message.
    pub fn is_clock_sync(&self) -> bool {
        matches!(
            self,
            Message::ClockSyncT1(_)
                | Message::ClockSyncT3 { .. }
                | Message::ClockSyncT4(_)
                | Message::ClockSyncCodedProbe(_)
        )
    }
}
