//! Message encoding and decoding for stream transport.
//!
//! # Wire Format
//!
//! ```text
//! [type: u8][fixed fields...][optional length-prefixed payload]
//! ```
//!
//! The frame length is derived from the type byte (and, for variable-size
//! messages, from an embedded length field). Nothing is consumed from the
//! buffer until a whole frame is present.

use crate::message::message_type as ty;
use crate::{Message, RejectReason, TimedMessage, UntimedMessage};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rti_types::constants::{INET_ADDRSTRLEN, MAX_PAYLOAD_LEN};
use rti_types::{FederateId, PortId, Tag};
use std::net::Ipv4Addr;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Which side of the coordinator connection a byte stream travels.
///
/// Needed because type byte 12 means "query" towards the RTI and "reply"
/// coming from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Federate to RTI (or federate to federate).
    ToRti,
    /// RTI to federate.
    FromRti,
}

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unknown reject reason: {0}")]
    UnknownRejectReason(u8),

    #[error("Payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("Federation id of {0} bytes does not fit its length prefix")]
    FederationIdTooLong(usize),

    #[error("Federation id is not valid UTF-8")]
    InvalidFederationId,

    #[error("Invalid port: {0}")]
    InvalidPort(i32),

    #[error("Invalid IPv4 address text")]
    InvalidAddress,
}

impl CodecError {
    /// Whether the bytes themselves were bad, as opposed to the transport.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }

    /// The REJECT code for a peer that sent undecodable bytes.
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            CodecError::InvalidFederationId | CodecError::FederationIdTooLong(_) => {
                RejectReason::FederationIdDoesNotMatch
            }
            _ => RejectReason::UnexpectedMessage,
        }
    }
}

const TAG_LEN: usize = 8 + 4;
/// port + federate + length
const FORWARD_HEADER_LEN: usize = 2 + 2 + 4;

/// Encode a message onto the end of `dst`.
pub fn encode(message: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
    dst.put_u8(message.type_byte());
    match message {
        Message::Reject(reason) => dst.put_u8(reason.code()),
        Message::Ack { udp_port } => dst.put_i32(udp_port.map_or(-1, i32::from)),
        Message::Join {
            federate,
            federation_id,
        }
        | Message::P2pSendingFedId {
            federate,
            federation_id,
        } => {
            let len = u8::try_from(federation_id.len())
                .map_err(|_| CodecError::FederationIdTooLong(federation_id.len()))?;
            dst.put_u16(federate.0);
            dst.put_u8(len);
            dst.put_slice(federation_id.as_bytes());
        }
        Message::Timestamp(time)
        | Message::StopRequest(time)
        | Message::StopRequestReply(time)
        | Message::StopGranted(time)
        | Message::ClockSyncT1(time)
        | Message::ClockSyncT4(time)
        | Message::ClockSyncCodedProbe(time) => dst.put_i64(*time),
        Message::Resign => {}
        Message::Message(msg) | Message::P2pMessage(msg) => {
            let len = payload_len(&msg.payload)?;
            dst.put_u16(msg.port.0);
            dst.put_u16(msg.federate.0);
            dst.put_u32(len);
            dst.put_slice(&msg.payload);
        }
        Message::TimedMessage(msg) | Message::P2pTimedMessage(msg) => {
            let len = payload_len(&msg.payload)?;
            dst.put_u16(msg.port.0);
            dst.put_u16(msg.federate.0);
            dst.put_u32(len);
            put_tag(dst, msg.tag);
            dst.put_slice(&msg.payload);
        }
        Message::NextEventTag(tag)
        | Message::TimeAdvanceGrant(tag)
        | Message::LogicalTagComplete(tag) => put_tag(dst, *tag),
        Message::AddressQuery(federate) => dst.put_u16(federate.0),
        Message::AddressQueryReply { port, ip } => {
            dst.put_i32(port.map_or(-1, i32::from));
            let mut text = [0u8; INET_ADDRSTRLEN];
            let rendered = ip.to_string();
            text[..rendered.len()].copy_from_slice(rendered.as_bytes());
            dst.put_slice(&text);
        }
        Message::AddressAd { port } => dst.put_i32(i32::from(*port)),
        Message::ClockSyncT3 { federate } => dst.put_i32(i32::from(federate.0)),
    }
    Ok(())
}

/// Try to decode one message from the front of `src`.
///
/// Returns `Ok(None)` if `src` does not yet hold a complete frame; in that
/// case nothing is consumed.
pub fn decode(src: &mut BytesMut, direction: Direction) -> Result<Option<Message>, CodecError> {
    let Some(len) = frame_len(src, direction)? else {
        return Ok(None);
    };
    if src.len() < len {
        src.reserve(len - src.len());
        return Ok(None);
    }

    let mut frame = src.split_to(len).freeze();
    let type_byte = frame.get_u8();
    let message = match type_byte {
        ty::REJECT => {
            let code = frame.get_u8();
            Message::Reject(
                RejectReason::from_code(code).ok_or(CodecError::UnknownRejectReason(code))?,
            )
        }
        ty::ACK => Message::Ack {
            udp_port: optional_port(frame.get_i32())?,
        },
        ty::JOIN | ty::P2P_SENDING_FED_ID => {
            let federate = FederateId(frame.get_u16());
            let id_len = frame.get_u8() as usize;
            let federation_id = String::from_utf8(frame.split_to(id_len).to_vec())
                .map_err(|_| CodecError::InvalidFederationId)?;
            if type_byte == ty::JOIN {
                Message::Join {
                    federate,
                    federation_id,
                }
            } else {
                Message::P2pSendingFedId {
                    federate,
                    federation_id,
                }
            }
        }
        ty::TIMESTAMP => Message::Timestamp(frame.get_i64()),
        ty::RESIGN => Message::Resign,
        ty::MESSAGE | ty::P2P_MESSAGE => {
            let port = PortId(frame.get_u16());
            let federate = FederateId(frame.get_u16());
            let payload_len = frame.get_u32() as usize;
            let msg = UntimedMessage {
                port,
                federate,
                payload: frame.split_to(payload_len),
            };
            if type_byte == ty::MESSAGE {
                Message::Message(msg)
            } else {
                Message::P2pMessage(msg)
            }
        }
        ty::TIMED_MESSAGE | ty::P2P_TIMED_MESSAGE => {
            let port = PortId(frame.get_u16());
            let federate = FederateId(frame.get_u16());
            let payload_len = frame.get_u32() as usize;
            let tag = get_tag(&mut frame);
            let msg = TimedMessage {
                port,
                federate,
                tag,
                payload: frame.split_to(payload_len),
            };
            if type_byte == ty::TIMED_MESSAGE {
                Message::TimedMessage(msg)
            } else {
                Message::P2pTimedMessage(msg)
            }
        }
        ty::NEXT_EVENT_TAG => Message::NextEventTag(get_tag(&mut frame)),
        ty::TIME_ADVANCE_GRANT => Message::TimeAdvanceGrant(get_tag(&mut frame)),
        ty::LOGICAL_TAG_COMPLETE => Message::LogicalTagComplete(get_tag(&mut frame)),
        ty::STOP_REQUEST => Message::StopRequest(frame.get_i64()),
        ty::STOP_REQUEST_REPLY => Message::StopRequestReply(frame.get_i64()),
        ty::STOP_GRANTED => Message::StopGranted(frame.get_i64()),
        ty::ADDRESS_QUERY => match direction {
            Direction::ToRti => Message::AddressQuery(FederateId(frame.get_u16())),
            Direction::FromRti => {
                let port = optional_port(frame.get_i32())?;
                let ip = parse_ipv4_text(&frame.split_to(INET_ADDRSTRLEN))?;
                Message::AddressQueryReply { port, ip }
            }
        },
        ty::ADDRESS_AD => {
            let raw = frame.get_i32();
            let port = u16::try_from(raw).map_err(|_| CodecError::InvalidPort(raw))?;
            Message::AddressAd { port }
        }
        ty::CLOCK_SYNC_T1 => Message::ClockSyncT1(frame.get_i64()),
        ty::CLOCK_SYNC_T3 => {
            let raw = frame.get_i32();
            let id = u16::try_from(raw).map_err(|_| CodecError::InvalidPort(raw))?;
            Message::ClockSyncT3 {
                federate: FederateId(id),
            }
        }
        ty::CLOCK_SYNC_T4 => Message::ClockSyncT4(frame.get_i64()),
        ty::CLOCK_SYNC_CODED_PROBE => Message::ClockSyncCodedProbe(frame.get_i64()),
        other => return Err(CodecError::UnknownMessageType(other)),
    };
    Ok(Some(message))
}

/// Total frame length, or `None` if not enough header bytes are buffered to
/// know it yet.
fn frame_len(src: &[u8], direction: Direction) -> Result<Option<usize>, CodecError> {
    let Some(&type_byte) = src.first() else {
        return Ok(None);
    };
    let len = match type_byte {
        ty::RESIGN => 1,
        ty::REJECT => 2,
        ty::ACK | ty::ADDRESS_AD | ty::CLOCK_SYNC_T3 => 5,
        ty::TIMESTAMP
        | ty::STOP_REQUEST
        | ty::STOP_REQUEST_REPLY
        | ty::STOP_GRANTED
        | ty::CLOCK_SYNC_T1
        | ty::CLOCK_SYNC_T4
        | ty::CLOCK_SYNC_CODED_PROBE => 9,
        ty::NEXT_EVENT_TAG | ty::TIME_ADVANCE_GRANT | ty::LOGICAL_TAG_COMPLETE => 1 + TAG_LEN,
        ty::ADDRESS_QUERY => match direction {
            Direction::ToRti => 3,
            Direction::FromRti => 1 + 4 + INET_ADDRSTRLEN,
        },
        ty::JOIN | ty::P2P_SENDING_FED_ID => match src.get(3) {
            Some(&id_len) => 4 + id_len as usize,
            None => return Ok(None),
        },
        ty::MESSAGE | ty::P2P_MESSAGE | ty::TIMED_MESSAGE | ty::P2P_TIMED_MESSAGE => {
            let Some(len_bytes) = src.get(5..9) else {
                return Ok(None);
            };
            let payload_len =
                u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]])
                    as usize;
            if payload_len > MAX_PAYLOAD_LEN {
                return Err(CodecError::PayloadTooLarge(payload_len));
            }
            let tag_len = match type_byte {
                ty::TIMED_MESSAGE | ty::P2P_TIMED_MESSAGE => TAG_LEN,
                _ => 0,
            };
            1 + FORWARD_HEADER_LEN + tag_len + payload_len
        }
        other => return Err(CodecError::UnknownMessageType(other)),
    };
    Ok(Some(len))
}

fn payload_len(payload: &Bytes) -> Result<u32, CodecError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(CodecError::PayloadTooLarge(payload.len()));
    }
    // MAX_PAYLOAD_LEN fits in u32.
    Ok(payload.len() as u32)
}

fn put_tag(dst: &mut BytesMut, tag: Tag) {
    dst.put_i64(tag.time);
    dst.put_u32(tag.microstep);
}

fn get_tag(src: &mut Bytes) -> Tag {
    let time = src.get_i64();
    let microstep = src.get_u32();
    Tag::new(time, microstep)
}

/// `-1` means "none"; any other value must be a valid port.
fn optional_port(raw: i32) -> Result<Option<u16>, CodecError> {
    if raw == -1 {
        return Ok(None);
    }
    u16::try_from(raw)
        .map(Some)
        .map_err(|_| CodecError::InvalidPort(raw))
}

fn parse_ipv4_text(text: &[u8]) -> Result<Ipv4Addr, CodecError> {
    let end = text.iter().position(|b| *b == 0).unwrap_or(text.len());
    std::str::from_utf8(&text[..end])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(CodecError::InvalidAddress)
}

/// `tokio_util` codec for framed reads and writes.
#[derive(Debug, Clone, Copy)]
pub struct WireCodec {
    direction: Direction,
}

impl WireCodec {
    /// Codec decoding the stream that travels in `direction`.
    pub fn new(direction: Direction) -> Self {
        Self { direction }
    }

    /// Codec for the RTI's side of a federate connection.
    pub fn rti_side() -> Self {
        Self::new(Direction::ToRti)
    }

    /// Codec for a federate's side of its RTI connection.
    pub fn federate_side() -> Self {
        Self::new(Direction::FromRti)
    }
}

impl Encoder<Message> for WireCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode(&item, dst)
    }
}

impl Decoder for WireCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode(src, self.direction)
    }
}
