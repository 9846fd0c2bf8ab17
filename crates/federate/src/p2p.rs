//! Handshake for direct federate-to-federate sockets.
//!
//! The connecting federate sends `P2P_SENDING_FED_ID`; the accepting one
//! answers ACK, or REJECT if the socket was meant for some other server or
//! federation. After that the socket carries only P2P messages.

use crate::{FederateError, Result};
use futures::{SinkExt, StreamExt};
use rti_messages::{Direction, Message, RejectReason, WireCodec};
use rti_types::FederateId;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// A framed peer socket.
pub type PeerStream = Framed<TcpStream, WireCodec>;

/// Check the first message on an accepted peer socket.
///
/// Returns the sending federate, or the reason to reject it.
pub fn validate_hello(message: &Message, federation_id: &str) -> std::result::Result<FederateId, RejectReason> {
    match message {
        Message::P2pSendingFedId {
            federate,
            federation_id: theirs,
        } if theirs == federation_id => Ok(*federate),
        Message::P2pSendingFedId { .. } => Err(RejectReason::FederationIdDoesNotMatch),
        _ => Err(RejectReason::WrongServer),
    }
}

/// Run the accepting side of the handshake on `stream`.
pub async fn accept_peer(
    stream: TcpStream,
    federation_id: &str,
    tcp_timeout: Duration,
) -> Result<(FederateId, PeerStream)> {
    let mut framed = Framed::new(stream, WireCodec::new(Direction::ToRti));
    let hello = match timeout(tcp_timeout, framed.next()).await {
        Ok(Some(message)) => message?,
        Ok(None) => return Err(FederateError::ConnectionClosed),
        Err(_) => return Err(FederateError::Timeout),
    };

    match validate_hello(&hello, federation_id) {
        Ok(federate) => {
            debug!(federate = %federate, "Peer connected");
            framed.send(Message::Ack { udp_port: None }).await?;
            Ok((federate, framed))
        }
        Err(reason) => {
            warn!(reason = %reason, message = hello.type_name(), "Peer rejected");
            framed.send(Message::Reject(reason)).await?;
            Err(FederateError::Rejected(reason))
        }
    }
}

/// Run the connecting side of the handshake towards `addr`.
pub async fn connect_peer(
    addr: SocketAddr,
    me: FederateId,
    federation_id: &str,
    tcp_timeout: Duration,
) -> Result<PeerStream> {
    let stream = match timeout(tcp_timeout, TcpStream::connect(addr)).await {
        Ok(stream) => stream?,
        Err(_) => return Err(FederateError::Timeout),
    };
    let mut framed = Framed::new(stream, WireCodec::new(Direction::ToRti));
    framed
        .send(Message::P2pSendingFedId {
            federate: me,
            federation_id: federation_id.to_string(),
        })
        .await?;

    match timeout(tcp_timeout, framed.next()).await {
        Ok(Some(reply)) => match reply? {
            Message::Ack { .. } => Ok(framed),
            Message::Reject(reason) => Err(FederateError::Rejected(reason)),
            other => Err(FederateError::UnexpectedMessage(other.type_name())),
        },
        Ok(None) => Err(FederateError::ConnectionClosed),
        Err(_) => Err(FederateError::Timeout),
    }
}
