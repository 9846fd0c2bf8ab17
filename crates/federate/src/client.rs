//! Connection from a federate to the RTI.

use crate::{FederateConfig, FederateError, Result};
use futures::{SinkExt, StreamExt};
use rti_messages::{Message, RejectReason, TimedMessage, UntimedMessage, WireCodec};
use rti_types::{FederateId, Tag};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;
use tracing::{debug, info, instrument, warn};

/// Outcome of knocking on one port.
enum Knock {
    Joined(RtiClient),
    /// Nothing there, or somebody else's RTI.
    NextPort,
}

/// A joined federate's connection to the RTI.
pub struct RtiClient {
    federate: FederateId,
    framed: Framed<TcpStream, WireCodec>,
    /// Messages read while waiting for something else.
    pending: VecDeque<Message>,
    udp_port: Option<u16>,
    config: FederateConfig,
}

impl std::fmt::Debug for RtiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtiClient")
            .field("federate", &self.federate)
            .field("udp_port", &self.udp_port)
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RtiClient {
    /// Find the RTI and join the federation.
    ///
    /// Each round tries every candidate port; a port that refuses the
    /// connection or answers `FEDERATION_ID_DOES_NOT_MATCH`/`WRONG_SERVER`
    /// belongs to someone else and the next port is tried. Any other reject
    /// is final.
    #[instrument(skip(config), fields(federate = %config.federate_id))]
    pub async fn connect(config: FederateConfig) -> Result<Self> {
        let ports = config.candidate_ports();
        for attempt in 1..=config.connect_retries {
            for (i, port) in ports.iter().enumerate() {
                if i > 0 {
                    sleep(config.port_knocking_interval).await;
                }
                match Self::knock(&config, *port).await? {
                    Knock::Joined(client) => return Ok(client),
                    Knock::NextPort => {}
                }
            }
            if attempt < config.connect_retries {
                debug!(
                    attempt,
                    delay_ms = config.connect_retry_interval.as_millis() as u64,
                    "RTI not found, retrying"
                );
                sleep(config.connect_retry_interval).await;
            }
        }
        Err(FederateError::RtiNotFound {
            host: config.rti_host.clone(),
            federation_id: config.federation_id.clone(),
            attempts: config.connect_retries,
        })
    }

    async fn knock(config: &FederateConfig, port: u16) -> Result<Knock> {
        let addr = (config.rti_host.as_str(), port);
        let stream = match timeout(config.tcp_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(_)) | Err(_) => return Ok(Knock::NextPort),
        };
        let _ = stream.set_nodelay(true);

        let mut framed = Framed::new(stream, WireCodec::federate_side());
        framed
            .send(Message::Join {
                federate: config.federate_id,
                federation_id: config.federation_id.clone(),
            })
            .await?;

        let reply = match timeout(config.tcp_timeout, framed.next()).await {
            Ok(Some(reply)) => reply?,
            Ok(None) => return Ok(Knock::NextPort),
            Err(_) => {
                warn!(port, "No reply to join, trying next port");
                return Ok(Knock::NextPort);
            }
        };

        match reply {
            Message::Ack { udp_port } => {
                info!(port, udp_port = ?udp_port, "Joined federation");
                Ok(Knock::Joined(RtiClient {
                    federate: config.federate_id,
                    framed,
                    pending: VecDeque::new(),
                    udp_port,
                    config: config.clone(),
                }))
            }
            Message::Reject(
                reason @ (RejectReason::FederationIdDoesNotMatch | RejectReason::WrongServer),
            ) => {
                debug!(port, reason = %reason, "Not our RTI");
                Ok(Knock::NextPort)
            }
            Message::Reject(reason) => Err(FederateError::Rejected(reason)),
            other => Err(FederateError::UnexpectedMessage(other.type_name())),
        }
    }

    pub fn federate(&self) -> FederateId {
        self.federate
    }

    /// The RTI's clock-sync UDP port from the join ACK, if it runs one.
    pub fn udp_port(&self) -> Option<u16> {
        self.udp_port
    }

    /// The RTI's TCP address.
    pub fn rti_addr(&self) -> Result<SocketAddr> {
        Ok(self.framed.get_ref().peer_addr()?)
    }

    /// Send any message to the RTI.
    pub async fn send(&mut self, message: Message) -> Result<()> {
        self.framed.send(message).await?;
        Ok(())
    }

    /// Propose a physical start time.
    pub async fn send_timestamp(&mut self, proposal: i64) -> Result<()> {
        self.send(Message::Timestamp(proposal)).await
    }

    /// Report the earliest pending tag.
    pub async fn send_next_event(&mut self, tag: Tag) -> Result<()> {
        self.send(Message::NextEventTag(tag)).await
    }

    /// Report a tag as fully processed.
    pub async fn send_completed(&mut self, tag: Tag) -> Result<()> {
        self.send(Message::LogicalTagComplete(tag)).await
    }

    pub async fn send_stop_request(&mut self, time: i64) -> Result<()> {
        self.send(Message::StopRequest(time)).await
    }

    pub async fn send_stop_reply(&mut self, time: i64) -> Result<()> {
        self.send(Message::StopRequestReply(time)).await
    }

    /// Send an untimed message through the RTI.
    pub async fn send_message(&mut self, message: UntimedMessage) -> Result<()> {
        self.send(Message::Message(message)).await
    }

    /// Send a timed message through the RTI.
    pub async fn send_timed_message(&mut self, message: TimedMessage) -> Result<()> {
        self.send(Message::TimedMessage(message)).await
    }

    /// Advertise this federate's peer-to-peer server port.
    pub async fn advertise_address(&mut self, port: u16) -> Result<()> {
        self.send(Message::AddressAd { port }).await
    }

    /// Leave the federation. The RTI closes the connection.
    pub async fn resign(mut self) -> Result<()> {
        self.send(Message::Resign).await?;
        self.framed.close().await?;
        Ok(())
    }

    /// Next message from the RTI.
    pub async fn recv(&mut self) -> Result<Message> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        self.read().await
    }

    async fn read(&mut self) -> Result<Message> {
        match self.framed.next().await {
            Some(message) => Ok(message?),
            None => Err(FederateError::ConnectionClosed),
        }
    }

    /// Look up another federate's peer-to-peer endpoint.
    ///
    /// Retries at a fixed interval while the RTI does not know it yet.
    /// Messages that arrive meanwhile are kept for [`RtiClient::recv`].
    pub async fn query_address(&mut self, target: FederateId) -> Result<(Ipv4Addr, u16)> {
        for attempt in 1..=self.config.address_query_retries {
            self.send(Message::AddressQuery(target)).await?;
            loop {
                match self.read().await? {
                    Message::AddressQueryReply {
                        port: Some(port),
                        ip,
                    } => return Ok((ip, port)),
                    Message::AddressQueryReply { port: None, .. } => break,
                    other => self.pending.push_back(other),
                }
            }
            debug!(target = %target, attempt, "Address not known yet");
            sleep(self.config.address_query_retry_interval).await;
        }
        Err(FederateError::AddressUnknown(target.0))
    }
}
