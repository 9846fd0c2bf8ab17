//! The RTI's clock-sync datagram socket.

use crate::NetworkError;
use bytes::BytesMut;
use rti_core::{ClockSyncKind, Event};
use rti_messages::{decode, encode, Direction, Message};
use rti_types::{physical_time_ns, FederateId};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Largest datagram the RTI expects (a T3 is 5 bytes).
const MAX_DATAGRAM: usize = 64;

/// Bind the clock-sync socket on `host`.
///
/// Prefers the TCP port number so federates find both on one port; falls
/// back to any free port.
pub async fn bind_udp(host: &str, preferred_port: u16) -> Result<ClockSyncSocket, NetworkError> {
    let socket = match UdpSocket::bind((host, preferred_port)).await {
        Ok(socket) => socket,
        Err(e) => {
            debug!(port = preferred_port, error = %e, "Preferred UDP port taken");
            UdpSocket::bind((host, 0))
                .await
                .map_err(|source| NetworkError::Bind {
                    addr: format!("{host}:0/udp"),
                    source,
                })?
        }
    };
    Ok(ClockSyncSocket {
        socket: Arc::new(socket),
    })
}

/// Shared handle to the clock-sync socket.
#[derive(Debug, Clone)]
pub struct ClockSyncSocket {
    socket: Arc<UdpSocket>,
}

impl ClockSyncSocket {
    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.socket.local_addr()?)
    }

    /// Send one step of an exchange to `addr`.
    ///
    /// Timestamps are read from the physical clock as late as possible:
    /// T1 and T4 immediately before sending, the coded probe after T4 has
    /// left.
    pub async fn send(
        &self,
        federate: FederateId,
        addr: SocketAddr,
        kind: ClockSyncKind,
    ) -> Result<(), NetworkError> {
        match kind {
            ClockSyncKind::T1 => {
                self.send_stamped(addr, Message::ClockSyncT1(physical_time_ns()))
                    .await?;
            }
            ClockSyncKind::T4WithProbe => {
                self.send_stamped(addr, Message::ClockSyncT4(physical_time_ns()))
                    .await?;
                self.send_stamped(addr, Message::ClockSyncCodedProbe(physical_time_ns()))
                    .await?;
            }
        }
        trace!(federate = %federate, addr = %addr, kind = ?kind, "Clock sync sent");
        Ok(())
    }

    async fn send_stamped(&self, addr: SocketAddr, message: Message) -> Result<(), NetworkError> {
        let mut buf = BytesMut::with_capacity(9);
        encode(&message, &mut buf)?;
        self.socket.send_to(&buf, addr).await?;
        Ok(())
    }

    /// Forward every T3 as a `ClockSyncProbe` event until `shutdown` fires.
    pub async fn run_receiver(
        self,
        events: mpsc::UnboundedSender<Event>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let (len, addr) = tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP port unreachable from a departed federate
                        // surfaces here on some platforms.
                        debug!(error = %e, "UDP receive error");
                        continue;
                    }
                },
                _ = shutdown.changed() => {
                    info!("Shutting down clock sync socket");
                    return;
                }
            };

            let mut datagram = BytesMut::from(&buf[..len]);
            match decode(&mut datagram, Direction::ToRti) {
                Ok(Some(Message::ClockSyncT3 { federate })) => {
                    if events
                        .send(Event::ClockSyncProbe { federate, addr })
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(Some(other)) => {
                    warn!(from = %addr, message = other.type_name(), "Unexpected datagram ignored");
                }
                Ok(None) => debug!(from = %addr, len, "Truncated datagram ignored"),
                Err(e) => warn!(from = %addr, error = %e, "Malformed datagram ignored"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_t3_becomes_probe_event() {
        let socket = bind_udp("127.0.0.1", 0).await.unwrap();
        let rti_addr = socket.local_addr().unwrap();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(socket.run_receiver(events_tx, shutdown_rx));

        let federate = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut t3 = BytesMut::new();
        encode(
            &Message::ClockSyncT3 {
                federate: FederateId(3),
            },
            &mut t3,
        )
        .unwrap();
        federate.send_to(&t3, rti_addr).await.unwrap();

        match events_rx.recv().await.unwrap() {
            Event::ClockSyncProbe { federate: id, addr } => {
                assert_eq!(id, FederateId(3));
                assert_eq!(addr, federate.local_addr().unwrap());
            }
            other => panic!("unexpected event {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_t4_is_followed_by_probe() {
        let socket = bind_udp("127.0.0.1", 0).await.unwrap();
        let federate = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = federate.local_addr().unwrap();

        socket
            .send(FederateId(0), addr, ClockSyncKind::T4WithProbe)
            .await
            .unwrap();

        let mut buf = [0u8; MAX_DATAGRAM];
        let mut received = Vec::new();
        for _ in 0..2 {
            let (len, _) = federate.recv_from(&mut buf).await.unwrap();
            let mut datagram = BytesMut::from(&buf[..len]);
            received.push(decode(&mut datagram, Direction::FromRti).unwrap().unwrap());
        }
        match (&received[0], &received[1]) {
            (Message::ClockSyncT4(t4), Message::ClockSyncCodedProbe(probe)) => {
                assert!(probe >= t4)
            }
            other => panic!("unexpected datagrams {other:?}"),
        }
    }
}
