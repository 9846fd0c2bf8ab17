//! Binding and accepting on the RTI's TCP port.

use crate::network::connection::{spawn_connection, ConnectionTable};
use crate::NetworkError;
use rti_core::{ConnectionId, Event};
use rti_types::constants::{PORT_RANGE_LIMIT, STARTING_PORT};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// How the RTI picks its TCP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSelection {
    /// Try `STARTING_PORT` upwards and take the first free one. Federates
    /// scan the same range.
    Scan,
    /// Bind exactly this port. Port 0 lets the OS choose.
    Fixed(u16),
}

impl PortSelection {
    /// Port 0 in configuration files means "scan".
    pub fn from_config(port: u16) -> Self {
        if port == 0 {
            PortSelection::Scan
        } else {
            PortSelection::Fixed(port)
        }
    }
}

/// Bind the TCP listener on `host`.
pub async fn bind_listener(host: &str, selection: PortSelection) -> Result<TcpListener, NetworkError> {
    match selection {
        PortSelection::Fixed(port) => {
            TcpListener::bind((host, port))
                .await
                .map_err(|source| NetworkError::Bind {
                    addr: format!("{host}:{port}"),
                    source,
                })
        }
        PortSelection::Scan => {
            let last = STARTING_PORT.saturating_add(PORT_RANGE_LIMIT);
            for port in STARTING_PORT..=last {
                match TcpListener::bind((host, port)).await {
                    Ok(listener) => return Ok(listener),
                    Err(e) => debug!(port, error = %e, "Port taken, trying next"),
                }
            }
            Err(NetworkError::NoFreePort {
                host: host.to_string(),
                first: STARTING_PORT,
                last,
            })
        }
    }
}

/// Accept federates until `shutdown` fires.
///
/// Every accepted socket gets a fresh [`ConnectionId`], a reader and a writer
/// task, a `ConnectionOpened` event, and a handshake timer that reports
/// `HandshakeTimedOut` after `tcp_timeout`. The coordinator ignores the
/// timer if the federate has joined by then.
pub async fn run_accept_loop(
    listener: TcpListener,
    connections: ConnectionTable,
    events: mpsc::UnboundedSender<Event>,
    tcp_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_id = 0u64;
    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept error");
                    continue;
                }
            },
            _ = shutdown.changed() => {
                info!("Shutting down listener");
                break;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            warn!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
        }
        let connection = ConnectionId::new(next_id);
        next_id += 1;
        debug!(connection = %connection, peer = %peer, "Accepted connection");

        // Opened must reach the coordinator before anything the reader sees.
        if events
            .send(Event::ConnectionOpened { connection, peer })
            .is_err()
        {
            break;
        }
        spawn_connection(connection, stream, &connections, events.clone());

        let timer_events = events.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tcp_timeout).await;
            let _ = timer_events.send(Event::HandshakeTimedOut { connection });
        });
    }
}
