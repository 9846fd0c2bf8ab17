//! Per-connection I/O tasks.
//!
//! Each accepted socket is split in two. The reader decodes messages and
//! forwards them to the coordinator as events. The writer drains an
//! unbounded FIFO, so the coordinator never waits on a slow federate and
//! messages to one federate leave in the order they were produced.

use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rti_core::{ConnectionId, Event};
use rti_messages::{Message, WireCodec};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// A command for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    Message(Message),
    /// Flush what is queued, then close the socket.
    Close,
}

/// Outbound channels of every live connection.
///
/// Shared between the accept loop, which inserts, and the coordinator task,
/// which sends and closes.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTable {
    inner: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, connection: ConnectionId, tx: mpsc::UnboundedSender<Outbound>) {
        self.inner.write().insert(connection, tx);
    }

    fn remove(&self, connection: ConnectionId) {
        self.inner.write().remove(&connection);
    }

    /// Queue `message` on `connection`. Returns false if it is gone.
    pub fn send(&self, connection: ConnectionId, message: Message) -> bool {
        match self.inner.read().get(&connection) {
            Some(tx) => tx.send(Outbound::Message(message)).is_ok(),
            None => {
                debug!(connection = %connection, message = message.type_name(), "Dropped message for closed connection");
                false
            }
        }
    }

    /// Close `connection` after its queued messages are written.
    pub fn close(&self, connection: ConnectionId) {
        if let Some(tx) = self.inner.write().remove(&connection) {
            let _ = tx.send(Outbound::Close);
        }
    }

    /// Close every connection.
    pub fn close_all(&self) {
        for (_, tx) in self.inner.write().drain() {
            let _ = tx.send(Outbound::Close);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// Register `stream` under `connection` and start its reader and writer.
pub fn spawn_connection(
    connection: ConnectionId,
    stream: TcpStream,
    connections: &ConnectionTable,
    events: mpsc::UnboundedSender<Event>,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();
    connections.insert(connection, tx);

    tokio::spawn(run_writer(connection, write_half, rx, closed.clone()));
    tokio::spawn(run_reader(
        connection,
        read_half,
        connections.clone(),
        events,
        closed,
    ));
}

async fn run_reader(
    connection: ConnectionId,
    read_half: OwnedReadHalf,
    connections: ConnectionTable,
    events: mpsc::UnboundedSender<Event>,
    closed: CancellationToken,
) {
    let mut framed = FramedRead::new(read_half, WireCodec::rti_side());
    loop {
        let next = tokio::select! {
            next = framed.next() => next,
            _ = closed.cancelled() => {
                trace!(connection = %connection, "Reader stopped by close");
                return;
            }
        };
        match next {
            Some(Ok(message)) => {
                trace!(connection = %connection, message = message.type_name(), "Received");
                if events
                    .send(Event::MessageReceived {
                        connection,
                        message,
                    })
                    .is_err()
                {
                    return;
                }
            }
            Some(Err(e)) if e.is_malformed() => {
                warn!(connection = %connection, error = %e, "Undecodable frame");
                // The table entry stays so the coordinator can still reject.
                if events
                    .send(Event::MalformedMessage {
                        connection,
                        reason: e.reject_reason(),
                    })
                    .is_ok()
                {
                    closed.cancelled().await;
                    return;
                }
                break;
            }
            Some(Err(e)) => {
                debug!(connection = %connection, error = %e, "Read failed");
                break;
            }
            None => {
                debug!(connection = %connection, "Peer closed connection");
                break;
            }
        }
    }
    connections.remove(connection);
    closed.cancel();
    let _ = events.send(Event::ConnectionLost { connection });
}

async fn run_writer(
    connection: ConnectionId,
    write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    closed: CancellationToken,
) {
    let mut framed = FramedWrite::new(write_half, WireCodec::rti_side());
    loop {
        let outbound = tokio::select! {
            biased;
            outbound = rx.recv() => outbound,
            _ = closed.cancelled() => None,
        };
        match outbound {
            Some(Outbound::Message(message)) => {
                if let Err(e) = framed.send(message).await {
                    warn!(connection = %connection, error = %e, "Write failed");
                    break;
                }
            }
            Some(Outbound::Close) | None => break,
        }
    }
    let _ = framed.close().await;
    closed.cancel();
}
