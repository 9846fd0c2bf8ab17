//! Connection tracking.

/// Opaque identifier for one accepted TCP connection.
///
/// The runner maintains a map of `ConnectionId` -> outbound channel.
/// This keeps socket ownership out of the sync state machine, which only
/// ever addresses connections by id.
///
/// # Example
///
/// ```ignore
/// // In the runner:
/// let connection = ConnectionId(self.next_connection_id);
/// self.next_connection_id += 1;
///
/// let (tx, rx) = mpsc::unbounded_channel();
/// self.connections.write().insert(connection, tx);
///
/// self.event_tx.send(Event::ConnectionOpened { connection, peer }).await;
///
/// // Later, when the state machine returns Action::Send:
/// if let Some(tx) = self.connections.read().get(&connection) {
///     let _ = tx.send(message);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Create a new connection ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}
