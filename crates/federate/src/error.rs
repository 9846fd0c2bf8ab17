//! Error types for the federate client.

use rti_messages::{CodecError, RejectReason};
use std::io;
use thiserror::Error;

/// Errors from talking to the RTI or to peer federates.
#[derive(Debug, Error)]
pub enum FederateError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Malformed bytes on the wire.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The RTI (or a peer) refused us.
    #[error("Rejected: {0}")]
    Rejected(RejectReason),

    /// No RTI for this federation answered within the retry budget.
    #[error("No RTI for federation {federation_id} found on {host} after {attempts} attempts")]
    RtiNotFound {
        host: String,
        federation_id: String,
        attempts: u32,
    },

    /// The other side closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A message arrived that makes no sense at this point.
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(&'static str),

    /// Operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// The queried federate never advertised an address.
    #[error("Address of federate {0} still unknown after retries")]
    AddressUnknown(u16),
}

/// Result type for federate operations.
pub type Result<T> = std::result::Result<T, FederateError>;
