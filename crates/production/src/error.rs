//! Error types for the production runner.

use rti_messages::CodecError;
use std::io;
use thiserror::Error;

/// Errors from binding sockets or running the RTI's I/O tasks.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// IO error during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Every port in the scanned range was taken.
    #[error("No free port on {host} in {first}..={last}")]
    NoFreePort { host: String, first: u16, last: u16 },

    /// Binding a configured address failed.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Encoding a datagram failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// A runner task panicked or was aborted.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}
