//! Socket plumbing for the RTI.
//!
//! - [`listener`]: binding the TCP server port and accepting federates
//! - [`connection`]: per-connection reader/writer tasks and the table the
//!   coordinator task sends through
//! - [`udp`]: the clock-sync datagram socket

pub mod connection;
pub mod listener;
pub mod udp;

pub use connection::{ConnectionTable, Outbound};
pub use listener::{bind_listener, PortSelection};
pub use udp::{bind_udp, ClockSyncSocket};
