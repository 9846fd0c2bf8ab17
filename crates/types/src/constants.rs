//! Protocol defaults shared by the RTI and federates.

use crate::Interval;
use std::time::Duration;

/// First port the RTI (and federate socket servers) try to bind.
pub const STARTING_PORT: u16 = 15045;

/// Number of consecutive ports tried above [`STARTING_PORT`].
pub const PORT_RANGE_LIMIT: u16 = 1024;

/// Timeout for TCP operations, including completing the join handshake.
pub const TCP_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a UDP clock-sync exchange.
pub const UDP_TIMEOUT: Duration = Duration::from_secs(1);

/// Time between a federate's attempts to connect to the RTI.
pub const CONNECT_RETRY_INTERVAL: Duration = Duration::from_secs(2);

/// Bound on connection attempts (about 16 minutes at the default interval).
pub const CONNECT_NUM_RETRIES: u32 = 500;

/// Wait before re-asking the RTI for an address it did not know yet.
pub const ADDRESS_QUERY_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Wait between probing consecutive ports while looking for the RTI.
pub const PORT_KNOCKING_RETRY_INTERVAL: Duration = Duration::from_micros(10);

/// Offset added to the largest proposed start time.
pub const DELAY_START: Interval = Interval::from_secs(1);

/// Maximum tolerated difference between the coded-probe receive gap and its
/// send gap for a clock-sync sample to count as pure.
pub const CLOCK_SYNC_GUARD_BAND: Interval = Interval::from_micros(100);

/// Time between periodic clock-sync cycles.
pub const CLOCK_SYNC_PERIOD: Duration = Duration::from_secs(5);

/// Exchanges per clock-sync cycle.
pub const CLOCK_SYNC_TRIALS: u32 = 10;

/// Divisor applied to the averaged clock error before it is applied.
pub const CLOCK_SYNC_ATTENUATION: i64 = 10;

/// Length of the fixed-size IPv4 text field in address replies.
pub const INET_ADDRSTRLEN: usize = 16;

/// Largest application payload accepted on the wire.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;
