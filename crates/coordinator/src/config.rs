//! Coordinator configuration.

use rti_types::constants::{CLOCK_SYNC_PERIOD, CLOCK_SYNC_TRIALS, UDP_TIMEOUT};
use std::time::Duration;

/// Configuration for the RTI side of clock synchronization.
#[derive(Debug, Clone)]
pub struct ClockSyncConfig {
    /// Whether the RTI runs clock sync at all.
    ///
    /// When disabled, the join ACK advertises no UDP port and T3 probes are
    /// ignored.
    pub enabled: bool,

    /// Time between periodic cycles.
    pub period: Duration,

    /// T1/T3/T4 exchanges per cycle.
    pub trials: u32,

    /// A cycle whose federate does not answer within this is abandoned.
    pub udp_timeout: Duration,
}

impl Default for ClockSyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period: CLOCK_SYNC_PERIOD,
            trials: CLOCK_SYNC_TRIALS,
            udp_timeout: UDP_TIMEOUT,
        }
    }
}

impl ClockSyncConfig {
    /// A config with clock sync turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Configuration for [`crate::CoordinatorState`].
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// UDP port of the clock-sync socket, sent in every join ACK.
    ///
    /// Only known after the runner has bound the socket.
    pub udp_port: Option<u16>,

    /// Clock synchronization settings.
    pub clock_sync: ClockSyncConfig,
}

impl CoordinatorConfig {
    /// Set the advertised clock-sync UDP port.
    pub fn with_udp_port(mut self, port: u16) -> Self {
        self.udp_port = Some(port);
        self
    }

    /// Replace the clock-sync settings.
    pub fn with_clock_sync(mut self, clock_sync: ClockSyncConfig) -> Self {
        self.clock_sync = clock_sync;
        self
    }

    /// The UDP port to put in join ACKs.
    pub fn advertised_udp_port(&self) -> Option<u16> {
        if self.clock_sync.enabled {
            self.udp_port
        } else {
            None
        }
    }
}
