//! Configuration for a federate's connection to the RTI.

use rti_types::constants::{
    ADDRESS_QUERY_RETRY_INTERVAL, CONNECT_NUM_RETRIES, CONNECT_RETRY_INTERVAL,
    PORT_KNOCKING_RETRY_INTERVAL, PORT_RANGE_LIMIT, STARTING_PORT, TCP_TIMEOUT,
};
use rti_types::FederateId;
use std::time::Duration;

/// Configuration for [`crate::RtiClient`].
#[derive(Debug, Clone)]
pub struct FederateConfig {
    /// This federate's id.
    pub federate_id: FederateId,
    /// Federation to join.
    pub federation_id: String,
    /// Host running the RTI.
    pub rti_host: String,
    /// RTI port. `None` scans the port range from [`STARTING_PORT`].
    pub rti_port: Option<u16>,
    /// Pause between rounds of connection attempts.
    pub connect_retry_interval: Duration,
    /// Rounds of connection attempts before giving up.
    pub connect_retries: u32,
    /// Pause between probing consecutive ports.
    pub port_knocking_interval: Duration,
    /// Timeout for connecting and for the join reply.
    pub tcp_timeout: Duration,
    /// Pause before re-asking for an address the RTI did not know.
    pub address_query_retry_interval: Duration,
    /// Address queries before giving up.
    pub address_query_retries: u32,
}

impl FederateConfig {
    /// Defaults for joining `federation_id` as `federate_id` on localhost.
    pub fn new(federate_id: FederateId, federation_id: impl Into<String>) -> Self {
        Self {
            federate_id,
            federation_id: federation_id.into(),
            rti_host: "localhost".to_string(),
            rti_port: None,
            connect_retry_interval: CONNECT_RETRY_INTERVAL,
            connect_retries: CONNECT_NUM_RETRIES,
            port_knocking_interval: PORT_KNOCKING_RETRY_INTERVAL,
            tcp_timeout: TCP_TIMEOUT,
            address_query_retry_interval: ADDRESS_QUERY_RETRY_INTERVAL,
            address_query_retries: CONNECT_NUM_RETRIES,
        }
    }

    /// Set the RTI host.
    pub fn with_rti_host(mut self, host: impl Into<String>) -> Self {
        self.rti_host = host.into();
        self
    }

    /// Connect to a known RTI port instead of scanning.
    pub fn with_rti_port(mut self, port: u16) -> Self {
        self.rti_port = Some(port);
        self
    }

    /// Set the number of connection rounds and the pause between them.
    pub fn with_connect_retries(mut self, retries: u32, interval: Duration) -> Self {
        self.connect_retries = retries;
        self.connect_retry_interval = interval;
        self
    }

    /// Set the number of address queries and the pause between them.
    pub fn with_address_query_retries(mut self, retries: u32, interval: Duration) -> Self {
        self.address_query_retries = retries;
        self.address_query_retry_interval = interval;
        self
    }

    /// Set the TCP timeout.
    pub fn with_tcp_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_timeout = timeout;
        self
    }

    /// Ports to try, in order, on each connection round.
    pub fn candidate_ports(&self) -> Vec<u16> {
        match self.rti_port {
            Some(port) => vec![port],
            None => (0..PORT_RANGE_LIMIT)
                .filter_map(|offset| STARTING_PORT.checked_add(offset))
                .collect(),
        }
    }
}
