//! RTI configuration file.
//!
//! ```toml
//! federation_id = "demo"
//!
//! [network]
//! host = "0.0.0.0"
//! port = 0            # 0 = scan from 15045
//!
//! [clock_sync]
//! enabled = true
//!
//! [[federates]]
//! id = 0
//!
//! [[federates]]
//! id = 1
//! upstream = [{ id = 0, delay_ns = 0 }]
//! ```

use crate::network::PortSelection;
use crate::runner::ServerConfig;
use anyhow::{bail, Context, Result};
use rti_coordinator::ClockSyncConfig;
use rti_types::constants::{CLOCK_SYNC_PERIOD, CLOCK_SYNC_TRIALS, TCP_TIMEOUT, UDP_TIMEOUT};
use rti_types::{FederateId, FederationTopology, Interval};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level RTI configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RtiConfig {
    pub federation_id: String,

    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub clock_sync: ClockSyncSection,

    /// One entry per federate; ids must be exactly `0..N`.
    #[serde(default)]
    pub federates: Vec<FederateEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkSection {
    pub host: String,
    pub port: u16,
    pub tcp_timeout_ms: u64,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            tcp_timeout_ms: TCP_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockSyncSection {
    pub enabled: bool,
    pub period_ms: u64,
    pub trials: u32,
    pub udp_timeout_ms: u64,
}

impl Default for ClockSyncSection {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: CLOCK_SYNC_PERIOD.as_millis() as u64,
            trials: CLOCK_SYNC_TRIALS,
            udp_timeout_ms: UDP_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FederateEntry {
    pub id: u16,
    #[serde(default)]
    pub upstream: Vec<UpstreamEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpstreamEntry {
    pub id: u16,
    #[serde(default)]
    pub delay_ns: i64,
}

impl RtiConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("failed to parse {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Build and validate the federation graph.
    pub fn topology(&self) -> Result<FederationTopology> {
        let n = self.federates.len();
        let mut seen = BTreeSet::new();
        for entry in &self.federates {
            if usize::from(entry.id) >= n {
                bail!(
                    "federate id {} out of range: ids must be 0..{} for {} federates",
                    entry.id,
                    n,
                    n
                );
            }
            if !seen.insert(entry.id) {
                bail!("federate {} listed twice", entry.id);
            }
        }

        let mut builder = FederationTopology::builder(self.federation_id.clone(), n);
        for entry in &self.federates {
            for upstream in &entry.upstream {
                builder = builder.connect(
                    FederateId(upstream.id),
                    FederateId(entry.id),
                    Interval::from_nanos(upstream.delay_ns),
                );
            }
        }
        builder.build().context("invalid federation topology")
    }

    /// Socket and clock-sync settings for [`crate::start`].
    pub fn server_config(&self) -> ServerConfig {
        let clock_sync = ClockSyncConfig {
            enabled: self.clock_sync.enabled,
            period: Duration::from_millis(self.clock_sync.period_ms),
            trials: self.clock_sync.trials,
            udp_timeout: Duration::from_millis(self.clock_sync.udp_timeout_ms),
        };
        ServerConfig::default()
            .with_host(self.network.host.clone())
            .with_port(PortSelection::from_config(self.network.port))
            .with_tcp_timeout(Duration::from_millis(self.network.tcp_timeout_ms))
            .with_clock_sync(clock_sync)
    }
}
