//! RTI server binary
//!
//! Coordinates logical time for a federation described by a TOML config
//! file. Exits once every federate has resigned.

use anyhow::Context;
use clap::Parser;
use rti_production::network::PortSelection;
use rti_production::telemetry::{self, LogFormat};
use rti_production::{start, RtiConfig};
use std::path::PathBuf;
use tracing::info;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "rti")]
#[command(about = "Runtime infrastructure for federated logical-time execution")]
#[command(version)]
struct Cli {
    /// Path to the federation config file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the federation id from the config file
    #[arg(long)]
    federation_id: Option<String>,

    /// Override the TCP port (0 scans from 15045)
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable clock synchronization
    #[arg(long)]
    no_clock_sync: bool,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };
    telemetry::init(cli.log_level, format)?;

    let mut config = RtiConfig::load(&cli.config)?;
    if let Some(federation_id) = cli.federation_id {
        config.federation_id = federation_id;
    }
    let topology = config.topology()?;

    let mut server = config.server_config();
    if let Some(port) = cli.port {
        server = server.with_port(PortSelection::from_config(port));
    }
    if cli.no_clock_sync {
        server.clock_sync.enabled = false;
    }

    let rti = start(topology, server)
        .await
        .context("failed to start RTI")?;

    tokio::select! {
        result = rti.wait() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    Ok(())
}
