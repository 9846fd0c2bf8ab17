//! Tokio runner around the coordinator state machine.

use crate::network::connection::ConnectionTable;
use crate::network::listener::run_accept_loop;
use crate::network::{bind_listener, bind_udp, ClockSyncSocket, PortSelection};
use crate::NetworkError;
use rti_coordinator::{ClockSyncConfig, CoordinatorConfig, CoordinatorState};
use rti_core::{Action, Event, StateMachine};
use rti_types::constants::TCP_TIMEOUT;
use rti_types::FederationTopology;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, trace, warn};

/// Socket-level settings for a running RTI.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind, e.g. `0.0.0.0`.
    pub host: String,
    pub port: PortSelection,
    /// How long a new connection may take to send its join.
    pub tcp_timeout: Duration,
    pub clock_sync: ClockSyncConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: PortSelection::Scan,
            tcp_timeout: TCP_TIMEOUT,
            clock_sync: ClockSyncConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: PortSelection) -> Self {
        self.port = port;
        self
    }

    pub fn with_tcp_timeout(mut self, timeout: Duration) -> Self {
        self.tcp_timeout = timeout;
        self
    }

    pub fn with_clock_sync(mut self, clock_sync: ClockSyncConfig) -> Self {
        self.clock_sync = clock_sync;
        self
    }
}

/// Handle to an RTI started with [`start`].
#[derive(Debug)]
pub struct RunningRti {
    tcp_addr: SocketAddr,
    udp_addr: Option<SocketAddr>,
    shutdown: Arc<watch::Sender<bool>>,
    coordinator: JoinHandle<()>,
}

impl RunningRti {
    /// The bound TCP address federates connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    /// The clock-sync UDP address, if clock sync is enabled.
    pub fn udp_addr(&self) -> Option<SocketAddr> {
        self.udp_addr
    }

    /// Stop accepting and close every connection.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait until every federate has resigned or [`RunningRti::shutdown`]
    /// was called.
    pub async fn wait(self) -> Result<(), NetworkError> {
        self.coordinator
            .await
            .map_err(|e| NetworkError::TaskFailed(e.to_string()))
    }
}

/// Bind the RTI's sockets and start serving `topology`.
///
/// Returns once the sockets are bound; the RTI runs on spawned tasks.
#[instrument(skip_all, fields(federation = topology.federation_id()))]
pub async fn start(topology: FederationTopology, config: ServerConfig) -> Result<RunningRti, NetworkError> {
    let listener = bind_listener(&config.host, config.port).await?;
    let tcp_addr = listener.local_addr()?;

    let udp = if config.clock_sync.enabled {
        Some(bind_udp(&config.host, tcp_addr.port()).await?)
    } else {
        None
    };
    let udp_addr = udp.as_ref().map(ClockSyncSocket::local_addr).transpose()?;

    let mut coordinator_config = CoordinatorConfig::default().with_clock_sync(config.clock_sync.clone());
    if let Some(addr) = udp_addr {
        coordinator_config = coordinator_config.with_udp_port(addr.port());
    }
    info!(
        tcp = %tcp_addr,
        udp = ?udp_addr,
        federates = topology.num_federates(),
        "RTI listening"
    );
    let state = CoordinatorState::new(topology, coordinator_config);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let connections = ConnectionTable::new();

    tokio::spawn(run_accept_loop(
        listener,
        connections.clone(),
        events_tx.clone(),
        config.tcp_timeout,
        shutdown_rx.clone(),
    ));
    if let Some(udp) = &udp {
        tokio::spawn(udp.clone().run_receiver(events_tx.clone(), shutdown_rx.clone()));
        tokio::spawn(run_clock_sync_timer(
            config.clock_sync.period,
            events_tx.clone(),
            shutdown_rx.clone(),
        ));
    }
    drop(events_tx);

    let coordinator = tokio::spawn(run_coordinator(
        state,
        events_rx,
        connections,
        udp,
        Arc::clone(&shutdown_tx),
        shutdown_rx,
    ));

    Ok(RunningRti {
        tcp_addr,
        udp_addr,
        shutdown: shutdown_tx,
        coordinator,
    })
}

async fn run_clock_sync_timer(
    period: Duration,
    events: mpsc::UnboundedSender<Event>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nobody has joined yet.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if events.send(Event::ClockSyncTimer).is_err() {
                    return;
                }
            }
            _ = shutdown.changed() => return,
        }
    }
}

/// The single task that owns [`CoordinatorState`].
async fn run_coordinator(
    mut state: CoordinatorState,
    mut events: mpsc::UnboundedReceiver<Event>,
    connections: ConnectionTable,
    udp: Option<ClockSyncSocket>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let started = Instant::now();
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = shutdown.changed() => {
                info!("RTI shutdown requested");
                break;
            }
        };

        state.set_time(started.elapsed());
        trace!(event = event.type_name(), "Handling event");
        let mut finished = false;
        for action in state.handle(event) {
            match action {
                Action::Send {
                    connection,
                    message,
                } => {
                    connections.send(connection, message);
                }
                Action::CloseConnection { connection } => {
                    debug!(connection = %connection, "Closing connection");
                    connections.close(connection);
                }
                Action::SendClockSync {
                    federate,
                    addr,
                    kind,
                } => {
                    let Some(udp) = &udp else { continue };
                    if let Err(e) = udp.send(federate, addr, kind).await {
                        warn!(federate = %federate, addr = %addr, error = %e, "Clock sync send failed");
                    }
                }
                Action::FederationFinished => finished = true,
            }
        }
        if finished {
            info!("All federates resigned, RTI exiting");
            break;
        }
    }

    connections.close_all();
    let _ = shutdown_tx.send(true);
}
