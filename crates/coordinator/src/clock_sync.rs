//! RTI side of clock synchronization.
//!
//! Each cycle is `trials` exchanges with one federate:
//!
//! ```text
//! RTI                       Federate
//!  │ ── T1(t1) ──────────────▶ │  records T2 on receipt
//!  │ ◀─────────────── T3(id) ─ │
//!  │ ── T4(t4) ──────────────▶ │
//!  │ ── CODED_PROBE(t4') ────▶ │  checks purity, estimates offset
//! ```
//!
//! The runner stamps T1, T4 and the probe when it sends them. The offset
//! estimate is computed on the federate side.

use crate::ClockSyncConfig;
use rti_core::{Action, ClockSyncKind};
use rti_types::FederateId;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Cycle {
    /// Exchanges left after the one in flight.
    remaining: u32,
    /// When the in-flight T1 was sent.
    sent_at: Duration,
}

/// Tracks in-flight clock-sync cycles per federate.
#[derive(Debug, Clone)]
pub struct ClockSyncScheduler {
    config: ClockSyncConfig,
    cycles: Vec<Option<Cycle>>,
}

impl ClockSyncScheduler {
    pub fn new(config: ClockSyncConfig, num_federates: usize) -> Self {
        Self {
            config,
            cycles: vec![None; num_federates],
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether a cycle with `federate` is in flight.
    pub fn in_cycle(&self, federate: FederateId) -> bool {
        self.cycles
            .get(federate.index())
            .is_some_and(|cycle| cycle.is_some())
    }

    /// Periodic timer: start a cycle with every target not already in one.
    ///
    /// A cycle that has waited longer than the UDP timeout is abandoned and
    /// restarted.
    pub fn on_timer(
        &mut self,
        now: Duration,
        targets: impl IntoIterator<Item = (FederateId, SocketAddr)>,
    ) -> Vec<Action> {
        if !self.config.enabled || self.config.trials == 0 {
            return vec![];
        }
        let mut actions = Vec::new();
        for (federate, addr) in targets {
            let Some(slot) = self.cycles.get_mut(federate.index()) else {
                continue;
            };
            if let Some(cycle) = slot {
                if now.saturating_sub(cycle.sent_at) <= self.config.udp_timeout {
                    continue;
                }
                warn!(federate = %federate, "Clock sync cycle timed out, restarting");
            }
            *slot = Some(Cycle {
                remaining: self.config.trials - 1,
                sent_at: now,
            });
            actions.push(Action::SendClockSync {
                federate,
                addr,
                kind: ClockSyncKind::T1,
            });
        }
        actions
    }

    /// A T3 arrived from `federate`: answer with T4 and the coded probe,
    /// then start the next exchange of the cycle if any are left.
    pub fn on_probe(&mut self, federate: FederateId, addr: SocketAddr, now: Duration) -> Vec<Action> {
        if !self.config.enabled {
            return vec![];
        }
        let mut actions = vec![Action::SendClockSync {
            federate,
            addr,
            kind: ClockSyncKind::T4WithProbe,
        }];

        let Some(slot) = self.cycles.get_mut(federate.index()) else {
            return actions;
        };
        match *slot {
            Some(cycle) if now.saturating_sub(cycle.sent_at) > self.config.udp_timeout => {
                warn!(federate = %federate, "Late T3, clock sync cycle abandoned");
                *slot = None;
            }
            Some(cycle) if cycle.remaining > 0 => {
                *slot = Some(Cycle {
                    remaining: cycle.remaining - 1,
                    sent_at: now,
                });
                actions.push(Action::SendClockSync {
                    federate,
                    addr,
                    kind: ClockSyncKind::T1,
                });
            }
            Some(_) => {
                debug!(federate = %federate, "Clock sync cycle complete");
                *slot = None;
            }
            None => {
                debug!(federate = %federate, "Unsolicited T3 answered");
            }
        }
        actions
    }

    /// Drop any cycle with a departed federate.
    pub fn forget(&mut self, federate: FederateId) {
        if let Some(slot) = self.cycles.get_mut(federate.index()) {
            *slot = None;
        }
    }
}
