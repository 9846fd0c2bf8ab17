//! Federate side of clock synchronization.
//!
//! For one exchange, with `t*` read on the RTI clock and `T2`/`T3` on ours:
//!
//! ```text
//! round trip  = (t4 - t1) - (T3 - T2)
//! clock error = t1 + round_trip / 2 - T2
//! ```
//!
//! The coded probe checks that the exchange was not disturbed: the gap
//! between receiving T4 and the probe must match the gap between the RTI
//! sending them, within the guard band. Disturbed samples are dropped.
//! After `trials` good samples the mean error, attenuated, is applied to
//! the offset.

use crate::{FederateError, Result};
use bytes::BytesMut;
use rti_messages::{decode, encode, Direction, Message};
use rti_types::constants::{CLOCK_SYNC_ATTENUATION, CLOCK_SYNC_GUARD_BAND, CLOCK_SYNC_TRIALS};
use rti_types::{physical_time_ns, FederateId, Interval};
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What happened to the current sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Not a complete exchange (missing T1/T4); nothing learned.
    Incomplete,
    /// Failed the purity check.
    Discarded,
    /// Counted towards the current round.
    Accepted { clock_error: i64 },
    /// Completed a round; the offset moved by `adjustment`.
    OffsetAdjusted { adjustment: i64 },
}

#[derive(Debug, Clone, Copy, Default)]
struct Exchange {
    t1: Option<i64>,
    t2: i64,
    t3: Option<i64>,
    t4: Option<i64>,
    /// Local receipt of T4.
    r4: i64,
}

/// Estimates the offset between this federate's clock and the RTI's.
///
/// All local times passed in are raw readings; the estimator applies its
/// own offset.
#[derive(Debug, Clone)]
pub struct ClockSyncEstimator {
    guard_band: Interval,
    trials: u32,
    attenuation: i64,
    offset: i64,
    exchange: Exchange,
    error_sum: i64,
    samples: u32,
    round_trip: Option<i64>,
}

impl Default for ClockSyncEstimator {
    fn default() -> Self {
        Self::new(CLOCK_SYNC_GUARD_BAND, CLOCK_SYNC_TRIALS, CLOCK_SYNC_ATTENUATION)
    }
}

impl ClockSyncEstimator {
    pub fn new(guard_band: Interval, trials: u32, attenuation: i64) -> Self {
        Self {
            guard_band,
            trials: trials.max(1),
            attenuation: attenuation.max(1),
            offset: 0,
            exchange: Exchange::default(),
            error_sum: 0,
            samples: 0,
            round_trip: None,
        }
    }

    /// Offset to add to the local clock to approximate the RTI's.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Most recent accepted round-trip estimate.
    pub fn round_trip(&self) -> Option<i64> {
        self.round_trip
    }

    /// A local clock reading corrected by the current offset.
    pub fn corrected(&self, local: i64) -> i64 {
        local.saturating_add(self.offset)
    }

    /// T1 arrived at local time `received_at`. Starts a new exchange.
    pub fn on_t1(&mut self, t1: i64, received_at: i64) {
        self.exchange = Exchange {
            t1: Some(t1),
            t2: self.corrected(received_at),
            ..Default::default()
        };
    }

    /// Our T3 left at local time `sent_at`.
    pub fn on_t3_sent(&mut self, sent_at: i64) {
        self.exchange.t3 = Some(self.corrected(sent_at));
    }

    /// T4 arrived at local time `received_at`.
    pub fn on_t4(&mut self, t4: i64, received_at: i64) {
        self.exchange.t4 = Some(t4);
        self.exchange.r4 = self.corrected(received_at);
    }

    /// The coded probe carrying `probe` arrived at local time `received_at`.
    pub fn on_coded_probe(&mut self, probe: i64, received_at: i64) -> SampleOutcome {
        let exchange = std::mem::take(&mut self.exchange);
        let (Some(t1), Some(t3), Some(t4)) = (exchange.t1, exchange.t3, exchange.t4) else {
            return SampleOutcome::Incomplete;
        };

        let receive_gap = self.corrected(received_at) - exchange.r4;
        let send_gap = probe - t4;
        if (receive_gap - send_gap).abs() > self.guard_band.as_nanos() {
            warn!(
                receive_gap,
                send_gap,
                guard_band = %self.guard_band,
                "Clock sync sample discarded"
            );
            return SampleOutcome::Discarded;
        }

        let round_trip = (t4 - t1) - (t3 - exchange.t2);
        let clock_error = t1 + round_trip / 2 - exchange.t2;
        self.round_trip = Some(round_trip);
        self.error_sum += clock_error;
        self.samples += 1;
        debug!(clock_error, round_trip, samples = self.samples, "Clock sync sample accepted");

        if self.samples < self.trials {
            return SampleOutcome::Accepted { clock_error };
        }

        let adjustment = self.error_sum / i64::from(self.samples) / self.attenuation;
        self.offset += adjustment;
        self.error_sum = 0;
        self.samples = 0;
        info!(adjustment, offset = self.offset, "Clock offset adjusted");
        SampleOutcome::OffsetAdjusted { adjustment }
    }
}

/// Answer the RTI's clock-sync datagrams on `socket` until `shutdown`.
///
/// Sends an initial T3 so the RTI learns this endpoint, then replies to
/// every T1 with a T3 and feeds T4 and the coded probe into `estimator`.
/// The current offset is published on `offset_tx`.
pub async fn run_udp_clock_sync(
    socket: UdpSocket,
    rti: SocketAddr,
    federate: FederateId,
    mut estimator: ClockSyncEstimator,
    offset_tx: watch::Sender<i64>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<ClockSyncEstimator> {
    let mut t3 = BytesMut::new();
    encode(&Message::ClockSyncT3 { federate }, &mut t3)?;
    socket.send_to(&t3, rti).await?;

    let mut buf = vec![0u8; 64];
    loop {
        let (len, from) = tokio::select! {
            received = socket.recv_from(&mut buf) => received?,
            _ = shutdown.changed() => return Ok(estimator),
        };
        let received_at = physical_time_ns();
        if from.ip() != rti.ip() {
            debug!(from = %from, "Datagram from unknown sender ignored");
            continue;
        }

        let mut datagram = BytesMut::from(&buf[..len]);
        let message = match decode(&mut datagram, Direction::FromRti) {
            Ok(Some(message)) => message,
            Ok(None) => {
                debug!(len, "Truncated clock sync datagram ignored");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "Malformed clock sync datagram ignored");
                continue;
            }
        };

        match message {
            Message::ClockSyncT1(t1) => {
                estimator.on_t1(t1, received_at);
                estimator.on_t3_sent(physical_time_ns());
                socket.send_to(&t3, from).await?;
            }
            Message::ClockSyncT4(t4) => estimator.on_t4(t4, received_at),
            Message::ClockSyncCodedProbe(probe) => {
                if let SampleOutcome::OffsetAdjusted { .. } =
                    estimator.on_coded_probe(probe, received_at)
                {
                    let _ = offset_tx.send(estimator.offset());
                }
            }
            other => return Err(FederateError::UnexpectedMessage(other.type_name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    /// RTI clock runs `skew` ahead of ours; one-way delay is `delay`.
    fn exchange(
        estimator: &mut ClockSyncEstimator,
        start: i64,
        skew: i64,
        delay: i64,
        probe_jitter: i64,
    ) -> SampleOutcome {
        let t1 = start + skew;
        estimator.on_t1(t1, start + delay);
        estimator.on_t3_sent(start + delay + 10);
        let t4 = start + 2 * delay + 10 + skew;
        estimator.on_t4(t4, start + 3 * delay + 10);
        let probe = t4 + 1_000;
        estimator.on_coded_probe(probe, start + 3 * delay + 10 + 1_000 + probe_jitter)
    }

    #[traced_test]
    #[test]
    fn test_clean_sample_estimates_skew() {
        let mut estimator = ClockSyncEstimator::new(Interval::from_micros(100), 10, 1);
        let outcome = exchange(&mut estimator, 1_000_000, 5_000, 200, 0);
        assert_eq!(outcome, SampleOutcome::Accepted { clock_error: 5_000 });
        assert_eq!(estimator.round_trip(), Some(400));
    }

    #[traced_test]
    #[test]
    fn test_jittery_sample_discarded_without_offset_change() {
        let mut estimator = ClockSyncEstimator::new(Interval::from_micros(100), 1, 1);
        let outcome = exchange(&mut estimator, 1_000_000, 5_000, 200, 150_000);
        assert_eq!(outcome, SampleOutcome::Discarded);
        assert_eq!(estimator.offset(), 0);

        // The next exchange is unaffected by the discarded one.
        let outcome = exchange(&mut estimator, 2_000_000, 5_000, 200, 0);
        assert_eq!(outcome, SampleOutcome::OffsetAdjusted { adjustment: 5_000 });
        assert_eq!(estimator.offset(), 5_000);
    }

    #[traced_test]
    #[test]
    fn test_offset_applied_after_trials_with_attenuation() {
        let mut estimator = ClockSyncEstimator::new(Interval::from_micros(100), 3, 10);
        for i in 0..2 {
            let outcome = exchange(&mut estimator, 1_000_000 * (i + 1), 10_000, 200, 0);
            assert!(matches!(outcome, SampleOutcome::Accepted { .. }));
        }
        let outcome = exchange(&mut estimator, 3_000_000, 10_000, 200, 0);
        assert_eq!(outcome, SampleOutcome::OffsetAdjusted { adjustment: 1_000 });
        assert_eq!(estimator.corrected(0), 1_000);
    }

    #[traced_test]
    #[test]
    fn test_probe_without_exchange_is_incomplete() {
        let mut estimator = ClockSyncEstimator::default();
        assert_eq!(estimator.on_coded_probe(1, 1), SampleOutcome::Incomplete);
    }
}
