//! Round-trip-time estimator
//!
//! Sends a timestamped probe every interval and keeps only the latest
//! measurement. Responses are not matched to probes: a late response is
//! measured against the most recent probe's send time and simply overwrites
//! the stored value. RTT is diagnostic input, not a safety-critical one.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tandem_common::WireMessage;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Latest measured round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    pub value_ms: i64,
    /// Wall-clock time of the measurement (epoch ms)
    pub measured_at_ms: i64,
}

/// Probe scheduler and single-sample store
pub struct RttEstimator {
    clock: Arc<dyn Clock>,
    /// Last requested probe period; reused when probing is restarted
    interval: Duration,
    probe_timer: Option<Interval>,
    last_probe_sent_ms: Option<i64>,
    sample: Option<RttSample>,
}

impl RttEstimator {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration) -> Self {
        Self {
            clock,
            interval,
            probe_timer: None,
            last_probe_sent_ms: None,
            sample: None,
        }
    }

    /// Start (or restart) probing; the first probe is due immediately
    pub fn start_probing(&mut self, interval: Duration) {
        self.interval = interval;
        let mut timer = time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.probe_timer = Some(timer);
        info!("RTT probing started ({}ms interval)", interval.as_millis());
    }

    /// Start again with the most recently requested interval
    pub fn restart_probing(&mut self) {
        self.start_probing(self.interval);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn stop_probing(&mut self) {
        if self.probe_timer.take().is_some() {
            info!("RTT probing stopped");
        }
    }

    pub fn is_probing(&self) -> bool {
        self.probe_timer.is_some()
    }

    /// Drop the measurement and the outstanding probe (new session)
    pub fn reset(&mut self) {
        self.last_probe_sent_ms = None;
        self.sample = None;
    }

    /// Latest RTT in milliseconds
    pub fn current_rtt(&self) -> Option<i64> {
        self.sample.map(|s| s.value_ms)
    }

    pub fn latest_sample(&self) -> Option<RttSample> {
        self.sample
    }

    /// Resolves when the next probe is due; never resolves while stopped
    ///
    /// Cancel-safe; used as a `select!` branch.
    pub async fn probe_due(&mut self) {
        match self.probe_timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => pending::<()>().await,
        }
    }

    /// Build the next probe and remember when it was sent
    pub fn make_probe(&mut self) -> WireMessage {
        let sent_at_ms = self.clock.now_ms();
        self.last_probe_sent_ms = Some(sent_at_ms);
        WireMessage::Probe { sent_at_ms }
    }

    /// Answer a peer's probe
    pub fn respond_to(sent_at_ms: i64) -> WireMessage {
        WireMessage::ProbeResponse { sent_at_ms }
    }

    /// Record a response; returns the new RTT if one was stored
    ///
    /// The RTT is measured from our most recent probe. The echoed timestamp is
    /// only used when no probe was sent in this session (e.g. after a reset).
    pub fn on_response(&mut self, echoed_sent_at_ms: i64) -> Option<i64> {
        let now_ms = self.clock.now_ms();
        let sent_at_ms = self.last_probe_sent_ms.unwrap_or(echoed_sent_at_ms);
        let rtt = now_ms.saturating_sub(sent_at_ms);
        if rtt < 0 {
            warn!("Discarding negative RTT ({}ms)", rtt);
            return None;
        }
        self.sample = Some(RttSample {
            value_ms: rtt,
            measured_at_ms: now_ms,
        });
        debug!("RTT measured: {}ms", rtt);
        Some(rtt)
    }
}
