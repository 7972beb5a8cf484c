//! Drift correction engine
//!
//! Reconciles the local playback position against a position reported by the
//! host. The decision has three tiers by absolute drift:
//!
//! | drift                       | decision                                   |
//! |-----------------------------|--------------------------------------------|
//! | > hard threshold (0.6s)     | HardSeek to the expected position          |
//! | > nudge threshold (0.1s)    | Nudge: rate x1.04 (behind) / x0.96 (ahead) |
//! | otherwise                   | NoOp                                       |
//!
//! A nudge lasts a fixed period (1500ms) and then restores the rate it
//! replaced. At most one nudge is active; a new nudge or a hard seek replaces
//! it. TimeSync evaluations are throttled to one per 200ms.
//!
//! Engine command failures are returned to the caller unchanged; nothing is
//! retried here.

use std::sync::Arc;
use tandem_common::time::{elapsed_sec, sec_to_ms};
use tandem_common::CorrectionKind;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{DelayCompensation, SyncConfig};
use crate::error::Result;
use crate::player::{PlaybackEngine, PlaybackSnapshot};

/// Which host event the remote position came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionMode {
    Play,
    Pause,
    Seek,
    TimeSync,
}

/// Remote position plus the playback state the host wants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionRequest {
    pub remote_position_sec: f64,
    pub remote_timestamp_ms: i64,
    pub mode: CorrectionMode,
    /// Desired play state, if the event expresses one
    pub playing: Option<bool>,
    /// Desired base rate, if the event carries one
    pub rate: Option<f32>,
}

impl CorrectionRequest {
    pub fn play(position_sec: f64, timestamp_ms: i64, rate: f32) -> Self {
        Self {
            remote_position_sec: position_sec,
            remote_timestamp_ms: timestamp_ms,
            mode: CorrectionMode::Play,
            playing: Some(true),
            rate: Some(rate),
        }
    }

    pub fn pause(position_sec: f64, timestamp_ms: i64) -> Self {
        Self {
            remote_position_sec: position_sec,
            remote_timestamp_ms: timestamp_ms,
            mode: CorrectionMode::Pause,
            playing: Some(false),
            rate: None,
        }
    }

    pub fn seek(position_sec: f64, timestamp_ms: i64) -> Self {
        Self {
            remote_position_sec: position_sec,
            remote_timestamp_ms: timestamp_ms,
            mode: CorrectionMode::Seek,
            playing: None,
            rate: None,
        }
    }

    pub fn time_sync(position_sec: f64, timestamp_ms: i64, is_playing: bool) -> Self {
        Self {
            remote_position_sec: position_sec,
            remote_timestamp_ms: timestamp_ms,
            mode: CorrectionMode::TimeSync,
            playing: Some(is_playing),
            rate: None,
        }
    }

    /// The host's timeline is not moving (paused, or a heartbeat from a paused host)
    fn is_stationary(&self) -> bool {
        self.mode == CorrectionMode::Pause || self.playing == Some(false)
    }
}

/// Decision for one evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    NoOp { drift_sec: f64 },
    Nudge { rate: f32, drift_sec: f64 },
    HardSeek { target_sec: f64, drift_sec: f64 },
}

impl Correction {
    pub fn kind(&self) -> CorrectionKind {
        match self {
            Correction::NoOp { .. } => CorrectionKind::NoOp,
            Correction::Nudge { .. } => CorrectionKind::Nudge,
            Correction::HardSeek { .. } => CorrectionKind::HardSeek,
        }
    }

    /// Signed drift: expected minus local, seconds
    pub fn drift_sec(&self) -> f64 {
        match self {
            Correction::NoOp { drift_sec }
            | Correction::Nudge { drift_sec, .. }
            | Correction::HardSeek { drift_sec, .. } => *drift_sec,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveNudge {
    rate: f32,
    restore_rate: f32,
    expires_at: Instant,
}

/// Follower-side drift corrector
pub struct DriftCorrector {
    config: SyncConfig,
    clock: Arc<dyn Clock>,
    /// Rate the host asked for; nudges are relative to it and restore it
    base_rate: f32,
    nudge: Option<ActiveNudge>,
    last_evaluation: Option<Instant>,
    last_correction: Option<Correction>,
    corrections_applied: u64,
}

impl DriftCorrector {
    pub fn new(config: SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            base_rate: 1.0,
            nudge: None,
            last_evaluation: None,
            last_correction: None,
            corrections_applied: 0,
        }
    }

    pub fn base_rate(&self) -> f32 {
        self.base_rate
    }

    pub fn last_correction(&self) -> Option<Correction> {
        self.last_correction
    }

    pub fn corrections_applied(&self) -> u64 {
        self.corrections_applied
    }

    pub fn nudge_active(&self) -> bool {
        self.nudge.is_some()
    }

    /// When the active nudge must be reverted
    pub fn nudge_deadline(&self) -> Option<Instant> {
        self.nudge.map(|n| n.expires_at)
    }

    /// Where the host's playback should be right now, in seconds
    pub fn expected_position_sec(&self, request: &CorrectionRequest, rtt_ms: Option<i64>) -> f64 {
        let extrapolate = matches!(request.mode, CorrectionMode::Play | CorrectionMode::TimeSync)
            && !request.is_stationary();
        if !extrapolate {
            return request.remote_position_sec;
        }

        let elapsed = elapsed_sec(self.clock.now_ms(), request.remote_timestamp_ms);
        let network_delay = match (self.config.delay_compensation, rtt_ms) {
            (DelayCompensation::HalfRtt, Some(rtt)) => rtt as f64 / 2000.0,
            _ => 0.0,
        };
        request.remote_position_sec + elapsed + network_delay
    }

    /// Decide what to do about the drift between the request and local playback
    ///
    /// Pure with respect to corrector state; reads only the clock.
    pub fn evaluate(
        &self,
        request: &CorrectionRequest,
        local: &PlaybackSnapshot,
        rtt_ms: Option<i64>,
    ) -> Correction {
        let expected = self.expected_position_sec(request, rtt_ms);
        let drift_sec = expected - local.position_sec();
        let magnitude = drift_sec.abs();

        if request.is_stationary() {
            // A stationary timeline cannot be caught up by rate; seek or leave it
            return if magnitude > self.config.pause_seek_threshold_sec {
                Correction::HardSeek { target_sec: expected, drift_sec }
            } else {
                Correction::NoOp { drift_sec }
            };
        }

        if magnitude > self.config.hard_seek_threshold_sec {
            return Correction::HardSeek { target_sec: expected, drift_sec };
        }

        if magnitude > self.config.nudge_threshold_sec {
            let will_play = request.playing.unwrap_or(local.is_playing);
            if !will_play {
                // Seek on a paused follower: rate has no effect
                return Correction::HardSeek { target_sec: expected, drift_sec };
            }
            let base = request.rate.unwrap_or(self.base_rate) as f64;
            let offset = self.config.nudge_rate_offset as f64;
            let factor = if drift_sec > 0.0 { 1.0 + offset } else { 1.0 - offset };
            return Correction::Nudge {
                rate: (base * factor) as f32,
                drift_sec,
            };
        }

        Correction::NoOp { drift_sec }
    }

    /// Evaluate and apply one correction
    ///
    /// Returns `Ok(None)` when a TimeSync arrives inside the re-evaluation
    /// interval and is skipped.
    pub fn correct(
        &mut self,
        request: &CorrectionRequest,
        local: &PlaybackSnapshot,
        rtt_ms: Option<i64>,
        engine: &dyn PlaybackEngine,
    ) -> Result<Option<Correction>> {
        let now = Instant::now();
        if request.mode == CorrectionMode::TimeSync {
            if let Some(last) = self.last_evaluation {
                if now.duration_since(last) < self.config.timesync_min_interval() {
                    debug!("TimeSync throttled ({}ms since last evaluation)", now.duration_since(last).as_millis());
                    return Ok(None);
                }
            }
        }
        self.last_evaluation = Some(now);

        if let Some(rate) = request.rate {
            if rate != self.base_rate {
                self.apply_rate_change(rate, local, engine)?;
            }
        }

        let correction = self.evaluate(request, local, rtt_ms);
        self.apply(request, correction, local, engine)?;

        debug!(
            "{:?} correction: {} (drift {:+.3}s)",
            request.mode,
            correction.kind(),
            correction.drift_sec()
        );
        self.last_correction = Some(correction);
        if correction.kind() != CorrectionKind::NoOp {
            self.corrections_applied += 1;
        }
        Ok(Some(correction))
    }

    fn apply(
        &mut self,
        request: &CorrectionRequest,
        correction: Correction,
        local: &PlaybackSnapshot,
        engine: &dyn PlaybackEngine,
    ) -> Result<()> {
        // Stop first so the seek lands on a stationary timeline
        if request.playing == Some(false) && local.is_playing {
            engine.pause()?;
        }
        // A stopped timeline keeps no nudge
        if request.is_stationary() {
            self.cancel_nudge(engine)?;
        }

        match correction {
            Correction::HardSeek { target_sec, .. } => {
                self.cancel_nudge(engine)?;
                engine.seek_to(sec_to_ms(target_sec).max(0))?;
            }
            Correction::Nudge { rate, .. } => {
                self.start_nudge(rate, engine)?;
            }
            Correction::NoOp { .. } => {}
        }

        if request.playing == Some(true) && !local.is_playing {
            engine.play()?;
        }
        Ok(())
    }

    /// Host changed its rate: becomes the new base, replacing any nudge
    pub fn apply_rate_change(
        &mut self,
        rate: f32,
        local: &PlaybackSnapshot,
        engine: &dyn PlaybackEngine,
    ) -> Result<()> {
        info!("Base rate {} -> {}", self.base_rate, rate);
        self.base_rate = rate;
        if self.nudge.take().is_some() || local.rate != rate {
            engine.set_rate(rate)?;
        }
        Ok(())
    }

    fn start_nudge(&mut self, rate: f32, engine: &dyn PlaybackEngine) -> Result<()> {
        engine.set_rate(rate)?;
        let expires_at = Instant::now() + self.config.nudge_duration();
        if let Some(previous) = self.nudge.replace(ActiveNudge {
            rate,
            restore_rate: self.base_rate,
            expires_at,
        }) {
            debug!("Nudge at {} replaced by nudge at {}", previous.rate, rate);
        }
        Ok(())
    }

    /// Revert an active nudge immediately
    pub fn cancel_nudge(&mut self, engine: &dyn PlaybackEngine) -> Result<()> {
        if let Some(nudge) = self.nudge.take() {
            debug!("Nudge at {} cancelled, restoring {}", nudge.rate, nudge.restore_rate);
            engine.set_rate(nudge.restore_rate)?;
        }
        Ok(())
    }

    /// Nudge deadline reached: restore the rate it replaced
    pub fn expire_nudge(&mut self, engine: &dyn PlaybackEngine) -> Result<()> {
        if let Some(nudge) = self.nudge.take() {
            debug!("Nudge expired, restoring rate {}", nudge.restore_rate);
            engine.set_rate(nudge.restore_rate)?;
        }
        Ok(())
    }
}
