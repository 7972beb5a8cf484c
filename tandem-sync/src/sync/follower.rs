//! Follower-side state: scrub suppression, stale-event guard, dispatch to the corrector

use std::sync::Arc;
use std::time::Duration;
use tandem_common::SyncEvent;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::drift::{Correction, CorrectionRequest, DriftCorrector};
use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::player::{PlaybackEngine, PlaybackSnapshot};

/// Local user interaction overriding remote position corrections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrubState {
    pub active: bool,
    pub suppress_until: Option<Instant>,
}

impl ScrubState {
    pub fn start(&mut self) {
        self.active = true;
    }

    /// Scrub released; corrections stay suppressed for `window`
    pub fn end(&mut self, window: Duration) {
        self.active = false;
        self.suppress_until = Some(Instant::now() + window);
    }

    pub fn is_suppressing(&self, now: Instant) -> bool {
        self.active || self.suppress_until.is_some_and(|until| now < until)
    }
}

/// What happened to one remote event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteOutcome {
    /// Evaluated by the corrector
    Corrected(Correction),
    /// TimeSync inside the re-evaluation interval
    Throttled,
    /// Host rate adopted as the new base rate
    RateApplied(f32),
    /// Position correction during a local scrub
    Suppressed,
    /// Sequence number not newer than the last applied one
    Stale,
    /// Engine reports an error; corrections are paused
    EngineError,
}

impl RemoteOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, RemoteOutcome::Suppressed | RemoteOutcome::Stale | RemoteOutcome::EngineError)
    }
}

/// State owned by the orchestrator while following
pub struct FollowerState {
    scrub: ScrubState,
    scrub_suppression: Duration,
    corrector: DriftCorrector,
    drop_stale_events: bool,
    last_applied: Option<(Uuid, u64)>,
}

impl FollowerState {
    pub fn new(config: &SyncConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            scrub: ScrubState::default(),
            scrub_suppression: config.scrub_suppression(),
            corrector: DriftCorrector::new(config.clone(), clock),
            drop_stale_events: config.drop_stale_events,
            last_applied: None,
        }
    }

    pub fn scrub(&self) -> ScrubState {
        self.scrub
    }

    /// Session of the last accepted envelope
    pub fn session_id(&self) -> Option<Uuid> {
        self.last_applied.map(|(session_id, _)| session_id)
    }

    pub fn corrector(&self) -> &DriftCorrector {
        &self.corrector
    }

    pub fn corrector_mut(&mut self) -> &mut DriftCorrector {
        &mut self.corrector
    }

    pub fn on_scrub_start(&mut self) {
        debug!("Local scrub started");
        self.scrub.start();
    }

    pub fn on_scrub_end(&mut self) {
        debug!("Local scrub ended, suppressing corrections for {}ms", self.scrub_suppression.as_millis());
        self.scrub.end(self.scrub_suppression);
    }

    /// Record the envelope; false when it is older than what was already applied
    fn accept_sequence(&mut self, envelope: Option<(Uuid, u64)>) -> bool {
        let Some((session_id, seq)) = envelope else {
            return true;
        };
        if self.drop_stale_events {
            if let Some((last_session, last_seq)) = self.last_applied {
                if last_session == session_id && seq <= last_seq {
                    return false;
                }
            }
        }
        if self.last_applied.map(|(s, _)| s) != Some(session_id) {
            info!("Following host session {}", session_id);
        }
        self.last_applied = Some((session_id, seq));
        true
    }

    /// Dispatch one host event
    pub fn on_remote_event(
        &mut self,
        envelope: Option<(Uuid, u64)>,
        event: &SyncEvent,
        local: &PlaybackSnapshot,
        rtt_ms: Option<i64>,
        engine: &dyn PlaybackEngine,
    ) -> Result<RemoteOutcome> {
        if !self.accept_sequence(envelope) {
            warn!("Dropping stale {} (seq {:?})", event.name(), envelope.map(|(_, seq)| seq));
            return Ok(RemoteOutcome::Stale);
        }

        if local.error.is_some() {
            debug!("Dropping {}: playback engine in error state", event.name());
            return Ok(RemoteOutcome::EngineError);
        }

        if event.is_position_correction() && self.scrub.is_suppressing(Instant::now()) {
            debug!("Dropping {} during local scrub", event.name());
            return Ok(RemoteOutcome::Suppressed);
        }

        let request = match *event {
            SyncEvent::Play { position_sec, host_timestamp_ms, rate } => {
                CorrectionRequest::play(position_sec, host_timestamp_ms, rate)
            }
            SyncEvent::Pause { position_sec, host_timestamp_ms } => {
                CorrectionRequest::pause(position_sec, host_timestamp_ms)
            }
            SyncEvent::Seek { position_sec, host_timestamp_ms } => {
                CorrectionRequest::seek(position_sec, host_timestamp_ms)
            }
            SyncEvent::TimeSync { position_sec, host_timestamp_ms, is_playing } => {
                CorrectionRequest::time_sync(position_sec, host_timestamp_ms, is_playing)
            }
            SyncEvent::RateChange { rate } => {
                self.corrector.apply_rate_change(rate, local, engine)?;
                return Ok(RemoteOutcome::RateApplied(rate));
            }
        };

        Ok(match self.corrector.correct(&request, local, rtt_ms, engine)? {
            Some(correction) => RemoteOutcome::Corrected(correction),
            None => RemoteOutcome::Throttled,
        })
    }

    /// Leaving the follower role: put the engine back on the base rate
    pub fn teardown(&mut self, engine: &dyn PlaybackEngine) -> Result<()> {
        self.corrector.cancel_nudge(engine)
    }
}
