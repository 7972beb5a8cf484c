//! Wire protocol for Tandem peers
//!
//! The host produces [`SyncEvent`]s, the follower consumes them. Every
//! message on the transport is a [`WireMessage`]: either a sync event wrapped
//! with its host session id and sequence number, or one half of an RTT probe.

mod sync_types;

pub use sync_types::{CorrectionKind, Role};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Synchronization events emitted by the host
///
/// Positions are floating-point seconds, timestamps are host wall-clock epoch
/// milliseconds taken when the position was sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Host started (or resumed) playback
    Play {
        position_sec: f64,
        host_timestamp_ms: i64,
        rate: f32,
    },

    /// Host paused playback
    Pause {
        position_sec: f64,
        host_timestamp_ms: i64,
    },

    /// Host user jumped to a new position (debounced on the host)
    Seek {
        position_sec: f64,
        host_timestamp_ms: i64,
    },

    /// Host changed playback rate
    RateChange { rate: f32 },

    /// Periodic heartbeat while the host is playing
    TimeSync {
        position_sec: f64,
        host_timestamp_ms: i64,
        is_playing: bool,
    },
}

impl SyncEvent {
    /// Short variant name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::Play { .. } => "Play",
            SyncEvent::Pause { .. } => "Pause",
            SyncEvent::Seek { .. } => "Seek",
            SyncEvent::RateChange { .. } => "RateChange",
            SyncEvent::TimeSync { .. } => "TimeSync",
        }
    }

    /// Events that move the playback position rather than express host intent
    ///
    /// These are the ones a local scrub overrides.
    pub fn is_position_correction(&self) -> bool {
        matches!(self, SyncEvent::Seek { .. } | SyncEvent::TimeSync { .. })
    }
}

/// Envelope for everything that crosses the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireMessage {
    /// Authoritative event from the host
    Sync {
        /// Fresh per hosting session
        session_id: Uuid,
        /// Monotonic within a session, starting at 1
        seq: u64,
        event: SyncEvent,
    },

    /// RTT probe carrying the sender's wall-clock send time
    Probe { sent_at_ms: i64 },

    /// Answer to a probe, echoing its send time
    ProbeResponse { sent_at_ms: i64 },
}

impl WireMessage {
    /// Encode as a single JSON line (no trailing newline)
    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode one JSON line
    pub fn from_line(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("empty wire message".to_string()));
        }
        Ok(serde_json::from_str(trimmed)?)
    }
}
