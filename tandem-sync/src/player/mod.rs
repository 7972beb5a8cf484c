//! Playback engine facade
//!
//! The sync core never decodes media. It drives an external engine through
//! [`PlaybackEngine`] and observes it through [`PlaybackSnapshot`]s. Engines
//! push snapshots on change, but not every engine reliably reports every
//! change, so [`PlayerFeed`] merges the push channel with a periodic poll into
//! a single refresh step owned by the orchestrator.

mod feed;
mod simulated;

pub use feed::{FeedUpdate, PlayerFeed};
pub use simulated::{PlayerCommand, SimulatedPlayer};

use serde::Serialize;
use tokio::sync::watch;

use crate::error::Result;

/// Point-in-time view of the playback engine
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSnapshot {
    pub is_playing: bool,
    pub position_ms: i64,
    pub duration_ms: i64,
    pub rate: f32,
    pub buffering: bool,
    /// Engine-reported failure (decode error, unsupported format, ...)
    pub error: Option<String>,
}

impl PlaybackSnapshot {
    pub fn position_sec(&self) -> f64 {
        tandem_common::time::ms_to_sec(self.position_ms)
    }
}

impl Default for PlaybackSnapshot {
    fn default() -> Self {
        Self {
            is_playing: false,
            position_ms: 0,
            duration_ms: 0,
            rate: 1.0,
            buffering: false,
            error: None,
        }
    }
}

/// Commands and observable feed of an external playback engine
///
/// Implementations may be called from the orchestrator task only; they must
/// not block. Replay-from-start after end-of-media is the engine's concern:
/// the core simply calls `play()`.
pub trait PlaybackEngine: Send + Sync {
    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn seek_to(&self, position_ms: i64) -> Result<()>;

    fn set_rate(&self, rate: f32) -> Result<()>;

    /// Current state, computed fresh
    fn snapshot(&self) -> PlaybackSnapshot;

    /// Push notifications; a new value is published on every discrete change
    fn subscribe(&self) -> watch::Receiver<PlaybackSnapshot>;
}
