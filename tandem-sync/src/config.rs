//! Configuration for tandem-sync
//!
//! Two layers:
//! 1. **SyncConfig**: thresholds and timer periods of the sync core. Every
//!    field has a built-in default, so an empty `[sync]` table is valid.
//! 2. **TomlConfig**: bootstrap settings for the peer binary (HTTP port,
//!    logging) plus the `[sync]` table.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (--port, --config)
//! 2. Environment variables (TANDEM_CONFIG, TANDEM_PORT)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// How the network-delay term enters the drift formula
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DelayCompensation {
    /// Elapsed wall-clock time only; RTT is measured but not used
    #[default]
    None,
    /// Add half of the last measured RTT to the extrapolated position
    HalfRtt,
}

/// Tuning of the drift corrector, orchestrator timers and RTT estimator
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Drift above which a hard seek is issued (seconds)
    pub hard_seek_threshold_sec: f64,

    /// Drift above which a nudge is issued (seconds)
    pub nudge_threshold_sec: f64,

    /// Drift above which a paused follower is re-seeked (seconds)
    pub pause_seek_threshold_sec: f64,

    /// Rate offset applied while nudging (0.04 = 1.04x / 0.96x)
    pub nudge_rate_offset: f32,

    /// How long a nudge stays applied before the prior rate is restored
    pub nudge_duration_ms: u64,

    /// Minimum spacing between TimeSync evaluations
    pub timesync_min_interval_ms: u64,

    /// Host heartbeat period while playing
    pub heartbeat_interval_ms: u64,

    /// Quiet period before a coalesced local seek is sent
    pub seek_debounce_ms: u64,

    /// Window after a local scrub ends during which position corrections are dropped
    pub scrub_suppression_ms: u64,

    /// RTT probe period
    pub rtt_probe_interval_ms: u64,

    /// Fallback poll of the playback engine feed
    pub state_poll_interval_ms: u64,

    /// Network-delay term of the drift formula
    pub delay_compensation: DelayCompensation,

    /// Drop events whose sequence number is not newer than the last applied one
    pub drop_stale_events: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hard_seek_threshold_sec: 0.6,
            nudge_threshold_sec: 0.1,
            pause_seek_threshold_sec: 0.3,
            nudge_rate_offset: 0.04,
            nudge_duration_ms: 1500,
            timesync_min_interval_ms: 200,
            heartbeat_interval_ms: 500,
            seek_debounce_ms: 200,
            scrub_suppression_ms: 2000,
            rtt_probe_interval_ms: 5000,
            state_poll_interval_ms: 250,
            delay_compensation: DelayCompensation::None,
            drop_stale_events: false,
        }
    }
}

impl SyncConfig {
    /// Reject values the timers or the decision tiers cannot work with
    pub fn validate(&self) -> Result<()> {
        let periods = [
            ("nudge_duration_ms", self.nudge_duration_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("seek_debounce_ms", self.seek_debounce_ms),
            ("rtt_probe_interval_ms", self.rtt_probe_interval_ms),
            ("state_poll_interval_ms", self.state_poll_interval_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        if !(self.nudge_threshold_sec >= 0.0) {
            return Err(Error::Config("nudge_threshold_sec must be non-negative".to_string()));
        }
        if !(self.hard_seek_threshold_sec > self.nudge_threshold_sec) {
            return Err(Error::Config(format!(
                "hard_seek_threshold_sec ({}) must exceed nudge_threshold_sec ({})",
                self.hard_seek_threshold_sec, self.nudge_threshold_sec
            )));
        }
        if !(self.pause_seek_threshold_sec >= 0.0) {
            return Err(Error::Config("pause_seek_threshold_sec must be non-negative".to_string()));
        }
        if !(self.nudge_rate_offset > 0.0 && self.nudge_rate_offset < 1.0) {
            return Err(Error::Config(format!(
                "nudge_rate_offset ({}) must be in (0, 1)",
                self.nudge_rate_offset
            )));
        }
        Ok(())
    }

    pub fn nudge_duration(&self) -> Duration {
        Duration::from_millis(self.nudge_duration_ms)
    }

    pub fn timesync_min_interval(&self) -> Duration {
        Duration::from_millis(self.timesync_min_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn seek_debounce(&self) -> Duration {
        Duration::from_millis(self.seek_debounce_ms)
    }

    pub fn scrub_suppression(&self) -> Duration {
        Duration::from_millis(self.scrub_suppression_ms)
    }

    pub fn rtt_probe_interval(&self) -> Duration {
        Duration::from_millis(self.rtt_probe_interval_ms)
    }

    pub fn state_poll_interval(&self) -> Duration {
        Duration::from_millis(self.state_poll_interval_ms)
    }
}

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The peer must restart to
/// pick up changes.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Sync core tuning
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// HTTP diagnostics/control surface
    #[serde(default)]
    pub api: ApiConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// HTTP surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    5790
}

fn default_log_level() -> String {
    "tandem_sync=debug,tower_http=debug".to_string()
}

impl TomlConfig {
    /// Load from an optional path (missing file → defaults) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: TomlConfig = tandem_common::config::load_toml_or_default(path)?;
        config.sync.validate()?;
        Ok(config)
    }
}
