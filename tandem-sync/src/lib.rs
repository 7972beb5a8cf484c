//! # Tandem Sync Library (tandem-sync)
//!
//! Keeps two independently clocked media players at the same position.
//!
//! **Purpose:** The host observes its playback engine and emits sync events;
//! the follower reconciles its own engine against them with no-op, nudge or
//! hard-seek corrections.
//!
//! **Architecture:** One orchestrator actor per peer owning all sync state and
//! timers, a drift corrector, an RTT estimator, and pluggable engine and
//! transport seams.

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod player;
pub mod sync;
pub mod transport;

pub use error::{Error, Result};
pub use sync::{spawn, SyncDiagnostics, SyncHandle};
