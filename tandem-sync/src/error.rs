//! Error types for tandem-sync
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for tandem-sync
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Playback engine facade rejected a command
    #[error("Playback error: {0}")]
    Playback(String),

    /// Transport send/receive failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The orchestrator actor has shut down
    #[error("Sync orchestrator is not running")]
    ChannelClosed,

    /// File or socket I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library (wire codec, config files)
    #[error(transparent)]
    Common(#[from] tandem_common::Error),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience Result type using tandem-sync Error
pub type Result<T> = std::result::Result<T, Error>;
