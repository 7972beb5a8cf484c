//! # Tandem Common Library
//!
//! Shared code for both peers of a Tandem room:
//! - Wire protocol (SyncEvent, WireMessage)
//! - Role and correction vocabulary
//! - Epoch-millisecond time helpers
//! - Configuration file discovery

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{CorrectionKind, Role, SyncEvent, WireMessage};
