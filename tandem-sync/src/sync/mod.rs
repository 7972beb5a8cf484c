//! Playback synchronization core
//!
//! - `drift`: decides between no-op, nudge and hard seek for one remote position
//! - `rtt`: probe/response round-trip estimator
//! - `host` / `follower`: per-role state
//! - `orchestrator`: the actor that owns all of the above

pub mod diagnostics;
pub mod drift;
pub mod follower;
pub mod host;
pub mod orchestrator;
pub mod rtt;

pub use diagnostics::SyncDiagnostics;
pub use drift::{Correction, CorrectionMode, CorrectionRequest, DriftCorrector};
pub use follower::{FollowerState, RemoteOutcome, ScrubState};
pub use host::{HostState, PendingSeek};
pub use orchestrator::{spawn, SyncHandle};
pub use rtt::{RttEstimator, RttSample};
