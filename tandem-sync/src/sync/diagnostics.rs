//! Read-only view of the orchestrator for UIs and the HTTP surface

use serde::Serialize;
use tandem_common::{CorrectionKind, Role};
use uuid::Uuid;

/// Snapshot of sync state, taken on the actor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncDiagnostics {
    pub role: Option<Role>,
    pub connected: bool,
    /// Hosting session: ours as host, the one being followed as follower
    pub session_id: Option<Uuid>,
    pub last_rtt_ms: Option<i64>,
    pub last_correction: Option<CorrectionKind>,
    /// Signed expected minus local position of the last evaluation
    pub last_drift_sec: Option<f64>,
    pub nudge_active: bool,
    pub scrub_active: bool,
    pub engine_error: Option<String>,
    pub corrections_applied: u64,
    pub events_sent: u64,
    pub events_applied: u64,
    pub events_dropped: u64,
}
