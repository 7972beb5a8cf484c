//! HTTP control and diagnostics surface of the peer binary
//!
//! Drives the local simulated player (as a user would) and exposes the
//! orchestrator's diagnostics.

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::player::SimulatedPlayer;
use crate::sync::SyncHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator front end
    pub sync: SyncHandle,
    /// Local playback engine
    pub player: Arc<SimulatedPlayer>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        // Local player control
        .route("/player/state", get(handlers::player_state))
        .route("/player/play", post(handlers::play))
        .route("/player/pause", post(handlers::pause))
        .route("/player/seek", post(handlers::seek))
        .route("/player/rate", post(handlers::set_rate))
        // Follower scrubbing
        .route("/scrub/start", post(handlers::scrub_start))
        .route("/scrub/end", post(handlers::scrub_end))
        // Sync
        .route("/sync/status", get(handlers::sync_status))
        .route("/sync/role", post(handlers::set_role))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
