//! HTTP request handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tandem_common::Role;
use tracing::{error, info};

use super::AppState;
use crate::error::Error;
use crate::player::{PlaybackEngine, PlaybackSnapshot};
use crate::sync::SyncDiagnostics;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    position_ms: i64,
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    rate: f32,
}

#[derive(Debug, Deserialize)]
pub struct ScrubEndRequest {
    /// Where the scrub was released; omitted when the position did not move
    position_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    role: Option<Role>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<StatusResponse>)>;

fn ok() -> ApiResult<StatusResponse> {
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

fn error_response(e: Error) -> (StatusCode, Json<StatusResponse>) {
    let status = match &e {
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!("Request failed: {}", e);
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", e),
        }),
    )
}

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Liveness
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "tandem_sync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Player Endpoints
// ============================================================================

/// GET /player/state - Current local engine snapshot
pub async fn player_state(State(state): State<AppState>) -> Json<PlaybackSnapshot> {
    Json(state.player.snapshot())
}

/// POST /player/play
pub async fn play(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    info!("Play requested");
    state.player.play().map_err(error_response)?;
    ok()
}

/// POST /player/pause
pub async fn pause(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    info!("Pause requested");
    state.player.pause().map_err(error_response)?;
    ok()
}

/// POST /player/seek - Seek locally and report it for coalescing
pub async fn seek(
    State(state): State<AppState>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<StatusResponse> {
    if request.position_ms < 0 {
        return Err(error_response(Error::BadRequest(format!(
            "position_ms must not be negative, got {}",
            request.position_ms
        ))));
    }
    info!("Seek requested: {}ms", request.position_ms);
    state.player.seek_to(request.position_ms).map_err(error_response)?;
    state.sync.notify_local_seek(request.position_ms).map_err(error_response)?;
    ok()
}

/// POST /player/rate
pub async fn set_rate(
    State(state): State<AppState>,
    Json(request): Json<RateRequest>,
) -> ApiResult<StatusResponse> {
    if !request.rate.is_finite() || request.rate <= 0.0 {
        return Err(error_response(Error::BadRequest(format!(
            "rate must be positive, got {}",
            request.rate
        ))));
    }
    info!("Rate requested: {}", request.rate);
    state.player.set_rate(request.rate).map_err(error_response)?;
    ok()
}

// ============================================================================
// Scrub Endpoints
// ============================================================================

/// POST /scrub/start - Local user grabbed the timeline
pub async fn scrub_start(State(state): State<AppState>) -> ApiResult<StatusResponse> {
    state.sync.on_local_scrub_start().map_err(error_response)?;
    ok()
}

/// POST /scrub/end - Local user released the timeline
///
/// A body with `position_ms` moves the player there and is reported like a seek.
pub async fn scrub_end(
    State(state): State<AppState>,
    request: Option<Json<ScrubEndRequest>>,
) -> ApiResult<StatusResponse> {
    let released_at = request.and_then(|Json(r)| r.position_ms);
    if let Some(position_ms) = released_at {
        if position_ms < 0 {
            return Err(error_response(Error::BadRequest(format!(
                "position_ms must not be negative, got {}",
                position_ms
            ))));
        }
        state.player.scrub_to(position_ms);
        // A released scrub is a local seek; ignored unless hosting
        state.sync.notify_local_seek(position_ms).map_err(error_response)?;
    }
    state.sync.on_local_scrub_end().map_err(error_response)?;
    ok()
}

// ============================================================================
// Sync Endpoints
// ============================================================================

/// GET /sync/status - Orchestrator diagnostics
pub async fn sync_status(State(state): State<AppState>) -> ApiResult<SyncDiagnostics> {
    state.sync.diagnostics().await.map(Json).map_err(error_response)
}

/// POST /sync/role - Switch role (`null` leaves the session)
pub async fn set_role(
    State(state): State<AppState>,
    Json(request): Json<RoleRequest>,
) -> ApiResult<SyncDiagnostics> {
    state.sync.update_role(request.role).await.map_err(error_response)?;
    state.sync.diagnostics().await.map(Json).map_err(error_response)
}

#[cfg(test)]
mod tests {
    use crate::api::{create_router, AppState};
    use crate::clock::WallClock;
    use crate::config::SyncConfig;
    use crate::player::{PlaybackEngine, PlayerCommand, SimulatedPlayer};
    use crate::sync::SyncHandle;
    use crate::transport::ChannelTransport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tandem_common::{SyncEvent, WireMessage};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt;

    struct TestApp {
        router: axum::Router,
        sync: SyncHandle,
        player: Arc<SimulatedPlayer>,
        outbound: UnboundedReceiver<WireMessage>,
    }

    fn test_app() -> TestApp {
        let player = Arc::new(SimulatedPlayer::new(600_000));
        let (transport, outbound) = ChannelTransport::new();
        let (sync, _task) = crate::sync::spawn(
            SyncConfig::default(),
            player.clone(),
            Arc::new(transport),
            Arc::new(WallClock::new()),
        );
        let router = create_router(AppState {
            sync: sync.clone(),
            player: player.clone(),
        });
        TestApp {
            router,
            sync,
            player,
            outbound,
        }
    }

    fn app() -> (axum::Router, Arc<SimulatedPlayer>) {
        let app = test_app();
        (app.router, app.player)
    }

    fn drain_sync_events(outbound: &mut UnboundedReceiver<WireMessage>) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(message) = outbound.try_recv() {
            if let WireMessage::Sync { event, .. } = message {
                events.push(event);
            }
        }
        events
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _player) = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_seek_drives_player() {
        let (app, player) = app();
        let response = app
            .oneshot(post_json("/player/seek", r#"{"position_ms": 42000}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(player.commands(), vec![PlayerCommand::SeekTo(42_000)]);
    }

    #[tokio::test]
    async fn test_invalid_rate_rejected() {
        let (app, player) = app();
        let response = app
            .oneshot(post_json("/player/rate", r#"{"rate": 0.0}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(player.commands().is_empty());
    }

    #[tokio::test]
    async fn test_role_switch_reported_in_status() {
        let (app, _player) = app();
        let response = app
            .clone()
            .oneshot(post_json("/sync/role", r#"{"role": "follower"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["role"], "follower");

        let response = app
            .oneshot(Request::builder().uri("/sync/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = json_body(response).await;
        assert_eq!(status["role"], "follower");
        assert_eq!(status["connected"], false);
    }

    #[tokio::test]
    async fn test_scrub_end_without_body() {
        let (app, _player) = app();
        let response = app
            .oneshot(Request::builder().method("POST").uri("/scrub/end").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scrub_release_on_host_sends_one_seek() {
        let mut app = test_app();
        app.sync.start_as_host().await.unwrap();
        drain_sync_events(&mut app.outbound);

        let response = app
            .router
            .clone()
            .oneshot(Request::builder().method("POST").uri("/scrub/start").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app
            .router
            .oneshot(post_json("/scrub/end", r#"{"position_ms": 30000}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(app.player.snapshot().position_ms, 30_000);

        // Host is paused, so no heartbeat can carry the new position
        tokio::time::sleep(Duration::from_millis(5000)).await;
        let events = drain_sync_events(&mut app.outbound);
        assert_eq!(events.len(), 1, "events: {:?}", events);
        assert!(matches!(events[0], SyncEvent::Seek { position_sec, .. } if position_sec == 30.0));
    }

    #[tokio::test]
    async fn test_scrub_end_rejects_negative_position() {
        let (app, player) = app();
        let response = app
            .oneshot(post_json("/scrub/end", r#"{"position_ms": -5}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(player.snapshot().position_ms, 0);
    }
}
