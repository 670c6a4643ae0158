use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tagg_transcoder::capabilities::FfmpegCapabilities;
use tower_http::trace::TraceLayer;

use crate::auth::Identity;
use crate::session::run_session;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/ws", get(transcode_ws))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    ffmpeg: FfmpegCapabilities,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        ffmpeg: state.capabilities.clone(),
    })
}

/// Upgrade to a transcode session. The identity is checked before the
/// upgrade, so a bad token is a plain 401 rather than a closed socket.
async fn transcode_ws(
    State(state): State<AppState>,
    identity: Identity,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| async move {
        run_session(socket, identity, state).await;
    })
}
