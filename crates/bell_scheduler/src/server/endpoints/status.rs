use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::{Arc, PoisonError};
use tracing::info;

use crate::types::AppState;

/// GET /health
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "uptime_secs": s.started_at.elapsed().as_secs(),
        })),
    )
        .into_response()
}

/// GET /status
/// Data status, alarm count, ticker state and whether the bell is ringing
pub async fn get_status(State(s): State<Arc<AppState>>) -> Response {
    info!("GET /status");

    let ticker_state = s
        .ticker
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .state();

    (
        StatusCode::OK,
        Json(json!({
            "service": s.service.status(),
            "ticker": ticker_state,
            "playing": s.player.is_playing(),
        })),
    )
        .into_response()
}
