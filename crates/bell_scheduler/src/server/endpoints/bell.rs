use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// Largest strike count accepted for a manual play.
const MAX_MANUAL_STRIKES: u32 = 20;

#[derive(Debug, Default, Deserialize)]
pub struct PlayRequest {
    pub count: Option<u32>,
}

/// POST /play
/// Body is optional; without a count the configured manual count is used.
/// A body that is present but not a valid `PlayRequest` is rejected.
pub async fn post_play(State(s): State<Arc<AppState>>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        PlayRequest::default()
    } else {
        match serde_json::from_slice::<PlayRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "POST /play with malformed body");
                return ApiErrorType::from((
                    StatusCode::BAD_REQUEST,
                    "Malformed play request",
                    Some(e.to_string()),
                ))
                .into_response();
            }
        }
    };
    info!("POST /play (count={:?})", request.count);

    if let Some(count) = request.count {
        if count == 0 || count > MAX_MANUAL_STRIKES {
            return ApiErrorType::from((
                StatusCode::BAD_REQUEST,
                "Invalid strike count",
                Some(format!("count must be between 1 and {}", MAX_MANUAL_STRIKES)),
            ))
            .into_response();
        }
    }

    let strike_count = s.service.play_manual(request.count);
    (StatusCode::OK, Json(json!({ "strikeCount": strike_count }))).into_response()
}

/// POST /stop
pub async fn post_stop(State(s): State<Arc<AppState>>) -> Response {
    info!("POST /stop");
    s.service.stop_bell();
    StatusCode::NO_CONTENT.into_response()
}

/// GET /bell_log
/// Most recent strike sequences, newest first
pub async fn get_bell_log(State(s): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(s.player.log().entries())).into_response()
}
