use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::service::SyncOutcome;
use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    /// List every expanded day instead of the display window
    #[serde(default)]
    pub all: bool,
}

/// GET /schedule
pub async fn get_schedule(
    Query(query): Query<ScheduleQuery>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /schedule (all={})", query.all);
    (StatusCode::OK, Json(s.service.schedule_view(query.all))).into_response()
}

/// POST /sync
/// Fetches the schedule now. Falling back to stored data is still a 200; only
/// having no data at all is reported as unavailable.
pub async fn post_sync(State(s): State<Arc<AppState>>) -> Response {
    info!("POST /sync");

    let outcome = s.service.sync_now().await;
    let status = match outcome {
        SyncOutcome::NoLocalData { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(outcome)).into_response()
}
