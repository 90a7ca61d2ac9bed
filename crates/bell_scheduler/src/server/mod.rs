use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::server::endpoints::{bell, schedule, status};
use crate::types::AppState;

mod endpoints;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(status::get_health))
        .route("/status", get(status::get_status))
        .route("/schedule", get(schedule::get_schedule))
        .route("/sync", post(schedule::post_sync))
        .route("/play", post(bell::post_play))
        .route("/stop", post(bell::post_stop))
        .route("/bell_log", get(bell::get_bell_log))
        .with_state(app_state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{EngineEvent, EventBus, FireOrigin, FixedClock, TickerConfig};
    use crate::bell::{BellPlayer, LogSink, PlayerConfig};
    use crate::schedule::RawScheduleDescription;
    use crate::service::{BellService, ServiceConfig};
    use crate::storage::SqliteStore;
    use crate::sync::testing::StaticSource;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<AppState>, Arc<StaticSource>) {
        let source = Arc::new(StaticSource::new());
        let service = Arc::new(BellService::new(
            ServiceConfig::default(),
            Arc::new(FixedClock::at("2024-01-01 07:00:00")),
            EventBus::default(),
            source.clone(),
            Arc::new(SqliteStore::open_in_memory().unwrap()),
        ));
        let player = BellPlayer::new(Arc::new(LogSink), PlayerConfig::default());
        let ticker = service.ticker(TickerConfig::default());
        let state = Arc::new(AppState::new(Arc::clone(&service), player.handle(), ticker));
        (create_router(Arc::clone(&state)), state, source)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_and_status() {
        let (router, _, _) = app();

        let (status, body) = send(router.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(router, get("/status")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"]["dataStatus"], "firstUse");
        assert_eq!(body["ticker"], "idle");
        assert_eq!(body["playing"], false);
    }

    #[tokio::test]
    async fn test_sync_then_schedule() {
        let (router, _, source) = app();

        let (status, body) = send(router.clone(), Request::post("/sync").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["outcome"], "noLocalData");

        let raw: RawScheduleDescription = serde_json::from_value(json!({
            "CourseSchedule": [{"courseType": "X", "startDate": "2024-01-01", "days": 2}],
            "CourseTypeDays": {"X": ["A", "A"]},
            "DailyPatternBells": {"X": {"A": [{"time": "08:00"}, {"time": "08:00"}, {"time": "12:10"}]}}
        }))
        .unwrap();
        source.set_schedule(Ok(raw));

        let (status, body) = send(router.clone(), Request::post("/sync").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "updated");
        assert_eq!(body["alarmCount"], 6);

        let (status, body) = send(router, get("/schedule?all=true")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["days"][0]["date"], "2024-01-01");
        assert_eq!(body["days"][0]["isToday"], true);
        assert_eq!(body["days"][0]["times"], json!(["08:00", "12:10"]));
        assert_eq!(body["hasMore"], false);
    }

    #[tokio::test]
    async fn test_play_and_stop_emit_events() {
        let (router, state, _) = app();
        let mut rx = state.service.events().subscribe();

        let (status, body) = send(router.clone(), post_json("/play", json!({"count": 2}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["strikeCount"], 2);

        let (status, body) = send(router.clone(), Request::post("/play").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["strikeCount"], 4);

        let (status, _) = send(router.clone(), post_json("/play", json!({"count": 0}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(router, Request::post("/stop").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Fire { strike_count: 2, origin: FireOrigin::Manual }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            EngineEvent::Fire { strike_count: 4, origin: FireOrigin::Manual }
        );
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::Stop);
    }

    #[tokio::test]
    async fn test_malformed_play_body_is_rejected_without_ringing() {
        let (router, state, _) = app();
        let mut rx = state.service.events().subscribe();

        for body in [json!({"count": -1}), json!({"count": "x"})] {
            let (status, body) = send(router.clone(), post_json("/play", body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["error"], "Malformed play request");
        }
        let broken = Request::post("/play")
            .header("content-type", "application/json")
            .body(Body::from("{\"count\":"))
            .unwrap();
        let (status, _) = send(router, broken).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bell_log_starts_empty() {
        let (router, _, _) = app();

        let (status, body) = send(router, get("/bell_log")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));
    }
}
