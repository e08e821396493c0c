//! Session API Endpoints
//!
//! Timer controls for the single session this service drives. Every handler
//! returns the resulting snapshot; the same snapshot is pushed to WebSocket
//! clients.

use axum::{extract::State, response::Json, routing::{get, post}, Router};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::mode::Mode;
use crate::models::session::SessionSnapshot;

/// Body of `POST /session/mode`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeSwitchRequest {
    pub mode: Mode,
}

/// Body of `POST /stats/reset`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResetStatsRequest {
    #[serde(default)]
    pub confirm: bool,
}

/// Create session API routes
pub fn create_session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/toggle", post(toggle_timer))
        .route("/session/reset", post(reset_session))
        .route("/session/next", post(next_mode))
        .route("/session/mode", post(switch_mode))
        .route("/stats/reset", post(reset_stats))
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.timer.snapshot().await)
}

/// Start or pause
pub async fn toggle_timer(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.timer.toggle().await)
}

pub async fn reset_session(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.timer.reset().await)
}

/// Follow the focus/break cycle
pub async fn next_mode(State(state): State<AppState>) -> Json<SessionSnapshot> {
    Json(state.timer.next_mode().await)
}

pub async fn switch_mode(
    State(state): State<AppState>,
    Json(request): Json<ModeSwitchRequest>,
) -> Json<SessionSnapshot> {
    Json(state.timer.switch_mode(request.mode).await)
}

/// Wipe today's total and the whole history; requires `{"confirm": true}`
pub async fn reset_stats(
    State(state): State<AppState>,
    Json(request): Json<ResetStatsRequest>,
) -> AppResult<Json<SessionSnapshot>> {
    Ok(Json(state.timer.reset_stats(request.confirm).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::config::Config;
    use axum_test::TestServer;
    use serde_json::{json, Value};

    fn create_test_server() -> TestServer {
        let app = create_session_routes().with_state(test_state(Config::default()));
        TestServer::new(app).unwrap()
    }

    #[tokio::test]
    async fn test_get_session_endpoint() {
        let server = create_test_server();

        let response = server.get("/session").await;
        assert_eq!(response.status_code(), 200);

        let snapshot: SessionSnapshot = response.json();
        assert_eq!(snapshot.mode, Mode::Focus);
        assert_eq!(snapshot.time, 0);
        assert!(!snapshot.is_running);
    }

    #[tokio::test]
    async fn test_toggle_endpoint() {
        let server = create_test_server();

        let started: Value = server.post("/session/toggle").await.json();
        assert_eq!(started["is_running"], true);

        let paused: Value = server.post("/session/toggle").await.json();
        assert_eq!(paused["is_running"], false);
    }

    #[tokio::test]
    async fn test_mode_switch_endpoint() {
        let server = create_test_server();

        let response = server
            .post("/session/mode")
            .json(&json!({ "mode": "longBreak" }))
            .await;
        assert_eq!(response.status_code(), 200);

        let snapshot: SessionSnapshot = response.json();
        assert_eq!(snapshot.mode, Mode::LongBreak);
        // No focus time: the long break floor
        assert_eq!(snapshot.time, 900);
        assert_eq!(snapshot.initial_break_time, 900);

        let reset: SessionSnapshot = server.post("/session/reset").await.json();
        assert_eq!(reset.time, 900);

        let next: SessionSnapshot = server.post("/session/next").await.json();
        assert_eq!(next.mode, Mode::Focus);
        assert_eq!(next.time, 0);
    }

    #[tokio::test]
    async fn test_mode_switch_rejects_unknown_mode() {
        let server = create_test_server();

        let response = server
            .post("/session/mode")
            .json(&json!({ "mode": "nap" }))
            .expect_failure()
            .await;
        assert!(response.status_code().is_client_error());
    }

    #[tokio::test]
    async fn test_reset_stats_requires_confirmation() {
        let server = create_test_server();

        let response = server
            .post("/stats/reset")
            .json(&json!({}))
            .expect_failure()
            .await;
        assert_eq!(response.status_code(), 400);
        let body: Value = response.json();
        assert_eq!(body["kind"], "Validation");

        let response = server.post("/stats/reset").json(&json!({ "confirm": true })).await;
        assert_eq!(response.status_code(), 200);
        let snapshot: SessionSnapshot = response.json();
        assert_eq!(snapshot.completed_focus_time, 0);
    }
}
