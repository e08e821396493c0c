//! Report API Endpoints
//!
//! Productivity charts for premium users, plus a demo over sample data that
//! the client shows behind the paywall.

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;

use crate::api::AppState;
use crate::error::AppResult;
use crate::models::chart::{ChartTab, Report};

/// `?tab=week|month|year`, defaulting to week
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub tab: ChartTab,
}

/// Create report API routes
pub fn create_report_routes() -> Router<AppState> {
    Router::new()
        .route("/reports", get(get_report))
        .route("/reports/demo", get(get_demo_report))
}

/// Report over the signed-in user's history (403 for non-premium users)
pub async fn get_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> AppResult<Json<Report>> {
    Ok(Json(state.timer.report(query.tab).await?))
}

pub async fn get_demo_report(
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Json<Report> {
    Json(state.timer.demo_report(query.tab).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::test_state;
    use crate::config::Config;
    use crate::database::StatsStore;
    use crate::models::auth::IdpCredential;
    use crate::services::AuthProvider;
    use axum_test::TestServer;
    use serde_json::Value;
    use std::time::Duration;

    #[tokio::test]
    async fn test_report_requires_premium() {
        let app = create_report_routes().with_state(test_state(Config::default()));
        let server = TestServer::new(app).unwrap();

        let response = server.get("/reports").expect_failure().await;
        assert_eq!(response.status_code(), 403);

        let body: Value = response.json();
        assert_eq!(body["error"], "PremiumRequired");
    }

    #[tokio::test]
    async fn test_demo_report_tabs() {
        let app = create_report_routes().with_state(test_state(Config::default()));
        let server = TestServer::new(app).unwrap();

        let week: Value = server.get("/reports/demo").await.json();
        assert_eq!(week["tab"], "week");
        assert_eq!(week["chart_data"].as_array().unwrap().len(), 7);

        let year: Value = server.get("/reports/demo").add_query_param("tab", "year").await.json();
        assert_eq!(year["tab"], "year");
        assert_eq!(year["chart_data"].as_array().unwrap().len(), 12);

        let response = server
            .get("/reports/demo")
            .add_query_param("tab", "decade")
            .expect_failure()
            .await;
        assert_eq!(response.status_code(), 400);
    }

    #[tokio::test]
    async fn test_premium_user_gets_report() {
        let state = test_state(Config::default());
        state.store.mark_premium("user-1", None).await.unwrap();
        state
            .auth
            .login_with_interactive_provider(&IdpCredential {
                provider_id: "google.com".to_string(),
                id_token: "user-1".to_string(),
            })
            .await
            .unwrap();

        // The remote document arrives through the user sync task
        let mut premium = false;
        for _ in 0..50 {
            if state.timer.snapshot().await.is_premium {
                premium = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(premium);

        let server = TestServer::new(create_report_routes().with_state(state)).unwrap();
        let report: Value = server.get("/reports").add_query_param("tab", "month").await.json();
        assert_eq!(report["tab"], "month");
        assert_eq!(report["unit"], "s");
        assert_eq!(report["summary"]["total_seconds"], 0);
    }
}
