//! API module for Flow Timer
//!
//! REST endpoints under `/api`, the WebSocket endpoint and the optional
//! static web client, sharing one [`AppState`].

pub mod auth;
pub mod billing;
pub mod reports;
pub mod session;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request},
    response::{Json, Response},
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{debug, warn, Span};

use crate::config::Config;
use crate::database::SharedStatsStore;
use crate::request_span;
use crate::services::{AuthProvider, BillingService, TimerService};
use crate::websocket::websocket_handler;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub timer: Arc<TimerService>,
    pub auth: Arc<dyn AuthProvider>,
    pub store: SharedStatsStore,
    pub billing: Arc<BillingService>,
    pub config: Arc<Config>,
}

/// Build the complete router
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .merge(session::create_session_routes())
        .merge(reports::create_report_routes())
        .merge(auth::create_auth_routes())
        .merge(billing::create_billing_routes());

    let mut app = Router::new()
        .nest("/api", api)
        .route("/ws", get(websocket_handler));

    if let Some(static_dir) = &state.config.static_dir {
        // Client-side routes such as /finish-signup fall back to index.html
        let index = ServeFile::new(static_dir.join("index.html"));
        app = app.fallback_service(ServeDir::new(static_dir).fallback(index));
    }

    let cors = cors_layer(&state.config.cors_origins);

    let trace = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<Body>| request_span!(request.method(), request.uri().path()))
        .on_response(|response: &Response, latency: Duration, span: &Span| {
            span.record("status_code", response.status().as_u16());
            debug!(latency_ms = latency.as_millis(), "Response sent");
        });

    app.layer(ServiceBuilder::new().layer(trace).layer(cors))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    layer.allow_origin(allowed)
}

/// Liveness plus which provider features are configured
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "auth_enabled": state.config.auth_enabled(),
        "checkout_enabled": state.config.checkout_enabled(),
        "timestamp": chrono::Utc::now().timestamp()
    }))
}
