//! Logging configuration for Flow Timer
//!
//! Structured logging setup with appropriate levels and formatting.

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::models::mode::Mode;

/// Initialize the application logging system
pub fn init_logging(log_level: &str, json: bool) {
    let default_filter = format!("flow_timer={},tower_http=info", log_level);

    // RUST_LOG wins over the configured level
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    });

    let console_layer = (!json).then(|| {
        fmt::layer()
            .with_target(false)
            .compact()
            .with_ansi(true)
            .boxed()
    });

    let result = Registry::default()
        .with(env_filter)
        .with(json_layer)
        .with(console_layer)
        .try_init();

    // A subscriber may already be installed (tests)
    if result.is_ok() {
        tracing::info!("Logging system initialized");
    }
}

/// Create a span for request logging
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            status_code = tracing::field::Empty,
        )
    };
}

/// Create a span for stats store operations
#[macro_export]
macro_rules! db_span {
    ($operation:expr, $user_id:expr) => {
        tracing::debug_span!(
            "stats_store_operation",
            operation = %$operation,
            user_id = %$user_id,
            rows_affected = tracing::field::Empty,
        )
    };
}

/// Log application startup
pub fn log_startup() {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_commit = option_env!("GIT_COMMIT").unwrap_or("unknown"),
        build_time = option_env!("BUILD_TIME").unwrap_or("unknown"),
        "Flow Timer starting up"
    );
}

/// Log a session mode transition
pub fn log_session_transition(operation: &str, from: Mode, to: Mode, time: u64, stash: u64) {
    tracing::info!(
        operation = %operation,
        from = %from,
        to = %to,
        time = time,
        focus_time_stash = stash,
        "Session transition"
    );
}

/// Log stashed focus time being folded into statistics
pub fn log_focus_committed(seconds: u64, completed_today: u64) {
    tracing::info!(
        seconds = seconds,
        completed_today = completed_today,
        "Focus time committed"
    );
}

/// Log a best-effort persistence failure
pub fn log_persistence_failure(target: &str, error: &dyn std::fmt::Display) {
    tracing::warn!(target_store = %target, error = %error, "Persistence write failed");
}

/// Log WebSocket connection established
pub fn log_websocket_connected(connection_id: &str) {
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");
}

/// Log WebSocket connection closed
pub fn log_websocket_disconnected(connection_id: &str, reason: &str) {
    tracing::info!(
        connection_id = %connection_id,
        reason = %reason,
        "WebSocket connection closed"
    );
}

/// Log authentication event
pub fn log_authentication_event(event: &str, user_id: Option<&str>, success: bool) {
    if success {
        tracing::info!(event = %event, user_id = ?user_id, "Authentication successful");
    } else {
        tracing::warn!(event = %event, user_id = ?user_id, "Authentication failed");
    }
}

/// Log a processed payment webhook event
pub fn log_webhook_event(event_type: &str, user_id: Option<&str>, applied: bool) {
    tracing::info!(
        event_type = %event_type,
        user_id = ?user_id,
        applied = applied,
        "Payment webhook processed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_initialization() {
        // Twice: the second call must not panic on an installed subscriber
        init_logging("debug", false);
        init_logging("debug", true);
    }

    #[test]
    fn test_log_macros_compilation() {
        let _span = request_span!("GET", "/api/health");
        let _span = db_span!("save_history", "user-1");
    }
}
