//! Flow Timer server
//!
//! Serves the REST API, the WebSocket feed and optionally the built web
//! client, and drives the session timer.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

use flow_timer::database::LocalStorage;
use flow_timer::logging::{init_logging, log_startup};
use flow_timer::services::SystemTimeProvider;
use flow_timer::{Application, Config};

/// Time allowed for queued history uploads after the server stops
const UPLOAD_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    init_logging(&config.log_level, config.json_logs || config.is_production());
    log_startup();
    config.log_config();

    config.ensure_data_dir()?;
    let storage = LocalStorage::open(config.storage_path())
        .with_context(|| format!("Failed to open {:?}", config.storage_path()))?;
    info!(path = ?storage.path(), "Local storage opened");

    let addr = config.bind_address();
    let app = Application::build(config, storage.clone(), Arc::new(SystemTimeProvider)).await?;

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Flow Timer listening on http://{}", addr);
    info!("API available at http://{}/api/", addr);

    axum::serve(listener, app.router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, flushing pending uploads");
    let upload_worker = app.shutdown();
    if tokio::time::timeout(UPLOAD_DRAIN_TIMEOUT, upload_worker).await.is_err() {
        warn!("Pending uploads did not finish before shutdown");
    }
    storage.sync().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
