//! Application assembly
//!
//! Builds the collaborators, the statistics pipeline and the timer service
//! from a [`Config`], and hands out the router.

use anyhow::{Context, Result};
use axum::Router;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::api::{create_router, AppState};
use crate::config::Config;
use crate::database::{DatabaseManager, LocalStorage, MemoryStatsStore, SharedStatsStore, SqlStatsStore};
use crate::services::{
    spawn_upload_worker, AuthProvider, BillingService, IdentityToolkitAuth, SessionMachine,
    SharedTimeProvider, StatisticsAggregator, TimerService,
};

/// Running application: shared state plus its background workers
pub struct Application {
    state: AppState,
    upload_worker: JoinHandle<()>,
}

impl Application {
    /// Wire everything with the Identity Toolkit auth provider
    pub async fn build(config: Config, storage: LocalStorage, clock: SharedTimeProvider) -> Result<Self> {
        let auth = Arc::new(IdentityToolkitAuth::new(
            config.identity_api_key.clone(),
            &config.client_url,
        ));
        Self::build_with_auth(config, storage, clock, auth).await
    }

    pub async fn build_with_auth(
        config: Config,
        storage: LocalStorage,
        clock: SharedTimeProvider,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let store = open_stats_store(&config).await?;

        let (uploads, upload_receiver) = mpsc::unbounded_channel();
        let upload_worker = spawn_upload_worker(store.clone(), upload_receiver);

        let stats = StatisticsAggregator::load(storage.clone(), config.timezone, clock, Some(uploads));
        let machine = SessionMachine::load(storage, stats);
        let timer = TimerService::new(machine, store.clone());
        timer.follow_auth_changes(auth.subscribe_to_auth_changes());

        let billing = Arc::new(BillingService::new(&config, store.clone()));

        let state = AppState {
            timer,
            auth,
            store,
            billing,
            config: Arc::new(config),
        };

        Ok(Self { state, upload_worker })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    /// Stop the timer tasks; queued uploads still drain
    ///
    /// The upload worker exits on its own once the last sender is dropped.
    pub fn shutdown(self) -> JoinHandle<()> {
        let Self { state, upload_worker } = self;
        state.timer.shutdown();
        upload_worker
    }
}

async fn open_stats_store(config: &Config) -> Result<SharedStatsStore> {
    let Some(url) = config.database_url.as_deref() else {
        info!("No database configured, keeping statistics in memory");
        return Ok(Arc::new(MemoryStatsStore::new()));
    };

    let db = DatabaseManager::new(url)
        .await
        .context("Failed to connect to the stats database")?;
    db.migrate().await.context("Failed to run database migrations")?;
    db.test_connection().await?;
    info!(
        database_type = %db.database_type,
        pool_size = db.pool_size(),
        "Stats database ready"
    );

    Ok(Arc::new(SqlStatsStore::new(db)))
}
