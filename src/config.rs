//! Configuration management for Flow Timer
//!
//! Handles environment variables and application settings. Provider
//! credentials are optional: a missing key disables the feature with a
//! warning instead of failing startup.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Log level
    pub log_level: String,

    /// Emit JSON log lines in addition to the console output
    pub json_logs: bool,

    /// Directory holding the local key/value storage file
    pub data_dir: PathBuf,

    /// Built web client to serve at `/`, if any
    pub static_dir: Option<PathBuf>,

    /// Remote user-document store; `None` keeps statistics in memory only
    pub database_url: Option<String>,

    /// Timezone that defines "today" for statistics
    pub timezone: Tz,

    /// Public origin of the web client, used for redirect URLs
    pub client_url: String,

    /// CORS origins (empty means allow all)
    pub cors_origins: Vec<String>,

    /// Identity Toolkit web API key
    pub identity_api_key: Option<String>,

    /// Stripe secret API key
    pub stripe_secret_key: Option<String>,

    /// Stripe price identifier of the premium subscription
    pub stripe_price_id: Option<String>,

    /// Stripe webhook signing secret
    pub stripe_webhook_secret: Option<String>,

    /// WebSocket heartbeat interval in seconds
    pub websocket_heartbeat_interval: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "development".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            data_dir: PathBuf::from("./data"),
            static_dir: None,
            database_url: None,
            timezone: Tz::UTC,
            client_url: "http://localhost:5173".to_string(),
            cors_origins: vec![],
            identity_api_key: None,
            stripe_secret_key: None,
            stripe_price_id: None,
            stripe_webhook_secret: None,
            websocket_heartbeat_interval: 30,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Server configuration
        if let Ok(host) = env::var("FLOW_TIMER_HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("FLOW_TIMER_PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidPort(port))?;
        }

        if let Ok(environment) = env::var("FLOW_TIMER_ENVIRONMENT") {
            config.environment = environment;
        }

        // Logging
        if let Ok(log_level) = env::var("FLOW_TIMER_LOG_LEVEL") {
            config.log_level = log_level;
        }

        if let Ok(json_logs) = env::var("FLOW_TIMER_JSON_LOGS") {
            config.json_logs = json_logs
                .parse()
                .map_err(|_| ConfigError::InvalidBool(json_logs))?;
        }

        // Storage
        if let Ok(data_dir) = env::var("FLOW_TIMER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        config.static_dir = non_empty_var("FLOW_TIMER_STATIC_DIR").map(PathBuf::from);
        config.database_url = non_empty_var("FLOW_TIMER_DATABASE_URL");

        if let Ok(timezone) = env::var("FLOW_TIMER_TIMEZONE") {
            config.timezone = timezone
                .parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(timezone))?;
        }

        // Web client
        if let Ok(client_url) = env::var("FLOW_TIMER_CLIENT_URL") {
            config.client_url = client_url;
        }

        if let Ok(cors_origins) = env::var("FLOW_TIMER_CORS_ORIGINS") {
            config.cors_origins = cors_origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Providers
        config.identity_api_key = non_empty_var("FLOW_TIMER_IDENTITY_API_KEY");
        config.stripe_secret_key = non_empty_var("STRIPE_SECRET_KEY");
        config.stripe_price_id = non_empty_var("STRIPE_PRICE_ID");
        config.stripe_webhook_secret = non_empty_var("STRIPE_WEBHOOK_SECRET");

        if let Ok(heartbeat_interval) = env::var("FLOW_TIMER_WEBSOCKET_HEARTBEAT_INTERVAL") {
            config.websocket_heartbeat_interval = heartbeat_interval
                .parse()
                .map_err(|_| ConfigError::InvalidWebSocketHeartbeat(heartbeat_interval))?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port.to_string()));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyDataDir);
        }

        if url::Url::parse(&self.client_url).is_err() {
            return Err(ConfigError::InvalidClientUrl(self.client_url.clone()));
        }

        if self.websocket_heartbeat_interval == 0 {
            return Err(ConfigError::InvalidWebSocketHeartbeat(
                self.websocket_heartbeat_interval.to_string(),
            ));
        }

        Ok(())
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Path of the local key/value storage file
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join("flow_timer.json")
    }

    /// Whether sign-in through the identity provider is available
    pub fn auth_enabled(&self) -> bool {
        self.identity_api_key.is_some()
    }

    /// Whether checkout sessions can be created
    pub fn checkout_enabled(&self) -> bool {
        self.stripe_secret_key.is_some() && self.stripe_price_id.is_some()
    }

    /// Create data directory if it doesn't exist
    pub fn ensure_data_dir(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir)
            .map_err(|e| ConfigError::DataDirCreationFailed(e.to_string()))?;
        Ok(())
    }

    /// Log configuration (excluding sensitive data)
    pub fn log_config(&self) {
        info!("Configuration loaded:");
        info!("  Environment: {}", self.environment);
        info!("  Bind address: {}", self.bind_address());
        info!("  Data directory: {:?}", self.data_dir);
        if let Some(static_dir) = &self.static_dir {
            info!("  Serving web client from: {:?}", static_dir);
        }
        info!("  Stats store: {}", self.mask_database_url());
        info!("  Timezone: {}", self.timezone);
        info!("  Client URL: {}", self.client_url);
        info!("  CORS origins: {:?}", self.cors_origins);

        if !self.auth_enabled() {
            warn!("FLOW_TIMER_IDENTITY_API_KEY is not set - sign-in is disabled");
        }
        if !self.checkout_enabled() {
            warn!("STRIPE_SECRET_KEY or STRIPE_PRICE_ID is not set - checkout is disabled");
        }
        if self.stripe_webhook_secret.is_none() {
            warn!("STRIPE_WEBHOOK_SECRET is not set - webhook events will be rejected");
        }
    }

    /// Mask database URL for logging
    fn mask_database_url(&self) -> String {
        match &self.database_url {
            None => "in-memory".to_string(),
            Some(url) if url.starts_with("sqlite:") => url.clone(),
            Some(url) => match url.split_once("://") {
                Some((scheme, _)) => format!("{}://***", scheme),
                None => "***".to_string(),
            },
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    #[error("Invalid boolean value: {0}")]
    InvalidBool(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid client URL: {0}")]
    InvalidClientUrl(String),

    #[error("Invalid WebSocket heartbeat interval: {0}")]
    InvalidWebSocketHeartbeat(String),

    #[error("Empty data directory")]
    EmptyDataDir,

    #[error("Data directory creation failed: {0}")]
    DataDirCreationFailed(String),
}
