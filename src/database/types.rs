//! Database types and enums

use std::str::FromStr;
use tracing::warn;

/// Supported remote store backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DatabaseType {
    #[default]
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "postgres")]
    Postgres,
}

impl DatabaseType {
    /// Get database type from connection URL
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("sqlite:") {
            DatabaseType::Sqlite
        } else if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            DatabaseType::Postgres
        } else {
            warn!("Unknown database URL format: {}, defaulting to SQLite", url);
            DatabaseType::Sqlite
        }
    }

    /// Whether every pooled connection would see its own private database
    pub fn is_in_memory(url: &str) -> bool {
        url.starts_with("sqlite:") && url.contains(":memory:")
    }

    /// Column type used for integer columns
    pub fn integer_type(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "INTEGER",
            DatabaseType::Postgres => "BIGINT",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatabaseType::Sqlite => write!(f, "sqlite"),
            DatabaseType::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseType::Sqlite),
            "postgres" | "postgresql" => Ok(DatabaseType::Postgres),
            _ => Err(format!("Invalid database type: {}. Supported types: sqlite, postgres", s)),
        }
    }
}
