//! Persistence layer
//!
//! Local key/value storage for the session and the remote user-document
//! store (SQLite or PostgreSQL through SQLx, or in memory).

pub mod connection;
pub mod local_storage;
pub mod stats_store;
pub mod types;

pub use connection::DatabaseManager;
pub use local_storage::LocalStorage;
pub use stats_store::{MemoryStatsStore, SharedStatsStore, SqlStatsStore, StatsStore, StatsSubscription};
pub use types::DatabaseType;
