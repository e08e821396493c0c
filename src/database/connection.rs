//! Database connection manager
//!
//! Owns the pool of the remote user-document store. Works against SQLite and
//! PostgreSQL through the `Any` driver; queries stick to the SQL both accept.

use anyhow::Result;
use chrono::Utc;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::{query, query_as, AnyPool};
use tracing::{debug, info};

use super::types::DatabaseType;

/// Raw row of the `users` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    /// JSON object `{"YYYY-MM-DD": seconds}`
    pub history: String,
    pub is_premium: i64,
    /// Empty when no gateway customer is linked
    pub stripe_customer_id: String,
    pub updated_at: i64,
}

impl UserRow {
    pub fn customer_id(&self) -> Option<&str> {
        Some(self.stripe_customer_id.as_str()).filter(|id| !id.is_empty())
    }
}

/// Database connection manager
#[derive(Debug, Clone)]
pub struct DatabaseManager {
    pub pool: AnyPool,
    pub database_type: DatabaseType,
}

impl DatabaseManager {
    /// Connect to the store at `database_url`
    pub async fn new(database_url: &str) -> Result<Self> {
        install_default_drivers();

        let database_type = DatabaseType::from_url(database_url);
        info!("Connecting to stats store ({})", database_type);

        let mut options = AnyPoolOptions::new();
        if DatabaseType::is_in_memory(database_url) {
            // One long-lived connection, otherwise each one gets a fresh database
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

        debug!("Successfully connected to {} database", database_type);

        Ok(Self {
            pool,
            database_type,
        })
    }

    /// Create the schema if it does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations for {}", self.database_type);

        let integer = self.database_type.integer_type();
        let statement = format!(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                history TEXT NOT NULL DEFAULT '{{}}',
                is_premium {integer} NOT NULL DEFAULT 0,
                stripe_customer_id TEXT,
                updated_at {integer} NOT NULL
            )
            "
        );
        query(&statement).execute(&self.pool).await?;

        query("CREATE INDEX IF NOT EXISTS idx_users_stripe_customer ON users (stripe_customer_id)")
            .execute(&self.pool)
            .await?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Test database connection
    pub async fn test_connection(&self) -> Result<()> {
        query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| anyhow::anyhow!("Database connection test failed: {}", e))?;

        debug!("Database connection test successful");
        Ok(())
    }

    /// The `Any` driver cannot decode NULL into `Option<String>`, so the
    /// nullable customer column is read back as an empty string.
    pub async fn fetch_user(&self, user_id: &str) -> Result<Option<UserRow>, sqlx::Error> {
        query_as::<_, UserRow>(
            r"
            SELECT id, history, is_premium,
                COALESCE(stripe_customer_id, '') AS stripe_customer_id,
                updated_at
            FROM users
            WHERE id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Replace the history of a user, leaving billing columns alone
    pub async fn upsert_history(&self, user_id: &str, history_json: &str) -> Result<u64, sqlx::Error> {
        let result = query(
            r"
            INSERT INTO users (id, history, is_premium, updated_at)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (id) DO UPDATE SET history = excluded.history, updated_at = excluded.updated_at
            ",
        )
        .bind(user_id)
        .bind(history_json)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Flag a user premium, recording the gateway customer when known
    pub async fn grant_premium(
        &self,
        user_id: &str,
        customer_id: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let now = Utc::now().timestamp();

        let result = match customer_id {
            Some(customer_id) => {
                query(
                    r"
                    INSERT INTO users (id, is_premium, stripe_customer_id, updated_at)
                    VALUES ($1, 1, $2, $3)
                    ON CONFLICT (id) DO UPDATE SET
                        is_premium = 1,
                        stripe_customer_id = excluded.stripe_customer_id,
                        updated_at = excluded.updated_at
                    ",
                )
                .bind(user_id)
                .bind(customer_id)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
            None => {
                query(
                    r"
                    INSERT INTO users (id, is_premium, updated_at)
                    VALUES ($1, 1, $2)
                    ON CONFLICT (id) DO UPDATE SET is_premium = 1, updated_at = excluded.updated_at
                    ",
                )
                .bind(user_id)
                .bind(now)
                .execute(&self.pool)
                .await?
            }
        };

        Ok(result.rows_affected())
    }

    pub async fn set_premium(&self, user_id: &str, is_premium: bool) -> Result<u64, sqlx::Error> {
        let result = query("UPDATE users SET is_premium = $1, updated_at = $2 WHERE id = $3")
            .bind(i64::from(is_premium))
            .bind(Utc::now().timestamp())
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// First user linked to a gateway customer
    pub async fn find_user_by_customer(&self, customer_id: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            query_as("SELECT id FROM users WHERE stripe_customer_id = $1 LIMIT 1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(id,)| id))
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<u64, sqlx::Error> {
        let result = query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Get connection pool statistics
    pub fn pool_size(&self) -> u32 {
        self.pool.size()
    }
}
