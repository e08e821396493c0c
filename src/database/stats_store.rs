//! Remote stats store
//!
//! One document per user holding the focus history and the premium flag.
//! Subscribers get the current document right away and again after every
//! change made through the store.

use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, Instrument};

use crate::database::connection::{DatabaseManager, UserRow};
use crate::db_span;
use crate::error::AppResult;
use crate::models::statistics::{FocusHistory, UserStats};

/// Live view of one user document
#[derive(Debug)]
pub struct StatsSubscription {
    receiver: watch::Receiver<UserStats>,
    delivered_initial: bool,
}

impl StatsSubscription {
    fn new(receiver: watch::Receiver<UserStats>) -> Self {
        Self {
            receiver,
            delivered_initial: false,
        }
    }

    /// Next document snapshot; `None` once the store stops publishing
    pub async fn next(&mut self) -> Option<UserStats> {
        if self.delivered_initial {
            self.receiver.changed().await.ok()?;
        } else {
            self.delivered_initial = true;
        }
        Some(self.receiver.borrow_and_update().clone())
    }
}

/// User document persistence
///
/// Methods return boxed futures so implementations can live behind
/// `Arc<dyn StatsStore>`.
pub trait StatsStore: Send + Sync {
    /// Stream the user's document, starting with its current value
    fn subscribe_to_user_data<'a>(&'a self, user_id: &'a str)
        -> BoxFuture<'a, AppResult<StatsSubscription>>;

    /// Current document, `{}`/false when absent
    fn fetch_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<UserStats>>;

    /// Replace the stored history; other fields are untouched
    fn save_history<'a>(
        &'a self,
        user_id: &'a str,
        history: &'a FocusHistory,
    ) -> BoxFuture<'a, AppResult<()>>;

    fn delete_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<()>>;

    /// Flag the user premium and remember the gateway customer
    fn mark_premium<'a>(
        &'a self,
        user_id: &'a str,
        customer_id: Option<&'a str>,
    ) -> BoxFuture<'a, AppResult<()>>;

    /// Clear premium on the user linked to `customer_id`, returning that user
    fn revoke_premium_for_customer<'a>(
        &'a self,
        customer_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<String>>>;

    /// Gateway customer recorded for the user, if any
    fn customer_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<Option<String>>>;
}

/// Per-user watch channels shared by the store implementations
#[derive(Debug, Default)]
struct Subscribers {
    channels: Mutex<HashMap<String, watch::Sender<UserStats>>>,
}

impl Subscribers {
    /// Start watching `user_id` before its current document is read
    fn register(&self, user_id: &str) -> watch::Receiver<UserStats> {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        match channels.get(user_id) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(UserStats::default());
                channels.insert(user_id.to_string(), sender);
                receiver
            }
        }
    }

    /// Hand the freshly read document to a registered receiver
    ///
    /// A change published after registration is newer than `current`, so it
    /// is kept instead.
    fn seed(
        &self,
        user_id: &str,
        receiver: watch::Receiver<UserStats>,
        current: UserStats,
    ) -> StatsSubscription {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(sender) = channels.get(user_id) {
            if !receiver.has_changed().unwrap_or(true) {
                sender.send_replace(current);
            }
        }

        StatsSubscription::new(receiver)
    }

    fn is_watched(&self, user_id: &str) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(user_id)
    }

    fn publish(&self, user_id: &str, stats: UserStats) {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(sender) = channels.get(user_id) {
            if sender.send(stats).is_err() {
                // Every subscription was dropped
                channels.remove(user_id);
            }
        }
    }
}

fn stats_from_row(row: UserRow) -> AppResult<UserStats> {
    let history = if row.history.trim().is_empty() {
        FocusHistory::new()
    } else {
        serde_json::from_str(&row.history)?
    };

    Ok(UserStats {
        history,
        is_premium: row.is_premium != 0,
    })
}

/// SQL-backed store
#[derive(Debug)]
pub struct SqlStatsStore {
    db: DatabaseManager,
    subscribers: Subscribers,
}

impl SqlStatsStore {
    pub fn new(db: DatabaseManager) -> Self {
        Self {
            db,
            subscribers: Subscribers::default(),
        }
    }

    async fn load(&self, user_id: &str) -> AppResult<UserStats> {
        match self.db.fetch_user(user_id).await? {
            Some(row) => stats_from_row(row),
            None => Ok(UserStats::default()),
        }
    }

    /// Push the stored document to subscribers of `user_id`
    async fn notify(&self, user_id: &str) -> AppResult<()> {
        if self.subscribers.is_watched(user_id) {
            let stats = self.load(user_id).await?;
            self.subscribers.publish(user_id, stats);
        }
        Ok(())
    }
}

impl StatsStore for SqlStatsStore {
    fn subscribe_to_user_data<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, AppResult<StatsSubscription>> {
        Box::pin(async move {
            let receiver = self.subscribers.register(user_id);
            let current = self.load(user_id).await?;
            Ok(self.subscribers.seed(user_id, receiver, current))
        })
    }

    fn fetch_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<UserStats>> {
        Box::pin(self.load(user_id).instrument(db_span!("fetch_user_data", user_id)))
    }

    fn save_history<'a>(
        &'a self,
        user_id: &'a str,
        history: &'a FocusHistory,
    ) -> BoxFuture<'a, AppResult<()>> {
        let span = db_span!("save_history", user_id);
        Box::pin(
            async move {
                let json = serde_json::to_string(history)?;
                let rows = self.db.upsert_history(user_id, &json).await?;
                tracing::Span::current().record("rows_affected", rows);
                debug!(days = history.len(), "History saved");
                self.notify(user_id).await
            }
            .instrument(span),
        )
    }

    fn delete_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        let span = db_span!("delete_user_data", user_id);
        Box::pin(
            async move {
                let rows = self.db.delete_user(user_id).await?;
                tracing::Span::current().record("rows_affected", rows);
                self.notify(user_id).await
            }
            .instrument(span),
        )
    }

    fn mark_premium<'a>(
        &'a self,
        user_id: &'a str,
        customer_id: Option<&'a str>,
    ) -> BoxFuture<'a, AppResult<()>> {
        let span = db_span!("mark_premium", user_id);
        Box::pin(
            async move {
                let rows = self.db.grant_premium(user_id, customer_id).await?;
                tracing::Span::current().record("rows_affected", rows);
                self.notify(user_id).await
            }
            .instrument(span),
        )
    }

    fn revoke_premium_for_customer<'a>(
        &'a self,
        customer_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<String>>> {
        Box::pin(async move {
            let Some(user_id) = self.db.find_user_by_customer(customer_id).await? else {
                return Ok(None);
            };

            self.db.set_premium(&user_id, false).await?;
            self.notify(&user_id).await?;
            Ok(Some(user_id))
        })
    }

    fn customer_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<Option<String>>> {
        Box::pin(async move {
            Ok(self
                .db
                .fetch_user(user_id)
                .await?
                .and_then(|row| row.customer_id().map(str::to_string)))
        })
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryDocument {
    stats: UserStats,
    customer_id: Option<String>,
}

/// Process-local store used when no database is configured
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    documents: Mutex<HashMap<String, MemoryDocument>>,
    subscribers: Subscribers,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self, user_id: &str) -> UserStats {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(|doc| doc.stats.clone())
            .unwrap_or_default()
    }

    fn update(&self, user_id: &str, apply: impl FnOnce(&mut MemoryDocument)) {
        let stats = {
            let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
            let document = documents.entry(user_id.to_string()).or_default();
            apply(document);
            document.stats.clone()
        };
        self.subscribers.publish(user_id, stats);
    }
}

impl StatsStore for MemoryStatsStore {
    fn subscribe_to_user_data<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, AppResult<StatsSubscription>> {
        let receiver = self.subscribers.register(user_id);
        let subscription = self.subscribers.seed(user_id, receiver, self.current(user_id));
        Box::pin(async move { Ok(subscription) })
    }

    fn fetch_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<UserStats>> {
        let current = self.current(user_id);
        Box::pin(async move { Ok(current) })
    }

    fn save_history<'a>(
        &'a self,
        user_id: &'a str,
        history: &'a FocusHistory,
    ) -> BoxFuture<'a, AppResult<()>> {
        self.update(user_id, |doc| doc.stats.history = history.clone());
        Box::pin(async { Ok(()) })
    }

    fn delete_user_data<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<()>> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(user_id);
        self.subscribers.publish(user_id, UserStats::default());
        Box::pin(async { Ok(()) })
    }

    fn mark_premium<'a>(
        &'a self,
        user_id: &'a str,
        customer_id: Option<&'a str>,
    ) -> BoxFuture<'a, AppResult<()>> {
        self.update(user_id, |doc| {
            doc.stats.is_premium = true;
            if let Some(customer_id) = customer_id {
                doc.customer_id = Some(customer_id.to_string());
            }
        });
        Box::pin(async { Ok(()) })
    }

    fn revoke_premium_for_customer<'a>(
        &'a self,
        customer_id: &'a str,
    ) -> BoxFuture<'a, AppResult<Option<String>>> {
        let user_id = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, doc)| doc.customer_id.as_deref() == Some(customer_id))
            .map(|(id, _)| id.clone());

        if let Some(user_id) = &user_id {
            self.update(user_id, |doc| doc.stats.is_premium = false);
        }
        Box::pin(async move { Ok(user_id) })
    }

    fn customer_id<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, AppResult<Option<String>>> {
        let customer_id = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .and_then(|doc| doc.customer_id.clone());
        Box::pin(async move { Ok(customer_id) })
    }
}

/// Shared handle used by the services
pub type SharedStatsStore = Arc<dyn StatsStore>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn history(seconds: u64) -> FocusHistory {
        [(NaiveDate::from_ymd_opt(2026, 1, 2).unwrap(), seconds)]
            .into_iter()
            .collect()
    }

    async fn sql_store() -> SqlStatsStore {
        let db = DatabaseManager::new("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        SqlStatsStore::new(db)
    }

    async fn exercise_store(store: &dyn StatsStore) {
        assert_eq!(store.fetch_user_data("ghost").await.unwrap(), UserStats::default());

        let mut subscription = store.subscribe_to_user_data("user-1").await.unwrap();
        assert_eq!(subscription.next().await.unwrap(), UserStats::default());

        store.save_history("user-1", &history(60)).await.unwrap();
        let update = subscription.next().await.unwrap();
        assert_eq!(update.history, history(60));
        assert!(!update.is_premium);

        store.mark_premium("user-1", Some("cus_1")).await.unwrap();
        assert!(subscription.next().await.unwrap().is_premium);
        assert_eq!(store.customer_id("user-1").await.unwrap().as_deref(), Some("cus_1"));

        // Saving history never clears premium
        store.save_history("user-1", &history(90)).await.unwrap();
        let update = subscription.next().await.unwrap();
        assert!(update.is_premium);
        assert_eq!(update.history, history(90));

        let revoked = store.revoke_premium_for_customer("cus_1").await.unwrap();
        assert_eq!(revoked.as_deref(), Some("user-1"));
        assert!(!subscription.next().await.unwrap().is_premium);
        assert!(store.revoke_premium_for_customer("cus_other").await.unwrap().is_none());

        store.delete_user_data("user-1").await.unwrap();
        assert_eq!(subscription.next().await.unwrap(), UserStats::default());
        assert!(store.customer_id("user-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise_store(&MemoryStatsStore::new()).await;
    }

    #[tokio::test]
    async fn test_sql_store_contract() {
        exercise_store(&sql_store().await).await;
    }

    #[tokio::test]
    async fn test_change_published_while_subscribing_wins() {
        let subscribers = Subscribers::default();
        let receiver = subscribers.register("user-1");

        // Lands after registration but before the stale read is seeded
        let newer = UserStats {
            history: history(90),
            is_premium: true,
        };
        subscribers.publish("user-1", newer.clone());

        let stale = UserStats {
            history: history(60),
            is_premium: false,
        };
        let mut subscription = subscribers.seed("user-1", receiver, stale);
        assert_eq!(subscription.next().await.unwrap(), newer);
    }

    #[tokio::test]
    async fn test_sql_subscription_sees_existing_row() {
        let store = sql_store().await;
        store.save_history("user-1", &history(45)).await.unwrap();

        let mut subscription = store.subscribe_to_user_data("user-1").await.unwrap();
        assert_eq!(subscription.next().await.unwrap().history, history(45));

        store.save_history("user-1", &history(50)).await.unwrap();
        assert_eq!(subscription.next().await.unwrap().history, history(50));
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_publishing() {
        let store = MemoryStatsStore::new();
        let subscription = store.subscribe_to_user_data("user-1").await.unwrap();
        drop(subscription);

        store.save_history("user-1", &history(5)).await.unwrap();
        assert!(!store.subscribers.is_watched("user-1"));
    }
}
