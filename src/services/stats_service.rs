//! Statistics Aggregator
//!
//! Owns today's running focus total and the per-day history. Every change is
//! written to local storage right away; for a signed-in user the history is
//! also queued for upload to the remote store.

use chrono::NaiveDate;
use chrono_tz::Tz;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::database::local_storage::{keys, LocalStorage};
use crate::database::stats_store::SharedStatsStore;
use crate::logging::{log_focus_committed, log_persistence_failure};
use crate::models::statistics::{FocusHistory, UserStats};
use crate::services::time_provider::SharedTimeProvider;

/// History snapshot waiting to be written to the remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryUpload {
    pub user_id: String,
    pub history: FocusHistory,
}

/// Work for the upload worker
#[derive(Debug)]
pub enum UploadRequest {
    Save(HistoryUpload),
    /// Answered once every earlier save has been written
    Flush(oneshot::Sender<()>),
}

pub type UploadSender = mpsc::UnboundedSender<UploadRequest>;
pub type UploadReceiver = mpsc::UnboundedReceiver<UploadRequest>;

pub struct StatisticsAggregator {
    completed_focus_time: u64,
    last_focus_date: Option<NaiveDate>,
    history: FocusHistory,
    is_premium: bool,
    user_id: Option<String>,
    storage: LocalStorage,
    uploads: Option<UploadSender>,
    timezone: Tz,
    clock: SharedTimeProvider,
}

impl StatisticsAggregator {
    /// Restore from local storage and apply the daily rollover
    pub fn load(
        storage: LocalStorage,
        timezone: Tz,
        clock: SharedTimeProvider,
        uploads: Option<UploadSender>,
    ) -> Self {
        let last_focus_date = storage
            .get(keys::LAST_FOCUS_DATE, "")
            .parse::<NaiveDate>()
            .ok();

        let mut aggregator = Self {
            completed_focus_time: storage.get_number(keys::COMPLETED_FOCUS_TIME, 0),
            last_focus_date,
            history: load_history(&storage),
            is_premium: false,
            user_id: None,
            storage,
            uploads,
            timezone,
            clock,
        };

        aggregator.rollover();
        aggregator
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today(self.timezone)
    }

    /// Zero today's total when the last recorded day is not today
    ///
    /// History is left untouched. Returns whether a rollover happened.
    pub fn rollover(&mut self) -> bool {
        let today = self.today();
        if self.last_focus_date == Some(today) {
            return false;
        }

        debug!(
            previous = ?self.last_focus_date,
            today = %today,
            discarded = self.completed_focus_time,
            "Daily rollover"
        );

        self.completed_focus_time = 0;
        self.last_focus_date = Some(today);
        self.persist_totals();
        true
    }

    /// Record focused seconds against today; zero is ignored
    pub fn add_focus_time(&mut self, seconds: u64) {
        if seconds == 0 {
            return;
        }

        self.rollover();

        let today = self.today();
        self.completed_focus_time = self.completed_focus_time.saturating_add(seconds);
        self.history.add(today, seconds);

        log_focus_committed(seconds, self.completed_focus_time);

        self.persist_totals();
        self.persist_history();
        self.queue_upload();
    }

    /// Clear today's total and the whole history
    pub fn reset_stats(&mut self) {
        info!(days = self.history.len(), "Resetting statistics");

        self.completed_focus_time = 0;
        self.history.clear();

        self.persist_totals();
        self.persist_history();
        self.queue_upload();
    }

    /// Fold a remote snapshot into local state
    ///
    /// Remote days overwrite local ones, local-only days survive, and the
    /// premium flag is taken as is. The merged history is uploaded back only
    /// when the remote copy is missing something.
    pub fn apply_remote(&mut self, remote: &UserStats) {
        let needs_upload = self.history.merge_remote(&remote.history);
        self.is_premium = remote.is_premium;

        debug!(
            remote_days = remote.history.len(),
            local_days = self.history.len(),
            is_premium = self.is_premium,
            needs_upload,
            "Remote statistics merged"
        );

        self.persist_history();
        if needs_upload {
            self.queue_upload();
        }
    }

    /// Attach or detach the signed-in user
    ///
    /// Premium is never carried over between users.
    pub fn set_user(&mut self, user_id: Option<String>) {
        if self.user_id != user_id {
            self.is_premium = false;
        }
        self.user_id = user_id;
    }

    /// Today's total; zero once the recorded day has passed, even before
    /// the next [`Self::rollover`] persists that
    pub fn completed_focus_time(&self) -> u64 {
        if self.last_focus_date == Some(self.today()) {
            self.completed_focus_time
        } else {
            0
        }
    }

    pub fn history(&self) -> &FocusHistory {
        &self.history
    }

    pub fn is_premium(&self) -> bool {
        self.is_premium
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    fn persist_totals(&self) {
        let last = self
            .last_focus_date
            .map(|date| date.to_string())
            .unwrap_or_default();

        self.storage.set_many(&[
            (keys::COMPLETED_FOCUS_TIME, self.completed_focus_time.to_string()),
            (keys::LAST_FOCUS_DATE, last),
        ]);
    }

    fn persist_history(&self) {
        self.storage.set_json(keys::FOCUS_HISTORY, &self.history);
    }

    fn queue_upload(&self) {
        let (Some(user_id), Some(uploads)) = (&self.user_id, &self.uploads) else {
            return;
        };

        let upload = HistoryUpload {
            user_id: user_id.clone(),
            history: self.history.clone(),
        };

        if uploads.send(UploadRequest::Save(upload)).is_err() {
            log_persistence_failure("stats_store", &"upload worker has stopped");
        }
    }

    /// Barrier resolving once every upload queued so far has been written
    ///
    /// `None` when uploads are not wired or the worker has stopped.
    pub fn flush_uploads(&self) -> Option<oneshot::Receiver<()>> {
        let uploads = self.uploads.as_ref()?;
        let (done, receiver) = oneshot::channel();
        uploads.send(UploadRequest::Flush(done)).ok()?;
        Some(receiver)
    }
}

/// Stored history, or empty when absent
///
/// An unreadable value is copied to [`keys::CORRUPT_FOCUS_HISTORY`] before
/// the next write replaces it.
fn load_history(storage: &LocalStorage) -> FocusHistory {
    let raw = storage.get(keys::FOCUS_HISTORY, "");
    if raw.is_empty() {
        return FocusHistory::new();
    }

    match serde_json::from_str(&raw) {
        Ok(history) => history,
        Err(e) => {
            log_persistence_failure(keys::FOCUS_HISTORY, &e);
            warn!(
                backup_key = keys::CORRUPT_FOCUS_HISTORY,
                "Unreadable focus history moved aside"
            );
            storage.set(keys::CORRUPT_FOCUS_HISTORY, raw);
            FocusHistory::new()
        }
    }
}

/// Drain queued uploads into the remote store
///
/// Bursts are coalesced so only the newest history per user is written.
/// Failures are logged and not retried.
pub fn spawn_upload_worker(store: SharedStatsStore, mut receiver: UploadReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(first) = receiver.recv().await {
            let mut pending: Vec<HistoryUpload> = Vec::new();
            let mut flushes = Vec::new();

            let mut next = Some(first);
            while let Some(request) = next {
                match request {
                    UploadRequest::Save(upload) => {
                        match pending.iter_mut().find(|p| p.user_id == upload.user_id) {
                            Some(existing) => *existing = upload,
                            None => pending.push(upload),
                        }
                    }
                    UploadRequest::Flush(done) => flushes.push(done),
                }
                next = receiver.try_recv().ok();
            }

            for upload in pending {
                if let Err(e) = store.save_history(&upload.user_id, &upload.history).await {
                    log_persistence_failure("stats_store", &e);
                }
            }

            for done in flushes {
                let _ = done.send(());
            }
        }

        debug!("Upload worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::stats_store::{MemoryStatsStore, StatsStore};
    use crate::services::time_provider::MockTimeProvider;
    use std::sync::Arc;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock() -> MockTimeProvider {
        MockTimeProvider::new_from_ymd_hms(2026, 1, 2, 12, 0, 0).unwrap()
    }

    fn aggregator(storage: &LocalStorage, clock: &MockTimeProvider) -> StatisticsAggregator {
        StatisticsAggregator::load(storage.clone(), Tz::UTC, Arc::new(clock.clone()), None)
    }

    #[test]
    fn test_add_focus_time() {
        let storage = LocalStorage::in_memory();
        let mut stats = aggregator(&storage, &clock());

        stats.add_focus_time(0);
        assert!(stats.history().is_empty());

        stats.add_focus_time(120);
        stats.add_focus_time(30);
        assert_eq!(stats.completed_focus_time(), 150);
        assert_eq!(stats.history().get(day(2026, 1, 2)), 150);

        assert_eq!(storage.get_number(keys::COMPLETED_FOCUS_TIME, 0), 150);
        assert_eq!(storage.get(keys::LAST_FOCUS_DATE, ""), "2026-01-02");
        assert_eq!(
            storage.get_json::<FocusHistory>(keys::FOCUS_HISTORY).unwrap(),
            *stats.history()
        );
    }

    #[test]
    fn test_rollover_on_load_keeps_history() {
        let storage = LocalStorage::in_memory();
        let clock = clock();
        aggregator(&storage, &clock).add_focus_time(500);

        clock.advance_days(1);
        let stats = aggregator(&storage, &clock);

        assert_eq!(stats.completed_focus_time(), 0);
        assert_eq!(stats.history().get(day(2026, 1, 2)), 500);
        assert_eq!(storage.get_number(keys::COMPLETED_FOCUS_TIME, 99), 0);
        assert_eq!(storage.get(keys::LAST_FOCUS_DATE, ""), "2026-01-03");
    }

    #[test]
    fn test_same_day_reload_keeps_total() {
        let storage = LocalStorage::in_memory();
        let clock = clock();
        aggregator(&storage, &clock).add_focus_time(500);

        clock.advance_hours(3);
        assert_eq!(aggregator(&storage, &clock).completed_focus_time(), 500);
    }

    #[test]
    fn test_rollover_before_add_in_long_running_process() {
        let storage = LocalStorage::in_memory();
        let clock = clock();
        let mut stats = aggregator(&storage, &clock);
        stats.add_focus_time(100);

        clock.advance_days(1);
        stats.add_focus_time(40);

        assert_eq!(stats.completed_focus_time(), 40);
        assert_eq!(stats.history().get(day(2026, 1, 2)), 100);
        assert_eq!(stats.history().get(day(2026, 1, 3)), 40);
    }

    #[test]
    fn test_reset_stats() {
        let storage = LocalStorage::in_memory();
        let mut stats = aggregator(&storage, &clock());
        stats.add_focus_time(100);

        stats.reset_stats();
        assert_eq!(stats.completed_focus_time(), 0);
        assert!(stats.history().is_empty());
        assert!(storage.get_json::<FocusHistory>(keys::FOCUS_HISTORY).unwrap().is_empty());
    }

    #[test]
    fn test_remote_merge_and_upload_decision() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut stats = StatisticsAggregator::load(
            LocalStorage::in_memory(),
            Tz::UTC,
            Arc::new(clock()),
            Some(sender),
        );
        stats.add_focus_time(100);
        assert!(receiver.try_recv().is_err(), "anonymous users never upload");

        stats.set_user(Some("user-1".to_string()));

        // Remote lacks today's local entry: merge, then upload
        let remote = UserStats {
            history: [(day(2026, 1, 1), 50)].into_iter().collect(),
            is_premium: true,
        };
        stats.apply_remote(&remote);
        assert!(stats.is_premium());
        assert_eq!(stats.history().get(day(2026, 1, 1)), 50);
        assert_eq!(stats.history().get(day(2026, 1, 2)), 100);

        let Ok(UploadRequest::Save(upload)) = receiver.try_recv() else {
            panic!("expected a queued upload");
        };
        assert_eq!(upload.user_id, "user-1");
        assert_eq!(upload.history, *stats.history());

        // The echo of our own upload changes nothing and is not re-uploaded
        let echo = UserStats {
            history: stats.history().clone(),
            is_premium: true,
        };
        stats.apply_remote(&echo);
        assert!(receiver.try_recv().is_err());

        stats.set_user(None);
        assert!(!stats.is_premium());
        assert_eq!(stats.history().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_worker_writes_latest_history() {
        let store = Arc::new(MemoryStatsStore::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = spawn_upload_worker(store.clone(), receiver);

        for seconds in [10, 20, 30] {
            sender
                .send(UploadRequest::Save(HistoryUpload {
                    user_id: "user-1".to_string(),
                    history: [(day(2026, 1, 2), seconds)].into_iter().collect(),
                }))
                .unwrap();
        }
        drop(sender);
        worker.await.unwrap();

        let stored = store.fetch_user_data("user-1").await.unwrap();
        assert_eq!(stored.history.get(day(2026, 1, 2)), 30);
    }

    #[tokio::test]
    async fn test_flush_waits_for_queued_uploads() {
        let store = Arc::new(MemoryStatsStore::new());
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = spawn_upload_worker(store.clone(), receiver);

        let mut stats = StatisticsAggregator::load(
            LocalStorage::in_memory(),
            Tz::UTC,
            Arc::new(clock()),
            Some(sender),
        );
        stats.set_user(Some("user-1".to_string()));
        stats.add_focus_time(75);

        stats.flush_uploads().unwrap().await.unwrap();
        let stored = store.fetch_user_data("user-1").await.unwrap();
        assert_eq!(stored.history.get(day(2026, 1, 2)), 75);

        drop(stats);
        worker.await.unwrap();
    }

    #[test]
    fn test_flush_without_worker() {
        let stats = aggregator(&LocalStorage::in_memory(), &clock());
        assert!(stats.flush_uploads().is_none());
    }

    #[test]
    fn test_corrupt_history_is_moved_aside() {
        let storage = LocalStorage::in_memory();
        storage.set(keys::FOCUS_HISTORY, "{not json");

        let mut stats = aggregator(&storage, &clock());
        assert!(stats.history().is_empty());
        assert_eq!(storage.get(keys::CORRUPT_FOCUS_HISTORY, ""), "{not json");

        stats.add_focus_time(30);
        assert_eq!(storage.get(keys::CORRUPT_FOCUS_HISTORY, ""), "{not json");
        assert_eq!(
            storage.get_json::<FocusHistory>(keys::FOCUS_HISTORY).unwrap().get(day(2026, 1, 2)),
            30
        );
    }

    #[test]
    fn test_total_reads_zero_after_midnight() {
        let storage = LocalStorage::in_memory();
        let clock = clock();
        let mut stats = aggregator(&storage, &clock);
        stats.add_focus_time(7000);

        clock.advance_days(1);
        assert_eq!(stats.completed_focus_time(), 0);
        assert_eq!(stats.history().get(day(2026, 1, 2)), 7000);

        assert!(stats.rollover());
        assert_eq!(storage.get(keys::LAST_FOCUS_DATE, ""), "2026-01-03");
    }
}
