//! Timer Service
//!
//! Async driver around the session machine. Runs the one-second ticker while
//! the session is running, performs the break-end action after the tick that
//! emptied the break, follows the signed-in user's remote statistics and
//! broadcasts every state change to connected clients.

use chrono::Utc;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::database::stats_store::SharedStatsStore;
use crate::error::{AppError, AppResult};
use crate::logging::log_persistence_failure;
use crate::models::auth::AuthUser;
use crate::models::chart::{ChartTab, Report};
use crate::models::mode::Mode;
use crate::models::session::SessionSnapshot;
use crate::models::websocket_messages::{BreakFinishedMessage, ServerMessage};
use crate::services::chart_service::build_demo_report;
use crate::services::session_machine::{SessionMachine, TickOutcome};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
const BROADCAST_CAPACITY: usize = 256;

type SharedMachine = Arc<Mutex<SessionMachine>>;

pub struct TimerService {
    machine: SharedMachine,
    store: SharedStatsStore,
    updates: broadcast::Sender<ServerMessage>,
    break_events: mpsc::UnboundedSender<Mode>,
    ticker: StdMutex<Option<JoinHandle<()>>>,
    user_sync: StdMutex<Option<JoinHandle<()>>>,
    background: StdMutex<Vec<JoinHandle<()>>>,
}

impl TimerService {
    /// Wrap `machine` and start the break-end listener
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(machine: SessionMachine, store: SharedStatsStore) -> Arc<Self> {
        let (updates, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (break_events, break_receiver) = mpsc::unbounded_channel();
        let machine = Arc::new(Mutex::new(machine));

        let listener = tokio::spawn(run_break_listener(
            machine.clone(),
            updates.clone(),
            break_receiver,
        ));

        Arc::new(Self {
            machine,
            store,
            updates,
            break_events,
            ticker: StdMutex::new(None),
            user_sync: StdMutex::new(None),
            background: StdMutex::new(vec![listener]),
        })
    }

    /// Receive every message broadcast from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMessage> {
        self.updates.subscribe()
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.machine.lock().await.snapshot()
    }

    pub async fn toggle(&self) -> SessionSnapshot {
        self.apply(SessionMachine::toggle_timer).await
    }

    pub async fn reset(&self) -> SessionSnapshot {
        self.apply(SessionMachine::handle_reset).await
    }

    pub async fn next_mode(&self) -> SessionSnapshot {
        self.apply(SessionMachine::handle_next_mode).await
    }

    pub async fn switch_mode(&self, mode: Mode) -> SessionSnapshot {
        self.apply(|machine| machine.handle_mode_switch(mode)).await
    }

    /// Wipe statistics; rejected unless explicitly confirmed
    pub async fn reset_stats(&self, confirmed: bool) -> AppResult<SessionSnapshot> {
        if !confirmed {
            return Err(AppError::validation_error(
                "Resetting statistics must be confirmed",
            ));
        }

        Ok(self
            .apply(|machine| {
                machine.handle_reset_stats(true);
            })
            .await)
    }

    /// Productivity report; premium users only
    pub async fn report(&self, tab: ChartTab) -> AppResult<Report> {
        let machine = self.machine.lock().await;
        if !machine.stats().is_premium() {
            return Err(AppError::PremiumRequired);
        }
        Ok(machine.report(tab))
    }

    /// Report preview over sample data
    pub async fn demo_report(&self, tab: ChartTab) -> Report {
        let today = self.machine.lock().await.today();
        build_demo_report(tab, today)
    }

    pub async fn current_user_id(&self) -> Option<String> {
        self.machine.lock().await.stats().user_id().map(str::to_string)
    }

    /// Apply a transition, then reconcile the ticker and notify clients
    ///
    /// The ticker is started or stopped while the machine is still locked so
    /// that no tick can land between the transition and the reconciliation.
    async fn apply(&self, operation: impl FnOnce(&mut SessionMachine)) -> SessionSnapshot {
        let snapshot = {
            let mut machine = self.machine.lock().await;
            operation(&mut *machine);
            self.sync_ticker(machine.is_running());
            machine.snapshot()
        };

        self.broadcast(ServerMessage::SessionUpdate(snapshot.clone()));
        snapshot
    }

    fn sync_ticker(&self, running: bool) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);

        if running {
            let active = ticker.as_ref().is_some_and(|handle| !handle.is_finished());
            if !active {
                *ticker = Some(tokio::spawn(run_ticker(
                    self.machine.clone(),
                    self.updates.clone(),
                    self.break_events.clone(),
                )));
            }
        } else if let Some(handle) = ticker.take() {
            handle.abort();
        }
    }

    fn broadcast(&self, message: ServerMessage) {
        // No receivers just means no client is connected
        let _ = self.updates.send(message);
    }

    /// Switch the statistics owner and follow their remote document
    pub async fn attach_user(&self, user: Option<AuthUser>) {
        let user_id = user.map(|user| user.uid);

        let previous = self
            .user_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = previous {
            task.abort();
        }

        let snapshot = {
            let mut machine = self.machine.lock().await;
            machine.set_user(user_id.clone());
            machine.snapshot()
        };
        self.broadcast(ServerMessage::SessionUpdate(snapshot));

        let Some(user_id) = user_id else {
            info!("Statistics detached from user");
            return;
        };

        info!(user_id = %user_id, "Following remote statistics");
        let task = tokio::spawn(run_user_sync(
            self.machine.clone(),
            self.store.clone(),
            self.updates.clone(),
            user_id,
        ));
        *self.user_sync.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Stop following the user's document and wait for their queued uploads
    ///
    /// Once this returns nothing more is written on the user's behalf, so
    /// their remote document can be deleted for good.
    pub async fn detach_user(&self) {
        self.attach_user(None).await;

        let flushed = self.machine.lock().await.stats().flush_uploads();
        if let Some(flushed) = flushed {
            if flushed.await.is_err() {
                warn!("Upload worker stopped before pending uploads were written");
            }
        }
    }

    /// Forward auth state changes into [`Self::attach_user`]
    pub fn follow_auth_changes(self: &Arc<Self>, mut changes: watch::Receiver<Option<AuthUser>>) {
        let service = Arc::clone(self);

        let task = tokio::spawn(async move {
            let initial = changes.borrow_and_update().clone();
            service.attach_user(initial).await;

            while changes.changed().await.is_ok() {
                let user = changes.borrow_and_update().clone();
                service.attach_user(user).await;
            }
        });

        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task);
    }

    /// Stop every background task
    pub fn shutdown(&self) {
        let ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner).take();
        let user_sync = self.user_sync.lock().unwrap_or_else(PoisonError::into_inner).take();
        let background = std::mem::take(
            &mut *self.background.lock().unwrap_or_else(PoisonError::into_inner),
        );

        for task in ticker.into_iter().chain(user_sync).chain(background) {
            task.abort();
        }
        info!("Timer service stopped");
    }
}

/// One task per running period
async fn run_ticker(
    machine: SharedMachine,
    updates: broadcast::Sender<ServerMessage>,
    break_events: mpsc::UnboundedSender<Mode>,
) {
    let mut interval = interval_at(Instant::now() + TICK_INTERVAL, TICK_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        let (outcome, snapshot) = {
            let mut machine = machine.lock().await;
            let outcome = machine.tick();
            (outcome, machine.snapshot())
        };

        match outcome {
            TickOutcome::Idle => break,
            TickOutcome::Advanced => {
                let _ = updates.send(ServerMessage::SessionUpdate(snapshot));
            }
            TickOutcome::BreakFinished { finished_mode } => {
                let _ = updates.send(ServerMessage::SessionUpdate(snapshot));
                if break_events.send(finished_mode).is_err() {
                    warn!("Break-end listener is gone");
                }
                break;
            }
        }
    }

    debug!("Ticker stopped");
}

/// Runs the break-end action once the finishing tick has committed
async fn run_break_listener(
    machine: SharedMachine,
    updates: broadcast::Sender<ServerMessage>,
    mut events: mpsc::UnboundedReceiver<Mode>,
) {
    while let Some(finished_mode) = events.recv().await {
        let snapshot = {
            let mut machine = machine.lock().await;
            let session = machine.session();

            // A transition may have run in between
            if session.mode != finished_mode || session.is_running || session.time != 0 {
                debug!(finished_mode = %finished_mode, "Break end superseded");
                continue;
            }

            machine.handle_break_end();
            machine.snapshot()
        };

        let _ = updates.send(ServerMessage::BreakFinished(BreakFinishedMessage {
            finished_mode,
            timestamp: Utc::now(),
        }));
        let _ = updates.send(ServerMessage::SessionUpdate(snapshot));
    }
}

/// Merge every remote snapshot of `user_id` into the machine
async fn run_user_sync(
    machine: SharedMachine,
    store: SharedStatsStore,
    updates: broadcast::Sender<ServerMessage>,
    user_id: String,
) {
    let mut subscription = match store.subscribe_to_user_data(&user_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            log_persistence_failure("stats_store", &e);
            return;
        }
    };

    while let Some(remote) = subscription.next().await {
        let snapshot = {
            let mut machine = machine.lock().await;
            if machine.stats().user_id() != Some(user_id.as_str()) {
                break;
            }
            machine.apply_remote_stats(&remote);
            machine.snapshot()
        };

        let _ = updates.send(ServerMessage::SessionUpdate(snapshot));
    }

    debug!(user_id = %user_id, "Remote statistics subscription ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::local_storage::LocalStorage;
    use crate::database::stats_store::{MemoryStatsStore, StatsStore};
    use crate::models::statistics::UserStats;
    use crate::services::stats_service::StatisticsAggregator;
    use crate::services::time_provider::MockTimeProvider;
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    fn service_with(store: Arc<MemoryStatsStore>) -> Arc<TimerService> {
        let storage = LocalStorage::in_memory();
        let clock = MockTimeProvider::new_from_ymd_hms(2026, 1, 2, 9, 0, 0).unwrap();
        let stats = StatisticsAggregator::load(storage.clone(), Tz::UTC, Arc::new(clock), None);
        TimerService::new(SessionMachine::load(storage, stats), store)
    }

    fn service() -> Arc<TimerService> {
        service_with(Arc::new(MemoryStatsStore::new()))
    }

    fn user(uid: &str) -> AuthUser {
        AuthUser {
            uid: uid.to_string(),
            email: None,
            display_name: None,
        }
    }

    async fn wait(seconds: f64) {
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_advances_focus_and_stops_on_pause() {
        let service = service();

        assert!(service.toggle().await.is_running);
        wait(3.5).await;
        assert_eq!(service.snapshot().await.time, 3);

        let paused = service.toggle().await;
        assert!(!paused.is_running);
        wait(5.0).await;
        assert_eq!(service.snapshot().await.time, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_switch_cancels_ticker() {
        let service = service();
        service.toggle().await;
        wait(10.5).await;

        let snapshot = service.switch_mode(Mode::ShortBreak).await;
        assert_eq!(snapshot.time, 2);
        assert!(!snapshot.is_running);

        wait(3.0).await;
        assert_eq!(service.snapshot().await.time, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_end_runs_after_final_tick() {
        let service = service();
        let mut updates = service.subscribe();

        service.toggle().await;
        wait(10.5).await;
        service.switch_mode(Mode::ShortBreak).await;
        let started = service.toggle().await;
        assert_eq!(started.completed_focus_time, 10);

        wait(2.5).await;
        let snapshot = service.snapshot().await;
        assert_eq!(snapshot.mode, Mode::Focus);
        assert_eq!(snapshot.time, 0);
        assert!(!snapshot.is_running);

        let mut saw_notification = false;
        while let Ok(message) = updates.try_recv() {
            if let ServerMessage::BreakFinished(finished) = message {
                assert_eq!(finished.finished_mode, Mode::ShortBreak);
                saw_notification = true;
            }
        }
        assert!(saw_notification);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_restart_does_not_double_tick() {
        let service = service();
        service.toggle().await;
        service.toggle().await;
        service.toggle().await;

        wait(2.5).await;
        assert_eq!(service.snapshot().await.time, 2);
        service.shutdown();
    }

    #[tokio::test]
    async fn test_reset_stats_needs_confirmation() {
        let service = service();
        let error = service.reset_stats(false).await.unwrap_err();
        assert!(matches!(error, AppError::Validation(_)));
        assert!(service.reset_stats(true).await.is_ok());
    }

    #[tokio::test]
    async fn test_reports_are_premium_only() {
        let store = Arc::new(MemoryStatsStore::new());
        let service = service_with(store.clone());

        assert!(matches!(
            service.report(ChartTab::Week).await,
            Err(AppError::PremiumRequired)
        ));
        assert_eq!(service.demo_report(ChartTab::Week).await.summary.streak_days, 7);

        store.mark_premium("user-1", None).await.unwrap();
        service.attach_user(Some(user("user-1"))).await;

        // The subscription delivers the premium flag asynchronously
        for _ in 0..50 {
            if service.snapshot().await.is_premium {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(service.report(ChartTab::Month).await.is_ok());

        service.attach_user(None).await;
        assert!(!service.snapshot().await.is_premium);
    }

    #[tokio::test]
    async fn test_remote_changes_are_merged() {
        let store = Arc::new(MemoryStatsStore::new());
        let service = service_with(store.clone());
        service.attach_user(Some(user("user-1"))).await;

        let day = NaiveDate::from_ymd_opt(2025, 12, 30).unwrap();
        let remote = UserStats {
            history: [(day, 900)].into_iter().collect(),
            is_premium: false,
        };
        store.save_history("user-1", &remote.history).await.unwrap();

        let mut merged = false;
        for _ in 0..50 {
            if service.current_user_id().await.is_some() {
                let machine = service.machine.lock().await;
                merged = machine.stats().history().get(day) == 900;
            }
            if merged {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(merged);
        service.shutdown();
    }
}
