//! Session State Machine
//!
//! Owns the timer session and the statistics it commits into. All operations
//! are total: they never fail, and persistence problems are only logged.
//!
//! Focus time is not recorded when Focus is left. It is stashed, and only
//! committed once the following break is actually started. Returning to
//! Focus without starting the break restores the stashed time instead.

use chrono::NaiveDate;

use crate::database::local_storage::LocalStorage;
use crate::logging::log_session_transition;
use crate::models::chart::{ChartTab, Report};
use crate::models::mode::Mode;
use crate::models::session::{Session, SessionSnapshot};
use crate::models::statistics::UserStats;
use crate::services::chart_service::build_report;
use crate::services::stats_service::StatisticsAggregator;
use crate::services::time_format::format_time;

/// Short break length when there is no focus time to scale from
pub const DEFAULT_SHORT_BREAK: u64 = 5 * 60;

/// Fixed part of every long break, and its length without focus time
pub const LONG_BREAK_BASE: u64 = 15 * 60;

/// Focus seconds after which the next break is a long one
pub const LONG_BREAK_THRESHOLD: u64 = 2 * 60 * 60;

/// Focus seconds per cycle
pub const CYCLE_SECONDS: u64 = 25 * 60;

/// Break length as a fraction of the focus time that preceded it
fn scaled_break(focus_seconds: u64) -> u64 {
    // floor(seconds * 0.20)
    focus_seconds / 5
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The timer is paused; nothing changed
    Idle,
    Advanced,
    /// A break reached zero; the session is paused at 0 and the break-end
    /// action is still pending
    BreakFinished { finished_mode: Mode },
}

pub struct SessionMachine {
    session: Session,
    stats: StatisticsAggregator,
    storage: LocalStorage,
}

impl SessionMachine {
    /// Restore the persisted session; it always comes back paused
    pub fn load(storage: LocalStorage, stats: StatisticsAggregator) -> Self {
        let session = Session::load(&storage);
        tracing::info!(
            mode = %session.mode,
            time = session.time,
            focus_time_stash = session.focus_time_stash,
            "Session restored"
        );

        Self {
            session,
            stats,
            storage,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stats(&self) -> &StatisticsAggregator {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running
    }

    /// Start or pause
    ///
    /// Starting a break commits the pending focus stash exactly once.
    pub fn toggle_timer(&mut self) {
        let starting = !self.session.is_running;

        if starting && self.session.mode.is_break() {
            self.session.has_break_started = true;

            if self.session.focus_time_stash > 0 {
                let stash = std::mem::take(&mut self.session.focus_time_stash);
                self.stats.add_focus_time(stash);
            }
        }

        self.session.is_running = starting;
        tracing::debug!(mode = %self.session.mode, running = starting, "Timer toggled");
        self.persist();
    }

    /// Advance the clock by one second
    pub fn tick(&mut self) -> TickOutcome {
        if !self.session.is_running {
            return TickOutcome::Idle;
        }

        self.stats.rollover();

        let outcome = if self.session.mode == Mode::Focus {
            self.session.time += 1;
            TickOutcome::Advanced
        } else if self.session.time <= 1 {
            self.session.is_running = false;
            self.session.time = 0;
            TickOutcome::BreakFinished {
                finished_mode: self.session.mode,
            }
        } else {
            self.session.time -= 1;
            TickOutcome::Advanced
        };

        self.persist();
        outcome
    }

    /// Deferred action after a break ran out: back to a fresh Focus
    pub fn handle_break_end(&mut self) {
        let from = self.session.mode;

        self.session.mode = Mode::Focus;
        self.session.time = 0;
        self.session.is_running = false;

        log_session_transition("break_end", from, Mode::Focus, 0, self.session.focus_time_stash);
        self.persist();
    }

    /// Switch to `new_mode`, pausing the timer
    pub fn handle_mode_switch(&mut self, new_mode: Mode) {
        let from = self.session.mode;

        let base_time = if from == Mode::Focus {
            if self.session.time > 0 {
                self.session.focus_time_stash = self.session.time;
            }
            self.session.time
        } else {
            self.session.focus_time_stash
        };

        self.session.mode = new_mode;
        self.session.is_running = false;

        match new_mode {
            Mode::Focus => {
                if !self.session.has_break_started && self.session.focus_time_stash > 0 {
                    // The break never started, so nothing was committed
                    self.session.time = std::mem::take(&mut self.session.focus_time_stash);
                } else {
                    self.session.time = 0;
                    self.session.focus_time_stash = 0;
                }
            }
            Mode::ShortBreak | Mode::LongBreak => {
                let duration = match (new_mode, base_time) {
                    (Mode::LongBreak, 0) => LONG_BREAK_BASE,
                    (Mode::LongBreak, base) => scaled_break(base) + LONG_BREAK_BASE,
                    (_, 0) => DEFAULT_SHORT_BREAK,
                    (_, base) => scaled_break(base),
                };

                self.session.has_break_started = false;
                self.session.time = duration;
                self.session.initial_break_time = duration;
            }
        }

        log_session_transition(
            "mode_switch",
            from,
            new_mode,
            self.session.time,
            self.session.focus_time_stash,
        );
        self.persist();
    }

    /// Mode that follows the current one
    pub fn next_mode(&self) -> Mode {
        match self.session.mode {
            Mode::Focus => {
                if self.stats.completed_focus_time() + self.session.time >= LONG_BREAK_THRESHOLD {
                    Mode::LongBreak
                } else {
                    Mode::ShortBreak
                }
            }
            Mode::ShortBreak | Mode::LongBreak => Mode::Focus,
        }
    }

    pub fn handle_next_mode(&mut self) {
        let next = self.next_mode();
        self.handle_mode_switch(next);
    }

    /// Abandon the current period: pause, drop the stash, rewind the clock
    pub fn handle_reset(&mut self) {
        self.session.is_running = false;
        self.session.focus_time_stash = 0;
        self.session.time = if self.session.mode == Mode::Focus {
            0
        } else {
            self.session.initial_break_time
        };

        log_session_transition("reset", self.session.mode, self.session.mode, self.session.time, 0);
        self.persist();
    }

    /// Wipe all statistics; does nothing unless `confirmed`
    pub fn handle_reset_stats(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            return false;
        }

        self.stats.reset_stats();
        self.session.focus_time_stash = 0;
        self.persist();
        true
    }

    /// Merge a snapshot delivered by the remote store
    pub fn apply_remote_stats(&mut self, remote: &UserStats) {
        self.stats.apply_remote(remote);
    }

    pub fn set_user(&mut self, user_id: Option<String>) {
        self.stats.set_user(user_id);
    }

    /// Today's committed focus plus what is in progress
    pub fn total_focus_time(&self) -> u64 {
        self.stats.completed_focus_time() + self.session.live_seconds()
    }

    pub fn cycles(&self) -> u64 {
        self.total_focus_time() / CYCLE_SECONDS
    }

    pub fn today(&self) -> NaiveDate {
        self.stats.today()
    }

    /// Browser tab title, e.g. `12:30 - Focus`
    pub fn title(&self) -> String {
        format!(
            "{} - {}",
            format_time(self.session.time),
            self.session.mode.display_name()
        )
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            mode: self.session.mode,
            time: self.session.time,
            formatted_time: format_time(self.session.time),
            title: self.title(),
            is_running: self.session.is_running,
            focus_time_stash: self.session.focus_time_stash,
            has_break_started: self.session.has_break_started,
            initial_break_time: self.session.initial_break_time,
            completed_focus_time: self.stats.completed_focus_time(),
            total_focus_time: self.total_focus_time(),
            cycles: self.cycles(),
            is_premium: self.stats.is_premium(),
            user_id: self.stats.user_id().map(str::to_string),
        }
    }

    /// Report over the user's history including in-progress focus time
    pub fn report(&self, tab: ChartTab) -> Report {
        build_report(self.stats.history(), self.session.live_seconds(), tab, self.today())
    }

    fn persist(&self) {
        self.session.persist(&self.storage);
    }
}
