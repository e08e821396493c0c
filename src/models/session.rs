//! Session Model
//!
//! The persisted timer state of the single client this service drives.
//! Field semantics depend on the mode: in Focus `time` is elapsed seconds,
//! in a break it is the remaining countdown.

use serde::{Deserialize, Serialize};

use crate::database::local_storage::{keys, LocalStorage};
use crate::models::mode::Mode;

/// Timer session state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Current mode
    pub mode: Mode,

    /// Elapsed seconds in Focus, remaining seconds in a break
    pub time: u64,

    /// Whether the tick driver advances `time`
    pub is_running: bool,

    /// Focus seconds set aside on leaving Focus, not yet committed
    pub focus_time_stash: u64,

    /// Set once a break has been started since it was entered
    pub has_break_started: bool,

    /// Break duration computed on entry, restored by Reset
    pub initial_break_time: u64,
}

impl Session {
    /// Read the persisted session, defaulting every missing key
    ///
    /// `is_running` is never persisted: a reloaded session is always paused.
    pub fn load(storage: &LocalStorage) -> Self {
        Self {
            mode: Mode::from_storage(&storage.get(keys::MODE, "focus")),
            time: storage.get_number(keys::TIME, 0),
            is_running: false,
            focus_time_stash: storage.get_number(keys::FOCUS_TIME_STASH, 0),
            has_break_started: storage.get_boolean(keys::HAS_BREAK_STARTED, false),
            initial_break_time: storage.get_number(keys::INITIAL_BREAK_TIME, 0),
        }
    }

    /// Write every persisted field in one storage flush
    pub fn persist(&self, storage: &LocalStorage) {
        storage.set_many(&[
            (keys::MODE, self.mode.to_string()),
            (keys::TIME, self.time.to_string()),
            (keys::FOCUS_TIME_STASH, self.focus_time_stash.to_string()),
            (keys::HAS_BREAK_STARTED, self.has_break_started.to_string()),
            (keys::INITIAL_BREAK_TIME, self.initial_break_time.to_string()),
        ]);
    }

    /// Focus seconds in progress that statistics do not know about yet
    pub fn live_seconds(&self) -> u64 {
        if self.mode == Mode::Focus {
            self.time
        } else {
            self.focus_time_stash
        }
    }
}

/// Session state for API responses and WebSocket broadcasts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub mode: Mode,
    pub time: u64,
    pub formatted_time: String,
    /// Browser tab title, e.g. `"12:30 - Focus"`
    pub title: String,
    pub is_running: bool,
    pub focus_time_stash: u64,
    pub has_break_started: bool,
    pub initial_break_time: u64,
    pub completed_focus_time: u64,
    pub total_focus_time: u64,
    pub cycles: u64,
    pub is_premium: bool,
    pub user_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_defaults() {
        let session = Session::load(&LocalStorage::in_memory());
        assert_eq!(session, Session::default());
        assert_eq!(session.mode, Mode::Focus);
        assert_eq!(session.time, 0);
        assert!(!session.is_running);
    }

    #[test]
    fn test_session_persist_round_trip_stays_paused() {
        let storage = LocalStorage::in_memory();
        let session = Session {
            mode: Mode::LongBreak,
            time: 902,
            is_running: true,
            focus_time_stash: 10,
            has_break_started: true,
            initial_break_time: 902,
        };
        session.persist(&storage);

        let loaded = Session::load(&storage);
        assert_eq!(loaded.mode, Mode::LongBreak);
        assert_eq!(loaded.time, 902);
        assert_eq!(loaded.focus_time_stash, 10);
        assert!(loaded.has_break_started);
        assert!(!loaded.is_running);
    }

    #[test]
    fn test_live_seconds_depends_on_mode() {
        let mut session = Session {
            time: 40,
            focus_time_stash: 25,
            ..Session::default()
        };
        assert_eq!(session.live_seconds(), 40);

        session.mode = Mode::ShortBreak;
        assert_eq!(session.live_seconds(), 25);
    }
}
