//! Timer mode
//!
//! The three modes the session cycles through. Focus counts up, both break
//! modes count down from a duration computed on entry.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Timer mode
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Mode {
    #[default]
    #[serde(rename = "focus")]
    #[strum(serialize = "focus")]
    Focus,
    #[serde(rename = "break")]
    #[strum(serialize = "break")]
    ShortBreak,
    #[serde(rename = "longBreak")]
    #[strum(serialize = "longBreak")]
    LongBreak,
}

impl Mode {
    /// Whether `time` counts down in this mode
    pub fn is_break(self) -> bool {
        !matches!(self, Mode::Focus)
    }

    /// Get display name for this mode
    pub fn display_name(self) -> &'static str {
        match self {
            Mode::Focus => "Focus",
            Mode::ShortBreak => "Short Break",
            Mode::LongBreak => "Long Break",
        }
    }

    /// Parse a persisted value, falling back to Focus for anything unknown
    pub fn from_storage(value: &str) -> Self {
        value.parse().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_storage_values() {
        assert_eq!(Mode::Focus.to_string(), "focus");
        assert_eq!(Mode::ShortBreak.to_string(), "break");
        assert_eq!(Mode::LongBreak.to_string(), "longBreak");

        assert_eq!(Mode::from_storage("longBreak"), Mode::LongBreak);
        assert_eq!(Mode::from_storage("break"), Mode::ShortBreak);
        assert_eq!(Mode::from_storage(""), Mode::Focus);
        assert_eq!(Mode::from_storage("nap"), Mode::Focus);
    }

    #[test]
    fn test_mode_serde_matches_storage() {
        let json = serde_json::to_string(&Mode::LongBreak).unwrap();
        assert_eq!(json, "\"longBreak\"");
        let mode: Mode = serde_json::from_str("\"break\"").unwrap();
        assert_eq!(mode, Mode::ShortBreak);
    }

    #[test]
    fn test_mode_display_names() {
        assert!(!Mode::Focus.is_break());
        assert!(Mode::ShortBreak.is_break());
        assert_eq!(Mode::LongBreak.display_name(), "Long Break");
    }
}
