//! Time Provider Trait and Implementations
//!
//! Wall-clock abstraction so that "today" can be pinned in tests. The tick
//! cadence itself is driven by tokio time, not by this trait.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::{Arc, Mutex, PoisonError};

/// Source of the current instant
pub trait TimeProvider: Send + Sync {
    /// Get the current UTC time
    fn now_utc(&self) -> DateTime<Utc>;

    /// Get current time in a specific timezone
    fn now_in_timezone(&self, timezone: Tz) -> DateTime<Tz> {
        self.now_utc().with_timezone(&timezone)
    }

    /// Local calendar day in `timezone`
    fn today(&self, timezone: Tz) -> NaiveDate {
        self.now_in_timezone(timezone).date_naive()
    }

    /// Get current Unix timestamp (seconds since epoch)
    fn now_timestamp(&self) -> i64 {
        self.now_utc().timestamp()
    }
}

/// Shared handle used by the services
pub type SharedTimeProvider = Arc<dyn TimeProvider>;

/// System time provider for production use
#[derive(Debug, Clone, Default)]
pub struct SystemTimeProvider;

impl SystemTimeProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TimeProvider for SystemTimeProvider {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock time provider for testing
#[derive(Debug, Clone)]
pub struct MockTimeProvider {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

impl MockTimeProvider {
    /// Create a new mock time provider starting from the given time
    pub fn new(start_time: DateTime<Utc>) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start_time)),
        }
    }

    /// Start at a UTC wall-clock time; `None` for an invalid date
    pub fn new_from_ymd_hms(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        min: u32,
        sec: u32,
    ) -> Option<Self> {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .map(Self::new)
    }

    pub fn set_time(&self, new_time: DateTime<Utc>) {
        *self.current_time.lock().unwrap_or_else(PoisonError::into_inner) = new_time;
    }

    /// Advance the mock time by the specified duration
    pub fn advance(&self, duration: chrono::Duration) {
        let mut time = self.current_time.lock().unwrap_or_else(PoisonError::into_inner);
        *time += duration;
    }

    pub fn advance_hours(&self, hours: i64) {
        self.advance(chrono::Duration::hours(hours));
    }

    pub fn advance_days(&self, days: i64) {
        self.advance(chrono::Duration::days(days));
    }
}

impl TimeProvider for MockTimeProvider {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.current_time.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    #[test]
    fn test_system_time_provider() {
        let provider = SystemTimeProvider::new();
        let now = provider.now_utc();
        assert!((Utc::now() - now).num_seconds().abs() < 60);
        assert_eq!(provider.now_timestamp(), now.timestamp());
    }

    #[test]
    fn test_mock_time_advance() {
        let provider = MockTimeProvider::new_from_ymd_hms(2026, 1, 2, 10, 30, 0).unwrap();
        let start = provider.now_utc();

        provider.advance_hours(1);
        assert_eq!(provider.now_utc(), start + chrono::Duration::hours(1));

        provider.advance_days(1);
        assert_eq!(provider.today(Tz::UTC), NaiveDate::from_ymd_opt(2026, 1, 3).unwrap());

        provider.set_time(start);
        assert_eq!(provider.now_utc(), start);
    }

    #[test]
    fn test_today_follows_timezone() {
        // 03:00 UTC is still the previous evening in New York
        let provider = MockTimeProvider::new_from_ymd_hms(2026, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(provider.today(Tz::UTC), NaiveDate::from_ymd_opt(2026, 1, 2).unwrap());
        assert_eq!(provider.today(New_York), NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
    }
}
