//! Statistics Model
//!
//! Per-day focus history and the user document delivered by the stats store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Seconds focused per local calendar day, serialized as `{"YYYY-MM-DD": n}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FocusHistory(BTreeMap<NaiveDate, u64>);

impl FocusHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds recorded for `date`, zero when absent
    pub fn get(&self, date: NaiveDate) -> u64 {
        self.0.get(&date).copied().unwrap_or(0)
    }

    /// Add seconds to a day, creating the entry at zero if absent
    pub fn add(&mut self, date: NaiveDate, seconds: u64) {
        let entry = self.0.entry(date).or_insert(0);
        *entry = entry.saturating_add(seconds);
    }

    pub fn insert(&mut self, date: NaiveDate, seconds: u64) {
        self.0.insert(date, seconds);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u64)> + '_ {
        self.0.iter().map(|(date, seconds)| (*date, *seconds))
    }

    /// Fold a remote snapshot into this history
    ///
    /// Remote entries overwrite local ones for the same day; days only known
    /// locally are kept. Returns true when the merged history differs from
    /// the remote copy, i.e. the remote is missing something local.
    pub fn merge_remote(&mut self, remote: &FocusHistory) -> bool {
        for (date, seconds) in remote.iter() {
            self.0.insert(date, seconds);
        }
        self != remote
    }
}

impl FromIterator<(NaiveDate, u64)> for FocusHistory {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// User document held by the remote stats store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    #[serde(default)]
    pub history: FocusHistory,
    #[serde(default)]
    pub is_premium: bool,
}
