//! Chart Models
//!
//! Bucketed series consumed by the productivity report.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Report window
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChartTab {
    #[default]
    Week,
    Month,
    Year,
}

/// Display unit chosen from the largest bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum ChartUnit {
    #[serde(rename = "s")]
    #[strum(serialize = "s")]
    Seconds,
    #[serde(rename = "m")]
    #[strum(serialize = "m")]
    Minutes,
    #[serde(rename = "h")]
    #[strum(serialize = "h")]
    Hours,
}

/// One bar of the chart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartEntry {
    /// Axis label (`Sun`, `W2`, `Mar`)
    pub name: String,
    /// Raw seconds converted to the chart unit
    pub display_value: f64,
    pub seconds: u64,
}

/// Result of bucketing a history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    pub chart_data: Vec<ChartEntry>,
    pub unit: ChartUnit,
    pub y_axis_max: u64,
}

/// Headline numbers shown under the chart
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_seconds: u64,
    pub daily_average_seconds: u64,
    pub streak_days: u32,
    pub total_label: String,
    pub daily_average_label: String,
}

/// Full report payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub tab: ChartTab,
    pub period_title: String,
    #[serde(flatten)]
    pub chart: ChartData,
    pub summary: ReportSummary,
}
