//! Chart Aggregation Engine
//!
//! Buckets a sparse day -> seconds history into week, month or year series
//! for the productivity report, picks a display unit and axis ceiling, and
//! derives the headline numbers shown under the chart.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};

use crate::models::chart::{ChartData, ChartEntry, ChartTab, ChartUnit, Report, ReportSummary};
use crate::models::statistics::FocusHistory;
use crate::services::time_format::format_detailed;

/// Daily sample values of the demo report, newest first
const DEMO_DAILY_SECONDS: [u64; 7] = [14_400, 18_000, 7_200, 21_600, 15_000, 12_000, 19_000];

/// In-progress seconds shown with the demo report
pub const DEMO_LIVE_SECONDS: u64 = 3_500;

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 3_600;

/// Bucket `history` plus the in-progress `live_seconds` for `tab`
pub fn calculate_chart_data(
    history: &FocusHistory,
    live_seconds: u64,
    tab: ChartTab,
    today: NaiveDate,
) -> ChartData {
    let buckets = match tab {
        ChartTab::Week => week_buckets(history, live_seconds, today),
        ChartTab::Month => month_buckets(history, live_seconds, today),
        ChartTab::Year => year_buckets(history, live_seconds, today),
    };

    let max_seconds = buckets.iter().map(|(_, seconds)| *seconds).max().unwrap_or(0);
    let (unit, y_axis_max) = select_unit(max_seconds);

    let chart_data = buckets
        .into_iter()
        .map(|(name, seconds)| ChartEntry {
            name,
            display_value: display_value(seconds, unit),
            seconds,
        })
        .collect();

    ChartData {
        chart_data,
        unit,
        y_axis_max,
    }
}

/// Sunday that starts the calendar week containing `day`
fn week_start(day: NaiveDate) -> NaiveDate {
    let offset = u64::from(day.weekday().num_days_from_sunday());
    day.checked_sub_days(Days::new(offset)).unwrap_or(day)
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn last_of_month(day: NaiveDate) -> NaiveDate {
    first_of_month(day)
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(day)
}

fn days_in_month(day: NaiveDate) -> u64 {
    u64::from(last_of_month(day).day())
}

fn week_buckets(history: &FocusHistory, live_seconds: u64, today: NaiveDate) -> Vec<(String, u64)> {
    week_start(today)
        .iter_days()
        .take(7)
        .map(|date| {
            let mut seconds = history.get(date);
            if date == today {
                seconds += live_seconds;
            }
            (date.format("%a").to_string(), seconds)
        })
        .collect()
}

/// Calendar weeks of the month; a week closes on Saturday or the last day
fn month_buckets(history: &FocusHistory, live_seconds: u64, today: NaiveDate) -> Vec<(String, u64)> {
    let last = last_of_month(today);
    let mut buckets = Vec::with_capacity(6);
    let mut week_seconds = 0;

    for date in first_of_month(today).iter_days().take_while(|date| *date <= last) {
        week_seconds += history.get(date);
        if date.day() == today.day() {
            week_seconds += live_seconds;
        }

        if date.weekday() == Weekday::Sat || date == last {
            buckets.push((format!("W{}", buckets.len() + 1), week_seconds));
            week_seconds = 0;
        }
    }

    buckets
}

fn year_buckets(history: &FocusHistory, live_seconds: u64, today: NaiveDate) -> Vec<(String, u64)> {
    (1..=12)
        .filter_map(|month| NaiveDate::from_ymd_opt(today.year(), month, 1))
        .map(|first| {
            let last = last_of_month(first);
            let mut seconds: u64 = first
                .iter_days()
                .take_while(|date| *date <= last)
                .map(|date| history.get(date))
                .sum();
            if first.month() == today.month() {
                seconds += live_seconds;
            }
            (first.format("%b").to_string(), seconds)
        })
        .collect()
}

/// Unit and axis ceiling for the largest bucket
fn select_unit(max_seconds: u64) -> (ChartUnit, u64) {
    if max_seconds > SECONDS_PER_HOUR {
        let axis = match max_seconds {
            s if s <= 2 * SECONDS_PER_HOUR => 2,
            s if s <= 4 * SECONDS_PER_HOUR => 4,
            s if s <= 8 * SECONDS_PER_HOUR => 8,
            s if s <= 12 * SECONDS_PER_HOUR => 12,
            // Next multiple of 4 at or above the hour count
            s => s.div_ceil(4 * SECONDS_PER_HOUR) * 4,
        };
        (ChartUnit::Hours, axis)
    } else if max_seconds > SECONDS_PER_MINUTE {
        let axis = match max_seconds {
            s if s <= 5 * SECONDS_PER_MINUTE => 5,
            s if s <= 15 * SECONDS_PER_MINUTE => 15,
            s if s <= 30 * SECONDS_PER_MINUTE => 30,
            _ => 60,
        };
        (ChartUnit::Minutes, axis)
    } else if max_seconds <= 30 {
        (ChartUnit::Seconds, 30)
    } else {
        (ChartUnit::Seconds, 60)
    }
}

#[allow(clippy::cast_precision_loss)]
fn display_value(seconds: u64, unit: ChartUnit) -> f64 {
    let round_tenth = |value: f64| (value * 10.0).round() / 10.0;

    match unit {
        ChartUnit::Seconds => seconds as f64,
        ChartUnit::Minutes => round_tenth(seconds as f64 / SECONDS_PER_MINUTE as f64),
        ChartUnit::Hours => round_tenth(seconds as f64 / SECONDS_PER_HOUR as f64),
    }
}

/// Consecutive focused days ending today, or yesterday when today is empty
pub fn calculate_current_streak(history: &FocusHistory, today: NaiveDate) -> u32 {
    let mut streak = u32::from(history.get(today) > 0);

    let mut day = today.pred_opt();
    while let Some(date) = day {
        if history.get(date) == 0 {
            break;
        }
        streak += 1;
        day = date.pred_opt();
    }

    streak
}

/// Heading of the report window, e.g. `Dec 28 - Jan 3, 2026`
pub fn calculate_period_title(tab: ChartTab, today: NaiveDate) -> String {
    match tab {
        ChartTab::Week => {
            let start = week_start(today);
            let end = start.checked_add_days(Days::new(6)).unwrap_or(start);
            format!(
                "{} - {}, {}",
                start.format("%b %-d"),
                end.format("%b %-d"),
                today.year()
            )
        }
        ChartTab::Month => today.format("%B %Y").to_string(),
        ChartTab::Year => format!("Year {}", today.year()),
    }
}

/// Totals for the chart window; the daily average is rounded to the second
pub fn summarize_report(chart: &ChartData, tab: ChartTab, today: NaiveDate, streak_days: u32) -> ReportSummary {
    let total_seconds: u64 = chart.chart_data.iter().map(|entry| entry.seconds).sum();

    let days = match tab {
        ChartTab::Week => 7,
        ChartTab::Month => days_in_month(today),
        ChartTab::Year => 365,
    };
    let daily_average_seconds = (total_seconds + days / 2) / days;

    ReportSummary {
        total_seconds,
        daily_average_seconds,
        streak_days,
        total_label: format_detailed(total_seconds),
        daily_average_label: format_detailed(daily_average_seconds),
    }
}

/// Chart, title and summary in one payload
pub fn build_report(history: &FocusHistory, live_seconds: u64, tab: ChartTab, today: NaiveDate) -> Report {
    let chart = calculate_chart_data(history, live_seconds, tab, today);
    let streak = calculate_current_streak(history, today);
    let summary = summarize_report(&chart, tab, today, streak);

    Report {
        tab,
        period_title: calculate_period_title(tab, today),
        chart,
        summary,
    }
}

/// Sample history for the report preview: the seven days ending today
pub fn demo_history(today: NaiveDate) -> FocusHistory {
    DEMO_DAILY_SECONDS
        .iter()
        .zip(0u64..)
        .filter_map(|(seconds, days_back)| {
            today
                .checked_sub_days(Days::new(days_back))
                .map(|date| (date, *seconds))
        })
        .collect()
}

/// Report preview shown to users without premium access
pub fn build_demo_report(tab: ChartTab, today: NaiveDate) -> Report {
    build_report(&demo_history(today), DEMO_LIVE_SECONDS, tab, today)
}
