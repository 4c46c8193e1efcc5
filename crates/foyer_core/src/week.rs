//! crates/foyer_core/src/week.rs
//!
//! Week and month partition keys. A week is keyed by the ISO date of its
//! Monday; months by `YYYY-MM`.

use chrono::{DateTime, Datelike, Duration, Utc};

/// ISO date of the Monday starting the week containing `at`.
pub fn week_key(at: DateTime<Utc>) -> String {
    let days_from_monday = at.weekday().num_days_from_monday() as i64;
    let monday = at.date_naive() - Duration::days(days_from_monday);
    monday.format("%Y-%m-%d").to_string()
}

/// ISO week number of the week containing `at`.
pub fn week_number(at: DateTime<Utc>) -> i64 {
    at.iso_week().week() as i64
}

/// `YYYY-MM` key for the month containing `at`.
pub fn month_key(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}
