// SPDX-License-Identifier: MIT

//! Shared helpers for date/time formatting and calendar-day arithmetic.
//!
//! All gamification state is keyed by UTC calendar days rendered as
//! `YYYY-MM-DD` strings ("day keys"), so attempts and streaks are
//! unambiguous regardless of the client's timezone.

use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Render a calendar date as a day key (`YYYY-MM-DD`).
pub fn day_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Parse a day key back into a calendar date.
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Day key for the calendar day before `key`, if `key` is well-formed.
pub fn previous_day_key(key: &str) -> Option<String> {
    parse_day_key(key).and_then(|d| d.pred_opt()).map(day_key)
}

/// Clock abstraction so timer-driven logic (the daily reminder sweep)
/// can be tested against a fixed point in time.
pub trait Clock: Send + Sync + 'static {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Today's UTC day key according to `clock`.
pub fn today_key(clock: &dyn Clock) -> String {
    day_key(clock.now_utc().date_naive())
}

/// The next wall-clock occurrence of `hour:00:00 UTC` strictly after `now`.
pub fn next_occurrence_of_hour(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let today = now.date_naive();
    let candidate = Utc
        .with_ymd_and_hms(today.year(), today.month(), today.day(), hour, 0, 0)
        .single()
        .unwrap_or(now);
    if candidate > now {
        candidate
    } else {
        candidate + chrono::Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_key_round_trip() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let key = day_key(date);
        assert_eq!(key, "2024-03-09");
        assert_eq!(parse_day_key(&key), Some(date));
    }

    #[test]
    fn test_previous_day_key_crosses_month() {
        assert_eq!(previous_day_key("2024-03-01").as_deref(), Some("2024-02-29"));
        assert_eq!(previous_day_key("2024-01-02").as_deref(), Some("2024-01-01"));
        assert_eq!(previous_day_key("not-a-day"), None);
    }

    #[test]
    fn test_next_occurrence_same_day() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 7, 30, 0).unwrap();
        let next = next_occurrence_of_hour(now, 9);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 10, 9, 0, 0).unwrap();
        let next = next_occurrence_of_hour(now, 9);
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 5, 11, 9, 0, 0).unwrap());
    }
}
