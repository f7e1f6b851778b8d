//! Timestamp and event-age utilities

use chrono::{DateTime, Utc};

/// Age tier thresholds (seconds)
const SECONDS_TIER_MAX: i64 = 100; // < 100s → Xs
const MINUTES_TIER_MAX: i64 = 6000; // < 100m → M:SS
const HOURS_TIER_MAX: i64 = 90000; // < 25h → H:MM:SS
                                   // >= 25h → X.Xd

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds elapsed from `then` to `now`, with millisecond resolution
///
/// Negative when `then` lies in the future (clock skew between the feed and
/// the local machine).
pub fn age_seconds(then: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - then).num_milliseconds() as f64 / 1000.0
}

/// Format an event age for log lines
///
/// # Examples
///
/// ```
/// use flatland_common::time::format_age;
///
/// assert_eq!(format_age(45), "45s");
/// assert_eq!(format_age(330), "5:30");
/// assert_eq!(format_age(3661), "1:01:01");
/// assert_eq!(format_age(604800), "7.0d");
/// ```
pub fn format_age(seconds: i64) -> String {
    let is_negative = seconds < 0;
    let abs_seconds = seconds.abs();

    let formatted = if abs_seconds < SECONDS_TIER_MAX {
        format!("{}s", abs_seconds)
    } else if abs_seconds < MINUTES_TIER_MAX {
        format!("{}:{:02}", abs_seconds / 60, abs_seconds % 60)
    } else if abs_seconds < HOURS_TIER_MAX {
        let hours = abs_seconds / 3600;
        let mins = (abs_seconds % 3600) / 60;
        let secs = abs_seconds % 60;
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{:.1}d", abs_seconds as f64 / 86400.0)
    };

    if is_negative {
        format!("-{}", formatted)
    } else {
        formatted
    }
}
