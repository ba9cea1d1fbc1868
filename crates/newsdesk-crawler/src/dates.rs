//! Lenient parsing of publication dates scraped from pages.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%B %d, %Y", "%d %B %Y", "%Y/%m/%d", "%m/%d/%Y"];

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago")
        .expect("valid relative date regex")
});

/// Parse a scraped date string. Naive values are taken as UTC; relative
/// values ("3 hours ago") are resolved against `now`.
#[must_use]
pub fn parse_published(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    relative(s, now)
}

fn relative(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let caps = RELATIVE.captures(s)?;
    let amount: i64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let delta = match unit.as_str() {
        "second" => Duration::try_seconds(amount)?,
        "minute" => Duration::try_minutes(amount)?,
        "hour" => Duration::try_hours(amount)?,
        "day" => Duration::try_days(amount)?,
        "week" => Duration::try_weeks(amount)?,
        "month" => Duration::try_days(amount.checked_mul(30)?)?,
        "year" => Duration::try_days(amount.checked_mul(365)?)?,
        _ => return None,
    };
    now.checked_sub_signed(delta)
}
