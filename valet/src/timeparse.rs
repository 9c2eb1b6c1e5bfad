//! Lightweight Spanish/English time-window parsing for conflict checks and
//! policy bounds: "mañana a las 11", "el viernes a las 10", "tomorrow at 3pm".
//!
//! A query with no recognisable day or hour yields `None` and the conflict
//! check simply skips.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use once_cell::sync::Lazy;
use regex::Regex;

static HOUR_ES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)a\s+las?\s+(\d{1,2})(?::(\d{2}))?").expect("static regex"));
static HOUR_EN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?").expect("static regex"));

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("lunes", Weekday::Mon),
    ("monday", Weekday::Mon),
    ("martes", Weekday::Tue),
    ("tuesday", Weekday::Tue),
    ("miércoles", Weekday::Wed),
    ("miercoles", Weekday::Wed),
    ("wednesday", Weekday::Wed),
    ("jueves", Weekday::Thu),
    ("thursday", Weekday::Thu),
    ("viernes", Weekday::Fri),
    ("friday", Weekday::Fri),
    ("sábado", Weekday::Sat),
    ("sabado", Weekday::Sat),
    ("saturday", Weekday::Sat),
    ("domingo", Weekday::Sun),
    ("sunday", Weekday::Sun),
];

fn mentioned_day(query: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = query.to_lowercase();
    if lower.contains("pasado mañana") || lower.contains("day after tomorrow") {
        return Some(now + Duration::days(2));
    }
    if lower.contains("mañana") || lower.contains("tomorrow") {
        return Some(now + Duration::days(1));
    }
    if lower.contains("hoy") || lower.contains("today") {
        return Some(now);
    }
    for (name, weekday) in WEEKDAYS {
        if lower.contains(name) {
            // Next occurrence of that weekday, strictly after today.
            let mut candidate = now + Duration::days(1);
            while candidate.weekday() != *weekday {
                candidate += Duration::days(1);
            }
            return Some(candidate);
        }
    }
    None
}

fn mentioned_hour(query: &str) -> Option<NaiveTime> {
    if let Some(caps) = HOUR_ES.captures(query) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        return NaiveTime::from_hms_opt(hour % 24, minute % 60, 0);
    }
    if let Some(caps) = HOUR_EN.captures(query) {
        let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0))
            .unwrap_or(0);
        match caps.get(3).map(|m| m.as_str().to_lowercase()) {
            Some(ref ampm) if ampm == "pm" && hour < 12 => hour += 12,
            Some(ref ampm) if ampm == "am" && hour == 12 => hour = 0,
            _ => {}
        }
        return NaiveTime::from_hms_opt(hour % 24, minute % 60, 0);
    }
    None
}

/// Extracts the time window a query refers to. A mentioned day without an hour
/// spans the whole day; a mentioned hour defaults to a one-hour slot.
pub fn mentioned_window(query: &str, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let day = mentioned_day(query, now)?;
    match mentioned_hour(query) {
        Some(time) => {
            let start = Utc.from_utc_datetime(&day.date_naive().and_time(time));
            Some((start, start + Duration::hours(1)))
        }
        None => {
            let start = Utc.from_utc_datetime(&day.date_naive().and_hms_opt(0, 0, 0)?);
            Some((start, start + Duration::days(1)))
        }
    }
}
