//! Tolerant parsing of the creation dates marketplaces hand back.
//!
//! Rozetka and the other feeds mix three shapes: ISO 8601, SQL style
//! `2024-01-05 10:00:00` and day-first `05.01.2024`. Timestamps without an
//! offset are taken as UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static SQL_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})\s+(\d{1,2}):(\d{2})(?::(\d{2})(\.\d+)?)?$")
        .expect("SQL date pattern compiles")
});

static DOTTED_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})\.(\d{1,2})\.(\d{4})(?:[,\s]+(\d{1,2}):(\d{2})(?::(\d{2}))?)?$")
        .expect("dotted date pattern compiles")
});

/// Parses `raw` into a point in time. `None` means the value is not a date
/// in any of the known shapes.
pub fn normalize(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    parse_iso(raw)
        .or_else(|| from_sql(raw))
        .or_else(|| from_dotted(raw))
}

/// Renders a timestamp the way `normalize` reads it back.
pub fn to_iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_iso(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(ts.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

fn from_sql(raw: &str) -> Option<DateTime<Utc>> {
    let caps = SQL_DATE.captures(raw)?;
    let iso = format!(
        "{}-{}-{}T{:0>2}:{}:{}{}",
        &caps[1],
        &caps[2],
        &caps[3],
        &caps[4],
        &caps[5],
        caps.get(6).map_or("00", |s| s.as_str()),
        caps.get(7).map_or("", |s| s.as_str()),
    );
    parse_iso(&iso)
}

fn from_dotted(raw: &str) -> Option<DateTime<Utc>> {
    let caps = DOTTED_DATE.captures(raw)?;
    let iso = format!(
        "{}-{:0>2}-{:0>2}T{:0>2}:{}:{}",
        &caps[3],
        &caps[2],
        &caps[1],
        caps.get(4).map_or("00", |s| s.as_str()),
        caps.get(5).map_or("00", |s| s.as_str()),
        caps.get(6).map_or("00", |s| s.as_str()),
    );
    parse_iso(&iso)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    #[test]
    fn iso_with_offset() {
        assert_eq!(
            normalize("2024-03-10T12:30:00+02:00"),
            Some(utc(2024, 3, 10, 10, 30, 0))
        );
        assert_eq!(
            normalize("2024-03-10T12:30:00.250Z").map(|t| t.date_naive()),
            NaiveDate::from_ymd_opt(2024, 3, 10)
        );
    }

    #[test]
    fn iso_without_offset_is_utc() {
        assert_eq!(
            normalize("2024-03-10T12:30:00"),
            Some(utc(2024, 3, 10, 12, 30, 0))
        );
        assert_eq!(normalize("2024-03-10"), Some(utc(2024, 3, 10, 0, 0, 0)));
    }

    #[test]
    fn sql_style() {
        assert_eq!(
            normalize("2023-12-31 23:59:58"),
            Some(utc(2023, 12, 31, 23, 59, 58))
        );
        assert_eq!(
            normalize("2023-12-31 7:05"),
            Some(utc(2023, 12, 31, 7, 5, 0))
        );
    }

    #[test]
    fn sql_style_with_fractional_seconds() {
        assert_eq!(
            normalize("2024-01-05 10:00:00.123"),
            Some(utc(2024, 1, 5, 10, 0, 0) + chrono::Duration::milliseconds(123))
        );
        assert_eq!(
            normalize("2024-01-05 10:00:00.5"),
            Some(utc(2024, 1, 5, 10, 0, 0) + chrono::Duration::milliseconds(500))
        );
        assert_eq!(normalize("2024-01-05 10:00.5"), None);
    }

    #[test]
    fn dotted_day_first() {
        assert_eq!(normalize("05.01.2024"), Some(utc(2024, 1, 5, 0, 0, 0)));
        assert_eq!(normalize("5.1.2024"), Some(utc(2024, 1, 5, 0, 0, 0)));
        assert_eq!(
            normalize("05.01.2024 14:20"),
            Some(utc(2024, 1, 5, 14, 20, 0))
        );
        assert_eq!(
            normalize(" 05.01.2024, 14:20:11 "),
            Some(utc(2024, 1, 5, 14, 20, 11))
        );
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(normalize(""), None);
        assert_eq!(normalize("yesterday"), None);
        assert_eq!(normalize("2024/01/05"), None);
        assert_eq!(normalize("31.02.2024"), None);
        assert_eq!(normalize("2024-13-01 10:00:00"), None);
    }

    #[test]
    fn normalizing_own_output_is_idempotent() {
        for raw in ["2024-03-10T12:30:00+02:00", "2023-12-31 23:59:58", "05.01.2024"] {
            let first = normalize(raw).unwrap();
            let iso = to_iso(first);
            assert_eq!(normalize(&iso), Some(first));
            assert_eq!(to_iso(normalize(&iso).unwrap()), iso);
        }
    }
}
