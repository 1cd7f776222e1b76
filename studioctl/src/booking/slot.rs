//! Occurrence time handling.
//!
//! Clients submit the time of an occurrence either as a bare start time (`"09:00"`) or as a
//! compound range (`"09:00-10:00"`, sometimes with an en dash and spaces). Everything that
//! compares slots works on the normalised start component.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::errors::{Error, Result};

const TIME_FORMAT: &str = "%H:%M";

/// The start component of a possibly compound time string, trimmed.
pub fn start_component(time: &str) -> &str {
    time.split(['-', '–']).next().unwrap_or(time).trim()
}

/// Parse the start component of a time string as a wall-clock time.
///
/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_start(time: &str) -> Result<NaiveTime> {
    let start = start_component(time);
    NaiveTime::parse_from_str(start, TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(start, "%H:%M:%S"))
        .map_err(|_| Error::bad_request(format!("Invalid time '{time}', expected HH:MM or HH:MM-HH:MM")))
}

/// Canonical slot key (`HH:MM`) used for storage and comparisons
pub fn normalize(time: &str) -> Result<String> {
    Ok(parse_start(time)?.format(TIME_FORMAT).to_string())
}

/// Display form of a session's time range, e.g. `09:00-10:00`
pub fn format_range(start: NaiveTime, end: NaiveTime) -> String {
    format!("{}-{}", start.format(TIME_FORMAT), end.format(TIME_FORMAT))
}

/// Weekday index of a date, 0 = Sunday ... 6 = Saturday
pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

/// The instant a class occurrence starts, given the studio's offset from UTC in minutes.
pub fn class_start(date: NaiveDate, time: &str, utc_offset_minutes: i32) -> Result<DateTime<Utc>> {
    let local = date.and_time(parse_start(time)?);
    Ok(local.and_utc() - Duration::minutes(i64::from(utc_offset_minutes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_start_component_handles_compound_strings() {
        assert_eq!(start_component("09:00"), "09:00");
        assert_eq!(start_component("09:00-10:00"), "09:00");
        assert_eq!(start_component(" 18:30 – 19:30 "), "18:30");
    }

    #[test]
    fn test_normalize_pads_and_drops_seconds() {
        assert_eq!(normalize("9:05").unwrap(), "09:05");
        assert_eq!(normalize("07:30:00-08:30:00").unwrap(), "07:30");
        assert!(normalize("soon").is_err());
        assert!(normalize("").is_err());
    }

    #[test]
    fn test_format_range() {
        let start = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let end = NaiveTime::from_hms_opt(10, 15, 0).unwrap();
        assert_eq!(format_range(start, end), "09:00-10:15");
    }

    #[test]
    fn test_weekday_index_starts_on_sunday() {
        // 2030-03-03 is a Sunday
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2030, 3, 3).unwrap()), 0);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2030, 3, 4).unwrap()), 1);
        assert_eq!(weekday_index(NaiveDate::from_ymd_opt(2030, 3, 9).unwrap()), 6);
    }

    #[test]
    fn test_class_start_applies_offset() {
        let date = NaiveDate::from_ymd_opt(2030, 3, 4).unwrap();

        let utc = class_start(date, "09:00-10:00", 0).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2030, 3, 4, 9, 0, 0).unwrap());

        // UTC+2 wall clock 09:00 is 07:00 UTC
        let shifted = class_start(date, "09:00", 120).unwrap();
        assert_eq!(shifted, Utc.with_ymd_and_hms(2030, 3, 4, 7, 0, 0).unwrap());
    }
}
