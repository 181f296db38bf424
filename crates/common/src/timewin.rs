//! UTC time-window helpers for quota accounting
//!
//! Monthly and hourly counters are keyed by calendar bucket; the bucket key
//! and the seconds remaining in the bucket must agree exactly, or a counter
//! could outlive (or undershoot) its window. Rollovers are sharp: a request
//! at hh:59:59.999 belongs to the current hour, the next millisecond to the
//! next.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

/// Month bucket key, `YYYYMM` in UTC.
pub fn month_key(t: DateTime<Utc>) -> String {
    format!("{:04}{:02}", t.year(), t.month())
}

/// Hour bucket key, `YYYYMMDDHH` in UTC.
pub fn hour_key(t: DateTime<Utc>) -> String {
    format!(
        "{:04}{:02}{:02}{:02}",
        t.year(),
        t.month(),
        t.day(),
        t.hour()
    )
}

/// Ledger month, `YYYY-MM` in UTC (usage_ledger.month format).
pub fn ledger_month(t: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", t.year(), t.month())
}

/// Seconds until the next month bucket starts. Always > 0.
pub fn seconds_until_month_end(t: DateTime<Utc>) -> i64 {
    let (next_year, next_month) = if t.month() == 12 {
        (t.year() + 1, 1)
    } else {
        (t.year(), t.month() + 1)
    };
    let next = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .unwrap();
    let seconds = (next - t).num_seconds();
    // A request inside the final second of the month still gets a live TTL.
    seconds.max(1)
}

/// Seconds until the next hour bucket starts. Always > 0, at most 3600.
pub fn seconds_until_hour_end(t: DateTime<Utc>) -> i64 {
    let this_hour = t
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap();
    let next = this_hour + Duration::hours(1);
    let seconds = (next - t).num_seconds();
    seconds.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_month_key_format() {
        assert_eq!(month_key(at(2026, 3, 15, 12, 0, 0)), "202603");
        assert_eq!(month_key(at(2026, 12, 1, 0, 0, 0)), "202612");
    }

    #[test]
    fn test_hour_key_format() {
        assert_eq!(hour_key(at(2026, 3, 15, 9, 30, 0)), "2026031509");
        assert_eq!(hour_key(at(2026, 3, 15, 23, 59, 59)), "2026031523");
    }

    #[test]
    fn test_ledger_month_format() {
        assert_eq!(ledger_month(at(2026, 3, 15, 12, 0, 0)), "2026-03");
    }

    #[test]
    fn test_sharp_hour_rollover() {
        // 09:59:59 is still hour 09; 10:00:00 is hour 10
        assert_eq!(hour_key(at(2026, 3, 15, 9, 59, 59)), "2026031509");
        assert_eq!(hour_key(at(2026, 3, 15, 10, 0, 0)), "2026031510");
    }

    #[test]
    fn test_sharp_month_rollover() {
        assert_eq!(month_key(at(2026, 3, 31, 23, 59, 59)), "202603");
        assert_eq!(month_key(at(2026, 4, 1, 0, 0, 0)), "202604");
    }

    #[test]
    fn test_seconds_until_hour_end_bounds() {
        assert_eq!(seconds_until_hour_end(at(2026, 3, 15, 9, 0, 0)), 3600);
        assert_eq!(seconds_until_hour_end(at(2026, 3, 15, 9, 59, 59)), 1);
        let t = at(2026, 3, 15, 9, 30, 0);
        assert_eq!(seconds_until_hour_end(t), 1800);
    }

    #[test]
    fn test_seconds_until_month_end_year_boundary() {
        let t = at(2026, 12, 31, 23, 59, 0);
        assert_eq!(seconds_until_month_end(t), 60);
        assert_eq!(month_key(t), "202612");
        assert_eq!(month_key(t + Duration::seconds(60)), "202701");
    }

    #[test]
    fn test_seconds_until_month_end_february() {
        // 2028 is a leap year
        assert_eq!(
            seconds_until_month_end(at(2028, 2, 28, 0, 0, 0)),
            2 * 86400
        );
        assert_eq!(seconds_until_month_end(at(2026, 2, 28, 0, 0, 0)), 86400);
    }

    #[test]
    fn test_ttl_always_positive() {
        let t = at(2026, 6, 30, 23, 59, 59);
        assert!(seconds_until_month_end(t) > 0);
        assert!(seconds_until_hour_end(t) > 0);
    }
}
