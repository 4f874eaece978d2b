//! Recover backup timestamps from filenames.
//!
//! Remote listings only give us names, so the date embedded by the archiver
//! (`backup-2024-01-15-143022.zip`) is the best available age signal.

use super::BackupRecord;
use chrono::{DateTime, Local, NaiveDate, TimeZone};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static DATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4})[-_]?(\d{2})[-_]?(\d{2})(?:[-_]?(\d{2})[-_]?(\d{2})[-_]?(\d{2}))?")
        .expect("date pattern is a valid regex")
});

/// Parse the first `YYYY[-_]MM[-_]DD([-_]HH[-_]MM[-_]SS)?` in `filename` as
/// local time. Returns `(0, false)` when nothing usable is found.
pub fn extract_timestamp(filename: &str) -> (i64, bool) {
    match DATE_PATTERN.captures(filename).and_then(|caps| compose(&caps)) {
        Some(dt) if dt.timestamp() > 0 => (dt.timestamp(), true),
        _ => (0, false),
    }
}

fn compose(caps: &Captures<'_>) -> Option<DateTime<Local>> {
    // Missing time groups mean midnight.
    let field = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };

    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?;
    let naive = date.and_hms_opt(field(4)?, field(5)?, field(6)?)?;
    Local.from_local_datetime(&naive).earliest()
}

/// Build records for a remote listing; unparsable names get timestamp 0.
pub fn prepare_from_filenames<I, S>(names: I) -> Vec<BackupRecord>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| {
            let name = name.as_ref();
            let (timestamp, _) = extract_timestamp(name);
            BackupRecord::new(name, timestamp)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use proptest::prelude::*;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> i64 {
        Local
            .with_ymd_and_hms(y, mo, d, h, mi, s)
            .earliest()
            .unwrap()
            .timestamp()
    }

    #[test]
    fn test_no_date() {
        assert_eq!(extract_timestamp("no-date-here.zip"), (0, false));
        assert_eq!(extract_timestamp("invalid-filename.zip"), (0, false));
    }

    #[test]
    fn test_full_timestamp() {
        assert_eq!(
            extract_timestamp("backup-2024-01-15-143022.zip"),
            (local(2024, 1, 15, 14, 30, 22), true)
        );
    }

    #[test]
    fn test_date_only_defaults_to_midnight() {
        assert_eq!(
            extract_timestamp("backup-2023-12-01.zip"),
            (local(2023, 12, 1, 0, 0, 0), true)
        );
    }

    #[test]
    fn test_underscore_and_compact_separators() {
        assert_eq!(
            extract_timestamp("backup_2024_03_10_120000.zip"),
            (local(2024, 3, 10, 12, 0, 0), true)
        );
        assert_eq!(
            extract_timestamp("site20240310.zip"),
            (local(2024, 3, 10, 0, 0, 0), true)
        );
    }

    #[test]
    fn test_invalid_calendar_values() {
        assert_eq!(extract_timestamp("backup-2024-13-45.zip"), (0, false));
        assert_eq!(extract_timestamp("backup-2024-02-30-101010.zip"), (0, false));
        assert_eq!(extract_timestamp("backup-2024-01-15-256199.zip"), (0, false));
    }

    #[test]
    fn test_prepare_from_filenames() {
        let records = prepare_from_filenames([
            "backup-2024-01-15-143022.zip",
            "backup-2024-02-20-091530.zip",
            "backup-2023-12-01.zip",
            "invalid-filename.zip",
            "backup_2024_03_10_120000.zip",
        ]);

        assert_eq!(records.len(), 5);
        assert_eq!(records.iter().filter(|r| r.timestamp > 0).count(), 4);
        assert_eq!(records[0].timestamp, local(2024, 1, 15, 14, 30, 22));
        assert_eq!(records[3].filename, "invalid-filename.zip");
        assert_eq!(records[3].timestamp, 0);
    }

    proptest! {
        #[test]
        fn prop_round_trip_same_day(
            year in 2000i32..2100,
            month in 1u32..=12,
            day in 1u32..=28,
            hour in 4u32..21,
            minute in 0u32..60,
            second in 0u32..60,
        ) {
            let name = format!(
                "backup-{:04}-{:02}-{:02}-{:02}{:02}{:02}.zip",
                year, month, day, hour, minute, second
            );
            let (ts, matched) = extract_timestamp(&name);
            prop_assert!(matched);

            let parsed = Local.timestamp_opt(ts, 0).single().unwrap();
            prop_assert_eq!((parsed.year(), parsed.month(), parsed.day()), (year, month, day));
            prop_assert_eq!(parsed.minute(), minute);
        }
    }
}
