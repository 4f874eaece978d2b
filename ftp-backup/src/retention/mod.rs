//! Retention engine.
//!
//! Pure functions deciding which backup archives survive a pruning pass. The
//! same code runs over local directory listings and over remote listings,
//! where timestamps may have been recovered from filenames.

pub mod filename_date;
pub mod simple;
pub mod tiered;

pub use filename_date::{extract_timestamp, prepare_from_filenames};
pub use simple::{plan_simple, select_for_deletion};
pub use tiered::{apply_tiered_retention, TieredPolicy};

use serde::{Serialize, Serializer};
use std::fmt;

pub const DAY: i64 = 86_400;
pub const WEEK: i64 = 7 * DAY;
pub const MONTH: i64 = 30 * DAY;

/// One backup archive as seen by a retention pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub filename: String,
    /// Seconds since epoch; 0 when unknown
    pub timestamp: i64,
    pub size_bytes: Option<u64>,
    pub retention_tag: Option<RetentionTag>,
}

impl BackupRecord {
    pub fn new(filename: impl Into<String>, timestamp: i64) -> Self {
        Self {
            filename: filename.into(),
            timestamp: timestamp.max(0),
            size_bytes: None,
            retention_tag: None,
        }
    }

    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = Some(size_bytes);
        self
    }

    fn tagged(mut self, tag: RetentionTag) -> Self {
        self.retention_tag = Some(tag);
        self
    }
}

/// Why a record was kept or deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionTag {
    Newest,
    Daily,
    WeeklyPeriod(u32),
    MonthlyPeriod(u32),
    OldestAnchor,
    /// Kept by the simple strategy
    WithinKeepCount,
    TooOld,
    WeeklyDuplicate,
    MonthlyDuplicate,
    /// Deleted by the simple strategy
    BeyondKeepCount,
}

impl RetentionTag {
    pub fn is_kept(&self) -> bool {
        matches!(
            self,
            RetentionTag::Newest
                | RetentionTag::Daily
                | RetentionTag::WeeklyPeriod(_)
                | RetentionTag::MonthlyPeriod(_)
                | RetentionTag::OldestAnchor
                | RetentionTag::WithinKeepCount
        )
    }
}

impl fmt::Display for RetentionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetentionTag::Newest => write!(f, "newest"),
            RetentionTag::Daily => write!(f, "daily"),
            RetentionTag::WeeklyPeriod(i) => write!(f, "weekly-period-{}", i),
            RetentionTag::MonthlyPeriod(i) => write!(f, "monthly-period-{}", i),
            RetentionTag::OldestAnchor => write!(f, "oldest-anchor"),
            RetentionTag::WithinKeepCount => write!(f, "within-keep-count"),
            RetentionTag::TooOld => write!(f, "too-old"),
            RetentionTag::WeeklyDuplicate => write!(f, "weekly-duplicate"),
            RetentionTag::MonthlyDuplicate => write!(f, "monthly-duplicate"),
            RetentionTag::BeyondKeepCount => write!(f, "beyond-keep-count"),
        }
    }
}

impl Serialize for RetentionTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Result of a retention pass: both halves newest first, every record tagged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetentionPlan {
    pub keep: Vec<BackupRecord>,
    pub delete: Vec<BackupRecord>,
}

impl RetentionPlan {
    pub fn kept_names(&self) -> Vec<&str> {
        self.keep.iter().map(|r| r.filename.as_str()).collect()
    }

    pub fn deleted_names(&self) -> Vec<&str> {
        self.delete.iter().map(|r| r.filename.as_str()).collect()
    }
}

/// Immutable retention configuration handed to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    Simple { keep_count: i64 },
    Tiered(TieredPolicy),
}

impl RetentionPolicy {
    pub fn plan(&self, records: &[BackupRecord], now: i64) -> RetentionPlan {
        match self {
            RetentionPolicy::Simple { keep_count } => plan_simple(records, *keep_count),
            RetentionPolicy::Tiered(policy) => apply_tiered_retention(records, policy, now),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetentionPolicy::Simple { .. } => "simple",
            RetentionPolicy::Tiered(_) => "tiered",
        }
    }
}

/// Sort newest first; equal timestamps fall back to filename, descending.
pub fn sort_newest_first(records: &mut [BackupRecord]) {
    records.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.filename.cmp(&a.filename))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_labels() {
        assert_eq!(RetentionTag::Newest.to_string(), "newest");
        assert_eq!(RetentionTag::WeeklyPeriod(2).to_string(), "weekly-period-2");
        assert_eq!(RetentionTag::MonthlyPeriod(0).to_string(), "monthly-period-0");
        assert_eq!(RetentionTag::OldestAnchor.to_string(), "oldest-anchor");
        assert_eq!(RetentionTag::WeeklyDuplicate.to_string(), "weekly-duplicate");
        assert!(RetentionTag::OldestAnchor.is_kept());
        assert!(!RetentionTag::TooOld.is_kept());
    }

    #[test]
    fn test_sort_ties_by_filename_descending() {
        let mut records = vec![
            BackupRecord::new("a.zip", 100),
            BackupRecord::new("c.zip", 50),
            BackupRecord::new("b.zip", 100),
        ];
        sort_newest_first(&mut records);
        let names: Vec<_> = records.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, vec!["b.zip", "a.zip", "c.zip"]);
    }

    #[test]
    fn test_negative_timestamp_clamped_to_sentinel() {
        assert_eq!(BackupRecord::new("x.zip", -20).timestamp, 0);
    }

    #[test]
    fn test_tag_serializes_as_label() {
        let record = BackupRecord::new("x.zip", 10).tagged(RetentionTag::MonthlyPeriod(1));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["retention_tag"], "monthly-period-1");
    }
}
