//! Count-based retention: keep the newest N archives.

use super::{sort_newest_first, BackupRecord, RetentionPlan, RetentionTag};

/// Records to delete so that only the `keep_count` newest remain.
///
/// `keep_count <= 0` keeps everything.
pub fn select_for_deletion(records: &[BackupRecord], keep_count: i64) -> Vec<BackupRecord> {
    plan_simple(records, keep_count).delete
}

pub fn plan_simple(records: &[BackupRecord], keep_count: i64) -> RetentionPlan {
    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted);

    let keep_len = if keep_count <= 0 {
        sorted.len()
    } else {
        usize::try_from(keep_count)
            .unwrap_or(usize::MAX)
            .min(sorted.len())
    };

    let delete = sorted.split_off(keep_len);

    let keep = sorted
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            if i == 0 {
                record.tagged(RetentionTag::Newest)
            } else {
                record.tagged(RetentionTag::WithinKeepCount)
            }
        })
        .collect();

    let delete = delete
        .into_iter()
        .map(|record| record.tagged(RetentionTag::BeyondKeepCount))
        .collect();

    RetentionPlan { keep, delete }
}
