//! Tiered daily/weekly/monthly retention.
//!
//! Everything inside the daily window is kept. Beyond it the weekly and then
//! the monthly horizon are walked with rolling windows: each window ends at
//! the archive kept for the previous one, and the oldest archive inside it
//! survives. Consecutive kept archives are therefore never further apart than
//! one window width, unless the input itself has a larger hole.

use super::{sort_newest_first, BackupRecord, RetentionPlan, RetentionTag, DAY, MONTH, WEEK};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TieredPolicy {
    /// Days during which every backup is kept
    pub daily_days: u32,
    /// Length of the weekly horizon, in 7-day periods
    pub weekly_periods: u32,
    /// Length of the monthly horizon, in 30-day periods
    pub monthly_periods: u32,
}

impl Default for TieredPolicy {
    fn default() -> Self {
        Self {
            daily_days: 10,
            weekly_periods: 4,
            monthly_periods: 6,
        }
    }
}

/// Horizon boundaries derived from a policy and a reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cutoffs {
    pub daily: i64,
    pub weekly: i64,
    pub monthly: i64,
}

impl TieredPolicy {
    pub fn cutoffs(&self, now: i64) -> Cutoffs {
        let daily = now.saturating_sub(i64::from(self.daily_days) * DAY);
        let weekly = daily.saturating_sub(i64::from(self.weekly_periods) * WEEK);
        let monthly = weekly.saturating_sub(i64::from(self.monthly_periods) * MONTH);
        Cutoffs {
            daily,
            weekly,
            monthly,
        }
    }
}

/// Walk the horizon `[lower, ..)` below the kept record at `upper` with
/// rolling windows of `width`, tagging the oldest record of each window.
///
/// A window ends at the previously kept timestamp. When that window is
/// empty it is moved down to end one `width` above the next record, so the
/// gap only grows by the hole already present in the input. Returns the
/// timestamp of the oldest kept record and how many windows were kept.
fn keep_rolling(
    sorted: &[BackupRecord],
    tags: &mut [Option<RetentionTag>],
    mut upper: i64,
    lower: i64,
    width: i64,
    tag: fn(u32) -> RetentionTag,
) -> (i64, u32) {
    let mut kept = 0u32;
    let mut idx = 0usize;

    loop {
        // First record strictly older than the last kept one
        while idx < sorted.len() && sorted[idx].timestamp >= upper {
            idx += 1;
        }
        let Some(first) = sorted.get(idx) else { break };
        if first.timestamp < lower {
            break;
        }

        let top = upper.min(first.timestamp.saturating_add(width));
        let floor = top.saturating_sub(width).max(lower);

        let mut oldest = idx;
        while oldest + 1 < sorted.len() && sorted[oldest + 1].timestamp >= floor {
            oldest += 1;
        }

        tags[oldest] = tags[oldest].or(Some(tag(kept)));
        kept += 1;
        upper = sorted[oldest].timestamp;
        idx = oldest + 1;
    }

    (upper, kept)
}

/// Split `records` into keep and delete sets for the tiered policy at `now`.
pub fn apply_tiered_retention(
    records: &[BackupRecord],
    policy: &TieredPolicy,
    now: i64,
) -> RetentionPlan {
    if records.is_empty() {
        return RetentionPlan::default();
    }

    let mut sorted = records.to_vec();
    sort_newest_first(&mut sorted);

    let cutoffs = policy.cutoffs(now);
    let mut tags: Vec<Option<RetentionTag>> = vec![None; sorted.len()];

    tags[0] = Some(RetentionTag::Newest);
    let mut oldest_kept = sorted[0].timestamp;

    for (idx, record) in sorted.iter().enumerate() {
        if record.timestamp >= cutoffs.daily {
            tags[idx] = tags[idx].or(Some(RetentionTag::Daily));
            oldest_kept = oldest_kept.min(record.timestamp);
        }
    }

    let (oldest_kept, _) = keep_rolling(
        &sorted,
        &mut tags,
        oldest_kept,
        cutoffs.weekly,
        WEEK,
        RetentionTag::WeeklyPeriod,
    );
    let (_, monthly_kept) = keep_rolling(
        &sorted,
        &mut tags,
        oldest_kept,
        cutoffs.monthly,
        MONTH,
        RetentionTag::MonthlyPeriod,
    );

    let last = sorted.len() - 1;
    if monthly_kept == 0 && sorted[last].timestamp < cutoffs.monthly {
        tags[last] = tags[last].or(Some(RetentionTag::OldestAnchor));
    }

    let mut plan = RetentionPlan::default();
    for (record, tag) in sorted.into_iter().zip(tags) {
        match tag {
            Some(tag) => plan.keep.push(record.tagged(tag)),
            None => {
                let reason = if record.timestamp >= cutoffs.weekly {
                    RetentionTag::WeeklyDuplicate
                } else if record.timestamp >= cutoffs.monthly {
                    RetentionTag::MonthlyDuplicate
                } else {
                    RetentionTag::TooOld
                };
                plan.delete.push(record.tagged(reason));
            }
        }
    }

    plan
}
