//! Retention policies
//!
//! A policy only classifies: given every snapshot of a world in ascending
//! order it returns the ones that may be deleted. Deleting them is the
//! caller's job.

use chrono::{DateTime, Datelike, Days, Local, NaiveDate, TimeZone};
use std::collections::BTreeSet;

use crate::SnapshotId;

/// Default number of snapshots kept by [`RetentionPolicy::FixedCount`]
pub const DEFAULT_FIXED_COUNT: usize = 10;

/// Default grace period of [`RetentionPolicy::Daily`], in days
pub const DEFAULT_GRACE_DAYS: u32 = 3;

/// Age (days) below which GFS keeps everything
pub const GFS_GRACE_DAYS: i64 = 2;
/// Age (days) below which GFS keeps one snapshot per day
pub const GFS_DAILY_DAYS: i64 = 7;
/// Age (days) below which GFS keeps one snapshot per ISO week
pub const GFS_WEEKLY_DAYS: i64 = 30;

/// Rule deciding which snapshots are safe to delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep everything; marks pruning as disabled
    All,
    /// Keep a fixed number of recent snapshots
    FixedCount { count: usize },
    /// Keep one snapshot per day once it leaves the grace period
    Daily { grace_days: u32 },
    /// Grandfather-father-son: daily, then weekly, then monthly
    Gfs,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::All
    }
}

impl RetentionPolicy {
    /// Fixed-count policy; a zero count falls back to the default
    pub fn fixed_count(count: usize) -> Self {
        if count == 0 {
            tracing::warn!(
                "Invalid snapshot count 0, using default {}",
                DEFAULT_FIXED_COUNT
            );
            return RetentionPolicy::FixedCount {
                count: DEFAULT_FIXED_COUNT,
            };
        }
        RetentionPolicy::FixedCount { count }
    }

    /// Daily policy with the given grace period
    pub fn daily(grace_days: u32) -> Self {
        RetentionPolicy::Daily { grace_days }
    }

    /// Snapshots to prune, evaluated in the local time zone right now
    pub fn snapshots_to_prune(&self, snapshots: &BTreeSet<SnapshotId>) -> Vec<SnapshotId> {
        self.snapshots_to_prune_at(snapshots, Local::now())
    }

    /// Snapshots to prune as of `now`
    ///
    /// Calendar math (days, weeks, months) happens in `now`'s time zone.
    /// The result is a duplicate-free subset of `snapshots`, newest first.
    pub fn snapshots_to_prune_at<Tz: TimeZone>(
        &self,
        snapshots: &BTreeSet<SnapshotId>,
        now: DateTime<Tz>,
    ) -> Vec<SnapshotId> {
        match *self {
            RetentionPolicy::All => Vec::new(),
            RetentionPolicy::FixedCount { count } => prune_fixed_count(snapshots, count),
            RetentionPolicy::Daily { grace_days } => prune_daily(snapshots, &now, grace_days),
            RetentionPolicy::Gfs => prune_gfs(snapshots, &now),
        }
    }
}

/// Keeps the newest `count - 1` snapshots plus the oldest one.
///
/// This mirrors the historical behaviour of the fixed-count policy, which
/// prunes positions `count-1 ..= len-2` of the newest-first list.
fn prune_fixed_count(snapshots: &BTreeSet<SnapshotId>, count: usize) -> Vec<SnapshotId> {
    let count = count.max(1);
    let newest_first: Vec<&SnapshotId> = snapshots.iter().rev().collect();

    if newest_first.len() <= count {
        return Vec::new();
    }

    newest_first[count - 1..newest_first.len() - 1]
        .iter()
        .map(|id| (*id).clone())
        .collect()
}

fn prune_daily<Tz: TimeZone>(
    snapshots: &BTreeSet<SnapshotId>,
    now: &DateTime<Tz>,
    grace_days: u32,
) -> Vec<SnapshotId> {
    let today = now.date_naive();
    let cutoff = today
        .checked_sub_days(Days::new(u64::from(grace_days)))
        .unwrap_or(NaiveDate::MIN);

    let mut prune = Vec::new();
    let mut last_kept: Option<NaiveDate> = None;

    for id in snapshots.iter().rev() {
        let date = local_date(id, now);

        if date > cutoff {
            last_kept = Some(date);
            continue;
        }

        if last_kept == Some(date) {
            prune.push(id.clone());
        } else {
            last_kept = Some(date);
        }
    }

    prune
}

fn prune_gfs<Tz: TimeZone>(snapshots: &BTreeSet<SnapshotId>, now: &DateTime<Tz>) -> Vec<SnapshotId> {
    let today = now.date_naive();

    let mut prune = Vec::new();
    let mut last_day: Option<NaiveDate> = None;
    let mut last_week: Option<(i32, u32)> = None;
    let mut last_month: Option<(i32, u32)> = None;

    for id in snapshots.iter().rev() {
        let date = local_date(id, now);
        let age = (today - date).num_days();

        let duplicate = if age < GFS_GRACE_DAYS {
            false
        } else if age < GFS_DAILY_DAYS {
            seen_in_period(&mut last_day, date)
        } else if age < GFS_WEEKLY_DAYS {
            let week = date.iso_week();
            seen_in_period(&mut last_week, (week.year(), week.week()))
        } else {
            seen_in_period(&mut last_month, (date.year(), date.month()))
        };

        if duplicate {
            prune.push(id.clone());
        }
    }

    prune
}

/// Records `key` as the tier's current period; true if it already was
fn seen_in_period<K: PartialEq>(last: &mut Option<K>, key: K) -> bool {
    if last.as_ref() == Some(&key) {
        true
    } else {
        *last = Some(key);
        false
    }
}

fn local_date<Tz: TimeZone>(id: &SnapshotId, now: &DateTime<Tz>) -> NaiveDate {
    id.timestamp().with_timezone(&now.timezone()).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NamingScheme, WorldId};
    use chrono::{FixedOffset, Utc};

    fn world() -> WorldId {
        WorldId::new("W").unwrap()
    }

    /// Snapshot at a wall-clock time in UTC
    fn snap(y: i32, m: u32, d: u32, h: u32) -> SnapshotId {
        NamingScheme::Current.create_at(&world(), Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap())
    }

    fn set(ids: &[SnapshotId]) -> BTreeSet<SnapshotId> {
        ids.iter().cloned().collect()
    }

    fn sorted(mut ids: Vec<SnapshotId>) -> Vec<SnapshotId> {
        ids.sort();
        ids
    }

    #[test]
    fn test_all_prunes_nothing() {
        let snapshots = set(&[snap(2023, 1, 1, 0), snap(2023, 1, 1, 1)]);
        assert!(RetentionPolicy::All
            .snapshots_to_prune_at(&snapshots, Utc::now())
            .is_empty());
    }

    #[test]
    fn test_fixed_count_three_of_five() {
        let s: Vec<SnapshotId> = (1..=5).map(|d| snap(2023, 1, d, 12)).collect();
        let snapshots = set(&s);

        let prune = RetentionPolicy::fixed_count(3).snapshots_to_prune_at(&snapshots, Utc::now());

        // Ranked newest first: s[4], s[3] kept, s[2], s[1] pruned, s[0] kept
        assert_eq!(sorted(prune), vec![s[1].clone(), s[2].clone()]);
    }

    #[test]
    fn test_fixed_count_not_exceeded() {
        let s: Vec<SnapshotId> = (1..=3).map(|d| snap(2023, 1, d, 12)).collect();
        let prune = RetentionPolicy::fixed_count(3).snapshots_to_prune_at(&set(&s), Utc::now());
        assert!(prune.is_empty());
    }

    #[test]
    fn test_fixed_count_zero_uses_default() {
        assert_eq!(
            RetentionPolicy::fixed_count(0),
            RetentionPolicy::FixedCount {
                count: DEFAULT_FIXED_COUNT
            }
        );
    }

    #[test]
    fn test_daily_fixture() {
        let today = [snap(2023, 2, 23, 9), snap(2023, 2, 23, 8), snap(2023, 2, 23, 7)];
        let yesterday = [snap(2023, 2, 22, 9), snap(2023, 2, 22, 8), snap(2023, 2, 22, 7)];
        let old = [snap(2023, 2, 18, 9), snap(2023, 2, 18, 8)];

        let mut all = Vec::new();
        all.extend_from_slice(&today);
        all.extend_from_slice(&yesterday);
        all.extend_from_slice(&old);

        let now = Utc.with_ymd_and_hms(2023, 2, 23, 10, 0, 0).unwrap();
        let prune = RetentionPolicy::daily(2).snapshots_to_prune_at(&set(&all), now);

        assert_eq!(prune, vec![old[1].clone()]);
    }

    #[test]
    fn test_daily_keeps_newest_per_day() {
        let s = [
            snap(2023, 2, 10, 7),
            snap(2023, 2, 10, 8),
            snap(2023, 2, 10, 9),
            snap(2023, 2, 11, 9),
        ];
        let now = Utc.with_ymd_and_hms(2023, 2, 23, 10, 0, 0).unwrap();
        let prune = RetentionPolicy::daily(3).snapshots_to_prune_at(&set(&s), now);

        assert_eq!(sorted(prune), vec![s[0].clone(), s[1].clone()]);
    }

    #[test]
    fn test_daily_uses_evaluation_zone() {
        // 23:30 and 00:30 UTC are different days in UTC but the same day at +02:00
        let a = NamingScheme::Current
            .create_at(&world(), Utc.with_ymd_and_hms(2023, 2, 10, 23, 30, 0).unwrap());
        let b = NamingScheme::Current
            .create_at(&world(), Utc.with_ymd_and_hms(2023, 2, 11, 0, 30, 0).unwrap());
        let snapshots = set(&[a.clone(), b]);

        let utc_now = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
        assert!(RetentionPolicy::daily(3)
            .snapshots_to_prune_at(&snapshots, utc_now)
            .is_empty());

        let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
        let local_now = utc_now.with_timezone(&plus_two);
        assert_eq!(
            RetentionPolicy::daily(3).snapshots_to_prune_at(&snapshots, local_now),
            vec![a]
        );
    }

    #[test]
    fn test_gfs_tiers() {
        // now: Wednesday 2023-03-29
        let now = Utc.with_ymd_and_hms(2023, 3, 29, 12, 0, 0).unwrap();

        // Grace (< 2 days): duplicates survive
        let grace = [snap(2023, 3, 29, 8), snap(2023, 3, 29, 9), snap(2023, 3, 28, 9)];
        // Daily tier (2..7 days): two on 03-25
        let daily_keep = snap(2023, 3, 25, 10);
        let daily_drop = snap(2023, 3, 25, 9);
        let daily_other = snap(2023, 3, 24, 9);
        // Weekly tier (7..30 days): ISO week 11 is 03-13..03-19
        let weekly_keep = snap(2023, 3, 17, 9);
        let weekly_drop = snap(2023, 3, 14, 9);
        // Monthly tier (>= 30 days): January twice, December once
        let monthly_keep = snap(2023, 1, 20, 9);
        let monthly_drop = snap(2023, 1, 3, 9);
        let december = snap(2022, 12, 30, 9);

        let mut all = grace.to_vec();
        all.extend([
            daily_keep,
            daily_drop.clone(),
            daily_other,
            weekly_keep,
            weekly_drop.clone(),
            monthly_keep,
            monthly_drop.clone(),
            december,
        ]);

        let prune = RetentionPolicy::Gfs.snapshots_to_prune_at(&set(&all), now);
        assert_eq!(sorted(prune), vec![monthly_drop, weekly_drop, daily_drop]);
    }

    #[test]
    fn test_gfs_tiers_track_periods_independently() {
        // All three fall in ISO week 12. 03-23 sits in the daily tier, so
        // the weekly tier starts fresh at 03-22 and only drops 03-20.
        let now = Utc.with_ymd_and_hms(2023, 3, 29, 12, 0, 0).unwrap();
        let s = [snap(2023, 3, 20, 9), snap(2023, 3, 22, 9), snap(2023, 3, 23, 9)];

        let prune = RetentionPolicy::Gfs.snapshots_to_prune_at(&set(&s), now);
        assert_eq!(prune, vec![s[0].clone()]);
    }

    #[test]
    fn test_prune_set_is_subset_without_duplicates() {
        let s: Vec<SnapshotId> = (0..48).map(|h| snap(2023, 1, 1 + h / 24, h % 24)).collect();
        let snapshots = set(&s);
        let now = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();

        for policy in [
            RetentionPolicy::All,
            RetentionPolicy::fixed_count(5),
            RetentionPolicy::daily(1),
            RetentionPolicy::Gfs,
        ] {
            let prune = policy.snapshots_to_prune_at(&snapshots, now);
            let unique: BTreeSet<_> = prune.iter().cloned().collect();
            assert_eq!(unique.len(), prune.len(), "{:?} produced duplicates", policy);
            assert!(unique.is_subset(&snapshots));
        }
    }
}
