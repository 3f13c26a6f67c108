//! # Retention Era
//!
//! One link of the history chain: a buffer of `(timestamp, upload, download)`
//! buckets at a fixed granularity with a fixed retention horizon.
//!
//! - A bucket starts at the timestamp of the first sample that did not fit the
//!   previous bucket; samples less than `interval` after the bucket start are
//!   folded into it according to the [`RollupPolicy`].
//! - Buckets older than `now - horizon` are evicted. A horizon of `0` keeps
//!   everything.
//! - A non-terminal era produces one rollup per cadence window. The window is
//!   `[at - cadence, at)` and the rollup is stamped `at`. Windows are anchored
//!   at the era's first sample.
//! - A bucket never straddles a window boundary: the first sample at or past
//!   a boundary opens a new bucket, so every raw poll is rolled up exactly once
//!   and into the window that contains it.
//!
//! Bucket starts are at least `interval` apart and eviction keeps only the
//! last `horizon` worth of them, so an era never holds more than
//! `ceil(horizon / interval)` buckets.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::utils::{seconds_to_duration, DurationParts};

/// # Sample
///
/// One bucket of the rate series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Bucket start, unix millis.
    pub ts: u64,
    /// Upload rate, bytes per second.
    pub upload: f64,
    /// Download rate, bytes per second.
    pub download: f64,
    /// Number of raw polls folded into this bucket.
    pub count: u32,
}

/// What [`RetentionEra::add_sample`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// Started a new bucket.
    Appended,
    /// Folded into the newest bucket.
    Merged,
    /// Not newer than the previous input; dropped.
    Rejected,
}

/// # Rollup Policy
///
/// How several samples are folded into one, both inside a bucket and when an
/// era forwards a window to the next era.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupPolicy {
    /// Arithmetic mean over every raw poll the samples represent.
    #[default]
    Mean,
    /// The most recent sample wins.
    Last,
    /// Per-series maximum.
    Max,
}

impl RollupPolicy {
    fn fold(self, acc: &mut Sample, next: &Sample) {
        match self {
            RollupPolicy::Mean => {
                let total = f64::from(acc.count) + f64::from(next.count);
                if total > 0.0 {
                    acc.upload = (acc.upload * f64::from(acc.count) + next.upload * f64::from(next.count)) / total;
                    acc.download =
                        (acc.download * f64::from(acc.count) + next.download * f64::from(next.count)) / total;
                }
            }
            RollupPolicy::Last => {
                acc.upload = next.upload;
                acc.download = next.download;
            }
            RollupPolicy::Max => {
                acc.upload = acc.upload.max(next.upload);
                acc.download = acc.download.max(next.download);
            }
        }
        acc.count = acc.count.saturating_add(next.count);
    }
}

/// One entry of [`HistorySnapshot::timestamps`]: how long ago the bucket
/// started, plus its absolute start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryTimestamp {
    /// Elapsed time between the bucket start and the query time.
    #[serde(flatten)]
    pub elapsed: DurationParts,
    /// Bucket start, unix millis.
    pub ts: u64,
}

/// # History Snapshot
///
/// Graph-ready view of an era. The three arrays are index-aligned, oldest
/// first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySnapshot {
    /// Bucket times.
    pub timestamps: Vec<HistoryTimestamp>,
    /// Download rates.
    pub download: Vec<f64>,
    /// Upload rates.
    pub upload: Vec<f64>,
}

impl HistorySnapshot {
    /// Whether the snapshot has no buckets.
    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// # Retention Era
#[derive(Debug, Clone)]
pub struct RetentionEra {
    name: String,
    interval_ms: u64,
    horizon_ms: u64,
    rollup_cadence_ms: Option<u64>,
    policy: RollupPolicy,
    buckets: VecDeque<Sample>,
    last_input_ts: Option<u64>,
    rollup_anchor: Option<u64>,
    next_rollup_at: Option<u64>,
}

impl RetentionEra {
    /// Creates an empty era. `horizon_ms == 0` means unbounded; a `None`
    /// cadence makes this a terminal era.
    pub fn new(
        name: &str,
        interval_ms: u64,
        horizon_ms: u64,
        rollup_cadence_ms: Option<u64>,
        policy: RollupPolicy,
    ) -> Self {
        Self {
            name: name.to_string(),
            interval_ms,
            horizon_ms,
            rollup_cadence_ms,
            policy,
            buckets: VecDeque::new(),
            last_input_ts: None,
            rollup_anchor: None,
            next_rollup_at: None,
        }
    }

    /// Era name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bucket granularity in millis.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    /// Retention horizon in millis, `0` when unbounded.
    pub fn horizon_ms(&self) -> u64 {
        self.horizon_ms
    }

    /// Rollup cadence in millis, `None` for the terminal era.
    pub fn rollup_cadence_ms(&self) -> Option<u64> {
        self.rollup_cadence_ms
    }

    /// Number of buffered buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no buckets are buffered.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buffered buckets, oldest first.
    pub fn buckets(&self) -> impl Iterator<Item = &Sample> {
        self.buckets.iter()
    }

    /// # Add Sample
    ///
    /// Adds one sample stamped `sample.ts`. Samples not strictly newer than
    /// the previous input are rejected, as are samples falling in a window
    /// that was already rolled up. Eviction runs relative to the sample's
    /// timestamp.
    pub fn add_sample(&mut self, sample: Sample) -> SampleOutcome {
        if let Some(last) = self.last_input_ts {
            if sample.ts <= last {
                tracing::debug!(era = %self.name, ts = sample.ts, last, "out-of-order sample dropped");
                return SampleOutcome::Rejected;
            }
        }
        if let Some(open_from) = self.open_window_start() {
            if sample.ts < open_from {
                tracing::debug!(era = %self.name, ts = sample.ts, open_from, "sample for a rolled-up window dropped");
                return SampleOutcome::Rejected;
            }
        }
        self.last_input_ts = Some(sample.ts);

        if self.rollup_anchor.is_none() {
            self.rollup_anchor = Some(sample.ts);
            self.next_rollup_at = self.rollup_cadence_ms.map(|cadence| sample.ts.saturating_add(cadence));
        }

        let window = self.window_of(sample.ts);
        let fits_open_bucket = self
            .buckets
            .back()
            .is_some_and(|bucket| sample.ts - bucket.ts < self.interval_ms && self.window_of(bucket.ts) == window);

        let outcome = match self.buckets.back_mut() {
            Some(bucket) if fits_open_bucket => {
                self.policy.fold(bucket, &sample);
                SampleOutcome::Merged
            }
            _ => {
                self.buckets.push_back(Sample {
                    count: sample.count.max(1),
                    ..sample
                });
                SampleOutcome::Appended
            }
        };

        self.evict(sample.ts);
        outcome
    }

    /// Index of the cadence window holding `ts`, `None` for terminal eras.
    fn window_of(&self, ts: u64) -> Option<u64> {
        match (self.rollup_cadence_ms, self.rollup_anchor) {
            (Some(cadence), Some(anchor)) if cadence > 0 => Some(ts.saturating_sub(anchor) / cadence),
            _ => None,
        }
    }

    /// Start of the oldest window not yet rolled up.
    fn open_window_start(&self) -> Option<u64> {
        let cadence = self.rollup_cadence_ms?;
        self.next_rollup_at.map(|at| at.saturating_sub(cadence))
    }

    /// Drops buckets at or before `now - horizon`. No-op for unbounded eras.
    pub fn evict(&mut self, now: u64) -> usize {
        if self.horizon_ms == 0 {
            return 0;
        }
        let Some(cutoff) = now.checked_sub(self.horizon_ms) else {
            return 0;
        };

        let before = self.buckets.len();
        while self.buckets.front().is_some_and(|b| b.ts <= cutoff) {
            self.buckets.pop_front();
        }
        before - self.buckets.len()
    }

    /// # Take Rollups
    ///
    /// Folds every cadence window that closed at or before `now` into one
    /// sample each, oldest first. Windows without buckets produce nothing.
    /// Terminal eras never produce rollups.
    pub fn take_rollups(&mut self, now: u64) -> Vec<Sample> {
        let (Some(cadence), Some(mut at)) = (self.rollup_cadence_ms, self.next_rollup_at) else {
            return Vec::new();
        };
        if cadence == 0 {
            return Vec::new();
        }

        let mut rollups = Vec::new();
        while at <= now {
            let start = at.saturating_sub(cadence);
            let mut window = self.buckets.iter().filter(|b| b.ts >= start && b.ts < at);

            if let Some(first) = window.next() {
                let mut acc = *first;
                for bucket in window {
                    self.policy.fold(&mut acc, bucket);
                }
                acc.ts = at;
                rollups.push(acc);
            }
            at = at.saturating_add(cadence);
        }

        self.next_rollup_at = Some(at);
        rollups
    }

    /// # Get Data
    ///
    /// The newest `limit` buckets as a [`HistorySnapshot`], with elapsed
    /// durations measured from `now`. Does not modify the era.
    pub fn get_data(&self, now: u64, limit: usize) -> HistorySnapshot {
        let skip = self.buckets.len().saturating_sub(limit);
        let mut snapshot = HistorySnapshot::default();

        for bucket in self.buckets.iter().skip(skip) {
            let elapsed_secs = now.saturating_sub(bucket.ts) as f64 / 1000.0;
            snapshot.timestamps.push(HistoryTimestamp {
                elapsed: seconds_to_duration(elapsed_secs),
                ts: bucket.ts,
            });
            snapshot.download.push(bucket.download);
            snapshot.upload.push(bucket.upload);
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ts: u64, up: f64, dn: f64) -> Sample {
        Sample {
            ts,
            upload: up,
            download: dn,
            count: 1,
        }
    }

    fn era(interval: u64, horizon: u64, cadence: Option<u64>) -> RetentionEra {
        RetentionEra::new("test", interval, horizon, cadence, RollupPolicy::Mean)
    }

    #[test]
    fn test_out_of_order_sample_is_rejected() {
        let mut e = era(1000, 0, None);
        assert_eq!(e.add_sample(sample(5000, 1.0, 1.0)), SampleOutcome::Appended);
        assert_eq!(e.add_sample(sample(5000, 2.0, 2.0)), SampleOutcome::Rejected);
        assert_eq!(e.add_sample(sample(4000, 2.0, 2.0)), SampleOutcome::Rejected);
        assert_eq!(e.len(), 1);
        assert_eq!(e.buckets().next().map(|b| b.upload), Some(1.0));
    }

    #[test]
    fn test_samples_within_interval_merge_by_mean() {
        let mut e = era(5000, 0, None);
        e.add_sample(sample(0, 10.0, 100.0));
        assert_eq!(e.add_sample(sample(2000, 20.0, 200.0)), SampleOutcome::Merged);
        assert_eq!(e.add_sample(sample(4000, 30.0, 300.0)), SampleOutcome::Merged);
        assert_eq!(e.add_sample(sample(5000, 1.0, 1.0)), SampleOutcome::Appended);

        let first = e.buckets().next().copied().unwrap();
        assert_eq!(first.ts, 0);
        assert_eq!(first.count, 3);
        assert!((first.upload - 20.0).abs() < 1e-9);
        assert!((first.download - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_last_and_max_policies() {
        let mut last = RetentionEra::new("last", 5000, 0, None, RollupPolicy::Last);
        let mut max = RetentionEra::new("max", 5000, 0, None, RollupPolicy::Max);
        for e in [&mut last, &mut max] {
            e.add_sample(sample(0, 5.0, 1.0));
            e.add_sample(sample(1000, 9.0, 3.0));
            e.add_sample(sample(2000, 2.0, 2.0));
        }
        let l = last.buckets().next().copied().unwrap();
        let m = max.buckets().next().copied().unwrap();
        assert_eq!((l.upload, l.download), (2.0, 2.0));
        assert_eq!((m.upload, m.download), (9.0, 3.0));
    }

    #[test]
    fn test_bucket_count_is_bounded_by_horizon() {
        let mut e = era(5000, 60_000, None);
        for i in 0..1000u64 {
            e.add_sample(sample(i * 1000, i as f64, i as f64));
            assert!(e.len() <= 12, "len {} at {}", e.len(), i);
        }
        assert_eq!(e.len(), 12);
    }

    #[test]
    fn test_unbounded_horizon_never_evicts() {
        let mut e = era(1000, 0, None);
        for i in 0..500u64 {
            e.add_sample(sample(i * 1000, 0.0, 0.0));
        }
        assert_eq!(e.evict(u64::MAX), 0);
        assert_eq!(e.len(), 500);
    }

    #[test]
    fn test_rollup_means_the_closed_window() {
        let mut e = era(5000, 300_000, Some(20_000));
        for i in 0..10u64 {
            e.add_sample(sample(i * 2000, 10.0, i as f64 * 10.0));
        }

        assert!(e.take_rollups(19_999).is_empty());
        let rollups = e.take_rollups(20_000);
        assert_eq!(rollups.len(), 1);
        assert_eq!(rollups[0].ts, 20_000);
        assert_eq!(rollups[0].count, 10);
        assert!((rollups[0].upload - 10.0).abs() < 1e-9);
        assert!((rollups[0].download - 45.0).abs() < 1e-9);

        // Same window is not rolled up twice.
        assert!(e.take_rollups(20_000).is_empty());
    }

    #[test]
    fn test_bucket_is_closed_at_window_boundary() {
        let mut e = era(5000, 300_000, Some(20_000));
        for i in 0..=10u64 {
            e.add_sample(sample(i * 2000, 0.0, i as f64));
        }

        // 18 s opened a bucket; 20 s belongs to the next window.
        let starts: Vec<u64> = e.buckets().map(|b| b.ts).collect();
        assert_eq!(starts, vec![0, 6000, 12_000, 18_000, 20_000]);

        let rollups = e.take_rollups(20_000);
        assert_eq!(rollups[0].count, 10);
        assert!((rollups[0].download - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_every_poll_is_rolled_up_once() {
        let mut e = era(5000, 300_000, Some(20_000));
        let mut rolled = Vec::new();
        for i in 0..=100u64 {
            e.add_sample(sample(i * 2000, 0.0, i as f64));
            rolled.extend(e.take_rollups(i * 2000));
        }

        // Polls 0..=99 fill the ten windows closed by 200 s.
        let polls: u32 = rolled.iter().map(|r| r.count).sum();
        assert_eq!(polls, 100);
        assert_eq!(rolled.len(), 10);
        for (k, rollup) in rolled.iter().enumerate() {
            assert_eq!(rollup.count, 10);
            let expected = (k * 10) as f64 + 4.5;
            assert!((rollup.download - expected).abs() < 1e-9, "window {k}: {}", rollup.download);
        }
    }

    #[test]
    fn test_sample_for_rolled_up_window_is_rejected() {
        let mut e = era(1000, 0, Some(10_000));
        e.add_sample(sample(0, 1.0, 1.0));
        e.add_sample(sample(5000, 1.0, 1.0));
        assert_eq!(e.take_rollups(25_000).len(), 1);

        assert_eq!(e.add_sample(sample(15_000, 9.0, 9.0)), SampleOutcome::Rejected);
        assert_eq!(e.add_sample(sample(21_000, 9.0, 9.0)), SampleOutcome::Appended);
    }

    #[test]
    fn test_missed_windows_are_caught_up_and_empty_ones_skipped() {
        let mut e = era(1000, 0, Some(10_000));
        e.add_sample(sample(0, 1.0, 1.0));
        e.add_sample(sample(25_000, 3.0, 3.0));

        let rollups = e.take_rollups(40_000);
        let stamps: Vec<u64> = rollups.iter().map(|r| r.ts).collect();
        assert_eq!(stamps, vec![10_000, 30_000]);
    }

    #[test]
    fn test_terminal_era_never_rolls_up() {
        let mut e = era(1000, 0, None);
        e.add_sample(sample(0, 1.0, 1.0));
        assert!(e.take_rollups(u64::MAX / 2).is_empty());
    }

    #[test]
    fn test_get_data_limits_and_leaves_buffer_intact() {
        let mut e = era(1000, 0, None);
        for i in 0..5u64 {
            e.add_sample(sample(i * 1000, i as f64, (i * 2) as f64));
        }

        let data = e.get_data(10_000, 3);
        assert_eq!(data.upload, vec![2.0, 3.0, 4.0]);
        assert_eq!(data.download, vec![4.0, 6.0, 8.0]);
        assert_eq!(data.timestamps[0].ts, 2000);
        assert_eq!(data.timestamps[0].elapsed.seconds, 8);
        assert_eq!(e.len(), 5);

        let json = serde_json::to_value(&data.timestamps[2]).unwrap();
        assert_eq!(json, serde_json::json!({"seconds": 6, "cumSeconds": 6.0, "ts": 4000}));
    }
}
