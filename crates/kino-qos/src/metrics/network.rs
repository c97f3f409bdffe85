//! Periodic network feature sampling
//!
//! Every sampling period the session manager reads the player's cumulative
//! fragment download counters. The delta since the previous sample becomes a
//! throughput figure; queued time-to-first-byte samples are averaged for the
//! same period. Periods without fragment activity are skipped so idle time does
//! not drag the means down.

use super::statistic::{RunningStatistic, StatisticSummary};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt::Write as _;
use tracing::debug;

/// Cumulative fragment download counters reported by the player
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FragDownloadStats {
    /// Total bytes of media fragments loaded
    pub loaded_bytes: u64,
    /// Total time spent loading fragments (ms)
    pub loading_ms: f64,
}

/// One accepted sampling period
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetworkSample {
    pub timestamp: i64,
    pub throughput_kbps: f64,
    pub ttfb_ms: f64,
}

/// Aggregated network features for the report
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkFeatures {
    pub samples: u64,
    pub throughput_kbps: StatisticSummary,
    pub ttfb_ms: StatisticSummary,
}

#[derive(Debug, Clone)]
pub struct NetworkFeatureSampler {
    baseline: Option<FragDownloadStats>,
    pending_ttfb: Vec<f64>,
    throughput: RunningStatistic,
    ttfb: RunningStatistic,
    history: VecDeque<NetworkSample>,
    history_len: usize,
}

impl NetworkFeatureSampler {
    pub fn new(history_len: usize) -> Self {
        Self {
            baseline: None,
            pending_ttfb: Vec::new(),
            throughput: RunningStatistic::new(),
            ttfb: RunningStatistic::new(),
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    /// Queue a per-fragment time-to-first-byte measurement
    pub fn push_ttfb(&mut self, ttfb_ms: f64) {
        if ttfb_ms.is_finite() && ttfb_ms >= 0.0 {
            self.pending_ttfb.push(ttfb_ms);
        }
    }

    /// Close the current period
    pub fn sample(&mut self, stats: Option<FragDownloadStats>, now: i64) -> Option<NetworkSample> {
        let pending = std::mem::take(&mut self.pending_ttfb);
        let stats = stats?;
        let Some(previous) = self.baseline.replace(stats) else {
            // First reading only establishes the baseline
            return None;
        };

        if stats.loaded_bytes < previous.loaded_bytes || stats.loading_ms < previous.loading_ms {
            debug!("Fragment counters went backwards, resetting baseline");
            return None;
        }

        let delta_bytes = (stats.loaded_bytes - previous.loaded_bytes) as f64;
        let delta_ms = stats.loading_ms - previous.loading_ms;
        let throughput_kbps = if delta_ms > 0.0 { delta_bytes * 8.0 / delta_ms } else { 0.0 };
        let ttfb_ms = if pending.is_empty() {
            0.0
        } else {
            pending.iter().sum::<f64>() / pending.len() as f64
        };

        if throughput_kbps <= 0.0 || ttfb_ms <= 0.0 {
            return None;
        }

        self.throughput.push(throughput_kbps);
        self.ttfb.push(ttfb_ms);

        let sample = NetworkSample {
            timestamp: now,
            throughput_kbps,
            ttfb_ms,
        };
        if self.history.len() >= self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(sample);

        debug!(throughput_kbps, ttfb_ms, "Network sample recorded");
        Some(sample)
    }

    pub fn history(&self) -> impl Iterator<Item = &NetworkSample> {
        self.history.iter()
    }

    pub fn features(&self) -> NetworkFeatures {
        NetworkFeatures {
            samples: self.throughput.count(),
            throughput_kbps: self.throughput.summary(),
            ttfb_ms: self.ttfb.summary(),
        }
    }

    /// History as CSV with a header row
    pub fn to_csv(&self) -> String {
        let mut out = String::from("timestamp,throughput_kbps,ttfb_ms\n");
        for s in &self.history {
            let _ = writeln!(out, "{},{:.3},{:.3}", s.timestamp, s.throughput_kbps, s.ttfb_ms);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(bytes: u64, ms: f64) -> Option<FragDownloadStats> {
        Some(FragDownloadStats {
            loaded_bytes: bytes,
            loading_ms: ms,
        })
    }

    #[test]
    fn test_first_reading_sets_baseline() {
        let mut sampler = NetworkFeatureSampler::new(120);
        sampler.push_ttfb(50.0);
        assert!(sampler.sample(stats(1_000, 10.0), 0).is_none());
        assert_eq!(sampler.features().samples, 0);
    }

    #[test]
    fn test_throughput_and_ttfb() {
        let mut sampler = NetworkFeatureSampler::new(120);
        sampler.sample(stats(0, 0.0), 0);
        sampler.push_ttfb(40.0);
        sampler.push_ttfb(60.0);
        // 1_000_000 bytes in 1000 ms = 8000 kbps
        let sample = sampler.sample(stats(1_000_000, 1_000.0), 30_000).unwrap();
        assert!((sample.throughput_kbps - 8_000.0).abs() < 1e-9);
        assert!((sample.ttfb_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_idle_period_skipped() {
        let mut sampler = NetworkFeatureSampler::new(120);
        sampler.sample(stats(500, 5.0), 0);
        assert!(sampler.sample(stats(500, 5.0), 30_000).is_none());
        // ttfb without bytes is also skipped
        sampler.push_ttfb(30.0);
        assert!(sampler.sample(stats(500, 5.0), 60_000).is_none());
        assert_eq!(sampler.features().samples, 0);
        assert_eq!(sampler.features().throughput_kbps.mean, 0.0);
    }

    #[test]
    fn test_history_bounded() {
        let mut sampler = NetworkFeatureSampler::new(3);
        sampler.sample(stats(0, 0.0), 0);
        for i in 1..=5u64 {
            sampler.push_ttfb(10.0);
            sampler.sample(stats(i * 1_000, i as f64 * 10.0), i as i64);
        }
        let timestamps: Vec<i64> = sampler.history().map(|s| s.timestamp).collect();
        assert_eq!(timestamps, vec![3, 4, 5]);
        assert_eq!(sampler.to_csv().lines().count(), 4);
    }

    #[test]
    fn test_counter_reset_skips_period() {
        let mut sampler = NetworkFeatureSampler::new(10);
        sampler.sample(stats(10_000, 100.0), 0);
        sampler.push_ttfb(10.0);
        assert!(sampler.sample(stats(10, 1.0), 1).is_none());
        sampler.push_ttfb(10.0);
        assert!(sampler.sample(stats(1_010, 11.0), 2).is_some());
    }
}
