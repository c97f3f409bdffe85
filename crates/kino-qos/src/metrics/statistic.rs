//! Running statistics (Welford's online algorithm)

use serde::{Deserialize, Serialize};

/// Incrementally updated mean / variance / extrema
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStatistic {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

/// Read-side view of a [`RunningStatistic`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticSummary {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl RunningStatistic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sample standard deviation; 0 with fewer than two samples
    pub fn std(&self) -> f64 {
        if self.count <= 1 {
            0.0
        } else {
            (self.m2 / (self.count - 1) as f64).sqrt()
        }
    }

    pub fn summary(&self) -> StatisticSummary {
        StatisticSummary {
            mean: self.mean,
            std: self.std(),
            min: self.min,
            max: self.max,
        }
    }
}
