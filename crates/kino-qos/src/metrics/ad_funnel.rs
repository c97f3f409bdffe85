//! Ad pod request funnel

use crate::types::AdBreakKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    Empty,
    Error,
}

/// Per ad-break-kind request counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdPodFetchFunnel {
    pub total_count: u32,
    pub total_request_duration: i64,
    pub error_count: u32,
    pub empty_count: u32,
    #[serde(skip)]
    fetching: bool,
    #[serde(skip)]
    fetch_start_ts: i64,
}

impl AdPodFetchFunnel {
    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    /// Request sent; a duplicate while fetching is ignored
    pub fn fetch(&mut self, now: i64) -> bool {
        if self.fetching {
            return false;
        }
        self.fetching = true;
        self.fetch_start_ts = now;
        self.total_count += 1;
        true
    }

    /// Response received; ignored if no request is in flight
    pub fn finish(&mut self, now: i64, outcome: FetchOutcome) -> bool {
        if !self.fetching {
            return false;
        }
        self.fetching = false;
        self.total_request_duration += (now - self.fetch_start_ts).max(0);
        match outcome {
            FetchOutcome::Success => {}
            FetchOutcome::Empty => self.empty_count += 1,
            FetchOutcome::Error => self.error_count += 1,
        }
        true
    }
}

/// Funnels indexed by [`AdBreakKind`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdFunnels {
    pub preroll: AdPodFetchFunnel,
    pub midroll: AdPodFetchFunnel,
}

impl AdFunnels {
    pub fn get(&self, kind: AdBreakKind) -> &AdPodFetchFunnel {
        match kind {
            AdBreakKind::Preroll => &self.preroll,
            AdBreakKind::Midroll => &self.midroll,
        }
    }

    pub fn get_mut(&mut self, kind: AdBreakKind) -> &mut AdPodFetchFunnel {
        match kind {
            AdBreakKind::Preroll => &mut self.preroll,
            AdBreakKind::Midroll => &mut self.midroll,
        }
    }
}
