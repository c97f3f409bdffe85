//! Buffering and seek windows
//!
//! A window is an open interval for one contiguous stall or seek. At most one
//! window of each kind is open at a time. Closed durations are clamped to the
//! configured maximum while the unclamped sum is tracked alongside.

use crate::types::{BufferingReason, BufferingType};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Duration filtering and clamping shared by all windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    pub min_ms: i64,
    pub max_ms: i64,
    pub max_events: usize,
}

impl WindowPolicy {
    pub fn clamp(&self, duration_ms: i64) -> i64 {
        duration_ms.clamp(0, self.max_ms)
    }
}

fn push_bounded<T>(events: &mut VecDeque<T>, value: T, cap: usize) {
    if events.len() >= cap {
        events.pop_front();
    }
    events.push_back(value);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferingWindow {
    pub start_ts: i64,
    pub reason: BufferingReason,
    pub buffering_type: BufferingType,
    /// Set once a mid-flight snapshot has counted the window up to this time
    pub counted_until: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferingStats {
    pub count: u32,
    pub network_count: u32,
    pub unknown_count: u32,
    /// Windows shorter than the minimum that were dropped
    pub discarded_count: u32,
    /// Clamped total (ms)
    pub duration_ms: i64,
    /// Unclamped total (ms)
    pub original_duration_ms: i64,
    /// `[start, end]` in seconds
    pub events: VecDeque<[f64; 2]>,
}

/// Result of closing a buffering window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedBuffering {
    pub duration_ms: i64,
    pub buffering_type: BufferingType,
    /// The window was counted for the first time by this close
    pub newly_counted: bool,
}

#[derive(Debug, Clone)]
pub struct BufferingTracker {
    policy: WindowPolicy,
    open: Option<BufferingWindow>,
    stats: BufferingStats,
}

impl BufferingTracker {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            open: None,
            stats: BufferingStats::default(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_window(&self) -> Option<&BufferingWindow> {
        self.open.as_ref()
    }

    pub fn stats(&self) -> &BufferingStats {
        &self.stats
    }

    /// Open a window; false if one is already open
    pub fn open(&mut self, start_ts: i64, reason: BufferingReason, buffering_type: BufferingType) -> bool {
        if self.open.is_some() {
            return false;
        }
        self.open = Some(BufferingWindow {
            start_ts,
            reason,
            buffering_type,
            counted_until: None,
        });
        true
    }

    /// Drop the open window without counting it
    pub fn abandon(&mut self) -> bool {
        self.open.take().is_some()
    }

    /// Close (or with `reset == false` snapshot) the open window
    pub fn close(&mut self, now: i64, reset: bool) -> Option<ClosedBuffering> {
        let window = self.open?;
        let duration = (now - window.start_ts).max(0);

        let closed = match window.counted_until {
            None if duration <= self.policy.min_ms => {
                if reset {
                    self.stats.discarded_count += 1;
                }
                None
            }
            None => {
                self.stats.count += 1;
                match window.buffering_type {
                    BufferingType::Network => self.stats.network_count += 1,
                    BufferingType::Unknown => self.stats.unknown_count += 1,
                }
                self.stats.duration_ms += self.policy.clamp(duration);
                self.stats.original_duration_ms += duration;
                push_bounded(
                    &mut self.stats.events,
                    [window.start_ts as f64 / 1000.0, now as f64 / 1000.0],
                    self.policy.max_events,
                );
                Some(ClosedBuffering {
                    duration_ms: duration,
                    buffering_type: window.buffering_type,
                    newly_counted: true,
                })
            }
            Some(counted_until) => {
                // Count only the remainder since the snapshot
                let counted = (counted_until - window.start_ts).max(0);
                self.stats.duration_ms += self.policy.clamp(duration) - self.policy.clamp(counted);
                self.stats.original_duration_ms += duration - counted;
                if let Some(last) = self.stats.events.back_mut() {
                    last[1] = now as f64 / 1000.0;
                }
                Some(ClosedBuffering {
                    duration_ms: duration,
                    buffering_type: window.buffering_type,
                    newly_counted: false,
                })
            }
        };

        if reset {
            self.open = None;
        } else if closed.is_some() {
            if let Some(open) = self.open.as_mut() {
                open.counted_until = Some(now.max(window.start_ts));
            }
        }
        closed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekWindow {
    pub from: f64,
    pub to: f64,
    pub start_ts: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeekEvent {
    pub from: f64,
    pub to: f64,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeekStats {
    pub count: u32,
    pub duration_ms: i64,
    pub original_duration_ms: i64,
    pub events: VecDeque<SeekEvent>,
}

#[derive(Debug, Clone)]
pub struct SeekTracker {
    policy: WindowPolicy,
    open: Option<SeekWindow>,
    stats: SeekStats,
}

impl SeekTracker {
    pub fn new(policy: WindowPolicy) -> Self {
        Self {
            policy,
            open: None,
            stats: SeekStats::default(),
        }
    }

    pub fn is_seeking(&self) -> bool {
        self.open.is_some()
    }

    pub fn stats(&self) -> &SeekStats {
        &self.stats
    }

    /// Open a seek window, force-closing an in-flight one first
    pub fn start(&mut self, from: f64, to: f64, now: i64) {
        self.end(now);
        self.open = Some(SeekWindow { from, to, start_ts: now });
    }

    pub fn end(&mut self, now: i64) -> Option<SeekEvent> {
        let window = self.open.take()?;
        let duration = (now - window.start_ts).max(0);
        self.stats.count += 1;
        self.stats.duration_ms += self.policy.clamp(duration);
        self.stats.original_duration_ms += duration;
        let event = SeekEvent {
            from: window.from,
            to: window.to,
            start_time: window.start_ts,
            end_time: now.max(window.start_ts),
        };
        push_bounded(&mut self.stats.events, event, self.policy.max_events);
        Some(event)
    }
}
