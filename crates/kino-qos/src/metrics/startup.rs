//! Startup step progression
//!
//! Each resume cycle (initial start, resume after a midroll, reload) gets its
//! own [`StartupAttempt`]. Steps only move forward, one at a time.

use crate::types::StartupStep;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartupAttempt {
    pub step: StartupStep,
    pub is_resume_from_ad: bool,
    pub start_load_ts: Option<i64>,
    pub first_frame_ts: Option<i64>,
    pub play_started_ts: Option<i64>,
}

impl StartupAttempt {
    fn new(now: i64, is_resume_from_ad: bool) -> Self {
        Self {
            step: StartupStep::StartLoad,
            is_resume_from_ad,
            start_load_ts: Some(now),
            first_frame_ts: None,
            play_started_ts: None,
        }
    }
}

/// Startup timings reported once per session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartupTimings {
    /// Session start to the first visible frame on any track (ms, -1 if none)
    pub join_time: i64,
    /// Session start to the first content frame (ms, -1 if none)
    pub first_frame_duration: i64,
    /// Content start-load to its first frame, first attempt only (ms, -1 if none)
    pub content_first_frame_duration: i64,
    /// Sum of start-load to first frame over later resumes (ms)
    pub total_content_resume_first_frame_duration: i64,
    pub content_resume_count: u32,
}

impl Default for StartupTimings {
    fn default() -> Self {
        Self {
            join_time: -1,
            first_frame_duration: -1,
            content_first_frame_duration: -1,
            total_content_resume_first_frame_duration: 0,
            content_resume_count: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartupTracker {
    attempts: Vec<StartupAttempt>,
    ad_traces: Vec<Vec<StartupStep>>,
    last_ad_start_load_ts: Option<i64>,
    timings: StartupTimings,
}

impl StartupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> &[StartupAttempt] {
        &self.attempts
    }

    pub fn timings(&self) -> StartupTimings {
        self.timings
    }

    /// Step reached by the latest content attempt
    pub fn latest_step(&self) -> StartupStep {
        self.attempts.last().map(|a| a.step).unwrap_or(StartupStep::Unknown)
    }

    /// Content source assigned
    pub fn start_load(&mut self, now: i64, is_resume_from_ad: bool) {
        match self.attempts.last() {
            Some(last) if last.step <= StartupStep::StartLoad => {
                // Re-emitted start-load for an attempt that has not progressed
            }
            _ => self.attempts.push(StartupAttempt::new(now, is_resume_from_ad)),
        }
    }

    /// First content frame rendered; true if the step advanced
    pub fn first_frame_viewed(&mut self, now: i64, session_start_ts: i64) -> bool {
        let Some(attempt) = self.attempts.last_mut() else {
            return false;
        };
        if attempt.step != StartupStep::StartLoad {
            return false;
        }
        attempt.step = StartupStep::ViewedFirstFrame;
        attempt.first_frame_ts = Some(now);
        let load_to_frame = attempt.start_load_ts.map(|ts| now - ts).unwrap_or(0).max(0);

        let t = &mut self.timings;
        if t.join_time < 0 {
            t.join_time = (now - session_start_ts).max(0);
        }
        if t.first_frame_duration < 0 {
            t.first_frame_duration = (now - session_start_ts).max(0);
        }
        if t.content_first_frame_duration < 0 {
            t.content_first_frame_duration = load_to_frame;
        } else {
            t.total_content_resume_first_frame_duration += load_to_frame;
            t.content_resume_count += 1;
        }
        true
    }

    /// Playhead moved after the first frame; true if the step advanced
    pub fn current_time_progressed(&mut self, now: i64) -> bool {
        match self.attempts.last_mut() {
            Some(attempt) if attempt.step == StartupStep::ViewedFirstFrame => {
                attempt.step = StartupStep::PlayStarted;
                attempt.play_started_ts = Some(now);
                true
            }
            _ => false,
        }
    }

    /// A new ad player was set up; its steps are traced separately
    pub fn ad_player_setup(&mut self) {
        self.ad_traces.push(Vec::new());
    }

    /// Record an ad step on the latest trace; steps never move backwards
    pub fn ad_step(&mut self, step: StartupStep, now: i64, session_start_ts: i64) {
        if self.ad_traces.is_empty() {
            self.ad_traces.push(Vec::new());
        }
        let Some(trace) = self.ad_traces.last_mut() else {
            return;
        };
        if trace.last().is_some_and(|last| *last >= step) {
            return;
        }
        trace.push(step);
        match step {
            StartupStep::StartLoad => self.last_ad_start_load_ts = Some(now),
            StartupStep::ViewedFirstFrame if self.timings.join_time < 0 => {
                self.timings.join_time = (now - session_start_ts).max(0);
            }
            _ => {}
        }
    }

    /// Latest step recorded on the ad track
    pub fn last_ad_step(&self) -> StartupStep {
        self.ad_traces
            .last()
            .and_then(|t| t.last().copied())
            .unwrap_or(StartupStep::Unknown)
    }

    pub fn last_ad_start_load_ts(&self) -> Option<i64> {
        self.last_ad_start_load_ts
    }

    pub fn ad_traces(&self) -> &[Vec<StartupStep>] {
        &self.ad_traces
    }
}
