//! Playback metrics accumulator
//!
//! [`PlaybackMetrics`] owns every per-session counter and timer. Fields are
//! private; all mutation goes through the accumulator methods so the window and
//! startup invariants are enforced in one place. A fresh value comes from
//! [`PlaybackMetrics::initial`], and [`PlaybackMetrics::reset`] returns a new one
//! built from the same limits.

pub mod ad_funnel;
pub mod network;
pub mod startup;
pub mod statistic;
pub mod window;

pub use ad_funnel::{AdFunnels, AdPodFetchFunnel, FetchOutcome};
pub use network::{FragDownloadStats, NetworkFeatureSampler, NetworkFeatures, NetworkSample};
pub use startup::{StartupAttempt, StartupTimings, StartupTracker};
pub use statistic::{RunningStatistic, StatisticSummary};
pub use window::{BufferingStats, BufferingTracker, ClosedBuffering, SeekEvent, SeekStats, SeekTracker, WindowPolicy};

use crate::classify::ErrorRecord;
use crate::types::{AdBreakKind, BufferingReason, BufferingType, QosConfig, StartupStep, Track};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Fragment load error timestamps kept for the CDN jitter heuristic
const FRAG_ERROR_HISTORY: usize = 32;

/// Largest playhead advance counted as continuous viewing (s)
const MAX_VIEW_DELTA_SECS: f64 = 2.0;

/// Session state the buffering guards depend on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferingContext {
    pub is_retrying: bool,
    pub in_ad: bool,
    pub backgrounded: bool,
}

/// Recovery and break-off counters; all non-decreasing within a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryCounters {
    pub reload_count: u32,
    pub fallback_count: u32,
    pub token_expired_retry_count: u32,
    pub engine_recovery_count: u32,
    pub break_off_count: u32,
}

/// Latest and recent classified errors per track
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    last_error: Option<ErrorRecord>,
    last_ad_error: Option<ErrorRecord>,
    history: VecDeque<ErrorRecord>,
    ad_history: VecDeque<ErrorRecord>,
    cap: usize,
}

impl ErrorLog {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            ..Default::default()
        }
    }

    pub fn record(&mut self, record: ErrorRecord) {
        let (last, history) = match record.track {
            Track::Content => (&mut self.last_error, &mut self.history),
            Track::Ad => (&mut self.last_ad_error, &mut self.ad_history),
        };
        if history.len() >= self.cap {
            history.pop_front();
        }
        history.push_back(record.clone());
        *last = Some(record);
    }

    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    pub fn last_ad_error(&self) -> Option<&ErrorRecord> {
        self.last_ad_error.as_ref()
    }

    pub fn history(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.history.iter()
    }

    pub fn ad_history(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.ad_history.iter()
    }
}

/// Limits copied from the configuration so a reset rebuilds the same shape
#[derive(Debug, Clone, Copy)]
struct MetricsLimits {
    policy: WindowPolicy,
    network_history_len: usize,
    error_history_len: usize,
}

/// Per-session QoS metrics
#[derive(Debug, Clone)]
pub struct PlaybackMetrics {
    limits: MetricsLimits,
    session_start_ts: i64,
    buffering: BufferingTracker,
    ad_buffering: BufferingTracker,
    seek: SeekTracker,
    startup: StartupTracker,
    ad_funnels: AdFunnels,
    network: NetworkFeatureSampler,
    errors: ErrorLog,
    counters: RecoveryCounters,
    frag_error_ts: VecDeque<i64>,
    content_view_ms: i64,
    last_position: Option<f64>,
    ads_started: u32,
    first_unknown_buffering_on_device: bool,
}

impl PlaybackMetrics {
    /// Fresh metrics for a session started at `session_start_ts`
    pub fn initial(config: &QosConfig, session_start_ts: i64) -> Self {
        let limits = MetricsLimits {
            policy: WindowPolicy {
                min_ms: config.min_record_buffering_duration_ms,
                max_ms: config.max_record_duration_ms,
                max_events: config.max_recorded_events,
            },
            network_history_len: config.network_history_len,
            error_history_len: config.error_history_len,
        };
        Self::with_limits(limits, session_start_ts)
    }

    fn with_limits(limits: MetricsLimits, session_start_ts: i64) -> Self {
        Self {
            limits,
            session_start_ts,
            buffering: BufferingTracker::new(limits.policy),
            ad_buffering: BufferingTracker::new(limits.policy),
            seek: SeekTracker::new(limits.policy),
            startup: StartupTracker::new(),
            ad_funnels: AdFunnels::default(),
            network: NetworkFeatureSampler::new(limits.network_history_len),
            errors: ErrorLog::new(limits.error_history_len),
            counters: RecoveryCounters::default(),
            frag_error_ts: VecDeque::with_capacity(FRAG_ERROR_HISTORY),
            content_view_ms: 0,
            last_position: None,
            ads_started: 0,
            first_unknown_buffering_on_device: false,
        }
    }

    /// A fresh value with the same limits
    pub fn reset(&self, session_start_ts: i64) -> Self {
        Self::with_limits(self.limits, session_start_ts)
    }

    pub fn session_start_ts(&self) -> i64 {
        self.session_start_ts
    }

    // ---- buffering ----

    /// Open a content buffering window; false if any guard rejects it
    pub fn buffer_start(
        &mut self,
        reason: BufferingReason,
        buffering_type: BufferingType,
        ctx: BufferingContext,
        now: i64,
    ) -> bool {
        let rejected = if reason == BufferingReason::LoadStart {
            Some("load start")
        } else if self.buffering.is_open() {
            Some("window open")
        } else if self.seek.is_seeking() {
            Some("seeking")
        } else if ctx.is_retrying {
            Some("retrying")
        } else if ctx.in_ad {
            Some("in ad")
        } else if self.startup.latest_step() <= StartupStep::StartLoad {
            Some("startup incomplete")
        } else if ctx.backgrounded {
            Some("backgrounded")
        } else {
            None
        };
        if let Some(guard) = rejected {
            debug!(guard, "Buffer start rejected");
            return false;
        }
        self.buffering.open(now, reason, buffering_type)
    }

    /// Close (or snapshot, with `reset == false`) the content buffering window
    pub fn buffer_end(&mut self, reset: bool, ctx: BufferingContext, now: i64) -> Option<ClosedBuffering> {
        if !self.buffering.is_open() {
            return None;
        }
        if ctx.in_ad || ctx.backgrounded {
            if reset {
                self.buffering.abandon();
                debug!("Buffering window dropped uncounted");
            }
            return None;
        }
        let closed = self.buffering.close(now, reset);
        if let Some(closed) = closed {
            debug!(duration_ms = closed.duration_ms, buffering_type = ?closed.buffering_type, "Buffering counted");
        }
        closed
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering.is_open()
    }

    pub fn buffering(&self) -> &BufferingStats {
        self.buffering.stats()
    }

    pub fn ad_buffer_start(&mut self, now: i64) -> bool {
        self.ad_buffering.open(now, BufferingReason::Stalled, BufferingType::Unknown)
    }

    pub fn ad_buffer_end(&mut self, now: i64) -> Option<ClosedBuffering> {
        self.ad_buffering.close(now, true)
    }

    pub fn ad_buffering(&self) -> &BufferingStats {
        self.ad_buffering.stats()
    }

    /// The device saw its first unknown-type buffering in this session
    pub fn mark_first_unknown_buffering_on_device(&mut self) {
        self.first_unknown_buffering_on_device = true;
    }

    // ---- seeking ----

    /// Open a seek window; an open buffering window is closed as a break-off
    pub fn seek_start(&mut self, from: f64, to: f64, now: i64) {
        if self.buffering.is_open() {
            self.counters.break_off_count += 1;
            self.buffering.close(now, true);
        }
        self.seek.start(from, to, now);
        self.last_position = Some(to);
    }

    pub fn seek_end(&mut self, now: i64) -> Option<SeekEvent> {
        self.seek.end(now)
    }

    pub fn is_seeking(&self) -> bool {
        self.seek.is_seeking()
    }

    pub fn seeking(&self) -> &SeekStats {
        self.seek.stats()
    }

    // ---- startup ----

    pub fn start_load(&mut self, track: Track, now: i64, is_resume_from_ad: bool) {
        match track {
            Track::Content => self.startup.start_load(now, is_resume_from_ad),
            Track::Ad => self.startup.ad_step(StartupStep::StartLoad, now, self.session_start_ts),
        }
    }

    pub fn first_frame_viewed(&mut self, track: Track, now: i64) -> bool {
        match track {
            Track::Content => self.startup.first_frame_viewed(now, self.session_start_ts),
            Track::Ad => {
                self.startup.ad_step(StartupStep::ViewedFirstFrame, now, self.session_start_ts);
                true
            }
        }
    }

    pub fn current_time_progressed(&mut self, track: Track, now: i64) -> bool {
        match track {
            Track::Content => self.startup.current_time_progressed(now),
            Track::Ad => {
                self.startup.ad_step(StartupStep::PlayStarted, now, self.session_start_ts);
                true
            }
        }
    }

    pub fn ad_player_setup(&mut self) {
        self.startup.ad_player_setup();
    }

    pub fn startup(&self) -> &StartupTracker {
        &self.startup
    }

    // ---- ads ----

    pub fn ad_pod_fetch(&mut self, kind: AdBreakKind, now: i64) -> bool {
        self.ad_funnels.get_mut(kind).fetch(now)
    }

    pub fn ad_pod_fetch_finished(&mut self, kind: AdBreakKind, outcome: FetchOutcome, now: i64) -> bool {
        self.ad_funnels.get_mut(kind).finish(now, outcome)
    }

    pub fn ad_funnels(&self) -> &AdFunnels {
        &self.ad_funnels
    }

    pub fn ad_started(&mut self) {
        self.ads_started += 1;
    }

    // ---- network ----

    pub fn push_ttfb(&mut self, ttfb_ms: f64) {
        self.network.push_ttfb(ttfb_ms);
    }

    pub fn sample_network(&mut self, stats: Option<FragDownloadStats>, now: i64) -> Option<NetworkSample> {
        self.network.sample(stats, now)
    }

    pub fn network(&self) -> &NetworkFeatureSampler {
        &self.network
    }

    pub fn frag_load_error(&mut self, now: i64) {
        if self.frag_error_ts.len() >= FRAG_ERROR_HISTORY {
            self.frag_error_ts.pop_front();
        }
        self.frag_error_ts.push_back(now);
    }

    /// Fragment load errors at or after `since`
    pub fn frag_errors_since(&self, since: i64) -> usize {
        self.frag_error_ts.iter().filter(|ts| **ts >= since).count()
    }

    // ---- view time ----

    /// Content playhead update
    pub fn time(&mut self, position: f64, playing: bool, _now: i64) {
        if let Some(last) = self.last_position {
            let delta = position - last;
            if playing && delta > 0.0 && delta <= MAX_VIEW_DELTA_SECS {
                self.content_view_ms += (delta * 1000.0).round() as i64;
            }
        }
        self.last_position = Some(position);
    }

    pub fn content_view_ms(&self) -> i64 {
        self.content_view_ms
    }

    // ---- errors and counters ----

    pub fn record_error(&mut self, record: ErrorRecord) {
        self.errors.record(record);
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn counters(&self) -> RecoveryCounters {
        self.counters
    }

    pub fn count_reload(&mut self) -> u32 {
        self.counters.reload_count += 1;
        self.counters.reload_count
    }

    pub fn count_fallback(&mut self) -> u32 {
        self.counters.fallback_count += 1;
        self.counters.fallback_count
    }

    pub fn count_token_expired_retry(&mut self) -> u32 {
        self.counters.token_expired_retry_count += 1;
        self.counters.token_expired_retry_count
    }

    pub fn count_engine_recovery(&mut self) -> u32 {
        self.counters.engine_recovery_count += 1;
        self.counters.engine_recovery_count
    }

    /// Session end: count a break-off and snapshot windows still open
    pub fn finish(&mut self, ctx: BufferingContext, now: i64) {
        if self.buffering.is_open() {
            self.counters.break_off_count += 1;
            self.buffer_end(false, ctx, now);
        }
        self.ad_buffering.close(now, false);
        self.seek.end(now);
    }

    /// Flat, serializable view for the session report
    pub fn report(&self) -> MetricsReport {
        let buffering = self.buffering.stats();
        let ad_buffering = self.ad_buffering.stats();
        let seeking = self.seek.stats();
        MetricsReport {
            buffering_count: buffering.count,
            network_buffering_count: buffering.network_count,
            unknown_buffering_count: buffering.unknown_count,
            discarded_buffering_count: buffering.discarded_count,
            buffering_duration: buffering.duration_ms,
            original_buffering_duration: buffering.original_duration_ms,
            buffering_events: buffering.events.iter().copied().collect(),
            ad_buffering_count: ad_buffering.count,
            ad_buffering_duration: ad_buffering.duration_ms,
            seek_count: seeking.count,
            seek_duration: seeking.duration_ms,
            original_seek_duration: seeking.original_duration_ms,
            seek_events: seeking.events.iter().copied().collect(),
            timings: self.startup.timings(),
            startup_step: self.startup.latest_step(),
            startup_attempts: self.startup.attempts().len(),
            ad_startup_step: self.startup.last_ad_step(),
            ad_funnels: self.ad_funnels,
            ads_started: self.ads_started,
            network: self.network.features(),
            counters: self.counters,
            content_view_ms: self.content_view_ms,
            first_unknown_buffering_on_device: self.first_unknown_buffering_on_device,
        }
    }
}

/// Serializable snapshot of [`PlaybackMetrics`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub buffering_count: u32,
    pub network_buffering_count: u32,
    pub unknown_buffering_count: u32,
    pub discarded_buffering_count: u32,
    pub buffering_duration: i64,
    pub original_buffering_duration: i64,
    pub buffering_events: Vec<[f64; 2]>,
    pub ad_buffering_count: u32,
    pub ad_buffering_duration: i64,
    pub seek_count: u32,
    pub seek_duration: i64,
    pub original_seek_duration: i64,
    pub seek_events: Vec<SeekEvent>,
    #[serde(flatten)]
    pub timings: StartupTimings,
    pub startup_step: StartupStep,
    pub startup_attempts: usize,
    pub ad_startup_step: StartupStep,
    pub ad_funnels: AdFunnels,
    pub ads_started: u32,
    pub network: NetworkFeatures,
    #[serde(flatten)]
    pub counters: RecoveryCounters,
    pub content_view_ms: i64,
    pub first_unknown_buffering_on_device: bool,
}
