//! Core types for Kino QoS

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Unique identifier for a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Macro lifecycle stage of one content-playback attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    None,
    Idle,
    EmptyPreroll,
    BeforePreroll,
    Preroll,
    AfterPreroll,
    BeforeMidroll,
    Midroll,
    AfterMidroll,
    ContentStartup,
    Ready,
    EarlyStart,
    InStream,
    Fallback,
    Reload,
}

impl Stage {
    /// An ad is being played
    pub fn is_ad(&self) -> bool {
        matches!(self, Stage::Preroll | Stage::Midroll)
    }

    /// An ad break has been announced but no ad is playing yet
    pub fn is_before_ad(&self) -> bool {
        matches!(self, Stage::BeforePreroll | Stage::BeforeMidroll)
    }

    /// Content resumed after an ad break, steady playback not yet confirmed
    pub fn is_after_ad(&self) -> bool {
        matches!(self, Stage::AfterPreroll | Stage::AfterMidroll)
    }

    /// Stages in which the ad track is starting up
    pub fn is_ad_startup(&self) -> bool {
        self.is_ad() || self.is_before_ad()
    }

    /// Stages in which content has not rendered its first frame yet
    pub fn is_content_startup(&self) -> bool {
        matches!(
            self,
            Stage::None
                | Stage::Idle
                | Stage::EmptyPreroll
                | Stage::ContentStartup
                | Stage::Fallback
                | Stage::Reload
        )
    }

    /// Stage matching an ad break of the given kind
    pub fn ad_stage(kind: AdBreakKind) -> Stage {
        match kind {
            AdBreakKind::Preroll => Stage::Preroll,
            AdBreakKind::Midroll => Stage::Midroll,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::None => "NONE",
            Stage::Idle => "IDLE",
            Stage::EmptyPreroll => "EMPTY_PREROLL",
            Stage::BeforePreroll => "BEFORE_PREROLL",
            Stage::Preroll => "PREROLL",
            Stage::AfterPreroll => "AFTER_PREROLL",
            Stage::BeforeMidroll => "BEFORE_MIDROLL",
            Stage::Midroll => "MIDROLL",
            Stage::AfterMidroll => "AFTER_MIDROLL",
            Stage::ContentStartup => "CONTENT_STARTUP",
            Stage::Ready => "READY",
            Stage::EarlyStart => "EARLY_START",
            Stage::InStream => "IN_STREAM",
            Stage::Fallback => "FALLBACK",
            Stage::Reload => "RELOAD",
        };
        f.write_str(name)
    }
}

/// Micro position within a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubStage {
    None,
    StartLoad,
    SetupAdsPlayer,
    ViewedFirstFrame,
    AdPodFetching,
    AdPodFetchSuccess,
    AdPodFetchError,
    AdPodComplete,
}

impl std::fmt::Display for SubStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubStage::None => "NONE",
            SubStage::StartLoad => "START_LOAD",
            SubStage::SetupAdsPlayer => "SETUP_ADS_PLAYER",
            SubStage::ViewedFirstFrame => "VIEWED_FIRST_FRAME",
            SubStage::AdPodFetching => "AD_POD_FETCHING",
            SubStage::AdPodFetchSuccess => "AD_POD_FETCH_SUCCESS",
            SubStage::AdPodFetchError => "AD_POD_FETCH_ERROR",
            SubStage::AdPodComplete => "AD_POD_COMPLETE",
        };
        f.write_str(name)
    }
}

/// Progress of one resume cycle from load-requested to steady playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StartupStep {
    Unknown = 0,
    StartLoad = 1,
    ViewedFirstFrame = 2,
    PlayStarted = 3,
}

impl StartupStep {
    /// The step directly after this one, if any
    pub fn next(&self) -> Option<StartupStep> {
        match self {
            StartupStep::Unknown => Some(StartupStep::StartLoad),
            StartupStep::StartLoad => Some(StartupStep::ViewedFirstFrame),
            StartupStep::ViewedFirstFrame => Some(StartupStep::PlayStarted),
            StartupStep::PlayStarted => None,
        }
    }
}

/// Ad break kind, indexed as in the ad funnel arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdBreakKind {
    Preroll = 0,
    Midroll = 1,
}

impl AdBreakKind {
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Media track an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    #[default]
    Content,
    Ad,
}

/// Why the player reported a stall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferingReason {
    /// The initial load of a source; never a rebuffer
    LoadStart,
    Stalled,
    Waiting,
    Seek,
    Resume,
}

/// Attribution of a stall to its likely origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BufferingType {
    Network,
    #[default]
    Unknown,
}

/// Who paused playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseSource {
    /// Explicit pause through the player UI
    User,
    /// Page or app visibility change
    Visibility,
    /// Paused by the player itself (errors, ad transitions)
    Player,
}

/// HTML media element readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadyState {
    #[default]
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// A buffered time range in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }

    pub fn len(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 0.0
    }
}

/// Seconds buffered ahead of `position` in a sorted range list
pub fn buffered_ahead(ranges: &[TimeRange], position: f64) -> f64 {
    ranges
        .iter()
        .find(|r| r.contains(position))
        .map(|r| r.end - position)
        .unwrap_or(0.0)
}

/// Whether any range holds data
pub fn has_buffered(ranges: &[TimeRange]) -> bool {
    ranges.iter().any(|r| !r.is_empty())
}

/// Thresholds used by the exit attribution rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributionThresholds {
    /// Below this elapsed time a leave counts as quick (ms)
    pub quick_leave_ms: i64,
    /// Above this elapsed time a missing buffer counts as no-buffer (ms)
    pub no_buffer_ms: i64,
    /// Window after reaching IN_STREAM treated as a quick leave (ms)
    pub in_stream_quick_leave_ms: i64,
    /// Position/duration ratio treated as "near the end"
    pub near_end_ratio: f64,
    /// Look-back window for fragment load errors (ms)
    pub cdn_jitter_window_ms: i64,
    /// Fragment load errors inside the window that indicate CDN jitter
    pub cdn_jitter_error_count: usize,
    /// Maximum age of a play/ad interrupt indication (ms)
    pub interrupt_window_ms: i64,
    /// Largest gap between buffered ranges the engine is expected to nudge over (s)
    pub nudge_gap_secs: f64,
}

impl Default for AttributionThresholds {
    fn default() -> Self {
        Self {
            quick_leave_ms: 3_000,
            no_buffer_ms: 10_000,
            in_stream_quick_leave_ms: 60_000,
            near_end_ratio: 0.95,
            cdn_jitter_window_ms: 180_000,
            cdn_jitter_error_count: 3,
            interrupt_window_ms: 120_000,
            nudge_gap_secs: 2.0,
        }
    }
}

/// Platform specific switches for the recovery policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformGates {
    /// The platform reports `InvalidCharacterError` for broken sources
    pub invalid_character_recovery: bool,
    /// Decode errors may be reloaded on this platform
    pub reload_on_decode_error: bool,
    /// Sources rejected as not supported may be reloaded
    pub reload_on_src_not_supported: bool,
}

impl Default for PlatformGates {
    fn default() -> Self {
        Self {
            invalid_character_recovery: false,
            reload_on_decode_error: true,
            reload_on_src_not_supported: true,
        }
    }
}

/// QoS tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QosConfig {
    /// Buffering windows at or below this length are discarded (ms)
    pub min_record_buffering_duration_ms: i64,
    /// Counted window durations are clamped to this value (ms)
    pub max_record_duration_ms: i64,
    /// Maximum recorded buffering / seek events per session
    pub max_recorded_events: usize,
    /// Time in EARLY_START before promotion to IN_STREAM (ms)
    pub in_stream_promotion_ms: i64,
    /// Network feature sampling period (ms)
    pub network_sample_period_ms: u64,
    /// Maximum retained network samples
    pub network_history_len: usize,
    /// Maximum retained error records per track
    pub error_history_len: usize,
    /// Token-expired refetch attempts per session
    pub max_token_expired_retries: u32,
    /// Reload attempts per session
    pub max_reloads: u32,
    /// Fallback resource swaps per session
    pub max_fallbacks: u32,
    /// Buffered seconds ahead below which the buffer counts as depleted
    pub depleted_buffer_secs: f64,
    /// Fall back or reload on a startup stall
    pub startup_stall_recovery: bool,
    /// Surface fatal ad errors as an AD_ERROR modal
    pub surface_fatal_ad_errors: bool,
    /// Platform switches
    pub platform: PlatformGates,
    /// Exit attribution thresholds
    pub attribution: AttributionThresholds,
}

impl Default for QosConfig {
    fn default() -> Self {
        Self {
            min_record_buffering_duration_ms: 200,
            max_record_duration_ms: 60_000,
            max_recorded_events: 50,
            in_stream_promotion_ms: 30_000,
            network_sample_period_ms: 30_000,
            network_history_len: 120,
            error_history_len: 10,
            max_token_expired_retries: 3,
            max_reloads: 3,
            max_fallbacks: 1,
            depleted_buffer_secs: 1.0,
            startup_stall_recovery: true,
            surface_fatal_ad_errors: false,
            platform: PlatformGates::default(),
            attribution: AttributionThresholds::default(),
        }
    }
}

impl QosConfig {
    /// Load configuration overrides from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: QosConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject inconsistent values
    pub fn validate(&self) -> Result<()> {
        if self.min_record_buffering_duration_ms < 0 {
            return Err(Error::InvalidConfig(
                "min_record_buffering_duration_ms must not be negative".into(),
            ));
        }
        if self.max_record_duration_ms <= self.min_record_buffering_duration_ms {
            return Err(Error::InvalidConfig(
                "max_record_duration_ms must exceed min_record_buffering_duration_ms".into(),
            ));
        }
        if self.network_sample_period_ms == 0 {
            return Err(Error::InvalidConfig("network_sample_period_ms must be positive".into()));
        }
        if self.max_recorded_events == 0 || self.network_history_len == 0 {
            return Err(Error::InvalidConfig("history lengths must be positive".into()));
        }
        let t = &self.attribution;
        if t.quick_leave_ms >= t.no_buffer_ms {
            return Err(Error::InvalidConfig("quick_leave_ms must be below no_buffer_ms".into()));
        }
        if !(0.0..=1.0).contains(&t.near_end_ratio) {
            return Err(Error::InvalidConfig("near_end_ratio must be within [0, 1]".into()));
        }
        Ok(())
    }
}
