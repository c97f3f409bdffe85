//! Exit attribution
//!
//! Collects indications during a session and, when the session ends, picks the
//! single most likely reason playback stopped. Rules are an ordered list; the
//! first rule that returns a cause wins, so the same signals always give the
//! same cause.

use crate::classify::ErrorRecord;
use crate::player::PlayerSnapshot;
use crate::types::{
    buffered_ahead, has_buffered, AttributionThresholds, PauseSource, ReadyState, Stage, StartupStep, SubStage,
};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Maximum retained indications
pub const MAX_INDICATIONS: usize = 3;

/// Exit causes and indication kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCauseType {
    // Init crashes
    DrmCrash,
    SetupCrash,
    ManifestError,
    // Ad startup without buffer, by elapsed time
    AdNoBuffer,
    AdBlackScreenNotice,
    AdLoadLong,
    // Ad startup without buffer, by last ad step
    AdSrcUnset,
    AdFreezeAfterSrcSet,
    AdFreezeAfterFirstFrame,
    AdFreezeAfterPlay,
    CdnJitter,
    PlayerStateMismatch,
    PlayInterrupt,
    VideoFreeze,
    VideoFreezeAfterAd,
    BufferNudgeFailed,
    VideoElementFreeze,
    AdStall,
    AdInterrupt,
    // Ad / after-ad matrix
    AdBuffering,
    AdUserPause,
    AdBackgroundPause,
    AdPlayerPause,
    AdFreezeNoData,
    AdLeave,
    AfterAdBuffering,
    AfterAdUserPause,
    AfterAdBackgroundPause,
    AfterAdPlayerPause,
    AfterAdFreezeNoData,
    AfterAdLeave,
    FeedbackSubmitted,
    // No buffer during content startup
    QuickLeave,
    LongLoad,
    NoBuffer,
    AutostartQuickLeave,
    AutostartNoBuffer,
    // Buffered out while streaming
    NearEnd,
    BufferCleared,
    StreamComplete,
    PlayerError,
    QuickLeaveInStream,
    Unknown,
}

impl ExitCauseType {
    /// Indications that explain a crash during initialization
    pub fn is_init_crash(&self) -> bool {
        matches!(
            self,
            ExitCauseType::DrmCrash | ExitCauseType::SetupCrash | ExitCauseType::ManifestError
        )
    }
}

/// Timestamped hint collected during the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indication {
    pub cause_type: ExitCauseType,
    pub error: Option<ErrorRecord>,
    pub message: Option<String>,
    pub timestamp: i64,
}

/// Final diagnosis of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitCause {
    pub cause_type: ExitCauseType,
    pub sub_cause: Option<ExitCauseType>,
    pub error: Option<ErrorRecord>,
    pub message: Option<String>,
}

impl ExitCause {
    pub fn new(cause_type: ExitCauseType) -> Self {
        Self {
            cause_type,
            sub_cause: None,
            error: None,
            message: None,
        }
    }

    pub fn with_sub_cause(mut self, sub_cause: ExitCauseType) -> Self {
        self.sub_cause = Some(sub_cause);
        self
    }

    fn from_indication(indication: &Indication) -> Self {
        Self {
            cause_type: indication.cause_type,
            sub_cause: None,
            error: indication.error.clone(),
            message: indication.message.clone(),
        }
    }
}

/// Session and player state at the time of conclusion
#[derive(Debug, Clone)]
pub struct AttributionInput {
    pub now: i64,
    pub session_start_ts: i64,
    pub stage: Stage,
    pub sub_stage: SubStage,
    /// When the current stage was entered
    pub stage_entered_at: Option<i64>,
    pub in_stream_entered_at: Option<i64>,
    /// The session believes playback is running
    pub state_playing: bool,
    pub pause_source: Option<PauseSource>,
    pub autostart: bool,
    pub feedback_submitted: bool,
    pub last_ad_step: StartupStep,
    pub last_ad_start_load_ts: Option<i64>,
    /// Fragment load errors inside the CDN jitter window
    pub recent_frag_errors: usize,
    pub player: PlayerSnapshot,
}

/// Everything a rule may look at
struct Signals<'a> {
    input: &'a AttributionInput,
    indications: &'a VecDeque<Indication>,
    hint: Option<&'a ExitCause>,
    thresholds: &'a AttributionThresholds,
}

impl Signals<'_> {
    fn latest(&self, predicate: impl Fn(&Indication) -> bool) -> Option<&Indication> {
        self.indications.iter().rev().find(|i| predicate(i))
    }

    fn recent(&self, cause_type: ExitCauseType) -> Option<&Indication> {
        self.latest(|i| {
            i.cause_type == cause_type && self.input.now - i.timestamp < self.thresholds.interrupt_window_ms
        })
    }
}

type RuleFn = fn(&Signals<'_>) -> Option<ExitCause>;

struct AttributionRule {
    name: &'static str,
    apply: RuleFn,
}

const RULES: &[AttributionRule] = &[
    AttributionRule { name: "init_crash", apply: init_crash },
    AttributionRule { name: "ad_no_buffer", apply: ad_no_buffer },
    AttributionRule { name: "cdn_jitter", apply: cdn_jitter },
    AttributionRule { name: "player_state_mismatch", apply: player_state_mismatch },
    AttributionRule { name: "play_interrupt", apply: play_interrupt },
    AttributionRule { name: "track_freeze", apply: track_freeze },
    AttributionRule { name: "element_freeze", apply: element_freeze },
    AttributionRule { name: "ad_block", apply: ad_block },
    AttributionRule { name: "feedback", apply: feedback },
    AttributionRule { name: "startup_no_buffer", apply: startup_no_buffer },
    AttributionRule { name: "buffered_out", apply: buffered_out },
    AttributionRule { name: "stream_complete", apply: stream_complete },
    AttributionRule { name: "cause_hint", apply: cause_hint },
    AttributionRule { name: "quick_leave_in_stream", apply: quick_leave_in_stream },
];

fn init_crash(s: &Signals<'_>) -> Option<ExitCause> {
    if !s.input.stage.is_content_startup() {
        return None;
    }
    s.latest(|i| i.cause_type.is_init_crash()).map(ExitCause::from_indication)
}

fn ad_no_buffer(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let player = &input.player;
    if has_buffered(&player.buffered)
        || has_buffered(&player.video)
        || has_buffered(&player.audio)
        || !input.stage.is_ad_startup()
    {
        return None;
    }
    let start = input
        .last_ad_start_load_ts
        .or(input.stage_entered_at)
        .unwrap_or(input.session_start_ts);
    let elapsed = input.now - start;
    let time_class = if elapsed > s.thresholds.no_buffer_ms {
        ExitCauseType::AdNoBuffer
    } else if elapsed < s.thresholds.quick_leave_ms {
        ExitCauseType::AdBlackScreenNotice
    } else {
        ExitCauseType::AdLoadLong
    };
    let cause = match input.last_ad_step {
        StartupStep::Unknown => ExitCauseType::AdSrcUnset,
        StartupStep::StartLoad => ExitCauseType::AdFreezeAfterSrcSet,
        StartupStep::ViewedFirstFrame => ExitCauseType::AdFreezeAfterFirstFrame,
        StartupStep::PlayStarted => ExitCauseType::AdFreezeAfterPlay,
    };
    Some(ExitCause::new(cause).with_sub_cause(time_class))
}

fn cdn_jitter(s: &Signals<'_>) -> Option<ExitCause> {
    (s.input.player.buffering && s.input.recent_frag_errors >= s.thresholds.cdn_jitter_error_count)
        .then(|| ExitCause::new(ExitCauseType::CdnJitter))
}

fn player_state_mismatch(s: &Signals<'_>) -> Option<ExitCause> {
    s.latest(|i| i.cause_type == ExitCauseType::PlayerStateMismatch)
        .map(ExitCause::from_indication)
}

fn play_interrupt(s: &Signals<'_>) -> Option<ExitCause> {
    if s.input.stage != Stage::Ready {
        return None;
    }
    s.recent(ExitCauseType::PlayInterrupt).map(ExitCause::from_indication)
}

fn track_freeze(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let player = &input.player;
    if input.stage.is_ad_startup() || (player.video.is_empty() && player.audio.is_empty()) {
        return None;
    }
    let video = player.video.iter().any(|r| r.contains(player.position));
    let audio = player.audio.iter().any(|r| r.contains(player.position));
    if video == audio {
        return None;
    }
    let cause = if input.stage.is_after_ad() {
        ExitCauseType::VideoFreezeAfterAd
    } else {
        ExitCauseType::VideoFreeze
    };
    Some(ExitCause::new(cause))
}

fn element_freeze(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let player = &input.player;
    if input.stage.is_ad_startup() || !has_buffered(&player.buffered) {
        return None;
    }
    let at_playhead = player.buffered.iter().any(|r| r.contains(player.position));
    if !at_playhead {
        let gap = player
            .buffered
            .iter()
            .map(|r| r.start - player.position)
            .filter(|gap| *gap > 0.0)
            .fold(f64::INFINITY, f64::min);
        if gap <= s.thresholds.nudge_gap_secs {
            return Some(ExitCause::new(ExitCauseType::BufferNudgeFailed));
        }
        return None;
    }
    let has_data = player.ready_state >= ReadyState::HaveFutureData;
    let element_starved = player.ready_state < ReadyState::HaveCurrentData
        && !player.buffering
        && !player.paused
        && buffered_ahead(&player.buffered, player.position) > 0.0;
    ((player.buffering && has_data) || element_starved).then(|| ExitCause::new(ExitCauseType::VideoElementFreeze))
}

fn ad_block(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let in_ad = input.stage.is_ad();
    if !in_ad && !input.stage.is_after_ad() {
        return None;
    }
    if in_ad {
        if let Some(stall) = s.latest(|i| i.cause_type == ExitCauseType::AdStall) {
            return Some(ExitCause::from_indication(stall));
        }
        if let Some(interrupt) = s.recent(ExitCauseType::AdInterrupt) {
            return Some(ExitCause::from_indication(interrupt));
        }
    }

    use ExitCauseType::*;
    let player = &input.player;
    let (buffering, user, background, by_player, no_data, leave) = if in_ad {
        (AdBuffering, AdUserPause, AdBackgroundPause, AdPlayerPause, AdFreezeNoData, AdLeave)
    } else {
        (
            AfterAdBuffering,
            AfterAdUserPause,
            AfterAdBackgroundPause,
            AfterAdPlayerPause,
            AfterAdFreezeNoData,
            AfterAdLeave,
        )
    };
    let cause = if player.buffering {
        buffering
    } else if player.paused {
        match input.pause_source {
            Some(PauseSource::User) => user,
            Some(PauseSource::Visibility) => background,
            Some(PauseSource::Player) | Option::None => by_player,
        }
    } else if player.ready_state < ReadyState::HaveFutureData {
        no_data
    } else {
        leave
    };
    Some(ExitCause::new(cause))
}

fn feedback(s: &Signals<'_>) -> Option<ExitCause> {
    s.input
        .feedback_submitted
        .then(|| ExitCause::new(ExitCauseType::FeedbackSubmitted))
}

fn startup_no_buffer(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    if !input.stage.is_content_startup() || has_buffered(&input.player.buffered) {
        return None;
    }
    let start = match input.stage {
        Stage::Fallback | Stage::Reload => input.stage_entered_at.unwrap_or(input.session_start_ts),
        _ => input.session_start_ts,
    };
    let elapsed = input.now - start;
    let t = s.thresholds;
    let cause = match (input.autostart, elapsed) {
        (true, e) if e < t.quick_leave_ms => ExitCauseType::AutostartQuickLeave,
        (true, e) if e > t.no_buffer_ms => ExitCauseType::AutostartNoBuffer,
        (false, e) if e < t.quick_leave_ms => ExitCauseType::QuickLeave,
        (_, e) if e <= t.no_buffer_ms => ExitCauseType::LongLoad,
        _ => ExitCauseType::NoBuffer,
    };
    Some(ExitCause::new(cause))
}

fn buffered_out(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let player = &input.player;
    let streaming = matches!(input.stage, Stage::Ready | Stage::EarlyStart | Stage::InStream);
    if !streaming || player.completed || buffered_ahead(&player.buffered, player.position) > 0.0 {
        return None;
    }
    let near_end = player
        .duration
        .filter(|d| *d > 0.0)
        .is_some_and(|d| player.position / d >= s.thresholds.near_end_ratio);
    let cause = if near_end {
        ExitCauseType::NearEnd
    } else {
        ExitCauseType::BufferCleared
    };
    Some(ExitCause::new(cause))
}

fn stream_complete(s: &Signals<'_>) -> Option<ExitCause> {
    s.input
        .player
        .completed
        .then(|| ExitCause::new(ExitCauseType::StreamComplete))
}

fn cause_hint(s: &Signals<'_>) -> Option<ExitCause> {
    s.hint.cloned()
}

fn quick_leave_in_stream(s: &Signals<'_>) -> Option<ExitCause> {
    let input = s.input;
    let entered = input.in_stream_entered_at?;
    (input.stage == Stage::InStream && input.now - entered < s.thresholds.in_stream_quick_leave_ms)
        .then(|| ExitCause::new(ExitCauseType::QuickLeaveInStream))
}

/// Indication ring plus the write-once exit cause
#[derive(Debug, Clone)]
pub struct ExitAttributionEngine {
    thresholds: AttributionThresholds,
    indications: VecDeque<Indication>,
    hint: Option<ExitCause>,
    cause: Option<ExitCause>,
}

impl ExitAttributionEngine {
    pub fn new(thresholds: AttributionThresholds) -> Self {
        Self {
            thresholds,
            indications: VecDeque::with_capacity(MAX_INDICATIONS),
            hint: None,
            cause: None,
        }
    }

    /// Append an indication, evicting the oldest beyond the cap
    pub fn add_indication(
        &mut self,
        cause_type: ExitCauseType,
        error: Option<ErrorRecord>,
        message: Option<String>,
        now: i64,
    ) {
        if self.indications.len() >= MAX_INDICATIONS {
            self.indications.pop_front();
        }
        debug!(cause = ?cause_type, "Indication added");
        self.indications.push_back(Indication {
            cause_type,
            error,
            message,
            timestamp: now,
        });
    }

    pub fn indications(&self) -> impl Iterator<Item = &Indication> {
        self.indications.iter()
    }

    /// Cause used late in the chain when nothing more specific matched.
    /// The first hint sticks.
    pub fn set_hint(&mut self, hint: ExitCause) {
        if self.hint.is_none() {
            self.hint = Some(hint);
        }
    }

    pub fn cause(&self) -> Option<&ExitCause> {
        self.cause.as_ref()
    }

    /// Run the rule chain once; later calls return the stored cause
    pub fn conclude(&mut self, input: &AttributionInput) -> &ExitCause {
        if self.cause.is_none() {
            if input.state_playing && input.player.paused {
                self.add_indication(ExitCauseType::PlayerStateMismatch, None, None, input.now);
            }
            let signals = Signals {
                input,
                indications: &self.indications,
                hint: self.hint.as_ref(),
                thresholds: &self.thresholds,
            };
            let (rule, cause) = RULES
                .iter()
                .find_map(|rule| (rule.apply)(&signals).map(|cause| (rule.name, cause)))
                .unwrap_or(("unknown", ExitCause::new(ExitCauseType::Unknown)));
            info!(rule, cause = ?cause.cause_type, sub_cause = ?cause.sub_cause, stage = %input.stage, "Exit cause concluded");
            self.cause = Some(cause);
        }
        self.cause.get_or_insert_with(|| ExitCause::new(ExitCauseType::Unknown))
    }

    /// Names of the rules in evaluation order
    pub fn rule_names() -> impl Iterator<Item = &'static str> {
        RULES.iter().map(|r| r.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeRange;

    fn engine() -> ExitAttributionEngine {
        ExitAttributionEngine::new(AttributionThresholds::default())
    }

    fn input(stage: Stage, now: i64) -> AttributionInput {
        AttributionInput {
            now,
            session_start_ts: 0,
            stage,
            sub_stage: SubStage::None,
            stage_entered_at: Some(0),
            in_stream_entered_at: None,
            state_playing: false,
            pause_source: None,
            autostart: false,
            feedback_submitted: false,
            last_ad_step: StartupStep::Unknown,
            last_ad_start_load_ts: None,
            recent_frag_errors: 0,
            player: PlayerSnapshot::default(),
        }
    }

    fn buffered(input: &mut AttributionInput, start: f64, end: f64) {
        input.player.buffered = vec![TimeRange::new(start, end)];
        input.player.ready_state = ReadyState::HaveEnoughData;
    }

    #[test]
    fn test_indication_ring_evicts_oldest() {
        let mut e = engine();
        for (i, cause) in [
            ExitCauseType::DrmCrash,
            ExitCauseType::SetupCrash,
            ExitCauseType::ManifestError,
            ExitCauseType::PlayInterrupt,
        ]
        .into_iter()
        .enumerate()
        {
            e.add_indication(cause, None, None, i as i64);
        }
        let kept: Vec<_> = e.indications().map(|i| i.cause_type).collect();
        assert_eq!(
            kept,
            vec![
                ExitCauseType::SetupCrash,
                ExitCauseType::ManifestError,
                ExitCauseType::PlayInterrupt
            ]
        );
    }

    #[test]
    fn test_before_preroll_without_buffer() {
        let mut e = engine();
        let cause = e.conclude(&input(Stage::BeforePreroll, 12_000)).clone();
        assert_eq!(cause.cause_type, ExitCauseType::AdSrcUnset);
        assert_eq!(cause.sub_cause, Some(ExitCauseType::AdNoBuffer));
    }

    #[test]
    fn test_audio_buffer_alone_is_not_ad_no_buffer() {
        let mut i = input(Stage::BeforePreroll, 12_000);
        i.player.audio = vec![TimeRange::new(0.0, 4.0)];
        let cause = engine().conclude(&i).clone();
        assert_ne!(cause.cause_type, ExitCauseType::AdSrcUnset);
        assert_ne!(cause.sub_cause, Some(ExitCauseType::AdNoBuffer));
    }

    #[test]
    fn test_ad_time_classes_and_steps() {
        let mut i = input(Stage::Preroll, 2_000);
        i.last_ad_step = StartupStep::ViewedFirstFrame;
        let cause = engine().conclude(&i).clone();
        assert_eq!(cause.cause_type, ExitCauseType::AdFreezeAfterFirstFrame);
        assert_eq!(cause.sub_cause, Some(ExitCauseType::AdBlackScreenNotice));

        i.now = 5_000;
        i.last_ad_step = StartupStep::StartLoad;
        let cause = engine().conclude(&i).clone();
        assert_eq!(cause.cause_type, ExitCauseType::AdFreezeAfterSrcSet);
        assert_eq!(cause.sub_cause, Some(ExitCauseType::AdLoadLong));
    }

    #[test]
    fn test_conclude_is_write_once() {
        let mut e = engine();
        let first = e.conclude(&input(Stage::BeforePreroll, 12_000)).clone();
        let mut other = input(Stage::InStream, 100_000);
        other.feedback_submitted = true;
        assert_eq!(e.conclude(&other), &first);
    }

    #[test]
    fn test_init_crash_during_startup() {
        let mut e = engine();
        e.add_indication(ExitCauseType::DrmCrash, None, Some("license".into()), 10);
        let cause = e.conclude(&input(Stage::ContentStartup, 1_000)).clone();
        assert_eq!(cause.cause_type, ExitCauseType::DrmCrash);
        assert_eq!(cause.message.as_deref(), Some("license"));
    }

    #[test]
    fn test_init_crash_ignored_in_stream() {
        let mut e = engine();
        e.add_indication(ExitCauseType::ManifestError, None, None, 10);
        let mut i = input(Stage::InStream, 200_000);
        buffered(&mut i, 0.0, 100.0);
        i.player.position = 10.0;
        assert_eq!(e.conclude(&i).cause_type, ExitCauseType::Unknown);
    }

    #[test]
    fn test_cdn_jitter_requires_buffering() {
        let mut i = input(Stage::InStream, 200_000);
        buffered(&mut i, 0.0, 100.0);
        i.recent_frag_errors = 3;
        assert_ne!(engine().conclude(&i).cause_type, ExitCauseType::CdnJitter);
        i.player.buffering = true;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::CdnJitter);
    }

    #[test]
    fn test_state_mismatch_pre_check() {
        let mut e = engine();
        let mut i = input(Stage::InStream, 200_000);
        buffered(&mut i, 0.0, 100.0);
        i.state_playing = true;
        i.player.paused = true;
        assert_eq!(e.conclude(&i).cause_type, ExitCauseType::PlayerStateMismatch);
        assert_eq!(e.indications().count(), 1);
    }

    #[test]
    fn test_play_interrupt_only_recent_and_ready() {
        let mut e = engine();
        e.add_indication(ExitCauseType::PlayInterrupt, None, None, 1_000);
        let mut i = input(Stage::Ready, 60_000);
        buffered(&mut i, 0.0, 30.0);
        assert_eq!(e.conclude(&i).cause_type, ExitCauseType::PlayInterrupt);

        let mut e = engine();
        e.add_indication(ExitCauseType::PlayInterrupt, None, None, 1_000);
        i.now = 200_000;
        assert_ne!(e.conclude(&i).cause_type, ExitCauseType::PlayInterrupt);
    }

    #[test]
    fn test_video_freeze_after_ad() {
        let mut i = input(Stage::AfterMidroll, 50_000);
        buffered(&mut i, 0.0, 40.0);
        i.player.position = 20.0;
        i.player.video = vec![TimeRange::new(0.0, 40.0)];
        i.player.audio = vec![TimeRange::new(0.0, 10.0)];
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::VideoFreezeAfterAd);
    }

    #[test]
    fn test_buffer_nudge_failed() {
        let mut i = input(Stage::InStream, 200_000);
        i.player.buffered = vec![TimeRange::new(0.0, 10.0), TimeRange::new(11.0, 40.0)];
        i.player.position = 10.2;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::BufferNudgeFailed);
    }

    #[test]
    fn test_element_freeze() {
        let mut i = input(Stage::InStream, 200_000);
        buffered(&mut i, 0.0, 40.0);
        i.player.position = 5.0;
        i.player.buffering = true;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::VideoElementFreeze);
    }

    #[test]
    fn test_ad_matrix() {
        let mut i = input(Stage::Midroll, 50_000);
        buffered(&mut i, 0.0, 15.0);
        i.player.paused = true;
        i.pause_source = Some(PauseSource::Visibility);
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::AdBackgroundPause);

        let mut i = input(Stage::AfterPreroll, 50_000);
        buffered(&mut i, 0.0, 15.0);
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::AfterAdLeave);
        i.player.ready_state = ReadyState::HaveCurrentData;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::AfterAdFreezeNoData);
    }

    #[test]
    fn test_ad_stall_wins_in_ad() {
        let mut e = engine();
        e.add_indication(ExitCauseType::AdStall, None, None, 100);
        let mut i = input(Stage::Preroll, 50_000);
        buffered(&mut i, 0.0, 15.0);
        i.player.buffering = true;
        assert_eq!(e.conclude(&i).cause_type, ExitCauseType::AdStall);
    }

    #[test]
    fn test_startup_no_buffer_heuristics() {
        let cases = [
            (false, 2_000, ExitCauseType::QuickLeave),
            (false, 5_000, ExitCauseType::LongLoad),
            (false, 15_000, ExitCauseType::NoBuffer),
            (true, 2_000, ExitCauseType::AutostartQuickLeave),
            (true, 5_000, ExitCauseType::LongLoad),
            (true, 15_000, ExitCauseType::AutostartNoBuffer),
        ];
        for (autostart, now, expected) in cases {
            let mut i = input(Stage::ContentStartup, now);
            i.autostart = autostart;
            assert_eq!(engine().conclude(&i).cause_type, expected, "autostart={autostart} now={now}");
        }
    }

    #[test]
    fn test_feedback_before_heuristics() {
        let mut i = input(Stage::ContentStartup, 2_000);
        i.feedback_submitted = true;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::FeedbackSubmitted);
    }

    #[test]
    fn test_near_end_versus_buffer_cleared() {
        let mut i = input(Stage::InStream, 500_000);
        i.player.buffered = vec![TimeRange::new(0.0, 50.0)];
        i.player.duration = Some(100.0);
        i.player.position = 96.0;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::NearEnd);
        i.player.position = 60.0;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::BufferCleared);
    }

    #[test]
    fn test_complete_hint_and_quick_leave() {
        let mut i = input(Stage::InStream, 500_000);
        buffered(&mut i, 0.0, 100.0);
        i.player.position = 10.0;
        i.player.completed = true;
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::StreamComplete);

        i.player.completed = false;
        let mut e = engine();
        e.set_hint(ExitCause::new(ExitCauseType::PlayerError));
        e.set_hint(ExitCause::new(ExitCauseType::Unknown));
        assert_eq!(e.conclude(&i).cause_type, ExitCauseType::PlayerError);

        i.in_stream_entered_at = Some(470_000);
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::QuickLeaveInStream);
        i.in_stream_entered_at = Some(400_000);
        assert_eq!(engine().conclude(&i).cause_type, ExitCauseType::Unknown);
    }
}
