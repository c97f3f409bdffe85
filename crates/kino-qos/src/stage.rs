//! Session stage machine
//!
//! Tracks the macro lifecycle [`Stage`] of one playback attempt and its
//! [`SubStage`]. Transitions are table driven; combinations the table does not
//! list are ignored because the player may re-emit events at any time.

use crate::events::{Emitter, Subscription};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Stage change notification
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub stage: Stage,
    pub previous: Stage,
    pub timestamp: i64,
}

/// Events driving the stage machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageEvent {
    EnterPage,
    CuePointFilled { is_preroll: bool },
    AdPodFetch { kind: AdBreakKind },
    AdPodFetchSuccess,
    AdPodFetchError,
    AdPodEmpty,
    AdPlayerSetup,
    AdStartLoad,
    AdFirstFrameViewed,
    AdCurrentTimeProgressed,
    AdPodComplete,
    ContentStartLoad { is_resume_from_ad: bool },
    ContentFirstFrameViewed,
    ContentCurrentTimeProgressed,
    Fallback,
    ReloadSrc,
}

/// Outcome of a table lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Transition {
    stage: Stage,
    /// `None` leaves the sub-stage as the stage write left it
    sub_stage: Option<SubStage>,
    /// Record the early-start timestamp
    mark_early_start: bool,
}

impl Transition {
    fn to(stage: Stage) -> Self {
        Self {
            stage,
            sub_stage: None,
            mark_early_start: false,
        }
    }

    fn with_sub(mut self, sub_stage: SubStage) -> Self {
        self.sub_stage = Some(sub_stage);
        self
    }

    fn early_start(mut self) -> Self {
        self.mark_early_start = true;
        self
    }
}

/// `(current stage, event) -> next` table
fn transition(current: Stage, event: StageEvent) -> Option<Transition> {
    use Stage::*;
    use StageEvent as E;

    match (current, event) {
        (_, E::EnterPage) => Some(Transition::to(Idle)),

        (None | Idle, E::CuePointFilled { is_preroll: true }) => Some(Transition::to(BeforePreroll)),
        (Ready | EarlyStart | InStream | AfterPreroll | AfterMidroll, E::CuePointFilled { is_preroll: false }) => {
            Some(Transition::to(BeforeMidroll))
        }

        (None | Idle, E::AdPodFetch { kind: AdBreakKind::Preroll }) => {
            Some(Transition::to(BeforePreroll).with_sub(SubStage::AdPodFetching))
        }
        (s, E::AdPodFetch { .. }) if s.is_ad_startup() => Some(Transition::to(s).with_sub(SubStage::AdPodFetching)),
        (s, E::AdPodFetchSuccess) if s.is_ad_startup() => {
            Some(Transition::to(s).with_sub(SubStage::AdPodFetchSuccess))
        }
        (s, E::AdPodFetchError) if s.is_ad_startup() => Some(Transition::to(s).with_sub(SubStage::AdPodFetchError)),
        (BeforePreroll, E::AdPodEmpty) => Some(Transition::to(EmptyPreroll)),
        (BeforeMidroll, E::AdPodEmpty) => Some(Transition::to(InStream)),

        (s, E::AdPlayerSetup) if s.is_ad_startup() => Some(Transition::to(s).with_sub(SubStage::SetupAdsPlayer)),
        (BeforePreroll | EmptyPreroll | Preroll, E::AdStartLoad) => {
            Some(Transition::to(Preroll).with_sub(SubStage::StartLoad))
        }
        (BeforeMidroll | Midroll, E::AdStartLoad) => Some(Transition::to(Midroll).with_sub(SubStage::StartLoad)),
        (Preroll | Midroll, E::AdFirstFrameViewed) => {
            Some(Transition::to(current).with_sub(SubStage::ViewedFirstFrame))
        }
        (BeforePreroll, E::AdCurrentTimeProgressed) => {
            Some(Transition::to(Preroll).with_sub(SubStage::ViewedFirstFrame))
        }
        (BeforeMidroll, E::AdCurrentTimeProgressed) => {
            Some(Transition::to(Midroll).with_sub(SubStage::ViewedFirstFrame))
        }
        (Preroll, E::AdPodComplete) => Some(Transition::to(AfterPreroll).with_sub(SubStage::AdPodComplete)),
        (Midroll, E::AdPodComplete) => Some(Transition::to(AfterMidroll).with_sub(SubStage::AdPodComplete)),

        (None | Idle | EmptyPreroll | BeforePreroll, E::ContentStartLoad { .. }) => {
            Some(Transition::to(ContentStartup).with_sub(SubStage::StartLoad))
        }
        (AfterPreroll | AfterMidroll | Fallback | Reload, E::ContentStartLoad { .. }) => {
            Some(Transition::to(current).with_sub(SubStage::StartLoad))
        }
        (s, E::ContentFirstFrameViewed) if s.is_after_ad() => {
            Some(Transition::to(s).with_sub(SubStage::ViewedFirstFrame))
        }
        (s, E::ContentFirstFrameViewed) if !s.is_ad() && !matches!(s, EarlyStart | InStream | BeforeMidroll) => {
            Some(Transition::to(Ready).with_sub(SubStage::ViewedFirstFrame))
        }
        (Ready, E::ContentCurrentTimeProgressed) => Some(Transition::to(EarlyStart).early_start()),
        (s, E::ContentCurrentTimeProgressed) if s.is_after_ad() => {
            Some(Transition::to(s).with_sub(SubStage::None).early_start())
        }

        (s, E::Fallback) if !s.is_ad() => Some(Transition::to(Fallback)),
        (s, E::ReloadSrc) if !s.is_ad() => Some(Transition::to(Reload)),

        _ => Option::None,
    }
}

/// Macro lifecycle state machine for one playback attempt
#[derive(Debug, Clone)]
pub struct SessionStageMachine {
    stage: Stage,
    sub_stage: SubStage,
    early_start_ts: Option<i64>,
    entered_at: HashMap<Stage, i64>,
    in_stream_promotion_ms: i64,
}

impl SessionStageMachine {
    pub fn new(in_stream_promotion_ms: i64) -> Self {
        Self {
            stage: Stage::None,
            sub_stage: SubStage::None,
            early_start_ts: None,
            entered_at: HashMap::new(),
            in_stream_promotion_ms,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn sub_stage(&self) -> SubStage {
        self.sub_stage
    }

    pub fn early_start_ts(&self) -> Option<i64> {
        self.early_start_ts
    }

    /// Timestamp at which `stage` was last entered
    pub fn entered_at(&self, stage: Stage) -> Option<i64> {
        self.entered_at.get(&stage).copied()
    }

    /// Apply an event; returns the stage change if the stage moved
    pub fn apply(&mut self, event: StageEvent, now: i64) -> Option<StageChange> {
        let Some(next) = transition(self.stage, event) else {
            debug!(stage = %self.stage, event = ?event, "Ignoring stage event");
            return None;
        };

        let change = self.set_stage(next.stage, now);
        if let Some(sub_stage) = next.sub_stage {
            self.sub_stage = sub_stage;
        }
        if next.mark_early_start {
            self.early_start_ts = Some(now);
        }
        change
    }

    /// Time based promotion; the only non event-driven transition
    pub fn timeupdate(&mut self, now: i64) -> Option<StageChange> {
        match self.stage {
            Stage::Fallback | Stage::Reload => {
                let change = self.set_stage(Stage::EarlyStart, now);
                self.early_start_ts = Some(now);
                change
            }
            s if s == Stage::EarlyStart || (s.is_after_ad() && self.sub_stage == SubStage::None) => {
                match self.early_start_ts {
                    Some(ts) if now - ts > self.in_stream_promotion_ms => self.set_stage(Stage::InStream, now),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    /// Write the stage; writing the current value is a no-op
    fn set_stage(&mut self, stage: Stage, now: i64) -> Option<StageChange> {
        if stage == self.stage {
            return None;
        }
        let previous = self.stage;
        self.stage = stage;
        self.sub_stage = SubStage::None;
        self.entered_at.insert(stage, now);
        debug!(from = %previous, to = %stage, "Stage change");
        Some(StageChange {
            stage,
            previous,
            timestamp: now,
        })
    }
}

/// Stage change fan-out for downstream observers
#[derive(Default)]
pub struct StageObservers {
    emitter: Emitter<StageChange>,
}

impl StageObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: impl FnMut(&StageChange) + Send + 'static) -> Subscription {
        self.emitter.on(listener)
    }

    pub fn notify(&self, change: Option<StageChange>) {
        if let Some(change) = change {
            self.emitter.emit(&change);
        }
    }
}
