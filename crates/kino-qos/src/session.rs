//! Session manager - main orchestrator for QoS tracking
//!
//! Coordinates:
//! - Session lifecycle (start, end, reset, display-mode restore)
//! - Stage machine updates from player events
//! - Metrics accumulation keyed by the current stage
//! - Error classification and recovery
//! - Exit attribution and telemetry flush

use crate::{
    analytics::{ErrorReport, SessionReport, TelemetryEmitter, TelemetryRecord, TelemetrySink},
    attribution::{AttributionInput, ExitAttributionEngine, ExitCause, ExitCauseType},
    classify::{ErrorClassifier, ErrorRecord, ErrorType, RawError},
    clock::Clock,
    events::{PlayerEvent, PlayerFeed, Subscription},
    metrics::{BufferingContext, FetchOutcome, NetworkSample, PlaybackMetrics},
    player::{ModalPayload, ModalPresenter, ModalType, PlaybackController, PlayerIntrospection, PlayerSnapshot},
    recovery::{Decision, RecoveryAction, RecoveryContext, RecoveryPolicy},
    stage::{SessionStageMachine, StageChange, StageEvent, StageObservers},
    store::{self, BufferingProfile, KeyValueStore},
    types::*,
    Error, Result,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// How the player is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Inline,
    Fullscreen,
    Embedded,
    PictureInPicture,
}

/// Parameters of a playback attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StartOptions {
    pub content_id: String,
    pub display_mode: DisplayMode,
    pub autostart: bool,
    pub is_drm_resource: bool,
}

/// Result of [`SessionManager::start_playback`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SessionId),
    /// Same content in another display mode; the previous session continues
    Restored(SessionId),
}

impl StartOutcome {
    pub fn session_id(&self) -> SessionId {
        match self {
            StartOutcome::Started(id) | StartOutcome::Restored(id) => *id,
        }
    }
}

/// Per-session flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags {
    pub is_retrying: bool,
    pub backgrounded: bool,
    pub discarded: bool,
    pub autostart: bool,
    pub is_drm_resource: bool,
    /// Playback believed to be running
    pub playing: bool,
    pub pause_source: Option<PauseSource>,
    pub feedback_submitted: bool,
    pub completed: bool,
}

#[derive(Debug, Clone)]
struct PendingModal {
    modal: ModalType,
    error: ErrorRecord,
}

/// One playback attempt
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    id: SessionId,
    content_id: String,
    display_mode: DisplayMode,
    stage: SessionStageMachine,
    metrics: PlaybackMetrics,
    attribution: ExitAttributionEngine,
    flags: SessionFlags,
    pending_modal: Option<PendingModal>,
    ended: bool,
    /// Attribution state as it was before the exit cause was concluded
    attribution_before_end: Option<ExitAttributionEngine>,
}

impl PlaybackSession {
    fn new(options: &StartOptions, config: &QosConfig, now: i64) -> Self {
        Self {
            id: SessionId::new(),
            content_id: options.content_id.clone(),
            display_mode: options.display_mode,
            stage: SessionStageMachine::new(config.in_stream_promotion_ms),
            metrics: PlaybackMetrics::initial(config, now),
            attribution: ExitAttributionEngine::new(config.attribution.clone()),
            flags: SessionFlags {
                autostart: options.autostart,
                is_drm_resource: options.is_drm_resource,
                ..Default::default()
            },
            pending_modal: None,
            ended: false,
            attribution_before_end: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn stage(&self) -> Stage {
        self.stage.stage()
    }

    pub fn sub_stage(&self) -> SubStage {
        self.stage.sub_stage()
    }

    pub fn stage_machine(&self) -> &SessionStageMachine {
        &self.stage
    }

    pub fn metrics(&self) -> &PlaybackMetrics {
        &self.metrics
    }

    pub fn attribution(&self) -> &ExitAttributionEngine {
        &self.attribution
    }

    pub fn exit_cause(&self) -> Option<&ExitCause> {
        self.attribution.cause()
    }

    pub fn flags(&self) -> SessionFlags {
        self.flags
    }

    pub fn has_pending_modal(&self) -> bool {
        self.pending_modal.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn in_ad(&self) -> bool {
        self.stage.stage().is_ad()
    }

    fn buffering_context(&self, player_in_ad: bool) -> BufferingContext {
        BufferingContext {
            is_retrying: self.flags.is_retrying,
            in_ad: self.in_ad() || player_in_ad,
            backgrounded: self.flags.backgrounded,
        }
    }
}

/// External collaborators of a [`SessionManager`]
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub player: Arc<dyn PlayerIntrospection>,
    pub controller: Box<dyn PlaybackController>,
    pub modals: Box<dyn ModalPresenter>,
    pub store: Box<dyn KeyValueStore>,
    pub sink: Box<dyn TelemetrySink>,
}

/// Manager shared between the player feed and the network sampler
pub type SharedSessionManager = Arc<Mutex<SessionManager>>;

/// Owns the current playback session and drives all components
pub struct SessionManager {
    config: QosConfig,
    clock: Arc<dyn Clock>,
    player: Arc<dyn PlayerIntrospection>,
    controller: Box<dyn PlaybackController>,
    modals: Box<dyn ModalPresenter>,
    store: Box<dyn KeyValueStore>,
    telemetry: TelemetryEmitter,
    classifier: ErrorClassifier,
    policy: RecoveryPolicy,
    observers: StageObservers,
    current: Option<PlaybackSession>,
    previous: Option<PlaybackSession>,
    destroyed: bool,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(config: QosConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock: collaborators.clock,
            player: collaborators.player,
            controller: collaborators.controller,
            modals: collaborators.modals,
            store: collaborators.store,
            telemetry: TelemetryEmitter::new(collaborators.sink),
            classifier: ErrorClassifier::new(),
            policy: RecoveryPolicy::new(),
            observers: StageObservers::new(),
            current: None,
            previous: None,
            destroyed: false,
        })
    }

    /// Wrap into a shared handle
    pub fn shared(self) -> SharedSessionManager {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &QosConfig {
        &self.config
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.current.as_ref()
    }

    pub fn previous_session(&self) -> Option<&PlaybackSession> {
        self.previous.as_ref()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Observe stage changes of every session of this manager.
    ///
    /// Listeners run while the manager is borrowed and must not call back into it.
    pub fn subscribe_stage(&self, listener: impl FnMut(&StageChange) + Send + 'static) -> Subscription {
        self.observers.subscribe(listener)
    }

    // ---- lifecycle ----

    /// Begin a playback attempt
    #[instrument(skip(self, options), fields(content_id = %options.content_id))]
    pub fn start_playback(&mut self, options: StartOptions) -> Result<StartOutcome> {
        if self.destroyed {
            return Err(Error::Destroyed);
        }
        if let Some(current) = self.current.take() {
            self.previous = Some(current);
        }

        let restore = self.previous.as_ref().is_some_and(|prev| {
            prev.content_id == options.content_id && prev.display_mode != options.display_mode
        });
        if restore {
            if let Some(mut session) = self.previous.take() {
                info!(
                    session_id = %session.id,
                    from = ?session.display_mode,
                    to = ?options.display_mode,
                    "Display mode transition, restoring previous session"
                );
                session.display_mode = options.display_mode;
                if let Some(attribution) = session.attribution_before_end.take() {
                    debug!(session_id = %session.id, "Reopening ended session");
                    session.attribution = attribution;
                    session.ended = false;
                }
                let id = session.id;
                self.current = Some(session);
                return Ok(StartOutcome::Restored(id));
            }
        }

        let session = PlaybackSession::new(&options, &self.config, self.now());
        let id = session.id;
        info!(session_id = %id, autostart = options.autostart, "Playback session started");
        self.current = Some(session);
        Ok(StartOutcome::Started(id))
    }

    /// End the current session: conclude the exit cause and flush the report.
    ///
    /// Returns the exit cause; a second call returns the stored one without
    /// emitting another report.
    #[instrument(skip(self))]
    pub fn end_playback(&mut self) -> Option<ExitCause> {
        if self.destroyed {
            return None;
        }
        let now = self.now();
        let snapshot = PlayerSnapshot::capture(self.player.as_ref());
        let cdn_window = self.config.attribution.cdn_jitter_window_ms;
        let session = self.current.as_mut()?;
        if session.ended {
            return session.exit_cause().cloned();
        }

        let ctx = session.buffering_context(snapshot.ad);
        session.metrics.finish(ctx, now);

        let input = AttributionInput {
            now,
            session_start_ts: session.metrics.session_start_ts(),
            stage: session.stage.stage(),
            sub_stage: session.stage.sub_stage(),
            stage_entered_at: session.stage.entered_at(session.stage.stage()),
            in_stream_entered_at: session.stage.entered_at(Stage::InStream),
            state_playing: session.flags.playing,
            pause_source: session.flags.pause_source,
            autostart: session.flags.autostart,
            feedback_submitted: session.flags.feedback_submitted,
            last_ad_step: session.metrics.startup().last_ad_step(),
            last_ad_start_load_ts: session.metrics.startup().last_ad_start_load_ts(),
            recent_frag_errors: session.metrics.frag_errors_since(now - cdn_window),
            player: snapshot,
        };
        session.attribution_before_end = Some(session.attribution.clone());
        let cause = session.attribution.conclude(&input).clone();
        session.ended = true;

        let discarded = session.flags.discarded;
        let session_id = session.id;
        let report = self.build_report(&input.player, now);

        if discarded {
            info!(session_id = %session_id, "Discarded session ended without report");
        } else {
            match report {
                Ok(report) => self.telemetry.emit(session_id, TelemetryRecord::Session(report)),
                Err(e) => warn!(error = %e, "Session report could not be built"),
            }
        }
        info!(session_id = %session_id, cause = ?cause.cause_type, "Playback session ended");
        Some(cause)
    }

    /// Drop the current session without a report; it becomes the previous one
    pub fn reset_playback_info(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(current) = self.current.take() {
            debug!(session_id = %current.id, "Playback info reset");
            self.previous = Some(current);
        }
    }

    /// Suppress the report of the current session
    pub fn discard(&mut self) {
        if self.destroyed {
            return;
        }
        if let Some(session) = self.current.as_mut() {
            session.flags.discarded = true;
        }
    }

    /// Stop all processing; every later call is a no-op
    pub fn destroy(&mut self) {
        if !self.destroyed {
            info!("Session manager destroyed");
            self.destroyed = true;
        }
    }

    // ---- events ----

    /// Dispatch one player event
    pub fn handle_event(&mut self, event: &PlayerEvent) {
        if self.destroyed {
            return;
        }
        let now = self.now();
        let player_in_ad = self.player.is_ad();
        let Some(session) = self.current.as_mut() else {
            debug!(event = event.name(), "Event without session");
            return;
        };
        if session.ended {
            return;
        }

        let mut stage_change = None;
        let mut deferred = None;
        match event {
            PlayerEvent::EnterPage => stage_change = session.stage.apply(StageEvent::EnterPage, now),
            PlayerEvent::Ready | PlayerEvent::CanPlay | PlayerEvent::AdComplete => {
                debug!(event = event.name(), "Player event");
            }
            PlayerEvent::Time { position, .. } => {
                if !session.in_ad() && !player_in_ad {
                    session.metrics.time(*position, session.flags.playing, now);
                }
                stage_change = session.stage.timeupdate(now);
            }
            PlayerEvent::Seek { from, to } => session.metrics.seek_start(*from, *to, now),
            PlayerEvent::Seeked => {
                session.metrics.seek_end(now);
            }
            PlayerEvent::Pause { source } => {
                session.flags.playing = false;
                session.flags.pause_source = Some(*source);
            }
            PlayerEvent::Play => {
                session.flags.playing = true;
                session.flags.pause_source = None;
            }
            PlayerEvent::Complete => {
                session.flags.completed = true;
                session.flags.playing = false;
            }
            PlayerEvent::Error { error } => {
                self.handle_error(error, Track::Content);
                return;
            }
            PlayerEvent::AdError { error } => {
                self.handle_error(error, Track::Ad);
                return;
            }
            PlayerEvent::CuePointFilled { is_preroll } => {
                stage_change = session.stage.apply(
                    StageEvent::CuePointFilled {
                        is_preroll: *is_preroll,
                    },
                    now,
                );
            }
            PlayerEvent::AdPodFetch { kind } => {
                session.metrics.ad_pod_fetch(*kind, now);
                stage_change = session.stage.apply(StageEvent::AdPodFetch { kind: *kind }, now);
            }
            PlayerEvent::AdPodFetchSuccess { kind } => {
                session.metrics.ad_pod_fetch_finished(*kind, FetchOutcome::Success, now);
                stage_change = session.stage.apply(StageEvent::AdPodFetchSuccess, now);
            }
            PlayerEvent::AdPodFetchError { kind } => {
                session.metrics.ad_pod_fetch_finished(*kind, FetchOutcome::Error, now);
                stage_change = session.stage.apply(StageEvent::AdPodFetchError, now);
            }
            PlayerEvent::AdPodEmpty { kind } => {
                session.metrics.ad_pod_fetch_finished(*kind, FetchOutcome::Empty, now);
                stage_change = session.stage.apply(StageEvent::AdPodEmpty, now);
            }
            PlayerEvent::AdPlayerSetup => {
                session.metrics.ad_player_setup();
                stage_change = session.stage.apply(StageEvent::AdPlayerSetup, now);
            }
            PlayerEvent::AdStart => session.metrics.ad_started(),
            PlayerEvent::AdStall => {
                session
                    .attribution
                    .add_indication(ExitCauseType::AdStall, None, None, now);
            }
            PlayerEvent::AdPodComplete => {
                session.metrics.ad_buffer_end(now);
                stage_change = session.stage.apply(StageEvent::AdPodComplete, now);
            }
            PlayerEvent::BufferStart {
                reason,
                buffering_type,
                track,
            } => match track {
                Track::Content => {
                    let ctx = session.buffering_context(player_in_ad);
                    session.metrics.buffer_start(*reason, *buffering_type, ctx, now);
                    deferred = session.pending_modal.take();
                }
                Track::Ad => {
                    session.metrics.ad_buffer_start(now);
                }
            },
            PlayerEvent::BufferEnd { track } => match track {
                Track::Content => {
                    let ctx = session.buffering_context(player_in_ad);
                    let closed = session.metrics.buffer_end(true, ctx, now);
                    if closed.is_some_and(|c| c.newly_counted && c.buffering_type == BufferingType::Unknown) {
                        match store::mark_unknown_buffering(self.store.as_mut()) {
                            Ok(true) => session.metrics.mark_first_unknown_buffering_on_device(),
                            Ok(false) => {}
                            Err(e) => warn!(error = %e, "Unknown buffering flag not persisted"),
                        }
                    }
                }
                Track::Ad => {
                    session.metrics.ad_buffer_end(now);
                }
            },
            PlayerEvent::StartLoad {
                track,
                is_resume_from_ad,
            } => {
                session.metrics.start_load(*track, now, *is_resume_from_ad);
                let stage_event = match track {
                    Track::Content => StageEvent::ContentStartLoad {
                        is_resume_from_ad: *is_resume_from_ad,
                    },
                    Track::Ad => StageEvent::AdStartLoad,
                };
                stage_change = session.stage.apply(stage_event, now);
            }
            PlayerEvent::FirstFrameViewed { track } => {
                session.metrics.first_frame_viewed(*track, now);
                let stage_event = match track {
                    Track::Content => {
                        session.flags.is_retrying = false;
                        StageEvent::ContentFirstFrameViewed
                    }
                    Track::Ad => StageEvent::AdFirstFrameViewed,
                };
                stage_change = session.stage.apply(stage_event, now);
            }
            PlayerEvent::CurrentTimeProgressed { track } => {
                session.metrics.current_time_progressed(*track, now);
                let stage_event = match track {
                    Track::Content => {
                        session.flags.playing = true;
                        StageEvent::ContentCurrentTimeProgressed
                    }
                    Track::Ad => StageEvent::AdCurrentTimeProgressed,
                };
                stage_change = session.stage.apply(stage_event, now);
            }
            PlayerEvent::FragLoaded { ttfb_ms } => session.metrics.push_ttfb(*ttfb_ms),
            PlayerEvent::FragLoadError { url } => {
                session.metrics.frag_load_error(now);
                let host = url
                    .as_deref()
                    .and_then(|u| Url::parse(u).ok())
                    .and_then(|u| u.host_str().map(str::to_string));
                debug!(host = host.as_deref().unwrap_or("unknown"), "Fragment load error");
            }
            PlayerEvent::PlayInterrupted => {
                session
                    .attribution
                    .add_indication(ExitCauseType::PlayInterrupt, None, None, now);
            }
            PlayerEvent::AdInterrupted => {
                session
                    .attribution
                    .add_indication(ExitCauseType::AdInterrupt, None, None, now);
            }
            PlayerEvent::Visibility { visible } => {
                session.flags.backgrounded = !visible;
                if !visible {
                    let ctx = session.buffering_context(player_in_ad);
                    session.metrics.buffer_end(true, ctx, now);
                }
            }
            PlayerEvent::FeedbackSubmitted => session.flags.feedback_submitted = true,
        }
        self.observers.notify(stage_change);
        if let Some(pending) = deferred {
            info!(modal = %pending.modal, "Showing deferred modal on buffer start");
            self.show_modal(pending.modal, pending.error);
        }
    }

    /// Record a free-form indication on the current session
    pub fn add_indication(&mut self, cause_type: ExitCauseType, error: Option<ErrorRecord>, message: Option<String>) {
        if self.destroyed {
            return;
        }
        let now = self.now();
        if let Some(session) = self.current.as_mut() {
            session.attribution.add_indication(cause_type, error, message, now);
        }
    }

    // ---- errors ----

    /// Classify an error, choose a recovery action and apply it
    #[instrument(skip(self, raw), fields(details = %raw.details))]
    pub fn handle_error(&mut self, raw: &RawError, track: Track) -> Option<Decision> {
        if self.destroyed {
            return None;
        }
        let now = self.now();
        let position = self.player.position();
        let record = self.classifier.record(raw, track, now);
        let session = self.current.as_mut()?;
        session.metrics.record_error(record.clone());

        let decision = if self.classifier.is_benign(raw) {
            debug!(code = %record.code, "Benign error recorded");
            Decision {
                rule: None,
                action: RecoveryAction::Ignore,
            }
        } else if track == Track::Ad {
            Decision {
                rule: None,
                action: self.policy.decide_ad(&record, &self.config),
            }
        } else {
            if record.fatal {
                let indication = match (record.error_type, record.code) {
                    (ErrorType::DrmError, _) => Some(ExitCauseType::DrmCrash),
                    (ErrorType::SetupError, _) => Some(ExitCauseType::SetupCrash),
                    (_, code) if code.is_manifest() => Some(ExitCauseType::ManifestError),
                    _ => None,
                };
                if let Some(cause_type) = indication {
                    session
                        .attribution
                        .add_indication(cause_type, Some(record.clone()), Some(record.message.clone()), now);
                }
            }
            let ctx = RecoveryContext {
                record: &record,
                config: &self.config,
                counters: session.metrics.counters(),
                is_drm_resource: session.flags.is_drm_resource,
                has_fallback: self.controller.has_fallback(),
                is_buffering: self.player.is_buffering() || session.metrics.is_buffering(),
                buffered_ahead_secs: buffered_ahead(&self.player.buffered_range(), position),
                position,
            };
            self.policy.decide(&ctx, self.controller.as_mut())
        };

        let stage = session.stage();
        let sub_stage = session.sub_stage();
        self.apply_action(decision.action, &record, now);
        self.telemetry.emit(
            self.current.as_ref().map(|s| s.id).unwrap_or_default(),
            TelemetryRecord::Error(ErrorReport {
                error: record,
                stage,
                sub_stage,
                action: decision.action,
                rule: decision.rule.map(str::to_string),
                position,
            }),
        );
        Some(decision)
    }

    fn apply_action(&mut self, action: RecoveryAction, record: &ErrorRecord, now: i64) {
        let Some(session) = self.current.as_mut() else {
            return;
        };
        let mut stage_change = None;
        if action.supersedes_deferred_modal() {
            if let Some(pending) = session.pending_modal.take() {
                debug!(modal = %pending.modal, "Deferred modal superseded");
            }
        }
        match action {
            RecoveryAction::Ignore => {}
            RecoveryAction::RetryTokenExpired { resume_position } => {
                let attempt = session.metrics.count_token_expired_retry();
                session.flags.is_retrying = true;
                warn!(attempt, resume_position, "Refetching content after token expiry");
                if let Err(e) = self.controller.refetch_content(resume_position) {
                    warn!(error = %e, "Content refetch failed");
                }
            }
            RecoveryAction::EngineRecovered => {
                session.metrics.count_engine_recovery();
            }
            RecoveryAction::Fallback => {
                session.metrics.count_fallback();
                session.flags.is_retrying = true;
                stage_change = session.stage.apply(StageEvent::Fallback, now);
                if let Err(e) = self.controller.load_fallback() {
                    warn!(error = %e, "Fallback load failed");
                }
            }
            RecoveryAction::Reload { position } => {
                let attempt = session.metrics.count_reload();
                session.flags.is_retrying = true;
                stage_change = session.stage.apply(StageEvent::ReloadSrc, now);
                warn!(attempt, position, "Reloading source");
                if let Err(e) = self.controller.reload(position) {
                    warn!(error = %e, "Reload failed");
                }
            }
            RecoveryAction::DeferModal { modal } => {
                debug!(modal = %modal, "Modal deferred until next buffer start");
                session.pending_modal = Some(PendingModal {
                    modal,
                    error: record.clone(),
                });
            }
            RecoveryAction::ShowModal { modal } => self.show_modal(modal, record.clone()),
        }
        self.observers.notify(stage_change);
    }

    fn show_modal(&mut self, modal: ModalType, error: ErrorRecord) {
        if let Err(e) = self.controller.pause() {
            debug!(error = %e, "Pause before modal failed");
        }
        if let Some(session) = self.current.as_mut() {
            session.flags.playing = false;
            session.attribution.set_hint(ExitCause {
                cause_type: ExitCauseType::PlayerError,
                sub_cause: None,
                error: Some(error.clone()),
                message: Some(modal.to_string()),
            });
        }
        warn!(modal = %modal, code = %error.code, "Showing error modal");
        let payload = ModalPayload {
            error_code: error.code.to_string(),
            position: self.player.position(),
            error,
        };
        self.modals.show_modal(modal, payload);
    }

    // ---- network ----

    /// Close one network sampling period
    pub fn sample_network(&mut self) -> Option<NetworkSample> {
        if self.destroyed {
            return None;
        }
        let now = self.now();
        let stats = self.player.frag_download_stats();
        let session = self.current.as_mut()?;
        if session.ended {
            return None;
        }
        session.metrics.sample_network(stats, now)
    }

    // ---- reporting ----

    fn build_report(&mut self, player: &PlayerSnapshot, now: i64) -> Result<SessionReport> {
        let Some(session) = self.current.as_ref() else {
            return Ok(SessionReport::new());
        };
        let metrics_report = session.metrics.report();
        let mut report = SessionReport::new();
        report.insert("session_id", session.id.to_string());
        report.insert("content_id", session.content_id.clone());
        report.insert("display_mode", serde_json::to_value(session.display_mode)?);
        report.insert("stage", session.stage().to_string());
        report.insert("sub_stage", session.sub_stage().to_string());
        report.insert("autostart", session.flags.autostart);
        report.insert("is_drm_resource", session.flags.is_drm_resource);
        if let Some(cause) = session.exit_cause() {
            report.insert("exit_cause", serde_json::to_value(cause.cause_type)?);
            report.insert("exit_sub_cause", serde_json::to_value(cause.sub_cause)?);
            if let Some(message) = &cause.message {
                report.insert_extra("exit_message", message.clone());
            }
        }
        if let Some(error) = session.metrics.errors().last_error() {
            report.insert("last_error_type", error.error_type.to_string());
            report.insert("last_error_code", error.code.to_string());
        }
        if let Some(error) = session.metrics.errors().last_ad_error() {
            report.insert("last_ad_error_code", error.code.to_string());
        }
        report.merge(&metrics_report)?;

        let viewed = session.metrics.content_view_ms() + metrics_report.buffering_duration;
        let ratio = if viewed > 0 {
            metrics_report.buffering_duration as f64 / viewed as f64
        } else {
            0.0
        };
        report.insert("buffering_ratio", ratio);

        if let Some(cdn) = &player.cdn {
            report.insert_extra("cdn", cdn.clone());
        }
        if let Some(sdk) = &player.sdk_info {
            report.insert_extra("sdk_info", sdk.clone());
        }
        report.insert_extra("network_samples_csv", session.metrics.network().to_csv());
        report.insert_extra(
            "ad_startup_traces",
            serde_json::to_value(session.metrics.startup().ad_traces())?,
        );

        match BufferingProfile::load_or_create(self.store.as_mut(), now) {
            Ok((mut profile, _)) => {
                if viewed > 0 {
                    profile.record_ratio(ratio, now);
                    if let Err(e) = profile.save(self.store.as_mut()) {
                        warn!(error = %e, "Buffering profile not saved");
                    }
                }
                report.insert("buffering_group", serde_json::to_value(profile.group)?);
            }
            Err(e) => warn!(error = %e, "Buffering profile unavailable"),
        }
        Ok(report)
    }
}

/// Subscribe the shared manager to a player feed.
///
/// The feed holds only a weak handle; once the manager is dropped or the
/// returned subscription is disposed, events stop mutating anything.
pub fn attach(manager: &SharedSessionManager, feed: &dyn PlayerFeed) -> Subscription {
    let weak: Weak<Mutex<SessionManager>> = Arc::downgrade(manager);
    feed.subscribe(Box::new(move |event: &PlayerEvent| {
        if let Some(manager) = weak.upgrade() {
            manager.lock().handle_event(event);
        }
    }))
}

/// Periodically sample network features until the manager goes away
pub fn spawn_network_sampler(manager: &SharedSessionManager) -> tokio::task::JoinHandle<()> {
    let period = Duration::from_millis(manager.lock().config().network_sample_period_ms);
    let weak = Arc::downgrade(manager);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let Some(manager) = weak.upgrade() else {
                break;
            };
            let stop = {
                let mut manager = manager.lock();
                if manager.is_destroyed() {
                    true
                } else {
                    if let Some(sample) = manager.sample_network() {
                        debug!(throughput_kbps = sample.throughput_kbps, "Sampler tick");
                    }
                    false
                }
            };
            if stop {
                break;
            }
        }
        debug!("Network sampler stopped");
    })
}
