//! Integration tests for Kino QoS

use kino_qos::classify::{ErrorRecord, RawError, RawErrorKind};
use kino_qos::player::{ModalPayload, SharedPlayerSnapshot};
use kino_qos::recovery::RecoveryAction;
use kino_qos::store::{BUFFERING_PROFILE_KEY, UNKNOWN_BUFFERING_FLAG_KEY};
use kino_qos::{
    attach, spawn_network_sampler, Collaborators, DisplayMode, Emitter, Error, ExitCauseType, KeyValueStore,
    ManualClock, MemorySink, MemoryStore, ModalPresenter, ModalType, PlaybackController, PlayerEvent,
    PlayerSnapshot, QosConfig, SessionManager, Stage, StartOptions, StartOutcome, TimeRange, Track,
};
use kino_qos::{metrics::FragDownloadStats, BufferingReason, BufferingType};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Harness
// =============================================================================

#[derive(Clone, Default)]
struct RecordingController {
    calls: Arc<Mutex<Vec<String>>>,
    fallback: bool,
}

impl PlaybackController for RecordingController {
    fn pause(&mut self) -> kino_qos::Result<()> {
        self.calls.lock().push("pause".into());
        Ok(())
    }

    fn refetch_content(&mut self, resume_position: f64) -> kino_qos::Result<()> {
        self.calls.lock().push(format!("refetch@{resume_position}"));
        Ok(())
    }

    fn has_fallback(&self) -> bool {
        self.fallback
    }

    fn load_fallback(&mut self) -> kino_qos::Result<()> {
        self.calls.lock().push("fallback".into());
        Ok(())
    }

    fn reload(&mut self, position: f64) -> kino_qos::Result<()> {
        self.calls.lock().push(format!("reload@{position}"));
        Ok(())
    }

    fn try_engine_recovery(&mut self, _: &ErrorRecord) -> bool {
        false
    }
}

#[derive(Clone, Default)]
struct RecordingModals(Arc<Mutex<Vec<(ModalType, ModalPayload)>>>);

impl RecordingModals {
    fn shown(&self) -> Vec<ModalType> {
        self.0.lock().iter().map(|(m, _)| *m).collect()
    }
}

impl ModalPresenter for RecordingModals {
    fn show_modal(&mut self, modal: ModalType, payload: ModalPayload) {
        self.0.lock().push((modal, payload));
    }
}

#[derive(Clone, Default)]
struct SharedStore(Arc<Mutex<MemoryStore>>);

impl KeyValueStore for SharedStore {
    fn get(&self, key: &str) -> kino_qos::Result<Option<String>> {
        self.0.lock().get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> kino_qos::Result<()> {
        self.0.lock().set(key, value)
    }

    fn remove(&mut self, key: &str) -> kino_qos::Result<()> {
        self.0.lock().remove(key)
    }
}

struct Harness {
    manager: SessionManager,
    clock: ManualClock,
    player: SharedPlayerSnapshot,
    controller: RecordingController,
    modals: RecordingModals,
    store: SharedStore,
    sink: MemorySink,
}

impl Harness {
    fn new() -> Self {
        Self::with(QosConfig::default(), false)
    }

    fn with(config: QosConfig, fallback: bool) -> Self {
        Self::with_store(config, fallback, SharedStore::default())
    }

    fn with_store(config: QosConfig, fallback: bool, store: SharedStore) -> Self {
        let clock = ManualClock::new(0);
        let player: SharedPlayerSnapshot = Arc::new(Mutex::new(PlayerSnapshot::default()));
        let controller = RecordingController {
            fallback,
            ..Default::default()
        };
        let modals = RecordingModals::default();
        let sink = MemorySink::new();
        let manager = SessionManager::new(
            config,
            Collaborators {
                clock: Arc::new(clock.clone()),
                player: Arc::new(player.clone()),
                controller: Box::new(controller.clone()),
                modals: Box::new(modals.clone()),
                store: Box::new(store.clone()),
                sink: Box::new(sink.clone()),
            },
        )
        .unwrap();
        Self {
            manager,
            clock,
            player,
            controller,
            modals,
            store,
            sink,
        }
    }

    fn start(&mut self) -> StartOutcome {
        self.manager
            .start_playback(StartOptions {
                content_id: "movie-1".into(),
                ..Default::default()
            })
            .unwrap()
    }

    fn event(&mut self, event: PlayerEvent) {
        self.manager.handle_event(&event);
    }

    /// Content loaded and first frame shown `after_ms` later
    fn play_content(&mut self, after_ms: i64) {
        self.event(PlayerEvent::StartLoad {
            track: Track::Content,
            is_resume_from_ad: false,
        });
        self.clock.advance(after_ms);
        self.event(PlayerEvent::FirstFrameViewed { track: Track::Content });
    }

    fn calls(&self) -> Vec<String> {
        self.controller.calls.lock().clone()
    }
}

fn fatal(details: &str) -> RawError {
    RawError::new(RawErrorKind::Other, details).fatal()
}

// =============================================================================
// Startup Tests
// =============================================================================

#[test]
fn test_first_frame_timings_reported() {
    let mut h = Harness::new();
    h.start();
    h.play_content(500);
    assert_eq!(h.manager.session().unwrap().stage(), Stage::Ready);

    h.manager.end_playback().unwrap();
    let reports = h.sink.session_reports();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.get("content_first_frame_duration").and_then(|v| v.as_i64()), Some(500));
    assert_eq!(report.get("join_time").and_then(|v| v.as_i64()), Some(500));
    assert_eq!(report.get("content_id").and_then(|v| v.as_str()), Some("movie-1"));
}

#[test]
fn test_stage_notifications_fire_once_per_change() {
    let mut h = Harness::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _sub = h.manager.subscribe_stage(move |change| sink.lock().push(change.stage));

    h.start();
    h.event(PlayerEvent::StartLoad {
        track: Track::Content,
        is_resume_from_ad: false,
    });
    h.event(PlayerEvent::StartLoad {
        track: Track::Content,
        is_resume_from_ad: false,
    });
    h.event(PlayerEvent::FirstFrameViewed { track: Track::Content });
    h.event(PlayerEvent::FirstFrameViewed { track: Track::Content });
    h.event(PlayerEvent::CurrentTimeProgressed { track: Track::Content });

    assert_eq!(
        seen.lock().as_slice(),
        &[Stage::ContentStartup, Stage::Ready, Stage::EarlyStart]
    );
}

#[test]
fn test_in_stream_promotion_on_timeupdate() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::CurrentTimeProgressed { track: Track::Content });
    h.clock.advance(30_001);
    h.event(PlayerEvent::Time {
        position: 30.0,
        duration: Some(600.0),
    });
    assert_eq!(h.manager.session().unwrap().stage(), Stage::InStream);
}

// =============================================================================
// Buffering Tests
// =============================================================================

#[test]
fn test_unknown_buffering_marks_device_once() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Unknown,
        track: Track::Content,
    });
    h.clock.advance(1_000);
    h.event(PlayerEvent::BufferEnd { track: Track::Content });
    h.manager.end_playback();

    let report = &h.sink.session_reports()[0];
    assert_eq!(report.get("buffering_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(report.get("buffering_duration").and_then(|v| v.as_i64()), Some(1_000));
    assert_eq!(
        report.get("first_unknown_buffering_on_device").and_then(|v| v.as_bool()),
        Some(true)
    );
    assert!(h.store.get(UNKNOWN_BUFFERING_FLAG_KEY).unwrap().is_some());
    assert!(h.store.get(BUFFERING_PROFILE_KEY).unwrap().is_some());

    // Same device, second session
    let mut h = Harness::with_store(QosConfig::default(), false, h.store.clone());
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Unknown,
        track: Track::Content,
    });
    h.clock.advance(1_000);
    h.event(PlayerEvent::BufferEnd { track: Track::Content });
    h.manager.end_playback();
    let report = &h.sink.session_reports()[0];
    assert_eq!(
        report.get("first_unknown_buffering_on_device").and_then(|v| v.as_bool()),
        Some(false)
    );
}

#[test]
fn test_buffering_dropped_when_backgrounded() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Waiting,
        buffering_type: BufferingType::Network,
        track: Track::Content,
    });
    h.clock.advance(2_000);
    h.event(PlayerEvent::Visibility { visible: false });
    h.event(PlayerEvent::BufferEnd { track: Track::Content });
    let metrics = h.manager.session().unwrap().metrics();
    assert!(!metrics.is_buffering());
    assert_eq!(metrics.buffering().count, 0);
}

#[test]
fn test_seek_during_buffering_is_break_off() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Network,
        track: Track::Content,
    });
    h.clock.advance(700);
    h.event(PlayerEvent::Seek { from: 10.0, to: 50.0 });
    h.clock.advance(300);
    h.event(PlayerEvent::Seeked);

    let metrics = h.manager.session().unwrap().metrics();
    assert_eq!(metrics.counters().break_off_count, 1);
    assert_eq!(metrics.seeking().count, 1);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_token_expired_retry_is_bounded() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.player.lock().position = 42.0;

    let token = fatal("tokenExpired");
    for attempt in 1..=3 {
        let decision = h.manager.handle_error(&token, Track::Content).unwrap();
        assert_eq!(
            decision.action,
            RecoveryAction::RetryTokenExpired { resume_position: 42.0 }
        );
        let counters = h.manager.session().unwrap().metrics().counters();
        assert_eq!(counters.token_expired_retry_count, attempt);
    }

    let fourth = h.manager.handle_error(&token, Track::Content).unwrap();
    assert_ne!(fourth.rule, Some("token_expired_retry"));
    assert_eq!(
        fourth.action,
        RecoveryAction::ShowModal {
            modal: ModalType::FatalError
        }
    );
    let refetches = h.calls().iter().filter(|c| c.starts_with("refetch")).count();
    assert_eq!(refetches, 3);
    assert_eq!(h.modals.shown(), vec![ModalType::FatalError]);
    assert_eq!(h.sink.error_reports().len(), 4);
}

#[test]
fn test_reloads_are_bounded() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.player.lock().position = 12.5;

    let decode = fatal("decodeError");
    for _ in 0..3 {
        let decision = h.manager.handle_error(&decode, Track::Content).unwrap();
        assert_eq!(decision.action, RecoveryAction::Reload { position: 12.5 });
    }
    assert_eq!(h.manager.session().unwrap().stage(), Stage::Reload);

    let last = h.manager.handle_error(&decode, Track::Content).unwrap();
    assert_eq!(last.rule, Some("final_modal"));
    assert_eq!(h.manager.session().unwrap().metrics().counters().reload_count, 3);
    assert_eq!(h.calls().iter().filter(|c| c.starts_with("reload")).count(), 3);
}

#[test]
fn test_fallback_precedes_reload() {
    let mut h = Harness::with(QosConfig::default(), true);
    h.start();
    h.play_content(100);

    let decode = fatal("decodeError");
    let first = h.manager.handle_error(&decode, Track::Content).unwrap();
    assert_eq!(first.action, RecoveryAction::Fallback);
    assert_eq!(h.manager.session().unwrap().stage(), Stage::Fallback);
    assert!(h.manager.session().unwrap().flags().is_retrying);

    let second = h.manager.handle_error(&decode, Track::Content).unwrap();
    assert!(matches!(second.action, RecoveryAction::Reload { .. }));
    assert_eq!(h.calls()[0], "fallback");
}

#[test]
fn test_network_modal_deferred_until_buffering() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    {
        let mut player = h.player.lock();
        player.position = 5.0;
        player.buffered = vec![TimeRange::new(0.0, 30.0)];
    }

    let decision = h.manager.handle_error(&fatal("fragLoadError"), Track::Content).unwrap();
    assert_eq!(
        decision.action,
        RecoveryAction::DeferModal {
            modal: ModalType::FatalError
        }
    );
    assert!(h.modals.shown().is_empty());
    assert!(h.manager.session().unwrap().has_pending_modal());

    for _ in 0..2 {
        h.event(PlayerEvent::BufferStart {
            reason: BufferingReason::Stalled,
            buffering_type: BufferingType::Network,
            track: Track::Content,
        });
    }
    assert_eq!(h.modals.shown(), vec![ModalType::FatalError]);
    assert!(!h.manager.session().unwrap().has_pending_modal());
}

/// Content playing with 30 s buffered, then a fatal fragment error that defers the modal
fn defer_network_modal(h: &mut Harness) {
    h.start();
    h.play_content(100);
    {
        let mut player = h.player.lock();
        player.position = 5.0;
        player.buffered = vec![TimeRange::new(0.0, 30.0)];
    }
    let decision = h.manager.handle_error(&fatal("fragLoadError"), Track::Content).unwrap();
    assert!(matches!(decision.action, RecoveryAction::DeferModal { .. }));
}

#[test]
fn test_deferred_modal_waits_for_content_buffering() {
    let mut h = Harness::new();
    defer_network_modal(&mut h);

    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Network,
        track: Track::Ad,
    });
    assert!(h.modals.shown().is_empty());
    assert!(h.manager.session().unwrap().has_pending_modal());

    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Network,
        track: Track::Content,
    });
    assert_eq!(h.modals.shown(), vec![ModalType::FatalError]);
}

#[test]
fn test_deferred_modal_buffering_is_still_counted() {
    let mut h = Harness::new();
    defer_network_modal(&mut h);

    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Network,
        track: Track::Content,
    });
    h.clock.advance(5_000);
    h.event(PlayerEvent::BufferEnd { track: Track::Content });
    h.manager.end_playback();

    assert_eq!(h.modals.shown(), vec![ModalType::FatalError]);
    let report = &h.sink.session_reports()[0];
    assert_eq!(report.get("buffering_count").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(report.get("buffering_duration").and_then(|v| v.as_i64()), Some(5_000));
}

#[test]
fn test_later_modal_supersedes_deferred_modal() {
    let mut h = Harness::new();
    defer_network_modal(&mut h);

    h.manager
        .handle_error(&RawError::new(RawErrorKind::Setup, "setupFailed").fatal(), Track::Content);
    assert!(!h.manager.session().unwrap().has_pending_modal());
    h.event(PlayerEvent::BufferStart {
        reason: BufferingReason::Stalled,
        buffering_type: BufferingType::Network,
        track: Track::Content,
    });
    assert_eq!(h.modals.shown(), vec![ModalType::SetupError]);
}

#[test]
fn test_benign_errors_are_ignored() {
    let mut h = Harness::new();
    h.start();
    let abort = RawError::new(RawErrorKind::Media, "").with_name("AbortError").fatal();
    let decision = h.manager.handle_error(&abort, Track::Content).unwrap();
    assert_eq!(decision.action, RecoveryAction::Ignore);
    assert!(h.calls().is_empty());
}

#[test]
fn test_fatal_ad_error_modal_is_gated() {
    let ad_error = PlayerEvent::AdError {
        error: RawError::new(RawErrorKind::Other, "adLoadFailed").fatal(),
    };

    let mut h = Harness::new();
    h.start();
    h.event(ad_error.clone());
    assert!(h.modals.shown().is_empty());

    let config = QosConfig {
        surface_fatal_ad_errors: true,
        ..Default::default()
    };
    let mut h = Harness::with(config, false);
    h.start();
    h.event(ad_error);
    assert_eq!(h.modals.shown(), vec![ModalType::AdError]);
}

// =============================================================================
// Attribution Tests
// =============================================================================

#[test]
fn test_indications_keep_latest_three() {
    let mut h = Harness::new();
    h.start();
    for cause in [
        ExitCauseType::PlayInterrupt,
        ExitCauseType::AdStall,
        ExitCauseType::AdInterrupt,
        ExitCauseType::PlayerStateMismatch,
    ] {
        h.manager.add_indication(cause, None, None);
    }
    let kept: Vec<_> = h
        .manager
        .session()
        .unwrap()
        .attribution()
        .indications()
        .map(|i| i.cause_type)
        .collect();
    assert_eq!(
        kept,
        vec![
            ExitCauseType::AdStall,
            ExitCauseType::AdInterrupt,
            ExitCauseType::PlayerStateMismatch
        ]
    );
}

#[test]
fn test_preroll_without_source_is_ad_src_unset() {
    let mut h = Harness::new();
    h.start();
    h.event(PlayerEvent::EnterPage);
    h.event(PlayerEvent::CuePointFilled { is_preroll: true });
    assert_eq!(h.manager.session().unwrap().stage(), Stage::BeforePreroll);

    h.clock.advance(12_000);
    let cause = h.manager.end_playback().unwrap();
    assert_eq!(cause.cause_type, ExitCauseType::AdSrcUnset);
    assert_eq!(cause.sub_cause, Some(ExitCauseType::AdNoBuffer));

    let report = &h.sink.session_reports()[0];
    assert_eq!(report.get("exit_cause").and_then(|v| v.as_str()), Some("AD_SRC_UNSET"));
    assert_eq!(report.get("exit_sub_cause").and_then(|v| v.as_str()), Some("AD_NO_BUFFER"));
}

#[test]
fn test_modal_sets_player_error_hint() {
    let mut h = Harness::new();
    h.start();
    h.play_content(100);
    h.event(PlayerEvent::CurrentTimeProgressed { track: Track::Content });
    {
        let mut player = h.player.lock();
        player.position = 10.0;
        player.buffered = vec![TimeRange::new(0.0, 20.0)];
        player.paused = true;
    }
    h.manager.handle_error(&fatal("bufferStalledError"), Track::Content);
    let cause = h.manager.end_playback().unwrap();
    assert_eq!(cause.cause_type, ExitCauseType::PlayerError);
}

#[test]
fn test_fatal_setup_error_during_startup() {
    let mut h = Harness::new();
    h.start();
    h.event(PlayerEvent::StartLoad {
        track: Track::Content,
        is_resume_from_ad: false,
    });
    h.manager
        .handle_error(&RawError::new(RawErrorKind::Setup, "setupFailed").fatal(), Track::Content);
    assert_eq!(h.modals.shown(), vec![ModalType::SetupError]);
    let cause = h.manager.end_playback().unwrap();
    assert_eq!(cause.cause_type, ExitCauseType::SetupCrash);
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_display_mode_change_restores_session() {
    let mut h = Harness::new();
    let first = h.start();
    h.play_content(800);

    let restored = h
        .manager
        .start_playback(StartOptions {
            content_id: "movie-1".into(),
            display_mode: DisplayMode::Fullscreen,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(restored, StartOutcome::Restored(first.session_id()));

    let session = h.manager.session().unwrap();
    assert_eq!(session.display_mode(), DisplayMode::Fullscreen);
    assert_eq!(session.stage(), Stage::Ready);
    assert_eq!(session.metrics().startup().timings().content_first_frame_duration, 800);
}

#[test]
fn test_ended_session_reopened_for_picture_in_picture() {
    let mut h = Harness::new();
    let first = h.start();
    h.play_content(800);
    h.manager.end_playback();
    assert!(h.manager.session().unwrap().exit_cause().is_some());

    let next = h
        .manager
        .start_playback(StartOptions {
            content_id: "movie-1".into(),
            display_mode: DisplayMode::PictureInPicture,
            ..Default::default()
        })
        .unwrap();
    assert_eq!(next, StartOutcome::Restored(first.session_id()));

    let session = h.manager.session().unwrap();
    assert!(!session.is_ended());
    assert!(session.exit_cause().is_none());
    assert_eq!(session.stage(), Stage::Ready);

    h.event(PlayerEvent::AdStall);
    h.manager.end_playback();
    assert_eq!(h.sink.session_reports().len(), 2);
}

#[test]
fn test_ended_session_of_other_content_is_not_restored() {
    let mut h = Harness::new();
    let first = h.start();
    h.manager.end_playback();
    let next = h
        .manager
        .start_playback(StartOptions {
            content_id: "movie-2".into(),
            display_mode: DisplayMode::PictureInPicture,
            ..Default::default()
        })
        .unwrap();
    assert!(matches!(next, StartOutcome::Started(id) if id != first.session_id()));
}

#[test]
fn test_reset_and_discard_suppress_report() {
    let mut h = Harness::new();
    h.start();
    h.manager.reset_playback_info();
    assert!(h.manager.session().is_none());
    assert!(h.manager.previous_session().is_some());
    assert!(h.manager.end_playback().is_none());

    h.start();
    h.manager.discard();
    assert!(h.manager.end_playback().is_some());
    assert!(h.sink.session_reports().is_empty());
}

#[test]
fn test_destroy_stops_everything() {
    let mut h = Harness::new();
    h.start();
    h.manager.destroy();
    h.event(PlayerEvent::StartLoad {
        track: Track::Content,
        is_resume_from_ad: false,
    });
    assert_eq!(h.manager.session().unwrap().stage(), Stage::None);
    assert!(h.manager.handle_error(&fatal("decodeError"), Track::Content).is_none());
    assert!(h.manager.sample_network().is_none());
    assert!(matches!(
        h.manager.start_playback(StartOptions::default()),
        Err(Error::Destroyed)
    ));
    assert!(h.sink.records().is_empty());
}

#[test]
fn test_attach_and_dispose() {
    let h = Harness::new();
    let feed: Emitter<PlayerEvent> = Emitter::new();
    let shared = h.manager.shared();
    shared.lock().start_playback(StartOptions::default()).unwrap();

    let subscription = attach(&shared, &feed);
    feed.emit(&PlayerEvent::EnterPage);
    assert_eq!(shared.lock().session().unwrap().stage(), Stage::Idle);

    subscription.dispose();
    assert_eq!(feed.listener_count(), 0);
    feed.emit(&PlayerEvent::CuePointFilled { is_preroll: true });
    assert_eq!(shared.lock().session().unwrap().stage(), Stage::Idle);
}

// =============================================================================
// Network Sampler Tests
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_network_sampler_ticks_until_destroyed() {
    let config = QosConfig {
        network_sample_period_ms: 1_000,
        ..Default::default()
    };
    let h = Harness::with(config, false);
    let player = h.player.clone();
    player.lock().frag_stats = Some(FragDownloadStats::default());
    let shared = h.manager.shared();
    shared.lock().start_playback(StartOptions::default()).unwrap();

    let handle = spawn_network_sampler(&shared);
    // First tick only records the baseline
    tokio::time::sleep(Duration::from_millis(10)).await;

    player.lock().frag_stats = Some(FragDownloadStats {
        loaded_bytes: 125_000,
        loading_ms: 1_000.0,
    });
    shared.lock().handle_event(&PlayerEvent::FragLoaded { ttfb_ms: 50.0 });
    tokio::time::sleep(Duration::from_millis(1_000)).await;

    {
        let manager = shared.lock();
        let samples: Vec<_> = manager.session().unwrap().metrics().network().history().copied().collect();
        assert_eq!(samples.len(), 1);
        assert!((samples[0].throughput_kbps - 1_000.0).abs() < 1e-9);
        assert!((samples[0].ttfb_ms - 50.0).abs() < 1e-9);
    }

    shared.lock().destroy();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_network_sampler_stops_when_manager_dropped() {
    let h = Harness::new();
    let shared = h.manager.shared();
    let handle = spawn_network_sampler(&shared);
    drop(shared);
    handle.await.unwrap();
}
