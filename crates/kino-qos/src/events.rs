//! Player event feed and subscriptions
//!
//! Every attach operation in this crate returns a [`Subscription`]. Dropping or
//! disposing it detaches the listener; no callback runs afterwards.

use crate::classify::RawError;
use crate::types::*;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Events emitted by the external player and ad pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlayerEvent {
    /// A new page hosting the player was entered
    EnterPage,
    /// Player instance ready
    Ready,
    /// Playhead update
    Time {
        position: f64,
        #[serde(default)]
        duration: Option<f64>,
    },
    /// Seek requested
    Seek { from: f64, to: f64 },
    /// Seek completed
    Seeked,
    Pause { source: PauseSource },
    Play,
    /// Content reached its end
    Complete,
    Error { error: RawError },
    AdError { error: RawError },
    /// Ad cue points resolved
    CuePointFilled { is_preroll: bool },
    AdPodFetch { kind: AdBreakKind },
    AdPodFetchSuccess { kind: AdBreakKind },
    AdPodFetchError { kind: AdBreakKind },
    AdPodEmpty { kind: AdBreakKind },
    /// The ad player was created for a new pod
    AdPlayerSetup,
    /// An ad inside the pod started
    AdStart,
    /// The ad player stopped progressing
    AdStall,
    AdComplete,
    AdPodComplete,
    BufferStart {
        reason: BufferingReason,
        #[serde(default)]
        buffering_type: BufferingType,
        #[serde(default)]
        track: Track,
    },
    BufferEnd {
        #[serde(default)]
        track: Track,
    },
    /// A source was assigned to the media element
    StartLoad {
        #[serde(default)]
        track: Track,
        #[serde(default)]
        is_resume_from_ad: bool,
    },
    FirstFrameViewed {
        #[serde(default)]
        track: Track,
    },
    CurrentTimeProgressed {
        #[serde(default)]
        track: Track,
    },
    CanPlay,
    /// A media fragment finished downloading
    FragLoaded { ttfb_ms: f64 },
    FragLoadError {
        #[serde(default)]
        url: Option<String>,
    },
    /// `play()` was interrupted by a new load or pause
    PlayInterrupted,
    /// Ad playback was interrupted by the platform
    AdInterrupted,
    Visibility { visible: bool },
    FeedbackSubmitted,
}

impl PlayerEvent {
    /// Event name for logging
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::EnterPage => "enter_page",
            PlayerEvent::Ready => "ready",
            PlayerEvent::Time { .. } => "time",
            PlayerEvent::Seek { .. } => "seek",
            PlayerEvent::Seeked => "seeked",
            PlayerEvent::Pause { .. } => "pause",
            PlayerEvent::Play => "play",
            PlayerEvent::Complete => "complete",
            PlayerEvent::Error { .. } => "error",
            PlayerEvent::AdError { .. } => "ad_error",
            PlayerEvent::CuePointFilled { .. } => "cue_point_filled",
            PlayerEvent::AdPodFetch { .. } => "ad_pod_fetch",
            PlayerEvent::AdPodFetchSuccess { .. } => "ad_pod_fetch_success",
            PlayerEvent::AdPodFetchError { .. } => "ad_pod_fetch_error",
            PlayerEvent::AdPodEmpty { .. } => "ad_pod_empty",
            PlayerEvent::AdPlayerSetup => "ad_player_setup",
            PlayerEvent::AdStart => "ad_start",
            PlayerEvent::AdStall => "ad_stall",
            PlayerEvent::AdComplete => "ad_complete",
            PlayerEvent::AdPodComplete => "ad_pod_complete",
            PlayerEvent::BufferStart { .. } => "buffer_start",
            PlayerEvent::BufferEnd { .. } => "buffer_end",
            PlayerEvent::StartLoad { .. } => "start_load",
            PlayerEvent::FirstFrameViewed { .. } => "first_frame_viewed",
            PlayerEvent::CurrentTimeProgressed { .. } => "current_time_progressed",
            PlayerEvent::CanPlay => "can_play",
            PlayerEvent::FragLoaded { .. } => "frag_loaded",
            PlayerEvent::FragLoadError { .. } => "frag_load_error",
            PlayerEvent::PlayInterrupted => "play_interrupted",
            PlayerEvent::AdInterrupted => "ad_interrupted",
            PlayerEvent::Visibility { .. } => "visibility",
            PlayerEvent::FeedbackSubmitted => "feedback_submitted",
        }
    }
}

/// Source of player events
pub trait PlayerFeed {
    /// Register a handler; it stays attached until the subscription is disposed
    fn subscribe(&self, handler: Box<dyn FnMut(&PlayerEvent) + Send>) -> Subscription;
}

type Listener<T> = Arc<Mutex<Box<dyn FnMut(&T) + Send>>>;

struct EmitterInner<T> {
    next_id: u64,
    listeners: Vec<(u64, Listener<T>)>,
}

/// Synchronous multi-listener event emitter
pub struct Emitter<T> {
    inner: Arc<Mutex<EmitterInner<T>>>,
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EmitterInner {
                next_id: 0,
                listeners: Vec::new(),
            })),
        }
    }

    /// Attach a listener
    pub fn on(&self, listener: impl FnMut(&T) + Send + 'static) -> Subscription {
        self.on_boxed(Box::new(listener))
    }

    fn on_boxed(&self, listener: Box<dyn FnMut(&T) + Send>) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(Mutex::new(listener))));

        let weak: Weak<Mutex<EmitterInner<T>>> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.retain(|(lid, _)| *lid != id);
            }
        })
    }

    /// Deliver `event` to every attached listener.
    ///
    /// Listeners may emit or detach re-entrantly. A listener that is already
    /// running further up the stack is skipped for the nested emission.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<(u64, Listener<T>)> = self.inner.lock().listeners.clone();
        for (id, listener) in snapshot {
            let attached = self.inner.lock().listeners.iter().any(|(lid, _)| *lid == id);
            if !attached {
                continue;
            }
            match listener.try_lock() {
                Some(mut callback) => callback(event),
                None => trace!(listener = id, "Skipping re-entrant listener"),
            }
        }
    }

    /// Number of attached listeners
    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerFeed for Emitter<PlayerEvent> {
    fn subscribe(&self, handler: Box<dyn FnMut(&PlayerEvent) + Send>) -> Subscription {
        self.on_boxed(handler)
    }
}

/// Disposer returned by every attach call
#[must_use = "dropping a subscription detaches the listener"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// Detach now
    pub fn dispose(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}
