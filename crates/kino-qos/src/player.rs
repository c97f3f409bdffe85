//! Player collaborators
//!
//! The media engine, the playback controls and the modal UI live outside this
//! crate. The session manager talks to them only through these traits.

use crate::classify::ErrorRecord;
use crate::metrics::FragDownloadStats;
use crate::types::{ReadyState, TimeRange};
use crate::Result;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Synchronous getters on the player
pub trait PlayerIntrospection: Send + Sync {
    /// Current playhead (s)
    fn position(&self) -> f64;

    /// Media duration (s), if known
    fn duration(&self) -> Option<f64>;

    /// Buffered ranges of the active source
    fn buffered_range(&self) -> Vec<TimeRange>;

    /// Buffered ranges of the video source buffer
    fn video_range(&self) -> Vec<TimeRange>;

    /// Buffered ranges of the audio source buffer
    fn audio_range(&self) -> Vec<TimeRange>;

    /// The streaming engine reports a stall
    fn is_buffering(&self) -> bool;

    /// The media element is paused
    fn is_paused(&self) -> bool;

    /// An ad is on screen
    fn is_ad(&self) -> bool;

    fn is_completed(&self) -> bool;

    /// CDN host serving the content
    fn cdn(&self) -> Option<String>;

    /// Engine name and version
    fn sdk_info(&self) -> Option<String>;

    /// Cumulative fragment counters; `None` while no engine is attached
    fn frag_download_stats(&self) -> Option<FragDownloadStats>;

    /// `readyState` of the current media element
    fn ready_state(&self) -> ReadyState;
}

/// Actions the recovery policy can request
pub trait PlaybackController: Send {
    /// Pause playback; may fail on a crashed engine
    fn pause(&mut self) -> Result<()>;

    /// Re-navigate with a fresh token, resuming at `resume_position`
    fn refetch_content(&mut self, resume_position: f64) -> Result<()>;

    /// An alternate resource is available
    fn has_fallback(&self) -> bool;

    /// Swap to the alternate resource; completion arrives as player events
    fn load_fallback(&mut self) -> Result<()>;

    /// Re-issue the current source at `position`
    fn reload(&mut self, position: f64) -> Result<()>;

    /// Let the streaming engine recover on its own; true on success
    fn try_engine_recovery(&mut self, error: &ErrorRecord) -> bool;
}

/// User-facing modal kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModalType {
    SetupError,
    FatalError,
    DrmError,
    HdcpError,
    AdError,
}

impl std::fmt::Display for ModalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModalType::SetupError => "SETUP_ERROR",
            ModalType::FatalError => "FATAL_ERROR",
            ModalType::DrmError => "DRM_ERROR",
            ModalType::HdcpError => "HDCP_ERROR",
            ModalType::AdError => "AD_ERROR",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModalPayload {
    pub error: ErrorRecord,
    pub error_code: String,
    pub position: f64,
}

/// UI modal callback
pub trait ModalPresenter: Send {
    fn show_modal(&mut self, modal: ModalType, payload: ModalPayload);
}

/// Plain player state, usable as an introspection source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerSnapshot {
    pub position: f64,
    pub duration: Option<f64>,
    pub buffered: Vec<TimeRange>,
    pub video: Vec<TimeRange>,
    pub audio: Vec<TimeRange>,
    pub buffering: bool,
    pub paused: bool,
    pub ad: bool,
    pub completed: bool,
    pub cdn: Option<String>,
    pub sdk_info: Option<String>,
    pub frag_stats: Option<FragDownloadStats>,
    pub ready_state: ReadyState,
}

impl PlayerSnapshot {
    /// Read every getter once
    pub fn capture(player: &dyn PlayerIntrospection) -> Self {
        Self {
            position: player.position(),
            duration: player.duration(),
            buffered: player.buffered_range(),
            video: player.video_range(),
            audio: player.audio_range(),
            buffering: player.is_buffering(),
            paused: player.is_paused(),
            ad: player.is_ad(),
            completed: player.is_completed(),
            cdn: player.cdn(),
            sdk_info: player.sdk_info(),
            frag_stats: player.frag_download_stats(),
            ready_state: player.ready_state(),
        }
    }
}

impl PlayerIntrospection for PlayerSnapshot {
    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }

    fn buffered_range(&self) -> Vec<TimeRange> {
        self.buffered.clone()
    }

    fn video_range(&self) -> Vec<TimeRange> {
        self.video.clone()
    }

    fn audio_range(&self) -> Vec<TimeRange> {
        self.audio.clone()
    }

    fn is_buffering(&self) -> bool {
        self.buffering
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_ad(&self) -> bool {
        self.ad
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn cdn(&self) -> Option<String> {
        self.cdn.clone()
    }

    fn sdk_info(&self) -> Option<String> {
        self.sdk_info.clone()
    }

    fn frag_download_stats(&self) -> Option<FragDownloadStats> {
        self.frag_stats
    }

    fn ready_state(&self) -> ReadyState {
        self.ready_state
    }
}

/// Snapshot shared with whoever drives the player state
pub type SharedPlayerSnapshot = Arc<Mutex<PlayerSnapshot>>;

impl PlayerIntrospection for SharedPlayerSnapshot {
    fn position(&self) -> f64 {
        self.lock().position
    }

    fn duration(&self) -> Option<f64> {
        self.lock().duration
    }

    fn buffered_range(&self) -> Vec<TimeRange> {
        self.lock().buffered.clone()
    }

    fn video_range(&self) -> Vec<TimeRange> {
        self.lock().video.clone()
    }

    fn audio_range(&self) -> Vec<TimeRange> {
        self.lock().audio.clone()
    }

    fn is_buffering(&self) -> bool {
        self.lock().buffering
    }

    fn is_paused(&self) -> bool {
        self.lock().paused
    }

    fn is_ad(&self) -> bool {
        self.lock().ad
    }

    fn is_completed(&self) -> bool {
        self.lock().completed
    }

    fn cdn(&self) -> Option<String> {
        self.lock().cdn.clone()
    }

    fn sdk_info(&self) -> Option<String> {
        self.lock().sdk_info.clone()
    }

    fn frag_download_stats(&self) -> Option<FragDownloadStats> {
        self.lock().frag_stats
    }

    fn ready_state(&self) -> ReadyState {
        self.lock().ready_state
    }
}
