//! Kino QoS - Playback Session Quality Tracking for Kino
//!
//! This crate observes a video player and answers two questions about every
//! playback attempt: how good was it, and why did it end.
//! - Session lifecycle stages (ads, startup, steady state, recovery)
//! - Buffering, seek, startup and ad funnel metrics
//! - Error classification and bounded recovery
//! - Exit cause attribution
//! - Telemetry reports and a persisted buffering profile
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Kino QoS                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   PlayerFeed ──events──┐          ┌── PlayerIntrospection       │
//! │                        │          │                             │
//! │                 ┌──────┴──────────┴──┐                          │
//! │                 │   SessionManager   │──── PlaybackController   │
//! │                 └──┬──────┬──────┬───┘──── ModalPresenter       │
//! │                    │      │      │                              │
//! │  ┌─────────────────┴┐ ┌───┴────┐ ┌┴─────────────────┐           │
//! │  │  Stage Machine   │ │Metrics │ │ Classifier +     │           │
//! │  │  (+ observers)   │ │        │ │ Recovery Policy  │           │
//! │  └──────────────────┘ └───┬────┘ └──────────────────┘           │
//! │                           │                                     │
//! │  ┌──────────────┐  ┌──────┴───────┐  ┌──────────────┐           │
//! │  │  Key/Value   │  │    Exit      │  │  Telemetry   │           │
//! │  │    Store     │  │ Attribution  │  │    Sink      │           │
//! │  └──────────────┘  └──────────────┘  └──────────────┘           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod analytics;
pub mod attribution;
pub mod classify;
pub mod clock;
pub mod error;
pub mod events;
pub mod metrics;
pub mod player;
pub mod recovery;
pub mod session;
pub mod stage;
pub mod store;
pub mod types;

pub use analytics::{MemorySink, SessionReport, TelemetryEnvelope, TelemetryRecord, TelemetrySink, TracingSink};
pub use attribution::{ExitAttributionEngine, ExitCause, ExitCauseType};
pub use classify::{ErrorClassifier, ErrorCode, ErrorRecord, ErrorType, RawError, RawErrorKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use events::{Emitter, PlayerEvent, PlayerFeed, Subscription};
pub use metrics::{MetricsReport, PlaybackMetrics};
pub use player::{ModalPresenter, ModalType, PlaybackController, PlayerIntrospection, PlayerSnapshot};
pub use recovery::{RecoveryAction, RecoveryPolicy};
pub use session::{
    attach, spawn_network_sampler, Collaborators, DisplayMode, PlaybackSession, SessionManager,
    SharedSessionManager, StartOptions, StartOutcome,
};
pub use stage::{SessionStageMachine, StageChange, StageEvent};
pub use store::{BufferingProfile, FileStore, KeyValueStore, MemoryStore};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the QoS library
pub fn init() {
    tracing::info!(version = VERSION, "Kino QoS initialized");
}
