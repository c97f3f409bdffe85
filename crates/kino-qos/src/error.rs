//! Error types for Kino QoS

use thiserror::Error;

/// Result type alias for QoS operations
pub type Result<T> = std::result::Result<T, Error>;

/// QoS error types
///
/// Playback problems reported by the player are not errors of this crate; they
/// are classified into [`crate::classify::ErrorRecord`]s. This enum only covers
/// failures of the tracking machinery itself and of its collaborators.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Persisted store errors
    #[error("Store key not writable: {key}")]
    StoreWrite { key: String },

    #[error("Invalid buffering profile: {0}")]
    InvalidProfile(String),

    // Collaborator errors
    #[error("Playback controller failed: {0}")]
    Controller(String),

    #[error("Session manager destroyed")]
    Destroyed,

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a controller error
    pub fn controller(msg: impl Into<String>) -> Self {
        Error::Controller(msg.into())
    }

    /// Returns true if retrying the operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Controller(_) | Error::Io(_) | Error::StoreWrite { .. })
    }

    /// Returns the error code for telemetry
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::StoreWrite { .. } => "STORE_WRITE",
            Error::InvalidProfile(_) => "INVALID_PROFILE",
            Error::Controller(_) => "CONTROLLER",
            Error::Destroyed => "DESTROYED",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Io(_) => "IO",
        }
    }
}
