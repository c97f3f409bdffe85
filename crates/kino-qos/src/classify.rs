//! Error classification
//!
//! Maps heterogeneous raw error payloads from the streaming engine, the native
//! media element, the DRM layer and the ad pipeline into one
//! `(ErrorType, ErrorCode)` pair. Predicates run in a fixed order and the first
//! match wins.

use crate::types::Track;
use serde::{Deserialize, Serialize};

/// Coarse category reported by the emitter of the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RawErrorKind {
    Network,
    Media,
    KeySystem,
    Mux,
    Setup,
    #[default]
    Other,
}

/// Component that raised the error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// Streaming engine extension (MSE based segment loader)
    Engine,
    /// Native media element
    Native,
    /// Encrypted media extensions
    Drm,
    Ads,
    #[default]
    Player,
}

/// HTTP response attached to network errors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    #[serde(default)]
    pub url: Option<String>,
}

/// Error payload as emitted by the player
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawError {
    pub kind: RawErrorKind,
    /// Engine detail string, e.g. `fragLoadError`
    pub details: String,
    pub message: String,
    /// DOMException name, e.g. `AbortError`
    pub name: Option<String>,
    /// `MediaError.code` of the native element (1-4)
    pub native_code: Option<u16>,
    pub fatal: bool,
    pub source: ErrorSource,
    pub response: Option<ErrorResponse>,
    pub reason: Option<String>,
}

impl RawError {
    pub fn new(kind: RawErrorKind, details: impl Into<String>) -> Self {
        Self {
            kind,
            details: details.into(),
            ..Default::default()
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn from_source(mut self, source: ErrorSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_native_code(mut self, code: u16) -> Self {
        self.native_code = Some(code);
        self
    }

    fn name_is(&self, name: &str) -> bool {
        self.name.as_deref() == Some(name)
    }

    fn mentions(&self, needle: &str) -> bool {
        self.details.to_ascii_lowercase().contains(needle) || self.message.to_ascii_lowercase().contains(needle)
    }
}

pub const MEDIA_ERR_ABORTED: u16 = 1;
pub const MEDIA_ERR_NETWORK: u16 = 2;
pub const MEDIA_ERR_DECODE: u16 = 3;
pub const MEDIA_ERR_SRC_NOT_SUPPORTED: u16 = 4;

/// Unified error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    SetupError,
    NetworkError,
    MediaError,
    DrmError,
    OtherError,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorType::SetupError => "SETUP_ERROR",
            ErrorType::NetworkError => "NETWORK_ERROR",
            ErrorType::MediaError => "MEDIA_ERROR",
            ErrorType::DrmError => "DRM_ERROR",
            ErrorType::OtherError => "OTHER_ERROR",
        };
        f.write_str(name)
    }
}

/// Unified error code, refined within an [`ErrorType`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // DRM
    HdcpOutputRestricted,
    KeySystemNoKeys,
    KeySystemLicenseFailed,
    KeySystemAccessDenied,
    KeySystemSessionFailed,
    // Media
    DecodeError,
    CodecUnsupported,
    SrcNotSupported,
    InvalidCharacter,
    BufferAppendError,
    BufferAddCodecError,
    BufferStalled,
    StartupStall,
    // Network
    TokenExpired,
    ManifestLoadError,
    ManifestLoadTimeout,
    ManifestParsingError,
    LevelLoadError,
    FragLoadError,
    FragLoadTimeout,
    KeyLoadError,
    NetworkOffline,
    // Setup
    SetupFailed,
    // Other
    Aborted,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::HdcpOutputRestricted => "HDCP_OUTPUT_RESTRICTED",
            ErrorCode::KeySystemNoKeys => "KEY_SYSTEM_NO_KEYS",
            ErrorCode::KeySystemLicenseFailed => "KEY_SYSTEM_LICENSE_FAILED",
            ErrorCode::KeySystemAccessDenied => "KEY_SYSTEM_ACCESS_DENIED",
            ErrorCode::KeySystemSessionFailed => "KEY_SYSTEM_SESSION_FAILED",
            ErrorCode::DecodeError => "DECODE_ERROR",
            ErrorCode::CodecUnsupported => "CODEC_UNSUPPORTED",
            ErrorCode::SrcNotSupported => "SRC_NOT_SUPPORTED",
            ErrorCode::InvalidCharacter => "INVALID_CHARACTER",
            ErrorCode::BufferAppendError => "BUFFER_APPEND_ERROR",
            ErrorCode::BufferAddCodecError => "BUFFER_ADD_CODEC_ERROR",
            ErrorCode::BufferStalled => "BUFFER_STALLED",
            ErrorCode::StartupStall => "STARTUP_STALL",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::ManifestLoadError => "MANIFEST_LOAD_ERROR",
            ErrorCode::ManifestLoadTimeout => "MANIFEST_LOAD_TIMEOUT",
            ErrorCode::ManifestParsingError => "MANIFEST_PARSING_ERROR",
            ErrorCode::LevelLoadError => "LEVEL_LOAD_ERROR",
            ErrorCode::FragLoadError => "FRAG_LOAD_ERROR",
            ErrorCode::FragLoadTimeout => "FRAG_LOAD_TIMEOUT",
            ErrorCode::KeyLoadError => "KEY_LOAD_ERROR",
            ErrorCode::NetworkOffline => "NETWORK_OFFLINE",
            ErrorCode::SetupFailed => "SETUP_FAILED",
            ErrorCode::Aborted => "ABORTED",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }

    pub fn is_codec(&self) -> bool {
        matches!(
            self,
            ErrorCode::CodecUnsupported | ErrorCode::BufferAddCodecError | ErrorCode::SrcNotSupported
        )
    }

    pub fn is_manifest(&self) -> bool {
        matches!(
            self,
            ErrorCode::ManifestLoadError | ErrorCode::ManifestLoadTimeout | ErrorCode::ManifestParsingError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized error retained by the session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_type: ErrorType,
    pub code: ErrorCode,
    pub message: String,
    pub details: String,
    pub fatal: bool,
    pub source: ErrorSource,
    pub reason: Option<String>,
    pub track: Track,
    pub timestamp: i64,
}

type Predicate = fn(&RawError) -> Option<(ErrorType, ErrorCode)>;

fn drm(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    let hdcp = raw.mentions("hdcp") || raw.mentions("output-restricted") || raw.mentions("outputrestricted");
    let drm = raw.kind == RawErrorKind::KeySystem
        || raw.source == ErrorSource::Drm
        || raw.details.starts_with("keySystem")
        || hdcp;
    if !drm {
        return None;
    }
    let code = if hdcp {
        ErrorCode::HdcpOutputRestricted
    } else {
        match raw.details.as_str() {
            "keySystemNoKeys" => ErrorCode::KeySystemNoKeys,
            "keySystemLicenseRequestFailed" | "keySystemServerCertificateRequestFailed" => {
                ErrorCode::KeySystemLicenseFailed
            }
            "keySystemNoAccess" | "keySystemNoConfiguredLicense" => ErrorCode::KeySystemAccessDenied,
            _ => ErrorCode::KeySystemSessionFailed,
        }
    };
    Some((ErrorType::DrmError, code))
}

fn decode(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    let decode = raw.native_code == Some(MEDIA_ERR_DECODE)
        || raw.details == "decodeError"
        || raw.details == "MEDIA_ERR_DECODE"
        || raw.name_is("EncodingError");
    decode.then_some((ErrorType::MediaError, ErrorCode::DecodeError))
}

fn codec_unsupported(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    if raw.name_is("InvalidCharacterError") {
        return Some((ErrorType::MediaError, ErrorCode::InvalidCharacter));
    }
    if raw.native_code == Some(MEDIA_ERR_SRC_NOT_SUPPORTED) || raw.name_is("NotSupportedError") {
        return Some((ErrorType::MediaError, ErrorCode::SrcNotSupported));
    }
    match raw.details.as_str() {
        "bufferAddCodecError" => Some((ErrorType::MediaError, ErrorCode::BufferAddCodecError)),
        "manifestIncompatibleCodecsError" | "codecUnsupported" => {
            Some((ErrorType::MediaError, ErrorCode::CodecUnsupported))
        }
        _ => None,
    }
}

fn token_expired(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    let expired = raw.details == "tokenExpired"
        || (raw.response.as_ref().is_some_and(|r| r.status == 403) && raw.mentions("token"));
    expired.then_some((ErrorType::NetworkError, ErrorCode::TokenExpired))
}

fn network(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    let code = match raw.details.as_str() {
        "manifestLoadError" => ErrorCode::ManifestLoadError,
        "manifestLoadTimeOut" => ErrorCode::ManifestLoadTimeout,
        "manifestParsingError" => ErrorCode::ManifestParsingError,
        "levelLoadError" | "levelLoadTimeOut" => ErrorCode::LevelLoadError,
        "fragLoadError" => ErrorCode::FragLoadError,
        "fragLoadTimeOut" => ErrorCode::FragLoadTimeout,
        "keyLoadError" | "keyLoadTimeOut" => ErrorCode::KeyLoadError,
        "offline" | "networkOffline" => ErrorCode::NetworkOffline,
        _ if raw.kind == RawErrorKind::Network
            || raw.native_code == Some(MEDIA_ERR_NETWORK)
            || raw.response.is_some() =>
        {
            if raw.mentions("timeout") {
                ErrorCode::FragLoadTimeout
            } else {
                ErrorCode::FragLoadError
            }
        }
        _ => return None,
    };
    Some((ErrorType::NetworkError, code))
}

fn setup(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    let setup = raw.kind == RawErrorKind::Setup || raw.details.starts_with("setup");
    setup.then_some((ErrorType::SetupError, ErrorCode::SetupFailed))
}

fn other(raw: &RawError) -> Option<(ErrorType, ErrorCode)> {
    if raw.name_is("AbortError") || raw.native_code == Some(MEDIA_ERR_ABORTED) {
        return Some((ErrorType::OtherError, ErrorCode::Aborted));
    }
    let code = match raw.details.as_str() {
        "bufferAppendError" | "bufferAppendingError" => ErrorCode::BufferAppendError,
        "bufferStalledError" => ErrorCode::BufferStalled,
        "startupStall" => ErrorCode::StartupStall,
        _ => return None,
    };
    Some((ErrorType::MediaError, code))
}

/// Ordered classification predicates
const PREDICATES: &[(&str, Predicate)] = &[
    ("drm", drm),
    ("decode", decode),
    ("codec_unsupported", codec_unsupported),
    ("token_expired", token_expired),
    ("network", network),
    ("setup", setup),
    ("other", other),
];

/// Raw error to unified taxonomy
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, raw: &RawError) -> (ErrorType, ErrorCode) {
        PREDICATES
            .iter()
            .find_map(|(_, predicate)| predicate(raw))
            .unwrap_or((ErrorType::OtherError, ErrorCode::Unknown))
    }

    /// Classify and normalize into a record
    pub fn record(&self, raw: &RawError, track: Track, timestamp: i64) -> ErrorRecord {
        let (error_type, code) = self.classify(raw);
        ErrorRecord {
            error_type,
            code,
            message: raw.message.clone(),
            details: raw.details.clone(),
            fatal: raw.fatal,
            source: raw.source,
            reason: raw.reason.clone(),
            track,
            timestamp,
        }
    }

    /// Errors that are recorded but never escalate
    pub fn is_benign(&self, raw: &RawError) -> bool {
        raw.name_is("AbortError")
            || raw.native_code == Some(MEDIA_ERR_ABORTED)
            || raw.mentions("play() request was interrupted")
    }

    /// Engine buffer-append failures the engine cannot recover from on its own
    pub fn is_unrecoverable_buffer_append(&self, record: &ErrorRecord) -> bool {
        record.source == ErrorSource::Engine
            && matches!(record.code, ErrorCode::BufferAppendError | ErrorCode::BufferAddCodecError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(raw: RawError) -> (ErrorType, ErrorCode) {
        ErrorClassifier::new().classify(&raw)
    }

    #[test]
    fn test_drm_and_hdcp() {
        assert_eq!(
            classify(RawError::new(RawErrorKind::KeySystem, "keySystemNoKeys")),
            (ErrorType::DrmError, ErrorCode::KeySystemNoKeys)
        );
        assert_eq!(
            classify(RawError::new(RawErrorKind::Media, "").with_message("HDCP output restricted")),
            (ErrorType::DrmError, ErrorCode::HdcpOutputRestricted)
        );
    }

    #[test]
    fn test_drm_wins_over_decode() {
        let raw = RawError::new(RawErrorKind::KeySystem, "keySystemLicenseRequestFailed").with_native_code(3);
        assert_eq!(classify(raw), (ErrorType::DrmError, ErrorCode::KeySystemLicenseFailed));
    }

    #[test]
    fn test_media_codes() {
        assert_eq!(
            classify(RawError::default().with_native_code(MEDIA_ERR_DECODE)),
            (ErrorType::MediaError, ErrorCode::DecodeError)
        );
        assert_eq!(
            classify(RawError::default().with_name("NotSupportedError")),
            (ErrorType::MediaError, ErrorCode::SrcNotSupported)
        );
        assert_eq!(
            classify(RawError::default().with_name("InvalidCharacterError")),
            (ErrorType::MediaError, ErrorCode::InvalidCharacter)
        );
        assert_eq!(
            classify(RawError::new(RawErrorKind::Media, "bufferAppendError")),
            (ErrorType::MediaError, ErrorCode::BufferAppendError)
        );
    }

    #[test]
    fn test_token_expired_before_network() {
        let raw = RawError {
            kind: RawErrorKind::Network,
            details: "tokenExpired".into(),
            ..Default::default()
        };
        assert_eq!(classify(raw), (ErrorType::NetworkError, ErrorCode::TokenExpired));

        let raw = RawError {
            kind: RawErrorKind::Network,
            details: "fragLoadError".into(),
            message: "token rejected".into(),
            response: Some(ErrorResponse { status: 403, url: None }),
            ..Default::default()
        };
        assert_eq!(classify(raw), (ErrorType::NetworkError, ErrorCode::TokenExpired));
    }

    #[test]
    fn test_network_codes() {
        assert_eq!(
            classify(RawError::new(RawErrorKind::Network, "manifestLoadTimeOut")),
            (ErrorType::NetworkError, ErrorCode::ManifestLoadTimeout)
        );
        assert_eq!(
            classify(RawError::new(RawErrorKind::Network, "somethingElse")),
            (ErrorType::NetworkError, ErrorCode::FragLoadError)
        );
    }

    #[test]
    fn test_setup_and_default() {
        assert_eq!(
            classify(RawError::new(RawErrorKind::Setup, "")),
            (ErrorType::SetupError, ErrorCode::SetupFailed)
        );
        assert_eq!(classify(RawError::default()), (ErrorType::OtherError, ErrorCode::Unknown));
    }

    #[test]
    fn test_benign_deny_list() {
        let classifier = ErrorClassifier::new();
        assert!(classifier.is_benign(&RawError::default().with_name("AbortError")));
        assert!(classifier.is_benign(&RawError::default().with_native_code(MEDIA_ERR_ABORTED)));
        assert!(classifier.is_benign(
            &RawError::default().with_message("The play() request was interrupted by a call to pause()")
        ));
        assert!(!classifier.is_benign(&RawError::default().with_native_code(MEDIA_ERR_DECODE)));
    }

    #[test]
    fn test_record_keeps_payload() {
        let raw = RawError::new(RawErrorKind::Network, "fragLoadError")
            .fatal()
            .from_source(ErrorSource::Engine)
            .with_message("404");
        let record = ErrorClassifier::new().record(&raw, Track::Content, 42);
        assert!(record.fatal);
        assert_eq!(record.source, ErrorSource::Engine);
        assert_eq!(record.message, "404");
        assert_eq!(record.timestamp, 42);
    }
}
