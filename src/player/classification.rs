//! Adapters from engine error reports and HTTP content types into the closed
//! sets the playback state machine works with.

use serde::{Deserialize, Serialize};

use crate::errors::PlaybackError;

/// Content types the media sink plays without an adaptive-streaming session
pub const DIRECT_MEDIA_TYPES: &[&str] = &[
    "video/mp4",
    "video/webm",
    "video/ogg",
    "audio/mpeg",
    "audio/mp4",
];

const NETWORK_KIND: &str = "networkError";
const MEDIA_KIND: &str = "mediaError";

const NETWORK_DETAILS: &[&str] = &[
    "manifestLoadError",
    "manifestLoadTimeOut",
    "levelLoadError",
    "levelLoadTimeOut",
    "audioTrackLoadError",
    "audioTrackLoadTimeOut",
    "fragLoadError",
    "fragLoadTimeOut",
    "keyLoadError",
    "keyLoadTimeOut",
    "internalException",
];

const MEDIA_DETAILS: &[&str] = &[
    "manifestIncompatibleCodecsError",
    "fragParsingError",
    "fragDecryptError",
    "bufferAddCodecError",
    "bufferAppendError",
    "bufferAppendingError",
    "bufferStalledError",
    "bufferFullError",
    "bufferNudgeOnStall",
];

/// Closed classification of engine errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    Network,
    Media,
    Other,
}

/// Error report as emitted by an adaptive-streaming engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineError {
    /// Engine error type tag (`networkError`, `mediaError`, ...)
    pub kind: String,
    /// Engine detail code (`fragLoadError`, ...)
    pub details: String,
    pub fatal: bool,
}

impl EngineError {
    pub fn new<K: Into<String>, D: Into<String>>(kind: K, details: D, fatal: bool) -> Self {
        Self {
            kind: kind.into(),
            details: details.into(),
            fatal,
        }
    }

    pub fn fatal<K: Into<String>, D: Into<String>>(kind: K, details: D) -> Self {
        Self::new(kind, details, true)
    }

    pub fn to_playback_error(&self, class: ErrorClass) -> PlaybackError {
        let details = format!("{}: {}", self.kind, self.details);
        match class {
            ErrorClass::Network => PlaybackError::Network { details },
            ErrorClass::Media => PlaybackError::Media { details },
            ErrorClass::Other => PlaybackError::Fatal { details },
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}){}",
            self.kind,
            self.details,
            if self.fatal { " [fatal]" } else { "" }
        )
    }
}

/// Default mapping for hls.js-style error tags. The type tag wins; detail
/// codes are consulted only when the tag is unrecognised.
pub fn classify_engine_error(error: &EngineError) -> ErrorClass {
    match error.kind.as_str() {
        NETWORK_KIND => ErrorClass::Network,
        MEDIA_KIND => ErrorClass::Media,
        _ if NETWORK_DETAILS.contains(&error.details.as_str()) => ErrorClass::Network,
        _ if MEDIA_DETAILS.contains(&error.details.as_str()) => ErrorClass::Media,
        _ => ErrorClass::Other,
    }
}

/// Whether a `Content-Type` value names a directly playable container
pub fn is_direct_media(mime_type: Option<&str>) -> bool {
    mime_type
        .map(|mime| {
            let mime = mime.split(';').next().unwrap_or_default().trim();
            DIRECT_MEDIA_TYPES
                .iter()
                .any(|direct| mime.eq_ignore_ascii_case(direct))
        })
        .unwrap_or(false)
}
