//! Error type definitions for the channel player core
//!
//! Errors are split by the layer that produces them. Parse- and probe-level
//! failures are handled locally and never reach callers; playback failures
//! propagate only after in-place recovery and the direct-playback fallback
//! have both been exhausted.

use thiserror::Error;

/// Top-level application error type
///
/// Every error surfaced to a caller (and through it, to the user as a
/// transient notification) is one of these variants.
#[derive(Error, Debug)]
pub enum AppError {
    /// Playlist source text could not be read or is not a playlist at all.
    /// Loading is aborted before parsing starts.
    #[error("Content read error: {message}")]
    ContentRead { message: String },

    /// A selection referenced a channel id absent from the catalog
    #[error("Channel not found: {id}")]
    ChannelNotFound { id: String },

    /// Permission denied errors
    #[error("Permission denied: {action}")]
    PermissionDenied { action: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Playlist snapshot storage errors
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Playback failed after recovery and fallback
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON snapshot encoding errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Liveness probe failures
///
/// These never leave the prober: the probe policy turns each of them into a
/// liveness value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Probe timed out after {timeout_ms}ms: {url}")]
    Timeout { url: String, timeout_ms: u64 },

    #[error("Probe transport failure: {message}")]
    Transport { message: String },

    #[error("Probe answered with HTTP {status}")]
    Status { status: u16 },
}

/// Playback failures, classified by the engine error adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    /// Network-class engine error (recoverable in place)
    #[error("Network error: {details}")]
    Network { details: String },

    /// Media/decoder-class engine error (recoverable in place)
    #[error("Media error: {details}")]
    Media { details: String },

    /// Unclassified fatal engine error (triggers the direct fallback)
    #[error("Fatal playback error: {details}")]
    Fatal { details: String },

    /// The direct-playback fallback failed; the session is over
    #[error("Playback failed for {url}: {reason}")]
    Terminal { url: String, reason: String },

    /// The session was stopped while a transition was in flight
    #[error("Playback cancelled")]
    Cancelled,

    /// `drive` was called with no session attached
    #[error("No active playback session")]
    NoActiveSession,
}

/// Convenience methods for creating common error types
impl AppError {
    /// Create a content read error
    pub fn content_read<S: Into<String>>(message: S) -> Self {
        Self::ContentRead {
            message: message.into(),
        }
    }

    /// Create a channel not found error
    pub fn channel_not_found<S: ToString>(id: S) -> Self {
        Self::ChannelNotFound { id: id.to_string() }
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(action: S) -> Self {
        Self::PermissionDenied {
            action: action.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(message: S) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Short message suitable for an auto-dismissing user notification
    pub fn user_message(&self) -> String {
        match self {
            Self::ContentRead { .. } => {
                "Could not read the playlist. Check that the file is a valid M3U playlist.".to_string()
            }
            Self::ChannelNotFound { .. } => "Channel not found.".to_string(),
            Self::PermissionDenied { .. } => {
                "You do not have permission to publish playlists.".to_string()
            }
            Self::Playback(_) => {
                "Could not play this channel. Please try another channel.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl PlaybackError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Media { .. })
    }
}
