use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

/// Name given to entries that carry neither a free-text title nor `tvg-name`
pub const DEFAULT_CHANNEL_NAME: &str = "Canal sem nome";

/// Category given to entries without a `group-title`
pub const DEFAULT_CATEGORY: &str = "geral";

/// Category filter value that matches every channel
pub const ALL_CATEGORIES: &str = "all";

/// Result of the last liveness probe for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Liveness::Unknown => write!(f, "unknown"),
            Liveness::Reachable => write!(f, "reachable"),
            Liveness::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// One parsed playlist entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub id: Uuid,
    pub name: String,
    /// Always lower-case
    pub category: String,
    pub logo_url: Option<String>,
    pub stream_url: String,
    /// Signed duration from the `#EXTINF` line; `-1` conventionally means live
    pub duration_hint: Option<i64>,
    #[serde(default)]
    pub liveness: Liveness,
}

impl ChannelRecord {
    pub fn new<N: Into<String>, U: Into<String>>(name: N, stream_url: U) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            category: DEFAULT_CATEGORY.to_string(),
            logo_url: None,
            stream_url: stream_url.into(),
            duration_hint: None,
            liveness: Liveness::Unknown,
        }
    }

    pub fn with_category<S: AsRef<str>>(mut self, category: S) -> Self {
        self.category = category.as_ref().to_lowercase();
        self
    }

    pub fn with_logo<S: Into<String>>(mut self, logo_url: S) -> Self {
        self.logo_url = Some(logo_url.into());
        self
    }
}

/// Persisted form of a published playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistSnapshot {
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub uploaded_by: Option<String>,
}

impl PlaylistSnapshot {
    pub fn new<S: Into<String>>(content: S, uploaded_by: Option<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: Utc::now(),
            uploaded_by,
        }
    }

    pub fn serialize(&self) -> AppResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(blob: &str) -> AppResult<Self> {
        serde_json::from_str(blob)
            .map_err(|e| AppError::persistence(format!("Invalid playlist snapshot: {e}")))
    }

    pub fn is_newer_than(&self, other: &PlaylistSnapshot) -> bool {
        self.timestamp > other.timestamp
    }
}
