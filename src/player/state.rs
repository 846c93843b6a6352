use serde::Serialize;

/// Playback state of the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    /// Classifying the target's content type
    ProbingType,
    /// Adaptive-streaming session loading the manifest and segments
    StreamingHls,
    Playing,
    RecoveringNetwork,
    RecoveringMedia,
    /// Direct source assignment on the sink, bypassing the streaming engine
    FallbackDirect,
    Failed,
}

impl PlaybackState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// States in which an adaptive-streaming session is attached and engine
    /// events are meaningful
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            Self::StreamingHls | Self::Playing | Self::RecoveringNetwork | Self::RecoveringMedia
        )
    }
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ProbingType => "probing_type",
            Self::StreamingHls => "streaming_hls",
            Self::Playing => "playing",
            Self::RecoveringNetwork => "recovering_network",
            Self::RecoveringMedia => "recovering_media",
            Self::FallbackDirect => "fallback_direct",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: PlaybackState,
    pub to: PlaybackState,
}

impl Transition {
    pub fn new(from: PlaybackState, to: PlaybackState) -> Self {
        Self { from, to }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
