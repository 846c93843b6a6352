//! Playback of a selected channel on top of an injected adaptive-streaming
//! engine and media sink.

pub mod classification;
pub mod engine;
pub mod session;
pub mod state;

pub use classification::{classify_engine_error, is_direct_media, EngineError, ErrorClass};
pub use engine::{PlaybackEngine, StopHandle};
pub use session::{
    EngineEvent, MediaSink, PlaybackSession, SessionGuard, StreamingEngine, StreamingSession,
};
pub use state::{PlaybackState, Transition};

/// Buffering limits handed to each adaptive-streaming session
pub type BufferPolicy = crate::config::BufferConfig;
