//! Capabilities the playback engine drives, and the per-selection session
//! record that owns the streaming engine handle.

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::classification::{classify_engine_error, EngineError, ErrorClass};
use super::state::PlaybackState;
use super::BufferPolicy;
use crate::errors::{PlaybackError, PlaybackResult};

/// Events an adaptive-streaming session reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Manifest loaded and parsed; playback may start
    ManifestParsed,
    /// Media was appended to the sink's buffer
    FragmentBuffered,
    Error(EngineError),
}

/// Factory for adaptive-streaming sessions
pub trait StreamingEngine: Send + Sync {
    /// Whether adaptive streaming is available at all; when it is not every
    /// selection goes straight to direct playback
    fn is_supported(&self) -> bool {
        true
    }

    fn create_session(&self, policy: &BufferPolicy) -> Box<dyn StreamingSession>;
}

/// One adaptive-streaming client session
#[async_trait]
pub trait StreamingSession: Send {
    fn load_source(&mut self, url: &str);

    fn attach_media(&mut self, sink: &mut dyn MediaSink);

    /// Restart segment loading without tearing the session down
    fn start_load(&mut self);

    /// In-place decoder recovery
    fn recover_media_error(&mut self);

    /// Release every engine resource; called exactly once
    fn destroy(&mut self);

    /// Next engine event; `None` once the engine has stopped reporting
    async fn next_event(&mut self) -> Option<EngineEvent>;

    /// Map an engine error report into an [`ErrorClass`]
    fn classify(&self, error: &EngineError) -> ErrorClass {
        classify_engine_error(error)
    }
}

/// The playback surface
#[async_trait]
pub trait MediaSink: Send {
    /// Assign a source directly, dropping whatever was buffered
    fn set_source(&mut self, url: &str);

    /// Start playback; an error means the surface refused to play
    async fn play(&mut self) -> PlaybackResult<()>;

    fn pause(&mut self);

    /// Detach the source and drop buffered media
    fn reset(&mut self);
}

/// Exclusive owner of a streaming session; destroys it exactly once, at the
/// latest when dropped
pub struct SessionGuard {
    inner: Option<Box<dyn StreamingSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn StreamingSession>) -> Self {
        Self {
            inner: Some(session),
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut (dyn StreamingSession + 'static)> {
        self.inner.as_deref_mut()
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Destroy the session now. Returns false if it was already released.
    pub fn release(&mut self) -> bool {
        match self.inner.take() {
            Some(mut session) => {
                session.destroy();
                true
            }
            None => false,
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// One playback attempt, from selection until stop, replacement or failure
pub struct PlaybackSession {
    pub id: Uuid,
    pub target_url: String,
    pub state: PlaybackState,
    engine_handle: Option<SessionGuard>,
    pub network_retries: u32,
    pub media_retries: u32,
    pub last_error: Option<PlaybackError>,
}

impl PlaybackSession {
    pub fn new<S: Into<String>>(target_url: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            state: PlaybackState::Idle,
            engine_handle: None,
            network_retries: 0,
            media_retries: 0,
            last_error: None,
        }
    }

    pub fn attach_engine(&mut self, guard: SessionGuard) {
        self.release_engine();
        self.engine_handle = Some(guard);
    }

    pub fn engine_mut(&mut self) -> Option<&mut (dyn StreamingSession + 'static)> {
        self.engine_handle
            .as_mut()
            .and_then(|guard| guard.session_mut())
    }

    pub fn has_engine(&self) -> bool {
        self.engine_handle
            .as_ref()
            .is_some_and(|guard| !guard.is_released())
    }

    /// Destroy the streaming session, if any. Safe to call repeatedly.
    pub fn release_engine(&mut self) -> bool {
        let released = self
            .engine_handle
            .take()
            .map(|mut guard| guard.release())
            .unwrap_or(false);
        if released {
            debug!("Released streaming engine for session {}", self.id);
        }
        released
    }
}
