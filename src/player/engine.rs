//! Playback state machine
//!
//! A selection classifies the target, then either plays it directly or runs
//! an adaptive-streaming session. Network and media errors are recovered in
//! place a bounded number of times per session. Everything else, including
//! exhausted retries and a refused play, falls back once to direct playback
//! before the session fails.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::classification::{is_direct_media, EngineError, ErrorClass};
use super::session::{EngineEvent, MediaSink, PlaybackSession, SessionGuard, StreamingEngine};
use super::state::{PlaybackState, Transition};
use crate::config::PlaybackConfig;
use crate::errors::{PlaybackError, PlaybackResult};
use crate::services::stream_fetcher::StreamFetcher;

/// Whether the event loop should keep consuming engine events
enum Flow {
    Continue,
    /// The session left adaptive streaming (direct playback is running)
    Done,
}

fn lock_slot(slot: &Mutex<CancellationToken>) -> MutexGuard<'_, CancellationToken> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Classify the target with a HEAD request; failure to classify means "not direct"
async fn is_direct_target(fetcher: &dyn StreamFetcher, budget: Duration, url: &str) -> bool {
    match tokio::time::timeout(budget, fetcher.head(url)).await {
        Ok(Ok(response)) => {
            let mime = response.mime_type();
            debug!("{} has content type {:?}", url, mime);
            is_direct_media(mime.as_deref())
        }
        Ok(Err(e)) => {
            debug!("Could not determine content type of {}: {}", url, e);
            false
        }
        Err(_) => {
            debug!("Content type check for {} timed out", url);
            false
        }
    }
}

/// Cancels whatever `select` or `drive` call is in flight on the engine it
/// was taken from
#[derive(Clone)]
pub struct StopHandle {
    slot: Arc<Mutex<CancellationToken>>,
}

impl StopHandle {
    pub fn stop(&self) {
        lock_slot(&self.slot).cancel();
    }
}

pub struct PlaybackEngine {
    fetcher: Arc<dyn StreamFetcher>,
    streaming: Arc<dyn StreamingEngine>,
    sink: Box<dyn MediaSink>,
    config: PlaybackConfig,
    session: Option<PlaybackSession>,
    history: Vec<Transition>,
    stop_slot: Arc<Mutex<CancellationToken>>,
    state_tx: watch::Sender<PlaybackState>,
}

impl PlaybackEngine {
    pub fn new(
        fetcher: Arc<dyn StreamFetcher>,
        streaming: Arc<dyn StreamingEngine>,
        sink: Box<dyn MediaSink>,
        config: PlaybackConfig,
    ) -> Self {
        Self {
            fetcher,
            streaming,
            sink,
            config,
            session: None,
            history: Vec::new(),
            stop_slot: Arc::new(Mutex::new(CancellationToken::new())),
            state_tx: watch::channel(PlaybackState::Idle).0,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub fn current_url(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.target_url.as_str())
    }

    /// State history since the last selection, including its stop
    pub fn transitions(&self) -> &[Transition] {
        &self.history
    }

    /// Follow state changes without borrowing the engine
    pub fn watch_state(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            slot: Arc::clone(&self.stop_slot),
        }
    }

    /// Tear down the current session, if any, and return to `Idle`
    pub fn stop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        let from = session.state;

        // A failed session already released the engine and reset the sink
        if from != PlaybackState::Failed {
            self.sink.pause();
        }
        session.release_engine();
        if from != PlaybackState::Failed {
            self.sink.reset();
        }

        if from != PlaybackState::Idle {
            self.history.push(Transition::new(from, PlaybackState::Idle));
        }
        self.state_tx.send_replace(PlaybackState::Idle);
        info!("Stopped playback session {} (was {})", session.id, from);
    }

    /// Replace any active session with a new one for `url`. Resolves once the
    /// session is playing or has failed.
    pub async fn select(&mut self, url: &str) -> PlaybackResult<()> {
        self.stop();
        let token = self.arm();
        info!("Selected stream {}", url);

        let result = tokio::select! {
            _ = token.cancelled() => Err(PlaybackError::Cancelled),
            result = self.run_selection(url) => result,
        };
        self.settle(result)
    }

    /// Consume engine events for the playing session: recover, fall back or
    /// fail. Returns once the session no longer depends on the streaming
    /// engine.
    pub async fn drive(&mut self) -> PlaybackResult<()> {
        match self.session.as_ref() {
            None => return Err(PlaybackError::NoActiveSession),
            Some(session) if session.state == PlaybackState::Failed => {
                return Err(session
                    .last_error
                    .clone()
                    .unwrap_or(PlaybackError::NoActiveSession));
            }
            Some(_) => {}
        }

        let token = self.arm();
        let result = tokio::select! {
            _ = token.cancelled() => Err(PlaybackError::Cancelled),
            result = self.pump(false) => result,
        };
        self.settle(result)
    }

    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *lock_slot(&self.stop_slot) = token.clone();
        token
    }

    fn settle(&mut self, result: PlaybackResult<()>) -> PlaybackResult<()> {
        if let Err(PlaybackError::Cancelled) = result {
            info!("Playback cancelled");
            self.stop();
        }
        result
    }

    async fn run_selection(&mut self, url: &str) -> PlaybackResult<()> {
        self.history.clear();
        self.session = Some(PlaybackSession::new(url));
        self.transition(PlaybackState::ProbingType);

        let direct =
            is_direct_target(self.fetcher.as_ref(), self.config.classify_timeout, url).await;
        if direct {
            return self.fallback_direct("direct media container").await;
        }
        if !self.streaming.is_supported() {
            debug!("Adaptive streaming unavailable, playing {} directly", url);
            return self.fallback_direct("adaptive streaming unavailable").await;
        }

        self.start_streaming(url);
        self.pump(true).await
    }

    fn start_streaming(&mut self, url: &str) {
        self.transition(PlaybackState::StreamingHls);

        let mut handle = self.streaming.create_session(&self.config.buffer);
        handle.load_source(url);
        handle.attach_media(self.sink.as_mut());
        if let Some(session) = self.session.as_mut() {
            session.attach_engine(SessionGuard::new(handle));
        }
    }

    async fn pump(&mut self, until_playing: bool) -> PlaybackResult<()> {
        loop {
            if until_playing && self.state() == PlaybackState::Playing {
                return Ok(());
            }

            let event = match self.session.as_mut().and_then(|s| s.engine_mut()) {
                Some(engine) => engine.next_event().await,
                None => return Ok(()),
            };

            let flow = match event {
                Some(EngineEvent::ManifestParsed) | Some(EngineEvent::FragmentBuffered) => {
                    if self.state() == PlaybackState::StreamingHls {
                        self.start_playback().await?
                    } else {
                        Flow::Continue
                    }
                }
                Some(EngineEvent::Error(engine_error)) => {
                    self.handle_engine_error(engine_error).await?
                }
                None => {
                    warn!("Streaming engine stopped reporting events");
                    self.record_error(PlaybackError::Fatal {
                        details: "engine event stream ended".to_string(),
                    });
                    self.fallback_direct("engine event stream ended").await?;
                    Flow::Done
                }
            };

            if let Flow::Done = flow {
                return Ok(());
            }
        }
    }

    async fn start_playback(&mut self) -> PlaybackResult<Flow> {
        match self.sink.play().await {
            Ok(()) => {
                self.transition(PlaybackState::Playing);
                if let Some(session) = self.session.as_ref() {
                    info!("Playing {} (session {})", session.target_url, session.id);
                }
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!("Play was refused ({}), trying direct playback", e);
                self.record_error(e);
                self.fallback_direct("play refused").await?;
                Ok(Flow::Done)
            }
        }
    }

    async fn handle_engine_error(&mut self, engine_error: EngineError) -> PlaybackResult<Flow> {
        if !engine_error.fatal {
            debug!("Ignoring non-fatal engine error: {}", engine_error);
            return Ok(Flow::Continue);
        }

        let class = self
            .session
            .as_mut()
            .and_then(|s| s.engine_mut())
            .map(|engine| engine.classify(&engine_error))
            .unwrap_or(ErrorClass::Other);
        self.record_error(engine_error.to_playback_error(class));

        match class {
            ErrorClass::Network => self.recover(class, &engine_error).await,
            ErrorClass::Media => self.recover(class, &engine_error).await,
            ErrorClass::Other => {
                warn!("Unrecoverable engine error: {}", engine_error);
                self.fallback_direct("unclassified fatal error").await?;
                Ok(Flow::Done)
            }
        }
    }

    /// In-place recovery for network and media errors, bounded per session
    async fn recover(&mut self, class: ErrorClass, engine_error: &EngineError) -> PlaybackResult<Flow> {
        let (limit, recovering) = match class {
            ErrorClass::Media => (self.config.max_media_retries, PlaybackState::RecoveringMedia),
            _ => (
                self.config.max_network_retries,
                PlaybackState::RecoveringNetwork,
            ),
        };

        let attempt = match self.session.as_mut() {
            Some(session) => {
                let counter = match class {
                    ErrorClass::Media => &mut session.media_retries,
                    _ => &mut session.network_retries,
                };
                if *counter >= limit {
                    None
                } else {
                    *counter += 1;
                    Some(*counter)
                }
            }
            None => return Ok(Flow::Done),
        };

        let Some(attempt) = attempt else {
            warn!(
                "Recovery budget exhausted after {} attempts ({}), trying direct playback",
                limit, engine_error
            );
            self.fallback_direct("recovery attempts exhausted").await?;
            return Ok(Flow::Done);
        };

        self.transition(recovering);
        warn!(
            "Recovering from {} (attempt {}/{})",
            engine_error, attempt, limit
        );
        if let Some(engine) = self.session.as_mut().and_then(|s| s.engine_mut()) {
            match class {
                ErrorClass::Media => engine.recover_media_error(),
                _ => engine.start_load(),
            }
        }
        self.transition(PlaybackState::StreamingHls);
        Ok(Flow::Continue)
    }

    /// Assign the target directly on the sink. The last chance before the
    /// session fails.
    async fn fallback_direct(&mut self, reason: &str) -> PlaybackResult<()> {
        self.transition(PlaybackState::FallbackDirect);

        let Some(url) = self.session.as_mut().map(|s| {
            s.release_engine();
            s.target_url.clone()
        }) else {
            return Err(PlaybackError::NoActiveSession);
        };
        info!("Trying direct playback of {} ({})", url, reason);

        self.sink.set_source(&url);
        match self.sink.play().await {
            Ok(()) => {
                self.transition(PlaybackState::Playing);
                info!("Direct playback started for {}", url);
                Ok(())
            }
            Err(e) => {
                let terminal = PlaybackError::Terminal {
                    url: url.clone(),
                    reason: e.to_string(),
                };
                error!("Playback failed for {}: {}", url, e);
                self.record_error(terminal.clone());
                self.transition(PlaybackState::Failed);
                self.sink.pause();
                self.sink.reset();
                Err(terminal)
            }
        }
    }

    fn record_error(&mut self, error: PlaybackError) {
        if let Some(session) = self.session.as_mut() {
            session.last_error = Some(error);
        }
    }

    fn transition(&mut self, to: PlaybackState) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let from = session.state;
        if from == to {
            return;
        }
        session.state = to;
        debug!("Session {}: {} -> {}", session.id, from, to);
        self.history.push(Transition::new(from, to));
        self.state_tx.send_replace(to);
    }
}
