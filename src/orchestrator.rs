//! Wiring between playlist ingestion, the catalog, the liveness prober,
//! persistence and playback. Every user-facing change is announced as a
//! [`CoreEvent`] on a broadcast channel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, watch, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{Config, SyncConfig};
use crate::errors::{AppError, AppResult, PlaybackError};
use crate::ingestor::{decode_playlist, parse_m3u};
use crate::models::{ChannelRecord, PlaylistSnapshot};
use crate::persistence::PlaylistStore;
use crate::player::{MediaSink, PlaybackEngine, PlaybackState, StopHandle, StreamingEngine};
use crate::services::{
    CatalogHandle, ChannelCatalog, LivenessProber, ProbeOutcome, StreamFetcher,
};

const EVENT_CAPACITY: usize = 256;
const PLAYER_LOCK_RETRY: Duration = Duration::from_millis(50);

/// Decides whether the current user may publish playlists
pub trait Authorizer: Send + Sync {
    fn is_privileged(&self) -> bool;

    /// Name recorded as the uploader of published playlists
    fn principal(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct StaticAuthorizer {
    privileged: bool,
    principal: Option<String>,
}

impl StaticAuthorizer {
    pub fn privileged<S: Into<String>>(principal: S) -> Self {
        Self {
            privileged: true,
            principal: Some(principal.into()),
        }
    }

    pub fn viewer() -> Self {
        Self {
            privileged: false,
            principal: None,
        }
    }
}

impl Authorizer for StaticAuthorizer {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn principal(&self) -> Option<String> {
        self.principal.clone()
    }
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    ChannelListChanged(Vec<ChannelRecord>),
    CategoryListChanged(Vec<String>),
    ChannelInfoChanged(ChannelRecord),
    LoadingStarted,
    LoadingEnded,
    /// Transient, user-facing error message
    Error(String),
    /// A newer playlist was published and is now loaded
    PlaylistReplaced {
        channels: Vec<ChannelRecord>,
        uploaded_by: Option<String>,
    },
}

/// Periodic playlist update check running on its own task
pub struct UpdateWatcher {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl UpdateWatcher {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait for the task to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            warn!("Playlist update watcher ended abnormally: {}", e);
        }
    }
}

pub struct Orchestrator {
    catalog: CatalogHandle,
    prober: Arc<LivenessProber>,
    player: Arc<Mutex<PlaybackEngine>>,
    stop_handle: StopHandle,
    state: watch::Receiver<PlaybackState>,
    driver: std::sync::Mutex<Option<CancellationToken>>,
    store: Arc<dyn PlaylistStore>,
    authorizer: Arc<dyn Authorizer>,
    events: broadcast::Sender<CoreEvent>,
    loaded_at: RwLock<Option<DateTime<Utc>>>,
    probe_on_load: bool,
    sync: SyncConfig,
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        fetcher: Arc<dyn StreamFetcher>,
        streaming: Arc<dyn StreamingEngine>,
        sink: Box<dyn MediaSink>,
        store: Arc<dyn PlaylistStore>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Self {
        let prober = Arc::new(LivenessProber::new(
            Arc::clone(&fetcher),
            config.prober.clone(),
        ));
        let player = PlaybackEngine::new(fetcher, streaming, sink, config.playback.clone());
        let stop_handle = player.stop_handle();
        let state = player.watch_state();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            catalog: ChannelCatalog::new().into_handle(),
            prober,
            player: Arc::new(Mutex::new(player)),
            stop_handle,
            state,
            driver: std::sync::Mutex::new(None),
            store,
            authorizer,
            events,
            loaded_at: RwLock::new(None),
            probe_on_load: true,
            sync: config.sync.clone(),
        }
    }

    /// Skip the liveness pass after loading a playlist
    pub fn with_probing(mut self, enabled: bool) -> Self {
        self.probe_on_load = enabled;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.events.subscribe()
    }

    pub fn catalog(&self) -> CatalogHandle {
        Arc::clone(&self.catalog)
    }

    pub fn prober(&self) -> Arc<LivenessProber> {
        Arc::clone(&self.prober)
    }

    /// Load playlist bytes into the catalog without publishing them. Stored
    /// snapshots older than this load no longer replace it.
    pub async fn load_playlist(&self, bytes: &[u8]) -> AppResult<usize> {
        self.emit(CoreEvent::LoadingStarted);
        let result = match decode_playlist(bytes) {
            Ok(content) => {
                let count = self.apply_content(&content).await;
                *self.loaded_at.write().await = Some(Utc::now());
                Ok(count)
            }
            Err(e) => Err(self.report(e)),
        };
        self.emit(CoreEvent::LoadingEnded);
        result
    }

    /// Save playlist bytes as the shared playlist and load them. Requires a
    /// privileged user.
    pub async fn publish_playlist(&self, bytes: &[u8]) -> AppResult<usize> {
        if !self.authorizer.is_privileged() {
            return Err(self.report(AppError::permission_denied("publish playlist")));
        }

        self.emit(CoreEvent::LoadingStarted);
        let result = self.publish_content(bytes).await;
        self.emit(CoreEvent::LoadingEnded);
        result.map_err(|e| self.report(e))
    }

    async fn publish_content(&self, bytes: &[u8]) -> AppResult<usize> {
        let content = decode_playlist(bytes)?;
        let snapshot = PlaylistSnapshot::new(content, self.authorizer.principal());
        self.store.save(&snapshot).await?;

        let count = self.apply_content(&snapshot.content).await;
        *self.loaded_at.write().await = Some(snapshot.timestamp);
        info!(
            "Published playlist with {} channels (by {})",
            count,
            snapshot.uploaded_by.as_deref().unwrap_or("unknown")
        );

        let channels = self.catalog.read().await.all().to_vec();
        self.emit(CoreEvent::PlaylistReplaced {
            channels,
            uploaded_by: snapshot.uploaded_by,
        });
        Ok(count)
    }

    /// Load the stored playlist, if there is one
    pub async fn restore(&self) -> AppResult<Option<usize>> {
        let Some(snapshot) = self.store.load().await.map_err(|e| self.report(e))? else {
            debug!("No stored playlist to restore");
            return Ok(None);
        };

        self.emit(CoreEvent::LoadingStarted);
        let count = self.apply_content(&snapshot.content).await;
        *self.loaded_at.write().await = Some(snapshot.timestamp);
        self.emit(CoreEvent::LoadingEnded);
        info!("Restored playlist saved at {}", snapshot.timestamp);
        Ok(Some(count))
    }

    /// Reload if the store holds a playlist newer than the loaded one.
    /// Returns whether a reload happened.
    pub async fn check_for_updates(&self) -> AppResult<bool> {
        let Some(snapshot) = self.store.load().await? else {
            return Ok(false);
        };
        let loaded_at = *self.loaded_at.read().await;
        if loaded_at.is_some_and(|at| snapshot.timestamp <= at) {
            return Ok(false);
        }

        info!(
            "New playlist detected (saved {} by {})",
            snapshot.timestamp,
            snapshot.uploaded_by.as_deref().unwrap_or("unknown")
        );
        self.apply_content(&snapshot.content).await;
        *self.loaded_at.write().await = Some(snapshot.timestamp);

        let channels = self.catalog.read().await.all().to_vec();
        self.emit(CoreEvent::PlaylistReplaced {
            channels,
            uploaded_by: snapshot.uploaded_by,
        });
        Ok(true)
    }

    /// Start the update watcher with the configured interval, unless syncing
    /// is turned off
    pub fn start_sync(self: &Arc<Self>) -> Option<UpdateWatcher> {
        if !self.sync.enabled {
            debug!("Playlist sync disabled");
            return None;
        }
        Some(self.spawn_update_watcher(self.sync.interval))
    }

    /// Run [`Self::check_for_updates`] every `interval` until cancelled
    pub fn spawn_update_watcher(self: &Arc<Self>, interval: Duration) -> UpdateWatcher {
        let token = CancellationToken::new();
        let task_token = token.clone();
        let orchestrator = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!("Watching for playlist updates every {:?}", interval);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = orchestrator.check_for_updates().await {
                            warn!("Playlist update check failed: {}", e);
                        }
                    }
                }
            }
            info!("Playlist update watcher stopped");
        });

        UpdateWatcher { token, handle }
    }

    /// Channels in `category` (`"all"` for every channel), announced as the
    /// current channel list
    pub async fn select_category(&self, category: &str) -> Vec<ChannelRecord> {
        let channels: Vec<ChannelRecord> = self
            .catalog
            .read()
            .await
            .filter(category)
            .into_iter()
            .cloned()
            .collect();
        self.emit(CoreEvent::ChannelListChanged(channels.clone()));
        channels
    }

    /// Re-run the liveness pass over the loaded catalog
    pub async fn reprobe(&self, force: bool) -> ProbeOutcome {
        let outcome = self.prober.probe_catalog(&self.catalog, force).await;
        if outcome.summary().is_some() {
            let channels = self.catalog.read().await.all().to_vec();
            self.emit(CoreEvent::ChannelListChanged(channels));
        }
        outcome
    }

    /// Start playback of a catalog channel, replacing any current playback.
    /// Once playing, engine events are handled on a background task until the
    /// next selection or stop.
    pub async fn play_channel(&self, id: Uuid) -> AppResult<()> {
        let channel = self.catalog.read().await.by_id(id).cloned();
        let Some(channel) = channel else {
            return Err(self.report(AppError::channel_not_found(id)));
        };

        info!("Playing channel '{}'", channel.name);
        let url = channel.stream_url.clone();
        self.emit(CoreEvent::ChannelInfoChanged(channel));

        let mut player = self.acquire_player().await;
        let result = player.select(&url).await;
        drop(player);

        match result {
            Ok(()) => {
                self.spawn_driver();
                Ok(())
            }
            Err(PlaybackError::Cancelled) => {
                debug!("Selection of '{}' superseded", url);
                Err(AppError::from(PlaybackError::Cancelled))
            }
            Err(e) => Err(self.report(AppError::from(e))),
        }
    }

    pub async fn stop_playback(&self) {
        self.acquire_player().await.stop();
    }

    pub fn playback_state(&self) -> PlaybackState {
        *self.state.borrow()
    }

    /// Follow playback state changes
    pub fn watch_playback(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    /// Take the player, cancelling whatever selection or event loop holds it
    async fn acquire_player(&self) -> MutexGuard<'_, PlaybackEngine> {
        loop {
            self.cancel_driver();
            self.stop_handle.stop();
            match tokio::time::timeout(PLAYER_LOCK_RETRY, self.player.lock()).await {
                Ok(guard) => return guard,
                Err(_) => debug!("Waiting for in-flight playback to release the player"),
            }
        }
    }

    fn cancel_driver(&self) {
        let mut driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(token) = driver.take() {
            token.cancel();
        }
    }

    fn spawn_driver(&self) {
        let token = CancellationToken::new();
        {
            let mut driver = self
                .driver
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(previous) = driver.replace(token.clone()) {
                previous.cancel();
            }
        }

        let player = Arc::clone(&self.player);
        let events = self.events.clone();
        tokio::spawn(async move {
            let mut engine = tokio::select! {
                _ = token.cancelled() => return,
                guard = player.lock() => guard,
            };
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = engine.drive() => result,
            };

            match result {
                Ok(()) => debug!("Playback left adaptive streaming"),
                Err(PlaybackError::Cancelled) => {}
                Err(e) => {
                    let err = AppError::from(e);
                    error!("{}", err);
                    let _ = events.send(CoreEvent::Error(err.user_message()));
                }
            }
        });
    }

    async fn apply_content(&self, content: &str) -> usize {
        let channels = parse_m3u(content);
        let count = self.catalog.write().await.load(channels);

        if self.probe_on_load {
            match self
                .prober
                .probe_catalog_after_current(&self.catalog, true)
                .await
            {
                ProbeOutcome::Completed(summary) => debug!(
                    "Probed {} channels, {} unreachable",
                    summary.probed, summary.unreachable
                ),
                other => debug!("Liveness pass after load: {:?}", other),
            }
        }

        let (categories, channels) = {
            let catalog = self.catalog.read().await;
            (
                catalog.categories().iter().cloned().collect(),
                catalog.all().to_vec(),
            )
        };
        self.emit(CoreEvent::CategoryListChanged(categories));
        self.emit(CoreEvent::ChannelListChanged(channels));
        count
    }

    fn emit(&self, event: CoreEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn report(&self, err: AppError) -> AppError {
        error!("{}", err);
        self.emit(CoreEvent::Error(err.user_message()));
        err
    }
}
