#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use m3u_player::config::Config;
use m3u_player::errors::{PlaybackResult, ProbeError, ProbeResult};
use m3u_player::orchestrator::{Authorizer, CoreEvent, Orchestrator};
use m3u_player::persistence::PlaylistStore;
use m3u_player::player::{
    BufferPolicy, EngineEvent, MediaSink, StreamingEngine, StreamingSession,
};
use m3u_player::services::{FetchResponse, StreamFetcher};
use tokio::sync::broadcast;

pub const PLAYLIST: &str = r#"#EXTM3U
#EXTINF:-1 tvg-name="News One" tvg-logo="http://img.example.com/news.png" group-title="News",News 1
http://streams.example.com/news/index.m3u8
#EXTINF:-1 group-title="Sports",Arena
http://streams.example.com/arena/index.m3u8
#EXTINF:3600,Feature Film
http://streams.example.com/films/feature.mp4
#EXTINF:-1 group-title="News",Dead Channel
http://dead.example.com/gone.m3u8
"#;

/// Answers HEAD/GET from the URL: `dead.` hosts return 404, `.mp4` targets
/// are MP4 files, everything else is an HLS manifest
#[derive(Default)]
pub struct FakeFetcher {
    pub calls: AtomicUsize,
    pub latency: Option<Duration>,
}

impl FakeFetcher {
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }
}

#[async_trait]
impl StreamFetcher for FakeFetcher {
    async fn head(&self, url: &str) -> ProbeResult<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if url.contains("://dead.") {
            return Ok(FetchResponse::new(404));
        }
        if url.contains("://unroutable.") {
            return Err(ProbeError::Transport {
                message: "connection refused".to_string(),
            });
        }
        let content_type = if url.ends_with(".mp4") {
            "video/mp4"
        } else {
            "application/vnd.apple.mpegurl"
        };
        Ok(FetchResponse::new(200).with_content_type(content_type))
    }

    async fn get(&self, url: &str) -> ProbeResult<FetchResponse> {
        self.head(url).await
    }
}

/// Sessions report a parsed manifest, then stay quiet. The next `stalled`
/// sessions never get past buffering.
#[derive(Default)]
pub struct QuietEngine {
    pub created: AtomicUsize,
    pub destroyed: Arc<AtomicUsize>,
    pub stalled: AtomicUsize,
}

impl StreamingEngine for QuietEngine {
    fn create_session(&self, _policy: &BufferPolicy) -> Box<dyn StreamingSession> {
        self.created.fetch_add(1, Ordering::SeqCst);
        let stalls = self
            .stalled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        Box::new(QuietSession {
            manifest_sent: stalls,
            destroyed: self.destroyed.clone(),
        })
    }
}

struct QuietSession {
    manifest_sent: bool,
    destroyed: Arc<AtomicUsize>,
}

#[async_trait]
impl StreamingSession for QuietSession {
    fn load_source(&mut self, _url: &str) {}
    fn attach_media(&mut self, _sink: &mut dyn MediaSink) {}
    fn start_load(&mut self) {}
    fn recover_media_error(&mut self) {}
    fn destroy(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
    async fn next_event(&mut self) -> Option<EngineEvent> {
        if !self.manifest_sent {
            self.manifest_sent = true;
            return Some(EngineEvent::ManifestParsed);
        }
        std::future::pending().await
    }
}

/// Records the sources assigned to it; play always succeeds
#[derive(Clone, Default)]
pub struct RecordingSink {
    pub sources: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MediaSink for RecordingSink {
    fn set_source(&mut self, url: &str) {
        self.sources.lock().unwrap().push(url.to_string());
    }
    async fn play(&mut self) -> PlaybackResult<()> {
        Ok(())
    }
    fn pause(&mut self) {}
    fn reset(&mut self) {}
}

pub struct Fixture {
    pub orchestrator: Arc<Orchestrator>,
    pub engine: Arc<QuietEngine>,
    pub sink: RecordingSink,
}

pub fn fixture(store: Arc<dyn PlaylistStore>, authorizer: Arc<dyn Authorizer>) -> Fixture {
    fixture_with(&Config::default(), store, authorizer)
}

pub fn fixture_with(
    config: &Config,
    store: Arc<dyn PlaylistStore>,
    authorizer: Arc<dyn Authorizer>,
) -> Fixture {
    fixture_with_fetcher(config, Arc::new(FakeFetcher::default()), store, authorizer)
}

pub fn fixture_with_fetcher(
    config: &Config,
    fetcher: Arc<FakeFetcher>,
    store: Arc<dyn PlaylistStore>,
    authorizer: Arc<dyn Authorizer>,
) -> Fixture {
    let engine = Arc::new(QuietEngine::default());
    let sink = RecordingSink::default();
    let orchestrator = Orchestrator::new(
        config,
        fetcher,
        engine.clone(),
        Box::new(sink.clone()),
        store,
        authorizer,
    );
    Fixture {
        orchestrator: Arc::new(orchestrator),
        engine,
        sink,
    }
}

pub fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
