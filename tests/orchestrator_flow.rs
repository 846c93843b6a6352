mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{drain, fixture, fixture_with, fixture_with_fetcher, FakeFetcher, PLAYLIST};
use m3u_player::config::Config;
use m3u_player::errors::{AppError, PlaybackError};
use m3u_player::models::{Liveness, PlaylistSnapshot};
use m3u_player::orchestrator::{CoreEvent, StaticAuthorizer};
use m3u_player::persistence::{MemoryPlaylistStore, PlaylistStore};
use m3u_player::player::PlaybackState;
use uuid::Uuid;

fn admin() -> Arc<StaticAuthorizer> {
    Arc::new(StaticAuthorizer::privileged("admin"))
}

fn viewer() -> Arc<StaticAuthorizer> {
    Arc::new(StaticAuthorizer::viewer())
}

#[tokio::test]
async fn test_publish_loads_probes_and_announces() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let fx = fixture(store.clone(), admin());
    let mut rx = fx.orchestrator.subscribe();

    let count = fx
        .orchestrator
        .publish_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    assert_eq!(count, 4);

    let saved = store.load().await.unwrap().unwrap();
    assert_eq!(saved.uploaded_by.as_deref(), Some("admin"));
    assert_eq!(saved.content, PLAYLIST);

    let catalog = fx.orchestrator.catalog();
    let catalog = catalog.read().await;
    let categories: Vec<_> = catalog.categories().iter().cloned().collect();
    assert_eq!(categories, vec!["geral", "news", "sports"]);
    let summary = catalog.liveness_summary();
    assert_eq!((summary.reachable, summary.unreachable, summary.unknown), (3, 1, 0));

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&CoreEvent::LoadingStarted));
    assert_eq!(events.last(), Some(&CoreEvent::LoadingEnded));
    assert!(events.iter().any(|e| matches!(
        e,
        CoreEvent::PlaylistReplaced { channels, uploaded_by }
            if channels.len() == 4 && uploaded_by.as_deref() == Some("admin")
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, CoreEvent::CategoryListChanged(c) if c.len() == 3)));
}

#[tokio::test]
async fn test_viewer_cannot_publish() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let fx = fixture(store.clone(), viewer());
    let mut rx = fx.orchestrator.subscribe();

    let result = fx.orchestrator.publish_playlist(PLAYLIST.as_bytes()).await;

    assert!(matches!(result, Err(AppError::PermissionDenied { .. })));
    assert_eq!(store.load().await.unwrap(), None);
    assert!(fx.orchestrator.catalog().read().await.is_empty());
    assert!(matches!(drain(&mut rx).as_slice(), [CoreEvent::Error(_)]));
}

#[tokio::test]
async fn test_unreadable_upload_aborts_before_parse() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), admin());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let mut rx = fx.orchestrator.subscribe();

    let result = fx.orchestrator.load_playlist(&[0xc3, 0x28, 0xff]).await;

    assert!(matches!(result, Err(AppError::ContentRead { .. })));
    assert_eq!(fx.orchestrator.catalog().read().await.len(), 4);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 3);
    assert!(matches!(events[1], CoreEvent::Error(_)));
    assert_eq!(events[2], CoreEvent::LoadingEnded);
}

#[tokio::test]
async fn test_probing_can_be_disabled() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let fx = fixture(store, admin());
    let orchestrator = Arc::try_unwrap(fx.orchestrator)
        .ok()
        .unwrap()
        .with_probing(false);

    orchestrator.load_playlist(PLAYLIST.as_bytes()).await.unwrap();
    let catalog = orchestrator.catalog();
    assert!(catalog
        .read()
        .await
        .all()
        .iter()
        .all(|c| c.liveness == Liveness::Unknown));

    assert!(orchestrator.reprobe(true).await.summary().is_some());
    assert_eq!(catalog.read().await.liveness_summary().unknown, 0);
}

#[tokio::test]
async fn test_other_client_picks_up_published_playlist() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let publisher = fixture(store.clone(), admin());
    let follower = fixture(store.clone(), viewer());
    let mut rx = follower.orchestrator.subscribe();

    assert!(!follower.orchestrator.check_for_updates().await.unwrap());

    publisher
        .orchestrator
        .publish_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    assert!(!publisher.orchestrator.check_for_updates().await.unwrap());

    assert!(follower.orchestrator.check_for_updates().await.unwrap());
    assert!(!follower.orchestrator.check_for_updates().await.unwrap());
    assert_eq!(follower.orchestrator.catalog().read().await.len(), 4);
    assert!(drain(&mut rx).iter().any(|e| matches!(
        e,
        CoreEvent::PlaylistReplaced { uploaded_by, .. } if uploaded_by.as_deref() == Some("admin")
    )));
}

#[tokio::test(start_paused = true)]
async fn test_update_watcher_reloads_periodically() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let follower = fixture(store.clone(), viewer());
    let mut rx = follower.orchestrator.subscribe();
    let watcher = follower
        .orchestrator
        .spawn_update_watcher(Duration::from_secs(10));

    store
        .save(&PlaylistSnapshot::new(PLAYLIST, Some("remote".to_string())))
        .await
        .unwrap();

    let replaced = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if let Ok(CoreEvent::PlaylistReplaced { uploaded_by, .. }) = rx.recv().await {
                return uploaded_by;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(replaced.as_deref(), Some("remote"));

    watcher.shutdown().await;
}

#[tokio::test]
async fn test_sync_follows_config() {
    let mut config = Config::default();
    config.sync.enabled = false;
    let disabled = fixture_with(&config, Arc::new(MemoryPlaylistStore::new()), viewer());
    assert!(disabled.orchestrator.start_sync().is_none());

    let enabled = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    let watcher = enabled.orchestrator.start_sync().unwrap();
    watcher.shutdown().await;
}

#[tokio::test]
async fn test_restore_loads_saved_playlist() {
    let store = Arc::new(MemoryPlaylistStore::new());
    let fx = fixture(store.clone(), viewer());
    assert_eq!(fx.orchestrator.restore().await.unwrap(), None);

    store
        .save(&PlaylistSnapshot::new(PLAYLIST, None))
        .await
        .unwrap();
    assert_eq!(fx.orchestrator.restore().await.unwrap(), Some(4));
    assert!(!fx.orchestrator.check_for_updates().await.unwrap());
}

#[tokio::test]
async fn test_play_channel_and_switch() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let mut rx = fx.orchestrator.subscribe();

    let (hls, film) = {
        let catalog = fx.orchestrator.catalog();
        let catalog = catalog.read().await;
        (catalog.all()[0].clone(), catalog.all()[2].clone())
    };

    fx.orchestrator.play_channel(hls.id).await.unwrap();
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Playing);
    assert_eq!(fx.engine.created.load(Ordering::SeqCst), 1);
    assert!(drain(&mut rx).contains(&CoreEvent::ChannelInfoChanged(hls.clone())));

    // The background event loop holds the player; switching must still work
    fx.orchestrator.play_channel(film.id).await.unwrap();
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Playing);
    assert_eq!(fx.engine.destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(
        fx.sink.sources.lock().unwrap().as_slice(),
        [film.stream_url.clone()]
    );

    fx.orchestrator.stop_playback().await;
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Idle);
}

#[tokio::test]
async fn test_select_category_announces_list() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let mut rx = fx.orchestrator.subscribe();

    let news = fx.orchestrator.select_category("news").await;
    let names: Vec<_> = news.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["News One", "Dead Channel"]);
    assert_eq!(drain(&mut rx), vec![CoreEvent::ChannelListChanged(news)]);

    assert_eq!(fx.orchestrator.select_category("all").await.len(), 4);
    assert!(fx.orchestrator.select_category("movies").await.is_empty());
}

#[tokio::test]
async fn test_watch_playback_sees_selection() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let mut state = fx.orchestrator.watch_playback();
    assert_eq!(*state.borrow_and_update(), PlaybackState::Idle);

    let id = fx.orchestrator.catalog().read().await.all()[1].id;
    fx.orchestrator.play_channel(id).await.unwrap();

    assert!(state.has_changed().unwrap());
    assert_eq!(*state.borrow_and_update(), PlaybackState::Playing);
}

#[tokio::test]
async fn test_switching_while_buffering_is_not_an_error() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let (first, second) = {
        let catalog = fx.orchestrator.catalog();
        let catalog = catalog.read().await;
        (catalog.all()[0].id, catalog.all()[1].id)
    };
    fx.engine.stalled.store(1, Ordering::SeqCst);
    let mut rx = fx.orchestrator.subscribe();
    let mut state = fx.orchestrator.watch_playback();

    let pending = {
        let orchestrator = Arc::clone(&fx.orchestrator);
        tokio::spawn(async move { orchestrator.play_channel(first).await })
    };
    state
        .wait_for(|s| *s == PlaybackState::StreamingHls)
        .await
        .unwrap();

    fx.orchestrator.play_channel(second).await.unwrap();

    assert!(matches!(
        pending.await.unwrap(),
        Err(AppError::Playback(PlaybackError::Cancelled))
    ));
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Playing);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, CoreEvent::Error(_))));
}

#[tokio::test]
async fn test_stop_while_buffering_is_not_an_error() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();
    let id = fx.orchestrator.catalog().read().await.all()[0].id;
    fx.engine.stalled.store(1, Ordering::SeqCst);
    let mut rx = fx.orchestrator.subscribe();
    let mut state = fx.orchestrator.watch_playback();

    let pending = {
        let orchestrator = Arc::clone(&fx.orchestrator);
        tokio::spawn(async move { orchestrator.play_channel(id).await })
    };
    state
        .wait_for(|s| *s == PlaybackState::StreamingHls)
        .await
        .unwrap();
    fx.orchestrator.stop_playback().await;

    assert!(pending.await.unwrap().is_err());
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Idle);
    assert!(!drain(&mut rx)
        .iter()
        .any(|e| matches!(e, CoreEvent::Error(_))));
}

#[tokio::test(start_paused = true)]
async fn test_reload_during_reprobe_gets_probed() {
    let fx = fixture_with_fetcher(
        &Config::default(),
        Arc::new(FakeFetcher::with_latency(Duration::from_millis(500))),
        Arc::new(MemoryPlaylistStore::new()),
        viewer(),
    );
    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();

    let reprobe = {
        let orchestrator = Arc::clone(&fx.orchestrator);
        tokio::spawn(async move { orchestrator.reprobe(true).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.orchestrator.prober().is_running());

    fx.orchestrator
        .load_playlist(PLAYLIST.as_bytes())
        .await
        .unwrap();

    assert!(reprobe.await.unwrap().summary().is_some());
    let summary = fx.orchestrator.catalog().read().await.liveness_summary();
    assert_eq!((summary.reachable, summary.unreachable, summary.unknown), (3, 1, 0));
}

#[tokio::test]
async fn test_local_load_is_not_replaced_by_older_snapshot() {
    let store = Arc::new(MemoryPlaylistStore::new());
    store
        .save(&PlaylistSnapshot::new(PLAYLIST, Some("earlier".to_string())))
        .await
        .unwrap();
    let fx = fixture(store, viewer());

    let local = "#EXTM3U\n#EXTINF:-1,Local\nhttp://streams.example.com/local.m3u8\n";
    fx.orchestrator.load_playlist(local.as_bytes()).await.unwrap();

    assert!(!fx.orchestrator.check_for_updates().await.unwrap());
    let catalog = fx.orchestrator.catalog();
    let catalog = catalog.read().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.all()[0].name, "Local");
}

#[tokio::test]
async fn test_play_unknown_channel() {
    let fx = fixture(Arc::new(MemoryPlaylistStore::new()), viewer());
    let mut rx = fx.orchestrator.subscribe();

    let result = fx.orchestrator.play_channel(Uuid::new_v4()).await;

    assert!(matches!(result, Err(AppError::ChannelNotFound { .. })));
    assert!(matches!(drain(&mut rx).as_slice(), [CoreEvent::Error(_)]));
    assert_eq!(fx.orchestrator.playback_state(), PlaybackState::Idle);
}
