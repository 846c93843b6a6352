//! Default values for every config section. The `default_*` functions in
//! the parent module hand these to serde.

use std::time::Duration;

// Liveness prober defaults
pub const DEFAULT_PROBE_BATCH_SIZE: usize = 10;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_PROBE_BATCH_PAUSE: Duration = Duration::from_millis(250);
pub const DEFAULT_PROBE_COOLDOWN: Duration = Duration::from_secs(30);
pub const DEFAULT_USER_AGENT: &str = "m3u-player/0.1";

// Playback defaults
pub const DEFAULT_CLASSIFY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_NETWORK_RETRIES: u32 = 5;
pub const DEFAULT_MAX_MEDIA_RETRIES: u32 = 3;

// Adaptive-streaming buffer defaults
pub const DEFAULT_BACK_BUFFER: Duration = Duration::from_secs(90);
pub const DEFAULT_FORWARD_BUFFER: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FORWARD_BUFFER: Duration = Duration::from_secs(60);
pub const DEFAULT_MAX_BUFFER_BYTES: u64 = 60 * 1000 * 1000; // 60MB
pub const DEFAULT_MAX_BUFFER_HOLE: Duration = Duration::from_millis(500);
pub const DEFAULT_LIVE_SYNC_SEGMENTS: u32 = 3;
pub const DEFAULT_LIVE_MAX_LATENCY_SEGMENTS: u32 = 10;
pub const DEFAULT_LOW_LATENCY_MODE: bool = true;

// Storage defaults
pub const DEFAULT_PLAYLIST_PATH: &str = "./data/playlist.json";

// Playlist update watcher defaults
pub const DEFAULT_SYNC_ENABLED: bool = true;
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);
