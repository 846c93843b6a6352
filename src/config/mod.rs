use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::errors::{AppError, AppResult};

pub mod defaults;
pub mod duration_serde;

use defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub prober: ProberConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// What a probe that failed at the transport level on both attempts means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbePolicy {
    /// Keep the channel listed as reachable; playback handles real failures
    #[default]
    Lenient,
    /// Mark the channel unreachable
    Strict,
}

/// Liveness prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProberConfig {
    /// Number of probes run concurrently; batches run one after another
    #[serde(default = "default_probe_batch_size")]
    pub batch_size: usize,

    /// Budget for each individual HEAD or GET attempt
    #[serde(default = "default_probe_timeout", with = "duration_serde::duration")]
    pub probe_timeout: Duration,

    /// Pause between two batches
    #[serde(default = "default_probe_batch_pause", with = "duration_serde::duration")]
    pub batch_pause: Duration,

    /// Window after a completed pass during which new passes are skipped
    #[serde(default = "default_probe_cooldown", with = "duration_serde::duration")]
    pub cooldown: Duration,

    #[serde(default)]
    pub policy: ProbePolicy,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Playback engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Budget for the content-type HEAD request made on selection
    #[serde(default = "default_classify_timeout", with = "duration_serde::duration")]
    pub classify_timeout: Duration,

    /// In-place reload attempts per session before falling back
    #[serde(default = "default_max_network_retries")]
    pub max_network_retries: u32,

    /// In-place decoder recovery attempts per session before falling back
    #[serde(default = "default_max_media_retries")]
    pub max_media_retries: u32,

    #[serde(default)]
    pub buffer: BufferConfig,
}

/// Buffering limits handed to every adaptive-streaming session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Media kept behind the playhead
    #[serde(default = "default_back_buffer", with = "duration_serde::duration")]
    pub back_buffer: Duration,

    /// Target forward buffer window
    #[serde(default = "default_forward_buffer", with = "duration_serde::duration")]
    pub forward_buffer: Duration,

    /// Hard cap on the forward buffer window
    #[serde(default = "default_max_forward_buffer", with = "duration_serde::duration")]
    pub max_forward_buffer: Duration,

    /// Maximum buffered bytes (default: 60MB)
    #[serde(default = "default_max_buffer_bytes")]
    pub max_buffer_bytes: u64,

    /// Largest gap the engine may jump over
    #[serde(default = "default_max_buffer_hole", with = "duration_serde::duration")]
    pub max_buffer_hole: Duration,

    /// Distance from the live edge, in target durations
    #[serde(default = "default_live_sync_segments")]
    pub live_sync_segments: u32,

    /// Maximum tolerated latency from the live edge, in target durations
    #[serde(default = "default_live_max_latency_segments")]
    pub live_max_latency_segments: u32,

    #[serde(default = "default_low_latency_mode")]
    pub low_latency_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Where the published playlist snapshot is kept
    #[serde(default = "default_playlist_path")]
    pub playlist_path: PathBuf,
}

/// Periodic check for playlists published by another client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sync_interval", with = "duration_serde::duration")]
    pub interval: Duration,
}

fn default_probe_batch_size() -> usize {
    DEFAULT_PROBE_BATCH_SIZE
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_probe_batch_pause() -> Duration {
    DEFAULT_PROBE_BATCH_PAUSE
}

fn default_probe_cooldown() -> Duration {
    DEFAULT_PROBE_COOLDOWN
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_classify_timeout() -> Duration {
    DEFAULT_CLASSIFY_TIMEOUT
}

fn default_max_network_retries() -> u32 {
    DEFAULT_MAX_NETWORK_RETRIES
}

fn default_max_media_retries() -> u32 {
    DEFAULT_MAX_MEDIA_RETRIES
}

fn default_back_buffer() -> Duration {
    DEFAULT_BACK_BUFFER
}

fn default_forward_buffer() -> Duration {
    DEFAULT_FORWARD_BUFFER
}

fn default_max_forward_buffer() -> Duration {
    DEFAULT_MAX_FORWARD_BUFFER
}

fn default_max_buffer_bytes() -> u64 {
    DEFAULT_MAX_BUFFER_BYTES
}

fn default_max_buffer_hole() -> Duration {
    DEFAULT_MAX_BUFFER_HOLE
}

fn default_live_sync_segments() -> u32 {
    DEFAULT_LIVE_SYNC_SEGMENTS
}

fn default_live_max_latency_segments() -> u32 {
    DEFAULT_LIVE_MAX_LATENCY_SEGMENTS
}

fn default_low_latency_mode() -> bool {
    DEFAULT_LOW_LATENCY_MODE
}

fn default_playlist_path() -> PathBuf {
    PathBuf::from(DEFAULT_PLAYLIST_PATH)
}

fn default_sync_enabled() -> bool {
    DEFAULT_SYNC_ENABLED
}

fn default_sync_interval() -> Duration {
    DEFAULT_SYNC_INTERVAL
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            batch_size: default_probe_batch_size(),
            probe_timeout: default_probe_timeout(),
            batch_pause: default_probe_batch_pause(),
            cooldown: default_probe_cooldown(),
            policy: ProbePolicy::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            classify_timeout: default_classify_timeout(),
            max_network_retries: default_max_network_retries(),
            max_media_retries: default_max_media_retries(),
            buffer: BufferConfig::default(),
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            back_buffer: default_back_buffer(),
            forward_buffer: default_forward_buffer(),
            max_forward_buffer: default_max_forward_buffer(),
            max_buffer_bytes: default_max_buffer_bytes(),
            max_buffer_hole: default_max_buffer_hole(),
            live_sync_segments: default_live_sync_segments(),
            live_max_latency_segments: default_live_max_latency_segments(),
            low_latency_mode: default_low_latency_mode(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            playlist_path: default_playlist_path(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            interval: default_sync_interval(),
        }
    }
}

impl Config {
    /// Load configuration, writing the defaults out first if the file is missing
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> AppResult<Self> {
        let path = config_file.as_ref();
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents).map_err(|e| {
                AppError::configuration(format!("Invalid config file {}: {e}", path.display()))
            })?
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)
                .map_err(|e| AppError::configuration(e.to_string()))?;
            std::fs::write(path, contents)?;
            info!("Created default config file: {}", path.display());
            default_config
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.prober.batch_size == 0 {
            return Err(AppError::configuration("prober.batch_size must be at least 1"));
        }
        if self.prober.probe_timeout.is_zero() {
            return Err(AppError::configuration("prober.probe_timeout must be non-zero"));
        }
        if self.playback.classify_timeout.is_zero() {
            return Err(AppError::configuration(
                "playback.classify_timeout must be non-zero",
            ));
        }
        if self.playback.buffer.forward_buffer > self.playback.buffer.max_forward_buffer {
            return Err(AppError::configuration(
                "playback.buffer.forward_buffer cannot exceed max_forward_buffer",
            ));
        }
        if self.sync.enabled && self.sync.interval.is_zero() {
            return Err(AppError::configuration("sync.interval must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prober.batch_size, 10);
        assert_eq!(config.prober.probe_timeout, Duration::from_secs(5));
        assert_eq!(config.playback.buffer.max_buffer_bytes, 60_000_000);
        assert_eq!(config.prober.policy, ProbePolicy::Lenient);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [prober]
            batch_size = 4
            probe_timeout = "2s"
            policy = "strict"

            [playback]
            max_network_retries = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.prober.batch_size, 4);
        assert_eq!(config.prober.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.prober.policy, ProbePolicy::Strict);
        assert_eq!(config.prober.cooldown, DEFAULT_PROBE_COOLDOWN);
        assert_eq!(config.playback.max_network_retries, 1);
        assert_eq!(config.playback.max_media_retries, DEFAULT_MAX_MEDIA_RETRIES);
        assert_eq!(config.sync.interval, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = Config::default();
        config.prober.batch_size = 0;
        assert!(matches!(
            config.validate(),
            Err(AppError::Configuration { .. })
        ));
    }

    #[test]
    fn test_load_from_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = Config::load_from_file(&path).unwrap();
        assert!(path.exists());

        let reloaded = Config::load_from_file(&path).unwrap();
        assert_eq!(reloaded.prober.batch_size, created.prober.batch_size);
        assert_eq!(reloaded.playback.buffer, created.playback.buffer);
    }
}
