use std::path::Path;

use tracing::debug;

use crate::errors::{AppError, AppResult};

pub mod m3u_parser;

pub use m3u_parser::{decode_playlist, download_playlist, parse_m3u, serialize_channels};

/// Read a playlist file from disk and validate it as playlist text
pub async fn read_playlist_file<P: AsRef<Path>>(path: P) -> AppResult<String> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AppError::content_read(format!("Cannot read playlist {}: {e}", path.display()))
    })?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    decode_playlist(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_playlist_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.m3u");
        tokio::fs::write(&path, "#EXTM3U\n#EXTINF:-1,One\nhttp://example.com/1\n")
            .await
            .unwrap();

        let text = read_playlist_file(&path).await.unwrap();
        assert_eq!(parse_m3u(&text).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_content_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = read_playlist_file(dir.path().join("absent.m3u")).await;
        assert!(matches!(result, Err(AppError::ContentRead { .. })));
    }
}
