//! M3U playlist parser
//!
//! Turns `#EXTINF` playlists into [`ChannelRecord`]s. Parsing never fails:
//! entries that cannot be completed are dropped one by one and the rest of the
//! playlist is kept.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::models::{ChannelRecord, Liveness, DEFAULT_CATEGORY, DEFAULT_CHANNEL_NAME};

const EXTINF_PREFIX: &str = "#EXTINF:";
const HEADER_PREFIX: &str = "#EXTM3U";
const UTF8_BOM: &str = "\u{feff}";

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(-?\d+)").expect("duration pattern is valid"))
}

fn attribute_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"([A-Za-z0-9][A-Za-z0-9_-]*)="([^"]*)""#).expect("attribute pattern is valid")
    })
}

/// Metadata collected from an `#EXTINF` line, waiting for its URL line
#[derive(Debug, Default)]
struct PendingEntry {
    line_number: usize,
    duration: Option<i64>,
    title: Option<String>,
    tvg_name: Option<String>,
    tvg_logo: Option<String>,
    group_title: Option<String>,
}

impl PendingEntry {
    fn from_extinf(info: &str, line_number: usize) -> Self {
        let (header, title) = split_title(info);

        let mut entry = PendingEntry {
            line_number,
            duration: duration_regex()
                .captures(header)
                .and_then(|caps| caps[1].parse().ok()),
            title: title
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
            ..Default::default()
        };

        for caps in attribute_regex().captures_iter(header) {
            let value = &caps[2];
            if value.is_empty() {
                continue;
            }
            // Keys are case-sensitive
            match &caps[1] {
                "tvg-name" => entry.tvg_name = Some(value.to_string()),
                "tvg-logo" => entry.tvg_logo = Some(value.to_string()),
                "group-title" => entry.group_title = Some(value.to_string()),
                _ => {}
            }
        }

        entry
    }

    fn into_record(self, stream_url: &str) -> ChannelRecord {
        let name = self
            .tvg_name
            .or(self.title)
            .unwrap_or_else(|| DEFAULT_CHANNEL_NAME.to_string());
        let category = self
            .group_title
            .map(|g| g.to_lowercase())
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

        ChannelRecord {
            id: Uuid::new_v4(),
            name,
            category,
            logo_url: self.tvg_logo,
            stream_url: stream_url.to_string(),
            duration_hint: self.duration,
            liveness: Liveness::Unknown,
        }
    }
}

/// Split the text after `#EXTINF:` at the first comma that is not inside a
/// quoted attribute value. Returns the duration/attribute part and the title.
fn split_title(info: &str) -> (&str, Option<&str>) {
    let mut in_quotes = false;
    for (idx, ch) in info.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return (&info[..idx], Some(&info[idx + 1..])),
            _ => {}
        }
    }
    (info, None)
}

/// Parse M3U content and extract channels in playlist order
pub fn parse_m3u(content: &str) -> Vec<ChannelRecord> {
    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut skipped = 0usize;

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        let line_number = index + 1;

        if let Some(info) = line.strip_prefix(EXTINF_PREFIX) {
            if let Some(dropped) = pending.replace(PendingEntry::from_extinf(info, line_number)) {
                trace!(
                    "Skipping entry at line {}: next #EXTINF arrived before a URL",
                    dropped.line_number
                );
                skipped += 1;
            }
        } else if !line.is_empty() && !line.starts_with('#') {
            match pending.take() {
                Some(entry) => channels.push(entry.into_record(line)),
                None => trace!("Ignoring URL without #EXTINF metadata at line {}", line_number),
            }
        }
    }

    if let Some(dropped) = pending {
        trace!(
            "Skipping entry at line {}: playlist ended before a URL",
            dropped.line_number
        );
        skipped += 1;
    }

    if skipped > 0 {
        debug!("Skipped {} incomplete playlist entries", skipped);
    }
    info!("Parsed {} channels from playlist", channels.len());
    channels
}

/// Render channels back into M3U text that [`parse_m3u`] reads losslessly
/// (apart from ids and liveness)
pub fn serialize_channels(channels: &[ChannelRecord]) -> String {
    let mut out = String::from(HEADER_PREFIX);
    out.push('\n');

    for channel in channels {
        out.push_str(EXTINF_PREFIX);
        out.push_str(&channel.duration_hint.unwrap_or(-1).to_string());
        push_attribute(&mut out, "tvg-name", &channel.name);
        if let Some(logo) = &channel.logo_url {
            push_attribute(&mut out, "tvg-logo", logo);
        }
        push_attribute(&mut out, "group-title", &channel.category);
        out.push(',');
        out.push_str(&channel.name.replace(['\r', '\n'], " "));
        out.push('\n');
        out.push_str(channel.stream_url.trim());
        out.push('\n');
    }

    out
}

fn push_attribute(out: &mut String, key: &str, value: &str) {
    let value = value.replace('"', "'").replace(['\r', '\n'], " ");
    if value.trim().is_empty() {
        return;
    }
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&value);
    out.push('"');
}

/// Validate raw upload bytes as playlist text
///
/// Unreadable input is rejected here so that loading stops before parsing.
pub fn decode_playlist(bytes: &[u8]) -> AppResult<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| AppError::content_read(format!("Playlist is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix(UTF8_BOM).unwrap_or(text);

    if text.trim().is_empty() {
        return Err(AppError::content_read("Playlist is empty"));
    }
    if !text.contains(EXTINF_PREFIX) {
        return Err(AppError::content_read("Content has no #EXTINF entries"));
    }

    Ok(text.to_string())
}

/// Download playlist text over HTTP
pub async fn download_playlist(client: &reqwest::Client, url: &str) -> AppResult<String> {
    info!("Downloading playlist from {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::content_read(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::content_read(format!(
            "HTTP error: {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::content_read(format!("Read failed: {e}")))?;
    debug!("Downloaded {} bytes of playlist content", bytes.len());

    decode_playlist(&bytes)
}
