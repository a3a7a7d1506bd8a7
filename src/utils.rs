use std::path::{Path, PathBuf};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;
use url::Url;
use crate::errors::{AppError, Result};
use log::info;

const TRACK_LINK_PREFIX: &str = "https://open.spotify.com/track/";

/// Sanitizes a filename by removing invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' | '.' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

/// Location of the audio file for a track. Presence of this file is what
/// "already downloaded" means.
pub fn track_file_path(storage_path: &Path, track_id: &str, extension: &str) -> PathBuf {
    storage_path.join(format!("{}.{}", sanitize_filename(track_id), extension))
}

/// Canonical single-track link for an identifier.
pub fn track_link(track_id: &str) -> String {
    format!("{}{}", TRACK_LINK_PREFIX, track_id)
}

/// Extracts the track identifier from a direct single-track link, ignoring
/// query strings such as `?si=...`.
pub fn parse_track_link(reference: &str) -> Option<String> {
    let pattern = Regex::new(r"^https?://open\.spotify\.com/(?:intl-[a-z]+/)?track/([A-Za-z0-9]+)").ok()?;
    pattern
        .captures(reference.trim())
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_string())
}

/// Extracts the playlist identifier from an `open.spotify.com/playlist/<id>` url.
pub fn parse_playlist_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| AppError::InvalidInput(format!("invalid playlist url: {}", e)))?;

    if url.host_str() != Some("open.spotify.com") {
        return Err(AppError::InvalidInput("playlist url must point to open.spotify.com".to_string()));
    }

    let mut segments = url
        .path_segments()
        .ok_or_else(|| AppError::InvalidInput("playlist url has no path".to_string()))?;

    match (segments.next(), segments.next()) {
        (Some("playlist"), Some(id)) if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()) => {
            Ok(id.to_string())
        }
        _ => Err(AppError::InvalidInput("not a playlist url".to_string())),
    }
}

/// Creates a directory if it doesn't exist
pub async fn ensure_dir_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        tokio::fs::create_dir_all(path).await?;
        info!("Created directory: {:?}", path);
    }
    Ok(())
}

/// Lowercases and strips combining marks so "Beyoncé" and "beyonce" compare equal.
pub fn fold_text(text: &str) -> String {
    text.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Unique token for scratch files shared by concurrent resolutions.
pub fn generate_scratch_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
