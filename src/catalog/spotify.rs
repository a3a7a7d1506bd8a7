use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metadata::{ReleaseDate, Track};
use super::token::TokenCache;
use super::{Catalog, RemotePlaylist};

const API_BASE: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("musicer/", env!("CARGO_PKG_VERSION"));
/// Largest `limit` the search endpoint accepts.
const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    #[serde(default)]
    items: Vec<SpotifyItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResponse {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    images: Option<Vec<SpotifyImage>>,
}

#[derive(Debug, Deserialize)]
struct PlaylistTracksPage {
    next: Option<String>,
    #[serde(default)]
    items: Vec<PlaylistTrackItem>,
}

#[derive(Debug, Deserialize)]
struct PlaylistTrackItem {
    /// Null for removed or local-only entries.
    track: Option<SpotifyItem>,
}

#[derive(Debug, Deserialize)]
struct SpotifyItem {
    id: Option<String>,
    name: String,
    #[serde(default)]
    popularity: i32,
    #[serde(default)]
    duration_ms: i64,
    album: SpotifyAlbum,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyAlbum {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    release_date: Option<String>,
    #[serde(default)]
    images: Vec<SpotifyImage>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    #[serde(default)]
    id: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyImage {
    url: String,
}

impl SpotifyItem {
    /// `None` for items the library cannot key or attribute.
    fn into_track(self) -> Option<Track> {
        let id = self.id.filter(|id| !id.is_empty())?;
        let primary = self.artists.first()?;
        let artist_id = primary.id.clone().unwrap_or_default();
        let cover_url = self
            .album
            .images
            .into_iter()
            .next()
            .map(|image| image.url)
            .unwrap_or_default();

        Some(Track {
            id,
            name: self.name,
            artists: self.artists.into_iter().map(|artist| artist.name).collect(),
            artist_id,
            album_id: self.album.id.unwrap_or_default(),
            album_name: self.album.name,
            cover_url,
            release_date: self.album.release_date.as_deref().and_then(ReleaseDate::parse),
            popularity: self.popularity,
            duration_secs: (self.duration_ms / 1000) as i32,
            lyrics: None,
            source_url: None,
            downloaded: false,
        })
    }
}

/// [`Catalog`] backed by the Spotify Web API.
pub struct SpotifyCatalog {
    client: Client,
    tokens: TokenCache,
}

impl SpotifyCatalog {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(USER_AGENT);

        if let Some(proxy_url) = &config.proxy {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        let client = builder.build()?;
        let tokens = TokenCache::new(
            client.clone(),
            config.spotify_client_id.clone().unwrap_or_default(),
            config.spotify_client_secret.clone().unwrap_or_default(),
        );

        Ok(Self { client, tokens })
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response> {
        let token = self.tokens.token().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::error!("❌ [CATALOG] GET {} failed with {}: {}", url, status, body);
        if status == StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("{} (make sure it is public and the url is correct)", url)));
        }
        Err(AppError::Catalog(format!("request failed: status {}", status)))
    }
}

fn search_params(query: &str, limit: usize) -> [(&'static str, String); 4] {
    [
        ("q", query.to_string()),
        ("type", "track".to_string()),
        ("limit", limit.clamp(1, MAX_SEARCH_LIMIT).to_string()),
        ("offset", "0".to_string()),
    ]
}

/// Offset of the page after `page`, or `None` when paging is done. An empty
/// page ends paging even if the API still links a next one.
fn next_offset(page: &PlaylistTracksPage, offset: usize) -> Option<usize> {
    if page.next.is_none() || page.items.is_empty() {
        return None;
    }
    Some(offset + page.items.len())
}

#[async_trait]
impl Catalog for SpotifyCatalog {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let url = format!("{}/search", API_BASE);
        let params = search_params(query, limit);

        let data: SearchResponse = self.get(&url, &params).await?.json().await?;
        let tracks: Vec<Track> = data
            .tracks
            .items
            .into_iter()
            .filter_map(SpotifyItem::into_track)
            .collect();

        log::debug!("[CATALOG] '{}' returned {} track(s)", query, tracks.len());
        Ok(tracks)
    }

    async fn playlist(&self, playlist_id: &str) -> Result<RemotePlaylist> {
        let base = format!("{}/playlists/{}", API_BASE, playlist_id);
        let details: PlaylistResponse = self.get(&base, &[]).await?.json().await?;

        let tracks_url = format!("{}/tracks", base);
        let mut tracks = Vec::new();
        let mut offset = 0;
        loop {
            let page: PlaylistTracksPage = self
                .get(&tracks_url, &[("offset", offset.to_string())])
                .await?
                .json()
                .await?;

            let next = next_offset(&page, offset);
            tracks.extend(
                page.items
                    .into_iter()
                    .filter_map(|item| item.track)
                    .filter_map(SpotifyItem::into_track),
            );

            match next {
                Some(next) => offset = next,
                None => break,
            }
        }

        log::info!("📋 [CATALOG] Playlist '{}' has {} track(s)", details.name, tracks.len());
        Ok(RemotePlaylist {
            name: details.name,
            description: details.description.unwrap_or_default(),
            image_url: details
                .images
                .and_then(|images| images.into_iter().next())
                .map(|image| image.url)
                .unwrap_or_default(),
            tracks,
        })
    }
}
