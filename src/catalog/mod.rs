pub mod spotify;
pub mod token;

pub use spotify::SpotifyCatalog;

use async_trait::async_trait;
use crate::errors::Result;
use crate::metadata::Track;

/// A playlist as listed by the remote catalog, with every page of tracks.
#[derive(Debug, Clone, Default)]
pub struct RemotePlaylist {
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub tracks: Vec<Track>,
}

/// Remote music catalog used for search fallback and playlist import.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    async fn playlist(&self, playlist_id: &str) -> Result<RemotePlaylist>;
}
