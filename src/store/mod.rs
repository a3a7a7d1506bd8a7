pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use uuid::Uuid;
use crate::errors::Result;
use crate::metadata::{NewPlaylist, Play, Playlist, PlaylistDetails, Track};

/// Persistence layer consumed by the download core, search and playlists.
///
/// Writers for the same identifier may race; implementations must make
/// `upsert_track` and `insert_track_if_absent` safe under that.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Inserts or updates a track by id. Keeps the downloaded flag and any
    /// already known source url when the new row has none.
    async fn upsert_track(&self, track: &Track) -> Result<()>;

    /// Inserts a track unless its id exists. Returns whether it was inserted.
    async fn insert_track_if_absent(&self, track: &Track) -> Result<bool>;

    async fn get_track(&self, track_id: &str) -> Result<Option<Track>>;

    /// Source url recorded by a previous resolution.
    async fn source_url(&self, track_id: &str) -> Result<Option<String>>;

    async fn mark_downloaded(&self, track_id: &str) -> Result<()>;

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    async fn lyrics(&self, track_id: &str) -> Result<Option<String>>;

    async fn list_playlists(&self) -> Result<Vec<Playlist>>;

    async fn create_playlist(&self, playlist: NewPlaylist) -> Result<Playlist>;

    async fn delete_playlist(&self, playlist_id: Uuid) -> Result<()>;

    async fn get_playlist(&self, playlist_id: Uuid) -> Result<PlaylistDetails>;

    /// Fails when either the playlist or the track row does not exist.
    async fn add_track_to_playlist(&self, playlist_id: Uuid, track_id: &str) -> Result<()>;

    async fn remove_track_from_playlist(&self, playlist_id: Uuid, track_id: &str) -> Result<()>;

    /// Playlist members whose downloaded flag is not set.
    async fn undownloaded_tracks(&self, playlist_id: Uuid) -> Result<Vec<Track>>;

    /// Stores a play of an existing track stamped with the current time.
    async fn record_play(&self, track_id: &str) -> Result<Uuid>;

    /// Marks a recorded play as skipped at `skipped_at` seconds.
    async fn record_skip(&self, play_id: Uuid, skipped_at: i32) -> Result<()>;

    async fn get_play(&self, play_id: Uuid) -> Result<Option<Play>>;
}
