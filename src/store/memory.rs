use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::errors::{AppError, Result};
use crate::metadata::{NewPlaylist, Play, Playlist, PlaylistDetails, Track};
use crate::utils::fold_text;
use super::TrackStore;

#[derive(Debug, Default, Serialize, Deserialize)]
struct LibraryState {
    tracks: HashMap<String, Track>,
    playlists: HashMap<Uuid, PlaylistEntry>,
    #[serde(default)]
    plays: HashMap<Uuid, Play>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlaylistEntry {
    playlist: Playlist,
    track_ids: Vec<String>,
}

/// In-process [`TrackStore`], optionally mirrored to a JSON snapshot file that
/// is rewritten after every mutation.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<RwLock<LibraryState>>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(LibraryState::default())),
            snapshot: None,
        }
    }

    /// Loads the snapshot at `path` if it exists and keeps writing to it.
    pub async fn open(path: PathBuf) -> Result<Self> {
        let state = if tokio::fs::try_exists(&path).await? {
            let contents = tokio::fs::read(&path).await?;
            serde_json::from_slice(&contents)?
        } else {
            LibraryState::default()
        };

        log::info!(
            "Library loaded from {:?}: {} tracks, {} playlists",
            path,
            state.tracks.len(),
            state.playlists.len()
        );

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
            snapshot: Some(path),
        })
    }

    async fn persist(&self, state: &LibraryState) -> Result<()> {
        if let Some(path) = &self.snapshot {
            let contents = serde_json::to_vec(state)?;
            let staging = path.with_extension("json.tmp");
            tokio::fs::write(&staging, contents).await?;
            tokio::fs::rename(&staging, path).await?;
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn merge_track(existing: &mut Track, incoming: &Track) {
    let source_url = incoming.source_url.clone().or_else(|| existing.source_url.take());
    let lyrics = incoming.lyrics.clone().or_else(|| existing.lyrics.take());
    let downloaded = existing.downloaded || incoming.downloaded;
    *existing = Track {
        source_url,
        lyrics,
        downloaded,
        ..incoming.clone()
    };
}

fn matches_query(track: &Track, folded_query: &str) -> bool {
    fold_text(&track.name).contains(folded_query)
        || track.artists.iter().any(|artist| fold_text(artist).contains(folded_query))
}

#[async_trait]
impl TrackStore for MemoryStore {
    async fn upsert_track(&self, track: &Track) -> Result<()> {
        let mut state = self.state.write().await;
        match state.tracks.get_mut(&track.id) {
            Some(existing) => merge_track(existing, track),
            None => {
                state.tracks.insert(track.id.clone(), track.clone());
            }
        }
        self.persist(&state).await
    }

    async fn insert_track_if_absent(&self, track: &Track) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.tracks.contains_key(&track.id) {
            return Ok(false);
        }
        state.tracks.insert(track.id.clone(), track.clone());
        self.persist(&state).await?;
        Ok(true)
    }

    async fn get_track(&self, track_id: &str) -> Result<Option<Track>> {
        Ok(self.state.read().await.tracks.get(track_id).cloned())
    }

    async fn source_url(&self, track_id: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .tracks
            .get(track_id)
            .and_then(|track| track.source_url.clone()))
    }

    async fn mark_downloaded(&self, track_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        match state.tracks.get_mut(track_id) {
            Some(track) => track.downloaded = true,
            None => return Err(AppError::NotFound(format!("track {}", track_id))),
        }
        self.persist(&state).await
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let folded = fold_text(query.trim());
        if folded.is_empty() {
            return Ok(Vec::new());
        }

        let state = self.state.read().await;
        let mut found: Vec<Track> = state
            .tracks
            .values()
            .filter(|track| matches_query(track, &folded))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            b.popularity
                .cmp(&a.popularity)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        found.truncate(limit);
        Ok(found)
    }

    async fn lyrics(&self, track_id: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        let track = state
            .tracks
            .get(track_id)
            .ok_or_else(|| AppError::NotFound(format!("track {}", track_id)))?;
        Ok(track.lyrics.clone())
    }

    async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        let state = self.state.read().await;
        let mut playlists: Vec<Playlist> = state
            .playlists
            .values()
            .map(|entry| entry.playlist.clone())
            .collect();
        playlists.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(playlists)
    }

    async fn create_playlist(&self, playlist: NewPlaylist) -> Result<Playlist> {
        let created = Playlist {
            id: Uuid::new_v4(),
            name: playlist.name,
            description: playlist.description,
            image_url: playlist.image_url,
            created_at: Utc::now(),
        };

        let mut state = self.state.write().await;
        state.playlists.insert(
            created.id,
            PlaylistEntry {
                playlist: created.clone(),
                track_ids: Vec::new(),
            },
        );
        self.persist(&state).await?;
        Ok(created)
    }

    async fn delete_playlist(&self, playlist_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        if state.playlists.remove(&playlist_id).is_none() {
            return Err(AppError::NotFound(format!("playlist {}", playlist_id)));
        }
        self.persist(&state).await
    }

    async fn get_playlist(&self, playlist_id: Uuid) -> Result<PlaylistDetails> {
        let state = self.state.read().await;
        let entry = state
            .playlists
            .get(&playlist_id)
            .ok_or_else(|| AppError::NotFound(format!("playlist {}", playlist_id)))?;

        let tracks = entry
            .track_ids
            .iter()
            .filter_map(|id| state.tracks.get(id).cloned())
            .collect();

        Ok(PlaylistDetails {
            playlist: entry.playlist.clone(),
            tracks,
        })
    }

    async fn add_track_to_playlist(&self, playlist_id: Uuid, track_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.tracks.contains_key(track_id) {
            return Err(AppError::Store(format!(
                "foreign key violation: track {} does not exist",
                track_id
            )));
        }
        let entry = state
            .playlists
            .get_mut(&playlist_id)
            .ok_or_else(|| AppError::NotFound(format!("playlist {}", playlist_id)))?;

        if entry.track_ids.iter().any(|id| id == track_id) {
            return Ok(());
        }
        entry.track_ids.push(track_id.to_string());
        self.persist(&state).await
    }

    async fn remove_track_from_playlist(&self, playlist_id: Uuid, track_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let entry = state
            .playlists
            .get_mut(&playlist_id)
            .ok_or_else(|| AppError::NotFound(format!("playlist {}", playlist_id)))?;
        entry.track_ids.retain(|id| id != track_id);
        self.persist(&state).await
    }

    async fn undownloaded_tracks(&self, playlist_id: Uuid) -> Result<Vec<Track>> {
        let details = self.get_playlist(playlist_id).await?;
        Ok(details
            .tracks
            .into_iter()
            .filter(|track| !track.downloaded)
            .collect())
    }

    async fn record_play(&self, track_id: &str) -> Result<Uuid> {
        let mut state = self.state.write().await;
        if !state.tracks.contains_key(track_id) {
            return Err(AppError::Store(format!(
                "foreign key violation: track {} does not exist",
                track_id
            )));
        }
        let play = Play {
            id: Uuid::new_v4(),
            track_id: track_id.to_string(),
            played_at: Utc::now(),
            skipped_at: None,
        };
        let id = play.id;
        state.plays.insert(id, play);
        self.persist(&state).await?;
        Ok(id)
    }

    async fn record_skip(&self, play_id: Uuid, skipped_at: i32) -> Result<()> {
        let mut state = self.state.write().await;
        let play = state
            .plays
            .get_mut(&play_id)
            .ok_or_else(|| AppError::NotFound(format!("play {}", play_id)))?;
        play.skipped_at = Some(skipped_at);
        self.persist(&state).await
    }

    async fn get_play(&self, play_id: Uuid) -> Result<Option<Play>> {
        Ok(self.state.read().await.plays.get(&play_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, name: &str, popularity: i32) -> Track {
        Track {
            name: name.to_string(),
            artists: vec!["Artist".to_string()],
            popularity,
            ..Track::skeleton(id)
        }
    }

    fn new_playlist(name: &str) -> NewPlaylist {
        NewPlaylist {
            name: name.to_string(),
            description: "desc".to_string(),
            image_url: "https://img".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_downloaded_flag_and_known_source() {
        let store = MemoryStore::new();
        let mut first = track("t1", "Song", 10);
        first.source_url = Some("https://www.youtube.com/watch?v=a".into());
        store.upsert_track(&first).await.unwrap();
        store.mark_downloaded("t1").await.unwrap();

        let refreshed = track("t1", "Song (Remastered)", 20);
        store.upsert_track(&refreshed).await.unwrap();

        let stored = store.get_track("t1").await.unwrap().unwrap();
        assert_eq!(stored.name, "Song (Remastered)");
        assert!(stored.downloaded);
        assert_eq!(stored.source_url.as_deref(), Some("https://www.youtube.com/watch?v=a"));
    }

    #[tokio::test]
    async fn insert_if_absent_ignores_conflicts() {
        let store = MemoryStore::new();
        assert!(store.insert_track_if_absent(&track("t1", "One", 1)).await.unwrap());
        assert!(!store.insert_track_if_absent(&track("t1", "Other", 2)).await.unwrap());
        assert_eq!(store.get_track("t1").await.unwrap().unwrap().name, "One");
    }

    #[tokio::test]
    async fn membership_requires_an_existing_track() {
        let store = MemoryStore::new();
        let playlist = store.create_playlist(new_playlist("Mix")).await.unwrap();

        let err = store.add_track_to_playlist(playlist.id, "ghost").await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));

        store.upsert_track(&track("t1", "One", 1)).await.unwrap();
        store.add_track_to_playlist(playlist.id, "t1").await.unwrap();
        store.add_track_to_playlist(playlist.id, "t1").await.unwrap();

        let details = store.get_playlist(playlist.id).await.unwrap();
        assert_eq!(details.tracks.len(), 1);

        store.remove_track_from_playlist(playlist.id, "t1").await.unwrap();
        assert!(store.get_playlist(playlist.id).await.unwrap().tracks.is_empty());
    }

    #[tokio::test]
    async fn undownloaded_tracks_skip_finished_ones() {
        let store = MemoryStore::new();
        let playlist = store.create_playlist(new_playlist("Mix")).await.unwrap();
        for id in ["a", "b"] {
            store.upsert_track(&track(id, id, 1)).await.unwrap();
            store.add_track_to_playlist(playlist.id, id).await.unwrap();
        }
        store.mark_downloaded("a").await.unwrap();

        let pending = store.undownloaded_tracks(playlist.id).await.unwrap();
        assert_eq!(pending.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn search_matches_names_and_artists_without_diacritics() {
        let store = MemoryStore::new();
        let mut halo = track("t1", "Halo", 80);
        halo.artists = vec!["Beyoncé".to_string()];
        store.upsert_track(&halo).await.unwrap();
        store.upsert_track(&track("t2", "Hallelujah", 60)).await.unwrap();

        let by_artist = store.search_tracks("beyonce", 25).await.unwrap();
        assert_eq!(by_artist.len(), 1);

        let by_name = store.search_tracks("HAL", 1).await.unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, "t1");

        assert!(store.search_tracks("   ", 25).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let store = MemoryStore::open(path.clone()).await.unwrap();
        store.upsert_track(&track("t1", "One", 1)).await.unwrap();
        let playlist = store.create_playlist(new_playlist("Mix")).await.unwrap();
        store.add_track_to_playlist(playlist.id, "t1").await.unwrap();

        let reopened = MemoryStore::open(path).await.unwrap();
        let details = reopened.get_playlist(playlist.id).await.unwrap();
        assert_eq!(details.tracks[0].id, "t1");
    }

    #[tokio::test]
    async fn plays_record_skips_and_reject_unknown_ids() {
        let store = MemoryStore::new();
        assert!(matches!(store.record_play("ghost").await, Err(AppError::Store(_))));

        store.upsert_track(&track("t1", "One", 1)).await.unwrap();
        let play_id = store.record_play("t1").await.unwrap();
        let play = store.get_play(play_id).await.unwrap().unwrap();
        assert_eq!(play.track_id, "t1");
        assert_eq!(play.skipped_at, None);

        store.record_skip(play_id, 42).await.unwrap();
        assert_eq!(store.get_play(play_id).await.unwrap().unwrap().skipped_at, Some(42));

        let err = store.record_skip(Uuid::new_v4(), 3).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn plays_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.json");

        let store = MemoryStore::open(path.clone()).await.unwrap();
        store.upsert_track(&track("t1", "One", 1)).await.unwrap();
        let play_id = store.record_play("t1").await.unwrap();
        store.record_skip(play_id, 7).await.unwrap();

        let reopened = MemoryStore::open(path).await.unwrap();
        let play = reopened.get_play(play_id).await.unwrap().unwrap();
        assert_eq!(play.skipped_at, Some(7));
    }
}
