use std::path::PathBuf;
use std::sync::Arc;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::downloader::{DownloadManager, PlaylistReport};
use crate::errors::{AppError, Result};
use crate::metadata::{NewPlaylist, Play, Playlist, PlaylistDetails, Track};
use crate::search::SearchManager;
use crate::store::TrackStore;
use crate::utils::{parse_playlist_url, track_link};

/// Entry point for everything a front end can ask of the music library.
pub struct Library {
    store: Arc<dyn TrackStore>,
    catalog: Arc<dyn Catalog>,
    downloads: DownloadManager,
    search: SearchManager,
}

fn parse_playlist_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|e| AppError::InvalidInput(format!("invalid playlist id: {}", e)))
}

impl Library {
    pub fn new(
        store: Arc<dyn TrackStore>,
        catalog: Arc<dyn Catalog>,
        downloads: DownloadManager,
        config: &AppConfig,
    ) -> Self {
        let search = SearchManager::new(store.clone(), catalog.clone(), config);
        Self {
            store,
            catalog,
            downloads,
            search,
        }
    }

    pub async fn download(&self, reference: &str, cancel: &CancellationToken) -> Result<String> {
        self.downloads.download(reference, cancel).await
    }

    pub async fn download_if_not_exists(&self, track_ids: &[String], cancel: &CancellationToken) -> Result<()> {
        self.downloads.download_if_not_exists(track_ids, cancel).await
    }

    pub async fn download_playlist(&self, playlist_id: &str, cancel: &CancellationToken) -> Result<PlaylistReport> {
        let id = parse_playlist_id(playlist_id)?;
        self.downloads.download_playlist(id, cancel).await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        self.search.search(query).await
    }

    pub async fn list_playlists(&self) -> Result<Vec<Playlist>> {
        self.store.list_playlists().await
    }

    pub async fn create_playlist(&self, name: &str, description: &str, image_url: &str) -> Result<Playlist> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput("playlist name cannot be empty".to_string()));
        }
        let playlist = self
            .store
            .create_playlist(NewPlaylist {
                name: name.trim().to_string(),
                description: description.to_string(),
                image_url: image_url.to_string(),
            })
            .await?;
        log::info!("📋 [LIBRARY] Created playlist '{}' ({})", playlist.name, playlist.id);
        Ok(playlist)
    }

    pub async fn delete_playlist(&self, playlist_id: &str) -> Result<()> {
        self.store.delete_playlist(parse_playlist_id(playlist_id)?).await
    }

    pub async fn get_playlist(&self, playlist_id: &str) -> Result<PlaylistDetails> {
        self.store.get_playlist(parse_playlist_id(playlist_id)?).await
    }

    /// Adds the track and starts fetching its audio in the background if it
    /// is not on disk yet.
    pub async fn add_track_to_playlist(&self, playlist_id: &str, track_id: &str) -> Result<()> {
        let id = parse_playlist_id(playlist_id)?;
        self.downloads.spawn_download_if_not_exists(vec![track_id.to_string()]);
        self.store.add_track_to_playlist(id, track_id).await
    }

    pub async fn remove_track_from_playlist(&self, playlist_id: &str, track_id: &str) -> Result<()> {
        let id = parse_playlist_id(playlist_id)?;
        self.store.remove_track_from_playlist(id, track_id).await
    }

    pub async fn lyrics(&self, track_id: &str) -> Result<Option<String>> {
        self.store.lyrics(track_id).await
    }

    pub fn path_to_track_file(&self, track_id: &str) -> PathBuf {
        self.downloads.track_path(track_id)
    }

    /// Opens the audio file for `track_id`, downloading it first when the file
    /// is missing from storage.
    pub async fn play(&self, track_id: &str, cancel: &CancellationToken) -> Result<tokio::fs::File> {
        let path = self.path_to_track_file(track_id);
        match tokio::fs::File::open(&path).await {
            Ok(file) => return Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("🎧 [LIBRARY] {} not in storage, downloading again", track_id);
            }
            Err(e) => return Err(e.into()),
        }

        self.downloads.download(&track_link(track_id), cancel).await?;
        Ok(tokio::fs::File::open(&path).await?)
    }

    /// Records that playback of `track_id` started and returns the play id.
    pub async fn record_play(&self, track_id: &str) -> Result<Uuid> {
        let play_id = self.store.record_play(track_id).await?;
        log::debug!("▶️ [LIBRARY] Play {} of {}", play_id, track_id);
        Ok(play_id)
    }

    /// Records that the play `play_id` was skipped `skipped_at` seconds in.
    pub async fn record_skip(&self, play_id: &str, skipped_at: i32) -> Result<Play> {
        if skipped_at < 0 {
            return Err(AppError::InvalidInput("skip position cannot be negative".to_string()));
        }
        let id = Uuid::parse_str(play_id.trim())
            .map_err(|e| AppError::InvalidInput(format!("invalid play id: {}", e)))?;
        self.store.record_skip(id, skipped_at).await?;
        self.store
            .get_play(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("play {}", id)))
    }

    /// Copies a remote playlist into the library and returns the new playlist.
    ///
    /// Accepts a playlist id or an `open.spotify.com/playlist/...` url. Every
    /// track is stored before it becomes a member; tracks that cannot be
    /// resolved are stored with the catalog's metadata instead.
    pub async fn import(&self, remote_playlist: &str, cancel: &CancellationToken) -> Result<Playlist> {
        let remote_id = if remote_playlist.trim().starts_with("http") {
            parse_playlist_url(remote_playlist)?
        } else {
            remote_playlist.trim().to_string()
        };
        if remote_id.is_empty() {
            return Err(AppError::InvalidInput("empty playlist id".to_string()));
        }

        let remote = self.catalog.playlist(&remote_id).await?;
        let playlist = self
            .store
            .create_playlist(NewPlaylist {
                name: remote.name,
                description: remote.description,
                image_url: remote.image_url,
            })
            .await?;
        log::info!(
            "📥 [LIBRARY] Importing {} track(s) into '{}' ({})",
            remote.tracks.len(),
            playlist.name,
            playlist.id
        );

        let playlist_id = playlist.id;
        let imports = remote.tracks.into_iter().map(|track| async move {
            let track_id = track.id.clone();
            (track_id, self.import_track(playlist_id, track, cancel).await)
        });

        let mut failed = 0;
        for (track_id, result) in join_all(imports).await {
            if let Err(e) = result {
                failed += 1;
                log::warn!("⚠️ [LIBRARY] Could not import track {}: {}", track_id, e);
            }
        }
        if failed > 0 {
            log::warn!("⚠️ [LIBRARY] {} track(s) were not imported into {}", failed, playlist.id);
        }

        Ok(playlist)
    }

    async fn import_track(&self, playlist_id: Uuid, track: Track, cancel: &CancellationToken) -> Result<()> {
        let resolved = match self.downloads.resolver().resolve(&track_link(&track.id), cancel).await {
            Ok(resolved) => Some(resolved),
            Err(e) => {
                log::warn!("⚠️ [LIBRARY] Resolution of {} failed, keeping catalog metadata: {}", track.id, e);
                None
            }
        };

        // Membership needs the row even when resolution did not store it.
        self.store.insert_track_if_absent(&track).await?;

        if let Some(resolved) = resolved {
            self.downloads
                .spawn_ensure_extracted(resolved.track_id, resolved.source_url);
        }

        self.store.add_track_to_playlist(playlist_id, &track.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MockCatalog, RemotePlaylist};
    use crate::downloader::testing::{test_config, FakeRunner};
    use crate::store::MemoryStore;
    use std::path::Path;

    fn catalog_track(id: &str) -> Track {
        Track {
            name: format!("Catalog {}", id),
            artists: vec!["Catalog Artist".to_string()],
            popularity: 30,
            ..Track::skeleton(id)
        }
    }

    fn library(dir: &Path, runner: Arc<FakeRunner>, store: Arc<MemoryStore>, catalog: MockCatalog) -> Library {
        let config = test_config(dir);
        let downloads = DownloadManager::new(runner, store.clone(), &config, CancellationToken::new()).unwrap();
        Library::new(store, Arc::new(catalog), downloads, &config)
    }

    fn playlist_catalog(ids: &'static [&'static str]) -> MockCatalog {
        let mut catalog = MockCatalog::new();
        catalog.expect_playlist().times(1).returning(move |_| {
            Ok(RemotePlaylist {
                name: "Road Trip".to_string(),
                description: "Imported".to_string(),
                image_url: "https://i.scdn.co/image/cover".to_string(),
                tracks: ids.iter().map(|id| catalog_track(id)).collect(),
            })
        });
        catalog
    }

    #[tokio::test]
    async fn import_keeps_every_track_when_resolution_fails() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new().with_failed_resolution());
        let store = Arc::new(MemoryStore::new());
        let library = library(dir.path(), runner, store.clone(), playlist_catalog(&["t1", "t2", "t3", "t4"]));

        let playlist = library
            .import("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M", &CancellationToken::new())
            .await
            .unwrap();

        let details = store.get_playlist(playlist.id).await.unwrap();
        assert_eq!(details.playlist.name, "Road Trip");
        assert_eq!(details.tracks.len(), 4);
        assert!(details.tracks.iter().all(|t| t.name.starts_with("Catalog")));
    }

    #[tokio::test]
    async fn import_prefers_resolved_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let store = Arc::new(MemoryStore::new());
        let library = library(dir.path(), runner.clone(), store.clone(), playlist_catalog(&["a1", "b2"]));

        let playlist = library.import("remoteid", &CancellationToken::new()).await.unwrap();

        let details = store.get_playlist(playlist.id).await.unwrap();
        assert_eq!(details.tracks.len(), 2);
        for track in &details.tracks {
            assert_eq!(track.name, format!("Song {}", track.id));
            assert!(track.source_url.is_some());
        }
        assert_eq!(runner.resolutions(), 2);
    }

    #[tokio::test]
    async fn playlist_ids_must_be_uuids() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(
            dir.path(),
            Arc::new(FakeRunner::new()),
            Arc::new(MemoryStore::new()),
            MockCatalog::new(),
        );

        assert!(matches!(
            library.get_playlist("not-a-uuid").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            library.delete_playlist(&Uuid::new_v4().to_string()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn playlist_crud_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t1.m4a"), b"audio").unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_track(&catalog_track("t1")).await.unwrap();
        let library = library(dir.path(), Arc::new(FakeRunner::new()), store, MockCatalog::new());

        let playlist = library.create_playlist("Mix", "", "").await.unwrap();
        let id = playlist.id.to_string();
        library.add_track_to_playlist(&id, "t1").await.unwrap();
        assert_eq!(library.get_playlist(&id).await.unwrap().tracks.len(), 1);

        library.remove_track_from_playlist(&id, "t1").await.unwrap();
        assert!(library.get_playlist(&id).await.unwrap().tracks.is_empty());

        assert_eq!(library.list_playlists().await.unwrap().len(), 1);
        library.delete_playlist(&id).await.unwrap();
        assert!(library.list_playlists().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn play_downloads_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(FakeRunner::new());
        let library = library(dir.path(), runner.clone(), Arc::new(MemoryStore::new()), MockCatalog::new());

        library.play("abc", &CancellationToken::new()).await.unwrap();
        assert_eq!(runner.extractions(), 1);

        library.play("abc", &CancellationToken::new()).await.unwrap();
        assert_eq!(runner.extractions(), 1);
    }

    #[tokio::test]
    async fn lyrics_come_from_resolved_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let library = library(
            dir.path(),
            Arc::new(FakeRunner::new()),
            Arc::new(MemoryStore::new()),
            MockCatalog::new(),
        );

        library
            .download("https://open.spotify.com/track/withlyrics", &CancellationToken::new())
            .await
            .unwrap();

        let lyrics = library.lyrics("withlyrics").await.unwrap();
        assert_eq!(lyrics.as_deref(), Some("[00:01.00] la la"));
    }

    #[tokio::test]
    async fn plays_and_skips_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        store.upsert_track(&catalog_track("t1")).await.unwrap();
        let library = library(dir.path(), Arc::new(FakeRunner::new()), store, MockCatalog::new());

        let play_id = library.record_play("t1").await.unwrap();
        let play = library.record_skip(&play_id.to_string(), 93).await.unwrap();
        assert_eq!(play.track_id, "t1");
        assert_eq!(play.skipped_at, Some(93));

        assert!(matches!(library.record_play("unknown").await, Err(AppError::Store(_))));
        assert!(matches!(library.record_skip("nope", 1).await, Err(AppError::InvalidInput(_))));
        assert!(matches!(
            library.record_skip(&Uuid::new_v4().to_string(), 1).await,
            Err(AppError::NotFound(_))
        ));
    }
}
