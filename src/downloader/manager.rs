use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::store::TrackStore;
use crate::utils::{parse_track_link, track_link};
use super::dedup::{InFlight, Registration};
use super::extract::Extractor;
use super::process::ToolRunner;
use super::resolve::{Resolved, Resolver};
use super::slots::Slots;

const MAX_EXTRACTION_ATTEMPTS: u32 = 3;

/// Terminal result shared with every caller of the same in-flight key.
/// Carries the track id on success.
pub type DownloadOutcome = Result<String>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlaylistReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
}

/// Resolves and extracts tracks, running each logical download once no
/// matter how many callers ask for it.
#[derive(Clone)]
pub struct DownloadManager {
    inflight: Arc<InFlight<DownloadOutcome>>,
    resolver: Arc<Resolver>,
    extractor: Arc<Extractor>,
    store: Arc<dyn TrackStore>,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

/// Track links dedupe on the track id so that background repair and
/// explicit downloads of the same track meet on one key.
fn dedup_key(reference: &str) -> String {
    parse_track_link(reference).unwrap_or_else(|| reference.trim().to_string())
}

impl DownloadManager {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        store: Arc<dyn TrackStore>,
        config: &AppConfig,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let slots = Slots::new(config.max_concurrent_downloads);
        let resolver = Resolver::new(runner.clone(), store.clone(), config)?;
        let extractor = Extractor::new(runner, store.clone(), slots, config);

        log::info!(
            "🎵 [DOWNLOAD] Manager ready: {} extraction slot(s), storage {:?}",
            extractor.slots().capacity(),
            config.data_path
        );

        Ok(Self {
            inflight: Arc::new(InFlight::new()),
            resolver: Arc::new(resolver),
            extractor: Arc::new(extractor),
            store,
            retry_delay: config.retry_delay(),
            shutdown,
        })
    }

    /// Where the audio file for `track_id` lives once downloaded.
    pub fn track_path(&self, track_id: &str) -> PathBuf {
        self.extractor.output_path(track_id)
    }

    pub async fn is_on_disk(&self, track_id: &str) -> bool {
        tokio::fs::try_exists(self.track_path(track_id))
            .await
            .unwrap_or(false)
    }

    /// Downloads a track link or search query and returns the track id.
    ///
    /// Concurrent calls for the same reference share one resolution and
    /// extraction and all get its outcome.
    pub async fn download(&self, reference: &str, cancel: &CancellationToken) -> Result<String> {
        let key = dedup_key(reference);
        if key.is_empty() {
            return Err(AppError::InvalidInput("empty download reference".to_string()));
        }

        match self.inflight.join(&key) {
            Registration::Waiter(waiter) => {
                log::info!("⏳ [DOWNLOAD] '{}' already in progress, waiting", key);
                tokio::select! {
                    outcome = waiter.outcome() => outcome.unwrap_or(Err(AppError::Cancelled)),
                    _ = cancel.cancelled() => Err(AppError::Cancelled),
                }
            }
            Registration::Owner(guard) => {
                log::info!("🚀 [DOWNLOAD] Starting '{}'", reference);
                let outcome = self.run_download(&key, reference, cancel).await;
                match &outcome {
                    Ok(track_id) => log::info!("✅ [DOWNLOAD] '{}' finished as {}", key, track_id),
                    Err(e) => log::error!("❌ [DOWNLOAD] '{}' failed: {}", key, e),
                }
                guard.finish(outcome.clone());
                outcome
            }
        }
    }

    async fn run_download(&self, key: &str, reference: &str, cancel: &CancellationToken) -> DownloadOutcome {
        let Resolved { track_id, source_url } = self.resolver.resolve(reference, cancel).await?;

        if track_id == key {
            self.extract_with_retry(&track_id, &source_url, cancel).await?;
        } else {
            // A query can land on a track someone else is already fetching.
            self.extract_once(&track_id, &source_url, cancel).await?;
        }
        Ok(track_id)
    }

    /// Downloads each id whose audio file is missing, in order, stopping at
    /// the first failure. Ids already on disk are never resolved.
    pub async fn download_if_not_exists(&self, track_ids: &[String], cancel: &CancellationToken) -> Result<()> {
        let total = track_ids.len();
        for (index, track_id) in track_ids.iter().enumerate() {
            if self.is_on_disk(track_id).await {
                log::debug!("[DOWNLOAD] {} already on disk", track_id);
                continue;
            }
            if let Err(e) = self.download(&track_link(track_id), cancel).await {
                log::error!(
                    "❌ [DOWNLOAD] Track {} ({}/{}) failed: {}",
                    track_id,
                    index + 1,
                    total,
                    e
                );
                return Err(e);
            }
        }

        for track_id in track_ids {
            if let Err(e) = self.store.mark_downloaded(track_id).await {
                log::error!("❌ [DOWNLOAD] Could not mark {} as downloaded: {}", track_id, e);
            }
        }
        Ok(())
    }

    /// Runs extraction up to three times. Age restriction and cancellation
    /// end the loop immediately.
    pub async fn extract_with_retry(&self, track_id: &str, source_url: &str, cancel: &CancellationToken) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.extractor.extract(track_id, source_url, cancel).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt < MAX_EXTRACTION_ATTEMPTS => {
                    log::warn!(
                        "🔄 [DOWNLOAD] Attempt {}/{} for {} failed: {}",
                        attempt,
                        MAX_EXTRACTION_ATTEMPTS,
                        track_id,
                        e
                    );
                    attempt += 1;
                    if !self.retry_delay.is_zero() {
                        tokio::select! {
                            _ = tokio::time::sleep(self.retry_delay) => {}
                            _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        }
                    }
                }
                Err(e) => {
                    log::error!("❌ [DOWNLOAD] Giving up on {} after {} attempt(s): {}", track_id, attempt, e);
                    return Err(e);
                }
            }
        }
    }

    /// Retrying extraction keyed on the track id, shared with any download of
    /// the same track already running.
    async fn extract_once(&self, track_id: &str, source_url: &str, cancel: &CancellationToken) -> Result<()> {
        loop {
            match self.inflight.join(track_id) {
                Registration::Waiter(waiter) => {
                    let outcome = tokio::select! {
                        outcome = waiter.outcome() => outcome.unwrap_or(Err(AppError::Cancelled)),
                        _ = cancel.cancelled() => Err(AppError::Cancelled),
                    };
                    match outcome {
                        Ok(_) => return Ok(()),
                        // The owner failed before extracting; this caller already has a locator.
                        Err(e) if !matches!(e, AppError::Extraction(_) | AppError::AgeRestricted | AppError::Cancelled) => {
                            log::debug!("🔁 [DOWNLOAD] Shared download of {} failed early ({}), extracting directly", track_id, e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Registration::Owner(guard) => {
                    let result = self.extract_with_retry(track_id, source_url, cancel).await;
                    guard.finish(result.clone().map(|()| track_id.to_string()));
                    return result;
                }
            }
        }
    }

    /// Background repair: extracts the track unless its file already exists.
    pub async fn ensure_extracted(&self, track_id: &str, source_url: &str, cancel: &CancellationToken) -> Result<()> {
        if self.is_on_disk(track_id).await {
            return Ok(());
        }
        self.extract_once(track_id, source_url, cancel).await
    }

    /// Fire-and-forget [`Self::ensure_extracted`], stopped by shutdown.
    pub fn spawn_ensure_extracted(&self, track_id: String, source_url: String) {
        let manager = self.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = manager.ensure_extracted(&track_id, &source_url, &cancel).await {
                log::warn!("⚠️ [DOWNLOAD] Background extraction of {} failed: {}", track_id, e);
            }
        });
    }

    /// Fire-and-forget [`Self::download_if_not_exists`], stopped by shutdown.
    pub fn spawn_download_if_not_exists(&self, track_ids: Vec<String>) {
        let manager = self.clone();
        let cancel = self.shutdown.child_token();
        tokio::spawn(async move {
            if let Err(e) = manager.download_if_not_exists(&track_ids, &cancel).await {
                log::warn!("⚠️ [DOWNLOAD] Background download failed: {}", e);
            }
        });
    }

    /// Downloads every playlist track not yet marked downloaded, all at once.
    /// Individual failures are counted, not returned.
    pub async fn download_playlist(&self, playlist_id: Uuid, cancel: &CancellationToken) -> Result<PlaylistReport> {
        let pending = self.store.undownloaded_tracks(playlist_id).await?;
        log::info!("📥 [DOWNLOAD] Playlist {}: {} track(s) to download", playlist_id, pending.len());

        let downloads = pending.iter().map(|track| async move {
            let result = self.download(&track_link(&track.id), cancel).await;
            (track.id.clone(), result)
        });

        let mut report = PlaylistReport::default();
        for (track_id, result) in join_all(downloads).await {
            match result {
                Ok(_) => report.succeeded.push(track_id),
                Err(e) => {
                    log::error!("❌ [DOWNLOAD] Playlist track {} failed: {}", track_id, e);
                    report.failed.push(track_id);
                }
            }
        }

        log::info!(
            "📊 [DOWNLOAD] Playlist {} done: {} succeeded, {} failed",
            playlist_id,
            report.succeeded.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }
}
