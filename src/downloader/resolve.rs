use std::path::{Path, PathBuf};
use std::sync::Arc;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metadata::spotdl::first_record;
use crate::store::TrackStore;
use crate::utils::{generate_scratch_token, parse_track_link};
use super::process::ToolRunner;

const SOURCE_URL_PATTERN: &str = r"https://(?:music\.)?youtube\.com/[^\s]+";

/// What a reference resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub track_id: String,
    pub source_url: String,
}

/// Turns a link or query into a track id plus the url to extract audio from,
/// storing the track metadata on the way.
pub struct Resolver {
    runner: Arc<dyn ToolRunner>,
    store: Arc<dyn TrackStore>,
    spotdl_path: String,
    client_id: String,
    client_secret: String,
    storage_path: PathBuf,
    source_pattern: Regex,
}

/// Metadata file written by `spotdl`, removed when dropped.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(storage_path: &Path) -> Self {
        Self {
            path: storage_path.join(format!("{}-metadata.spotdl", generate_scratch_token())),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("⚠️ [RESOLVE] Failed to remove scratch file {:?}: {}", self.path, e);
            }
        }
    }
}

impl Resolver {
    pub fn new(runner: Arc<dyn ToolRunner>, store: Arc<dyn TrackStore>, config: &AppConfig) -> Result<Self> {
        let source_pattern = Regex::new(SOURCE_URL_PATTERN)
            .map_err(|e| AppError::InvalidInput(format!("bad source url pattern: {}", e)))?;

        Ok(Self {
            runner,
            store,
            spotdl_path: config.spotdl_path.clone(),
            client_id: config.spotify_client_id.clone().unwrap_or_default(),
            client_secret: config.spotify_client_secret.clone().unwrap_or_default(),
            storage_path: config.data_path.clone(),
            source_pattern,
        })
    }

    pub async fn resolve(&self, reference: &str, cancel: &CancellationToken) -> Result<Resolved> {
        if let Some(track_id) = parse_track_link(reference) {
            if let Some(source_url) = self.store.source_url(&track_id).await? {
                log::debug!("[RESOLVE] Using stored source url for {}", track_id);
                return Ok(Resolved { track_id, source_url });
            }
        }

        log::info!("🔍 [RESOLVE] Resolving '{}'", reference);
        let scratch = ScratchFile::new(&self.storage_path);
        let mut args = self.resolver_args("url", reference, &scratch.path);

        let output = self
            .runner
            .run(&self.spotdl_path, &args, &self.storage_path, cancel)
            .await?;
        if !output.success {
            log::error!("❌ [RESOLVE] spotdl url failed ({}): {}", output.describe_exit(), output.output);
            return Err(AppError::Resolution(format!(
                "spotdl url failed with {}",
                output.describe_exit()
            )));
        }

        let source_url = self
            .find_source_url(&output.output)
            .ok_or_else(|| {
                log::error!("❌ [RESOLVE] No source url in spotdl output: {}", output.output);
                AppError::NoSourceLocator
            })?;
        log::debug!("[RESOLVE] Found source url {}", source_url);

        args[0] = "save".to_string();
        args.extend(["--lyrics", "synced", "--generate-lrc"].map(String::from));
        let saved = self
            .runner
            .run(&self.spotdl_path, &args, &self.storage_path, cancel)
            .await?;
        if !saved.success {
            return Err(AppError::Resolution(format!(
                "spotdl save failed with {}",
                saved.describe_exit()
            )));
        }

        let contents = tokio::fs::read(&scratch.path).await?;
        let record = first_record(&contents)?;
        if record.lyrics.as_deref().unwrap_or("").is_empty() {
            log::debug!("[RESOLVE] No lyrics found for {}", record.id);
        }

        let track = record.into_track(source_url.clone());
        log::info!(
            "✅ [RESOLVE] {} - {} ({})",
            track.primary_artist().unwrap_or("unknown artist"),
            track.name,
            track.id
        );
        self.store.upsert_track(&track).await?;

        Ok(Resolved {
            track_id: track.id,
            source_url,
        })
    }

    fn resolver_args(&self, operation: &str, reference: &str, save_file: &Path) -> Vec<String> {
        vec![
            operation.to_string(),
            reference.to_string(),
            "--save-file".to_string(),
            save_file.to_string_lossy().into_owned(),
            "--client-id".to_string(),
            self.client_id.clone(),
            "--client-secret".to_string(),
            self.client_secret.clone(),
        ]
    }

    fn find_source_url(&self, output: &str) -> Option<String> {
        self.source_pattern
            .find(output)
            .map(|found| found.as_str().to_string())
    }
}
