use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::config::{AppConfig, AudioFormat};
use crate::errors::{AppError, Result};
use crate::store::TrackStore;
use crate::utils::{sanitize_filename, track_file_path};
use super::process::ToolRunner;
use super::slots::Slots;

const AGE_RESTRICTED_MARKER: &str = "This video is age-restricted";
const EXTRACTOR_ARGS: &str = "youtube:player_client=default,ios,-android_sdkless;formats=missing_pot";
const FORMAT_SELECTOR: &str = "bv[protocol=m3u8_native]+ba[protocol=m3u8_native]/b[protocol=m3u8_native]";

/// Runs yt-dlp for one track under a slot and records the result.
pub struct Extractor {
    runner: Arc<dyn ToolRunner>,
    store: Arc<dyn TrackStore>,
    slots: Slots,
    yt_dlp_path: String,
    storage_path: PathBuf,
    format: AudioFormat,
}

impl Extractor {
    pub fn new(runner: Arc<dyn ToolRunner>, store: Arc<dyn TrackStore>, slots: Slots, config: &AppConfig) -> Self {
        Self {
            runner,
            store,
            slots,
            yt_dlp_path: config.yt_dlp_path.clone(),
            storage_path: config.data_path.clone(),
            format: config.audio_format,
        }
    }

    pub fn output_path(&self, track_id: &str) -> PathBuf {
        track_file_path(&self.storage_path, track_id, self.format.extension())
    }

    /// Single extraction attempt. The slot is held only for the yt-dlp run.
    pub async fn extract(&self, track_id: &str, source_url: &str, cancel: &CancellationToken) -> Result<()> {
        let permit = tokio::select! {
            permit = self.slots.acquire() => permit?,
            _ = cancel.cancelled() => return Err(AppError::Cancelled),
        };
        log::info!(
            "⬇️ [EXTRACT] {} from {} ({} slot(s) left)",
            track_id,
            source_url,
            self.slots.available()
        );

        let args = self.extractor_args(track_id, source_url);
        let output = self
            .runner
            .run(&self.yt_dlp_path, &args, &self.storage_path, cancel)
            .await;
        drop(permit);
        let output = output?;

        if !output.success {
            if output.output.contains(AGE_RESTRICTED_MARKER) {
                log::warn!("🔞 [EXTRACT] {} is age-restricted", track_id);
                return Err(AppError::AgeRestricted);
            }
            log::debug!("[EXTRACT] yt-dlp output for {}: {}", track_id, output.output);
            return Err(AppError::Extraction(format!(
                "yt-dlp failed with {}",
                output.describe_exit()
            )));
        }

        self.sweep_byproducts(track_id).await?;
        log::info!("✅ [EXTRACT] Downloaded {}", track_id);

        if let Err(e) = self.store.mark_downloaded(track_id).await {
            log::warn!("⚠️ [EXTRACT] Could not mark {} as downloaded: {}", track_id, e);
        }
        Ok(())
    }

    fn extractor_args(&self, track_id: &str, source_url: &str) -> Vec<String> {
        vec![
            "-x".to_string(),
            "--audio-format".to_string(),
            self.format.extension().to_string(),
            "--output".to_string(),
            self.output_path(track_id).to_string_lossy().into_owned(),
            "--extractor-args".to_string(),
            EXTRACTOR_ARGS.to_string(),
            "--format".to_string(),
            FORMAT_SELECTOR.to_string(),
            source_url.to_string(),
        ]
    }

    pub fn slots(&self) -> &Slots {
        &self.slots
    }

    /// yt-dlp leaves audioless `.mp4` files next to the extracted audio.
    async fn sweep_byproducts(&self, track_id: &str) -> Result<()> {
        sweep_mp4_files(&self.storage_path, &sanitize_filename(track_id)).await
    }
}

/// Removes `<stem>.mp4` and `<stem>.<anything>.mp4`. Other tracks may still be
/// extracting into the same directory.
async fn sweep_mp4_files(dir: &Path, stem: &str) -> Result<()> {
    let format_prefix = format!("{}.", stem);
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_mp4 = path.extension().map_or(false, |ext| ext == "mp4");
        let owned = path
            .file_stem()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name == stem || name.starts_with(&format_prefix));
        if is_mp4 && owned {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                log::warn!("⚠️ [EXTRACT] Failed to remove byproduct {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}
