//! Scriptable stand-in for spotdl and yt-dlp used by the pipeline tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::utils::parse_track_link;
use super::process::{ToolOutput, ToolRunner};

pub fn test_config(storage: &Path) -> AppConfig {
    AppConfig {
        data_path: storage.to_path_buf(),
        spotify_client_id: Some("client-id".to_string()),
        spotify_client_secret: Some("client-secret".to_string()),
        retry_delay_ms: 0,
        ..AppConfig::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExtractOutcome {
    Success,
    Fail,
    AgeRestricted,
}

pub struct FakeRunner {
    extractions: Mutex<VecDeque<ExtractOutcome>>,
    emit_source_url: bool,
    fail_resolution: bool,
    corrupt_save_file: bool,
    delay: Duration,
    resolution_calls: AtomicUsize,
    extraction_calls: AtomicUsize,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self {
            extractions: Mutex::new(VecDeque::new()),
            emit_source_url: true,
            fail_resolution: false,
            corrupt_save_file: false,
            delay: Duration::ZERO,
            resolution_calls: AtomicUsize::new(0),
            extraction_calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Outcomes for successive yt-dlp runs; runs past the end succeed.
    pub fn with_extractions(self, outcomes: Vec<ExtractOutcome>) -> Self {
        *self.extractions.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_source_url(mut self) -> Self {
        self.emit_source_url = false;
        self
    }

    pub fn with_failed_resolution(mut self) -> Self {
        self.fail_resolution = true;
        self
    }

    /// `spotdl save` succeeds but leaves unparseable metadata behind.
    pub fn with_corrupt_save_file(mut self) -> Self {
        self.corrupt_save_file = true;
        self
    }

    /// Number of `spotdl url` runs.
    pub fn resolutions(&self) -> usize {
        self.resolution_calls.load(Ordering::SeqCst)
    }

    pub fn extractions(&self) -> usize {
        self.extraction_calls.load(Ordering::SeqCst)
    }

    /// Highest number of yt-dlp runs observed at the same time.
    pub fn peak_extractions(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn resolve(&self, args: &[String]) -> Result<ToolOutput> {
        let reference = &args[1];
        let track_id = parse_track_link(reference)
            .unwrap_or_else(|| reference.chars().filter(|c| c.is_ascii_alphanumeric()).collect());

        if args[0] == "url" {
            self.resolution_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_resolution {
                return Ok(failed("HTTP Error 404: track not found"));
            }
            let output = if self.emit_source_url {
                format!(
                    "Processing query: {}\nhttps://music.youtube.com/watch?v={}\n",
                    reference, track_id
                )
            } else {
                format!("Processing query: {}\nNo results found\n", reference)
            };
            return Ok(succeeded(output));
        }

        let save_file = flag_value(args, "--save-file").expect("save file argument");
        if self.corrupt_save_file {
            std::fs::write(save_file, "not json")?;
            return Ok(succeeded(String::new()));
        }
        let record = serde_json::json!([{
            "song_id": track_id,
            "name": format!("Song {}", track_id),
            "date": "2020-01-01",
            "artist_id": "artist",
            "artist": "Fake Artist",
            "artists": ["Fake Artist"],
            "album_id": "album",
            "album_name": "Fake Album",
            "cover_url": "https://i.scdn.co/image/fake",
            "popularity": 50,
            "duration": 180,
            "lyrics": "[00:01.00] la la"
        }]);
        std::fs::write(save_file, record.to_string())?;
        Ok(succeeded(String::new()))
    }

    async fn extract(&self, args: &[String], cancel: &CancellationToken) -> Result<ToolOutput> {
        self.extraction_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let slept = tokio::select! {
            _ = tokio::time::sleep(self.delay) => true,
            _ = cancel.cancelled() => false,
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        if !slept {
            return Err(AppError::Cancelled);
        }

        let outcome = self
            .extractions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ExtractOutcome::Success);

        match outcome {
            ExtractOutcome::Success => {
                let output = flag_value(args, "--output").expect("output argument");
                std::fs::write(output, b"audio")?;
                Ok(succeeded("[ExtractAudio] Destination".to_string()))
            }
            ExtractOutcome::Fail => Ok(failed("ERROR: unable to download video data: HTTP Error 403")),
            ExtractOutcome::AgeRestricted => Ok(failed(
                "ERROR: [youtube] abc: Sign in to confirm your age. This video is age-restricted",
            )),
        }
    }
}

#[async_trait]
impl ToolRunner for FakeRunner {
    async fn run(
        &self,
        _program: &str,
        args: &[String],
        _working_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        match args.first().map(String::as_str) {
            Some("url") | Some("save") => self.resolve(args),
            _ => self.extract(args, cancel).await,
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|index| args.get(index + 1))
        .map(PathBuf::from)
}

fn succeeded(output: String) -> ToolOutput {
    ToolOutput {
        success: true,
        code: Some(0),
        output,
    }
}

fn failed(output: &str) -> ToolOutput {
    ToolOutput {
        success: false,
        code: Some(1),
        output: output.to_string(),
    }
}
