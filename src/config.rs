use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use config::{Config, Environment, File, FileFormat};
use crate::errors::{AppError, Result};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Directory holding downloaded audio, scratch metadata and the library snapshot.
    pub data_path: PathBuf,
    pub spotdl_path: String,
    pub yt_dlp_path: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub max_concurrent_downloads: usize,
    pub search_limit: usize,
    /// Local hit count at which the remote catalog is no longer consulted.
    pub search_local_threshold: usize,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub audio_format: AudioFormat,
    pub proxy: Option<String>,
    pub debug: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    M4a,
    Mp3,
    Opus,
    Flac,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_path: dirs::data_dir()
                .map(|dir| dir.join("musicer"))
                .unwrap_or_else(|| PathBuf::from("./data")),
            spotdl_path: "spotdl".to_string(),
            yt_dlp_path: "yt-dlp".to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,
            max_concurrent_downloads: 10,
            search_limit: 25,
            search_local_threshold: 25,
            retry_delay_ms: 2000,
            request_timeout_secs: 10,
            audio_format: AudioFormat::M4a,
            proxy: None,
            debug: false,
        }
    }
}

impl AppConfig {
    /// Layers built-in defaults, the JSON config file (if present) and
    /// `MUSICER_*` environment variables, in that order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::get_config_path()?,
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::from(config_path).format(FileFormat::Json).required(false))
            .add_source(Environment::with_prefix("MUSICER").try_parsing(true))
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.spotify_client_id.as_deref().unwrap_or("").is_empty()
            || self.spotify_client_secret.as_deref().unwrap_or("").is_empty()
        {
            return Err(AppError::InvalidInput(
                "spotify_client_id and spotify_client_secret must be set".to_string(),
            ));
        }
        if self.spotdl_path.is_empty() || self.yt_dlp_path.is_empty() {
            return Err(AppError::InvalidInput("tool paths cannot be empty".to_string()));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(AppError::InvalidInput(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| AppError::NotFound("Could not find config directory".to_string()))?;

        Ok(config_dir.join("musicer").join("config.json"))
    }

    pub fn library_file(&self) -> PathBuf {
        self.data_path.join("library.json")
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::M4a => "m4a",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Opus => "opus",
            AudioFormat::Flac => "flac",
        }
    }
}
