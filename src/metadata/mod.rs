pub mod spotdl;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A track row as the core reads and writes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    /// Ordered artist names, the first one is the primary artist.
    pub artists: Vec<String>,
    pub artist_id: String,
    pub album_id: String,
    pub album_name: String,
    pub cover_url: String,
    pub release_date: Option<ReleaseDate>,
    pub popularity: i32,
    pub duration_secs: i32,
    pub lyrics: Option<String>,
    /// Source url found during resolution, `None` until resolved.
    pub source_url: Option<String>,
    pub downloaded: bool,
}

impl Track {
    /// A track with only its identifier filled in.
    pub fn skeleton(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            artists: Vec::new(),
            artist_id: String::new(),
            album_id: String::new(),
            album_name: String::new(),
            cover_url: String::new(),
            release_date: None,
            popularity: 0,
            duration_secs: 0,
            lyrics: None,
            source_url: None,
            downloaded: false,
        }
    }

    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// Release date at the precision the provider reported it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "precision", content = "value", rename_all = "lowercase")]
pub enum ReleaseDate {
    Year(i32),
    Day(NaiveDate),
}

impl ReleaseDate {
    /// Parses `YYYY` or `YYYY-MM-DD`; anything else has no usable date.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.len() {
            4 => raw.parse::<i32>().ok().map(ReleaseDate::Year),
            10 => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().map(ReleaseDate::Day),
            _ => None,
        }
    }

    /// Year-only dates compare as January 1st of that year.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            ReleaseDate::Year(year) => NaiveDate::from_ymd_opt(*year, 1, 1),
            ReleaseDate::Day(date) => Some(*date),
        }
    }

    pub fn year(&self) -> i32 {
        match self {
            ReleaseDate::Year(year) => *year,
            ReleaseDate::Day(date) => date.year(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlaylist {
    pub name: String,
    pub description: String,
    pub image_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistDetails {
    pub playlist: Playlist,
    pub tracks: Vec<Track>,
}

/// One playback of a track. `skipped_at` is the second playback stopped at,
/// when the listener skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Play {
    pub id: Uuid,
    pub track_id: String,
    pub played_at: DateTime<Utc>,
    pub skipped_at: Option<i32>,
}
