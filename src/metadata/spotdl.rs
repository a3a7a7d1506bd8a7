use serde::Deserialize;
use crate::errors::{AppError, Result};
use super::{ReleaseDate, Track};

/// One entry of the JSON array written by `spotdl save`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpotdlRecord {
    #[serde(rename = "song_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub artist_id: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub album_id: String,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub popularity: Option<i32>,
    #[serde(default)]
    pub duration: Option<i32>,
    #[serde(default)]
    pub lyrics: Option<String>,
}

/// Decodes a save file and returns its first record.
pub fn first_record(contents: &[u8]) -> Result<SpotdlRecord> {
    let records: Vec<SpotdlRecord> = serde_json::from_slice(contents)?;
    records
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Resolution("no metadata found in spotdl output".to_string()))
}

impl SpotdlRecord {
    pub fn into_track(self, source_url: String) -> Track {
        let artists = if self.artists.is_empty() && !self.artist.is_empty() {
            vec![self.artist]
        } else {
            self.artists
        };

        Track {
            release_date: ReleaseDate::parse(&self.date),
            id: self.id,
            name: self.name,
            artists,
            artist_id: self.artist_id,
            album_id: self.album_id,
            album_name: self.album_name,
            cover_url: self.cover_url.unwrap_or_default(),
            popularity: self.popularity.unwrap_or_default(),
            duration_secs: self.duration.unwrap_or_default(),
            lyrics: self.lyrics.filter(|lyrics| !lyrics.is_empty()),
            source_url: Some(source_url),
            downloaded: false,
        }
    }
}
