//! Download pipeline: in-flight deduplication, extraction slots, the spotdl
//! resolution stage and the yt-dlp extraction stage.

pub mod dedup;
pub mod extract;
pub mod manager;
pub mod process;
pub mod resolve;
pub mod slots;

#[cfg(test)]
pub mod testing;

pub use manager::{DownloadManager, PlaylistReport};
pub use process::ProcessRunner;
