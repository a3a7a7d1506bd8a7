mod catalog;
mod config;
mod downloader;
mod errors;
mod library;
mod metadata;
mod search;
mod store;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;
use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use tokio_util::sync::CancellationToken;

use crate::catalog::SpotifyCatalog;
use crate::config::AppConfig;
use crate::downloader::{DownloadManager, ProcessRunner};
use crate::library::Library;
use crate::metadata::Track;
use crate::store::MemoryStore;

#[derive(Parser)]
#[command(name = "musicer")]
#[command(version)]
#[command(about = "Self-hosted music library that downloads tracks on demand")]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a track link or search query
    Download { reference: String },
    /// Download track ids whose audio file is missing
    Fetch {
        #[arg(required = true)]
        track_ids: Vec<String>,
    },
    /// Download every track of a library playlist not downloaded yet
    PlaylistDownload { playlist_id: String },
    /// Import a remote playlist by id or url
    Import { playlist: String },
    /// Search the library and the remote catalog
    Search { query: String },
    /// List library playlists
    Playlists,
    CreatePlaylist {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "")]
        image_url: String,
    },
    DeletePlaylist { playlist_id: String },
    ShowPlaylist { playlist_id: String },
    AddTrack { playlist_id: String, track_id: String },
    RemoveTrack { playlist_id: String, track_id: String },
    /// Print the stored lyrics of a track
    Lyrics { track_id: String },
    /// Make sure a track is on disk and print its path
    Play { track_id: String },
    /// Record a play of a track and print the play id
    RecordPlay { track_id: String },
    /// Record that a play was skipped at the given second
    RecordSkip { play_id: String, skipped_at: i32 },
}

fn print_tracks(tracks: &[Track]) {
    for (index, track) in tracks.iter().enumerate() {
        println!(
            "{:>3}. {} - {} [{}] (popularity {})",
            index + 1,
            track.artists.join(", "),
            track.name,
            track.id,
            track.popularity
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    config.validate().context("invalid configuration")?;
    utils::ensure_dir_exists(&config.data_path).await?;
    info!("Starting musicer with storage at {:?}", config.data_path);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling running work");
                shutdown.cancel();
            }
        });
    }

    let store = Arc::new(MemoryStore::open(config.library_file()).await?);
    let catalog = Arc::new(SpotifyCatalog::new(&config)?);
    let downloads = DownloadManager::new(Arc::new(ProcessRunner::new()), store.clone(), &config, shutdown.clone())?;
    let library = Library::new(store, catalog, downloads, &config);

    match cli.command {
        Commands::Download { reference } => {
            let track_id = library.download(&reference, &shutdown).await?;
            println!("{}", library.path_to_track_file(&track_id).display());
        }
        Commands::Fetch { track_ids } => {
            library.download_if_not_exists(&track_ids, &shutdown).await?;
            println!("{} track(s) present", track_ids.len());
        }
        Commands::PlaylistDownload { playlist_id } => {
            let report = library.download_playlist(&playlist_id, &shutdown).await?;
            println!("{} downloaded, {} failed", report.succeeded.len(), report.failed.len());
            for track_id in &report.failed {
                println!("  failed: {}", track_id);
            }
        }
        Commands::Import { playlist } => {
            let created = library.import(&playlist, &shutdown).await?;
            println!("Imported '{}' as {}", created.name, created.id);
        }
        Commands::Search { query } => {
            print_tracks(&library.search(&query).await?);
        }
        Commands::Playlists => {
            for playlist in library.list_playlists().await? {
                println!("{}  {}  ({})", playlist.id, playlist.name, playlist.created_at.format("%Y-%m-%d"));
            }
        }
        Commands::CreatePlaylist {
            name,
            description,
            image_url,
        } => {
            let playlist = library.create_playlist(&name, &description, &image_url).await?;
            println!("{}", playlist.id);
        }
        Commands::DeletePlaylist { playlist_id } => {
            library.delete_playlist(&playlist_id).await?;
        }
        Commands::ShowPlaylist { playlist_id } => {
            let details = library.get_playlist(&playlist_id).await?;
            println!("{} - {}", details.playlist.name, details.playlist.description);
            print_tracks(&details.tracks);
        }
        Commands::AddTrack { playlist_id, track_id } => {
            library.add_track_to_playlist(&playlist_id, &track_id).await?;
            // The library only starts the download; wait for it before exiting.
            library.download_if_not_exists(&[track_id], &shutdown).await?;
        }
        Commands::RemoveTrack { playlist_id, track_id } => {
            library.remove_track_from_playlist(&playlist_id, &track_id).await?;
        }
        Commands::Lyrics { track_id } => match library.lyrics(&track_id).await? {
            Some(lyrics) => println!("{}", lyrics),
            None => println!("No lyrics stored for {}", track_id),
        },
        Commands::Play { track_id } => {
            library.play(&track_id, &shutdown).await?;
            println!("{}", library.path_to_track_file(&track_id).display());
        }
        Commands::RecordPlay { track_id } => {
            println!("{}", library.record_play(&track_id).await?);
        }
        Commands::RecordSkip { play_id, skipped_at } => {
            let play = library.record_skip(&play_id, skipped_at).await?;
            println!("Skipped {} at {}s (played {})", play.track_id, skipped_at, play.played_at.format("%Y-%m-%d %H:%M"));
        }
    }

    Ok(())
}
