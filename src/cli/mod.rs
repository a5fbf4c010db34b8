use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{fs::File, io::BufReader, path::PathBuf};

use crate::catalog::{CatalogService, Upload};
use crate::config::{self, MUSIC_PREFIX};
use crate::domain::mapping;
use crate::domain::page::{DEFAULT_PAGE_SIZE, PageRequest};
use crate::domain::track::{Category, TrackDto, TrackId};
use crate::http::server::{Catalog, HttpServer};
use crate::storage::blob::BlobStore;
use crate::storage::db::i64_seconds_to_local_time;
use crate::storage::repository::SqliteTrackRepository;

#[derive(Parser)]
#[command(name = "trackshelf")]
#[command(version = "0.1")]
#[command(about = "Audio track catalog with file uploads")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run http server exposing the catalog
    Serve,
    /// Search tracks, newest id last
    List {
        /// Case-insensitive part of the title
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short = 'g', long)]
        category: Option<Category>,
        #[arg(short, long, default_value_t = 0)]
        page: u32,
        #[arg(short, long, default_value_t = DEFAULT_PAGE_SIZE)]
        size: u32,
    },
    /// Show a single track
    Show { id: TrackId },
    /// Upload an audio file and create a track for it
    Add {
        file: PathBuf,
        #[arg(long)]
        title: String,
        #[arg(long)]
        artist: String,
        #[arg(long)]
        category: Category,
        #[arg(long)]
        description: Option<String>,
        /// Length in seconds
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        cover_image: Option<String>,
    },
    /// Delete a track record. The uploaded file is kept.
    Delete { id: TrackId },
}

fn open_catalog(cfg: &config::Config) -> anyhow::Result<Catalog> {
    let repo = SqliteTrackRepository::new(&cfg.database).context("Failed to open database")?;
    let blobs = BlobStore::new(
        cfg.uploads.music_dir(),
        MUSIC_PREFIX,
        cfg.uploads.base_url.clone(),
    );
    Ok(CatalogService::new(repo, blobs))
}

fn print_track(track: &TrackDto) {
    println!(
        "Track {}: {} - {} [{}]",
        track.id.map(|id| id.to_string()).unwrap_or_default(),
        track.artist.as_deref().unwrap_or_default(),
        track.title.as_deref().unwrap_or_default(),
        track.category.map(|c| c.as_str()).unwrap_or_default(),
    );
    if let (Some(url), Some(size)) = (&track.file_url, track.file_size) {
        println!("  file: {url} ({size} bytes)");
    }
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::Config::load(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let catalog = open_catalog(&cfg)?;
            let http_server = HttpServer::new(catalog, cfg.uploads, cfg.http);

            println!(
                "HTTP server running at http://{}:{}",
                http_server.config.bind_addr, http_server.config.port
            );
            http_server.run();
        }

        Commands::List {
            title,
            category,
            page,
            size,
        } => {
            let catalog = open_catalog(&cfg)?;
            let found = catalog.search(title.as_deref(), category, PageRequest::new(page, size)?)?;

            for track in &found.content {
                print_track(track);
            }
            println!(
                "Page {}/{} ({} tracks in total)",
                found.number + 1,
                found.total_pages.max(1),
                found.total_elements
            );
        }

        Commands::Show { id } => {
            let catalog = open_catalog(&cfg)?;
            let record = catalog.find_record(id)?;
            let track = mapping::to_dto(&record);

            print_track(&track);
            if let Some(description) = &track.description {
                println!("  description: {description}");
            }
            println!("  duration: {} s", record.duration);
            if let Some(cover) = &track.cover_image {
                println!("  cover: {cover}");
            }
            println!(
                "  created {}, updated {}",
                i64_seconds_to_local_time(record.created_at)?,
                i64_seconds_to_local_time(record.updated_at)?
            );
        }

        Commands::Add {
            file,
            title,
            artist,
            category,
            description,
            duration,
            cover_image,
        } => {
            let mut catalog = open_catalog(&cfg)?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let content = BufReader::new(
                File::open(&file)
                    .with_context(|| format!("Failed to open {}", file.to_string_lossy()))?,
            );

            let dto = TrackDto {
                title: Some(title),
                artist: Some(artist),
                category: Some(category),
                description,
                duration,
                cover_image,
                ..Default::default()
            };
            let created = catalog.create_with_file(dto, Upload::new(file_name, content))?;

            println!("Track added:");
            print_track(&created);
        }

        Commands::Delete { id } => {
            let mut catalog = open_catalog(&cfg)?;
            catalog.delete(id)?;
            println!("Track {id} deleted");
        }
    }

    Ok(())
}
