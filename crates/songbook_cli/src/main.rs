//! Command-line front end for the song catalog.
//!
//! # Responsibility
//! - Load configuration, start logging and open the catalog database.
//! - Bind arguments into catalog requests and print results as JSON.
//!
//! Catalog failures are printed to stderr as an error body and exit non-zero.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde_json::json;
use songbook_core::{
    core_version, init_logging_from, open_pool, AddSongRequest, CatalogConfig, CatalogService,
    GetSongRequest, OpContext, Pagination, ServiceError, SqliteSongRepository, UpdateSongRequest,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "songbook", version)]
#[command(about = "Manage a song catalog and page through lyrics by verse")]
struct Cli {
    /// TOML configuration file; missing file means defaults
    #[arg(long, global = true, default_value = "songbook.toml")]
    config: PathBuf,

    /// Abort the operation if it takes longer than this
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database and apply migrations
    Init,
    /// Add a new song
    Add(SongArgs),
    /// Look up a song by group and name
    Get {
        #[arg(long)]
        group: String,
        #[arg(long)]
        song: String,
    },
    /// List songs in insertion order
    List(PageArgs),
    /// Print one page of a song's verses
    Lyrics {
        id: String,
        #[command(flatten)]
        page: PageArgs,
    },
    /// Replace every field of a song
    Update {
        id: String,
        #[command(flatten)]
        song: SongArgs,
    },
    /// Delete a song
    Delete { id: String },
}

#[derive(Args)]
struct SongArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    group: String,
    /// Release date as DD.MM.YYYY
    #[arg(long)]
    release_date: String,
    /// Lyrics; verses are separated by blank lines
    #[arg(long, default_value = "")]
    text: String,
    #[arg(long, default_value = "")]
    link: String,
}

#[derive(Args)]
struct PageArgs {
    /// 1-based page index
    #[arg(long, default_value_t = 1, allow_negative_numbers = true)]
    page: i64,
    #[arg(long, default_value_t = 10, allow_negative_numbers = true)]
    page_size: i64,
}

impl PageArgs {
    fn pagination(&self) -> Pagination {
        Pagination {
            page_id: self.page,
            page_size: self.page_size,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ServiceError>() {
                Some(service_err) => eprintln!("{}", json!(service_err.to_response())),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = CatalogConfig::load(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    init_logging_from(&config.logging).context("failed to start logging")?;
    info!(
        "event=cli_start module=cli status=ok version={} db_path={}",
        core_version(),
        config.database.path.display()
    );

    let pool = open_pool(&config.database).with_context(|| {
        format!(
            "failed to open database {}",
            config.database.path.display()
        )
    })?;
    let service = CatalogService::new(SqliteSongRepository::new(pool));
    let ctx = match cli.timeout_ms {
        Some(ms) => OpContext::with_timeout(Duration::from_millis(ms)),
        None => OpContext::background(),
    };

    let output = match cli.command {
        Command::Init => json!({
            "db_path": config.database.path,
            "version": core_version(),
        }),
        Command::Add(song) => json!(service.add_song(&ctx, &song.add_request())?),
        Command::Get { group, song } => {
            json!(service.get_song(&ctx, &GetSongRequest { group, song })?)
        }
        Command::List(page) => json!(service.list_songs(&ctx, &page.pagination())?),
        Command::Lyrics { id, page } => {
            json!(service.get_song_lyrics(&ctx, &id, &page.pagination())?)
        }
        Command::Update { id, song } => {
            json!(service.update_song(&ctx, &song.update_request(id))?)
        }
        Command::Delete { id } => {
            service.delete_song(&ctx, &id)?;
            json!({ "deleted": id })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

impl SongArgs {
    fn add_request(self) -> AddSongRequest {
        AddSongRequest {
            name: self.name,
            group_name: self.group,
            release_date: self.release_date,
            text: self.text,
            link: self.link,
        }
    }

    fn update_request(self, id: String) -> UpdateSongRequest {
        UpdateSongRequest {
            id,
            name: self.name,
            group_name: self.group,
            release_date: self.release_date,
            text: self.text,
            link: self.link,
        }
    }
}
