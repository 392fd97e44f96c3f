//! CLI command definitions and dispatch.
//!
//! Each subcommand is implemented in its own submodule:
//! - `scan`: Library scanning and catalog listing
//! - `browse`: Search, artists and albums
//! - `stream`: Serving one track, transcoded if needed

mod browse;
mod scan;
mod stream;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tokio::runtime::Runtime;

use crate::config::{self, Config};
use crate::error::ResultExt;

pub use browse::{cmd_album, cmd_artist, cmd_artists, cmd_search};
pub use scan::{cmd_list, cmd_scan};
pub use stream::cmd_stream;

/// tunedex CLI
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Catalog database path (overrides the config file)
    #[arg(long, global = true, env = "TUNEDEX_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Scan the music directory and update the catalog
    Scan {
        /// Music directory (overrides the config file)
        #[arg(long, env = "TUNEDEX_MUSIC_DIR")]
        root: Option<PathBuf>,
        /// Report what would change without writing the catalog
        #[arg(long)]
        dry_run: bool,
    },
    /// List all tracks in the catalog
    List {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Search track and album artists and titles
    Search {
        /// Terms that must all match (at most 10 are used)
        query: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// List album artists
    Artists {
        /// Only artists sorting after this one
        #[arg(long, default_value = "")]
        start: String,
        #[arg(long, default_value_t = 30)]
        limit: u32,
    },
    /// List an artist's albums
    Artist {
        name: String,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Show an album and its tracks
    Album {
        id: i64,
        /// Print only the cover art path
        #[arg(long)]
        cover: bool,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Serve a track in one of the given formats
    Stream {
        /// Track ID in the catalog
        id: i64,
        /// Comma-separated acceptable formats, e.g. "mp3,ogg"
        formats: String,
        /// Music directory (overrides the config file)
        #[arg(long, env = "TUNEDEX_MUSIC_DIR")]
        root: Option<PathBuf>,
        /// Write transcoded output here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        write: bool,
    },
}

/// Run the specified CLI command.
pub fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<()> {
    let rt = Runtime::new()?;
    let db_path = cli.db.as_deref().unwrap_or(&config.library.database);

    match &cli.command {
        Commands::Scan { root, dry_run } => {
            let root = root.as_deref().unwrap_or(&config.library.root);
            cmd_scan(&rt, config, db_path, root, *dry_run)
        }
        Commands::List { format } => cmd_list(&rt, db_path, *format),
        Commands::Search { query, format } => cmd_search(&rt, db_path, query, *format),
        Commands::Artists { start, limit } => cmd_artists(&rt, db_path, start, *limit),
        Commands::Artist { name, format } => cmd_artist(&rt, db_path, name, *format),
        Commands::Album { id, cover, format } => cmd_album(&rt, db_path, *id, *cover, *format),
        Commands::Stream {
            id,
            formats,
            root,
            output,
        } => {
            let root = root.as_deref().unwrap_or(&config.library.root);
            cmd_stream(&rt, config, db_path, root, *id, formats, output.as_deref())
        }
        Commands::Config { write } => cmd_config(config, *write),
    }
}

/// Print the effective configuration as TOML.
fn cmd_config(config: &Config, write: bool) -> anyhow::Result<()> {
    print!("{}", toml::to_string_pretty(config)?);
    if write {
        config::save(config).with_context("writing config")?;
        if let Some(path) = config::config_path() {
            eprintln!("Wrote {}", path.display());
        }
    }
    Ok(())
}
