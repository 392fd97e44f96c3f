//! tunedex - A music library indexer with an on-demand transcoding proxy.
//!
//! Scans a music directory into a SQLite catalog of tracks and albums, and
//! serves catalogued tracks either as-is or transcoded to Ogg/Vorbis by an
//! external encoder.

pub mod cli;
pub mod config;
pub mod cover;
pub mod db;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod scanner;
pub mod stream;
#[cfg(test)]
pub mod test_utils;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = config::load();
    cli::run_command(&args, &config)
}
