//! Read-only catalog browsing: search, artists and albums.

use std::path::Path;
use tokio::runtime::Runtime;

use super::OutputFormat;
use crate::db::{CatalogRepository, open_catalog};
use crate::model::{Album, Track};

fn print_album(album: &Album) {
    println!(
        "{:>6}  {} - {} ({})",
        album.id, album.artist, album.title, album.release_date
    );
}

fn print_track(track: &Track) {
    println!(
        "{:>6}  {} - {}  {}",
        track.id, track.artist, track.title, track.filename
    );
}

/// Search artists and titles; every term must match
pub fn cmd_search(
    rt: &Runtime,
    db_path: &Path,
    query: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        let results = catalog.search(query).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
            OutputFormat::Text if results.is_empty() => println!("No matches for \"{query}\""),
            OutputFormat::Text => {
                if !results.albums.is_empty() {
                    println!("Albums:");
                    results.albums.iter().for_each(print_album);
                }
                if !results.tracks.is_empty() {
                    println!("Tracks:");
                    results.tracks.iter().for_each(print_track);
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// List album artists sorting after `start`
pub fn cmd_artists(rt: &Runtime, db_path: &Path, start: &str, limit: u32) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        for artist in catalog.artists_after(start, limit).await? {
            println!("{artist}");
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// List one artist's albums
pub fn cmd_artist(
    rt: &Runtime,
    db_path: &Path,
    name: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        let albums = catalog.albums_by_artist(name).await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&albums)?),
            OutputFormat::Text => albums.iter().for_each(print_album),
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// Show an album with its tracks, or just its cover path
pub fn cmd_album(
    rt: &Runtime,
    db_path: &Path,
    id: i64,
    cover: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;

        if cover {
            match catalog.album_cover(id).await? {
                Some(path) => println!("{path}"),
                None => anyhow::bail!("No cover art for album {}", id),
            }
            return Ok(());
        }

        let Some(album) = catalog.album_with_tracks(id).await? else {
            anyhow::bail!("No album with id {}", id);
        };

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&album)?),
            OutputFormat::Text => {
                print_album(&album.album);
                for track in &album.tracks {
                    println!("  {:>3}. {} - {}", track.track_number, track.artist, track.title);
                }
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
