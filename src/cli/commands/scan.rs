//! Library scanning and catalog listing commands.

use std::path::Path;
use tokio::runtime::Runtime;
use tracing::info;

use super::OutputFormat;
use crate::config::Config;
use crate::db::open_catalog;
use crate::library;
use crate::metadata::{LoftyTagReader, MetadataAggregator};
use crate::scanner::{LibraryScanner, ScanOptions};

/// Scan the music directory and commit changes to the catalog
pub fn cmd_scan(
    rt: &Runtime,
    config: &Config,
    db_path: &Path,
    root: &Path,
    dry_run: bool,
) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        info!(target: "scanner", db = %db_path.display(), "Catalog ready");

        let scanner = LibraryScanner::new(
            MetadataAggregator::new(LoftyTagReader::new()),
            ScanOptions {
                follow_links: config.library.follow_links,
            },
        );

        let report = library::sync_library(&scanner, &catalog, root, dry_run).await?;
        let result = &report.result;

        if dry_run {
            println!("Dry run of {}:", root.display());
            for candidate in &result.additions {
                println!("  + {}", candidate.filename);
            }
            for update in &result.updates {
                println!("  ~ {}", update.candidate.filename);
            }
            for track in &result.removals {
                println!("  - {}", track.filename);
            }
            for album in &result.orphaned_albums {
                println!("  - album: {} - {}", album.artist, album.title);
            }
        }

        println!(
            "Scanned {} files in {:.1}s: {} added, {} updated, {} removed, {} albums pruned",
            result.processed,
            report.elapsed.as_secs_f64(),
            result.additions.len(),
            result.updates.len(),
            result.removals.len(),
            report
                .summary
                .map(|s| s.albums_pruned)
                .unwrap_or(result.orphaned_albums.len()),
        );
        if !result.errors.is_empty() {
            println!("{} files skipped (see log for details)", result.errors.len());
        }
        Ok::<(), anyhow::Error>(())
    })
}

/// List all tracks in the catalog
pub fn cmd_list(rt: &Runtime, db_path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    rt.block_on(async {
        let catalog = open_catalog(db_path).await?;
        let tracks = catalog.list_tracks().await?;

        match format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tracks)?),
            OutputFormat::Text => {
                for track in &tracks {
                    let album = track.album_title.as_deref().unwrap_or("-");
                    println!(
                        "{:>6}  {} - {} [{}]  {}",
                        track.id, track.artist, track.title, album, track.filename
                    );
                }
                println!("{} tracks", tracks.len());
            }
        }
        Ok::<(), anyhow::Error>(())
    })
}
