//! Committing scan results to the catalog.
//!
//! [`Reconciler`] turns a [`ScanResult`] into one catalog change list and
//! applies it atomically. [`sync_library`] runs a full scan-and-commit
//! cycle and reports what happened.

use std::path::Path;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::db::{CatalogChange, CatalogRepository};
use crate::error::Result;
use crate::metadata::TagReader;
use crate::scanner::{LibraryScanner, ScanResult};

/// Counts of what a commit changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
    pub albums_pruned: usize,
}

impl CommitSummary {
    /// Total number of changed rows.
    pub fn committed(&self) -> usize {
        self.added + self.updated + self.removed + self.albums_pruned
    }
}

/// Applies staged scan results to a catalog.
pub struct Reconciler<'a> {
    repo: &'a dyn CatalogRepository,
}

impl<'a> Reconciler<'a> {
    pub fn new(repo: &'a dyn CatalogRepository) -> Self {
        Self { repo }
    }

    /// The change list for `result`, in commit order.
    ///
    /// Removals come first so a file that moved frees nothing its new
    /// entry needs; pruning comes last so it sees the final track set.
    pub fn plan<'r>(&self, result: &'r ScanResult) -> Vec<CatalogChange<'r>> {
        let mut changes = Vec::with_capacity(
            result.removals.len() + result.updates.len() + result.additions.len() + 1,
        );
        changes.extend(result.removals.iter().map(CatalogChange::DeleteTrack));
        changes.extend(
            result
                .updates
                .iter()
                .map(|u| CatalogChange::UpsertTrack(&u.candidate)),
        );
        changes.extend(result.additions.iter().map(CatalogChange::UpsertTrack));
        changes.push(CatalogChange::PruneOrphanAlbums);
        changes
    }

    /// Commit `result` in a single transaction.
    ///
    /// On error nothing is written. An empty result commits nothing.
    pub async fn apply(&self, result: &ScanResult) -> Result<CommitSummary> {
        if result.is_empty() {
            debug!(target: "reconcile", "Nothing to commit");
            return Ok(CommitSummary::default());
        }

        let changes = self.plan(result);
        let stats = self.repo.apply_changes(&changes).await?;

        let summary = CommitSummary {
            added: result.additions.len(),
            updated: result.updates.len(),
            removed: stats.tracks_deleted,
            albums_pruned: stats.albums_pruned,
        };
        debug!(
            target: "reconcile",
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            albums_pruned = summary.albums_pruned,
            "Applied scan result"
        );
        Ok(summary)
    }
}

/// Outcome of one [`sync_library`] cycle.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub result: ScanResult,
    /// `None` for dry runs
    pub summary: Option<CommitSummary>,
    pub elapsed: Duration,
}

/// Scan `root` and, unless `dry_run`, commit the result.
pub async fn sync_library<R: TagReader + 'static>(
    scanner: &LibraryScanner<R>,
    repo: &dyn CatalogRepository,
    root: &Path,
    dry_run: bool,
) -> Result<SyncReport> {
    let started = Instant::now();
    info!(target: "scanner", root = %root.display(), dry_run, "Scanning library");

    let result = scanner.scan(repo, root).await?;

    let summary = if dry_run {
        None
    } else {
        Some(Reconciler::new(repo).apply(&result).await?)
    };

    let elapsed = started.elapsed();
    info!(
        target: "scanner",
        processed = result.processed,
        added = result.additions.len(),
        updated = result.updates.len(),
        removed = result.removals.len(),
        orphaned_albums = result.orphaned_albums.len(),
        errors = result.errors.len(),
        elapsed_ms = elapsed.as_millis() as u64,
        "Scan complete"
    );

    Ok(SyncReport {
        result,
        summary,
        elapsed,
    })
}
