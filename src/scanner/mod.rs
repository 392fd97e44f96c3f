//! Library scanning: compares the music directory against the catalog.
//!
//! A scan walks the tree, re-reads tags only for files that are new or
//! whose modification time changed, and stages what would have to change
//! in the catalog. Nothing is written here; see
//! [`Reconciler`](crate::library::Reconciler) for the commit.
//!
//! Files whose metadata can't be read are left out of the observed set, so
//! a previously catalogued file that has since become unreadable is staged
//! for removal rather than lingering with stale tags.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::cover;
use crate::db::CatalogRepository;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::{MetadataAggregator, TagReader, modified_secs, relative_filename};
use crate::model::{Album, AlbumKey, Track, TrackCandidate};

/// Audio extensions picked up by a scan (matched case-insensitively).
pub const HANDLED_EXTENSIONS: &[&str] = &["ogg", "mp3", "flac", "m4a"];

/// Check if a path has a handled audio extension
pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| HANDLED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Walk options.
#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Descend into symlinked directories
    pub follow_links: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { follow_links: true }
    }
}

/// A catalogued track whose file changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUpdate {
    pub previous: Track,
    pub candidate: TrackCandidate,
}

/// A file skipped because its metadata couldn't be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanError {
    pub filename: String,
    pub reason: String,
}

/// Everything one scan found, staged but not applied.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub additions: Vec<TrackCandidate>,
    pub updates: Vec<StagedUpdate>,
    pub removals: Vec<Track>,
    pub orphaned_albums: Vec<Album>,
    pub errors: Vec<ScanError>,
    /// Handled files with usable metadata, changed or not
    pub processed: usize,
}

impl ScanResult {
    /// True when committing this result would not change the catalog.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty()
            && self.updates.is_empty()
            && self.removals.is_empty()
            && self.orphaned_albums.is_empty()
    }
}

/// Drives a full scan of one library root.
pub struct LibraryScanner<R> {
    aggregator: Arc<MetadataAggregator<R>>,
    options: ScanOptions,
    running: Mutex<()>,
}

impl<R: TagReader + 'static> LibraryScanner<R> {
    pub fn new(aggregator: MetadataAggregator<R>, options: ScanOptions) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            options,
            running: Mutex::new(()),
        }
    }

    pub fn aggregator(&self) -> &MetadataAggregator<R> {
        &self.aggregator
    }

    /// Scan `root` against the current catalog.
    ///
    /// Cycles on the same scanner are serialized. The walk runs on a
    /// blocking thread since tag reading is synchronous file I/O.
    pub async fn scan(&self, catalog: &dyn CatalogRepository, root: &Path) -> Result<ScanResult> {
        let _cycle = self.running.lock().await;

        if !root.is_dir() {
            return Err(Error::not_found(root));
        }

        let tracks = catalog.all_tracks().await.with_context("loading catalog tracks")?;
        let albums = catalog.all_albums().await.with_context("loading catalog albums")?;
        debug!(target: "scanner", tracks = tracks.len(), albums = albums.len(), "Loaded catalog");

        let aggregator = Arc::clone(&self.aggregator);
        let root = root.to_path_buf();
        let options = self.options;

        let result = tokio::task::spawn_blocking(move || {
            stage_changes(&aggregator, &root, options, tracks, albums)
        })
        .await?;

        Ok(result)
    }
}

/// Walk `root` and compute the staged changes against `tracks`/`albums`.
pub fn stage_changes<R: TagReader>(
    aggregator: &MetadataAggregator<R>,
    root: &Path,
    options: ScanOptions,
    tracks: Vec<Track>,
    albums: Vec<Album>,
) -> ScanResult {
    let known: HashMap<String, Track> = tracks
        .into_iter()
        .map(|t| (t.filename.clone(), t))
        .collect();

    let mut observed: HashSet<String> = HashSet::new();
    let mut covers: HashMap<PathBuf, Option<String>> = HashMap::new();
    let mut result = ScanResult::default();

    let walker = WalkDir::new(root)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // Includes symlink loops when following links
                warn!(target: "scanner", error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            debug!(
                target: "scanner",
                dir = %entry.path().display(),
                processed = result.processed,
                "Scanning directory"
            );
            continue;
        }
        if !entry.file_type().is_file() || !is_audio_file(entry.path()) {
            continue;
        }

        let path = entry.path();
        let Some(filename) = relative_filename(path, root) else {
            warn!(target: "scanner", path = %path.display(), "Skipping file with unusable name");
            continue;
        };

        let mtime = match modified_secs(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                skip(&mut result, filename, e.to_string());
                continue;
            }
        };

        observed.insert(filename.clone());
        let existing = known.get(&filename);
        if existing.is_some_and(|t| t.mtime == mtime) {
            result.processed += 1;
            continue;
        }

        let dir = path.parent().unwrap_or(root);
        let cover_art = covers
            .entry(dir.to_path_buf())
            .or_insert_with(|| cover::locate_in(root, dir));

        match aggregator.aggregate(path, root, cover_art.as_deref()) {
            Ok(candidate) => {
                match existing {
                    Some(previous) => result.updates.push(StagedUpdate {
                        previous: previous.clone(),
                        candidate,
                    }),
                    None => result.additions.push(candidate),
                }
                result.processed += 1;
            }
            Err(e) => {
                observed.remove(&filename);
                skip(&mut result, filename, e.reason);
            }
        }
    }

    let mut removals: Vec<Track> = known
        .values()
        .filter(|t| !observed.contains(&t.filename))
        .cloned()
        .collect();
    removals.sort_by(|a, b| a.filename.cmp(&b.filename));
    result.removals = removals;

    result.orphaned_albums = orphaned_albums(&result, known.values(), albums);
    result
}

fn skip(result: &mut ScanResult, filename: String, reason: String) {
    warn!(target: "scanner", file = %filename, reason = %reason, "Skipping");
    result.errors.push(ScanError { filename, reason });
}

/// Albums that no track will reference once `result` is applied.
///
/// An album survives if a catalogued track that is neither removed nor
/// rewritten still points at it, or if a staged track claims its key.
fn orphaned_albums<'a>(
    result: &ScanResult,
    known: impl Iterator<Item = &'a Track>,
    albums: Vec<Album>,
) -> Vec<Album> {
    let replaced: HashSet<i64> = result
        .removals
        .iter()
        .map(|t| t.id)
        .chain(result.updates.iter().map(|u| u.previous.id))
        .collect();

    let still_referenced: HashSet<i64> = known
        .filter(|t| !replaced.contains(&t.id))
        .filter_map(|t| t.album_id)
        .collect();

    let claimed: HashSet<AlbumKey> = result
        .additions
        .iter()
        .chain(result.updates.iter().map(|u| &u.candidate))
        .filter_map(|c| c.album.as_ref().map(|a| a.key()))
        .collect();

    albums
        .into_iter()
        .filter(|album| !still_referenced.contains(&album.id) && !claimed.contains(&album.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FailingCatalog, StubTagReader, tag_map, temp_db, write_audio_file};

    fn stub() -> StubTagReader {
        StubTagReader::new()
            .with(
                "01.mp3",
                tag_map(&[("artist", "Broadcast"), ("title", "Pendulum"), ("album", "Haha Sound")]),
            )
            .with(
                "02.FLAC",
                tag_map(&[("artist", "Broadcast"), ("title", "Valerie"), ("album", "Haha Sound")]),
            )
            .with("loose.ogg", tag_map(&[("artist", "Solo"), ("title", "Alone")]))
    }

    fn catalogued(id: i64, root: &Path, filename: &str, album_id: Option<i64>) -> Track {
        Track {
            id,
            artist: "Old".to_string(),
            title: "Old".to_string(),
            filename: filename.to_string(),
            track_number: -1,
            album_id,
            mtime: modified_secs(&root.join(filename)).unwrap_or(0),
        }
    }

    fn album(id: i64, artist: &str, title: &str) -> Album {
        Album {
            id,
            artist: artist.to_string(),
            title: title.to_string(),
            release_date: String::new(),
            label: None,
            catalog_number: None,
            cover_art: None,
        }
    }

    #[test]
    fn test_is_audio_file() {
        assert!(is_audio_file(Path::new("a/song.mp3")));
        assert!(is_audio_file(Path::new("UPPERCASE.OGG")));
        assert!(is_audio_file(Path::new("x.m4a")));
        assert!(!is_audio_file(Path::new("track.wav")));
        assert!(!is_audio_file(Path::new("notes.txt")));
        assert!(!is_audio_file(Path::new("mp3")));
    }

    #[test]
    fn test_new_files_are_staged_as_additions() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "Broadcast/Haha Sound/01.mp3");
        write_audio_file(root, "Broadcast/Haha Sound/02.FLAC");
        write_audio_file(root, "loose.ogg");
        std::fs::write(root.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(root.join("Broadcast/Haha Sound/folder.jpg"), b"img").unwrap();

        let aggregator = MetadataAggregator::new(stub());
        let result = stage_changes(&aggregator, root, ScanOptions::default(), vec![], vec![]);

        assert_eq!(result.additions.len(), 3);
        assert_eq!(result.processed, 3);
        assert!(result.errors.is_empty());
        assert!(result.updates.is_empty() && result.removals.is_empty());

        let pendulum = result
            .additions
            .iter()
            .find(|c| c.title == "Pendulum")
            .unwrap();
        assert_eq!(pendulum.filename, "Broadcast/Haha Sound/01.mp3");
        assert_eq!(
            pendulum.album.as_ref().unwrap().cover_art.as_deref(),
            Some("Broadcast/Haha Sound/folder.jpg")
        );
    }

    #[test]
    fn test_unchanged_files_are_not_reread() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "loose.ogg");
        let known = vec![catalogued(1, root, "loose.ogg", None)];

        let aggregator = MetadataAggregator::new(stub());
        let result = stage_changes(&aggregator, root, ScanOptions::default(), known, vec![]);

        assert_eq!(aggregator.reader().reads(), 0);
        assert!(result.is_empty());
        assert_eq!(result.processed, 1);
    }

    #[test]
    fn test_changed_mtime_stages_update() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "loose.ogg");
        let mut stale = catalogued(7, root, "loose.ogg", None);
        stale.mtime -= 100;

        let aggregator = MetadataAggregator::new(stub());
        let result =
            stage_changes(&aggregator, root, ScanOptions::default(), vec![stale.clone()], vec![]);

        assert_eq!(aggregator.reader().reads(), 1);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].previous, stale);
        assert_eq!(result.updates[0].candidate.title, "Alone");
        assert!(result.additions.is_empty());
    }

    #[test]
    fn test_unreadable_file_is_removed_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "broken.mp3");
        let mut stale = catalogued(3, root, "broken.mp3", None);
        stale.mtime -= 1;

        let aggregator = MetadataAggregator::new(stub());
        let result =
            stage_changes(&aggregator, root, ScanOptions::default(), vec![stale.clone()], vec![]);

        assert_eq!(result.removals, vec![stale]);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].filename, "broken.mp3");
        assert_eq!(result.processed, 0);
    }

    #[test]
    fn test_missing_file_removed_and_album_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "loose.ogg");
        let known = vec![
            catalogued(1, root, "loose.ogg", None),
            catalogued(2, root, "gone/01.mp3", Some(10)),
        ];
        let albums = vec![album(10, "Gone", "Forever"), album(11, "Empty", "Already")];

        let aggregator = MetadataAggregator::new(stub());
        let result = stage_changes(&aggregator, root, ScanOptions::default(), known, albums);

        assert_eq!(result.removals.len(), 1);
        assert_eq!(result.removals[0].filename, "gone/01.mp3");
        let orphan_ids: Vec<i64> = result.orphaned_albums.iter().map(|a| a.id).collect();
        assert_eq!(orphan_ids, vec![10, 11]);
    }

    #[test]
    fn test_album_claimed_by_addition_is_not_orphaned() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_audio_file(root, "Broadcast/Haha Sound/01.mp3");
        // The only catalogued track of the album moved to a new filename
        let known = vec![catalogued(1, root, "old/01.mp3", Some(5))];
        let albums = vec![album(5, "Broadcast", "Haha Sound")];

        let aggregator = MetadataAggregator::new(stub());
        let result = stage_changes(&aggregator, root, ScanOptions::default(), known, albums);

        assert_eq!(result.additions.len(), 1);
        assert_eq!(result.removals.len(), 1);
        assert!(result.orphaned_albums.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlinked_directories() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        write_audio_file(outside.path(), "loose.ogg");
        let root = dir.path();
        std::os::unix::fs::symlink(outside.path(), root.join("linked")).unwrap();

        let aggregator = MetadataAggregator::new(stub());
        let followed = stage_changes(&aggregator, root, ScanOptions { follow_links: true }, vec![], vec![]);
        assert_eq!(followed.additions.len(), 1);
        assert_eq!(followed.additions[0].filename, "linked/loose.ogg");

        let not_followed =
            stage_changes(&aggregator, root, ScanOptions { follow_links: false }, vec![], vec![]);
        assert!(not_followed.additions.is_empty());
    }

    #[tokio::test]
    async fn test_scan_missing_root_fails() {
        let (catalog, dir) = temp_db().await;
        let scanner = LibraryScanner::new(MetadataAggregator::new(stub()), ScanOptions::default());

        let result = scanner.scan(&catalog, &dir.path().join("no-such-dir")).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_scan_reports_catalog_load_failure() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = LibraryScanner::new(MetadataAggregator::new(stub()), ScanOptions::default());

        let err = scanner.scan(&FailingCatalog, dir.path()).await.unwrap_err();
        assert!(matches!(err, Error::WithContext { .. }));
        assert!(err.to_string().starts_with("loading catalog tracks"));
    }
}
