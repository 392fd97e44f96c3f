//! Test utilities and fixtures for tunedex tests.
//!
//! Provides a throwaway catalog database, a scripted [`TagReader`] so scans
//! don't need real audio files, and factories for candidate records.
//!
//! # Example
//!
//! ```ignore
//! use tunedex::test_utils::{temp_db, mock_track_candidate};
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (catalog, _dir) = temp_db().await;
//!     let track = mock_track_candidate("a/01.mp3", None);
//!     // ... test logic
//! }
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, UNIX_EPOCH};

use tempfile::TempDir;

use crate::db::{CatalogChange, CatalogRepository, ChangeStats, SqliteCatalog};
use crate::error::{Error, Result as CatalogResult};
use crate::metadata::{TagMap, TagReadError, TagReader};
use crate::model::{Album, AlbumCandidate, SearchResults, Track, TrackCandidate};

/// Creates a temporary catalog for testing.
///
/// The database lives in a temporary directory that is removed when the
/// returned `TempDir` is dropped. Keep it alive for the whole test.
pub async fn temp_db() -> (SqliteCatalog, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let db_url = crate::db::db_url(Some(dir.path().join("test.db").as_path()));

    let pool = crate::db::init_db(&db_url)
        .await
        .expect("Failed to initialize test database");

    (SqliteCatalog::new(pool), dir)
}

/// A catalog whose every operation fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCatalog;

fn unavailable<T>() -> CatalogResult<T> {
    Err(Error::Task("catalog unavailable".to_string()))
}

#[async_trait::async_trait]
impl CatalogRepository for FailingCatalog {
    async fn all_tracks(&self) -> CatalogResult<Vec<Track>> {
        unavailable()
    }
    async fn all_albums(&self) -> CatalogResult<Vec<Album>> {
        unavailable()
    }
    async fn track_by_id(&self, _id: i64) -> CatalogResult<Option<Track>> {
        unavailable()
    }
    async fn track_by_filename(&self, _filename: &str) -> CatalogResult<Option<Track>> {
        unavailable()
    }
    async fn album_by_key(&self, _artist: &str, _title: &str) -> CatalogResult<Option<Album>> {
        unavailable()
    }
    async fn tracks_for_album(&self, _album_id: i64) -> CatalogResult<Vec<Track>> {
        unavailable()
    }
    async fn album_by_id(&self, _id: i64) -> CatalogResult<Option<Album>> {
        unavailable()
    }
    async fn artists_after(&self, _start: &str, _limit: u32) -> CatalogResult<Vec<String>> {
        unavailable()
    }
    async fn albums_by_artist(&self, _artist: &str) -> CatalogResult<Vec<Album>> {
        unavailable()
    }
    async fn search(&self, _query: &str) -> CatalogResult<SearchResults> {
        unavailable()
    }
    async fn apply_changes(&self, _changes: &[CatalogChange<'_>]) -> CatalogResult<ChangeStats> {
        unavailable()
    }
}

/// Build a [`TagMap`] with one value per key.
pub fn tag_map(pairs: &[(&str, &str)]) -> TagMap {
    let mut map = TagMap::new();
    for (key, value) in pairs {
        map.entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    map
}

/// A [`TagReader`] that answers from a fixed table keyed by file name.
///
/// Files without an entry fail with [`TagReadError::NoTags`]. Every call is
/// counted, including failed ones.
#[derive(Debug, Clone, Default)]
pub struct StubTagReader {
    tags: HashMap<String, TagMap>,
    reads: Arc<AtomicUsize>,
}

impl StubTagReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file_name: &str, tags: TagMap) -> Self {
        self.tags.insert(file_name.to_string(), tags);
        self
    }

    /// Number of `read` calls so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Shared handle on the read counter, for readers moved into a scanner.
    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.reads)
    }
}

impl TagReader for StubTagReader {
    fn read(&self, path: &Path) -> Result<TagMap, TagReadError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.tags.get(name).cloned().ok_or(TagReadError::NoTags)
    }
}

/// Write a placeholder audio file at `root/relative`, creating parent dirs.
pub fn write_audio_file(root: &Path, relative: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directory");
    }
    std::fs::write(&path, b"not really audio").expect("Failed to write audio file");
    path
}

/// Set a file's modification time to `secs` after the epoch.
pub fn set_mtime(path: &Path, secs: u64) {
    let file = std::fs::File::options()
        .write(true)
        .open(path)
        .expect("Failed to open file");
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs))
        .expect("Failed to set mtime");
}

/// An album candidate with sensible defaults.
///
/// Customize with struct update syntax:
///
/// ```ignore
/// let other = AlbumCandidate {
///     title: "Other".to_string(),
///     ..mock_album_candidate()
/// };
/// ```
pub fn mock_album_candidate() -> AlbumCandidate {
    AlbumCandidate {
        artist: "Test Artist".to_string(),
        title: "Test Album".to_string(),
        release_date: "2023".to_string(),
        label: None,
        catalog_number: None,
        cover_art: None,
    }
}

/// A track candidate at `filename`, optionally on `album`.
pub fn mock_track_candidate(filename: &str, album: Option<AlbumCandidate>) -> TrackCandidate {
    TrackCandidate {
        artist: "Test Artist".to_string(),
        title: "Test Track".to_string(),
        filename: filename.to_string(),
        track_number: 1,
        mtime: 1_700_000_000,
        album,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CatalogRepository;

    #[tokio::test]
    async fn test_temp_db_creates_working_database() {
        let (catalog, _dir) = temp_db().await;

        let tracks = catalog.all_tracks().await.unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn test_stub_reader_counts_reads() {
        let reader = StubTagReader::new().with("a.mp3", tag_map(&[("title", "A")]));
        let counter = reader.read_counter();

        assert!(reader.read(Path::new("/x/a.mp3")).is_ok());
        assert!(matches!(
            reader.read(Path::new("/x/b.mp3")),
            Err(TagReadError::NoTags)
        ));
        assert_eq!(reader.reads(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_audio_file(dir.path(), "deep/nested/file.ogg");
        set_mtime(&path, 1_000_000);

        assert_eq!(crate::metadata::modified_secs(&path).unwrap(), 1_000_000);
    }

    #[test]
    fn test_mock_candidate_defaults() {
        let track = mock_track_candidate("a.mp3", Some(mock_album_candidate()));
        assert_eq!(track.filename, "a.mp3");
        assert_eq!(track.album.unwrap().title, "Test Album");
    }
}
