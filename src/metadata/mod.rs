//! Audio file metadata: tag reading, field extraction and aggregation.
//!
//! - [`TagReader`] is the capability that opens a file and returns its raw
//!   tags; [`LoftyTagReader`] is the production implementation.
//! - [`extract`] resolves canonical fields from the raw map.
//! - [`MetadataAggregator`] combines both with the directory's cover-art
//!   hint into a [`TrackCandidate`].
//!
//! Every failure below the aggregator (I/O, unsupported container, corrupt
//! frames, missing tags, missing artist/title) surfaces as a single
//! [`MetadataError`]. Callers treat it as "skip this file".

mod reader;
mod tags;

pub use reader::LoftyTagReader;
pub use tags::{ExtractedTags, extract, first_defined_tag, parse_track_number};

use std::collections::HashMap;
use std::path::{Component, Path};
use std::time::UNIX_EPOCH;

use crate::model::{AlbumCandidate, TrackCandidate};

/// Raw tags of one file: lowercase key name to its values.
pub type TagMap = HashMap<String, Vec<String>>;

/// Failure to read a tag container.
#[derive(Debug, thiserror::Error)]
pub enum TagReadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not read container: {0}")]
    Container(#[from] lofty::error::LoftyError),

    #[error("no tags!")]
    NoTags,
}

/// Opens an audio file and returns its raw tags.
pub trait TagReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<TagMap, TagReadError>;
}

/// A file whose tags can't sensibly be added to the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct MetadataError {
    pub reason: String,
}

impl MetadataError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<TagReadError> for MetadataError {
    fn from(e: TagReadError) -> Self {
        Self::new(format!("error: {}", e))
    }
}

/// Path of `path` relative to `root`, `/`-separated.
///
/// Returns `None` for paths outside the root or that aren't valid UTF-8.
pub fn relative_filename(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str()?),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// File modification time in whole seconds since the epoch.
pub fn modified_secs(path: &Path) -> std::io::Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(before) => -(before.duration().as_secs() as i64),
    };
    Ok(secs)
}

/// Builds catalog candidates for single files.
#[derive(Debug, Default)]
pub struct MetadataAggregator<R = LoftyTagReader> {
    reader: R,
}

impl<R: TagReader> MetadataAggregator<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Read `path` and produce its track candidate.
    ///
    /// The album candidate is only present when the album tag is set; it
    /// carries `cover_art` (already relative to `root`) as its cover.
    pub fn aggregate(
        &self,
        path: &Path,
        root: &Path,
        cover_art: Option<&str>,
    ) -> Result<TrackCandidate, MetadataError> {
        let filename = relative_filename(path, root)
            .ok_or_else(|| MetadataError::new("file is outside the library root"))?;
        let mtime =
            modified_secs(path).map_err(|e| MetadataError::from(TagReadError::Io(e)))?;

        let tags = self.reader.read(path)?;
        let extracted = extract(&tags)?;

        let album = (!extracted.album_title.is_empty()).then(|| AlbumCandidate {
            artist: extracted.album_artist,
            title: extracted.album_title,
            release_date: extracted.release_date,
            label: extracted.label,
            catalog_number: extracted.catalog_number,
            cover_art: cover_art.map(str::to_string),
        });

        Ok(TrackCandidate {
            artist: extracted.artist,
            title: extracted.title,
            filename,
            track_number: extracted.track_number,
            mtime,
            album,
        })
    }
}
