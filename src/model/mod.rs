//! Core data models for the music catalog.
//!
//! Defines the persisted entities [`Track`] and [`Album`] (derived with
//! SQLx `FromRow` for database mapping) and the candidate records a scan
//! produces before anything is written.
//!
//! # Database Schema
//!
//! - `albums` - one row per distinct (artist, title) pair
//! - `tracks` - one row per audio file, unique on `filename`

use serde::Serialize;
use sqlx::FromRow;

/// A release in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Album {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Album artist
    pub artist: String,
    /// Album title
    pub title: String,
    /// Free-form release date ("1979", "1979-11-30", ...)
    pub release_date: String,
    /// Record label
    pub label: Option<String>,
    /// Label catalog number
    pub catalog_number: Option<String>,
    /// Cover image, relative to the library root
    pub cover_art: Option<String>,
}

impl Album {
    pub fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.title)
    }
}

/// Album identity. Exact string equality, no case or whitespace folding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlbumKey {
    pub artist: String,
    pub title: String,
}

impl AlbumKey {
    pub fn new(artist: &str, title: &str) -> Self {
        Self {
            artist: artist.to_string(),
            title: title.to_string(),
        }
    }
}

/// An audio file in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Track {
    /// Database ID (auto-generated)
    pub id: i64,
    /// Track artist (never empty)
    pub artist: String,
    /// Track title (never empty)
    pub title: String,
    /// Path relative to the library root, `/`-separated (unique)
    pub filename: String,
    /// Position on the album, -1 when unknown
    pub track_number: i64,
    /// Album this track belongs to
    pub album_id: Option<i64>,
    /// Last seen modification time, seconds since the epoch
    pub mtime: i64,
}

impl Track {
    /// Lowercased file extension, used as the stored audio format.
    pub fn format(&self) -> Option<String> {
        file_format(&self.filename)
    }
}

/// Lowercased extension of a `/`-separated filename.
pub fn file_format(filename: &str) -> Option<String> {
    let name = filename.rsplit('/').next().unwrap_or(filename);
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_lowercase()),
        _ => None,
    }
}

/// Album fields extracted from one file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumCandidate {
    pub artist: String,
    pub title: String,
    pub release_date: String,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
    pub cover_art: Option<String>,
}

impl AlbumCandidate {
    pub fn key(&self) -> AlbumKey {
        AlbumKey::new(&self.artist, &self.title)
    }
}

/// A track as read from disk, not yet written to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCandidate {
    pub artist: String,
    pub title: String,
    pub filename: String,
    pub track_number: i64,
    pub mtime: i64,
    pub album: Option<AlbumCandidate>,
}

/// An album with its tracks in play order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlbumWithTracks {
    #[serde(flatten)]
    pub album: Album,
    pub tracks: Vec<Track>,
}

/// Catalog search hits, albums first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchResults {
    pub albums: Vec<Album>,
    pub tracks: Vec<Track>,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.albums.is_empty() && self.tracks.is_empty()
    }
}
