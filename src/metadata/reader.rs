//! Tag reading backed by the lofty crate.
//!
//! lofty exposes format-independent [`ItemKey`]s; these are flattened into
//! the lowercase key names the extractor's candidate lists use. Keys lofty
//! doesn't recognise are kept under their raw (lowercased) name, which is
//! how spellings like "ALBUM ARTIST" in Vorbis comments survive.

use lofty::file::TaggedFileExt;
use lofty::tag::{ItemKey, Tag};
use std::path::Path;

use super::{TagMap, TagReadError, TagReader};

/// Reads tags from MP3, FLAC, OGG and M4A files via lofty.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyTagReader;

impl LoftyTagReader {
    pub fn new() -> Self {
        Self
    }
}

impl TagReader for LoftyTagReader {
    fn read(&self, path: &Path) -> Result<TagMap, TagReadError> {
        let tagged_file = lofty::read_from_path(path)?;

        // Get the primary tag, or fall back to the first available tag
        let tag = tagged_file
            .primary_tag()
            .or_else(|| tagged_file.first_tag())
            .ok_or(TagReadError::NoTags)?;

        Ok(flatten(tag))
    }
}

fn key_name(key: &ItemKey) -> Option<String> {
    let name = match key {
        ItemKey::TrackTitle => "title",
        ItemKey::TrackArtist => "artist",
        ItemKey::AlbumTitle => "album",
        ItemKey::AlbumArtist => "albumartist",
        ItemKey::TrackNumber => "tracknumber",
        ItemKey::RecordingDate => "date",
        ItemKey::Year => "year",
        ItemKey::Label => "label",
        ItemKey::CatalogNumber => "catalognumber",
        ItemKey::Unknown(raw) => return Some(raw.to_lowercase()),
        _ => return None,
    };
    Some(name.to_string())
}

fn flatten(tag: &Tag) -> TagMap {
    let mut map = TagMap::new();
    for item in tag.items() {
        let Some(name) = key_name(item.key()) else {
            continue;
        };
        if let Some(text) = item.value().text() {
            map.entry(name).or_default().push(text.to_string());
        }
    }
    map
}
