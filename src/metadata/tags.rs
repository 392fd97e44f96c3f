//! Canonical field resolution from a raw tag map.
//!
//! Tag containers disagree on key names ("tracknumber" vs "track",
//! "albumartist" vs "album artist"), so every field is resolved from an
//! ordered list of candidate keys and the first non-empty value wins.

use super::{MetadataError, TagMap};

const TITLE_TAGS: &[&str] = &["title"];
const ARTIST_TAGS: &[&str] = &["artist"];
const TRACK_NUMBER_TAGS: &[&str] = &["track", "tracknumber"];
const ALBUM_TAGS: &[&str] = &["album"];
/// Falls back to the track artist when no dedicated album-artist tag exists.
const ALBUM_ARTIST_TAGS: &[&str] = &["album artist", "album_artist", "albumartist", "artist"];
const RELEASE_DATE_TAGS: &[&str] = &["date", "year"];
const LABEL_TAGS: &[&str] = &["label", "organization", "publisher"];
const CATALOG_NUMBER_TAGS: &[&str] = &["catalognumber", "catalog_number"];

/// Fields resolved from one file's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedTags {
    pub artist: String,
    pub title: String,
    pub track_number: i64,
    pub album_title: String,
    pub album_artist: String,
    pub release_date: String,
    pub label: Option<String>,
    pub catalog_number: Option<String>,
}

/// Return the first value of the first candidate key that has a
/// non-empty value. Only the first value of a multi-valued key is used.
pub fn first_defined_tag<'a>(tags: &'a TagMap, candidates: &[&str]) -> Option<&'a str> {
    candidates.iter().find_map(|name| {
        tags.get(*name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    })
}

fn field(tags: &TagMap, candidates: &[&str]) -> String {
    first_defined_tag(tags, candidates)
        .unwrap_or_default()
        .to_string()
}

/// Convert a track number tag value to an integer.
///
/// Values like "3/12" (third of twelve) keep only the part before the
/// first `/`. Anything that still isn't an integer yields -1.
pub fn parse_track_number(raw: &str) -> i64 {
    if raw.is_empty() {
        return -1;
    }

    let number = raw.split_once('/').map_or(raw, |(head, _)| head);
    number.trim().parse().unwrap_or(-1)
}

/// Resolve canonical fields, rejecting files without artist or title.
pub fn extract(tags: &TagMap) -> Result<ExtractedTags, MetadataError> {
    let artist = field(tags, ARTIST_TAGS);
    let title = field(tags, TITLE_TAGS);
    if artist.is_empty() || title.is_empty() {
        return Err(MetadataError::new("empty artist or title tag"));
    }

    Ok(ExtractedTags {
        track_number: parse_track_number(&field(tags, TRACK_NUMBER_TAGS)),
        album_title: field(tags, ALBUM_TAGS),
        album_artist: field(tags, ALBUM_ARTIST_TAGS),
        release_date: field(tags, RELEASE_DATE_TAGS),
        label: first_defined_tag(tags, LABEL_TAGS).map(str::to_string),
        catalog_number: first_defined_tag(tags, CATALOG_NUMBER_TAGS).map(str::to_string),
        artist,
        title,
    })
}


/// Property-based tests using proptest
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Any "N/M" value parses to N
        #[test]
        fn slash_suffix_is_ignored(n in 0i64..10_000, m in ".*") {
            prop_assert_eq!(parse_track_number(&format!("{}/{}", n, m)), n);
        }

        /// Plain integers round-trip
        #[test]
        fn plain_integers_parse(n in any::<i32>()) {
            prop_assert_eq!(parse_track_number(&n.to_string()), i64::from(n));
        }

        /// Non-numeric text never panics and never yields a real position
        #[test]
        fn letters_yield_negative_one(s in "[a-zA-Z ]{1,20}") {
            prop_assert_eq!(parse_track_number(&s), -1);
        }
    }
}
