//! Sidecar cover art detection.
//!
//! A directory's cover is the first of [`COVER_FILENAMES`] present in it.
//! Matching is exact and case-sensitive; `COVER.JPG` is not a cover.

use std::path::Path;

use crate::metadata::relative_filename;

/// Candidate cover filenames, highest priority first.
pub const COVER_FILENAMES: &[&str] = &[
    "folder.jpg",
    "folder.png",
    "folder.gif",
    "cover.jpg",
    "cover.png",
    "cover.gif",
];

/// Find a cover among `file_names` (the entries of `dir`).
///
/// Returns the cover's path relative to the library `root`.
pub fn locate<S: AsRef<str>>(root: &Path, dir: &Path, file_names: &[S]) -> Option<String> {
    COVER_FILENAMES
        .iter()
        .find(|candidate| file_names.iter().any(|name| name.as_ref() == **candidate))
        .and_then(|name| relative_filename(&dir.join(name), root))
}

/// List `dir` and find its cover. Unreadable directories have no cover.
pub fn locate_in(root: &Path, dir: &Path) -> Option<String> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!(target: "scanner", dir = %dir.display(), error = %e, "Cannot list directory for cover art");
            return None;
        }
    };

    let names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();

    locate(root, dir, &names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_folder_jpg_beats_cover_png() {
        let root = Path::new("/music");
        let dir = root.join("Artist/Album");
        let files = ["01.mp3", "cover.png", "folder.jpg"];

        assert_eq!(
            locate(root, &dir, &files).as_deref(),
            Some("Artist/Album/folder.jpg")
        );
    }

    #[test]
    fn test_priority_order() {
        let root = Path::new("/music");
        assert_eq!(
            locate(root, root, &["cover.gif", "folder.gif"]).as_deref(),
            Some("folder.gif")
        );
        assert_eq!(
            locate(root, root, &["cover.gif", "cover.jpg"]).as_deref(),
            Some("cover.jpg")
        );
    }

    #[test]
    fn test_no_cover_found() {
        let root = Path::new("/music");
        let files: [&str; 2] = ["track.mp3", "front.jpg"];
        assert_eq!(locate(root, root, &files), None);
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("COVER.JPG"), b"fake jpeg").unwrap();

        assert_eq!(locate_in(temp.path(), temp.path()), None);
    }

    #[test]
    fn test_locate_in_lists_directory() {
        let temp = TempDir::new().unwrap();
        let album = temp.path().join("Album");
        std::fs::create_dir(&album).unwrap();
        std::fs::write(album.join("cover.png"), b"fake png").unwrap();
        std::fs::write(album.join("track.flac"), b"fake audio").unwrap();

        assert_eq!(
            locate_in(temp.path(), &album).as_deref(),
            Some("Album/cover.png")
        );
    }

    #[test]
    fn test_locate_in_missing_directory() {
        let temp = TempDir::new().unwrap();
        assert_eq!(locate_in(temp.path(), &temp.path().join("nope")), None);
    }
}
