//! On-disk layout of the archived library.
//!
//! Files live under `<base>/<artist>/<album>/<NN - ><title>.mp3`.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

/// Storage backend tag recorded on every file this layout produces.
pub const FILESYSTEM_TAG: &str = "FILESYSTEM";

/// Longest single path component most filesystems accept, in bytes.
const MAX_NAME_BYTES: usize = 255;
const EXTENSION: &str = ".mp3";
const FALLBACK_COMPONENT: &str = "Unknown";

/// Cleans a value for use as a single path component.
///
/// Strips characters that are invalid on common filesystems, collapses
/// whitespace, drops trailing dots and spaces and caps the length at
/// 255 bytes.
#[must_use]
pub fn sanitize_component(value: &str) -> String {
    clean_component(value, MAX_NAME_BYTES)
}

/// File name for a song: zero-padded track prefix when known.
///
/// The whole name, prefix and extension included, fits in 255 bytes.
#[must_use]
pub fn song_file_name(track_number: Option<i64>, title: &str) -> String {
    let prefix = match track_number {
        Some(track) if track > 0 => format!("{track:02} - "),
        _ => String::new(),
    };
    let budget = MAX_NAME_BYTES.saturating_sub(prefix.len() + EXTENSION.len());
    let title = clean_component(title, budget);
    format!("{prefix}{title}{EXTENSION}")
}

fn clean_component(value: &str, max_bytes: usize) -> String {
    let stripped: String = value
        .chars()
        .filter_map(|c| match c {
            c if c.is_whitespace() => Some(' '),
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => None,
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped = truncate_bytes(&collapsed, max_bytes);
    let trimmed = capped.trim_end_matches(|c: char| c == '.' || c.is_whitespace());

    if trimmed.is_empty() {
        return FALLBACK_COMPONENT.to_string();
    }
    trimmed.to_string()
}

/// Longest prefix of `value` within `max_bytes` that ends on a char boundary.
fn truncate_bytes(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// Filesystem layout rooted at the library directory.
#[derive(Debug, Clone)]
pub struct FileLayout {
    base: PathBuf,
}

impl FileLayout {
    #[must_use]
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Tag stored in `file_document.file_manager`.
    #[must_use]
    pub fn storage_tag(&self) -> &'static str {
        FILESYSTEM_TAG
    }

    /// Directory for an album, without touching the filesystem.
    #[must_use]
    pub fn album_dir(&self, artist: &str, album: &str) -> PathBuf {
        self.base
            .join(sanitize_component(artist))
            .join(sanitize_component(album))
    }

    /// Destination path for a song; creates the album directory on demand.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    #[instrument(skip(self))]
    pub async fn song_path(
        &self,
        artist: &str,
        album: &str,
        track_number: Option<i64>,
        title: &str,
    ) -> io::Result<PathBuf> {
        let dir = self.album_dir(artist, album);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(dir.join(song_file_name(track_number, title)))
    }

    /// Copies a user-supplied file to the song's place in the library.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the source cannot be read or the copy fails.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub async fn import_file(
        &self,
        source: &Path,
        artist: &str,
        album: &str,
        track_number: Option<i64>,
        title: &str,
    ) -> io::Result<PathBuf> {
        let dest = self.song_path(artist, album, track_number, title).await?;
        tokio::fs::copy(source, &dest).await?;
        Ok(dest)
    }

    /// Removes a file; a file that is already gone counts as removed.
    ///
    /// # Errors
    ///
    /// Returns any IO error other than "not found".
    pub async fn delete_file(&self, path: &Path) -> io::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "file removed");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_component_strips_invalid_chars() {
        assert_eq!(sanitize_component("AC/DC: Live?"), "ACDC Live");
        assert_eq!(sanitize_component("a\u{0007}b"), "ab");
    }

    #[test]
    fn test_sanitize_component_collapses_whitespace_and_trailing_dots() {
        assert_eq!(sanitize_component("  Too   many\tspaces ... "), "Too many spaces");
    }

    #[test]
    fn test_sanitize_component_fallback_and_cap() {
        assert_eq!(sanitize_component("???"), "Unknown");
        assert_eq!(sanitize_component("..."), "Unknown");
        assert_eq!(sanitize_component(&"x".repeat(400)).len(), 255);
    }

    #[test]
    fn test_sanitize_component_turns_tabs_and_newlines_into_spaces() {
        assert_eq!(sanitize_component("Side\tA\nPart\r\nTwo"), "Side A Part Two");
    }

    #[test]
    fn test_sanitize_component_caps_bytes_on_char_boundary() {
        // 3 bytes per char
        let cleaned = sanitize_component(&"\u{65e5}".repeat(100));
        assert!(cleaned.len() <= 255);
        assert_eq!(cleaned.chars().count(), 85);
    }

    #[test]
    fn test_song_file_name_fits_name_max_with_prefix() {
        let name = song_file_name(Some(7), &"a".repeat(254));
        assert_eq!(name.len(), 255);
        assert!(name.starts_with("07 - "));
        assert!(name.ends_with("aaa.mp3"));

        let untracked = song_file_name(None, &"\u{00e9}".repeat(200));
        assert!(untracked.len() <= 255);
        assert!(untracked.ends_with(".mp3"));
    }

    #[test]
    fn test_song_file_name_track_prefix() {
        assert_eq!(song_file_name(Some(3), "Lullaby"), "03 - Lullaby.mp3");
        assert_eq!(song_file_name(Some(12), "Plainsong"), "12 - Plainsong.mp3");
        assert_eq!(song_file_name(None, "Untitled"), "Untitled.mp3");
        assert_eq!(song_file_name(Some(0), "Zero"), "Zero.mp3");
    }

    #[tokio::test]
    async fn test_song_path_creates_album_dir() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());

        let path = layout
            .song_path("The Cure", "Disintegration", Some(1), "Plainsong")
            .await
            .unwrap();

        assert_eq!(
            path,
            dir.path()
                .join("The Cure")
                .join("Disintegration")
                .join("01 - Plainsong.mp3")
        );
        assert!(path.parent().unwrap().is_dir());
    }

    #[tokio::test]
    async fn test_delete_file_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let layout = FileLayout::new(dir.path());
        let path = dir.path().join("song.mp3");
        std::fs::write(&path, b"data").unwrap();

        layout.delete_file(&path).await.unwrap();
        assert!(!path.exists());
        layout.delete_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_import_file_copies_into_layout() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload.mp3");
        std::fs::write(&source, b"audio").unwrap();
        let layout = FileLayout::new(dir.path().join("library"));

        let dest = layout
            .import_file(&source, "Low", "Trust", Some(2), "Candy Girl")
            .await
            .unwrap();
        assert!(dest.ends_with("Low/Trust/02 - Candy Girl.mp3"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"audio");
    }
}
