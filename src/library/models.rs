//! Library record types and archive status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Archive status shared by songs and albums.
///
/// `PartiallyArchived` is only ever assigned to albums; the song table rejects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArchiveStatus {
    /// Waiting for the next archive pass.
    NotArchived,
    /// A file is stored for this song (or every song of an album).
    Archived,
    /// The plugin search found no source for the song.
    VideoNotFound,
    /// Download failed or the manual URL was rejected by the plugin.
    ArchivingFailure,
    /// Album-only: some songs are archived, others are still pending.
    PartiallyArchived,
}

impl ArchiveStatus {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotArchived => "NOT_ARCHIVED",
            Self::Archived => "ARCHIVED",
            Self::VideoNotFound => "VIDEO_NOT_FOUND",
            Self::ArchivingFailure => "ARCHIVING_FAILURE",
            Self::PartiallyArchived => "PARTIALLY_ARCHIVED",
        }
    }

    /// True for the statuses an automatic pass will not revisit.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Archived | Self::VideoNotFound | Self::ArchivingFailure
        )
    }

    /// True for the terminal statuses that did not produce a file.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::VideoNotFound | Self::ArchivingFailure)
    }
}

impl fmt::Display for ArchiveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ArchiveStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_ARCHIVED" => Ok(Self::NotArchived),
            "ARCHIVED" => Ok(Self::Archived),
            "VIDEO_NOT_FOUND" => Ok(Self::VideoNotFound),
            "ARCHIVING_FAILURE" => Ok(Self::ArchivingFailure),
            "PARTIALLY_ARCHIVED" => Ok(Self::PartiallyArchived),
            _ => Err(format!("invalid archive status: {s}")),
        }
    }
}

/// An artist known to the library.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: i64,
    pub name: String,
    /// External catalog identifier; artists are deduplicated on it.
    pub catalog_id: String,
}

/// An album; its status is derived from its songs.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i64,
    pub name: String,
    pub artist_id: i64,
    pub catalog_id: String,
    pub release_group_id: Option<String>,
    pub release_year: Option<i64>,
    /// Stored status text, parsed via `status()`.
    #[sqlx(rename = "archive_status")]
    #[serde(rename = "status")]
    pub status_str: String,
}

impl Album {
    /// Returns the parsed status enum, falling back to `NotArchived`.
    #[must_use]
    pub fn status(&self) -> ArchiveStatus {
        self.status_str.parse().unwrap_or(ArchiveStatus::NotArchived)
    }
}

/// A song tracked for archiving.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: i64,
    pub name: String,
    pub album_id: i64,
    pub catalog_id: Option<String>,
    pub track_number: Option<i64>,
    /// Duration reported by the catalog, in seconds.
    pub expected_duration: Option<i64>,
    /// Duration measured from the archived file, in seconds.
    pub archived_duration: Option<i64>,
    /// Source URL, either discovered by the plugin or supplied by the user.
    pub video_url: Option<String>,
    /// Stored status text, parsed via `status()`.
    #[sqlx(rename = "archive_status")]
    #[serde(rename = "status")]
    pub status_str: String,
    /// Reference to the owning `file_document` row.
    pub archived_file: Option<i64>,
}

impl Song {
    /// Returns the parsed status enum, falling back to `NotArchived`.
    #[must_use]
    pub fn status(&self) -> ArchiveStatus {
        self.status_str.parse().unwrap_or(ArchiveStatus::NotArchived)
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Song {{ id: {}, name: {}, status: {} }}",
            self.id,
            self.name,
            self.status()
        )
    }
}

/// A stored file owned by exactly one song.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub id: i64,
    /// Storage backend tag (e.g. `FILESYSTEM`).
    pub file_manager: String,
    /// Backend-specific location.
    pub path: String,
    pub created_at: String,
}

/// Descriptor for a file about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub file_manager: String,
    pub path: String,
}

impl FileDescriptor {
    #[must_use]
    pub fn new(file_manager: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            file_manager: file_manager.into(),
            path: path.into(),
        }
    }
}

/// One row of the album listing.
#[derive(Debug, Clone, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumOverview {
    pub id: i64,
    pub name: String,
    pub artist_name: String,
    pub release_year: Option<i64>,
    #[sqlx(rename = "archive_status")]
    #[serde(rename = "status")]
    pub status_str: String,
    pub total_tracks: i64,
    pub archived_tracks: i64,
}

/// Outcome of setting a song's source URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlChange {
    /// The song after the update.
    pub song: Song,
    /// True when the song was put back into the pending queue.
    pub requeued: bool,
    /// File record detached from the song; its physical file is now orphaned.
    pub removed_file: Option<FileDocument>,
}

/// Outcome of attaching a manually supplied file to a song.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub file_id: i64,
    /// Previous file record that was replaced, if any.
    pub replaced: Option<FileDocument>,
}

/// Artist fields accepted on import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewArtist {
    pub name: String,
    pub catalog_id: String,
}

/// Album fields accepted on import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlbum {
    pub name: String,
    pub catalog_id: String,
    #[serde(default)]
    pub release_group_id: Option<String>,
    #[serde(default)]
    pub release_year: Option<i64>,
}

/// Song fields accepted on import.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSong {
    pub name: String,
    #[serde(default)]
    pub catalog_id: Option<String>,
    #[serde(default)]
    pub track_number: Option<i64>,
    #[serde(default)]
    pub expected_duration: Option<i64>,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_archive_status_from_str_valid() {
        for status in [
            ArchiveStatus::NotArchived,
            ArchiveStatus::Archived,
            ArchiveStatus::VideoNotFound,
            ArchiveStatus::ArchivingFailure,
            ArchiveStatus::PartiallyArchived,
        ] {
            assert_eq!(status.as_str().parse::<ArchiveStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_archive_status_from_str_invalid() {
        let result = "archived".parse::<ArchiveStatus>();
        assert!(result.unwrap_err().contains("invalid archive status"));
    }

    #[test]
    fn test_archive_status_serializes_as_db_value() {
        let json = serde_json::to_string(&ArchiveStatus::VideoNotFound).unwrap();
        assert_eq!(json, "\"VIDEO_NOT_FOUND\"");
    }

    #[test]
    fn test_archive_status_terminal_classification() {
        assert!(ArchiveStatus::Archived.is_terminal());
        assert!(ArchiveStatus::VideoNotFound.is_terminal());
        assert!(ArchiveStatus::ArchivingFailure.is_terminal());
        assert!(!ArchiveStatus::NotArchived.is_terminal());
        assert!(!ArchiveStatus::Archived.is_failure());
        assert!(ArchiveStatus::ArchivingFailure.is_failure());
    }

    #[test]
    fn test_song_status_falls_back_to_not_archived() {
        let song = Song {
            id: 1,
            name: "Intro".to_string(),
            album_id: 1,
            catalog_id: None,
            track_number: Some(1),
            expected_duration: None,
            archived_duration: None,
            video_url: None,
            status_str: "garbage".to_string(),
            archived_file: None,
        };

        assert_eq!(song.status(), ArchiveStatus::NotArchived);
        assert!(song.to_string().contains("NOT_ARCHIVED"));
    }

    #[test]
    fn test_song_serializes_camel_case_with_status() {
        let song = Song {
            id: 7,
            name: "Outro".to_string(),
            album_id: 3,
            catalog_id: None,
            track_number: None,
            expected_duration: Some(200),
            archived_duration: None,
            video_url: None,
            status_str: "ARCHIVED".to_string(),
            archived_file: Some(9),
        };

        let value = serde_json::to_value(&song).unwrap();
        assert_eq!(value["albumId"], 3);
        assert_eq!(value["status"], "ARCHIVED");
        assert_eq!(value["archivedFile"], 9);
    }
}
