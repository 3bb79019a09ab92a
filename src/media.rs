//! Tag writing and duration probing of archived audio files.
//!
//! Both operations are best effort from the archive pipeline's point of view:
//! a [`MediaError`] is logged and never changes a song's status.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use lofty::config::WriteOptions;
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::read_from_path;
use lofty::tag::{ItemKey, Tag};
use thiserror::Error;

/// Failures while inspecting or tagging a media file.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The file could not be opened or parsed.
    #[error("failed to read {}: {message}", path.display())]
    Read { path: PathBuf, message: String },

    /// Tags could not be written back.
    #[error("failed to write tags to {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    /// The blocking worker panicked or was cancelled.
    #[error("media worker failed: {0}")]
    Worker(String),
}

/// Tags written to a freshly archived file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackTags {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track: Option<i64>,
    pub year: Option<i64>,
}

/// Reads and writes audio file metadata.
#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Writes title/artist/album/track/year into the file.
    async fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<(), MediaError>;

    /// Returns the playback duration in whole seconds.
    async fn probe_duration(&self, path: &Path) -> Result<i64, MediaError>;
}

/// [`MediaInspector`] backed by `lofty`, run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyInspector;

#[async_trait]
impl MediaInspector for LoftyInspector {
    async fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<(), MediaError> {
        let path = path.to_path_buf();
        let tags = tags.clone();
        tokio::task::spawn_blocking(move || write_tags_blocking(&path, &tags))
            .await
            .map_err(|e| MediaError::Worker(e.to_string()))?
    }

    async fn probe_duration(&self, path: &Path) -> Result<i64, MediaError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe_duration_blocking(&path))
            .await
            .map_err(|e| MediaError::Worker(e.to_string()))?
    }
}

fn write_tags_blocking(path: &Path, tags: &TrackTags) -> Result<(), MediaError> {
    let mut tagged_file = read_from_path(path).map_err(|e| MediaError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let tag_type = tagged_file.primary_tag_type();
    if tagged_file.tag(tag_type).is_none() {
        tagged_file.insert_tag(Tag::new(tag_type));
    }
    let tag = tagged_file
        .tag_mut(tag_type)
        .ok_or_else(|| MediaError::Write {
            path: path.to_path_buf(),
            message: format!("no writable tag for {tag_type:?}"),
        })?;

    tag.set_title(tags.title.clone());
    tag.set_artist(tags.artist.clone());
    tag.set_album(tags.album.clone());
    if let Some(track) = tags.track.and_then(|t| u32::try_from(t).ok()) {
        tag.set_track(track);
    }
    if let Some(year) = tags.year {
        tag.insert_text(ItemKey::Year, year.to_string());
    }

    tagged_file
        .save_to_path(path, WriteOptions::default())
        .map_err(|e| MediaError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

fn probe_duration_blocking(path: &Path) -> Result<i64, MediaError> {
    let tagged_file = read_from_path(path).map_err(|e| MediaError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let seconds = tagged_file.properties().duration().as_secs();
    Ok(i64::try_from(seconds).unwrap_or(i64::MAX))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_duration_rejects_non_audio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.txt");
        std::fs::write(&path, b"definitely not an mpeg stream").unwrap();

        let err = LoftyInspector.probe_duration(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::Read { .. }));
    }

    #[tokio::test]
    async fn test_write_tags_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LoftyInspector
            .write_tags(&dir.path().join("missing.mp3"), &TrackTags::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.mp3"));
    }
}
