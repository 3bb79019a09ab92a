//! Per-song archive pipeline.
//!
//! Resolve a URL, download, tag, then record the file and mark the song
//! archived in a single library transaction.
//! Any failure past URL resolution marks the song `ARCHIVING_FAILURE` and is
//! returned to the caller for logging only; it never affects sibling songs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::ArchiveError;
use crate::events::{ArchiveContext, ArchiveEvent, SongStatusChanged};
use crate::layout::FileLayout;
use crate::library::{Album, ArchiveRepository, ArchiveStatus, Artist, FileDescriptor, Song};
use crate::media::{MediaInspector, TrackTags};
use crate::plugin::{DownloadPlugin, DownloadRequest};

/// How a single song attempt ended, when it did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SongOutcome {
    /// File stored and recorded.
    Archived {
        file_id: i64,
        path: PathBuf,
        archived_duration: Option<i64>,
    },
    /// The plugin found no source.
    VideoNotFound,
    /// The manual URL was rejected by the plugin.
    InvalidUrl,
}

/// Archives one song at a time through a plugin.
#[derive(Clone)]
pub struct SongPipeline {
    repo: Arc<dyn ArchiveRepository>,
    layout: FileLayout,
    media: Arc<dyn MediaInspector>,
    ctx: ArchiveContext,
}

impl std::fmt::Debug for SongPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongPipeline")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl SongPipeline {
    #[must_use]
    pub fn new(
        repo: Arc<dyn ArchiveRepository>,
        layout: FileLayout,
        media: Arc<dyn MediaInspector>,
        ctx: ArchiveContext,
    ) -> Self {
        Self {
            repo,
            layout,
            media,
            ctx,
        }
    }

    /// Runs the whole pipeline for `song`.
    ///
    /// # Errors
    ///
    /// Returns the failure that made the song `ARCHIVING_FAILURE`. The status
    /// has already been recorded when this returns.
    #[instrument(skip(self, plugin, album, artist, song), fields(song_id = song.id, album_id = song.album_id))]
    pub async fn archive_one(
        &self,
        plugin: &dyn DownloadPlugin,
        album: &Album,
        artist: &Artist,
        song: &Song,
    ) -> Result<SongOutcome, ArchiveError> {
        match self.try_archive(plugin, album, artist, song).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(song_id = song.id, error = %err, "song archive failed");
                if let Err(record_err) = self
                    .record_terminal(song, ArchiveStatus::ArchivingFailure)
                    .await
                {
                    warn!(song_id = song.id, error = %record_err, "failed to record archive failure");
                }
                Err(err)
            }
        }
    }

    async fn try_archive(
        &self,
        plugin: &dyn DownloadPlugin,
        album: &Album,
        artist: &Artist,
        song: &Song,
    ) -> Result<SongOutcome, ArchiveError> {
        let manual_url = song
            .video_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty());

        let url = if let Some(url) = manual_url {
            debug!(url = %url, "using manual URL");
            let valid = plugin
                .validate_url(url)
                .await
                .map_err(|source| ArchiveError::DownloadFailure {
                    song_id: song.id,
                    source,
                })?;
            if !valid {
                warn!(url = %url, plugin = %plugin.descriptor().name, "URL not supported by plugin");
                self.record_terminal(song, ArchiveStatus::ArchivingFailure)
                    .await?;
                return Ok(SongOutcome::InvalidUrl);
            }
            url.to_string()
        } else {
            debug!(artist = %artist.name, title = %song.name, "searching");
            let found = plugin
                .search_song(&artist.name, &song.name, Some(&album.name))
                .await
                .map_err(|source| ArchiveError::DownloadFailure {
                    song_id: song.id,
                    source,
                })?;
            let Some(url) = found else {
                info!(title = %song.name, "no source found");
                self.record_terminal(song, ArchiveStatus::VideoNotFound)
                    .await?;
                return Ok(SongOutcome::VideoNotFound);
            };
            self.repo.update_song_video_url(song.id, Some(&url)).await?;
            url
        };

        let dest_path = self
            .layout
            .song_path(&artist.name, &album.name, song.track_number, &song.name)
            .await?;

        let request = DownloadRequest {
            url,
            artist: artist.name.clone(),
            album: album.name.clone(),
            track: song.track_number,
            title: song.name.clone(),
            year: album.release_year,
            dest_path,
        };
        let result = plugin
            .download_song(&request)
            .await
            .map_err(|source| ArchiveError::DownloadFailure {
                song_id: song.id,
                source,
            })?;

        let tags = TrackTags {
            title: song.name.clone(),
            artist: artist.name.clone(),
            album: album.name.clone(),
            track: song.track_number,
            year: album.release_year,
        };
        if let Err(e) = self.media.write_tags(&result.path, &tags).await {
            warn!(path = %result.path.display(), error = %e, "metadata write failed");
        }

        let archived_duration = match self.media.probe_duration(&result.path).await {
            Ok(seconds) => Some(seconds),
            Err(e) => {
                warn!(path = %result.path.display(), error = %e, "duration probe failed");
                None
            }
        };

        let descriptor = FileDescriptor::new(
            self.layout.storage_tag(),
            result.path.display().to_string(),
        );
        let attachment = match self
            .repo
            .mark_song_archived(song.id, &descriptor, archived_duration)
            .await
        {
            Ok(attachment) => attachment,
            Err(e) => {
                self.discard_download(&result.path).await;
                return Err(e.into());
            }
        };
        if let Some(replaced) = attachment
            .replaced
            .as_ref()
            .filter(|replaced| replaced.path != descriptor.path)
        {
            self.discard_download(Path::new(&replaced.path)).await;
        }
        let file_id = attachment.file_id;

        self.ctx
            .emit(ArchiveEvent::SongStatusChanged(SongStatusChanged {
                song_id: song.id,
                album_id: song.album_id,
                status: ArchiveStatus::Archived,
                file_id: Some(file_id),
                archived_duration,
            }));
        info!(title = %song.name, path = %result.path.display(), "song archived");

        Ok(SongOutcome::Archived {
            file_id,
            path: result.path,
            archived_duration,
        })
    }

    /// Removes a file the library no longer references.
    async fn discard_download(&self, path: &Path) {
        if let Err(e) = self.layout.delete_file(path).await {
            warn!(path = %path.display(), error = %e, "failed to remove unrecorded file");
        }
    }

    /// Stores a file-less terminal status and refreshes the album.
    async fn record_terminal(&self, song: &Song, status: ArchiveStatus) -> Result<(), ArchiveError> {
        self.repo
            .update_song_archive_status(song.id, status, None)
            .await?;
        self.repo.update_album_archive_progress(song.album_id).await?;
        self.ctx
            .emit(ArchiveEvent::SongStatusChanged(SongStatusChanged {
                song_id: song.id,
                album_id: song.album_id,
                status,
                file_id: None,
                archived_duration: None,
            }));
        Ok(())
    }
}
