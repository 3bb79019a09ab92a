//! User actions on archive state outside the pass loop.
//!
//! [`ArchiveService`] applies manual URL changes, uploads, file deletions,
//! album resets and deletes through [`Library`], removes orphaned physical
//! files best effort, and reports the resulting status changes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::events::{AlbumStatusChanged, ArchiveContext, ArchiveEvent, SongStatusChanged};
use crate::layout::FileLayout;
use crate::library::{
    AlbumOverview, ArchiveStatus, FileAttachment, FileDescriptor, FileDocument, Library,
    LibraryError, NewAlbum, NewArtist, NewSong, Song, UrlChange,
};
use crate::media::MediaInspector;

/// Errors from user actions.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// The uploaded file could not be copied into the library.
    #[error("failed to import {}: {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest could not be read or parsed.
    #[error("invalid import manifest: {0}")]
    Manifest(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

/// One artist, one album and its tracklist, as accepted by `import`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportManifest {
    pub artist: NewArtist,
    pub album: NewAlbum,
    #[serde(default)]
    pub songs: Vec<NewSong>,
}

impl ImportManifest {
    /// Parses a JSON manifest.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Manifest`] for malformed JSON or an empty album.
    pub fn from_json(raw: &str) -> Result<Self> {
        let manifest: Self =
            serde_json::from_str(raw).map_err(|e| ServiceError::Manifest(e.to_string()))?;
        if manifest.songs.is_empty() {
            return Err(ServiceError::Manifest("album has no songs".to_string()));
        }
        Ok(manifest)
    }
}

/// Ids created or refreshed by an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub artist_id: i64,
    pub album_id: i64,
    pub song_ids: Vec<i64>,
}

/// Facade for the actions a user can take on archived songs and albums.
#[derive(Clone)]
pub struct ArchiveService {
    library: Library,
    layout: FileLayout,
    media: Arc<dyn MediaInspector>,
    ctx: ArchiveContext,
}

impl std::fmt::Debug for ArchiveService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveService")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl ArchiveService {
    #[must_use]
    pub fn new(
        library: Library,
        layout: FileLayout,
        media: Arc<dyn MediaInspector>,
        ctx: ArchiveContext,
    ) -> Self {
        Self {
            library,
            layout,
            media,
            ctx,
        }
    }

    #[must_use]
    pub fn library(&self) -> &Library {
        &self.library
    }

    /// Adds or refreshes an artist, album and tracklist.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if any insert fails.
    #[instrument(skip(self, manifest), fields(album = %manifest.album.name))]
    pub async fn import(&self, manifest: &ImportManifest) -> Result<ImportSummary> {
        let artist_id = self.library.add_artist(&manifest.artist).await?;
        let album_id = self.library.add_album(artist_id, &manifest.album).await?;
        let song_ids = self
            .library
            .add_songs_batch(album_id, &manifest.songs)
            .await?;
        info!(artist_id, album_id, songs = song_ids.len(), "album imported");
        self.emit_album_status(album_id).await;
        Ok(ImportSummary {
            artist_id,
            album_id,
            song_ids,
        })
    }

    /// Sets (or clears, with `None`) a song's manual source URL.
    ///
    /// Blank URLs count as clearing it. See [`Library::set_song_video_url`]
    /// for when the song is put back into the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the song is unknown or the update fails.
    #[instrument(skip(self))]
    pub async fn set_song_video_url(&self, song_id: i64, url: Option<&str>) -> Result<UrlChange> {
        let url = url.map(str::trim).filter(|u| !u.is_empty());
        let change = self.library.set_song_video_url(song_id, url).await?;

        if let Some(file) = &change.removed_file {
            self.remove_physical(file).await;
        }
        if change.requeued {
            self.emit_song_status(&change.song);
            self.emit_album_status(change.song.album_id).await;
        }
        Ok(change)
    }

    /// Copies `source` into the library as the song's archived file.
    ///
    /// The duration is probed from the copy; a failed probe leaves it unset.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Import`] if the copy fails, or
    /// [`ServiceError::Library`] if the song, album or artist is unknown.
    #[instrument(skip(self), fields(source = %source.display()))]
    pub async fn upload_song_file(&self, song_id: i64, source: &Path) -> Result<FileAttachment> {
        let song = self
            .library
            .get_song_by_id(song_id)
            .await?
            .ok_or(LibraryError::SongNotFound(song_id))?;
        let album = self
            .library
            .get_album_by_id(song.album_id)
            .await?
            .ok_or(LibraryError::AlbumNotFound(song.album_id))?;
        let artist = self
            .library
            .get_artist_by_id(album.artist_id)
            .await?
            .ok_or(LibraryError::ArtistNotFound(album.artist_id))?;

        let dest = self
            .layout
            .import_file(source, &artist.name, &album.name, song.track_number, &song.name)
            .await
            .map_err(|source_err| ServiceError::Import {
                path: source.to_path_buf(),
                source: source_err,
            })?;
        let duration = match self.media.probe_duration(&dest).await {
            Ok(seconds) => Some(seconds),
            Err(e) => {
                warn!(path = %dest.display(), error = %e, "duration probe failed");
                None
            }
        };

        let descriptor = FileDescriptor::new(self.layout.storage_tag(), dest.display().to_string());
        let attachment = self
            .library
            .attach_uploaded_file(song_id, &descriptor, duration)
            .await?;

        if let Some(old) = &attachment.replaced {
            if Path::new(&old.path) != dest.as_path() {
                self.remove_physical(old).await;
            }
        }

        self.ctx
            .emit(ArchiveEvent::SongStatusChanged(SongStatusChanged {
                song_id,
                album_id: song.album_id,
                status: ArchiveStatus::Archived,
                file_id: Some(attachment.file_id),
                archived_duration: duration,
            }));
        self.emit_album_status(song.album_id).await;
        info!(song_id, path = %dest.display(), "uploaded file attached");
        Ok(attachment)
    }

    /// Deletes a song's archived file and puts the song back into the queue.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the song is unknown or the update fails.
    #[instrument(skip(self))]
    pub async fn delete_song_file(&self, song_id: i64) -> Result<Option<FileDocument>> {
        let removed = self.library.delete_song_file(song_id).await?;
        if let Some(file) = &removed {
            self.remove_physical(file).await;
        }

        if let Some(song) = self.library.get_song_by_id(song_id).await? {
            self.emit_song_status(&song);
            self.emit_album_status(song.album_id).await;
        }
        Ok(removed)
    }

    /// Resets every song of an album to the queue and deletes its files.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the album is unknown or the update fails.
    #[instrument(skip(self))]
    pub async fn reset_album(&self, album_id: i64) -> Result<Vec<FileDocument>> {
        let removed = self.library.reset_album_archive(album_id).await?;
        for file in &removed {
            self.remove_physical(file).await;
        }

        for song in self.library.get_songs_by_album(album_id).await? {
            self.emit_song_status(&song);
        }
        self.emit_album_status(album_id).await;
        info!(album_id, files = removed.len(), "album reset");
        Ok(removed)
    }

    /// Deletes an album, its songs and their files.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the album is unknown or the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_album(&self, album_id: i64) -> Result<Vec<FileDocument>> {
        let removed = self.library.delete_album(album_id).await?;
        for file in &removed {
            self.remove_physical(file).await;
        }
        info!(album_id, files = removed.len(), "album removed");
        Ok(removed)
    }

    /// Lists albums with their archive progress.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the query fails.
    pub async fn list_albums(&self) -> Result<Vec<AlbumOverview>> {
        Ok(self.library.list_albums().await?)
    }

    /// Looks up a song.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Library`] if the query fails.
    pub async fn song(&self, song_id: i64) -> Result<Option<Song>> {
        Ok(self.library.get_song_by_id(song_id).await?)
    }

    async fn remove_physical(&self, file: &FileDocument) {
        if file.file_manager != self.layout.storage_tag() {
            warn!(
                file_id = file.id,
                manager = %file.file_manager,
                "unknown storage backend, file left in place"
            );
            return;
        }
        if let Err(e) = self.layout.delete_file(Path::new(&file.path)).await {
            warn!(file_id = file.id, path = %file.path, error = %e, "failed to delete file");
        }
    }

    fn emit_song_status(&self, song: &Song) {
        self.ctx
            .emit(ArchiveEvent::SongStatusChanged(SongStatusChanged {
                song_id: song.id,
                album_id: song.album_id,
                status: song.status(),
                file_id: song.archived_file,
                archived_duration: song.archived_duration,
            }));
    }

    async fn emit_album_status(&self, album_id: i64) {
        match self.library.get_album_by_id(album_id).await {
            Ok(Some(album)) => self
                .ctx
                .emit(ArchiveEvent::AlbumStatusChanged(AlbumStatusChanged {
                    album_id,
                    status: album.status(),
                })),
            Ok(None) => {}
            Err(e) => warn!(album_id, error = %e, "failed to read album status"),
        }
    }
}
