//! Repository seam for the archive pipeline's storage operations.
//!
//! The orchestrator depends on this trait rather than on [`Library`] so that
//! the pass logic can be driven against any store.

use async_trait::async_trait;

use super::{
    Album, ArchiveStatus, Artist, FileAttachment, FileDescriptor, Library, Result, Song,
};

/// Storage gateway consumed by the archive orchestrator.
#[async_trait]
pub trait ArchiveRepository: Send + Sync {
    /// Returns all songs whose status is exactly `NOT_ARCHIVED`.
    async fn get_pending_songs(&self) -> Result<Vec<Song>>;

    async fn get_album_by_id(&self, album_id: i64) -> Result<Option<Album>>;

    async fn get_artist_by_id(&self, artist_id: i64) -> Result<Option<Artist>>;

    /// Returns the album's full tracklist.
    async fn get_songs_by_album(&self, album_id: i64) -> Result<Vec<Song>>;

    /// Sets a song status, optionally with its file reference.
    async fn update_song_archive_status(
        &self,
        song_id: i64,
        status: ArchiveStatus,
        file_id: Option<i64>,
    ) -> Result<()>;

    /// Persists a source URL without changing the status.
    async fn update_song_video_url(&self, song_id: i64, url: Option<&str>) -> Result<()>;

    async fn update_song_file(&self, song_id: i64, file_id: i64) -> Result<()>;

    async fn update_song_archived_duration(&self, song_id: i64, seconds: Option<i64>)
    -> Result<()>;

    /// Recomputes the album status from its songs.
    async fn update_album_archive_progress(&self, album_id: i64) -> Result<Option<ArchiveStatus>>;

    /// Records a stored file and returns its id.
    async fn add_file(&self, descriptor: &FileDescriptor) -> Result<i64>;

    /// Records the file, links it, stores the duration and marks the song
    /// `ARCHIVED`, all or nothing.
    async fn mark_song_archived(
        &self,
        song_id: i64,
        descriptor: &FileDescriptor,
        duration: Option<i64>,
    ) -> Result<FileAttachment>;
}

#[async_trait]
impl ArchiveRepository for Library {
    async fn get_pending_songs(&self) -> Result<Vec<Song>> {
        Library::get_pending_songs(self).await
    }

    async fn get_album_by_id(&self, album_id: i64) -> Result<Option<Album>> {
        Library::get_album_by_id(self, album_id).await
    }

    async fn get_artist_by_id(&self, artist_id: i64) -> Result<Option<Artist>> {
        Library::get_artist_by_id(self, artist_id).await
    }

    async fn get_songs_by_album(&self, album_id: i64) -> Result<Vec<Song>> {
        Library::get_songs_by_album(self, album_id).await
    }

    async fn update_song_archive_status(
        &self,
        song_id: i64,
        status: ArchiveStatus,
        file_id: Option<i64>,
    ) -> Result<()> {
        Library::update_song_archive_status(self, song_id, status, file_id).await
    }

    async fn update_song_video_url(&self, song_id: i64, url: Option<&str>) -> Result<()> {
        Library::update_song_video_url(self, song_id, url).await
    }

    async fn update_song_file(&self, song_id: i64, file_id: i64) -> Result<()> {
        Library::update_song_file(self, song_id, file_id).await
    }

    async fn update_song_archived_duration(
        &self,
        song_id: i64,
        seconds: Option<i64>,
    ) -> Result<()> {
        Library::update_song_archived_duration(self, song_id, seconds).await
    }

    async fn update_album_archive_progress(&self, album_id: i64) -> Result<Option<ArchiveStatus>> {
        Library::update_album_archive_progress(self, album_id).await
    }

    async fn add_file(&self, descriptor: &FileDescriptor) -> Result<i64> {
        Library::add_file(self, descriptor).await
    }

    async fn mark_song_archived(
        &self,
        song_id: i64,
        descriptor: &FileDescriptor,
        duration: Option<i64>,
    ) -> Result<FileAttachment> {
        Library::mark_song_archived(self, song_id, descriptor, duration).await
    }
}
