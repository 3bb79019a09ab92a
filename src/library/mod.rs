//! Library module: `SQLite`-backed storage of artists, albums, songs and files.
//!
//! [`Library`] is the storage gateway the archive orchestrator works against
//! (through [`ArchiveRepository`]) and the place where user actions that touch
//! archive state (manual URLs, uploads, resets, deletes) are applied.
//!
//! Every write that spans more than one statement runs inside a transaction.
//! Album status is never written directly by callers; it is recomputed from the
//! album's songs via [`crate::status::album_status`].
//!
//! # Example
//!
//! ```ignore
//! use archiver_core::{Database, Library};
//! use std::path::Path;
//!
//! let db = Database::new(Path::new("library.db")).await?;
//! let library = Library::new(db);
//!
//! for song in library.get_pending_songs().await? {
//!     println!("{song}");
//! }
//! ```

mod error;
mod models;
mod repository;

pub use error::{DbErrorKind, LibraryError};
pub use models::{
    Album, AlbumOverview, ArchiveStatus, Artist, FileAttachment, FileDescriptor, FileDocument,
    NewAlbum, NewArtist, NewSong, Song, UrlChange,
};
pub use repository::ArchiveRepository;

use sqlx::SqliteConnection;
use tracing::{debug, instrument};

use crate::db::Database;
use crate::status::album_status;

/// Result type for library operations.
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Returns `Ok(())` if at least one row was affected; otherwise [`LibraryError::SongNotFound`].
fn check_affected(song_id: i64, rows_affected: u64) -> Result<()> {
    if rows_affected == 0 {
        Err(LibraryError::SongNotFound(song_id))
    } else {
        Ok(())
    }
}

async fn fetch_song(conn: &mut SqliteConnection, song_id: i64) -> Result<Song> {
    sqlx::query_as::<_, Song>("SELECT * FROM song WHERE id = ?")
        .bind(song_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or(LibraryError::SongNotFound(song_id))
}

async fn fetch_file(conn: &mut SqliteConnection, file_id: i64) -> Result<Option<FileDocument>> {
    let file = sqlx::query_as::<_, FileDocument>("SELECT * FROM file_document WHERE id = ?")
        .bind(file_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(file)
}

/// Deletes a file record and returns it, if it existed.
async fn take_file(conn: &mut SqliteConnection, file_id: i64) -> Result<Option<FileDocument>> {
    let file = fetch_file(conn, file_id).await?;
    if file.is_some() {
        sqlx::query("DELETE FROM file_document WHERE id = ?")
            .bind(file_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(file)
}

/// Folds an album's song statuses and stores the result.
///
/// Albums without songs keep whatever status they have.
async fn recompute_album(
    conn: &mut SqliteConnection,
    album_id: i64,
) -> Result<Option<ArchiveStatus>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT archive_status FROM song WHERE album_id = ?")
        .bind(album_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut statuses = Vec::with_capacity(rows.len());
    for (raw,) in rows {
        let status = raw
            .parse::<ArchiveStatus>()
            .map_err(|reason| LibraryError::InvalidStatus {
                status: raw.clone(),
                reason,
            })?;
        statuses.push(status);
    }

    let Some(status) = album_status(&statuses) else {
        return Ok(None);
    };

    sqlx::query("UPDATE album SET archive_status = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(album_id)
        .execute(&mut *conn)
        .await?;

    debug!(album_id, status = %status, "album status recomputed");
    Ok(Some(status))
}

/// Storage gateway for the music library.
#[derive(Debug, Clone)]
pub struct Library {
    db: Database,
}

impl Library {
    /// Creates a library over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the underlying database handle.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // ==================== Reads ====================

    /// Returns every song waiting for an archive pass, in insertion order.
    ///
    /// Only `NOT_ARCHIVED` songs are returned; failed songs need an explicit
    /// user action before they are picked up again.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_pending_songs(&self) -> Result<Vec<Song>> {
        let songs =
            sqlx::query_as::<_, Song>("SELECT * FROM song WHERE archive_status = ? ORDER BY id")
                .bind(ArchiveStatus::NotArchived.as_str())
                .fetch_all(self.db.pool())
                .await?;
        Ok(songs)
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_album_by_id(&self, album_id: i64) -> Result<Option<Album>> {
        let album = sqlx::query_as::<_, Album>("SELECT * FROM album WHERE id = ?")
            .bind(album_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(album)
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_artist_by_id(&self, artist_id: i64) -> Result<Option<Artist>> {
        let artist = sqlx::query_as::<_, Artist>("SELECT * FROM artist WHERE id = ?")
            .bind(artist_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(artist)
    }

    /// Returns all songs of an album ordered by track number, then name.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_songs_by_album(&self, album_id: i64) -> Result<Vec<Song>> {
        let songs = sqlx::query_as::<_, Song>(
            r"SELECT * FROM song
              WHERE album_id = ?
              ORDER BY track_number IS NULL, track_number ASC, name ASC",
        )
        .bind(album_id)
        .fetch_all(self.db.pool())
        .await?;
        Ok(songs)
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_song_by_id(&self, song_id: i64) -> Result<Option<Song>> {
        let song = sqlx::query_as::<_, Song>("SELECT * FROM song WHERE id = ?")
            .bind(song_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(song)
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_file_by_id(&self, file_id: i64) -> Result<Option<FileDocument>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_file(&mut conn, file_id).await
    }

    /// Lists every album with its artist name and track counts.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_albums(&self) -> Result<Vec<AlbumOverview>> {
        let albums = sqlx::query_as::<_, AlbumOverview>(
            r"SELECT album.id,
                     album.name,
                     artist.name AS artist_name,
                     album.release_year,
                     album.archive_status,
                     COUNT(song.id) AS total_tracks,
                     COALESCE(SUM(song.archive_status = 'ARCHIVED'), 0) AS archived_tracks
              FROM album
              JOIN artist ON artist.id = album.artist_id
              LEFT JOIN song ON song.album_id = album.id
              GROUP BY album.id
              ORDER BY artist.name COLLATE NOCASE ASC, album.name COLLATE NOCASE ASC",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(albums)
    }

    // ==================== Archive pipeline writes ====================

    /// Sets a song's status, optionally together with its file reference.
    ///
    /// Only `ARCHIVED` songs keep a file reference. Any other status clears
    /// it and removes the file record it pointed to.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::InvalidStatus`] for the album-only
    /// `PARTIALLY_ARCHIVED` status, [`LibraryError::SongNotFound`] if the song
    /// does not exist, or [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self), fields(status = %status))]
    pub async fn update_song_archive_status(
        &self,
        song_id: i64,
        status: ArchiveStatus,
        file_id: Option<i64>,
    ) -> Result<()> {
        if status == ArchiveStatus::PartiallyArchived {
            return Err(LibraryError::album_only_status(status.as_str()));
        }

        let mut tx = self.db.pool().begin().await?;
        let song = fetch_song(&mut tx, song_id).await?;
        let archived_file = if status == ArchiveStatus::Archived {
            file_id.or(song.archived_file)
        } else {
            None
        };

        sqlx::query("UPDATE song SET archive_status = ?, archived_file = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(archived_file)
            .bind(song_id)
            .execute(&mut *tx)
            .await?;

        if let Some(old_id) = song.archived_file
            && archived_file != Some(old_id)
            && take_file(&mut tx, old_id).await?.is_some()
        {
            debug!(song_id, file_id = old_id, "dropped file record no longer referenced");
        }

        tx.commit().await?;
        Ok(())
    }

    /// Stores a source URL without touching the song's status.
    ///
    /// The archive pass uses this to persist a discovered URL before the
    /// download starts. User edits go through [`Library::set_song_video_url`].
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_song_video_url(&self, song_id: i64, url: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE song SET video_url = ? WHERE id = ?")
            .bind(url)
            .bind(song_id)
            .execute(self.db.pool())
            .await?;

        check_affected(song_id, result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_song_file(&self, song_id: i64, file_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE song SET archived_file = ? WHERE id = ?")
            .bind(file_id)
            .bind(song_id)
            .execute(self.db.pool())
            .await?;

        check_affected(song_id, result.rows_affected())
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn update_song_archived_duration(
        &self,
        song_id: i64,
        seconds: Option<i64>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE song SET archived_duration = ? WHERE id = ?")
            .bind(seconds)
            .bind(song_id)
            .execute(self.db.pool())
            .await?;

        check_affected(song_id, result.rows_affected())
    }

    /// Recomputes and stores an album's status from its songs.
    ///
    /// Returns the new status, or `None` when the album has no songs.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if a query fails.
    #[instrument(skip(self))]
    pub async fn update_album_archive_progress(
        &self,
        album_id: i64,
    ) -> Result<Option<ArchiveStatus>> {
        let mut tx = self.db.pool().begin().await?;
        let status = recompute_album(&mut tx, album_id).await?;
        tx.commit().await?;
        Ok(status)
    }

    /// Records a stored file and returns its id.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the insert fails.
    #[instrument(skip(self), fields(path = %descriptor.path))]
    pub async fn add_file(&self, descriptor: &FileDescriptor) -> Result<i64> {
        let (id,): (i64,) =
            sqlx::query_as("INSERT INTO file_document (file_manager, path) VALUES (?, ?) RETURNING id")
                .bind(&descriptor.file_manager)
                .bind(&descriptor.path)
                .fetch_one(self.db.pool())
                .await?;
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`LibraryError::FileNotFound`] if no such record exists,
    /// or [`LibraryError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_file_document(&self, file_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM file_document WHERE id = ?")
            .bind(file_id)
            .execute(self.db.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::FileNotFound(file_id));
        }
        Ok(())
    }

    // ==================== Catalog import ====================

    /// Inserts an artist, or refreshes its name if the catalog id is known.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Database`] if the upsert fails.
    #[instrument(skip(self, artist), fields(catalog_id = %artist.catalog_id))]
    pub async fn add_artist(&self, artist: &NewArtist) -> Result<i64> {
        let (id,): (i64,) = sqlx::query_as(
            r"INSERT INTO artist (name, catalog_id) VALUES (?, ?)
              ON CONFLICT(catalog_id) DO UPDATE SET name = excluded.name
              RETURNING id",
        )
        .bind(&artist.name)
        .bind(&artist.catalog_id)
        .fetch_one(self.db.pool())
        .await?;
        Ok(id)
    }

    /// Inserts an album for an artist, or refreshes it if the catalog id is known.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::ArtistNotFound`] if the artist does not exist,
    /// or [`LibraryError::Database`] if the upsert fails.
    #[instrument(skip(self, album), fields(catalog_id = %album.catalog_id))]
    pub async fn add_album(&self, artist_id: i64, album: &NewAlbum) -> Result<i64> {
        if self.get_artist_by_id(artist_id).await?.is_none() {
            return Err(LibraryError::ArtistNotFound(artist_id));
        }

        let (id,): (i64,) = sqlx::query_as(
            r"INSERT INTO album (name, artist_id, catalog_id, release_group_id, release_year)
              VALUES (?, ?, ?, ?, ?)
              ON CONFLICT(catalog_id) DO UPDATE SET
                  name = excluded.name,
                  release_group_id = excluded.release_group_id,
                  release_year = excluded.release_year
              RETURNING id",
        )
        .bind(&album.name)
        .bind(artist_id)
        .bind(&album.catalog_id)
        .bind(&album.release_group_id)
        .bind(album.release_year)
        .fetch_one(self.db.pool())
        .await?;
        Ok(id)
    }

    /// Inserts an album's songs in one transaction and refreshes the album status.
    ///
    /// Songs whose catalog id already exists are updated in place, so
    /// re-importing the same tracklist is harmless. Returns the song ids in
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::AlbumNotFound`] if the album does not exist,
    /// or [`LibraryError::Database`] if any insert fails (nothing is written).
    #[instrument(skip(self, songs), fields(count = songs.len()))]
    pub async fn add_songs_batch(&self, album_id: i64, songs: &[NewSong]) -> Result<Vec<i64>> {
        let mut tx = self.db.pool().begin().await?;

        let album_exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM album WHERE id = ?")
            .bind(album_id)
            .fetch_optional(&mut *tx)
            .await?;
        if album_exists.is_none() {
            return Err(LibraryError::AlbumNotFound(album_id));
        }

        let mut ids = Vec::with_capacity(songs.len());
        for song in songs {
            let (id,): (i64,) = sqlx::query_as(
                r"INSERT INTO song (name, album_id, catalog_id, track_number, expected_duration, video_url)
                  VALUES (?, ?, ?, ?, ?, ?)
                  ON CONFLICT(catalog_id) DO UPDATE SET
                      name = excluded.name,
                      track_number = excluded.track_number,
                      expected_duration = excluded.expected_duration
                  RETURNING id",
            )
            .bind(&song.name)
            .bind(album_id)
            .bind(&song.catalog_id)
            .bind(song.track_number)
            .bind(song.expected_duration)
            .bind(&song.video_url)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        recompute_album(&mut tx, album_id).await?;
        tx.commit().await?;
        Ok(ids)
    }

    // ==================== User actions ====================

    /// Sets or clears a song's source URL, re-queueing the song when needed.
    ///
    /// - `ARCHIVED` with a different URL: back to `NOT_ARCHIVED`, file
    ///   reference and measured duration cleared, file record removed.
    /// - `VIDEO_NOT_FOUND` / `ARCHIVING_FAILURE`: back to `NOT_ARCHIVED`.
    /// - Otherwise only the URL changes; an identical URL is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if any statement fails.
    #[instrument(skip(self))]
    pub async fn set_song_video_url(&self, song_id: i64, url: Option<&str>) -> Result<UrlChange> {
        let mut tx = self.db.pool().begin().await?;
        let song = fetch_song(&mut tx, song_id).await?;
        let url_changed = song.video_url.as_deref() != url;

        let mut requeued = false;
        let mut removed_file = None;
        match song.status() {
            ArchiveStatus::Archived if url_changed => {
                sqlx::query(
                    r"UPDATE song
                      SET video_url = ?, archive_status = ?, archived_file = NULL, archived_duration = NULL
                      WHERE id = ?",
                )
                .bind(url)
                .bind(ArchiveStatus::NotArchived.as_str())
                .bind(song_id)
                .execute(&mut *tx)
                .await?;
                if let Some(file_id) = song.archived_file {
                    removed_file = take_file(&mut tx, file_id).await?;
                }
                requeued = true;
            }
            status if status.is_failure() => {
                sqlx::query("UPDATE song SET video_url = ?, archive_status = ? WHERE id = ?")
                    .bind(url)
                    .bind(ArchiveStatus::NotArchived.as_str())
                    .bind(song_id)
                    .execute(&mut *tx)
                    .await?;
                requeued = true;
            }
            _ if url_changed => {
                sqlx::query("UPDATE song SET video_url = ? WHERE id = ?")
                    .bind(url)
                    .bind(song_id)
                    .execute(&mut *tx)
                    .await?;
            }
            _ => {}
        }

        if requeued {
            recompute_album(&mut tx, song.album_id).await?;
        }
        let song = fetch_song(&mut tx, song_id).await?;
        tx.commit().await?;

        debug!(song_id, requeued, "song video url set");
        Ok(UrlChange {
            song,
            requeued,
            removed_file,
        })
    }

    /// Records a stored file and marks the song archived in one transaction.
    ///
    /// Inserts the file record, links it, stores the measured duration (or
    /// clears it), removes the song's previous file record and recomputes the
    /// album status. Nothing is written if any step fails.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if any statement fails.
    #[instrument(skip(self, descriptor), fields(path = %descriptor.path))]
    pub async fn mark_song_archived(
        &self,
        song_id: i64,
        descriptor: &FileDescriptor,
        duration: Option<i64>,
    ) -> Result<FileAttachment> {
        let mut tx = self.db.pool().begin().await?;
        let song = fetch_song(&mut tx, song_id).await?;

        let (file_id,): (i64,) =
            sqlx::query_as("INSERT INTO file_document (file_manager, path) VALUES (?, ?) RETURNING id")
                .bind(&descriptor.file_manager)
                .bind(&descriptor.path)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r"UPDATE song
              SET archive_status = ?, archived_file = ?, archived_duration = ?
              WHERE id = ?",
        )
        .bind(ArchiveStatus::Archived.as_str())
        .bind(file_id)
        .bind(duration)
        .bind(song_id)
        .execute(&mut *tx)
        .await?;

        let replaced = match song.archived_file {
            Some(old_id) => take_file(&mut tx, old_id).await?,
            None => None,
        };

        recompute_album(&mut tx, song.album_id).await?;
        tx.commit().await?;

        Ok(FileAttachment { file_id, replaced })
    }

    /// Attaches a manually supplied file to a song and marks it archived.
    ///
    /// Any previous file record of the song is removed and returned.
    ///
    /// # Errors
    ///
    /// See [`Library::mark_song_archived`].
    pub async fn attach_uploaded_file(
        &self,
        song_id: i64,
        descriptor: &FileDescriptor,
        duration: Option<i64>,
    ) -> Result<FileAttachment> {
        self.mark_song_archived(song_id, descriptor, duration).await
    }

    /// Detaches and removes a song's file record, returning the song to the queue.
    ///
    /// Returns the removed record so the caller can delete the physical file.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::SongNotFound`] if the song does not exist,
    /// or [`LibraryError::Database`] if any statement fails.
    #[instrument(skip(self))]
    pub async fn delete_song_file(&self, song_id: i64) -> Result<Option<FileDocument>> {
        let mut tx = self.db.pool().begin().await?;
        let song = fetch_song(&mut tx, song_id).await?;

        sqlx::query(
            r"UPDATE song
              SET archive_status = ?, archived_file = NULL, archived_duration = NULL
              WHERE id = ?",
        )
        .bind(ArchiveStatus::NotArchived.as_str())
        .bind(song_id)
        .execute(&mut *tx)
        .await?;

        let removed = match song.archived_file {
            Some(file_id) => take_file(&mut tx, file_id).await?,
            None => None,
        };

        recompute_album(&mut tx, song.album_id).await?;
        tx.commit().await?;
        Ok(removed)
    }

    /// Puts every song of an album back into the queue with a clean slate.
    ///
    /// URLs, file references and measured durations are cleared; the album's
    /// file records are removed and returned.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::AlbumNotFound`] if the album does not exist,
    /// or [`LibraryError::Database`] if any statement fails.
    #[instrument(skip(self))]
    pub async fn reset_album_archive(&self, album_id: i64) -> Result<Vec<FileDocument>> {
        let mut tx = self.db.pool().begin().await?;
        let file_ids = album_file_ids(&mut tx, album_id).await?;

        sqlx::query(
            r"UPDATE song
              SET archive_status = ?, video_url = NULL, archived_file = NULL, archived_duration = NULL
              WHERE album_id = ?",
        )
        .bind(ArchiveStatus::NotArchived.as_str())
        .bind(album_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE album SET archive_status = ? WHERE id = ?")
            .bind(ArchiveStatus::NotArchived.as_str())
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        let mut removed = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(file) = take_file(&mut tx, file_id).await? {
                removed.push(file);
            }
        }

        tx.commit().await?;
        Ok(removed)
    }

    /// Deletes an album with its songs and returns the file records they owned.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::AlbumNotFound`] if the album does not exist,
    /// or [`LibraryError::Database`] if any statement fails.
    #[instrument(skip(self))]
    pub async fn delete_album(&self, album_id: i64) -> Result<Vec<FileDocument>> {
        let mut tx = self.db.pool().begin().await?;
        let file_ids = album_file_ids(&mut tx, album_id).await?;

        sqlx::query("DELETE FROM album WHERE id = ?")
            .bind(album_id)
            .execute(&mut *tx)
            .await?;

        let mut removed = Vec::with_capacity(file_ids.len());
        for file_id in file_ids {
            if let Some(file) = take_file(&mut tx, file_id).await? {
                removed.push(file);
            }
        }

        tx.commit().await?;
        debug!(album_id, files = removed.len(), "album deleted");
        Ok(removed)
    }
}

/// Returns the file ids owned by an album's songs, failing if the album is unknown.
async fn album_file_ids(conn: &mut SqliteConnection, album_id: i64) -> Result<Vec<i64>> {
    let album: Option<(i64,)> = sqlx::query_as("SELECT id FROM album WHERE id = ?")
        .bind(album_id)
        .fetch_optional(&mut *conn)
        .await?;
    if album.is_none() {
        return Err(LibraryError::AlbumNotFound(album_id));
    }

    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT archived_file FROM song WHERE album_id = ? AND archived_file IS NOT NULL",
    )
    .bind(album_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
