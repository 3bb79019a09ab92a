//! Integration tests for user actions: manual URLs, uploads, resets and deletes.

mod support;

use std::path::Path;

use archiver_core::{ArchiveEvent, ArchiveStatus, ImportManifest, ServiceError};
use support::{Harness, PROBED_SECONDS};

async fn archived_path(h: &Harness, song_id: i64) -> String {
    let song = h.library.get_song_by_id(song_id).await.unwrap().unwrap();
    h.library
        .get_file_by_id(song.archived_file.expect("song has a file"))
        .await
        .unwrap()
        .expect("file document exists")
        .path
}

#[tokio::test]
async fn test_import_manifest_queues_songs() {
    let h = Harness::new().await;
    let manifest = ImportManifest::from_json(
        r#"{
            "artist": {"name": "Stereolab", "catalogId": "sl"},
            "album": {"name": "Dots and Loops", "catalogId": "dal", "releaseYear": 1997},
            "songs": [
                {"name": "Brakhage", "catalogId": "dal-1", "trackNumber": 1},
                {"name": "Miss Modular", "catalogId": "dal-2", "trackNumber": 2}
            ]
        }"#,
    )
    .expect("manifest parses");

    let summary = h.service.import(&manifest).await.expect("import succeeds");

    assert_eq!(summary.song_ids.len(), 2);
    let queue = h.orchestrator.queue_status().await.unwrap();
    assert_eq!(queue.queue_length, 2);

    // Importing again refreshes in place.
    let again = h.service.import(&manifest).await.unwrap();
    assert_eq!(again.album_id, summary.album_id);
    assert_eq!(again.song_ids, summary.song_ids);
}

#[tokio::test]
async fn test_new_url_requeues_archived_song_and_removes_file() {
    let h = Harness::new().await;
    let (album_id, songs) = h
        .seed_album("Stereolab", "Emperor Tomato Ketchup", &["Metronomic Underground"])
        .await;
    h.orchestrator.run_once().await.unwrap();
    let path = archived_path(&h, songs[0]).await;
    assert!(Path::new(&path).exists());
    h.sink.take();

    let change = h
        .service
        .set_song_video_url(songs[0], Some("  https://media.test/live-version "))
        .await
        .unwrap();

    assert!(change.requeued);
    assert_eq!(
        change.song.video_url.as_deref(),
        Some("https://media.test/live-version")
    );
    assert!(!Path::new(&path).exists(), "orphaned file is deleted");
    let events = h.sink.events();
    assert!(events.iter().any(|event| matches!(
        event,
        ArchiveEvent::SongStatusChanged(changed)
            if changed.song_id == songs[0] && changed.status == ArchiveStatus::NotArchived
    )));
    assert!(events.iter().any(|event| matches!(
        event,
        ArchiveEvent::AlbumStatusChanged(changed)
            if changed.album_id == album_id && changed.status == ArchiveStatus::NotArchived
    )));

    // The next pass downloads from the manual URL without searching.
    let searches = h.state.search_count();
    h.orchestrator.run_once().await.unwrap();
    assert_eq!(h.state.search_count(), searches);
    let last = h.state.downloads.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.url, "https://media.test/live-version");
}

#[tokio::test]
async fn test_same_url_keeps_archived_song() {
    let h = Harness::new().await;
    let (_, songs) = h.seed_album("Stereolab", "Mars Audiac Quintet", &["Ping Pong"]).await;
    h.orchestrator.run_once().await.unwrap();
    let song = h.library.get_song_by_id(songs[0]).await.unwrap().unwrap();
    let url = song.video_url.clone().unwrap();
    let path = archived_path(&h, songs[0]).await;

    let change = h.service.set_song_video_url(songs[0], Some(&url)).await.unwrap();

    assert!(!change.requeued);
    assert_eq!(change.song.status(), ArchiveStatus::Archived);
    assert!(Path::new(&path).exists());
}

#[tokio::test]
async fn test_blank_url_clears_and_requeues_failed_song() {
    let h = Harness::new().await;
    h.state.miss("Cybele's Reverie");
    let (_, songs) = h
        .seed_album("Stereolab", "Emperor Tomato Ketchup", &["Cybele's Reverie"])
        .await;
    h.orchestrator.run_once().await.unwrap();

    let change = h.service.set_song_video_url(songs[0], Some("   ")).await.unwrap();

    assert!(change.requeued);
    assert!(change.song.video_url.is_none());
    assert_eq!(change.song.status(), ArchiveStatus::NotArchived);
}

#[tokio::test]
async fn test_upload_attaches_file_and_replaces_download() {
    let h = Harness::new().await;
    let (album_id, songs) = h
        .seed_album("Stereolab", "Transient Random-Noise Bursts", &["Jenny Ondioline"])
        .await;
    h.state.break_download("Jenny Ondioline");
    h.orchestrator.run_once().await.unwrap();
    assert_eq!(
        h.library.get_song_by_id(songs[0]).await.unwrap().unwrap().status(),
        ArchiveStatus::ArchivingFailure
    );

    let source = h.dir.path().join("rip.mp3");
    std::fs::write(&source, b"ripped").unwrap();
    let attachment = h.service.upload_song_file(songs[0], &source).await.unwrap();

    let song = h.library.get_song_by_id(songs[0]).await.unwrap().unwrap();
    assert_eq!(song.status(), ArchiveStatus::Archived);
    assert_eq!(song.archived_file, Some(attachment.file_id));
    assert_eq!(song.archived_duration, Some(PROBED_SECONDS));
    let stored = archived_path(&h, songs[0]).await;
    assert!(Path::new(&stored).starts_with(h.library_dir()));
    assert_eq!(std::fs::read(&stored).unwrap(), b"ripped");
    assert!(source.exists(), "the source file is copied, not moved");
    let album = h.library.get_album_by_id(album_id).await.unwrap().unwrap();
    assert_eq!(album.status(), ArchiveStatus::Archived);
}

#[tokio::test]
async fn test_upload_missing_source_is_import_error() {
    let h = Harness::new().await;
    let (_, songs) = h.seed_album("Stereolab", "Peng!", &["Super Falling Star"]).await;

    let err = h
        .service
        .upload_song_file(songs[0], &h.dir.path().join("nope.mp3"))
        .await
        .unwrap_err();

    assert!(matches!(err, ServiceError::Import { .. }));
    let song = h.library.get_song_by_id(songs[0]).await.unwrap().unwrap();
    assert_eq!(song.status(), ArchiveStatus::NotArchived);
}

#[tokio::test]
async fn test_delete_song_file_removes_physical_file() {
    let h = Harness::new().await;
    let (_, songs) = h.seed_album("Stereolab", "Sound-Dust", &["Captain Easychord"]).await;
    h.orchestrator.run_once().await.unwrap();
    let path = archived_path(&h, songs[0]).await;

    let removed = h.service.delete_song_file(songs[0]).await.unwrap();

    assert!(removed.is_some());
    assert!(!Path::new(&path).exists());
    let queue = h.orchestrator.queue_status().await.unwrap();
    assert_eq!(queue.queue_length, 1);
}

#[tokio::test]
async fn test_reset_album_requeues_and_deletes_files() {
    let h = Harness::new().await;
    h.state.miss("Percolator");
    let (album_id, songs) = h
        .seed_album(
            "Stereolab",
            "Emperor Tomato Ketchup",
            &["Metronomic Underground", "Percolator"],
        )
        .await;
    h.orchestrator.run_once().await.unwrap();
    let path = archived_path(&h, songs[0]).await;

    let removed = h.service.reset_album(album_id).await.unwrap();

    assert_eq!(removed.len(), 1);
    assert!(!Path::new(&path).exists());
    let queue = h.orchestrator.queue_status().await.unwrap();
    assert_eq!(queue.queue_length, 2);
    assert!(queue.items.iter().all(|song| song.video_url.is_none()));
}

#[tokio::test]
async fn test_delete_album_removes_rows_and_files() {
    let h = Harness::new().await;
    let (album_id, songs) = h
        .seed_album("Stereolab", "Cobra and Phases", &["The Free Design"])
        .await;
    h.orchestrator.run_once().await.unwrap();
    let path = archived_path(&h, songs[0]).await;

    h.service.delete_album(album_id).await.unwrap();

    assert!(!Path::new(&path).exists());
    assert!(h.service.list_albums().await.unwrap().is_empty());
    assert!(h.service.song(songs[0]).await.unwrap().is_none());
}
