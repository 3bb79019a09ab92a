//! Shared fakes and fixtures for integration tests.
//!
//! Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Notify;

use archiver_core::{
    ArchiveContext, ArchiveOrchestrator, ArchiveRepository, ArchiveService, Database,
    DependencyCheck, DownloadPlugin, DownloadRequest, DownloadResult, FileLayout, Library,
    MediaError, MediaInspector, NewAlbum, NewArtist, NewSong, PluginDescriptor, PluginError,
    PluginLoader, PluginManager, RecordingSink, SongPipeline, TrackTags,
};

pub const MEDIA_HOST: &str = "https://media.test/";
pub const PROBED_SECONDS: i64 = 180;

/// Behaviour and call log shared by every fake plugin a loader produces.
#[derive(Default)]
pub struct FakeState {
    pub dependencies: Mutex<Option<DependencyCheck>>,
    /// Titles the search reports as not found.
    pub missing_titles: Mutex<HashSet<String>>,
    /// Titles whose download fails.
    pub broken_titles: Mutex<HashSet<String>>,
    /// When set, each download waits for one `release()`.
    pub gated: Mutex<bool>,
    gate: Notify,
    pub searches: Mutex<Vec<String>>,
    pub downloads: Mutex<Vec<DownloadRequest>>,
    pub downloads_started: AtomicUsize,
    pub dependency_checks: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub disposed: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_dependencies(&self, check: DependencyCheck) {
        *self.dependencies.lock().unwrap() = Some(check);
    }

    pub fn miss(&self, title: &str) {
        self.missing_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn break_download(&self, title: &str) {
        self.broken_titles.lock().unwrap().insert(title.to_string());
    }

    pub fn gate_downloads(&self) {
        *self.gated.lock().unwrap() = true;
    }

    /// Lets one gated download finish.
    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn search_count(&self) -> usize {
        self.searches.lock().unwrap().len()
    }

    pub fn downloaded_titles(&self) -> Vec<String> {
        self.downloads
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.title.clone())
            .collect()
    }
}

/// In-process [`DownloadPlugin`] driven by a [`FakeState`].
pub struct FakePlugin {
    id: String,
    state: Arc<FakeState>,
}

impl FakePlugin {
    pub fn new(id: &str, state: Arc<FakeState>) -> Self {
        Self {
            id: id.to_string(),
            state,
        }
    }
}

#[async_trait]
impl DownloadPlugin for FakePlugin {
    fn descriptor(&self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id.clone(),
            name: format!("Fake {}", self.id),
            version: "1.0.0".to_string(),
            description: "test double".to_string(),
            author: None,
        }
    }

    async fn initialize(&self) -> Result<(), PluginError> {
        if self.id == "broken" {
            return Err(PluginError::call_failed("initialize", "refusing to start"));
        }
        Ok(())
    }

    async fn check_dependencies(&self) -> Result<DependencyCheck, PluginError> {
        self.state.dependency_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .dependencies
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(DependencyCheck::satisfied))
    }

    async fn search_song(
        &self,
        _artist: &str,
        title: &str,
        _album: Option<&str>,
    ) -> Result<Option<String>, PluginError> {
        self.state.searches.lock().unwrap().push(title.to_string());
        if self.state.missing_titles.lock().unwrap().contains(title) {
            return Ok(None);
        }
        Ok(Some(format!("{MEDIA_HOST}{}", title.replace(' ', "-"))))
    }

    async fn download_song(&self, request: &DownloadRequest) -> Result<DownloadResult, PluginError> {
        self.state.downloads_started.fetch_add(1, Ordering::SeqCst);
        let now = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gated = *self.state.gated.lock().unwrap();
        if gated {
            self.state.gate.notified().await;
        }

        self.state.downloads.lock().unwrap().push(request.clone());
        let result = if self.state.broken_titles.lock().unwrap().contains(&request.title) {
            Err(PluginError::call_failed("download", "source vanished"))
        } else {
            tokio::fs::write(&request.dest_path, b"ID3fake-audio")
                .await
                .map_err(PluginError::from)
                .map(|()| DownloadResult {
                    path: request.dest_path.clone(),
                })
        };
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn validate_url(&self, url: &str) -> Result<bool, PluginError> {
        Ok(url.starts_with(MEDIA_HOST))
    }

    async fn dispose(&self) -> Result<(), PluginError> {
        self.state.disposed.lock().unwrap().push(self.id.clone());
        Ok(())
    }
}

/// Loader whose plugin id is the artifact's (trimmed) file content.
pub struct FakeLoader {
    pub state: Arc<FakeState>,
    pub loads: AtomicUsize,
}

impl FakeLoader {
    pub fn new(state: Arc<FakeState>) -> Arc<Self> {
        Arc::new(Self {
            state,
            loads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PluginLoader for FakeLoader {
    async fn load(&self, path: &Path) -> Result<Box<dyn DownloadPlugin>, PluginError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let content = tokio::fs::read_to_string(path).await?;
        Ok(Box::new(FakePlugin::new(
            content.trim(),
            Arc::clone(&self.state),
        )))
    }
}

/// Media inspector that never touches real audio.
#[derive(Default)]
pub struct FakeMedia {
    pub fail_probe: bool,
    pub tagged: Mutex<HashMap<PathBuf, TrackTags>>,
}

#[async_trait]
impl MediaInspector for FakeMedia {
    async fn write_tags(&self, path: &Path, tags: &TrackTags) -> Result<(), MediaError> {
        self.tagged
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), tags.clone());
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<i64, MediaError> {
        if self.fail_probe {
            return Err(MediaError::Read {
                path: path.to_path_buf(),
                message: "unreadable".to_string(),
            });
        }
        Ok(PROBED_SECONDS)
    }
}

fn plain_repo(library: Library) -> Arc<dyn ArchiveRepository> {
    Arc::new(library)
}

/// A fully wired archiver over a temp-dir database with an active fake plugin.
pub struct Harness {
    pub dir: TempDir,
    pub library: Library,
    pub plugins: Arc<PluginManager>,
    pub orchestrator: ArchiveOrchestrator,
    pub service: ArchiveService,
    pub state: Arc<FakeState>,
    pub media: Arc<FakeMedia>,
    pub sink: Arc<RecordingSink>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_media(FakeMedia::default()).await
    }

    pub async fn with_media(media: FakeMedia) -> Self {
        Self::build(media, Duration::from_secs(3600), plain_repo).await
    }

    /// Harness whose repeating timer fires every `interval`.
    pub async fn with_interval(interval: Duration) -> Self {
        Self::build(FakeMedia::default(), interval, plain_repo).await
    }

    /// Harness whose archive process writes through the repository `wrap` returns.
    pub async fn with_repo(wrap: impl FnOnce(Library) -> Arc<dyn ArchiveRepository>) -> Self {
        Self::build(FakeMedia::default(), Duration::from_secs(3600), wrap).await
    }

    async fn build(
        media: FakeMedia,
        interval: Duration,
        wrap: impl FnOnce(Library) -> Arc<dyn ArchiveRepository>,
    ) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let db = Database::new(&dir.path().join("test.db"))
            .await
            .expect("Failed to create database");
        let library = Library::new(db);

        let sink = Arc::new(RecordingSink::new());
        let ctx = ArchiveContext::new(sink.clone());
        let state = FakeState::new();

        let plugins_dir = dir.path().join("plugins");
        std::fs::create_dir_all(&plugins_dir).unwrap();
        std::fs::write(plugins_dir.join("fake-plugin"), "fake").unwrap();
        let plugins = Arc::new(PluginManager::new(
            plugins_dir,
            FakeLoader::new(Arc::clone(&state)),
            ctx.clone(),
        ));
        plugins
            .load_from_directory()
            .await
            .expect("plugin should load")
            .expect("plugin artifact present");
        plugins.activate().await.expect("plugin should activate");

        let media = Arc::new(media);
        let layout = FileLayout::new(dir.path().join("library"));
        let repo = wrap(library.clone());
        let pipeline = SongPipeline::new(repo.clone(), layout.clone(), media.clone(), ctx.clone());
        let orchestrator =
            ArchiveOrchestrator::new(repo, Arc::clone(&plugins), pipeline, ctx.clone(), interval);
        let service = ArchiveService::new(library.clone(), layout, media.clone(), ctx);

        sink.take();
        Self {
            dir,
            library,
            plugins,
            orchestrator,
            service,
            state,
            media,
            sink,
        }
    }

    pub fn library_dir(&self) -> PathBuf {
        self.dir.path().join("library")
    }

    /// Adds an artist + album with songs numbered from 1, returning their ids.
    pub async fn seed_album(&self, artist: &str, album: &str, titles: &[&str]) -> (i64, Vec<i64>) {
        let songs: Vec<NewSong> = titles
            .iter()
            .zip(1_i64..)
            .map(|(title, track)| NewSong {
                name: (*title).to_string(),
                catalog_id: Some(format!("{album}-{track}")),
                track_number: Some(track),
                expected_duration: Some(200),
                video_url: None,
            })
            .collect();
        self.seed_album_with(artist, album, songs).await
    }

    pub async fn seed_album_with(
        &self,
        artist: &str,
        album: &str,
        songs: Vec<NewSong>,
    ) -> (i64, Vec<i64>) {
        let artist_id = self
            .library
            .add_artist(&NewArtist {
                name: artist.to_string(),
                catalog_id: format!("artist-{artist}"),
            })
            .await
            .unwrap();
        let album_id = self
            .library
            .add_album(
                artist_id,
                &NewAlbum {
                    name: album.to_string(),
                    catalog_id: format!("album-{album}"),
                    release_group_id: None,
                    release_year: Some(1999),
                },
            )
            .await
            .unwrap();
        let song_ids = self.library.add_songs_batch(album_id, &songs).await.unwrap();
        (album_id, song_ids)
    }
}

/// True once at least `n` passes have run to an end.
pub fn passes_finished(h: &Harness, n: u64) -> bool {
    h.orchestrator.status().passes_finished >= n
}

/// Polls `condition` every 10ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}
