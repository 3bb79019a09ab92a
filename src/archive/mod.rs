//! Background archive process.
//!
//! [`ArchiveOrchestrator`] drives periodic passes over every pending song,
//! grouped by album and processed strictly one song at a time through the
//! active plugin. Passes are single-flight; stopping is cooperative and is
//! observed before each album and before each song, so an in-flight download
//! always runs to completion.
//!
//! ```text
//! Stopped --start()--> Starting --ready--> Running --stop()--> Stopping --pass ends--> Stopped
//!                         |                   |                                          ^
//!                         +--not ready--------+--revalidation fails----------------------+
//! ```

mod error;
mod pipeline;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

pub use error::{ArchiveError, ReadinessFailure};
pub use pipeline::{SongOutcome, SongPipeline};

use crate::events::{
    AlbumProgress, AlbumRunOutcome, AlbumStatusChanged, ArchiveContext, ArchiveEvent,
    NotificationLevel, ProcessStatus,
};
use crate::library::{Album, ArchiveRepository, ArchiveStatus, Artist, Song};
use crate::plugin::{DownloadPlugin, PluginManager};

/// Time between two automatic passes.
pub const DEFAULT_ARCHIVE_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle state of the background process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorState {
    Stopped,
    /// Validating the plugin before the first pass.
    Starting,
    Running,
    /// Stop requested; waiting for the current pass to unwind.
    Stopping,
}

/// Result of [`ArchiveOrchestrator::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartOutcome {
    Started,
    /// Already starting, running or stopping; nothing changed.
    AlreadyRunning,
    /// `stop()` arrived while the plugin was being validated.
    Cancelled,
}

/// Result of [`ArchiveOrchestrator::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// Idle process stopped; the inactive event has been emitted.
    Stopped,
    /// A pass is executing; it will emit the inactive event when it unwinds.
    Deferred,
}

/// How a pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassOutcome {
    /// Every pending song was attempted.
    Completed,
    /// A stop request ended the pass early.
    Interrupted,
    /// Another pass was executing, or the process is not running.
    Skipped,
    /// Plugin revalidation failed; the process was stopped.
    Aborted,
    /// The pending queue could not be read.
    Failed,
}

/// Counters collected over one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub albums: usize,
    pub archived: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl PassReport {
    fn new(outcome: PassOutcome) -> Self {
        Self {
            outcome,
            albums: 0,
            archived: 0,
            not_found: 0,
            failed: 0,
        }
    }
}

/// Answer to `getStatus`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub is_active: bool,
    pub is_processing: bool,
    pub current_song: Option<Song>,
    /// Passes that ran to an end (completed, interrupted, aborted or failed).
    pub passes_finished: u64,
}

/// Answer to `getQueueStatus`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub is_processing: bool,
    pub current_song: Option<Song>,
    pub queue_length: usize,
    pub items: Vec<Song>,
}

enum AlbumRun {
    Finished,
    Interrupted,
}

struct Control {
    state: OrchestratorState,
    processing: bool,
    current_song: Option<Song>,
    passes_finished: u64,
    ticker: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Control {
    fn signal_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            tx.send_replace(true);
        }
    }
}

struct Inner {
    repo: Arc<dyn ArchiveRepository>,
    plugins: Arc<PluginManager>,
    pipeline: SongPipeline,
    ctx: ArchiveContext,
    interval: Duration,
    control: Mutex<Control>,
    pass_lock: tokio::sync::Mutex<()>,
}

/// Periodic, cancellable archive process. Cheap to clone.
#[derive(Clone)]
pub struct ArchiveOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ArchiveOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOrchestrator")
            .field("state", &self.state())
            .field("interval", &self.inner.interval)
            .finish_non_exhaustive()
    }
}

impl ArchiveOrchestrator {
    #[must_use]
    pub fn new(
        repo: Arc<dyn ArchiveRepository>,
        plugins: Arc<PluginManager>,
        pipeline: SongPipeline,
        ctx: ArchiveContext,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                plugins,
                pipeline,
                ctx,
                interval: interval.max(Duration::from_millis(1)),
                control: Mutex::new(Control {
                    state: OrchestratorState::Stopped,
                    processing: false,
                    current_song: None,
                    passes_finished: 0,
                    ticker: None,
                    shutdown: None,
                }),
                pass_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Validates the plugin, then runs a pass now and every interval after.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotReady`] when no active plugin is available
    /// or its dependencies are missing. The reason has already been emitted
    /// as an `archive-process-status` event.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<StartOutcome, ArchiveError> {
        if !self.inner.begin_start() {
            debug!("archive process already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        if let Err(failure) = self.inner.check_readiness().await {
            self.inner.fail_process(&failure).await;
            return Err(ArchiveError::NotReady(failure));
        }

        let (tx, rx) = watch::channel(false);
        {
            let mut control = self.inner.lock_control();
            if control.state != OrchestratorState::Starting {
                control.state = OrchestratorState::Stopped;
                drop(control);
                self.inner.emit_status(ProcessStatus::inactive());
                info!("archive process start cancelled");
                return Ok(StartOutcome::Cancelled);
            }
            control.state = OrchestratorState::Running;
            control.shutdown = Some(tx);
        }

        // "active" goes out before the first pass can emit anything.
        info!(interval_secs = self.inner.interval.as_secs(), "archive process started");
        self.inner.emit_status(ProcessStatus::active());

        let ticker = tokio::spawn(run_ticker(Arc::clone(&self.inner), rx));
        self.inner.lock_control().ticker = Some(ticker);
        Ok(StartOutcome::Started)
    }

    /// Requests a cooperative stop and cancels the repeating timer.
    ///
    /// Never interrupts a download in progress.
    pub fn stop(&self) -> StopOutcome {
        let mut control = self.inner.lock_control();
        let state = control.state;
        match state {
            OrchestratorState::Stopped => StopOutcome::NotRunning,
            OrchestratorState::Stopping => StopOutcome::Deferred,
            OrchestratorState::Starting => {
                control.state = OrchestratorState::Stopping;
                StopOutcome::Deferred
            }
            OrchestratorState::Running => {
                control.signal_shutdown();
                if control.processing {
                    control.state = OrchestratorState::Stopping;
                    info!("stop requested, waiting for the current song");
                    StopOutcome::Deferred
                } else {
                    control.state = OrchestratorState::Stopped;
                    drop(control);
                    info!("archive process stopped");
                    self.inner.emit_status(ProcessStatus::inactive());
                    StopOutcome::Stopped
                }
            }
        }
    }

    /// Waits for the ticker task to exit after a stop.
    pub async fn join(&self) {
        let handle = self.inner.lock_control().ticker.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "archive ticker task failed");
            }
        }
    }

    /// Runs exactly one pass without scheduling further ones.
    ///
    /// Returns a skipped report if the process is already running.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::NotReady`] if the plugin cannot be used.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<PassReport, ArchiveError> {
        if !self.inner.begin_start() {
            return Ok(PassReport::new(PassOutcome::Skipped));
        }
        if let Err(failure) = self.inner.check_readiness().await {
            self.inner.fail_process(&failure).await;
            return Err(ArchiveError::NotReady(failure));
        }
        {
            let mut control = self.inner.lock_control();
            if control.state != OrchestratorState::Starting {
                control.state = OrchestratorState::Stopped;
                return Ok(PassReport::new(PassOutcome::Interrupted));
            }
            control.state = OrchestratorState::Running;
        }
        self.inner.emit_status(ProcessStatus::active());

        let report = self.inner.process_queue().await;
        self.stop();
        Ok(report)
    }

    /// Runs one pass now; a no-op while another pass is executing.
    pub async fn process_queue(&self) -> PassReport {
        self.inner.process_queue().await
    }

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.inner.lock_control().state
    }

    #[must_use]
    pub fn status(&self) -> ProcessSnapshot {
        let control = self.inner.lock_control();
        ProcessSnapshot {
            is_active: control.state == OrchestratorState::Running,
            is_processing: control.processing,
            current_song: control.current_song.clone(),
            passes_finished: control.passes_finished,
        }
    }

    /// Lists the songs the next pass would attempt.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Library`] if the queue cannot be read.
    pub async fn queue_status(&self) -> Result<QueueSnapshot, ArchiveError> {
        let items = self.inner.repo.get_pending_songs().await?;
        let (is_processing, current_song) = {
            let control = self.inner.lock_control();
            (control.processing, control.current_song.clone())
        };
        Ok(QueueSnapshot {
            is_processing,
            current_song,
            queue_length: items.len(),
            items,
        })
    }
}

async fn run_ticker(inner: Arc<Inner>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                inner.process_queue().await;
            }
        }
    }
    debug!("archive ticker exited");
}

impl Inner {
    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Moves `Stopped -> Starting`; false if not stopped.
    fn begin_start(&self) -> bool {
        let mut control = self.lock_control();
        if control.state != OrchestratorState::Stopped {
            return false;
        }
        control.state = OrchestratorState::Starting;
        true
    }

    fn stop_requested(&self) -> bool {
        self.lock_control().state != OrchestratorState::Running
    }

    fn set_current_song(&self, song: Option<Song>) {
        self.lock_control().current_song = song;
    }

    fn emit_status(&self, status: ProcessStatus) {
        self.ctx.emit(ArchiveEvent::ArchiveProcessStatus(status));
    }

    async fn check_readiness(&self) -> Result<Arc<dyn DownloadPlugin>, ReadinessFailure> {
        let Some(plugin) = self.plugins.get_active_plugin().await else {
            return Err(ReadinessFailure::NoActivePlugin);
        };
        let check = self
            .plugins
            .check_dependencies()
            .await
            .map_err(|e| ReadinessFailure::CheckFailed(e.to_string()))?;
        if !check.installed {
            return Err(ReadinessFailure::from_missing(&check.missing));
        }
        Ok(plugin)
    }

    /// Stops the process for a readiness failure and reports why.
    ///
    /// Dependency failures also deactivate the plugin.
    async fn fail_process(&self, failure: &ReadinessFailure) {
        warn!(reason = failure.key(), error = %failure, "archive process cannot run");
        if *failure != ReadinessFailure::NoActivePlugin {
            if let Err(e) = self.plugins.deactivate().await {
                warn!(error = %e, "failed to deactivate plugin");
            }
        }

        {
            let mut control = self.lock_control();
            control.state = OrchestratorState::Stopped;
            control.signal_shutdown();
        }

        let params = failure.params();
        self.emit_status(ProcessStatus::failed(failure.key(), params.clone()));
        self.ctx
            .notify(NotificationLevel::Error, failure.key(), params.unwrap_or_default());
    }

    #[instrument(skip(self))]
    async fn process_queue(&self) -> PassReport {
        let Ok(_guard) = self.pass_lock.try_lock() else {
            debug!("pass already in progress, skipping");
            return PassReport::new(PassOutcome::Skipped);
        };
        {
            let mut control = self.lock_control();
            if control.state != OrchestratorState::Running {
                return PassReport::new(PassOutcome::Skipped);
            }
            control.processing = true;
        }

        let report = self.run_pass().await;

        let stopped = {
            let mut control = self.lock_control();
            control.processing = false;
            control.current_song = None;
            control.passes_finished += 1;
            if control.state == OrchestratorState::Stopping {
                control.state = OrchestratorState::Stopped;
                true
            } else {
                false
            }
        };
        if stopped {
            info!("archive process stopped");
            self.emit_status(ProcessStatus::inactive());
        }

        info!(
            outcome = ?report.outcome,
            albums = report.albums,
            archived = report.archived,
            not_found = report.not_found,
            failed = report.failed,
            "pass finished"
        );
        report
    }

    async fn run_pass(&self) -> PassReport {
        let plugin = match self.check_readiness().await {
            Ok(plugin) => plugin,
            Err(failure) => {
                self.fail_process(&failure).await;
                return PassReport::new(PassOutcome::Aborted);
            }
        };
        if self.stop_requested() {
            return PassReport::new(PassOutcome::Interrupted);
        }

        let pending = match self.repo.get_pending_songs().await {
            Ok(songs) => songs,
            Err(e) => {
                error!(error = %e, "failed to read pending songs");
                self.ctx
                    .notify(NotificationLevel::Error, "archive_failed", vec![e.to_string()]);
                return PassReport::new(PassOutcome::Failed);
            }
        };
        if pending.is_empty() {
            debug!("no pending songs");
            return PassReport::new(PassOutcome::Completed);
        }
        info!(pending = pending.len(), "starting pass");

        let mut report = PassReport::new(PassOutcome::Completed);
        for (album_id, songs) in group_by_album(pending) {
            if self.stop_requested() {
                report.outcome = PassOutcome::Interrupted;
                break;
            }
            match self
                .process_album(plugin.as_ref(), album_id, &songs, &mut report)
                .await
            {
                Ok(AlbumRun::Finished) => {}
                Ok(AlbumRun::Interrupted) => {
                    report.outcome = PassOutcome::Interrupted;
                    break;
                }
                Err(e) => {
                    error!(album_id, error = %e, "album archive failed");
                    self.ctx
                        .notify(NotificationLevel::Error, "archive_failed", vec![e.to_string()]);
                }
            }
        }
        report
    }

    #[instrument(skip(self, plugin, pending, report), fields(pending = pending.len()))]
    async fn process_album(
        &self,
        plugin: &dyn DownloadPlugin,
        album_id: i64,
        pending: &[Song],
        report: &mut PassReport,
    ) -> Result<AlbumRun, ArchiveError> {
        let first_song = pending.first().map_or(0, |song| song.id);
        let Some(album) = self.repo.get_album_by_id(album_id).await? else {
            return Err(ArchiveError::MissingParent {
                song_id: first_song,
                missing: "album",
            });
        };
        let Some(artist) = self.repo.get_artist_by_id(album.artist_id).await? else {
            return Err(ArchiveError::MissingParent {
                song_id: first_song,
                missing: "artist",
            });
        };

        let songs = self.repo.get_songs_by_album(album.id).await?;
        let total = songs.len();
        let mut completed = archived_count(&songs);
        self.ctx.emit(ArchiveEvent::AlbumArchiveStarted(progress(
            &album, &artist, total, completed, None, None,
        )));
        info!(album = %album.name, artist = %artist.name, total, completed, "archiving album");

        let mut run = AlbumRun::Finished;
        for song in pending {
            if self.stop_requested() {
                run = AlbumRun::Interrupted;
                break;
            }
            self.set_current_song(Some(song.clone()));

            match self.pipeline.archive_one(plugin, &album, &artist, song).await {
                Ok(SongOutcome::Archived { .. }) => report.archived += 1,
                Ok(SongOutcome::VideoNotFound) => report.not_found += 1,
                Ok(SongOutcome::InvalidUrl) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(song_id = song.id, title = %song.name, error = %e, "song failed");
                }
            }

            match self.repo.get_songs_by_album(album.id).await {
                Ok(songs) => completed = archived_count(&songs),
                Err(e) => warn!(error = %e, "failed to recount album progress"),
            }
            self.ctx.emit(ArchiveEvent::AlbumArchiveProgress(progress(
                &album,
                &artist,
                total,
                completed,
                Some(song.name.clone()),
                None,
            )));
        }
        self.set_current_song(None);

        let outcome = if completed == total {
            AlbumRunOutcome::Completed
        } else {
            AlbumRunOutcome::Error
        };
        self.ctx.emit(ArchiveEvent::AlbumArchiveComplete(progress(
            &album,
            &artist,
            total,
            completed,
            None,
            Some(outcome),
        )));
        if let Some(status) = self.repo.update_album_archive_progress(album.id).await? {
            self.ctx
                .emit(ArchiveEvent::AlbumStatusChanged(AlbumStatusChanged {
                    album_id: album.id,
                    status,
                }));
        }
        report.albums += 1;
        Ok(run)
    }
}

fn progress(
    album: &Album,
    artist: &Artist,
    total_tracks: usize,
    completed_tracks: usize,
    current_song: Option<String>,
    status: Option<AlbumRunOutcome>,
) -> AlbumProgress {
    AlbumProgress {
        album_id: album.id,
        album_name: album.name.clone(),
        artist_name: artist.name.clone(),
        total_tracks,
        completed_tracks,
        current_song,
        status,
    }
}

fn archived_count(songs: &[Song]) -> usize {
    songs
        .iter()
        .filter(|song| song.status() == ArchiveStatus::Archived)
        .count()
}

/// Groups songs by album, keeping albums in first-seen order.
fn group_by_album(songs: Vec<Song>) -> Vec<(i64, Vec<Song>)> {
    let mut groups: Vec<(i64, Vec<Song>)> = Vec::new();
    for song in songs {
        match groups.iter_mut().find(|(id, _)| *id == song.album_id) {
            Some((_, group)) => group.push(song),
            None => groups.push((song.album_id, vec![song])),
        }
    }
    groups
}
