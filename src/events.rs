//! Outbound events and the sink they are delivered through.
//!
//! The orchestrator, plugin manager and user-action service never talk to a
//! UI directly. They receive an [`ArchiveContext`] at construction and push
//! typed [`ArchiveEvent`]s into its single [`EventSink`].
//!
//! Events serialize as `{"type": "<kebab-case name>", "data": {...}}`.

use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::library::ArchiveStatus;
use crate::plugin::DependencyCheck;

/// Default capacity of the broadcast channel behind [`BroadcastSink`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// A song changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongStatusChanged {
    pub song_id: i64,
    pub album_id: i64,
    pub status: ArchiveStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_duration: Option<i64>,
}

/// An album's derived status changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumStatusChanged {
    pub album_id: i64,
    pub status: ArchiveStatus,
}

/// Coarse outcome reported when an album run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlbumRunOutcome {
    Completed,
    Error,
}

/// Progress of the album currently being archived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumProgress {
    pub album_id: i64,
    pub album_name: String,
    pub artist_name: String,
    /// Every song of the album, not just the pending ones.
    pub total_tracks: usize,
    /// Songs of the album already archived.
    pub completed_tracks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_song: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AlbumRunOutcome>,
}

/// Whether the background process is running, with the reason it stopped on error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStatus {
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_params: Option<Vec<String>>,
}

impl ProcessStatus {
    #[must_use]
    pub fn active() -> Self {
        Self {
            is_active: true,
            error_key: None,
            error_params: None,
        }
    }

    #[must_use]
    pub fn inactive() -> Self {
        Self {
            is_active: false,
            error_key: None,
            error_params: None,
        }
    }

    /// Inactive with a localizable reason code.
    #[must_use]
    pub fn failed(error_key: impl Into<String>, error_params: Option<Vec<String>>) -> Self {
        Self {
            is_active: false,
            error_key: Some(error_key.into()),
            error_params,
        }
    }
}

/// Result of a dependency check, tagged with the plugin it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDependencyStatus {
    pub plugin_id: String,
    pub status: DependencyCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing notice identified by a translation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub level: NotificationLevel,
    pub key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
}

/// Everything the archiver reports to the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ArchiveEvent {
    SongStatusChanged(SongStatusChanged),
    AlbumStatusChanged(AlbumStatusChanged),
    AlbumArchiveStarted(AlbumProgress),
    AlbumArchiveProgress(AlbumProgress),
    AlbumArchiveComplete(AlbumProgress),
    ArchiveProcessStatus(ProcessStatus),
    PluginDependencyStatus(PluginDependencyStatus),
    Notification(Notification),
}

impl ArchiveEvent {
    /// The wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::SongStatusChanged(_) => "song-status-changed",
            Self::AlbumStatusChanged(_) => "album-status-changed",
            Self::AlbumArchiveStarted(_) => "album-archive-started",
            Self::AlbumArchiveProgress(_) => "album-archive-progress",
            Self::AlbumArchiveComplete(_) => "album-archive-complete",
            Self::ArchiveProcessStatus(_) => "archive-process-status",
            Self::PluginDependencyStatus(_) => "plugin-dependency-status",
            Self::Notification(_) => "notification",
        }
    }
}

/// Destination for outbound events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ArchiveEvent);
}

/// Fans events out to any number of in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<ArchiveEvent>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ArchiveEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: ArchiveEvent) {
        // No subscribers is not an error.
        if self.tx.send(event).is_err() {
            trace!("event dropped, no subscribers");
        }
    }
}

/// Keeps every event in memory; used by tests and the one-shot CLI commands.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ArchiveEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<ArchiveEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drains the recorded events.
    pub fn take(&self) -> Vec<ArchiveEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: ArchiveEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: ArchiveEvent) {}
}

/// Shared handle injected into every component that reports events.
#[derive(Clone)]
pub struct ArchiveContext {
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ArchiveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveContext").finish_non_exhaustive()
    }
}

impl ArchiveContext {
    #[must_use]
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self { events }
    }

    /// A context whose events go nowhere.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(Arc::new(NullSink))
    }

    pub fn emit(&self, event: ArchiveEvent) {
        trace!(event = event.name(), "emit");
        self.events.emit(event);
    }

    /// Emits a user-facing notification.
    pub fn notify(&self, level: NotificationLevel, key: &str, params: Vec<String>) {
        self.emit(ArchiveEvent::Notification(Notification {
            level,
            key: key.to_string(),
            params,
        }));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_and_data() {
        let event = ArchiveEvent::SongStatusChanged(SongStatusChanged {
            song_id: 4,
            album_id: 2,
            status: ArchiveStatus::Archived,
            file_id: Some(11),
            archived_duration: Some(242),
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "song-status-changed");
        assert_eq!(value["data"]["songId"], 4);
        assert_eq!(value["data"]["status"], "ARCHIVED");
        assert_eq!(value["data"]["archivedDuration"], 242);
        assert_eq!(value["type"], event.name());
    }

    #[test]
    fn test_process_status_omits_absent_error() {
        let value =
            serde_json::to_value(ArchiveEvent::ArchiveProcessStatus(ProcessStatus::active()))
                .unwrap();
        assert_eq!(value["data"]["isActive"], true);
        assert!(value["data"].get("errorKey").is_none());

        let failed = ProcessStatus::failed("missing_dependency", Some(vec!["yt-dlp".to_string()]));
        let value = serde_json::to_value(ArchiveEvent::ArchiveProcessStatus(failed)).unwrap();
        assert_eq!(value["data"]["errorKey"], "missing_dependency");
        assert_eq!(value["data"]["errorParams"][0], "yt-dlp");
    }

    #[test]
    fn test_album_run_outcome_lowercase() {
        let progress = AlbumProgress {
            album_id: 1,
            album_name: "A".to_string(),
            artist_name: "B".to_string(),
            total_tracks: 3,
            completed_tracks: 3,
            current_song: None,
            status: Some(AlbumRunOutcome::Completed),
        };
        let value = serde_json::to_value(ArchiveEvent::AlbumArchiveComplete(progress)).unwrap();
        assert_eq!(value["type"], "album-archive-complete");
        assert_eq!(value["data"]["status"], "completed");
        assert_eq!(value["data"]["totalTracks"], 3);
    }

    #[test]
    fn test_recording_sink_take_drains() {
        let sink = Arc::new(RecordingSink::new());
        let ctx = ArchiveContext::new(sink.clone());
        ctx.notify(NotificationLevel::Info, "plugin_activated", Vec::new());
        ctx.emit(ArchiveEvent::ArchiveProcessStatus(ProcessStatus::inactive()));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "notification");
        assert_eq!(sink.take().len(), 2);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe();
        sink.emit(ArchiveEvent::ArchiveProcessStatus(ProcessStatus::active()));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "archive-process-status");
    }

    #[test]
    fn test_broadcast_sink_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::new(4);
        sink.emit(ArchiveEvent::ArchiveProcessStatus(ProcessStatus::inactive()));
    }
}
