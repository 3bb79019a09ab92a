//! Archiver Core Library
//!
//! Keeps a personal music library archived: every song waiting in the library
//! is searched for and downloaded through a single downloader plugin, tagged,
//! and filed on disk, one song at a time.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`db`] - Database connection and schema management
//! - [`library`] - Artists, albums, songs and files; the storage gateway
//! - [`status`] - Album status derived from song statuses
//! - [`plugin`] - Downloader plugin contract, loading and activation
//! - [`archive`] - Periodic, cancellable archive passes
//! - [`service`] - User actions on archive state (manual URLs, uploads, resets)
//! - [`events`] - Outbound events and the sink they flow through
//! - [`command`] - Inbound command boundary
//! - [`layout`] - On-disk file layout
//! - [`media`] - Tag writing and duration probing

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod command;
pub mod db;
pub mod events;
pub mod layout;
pub mod library;
pub mod media;
pub mod plugin;
pub mod service;
pub mod status;

// Re-export commonly used types
pub use archive::{
    ArchiveError, ArchiveOrchestrator, DEFAULT_ARCHIVE_INTERVAL, OrchestratorState, PassOutcome,
    PassReport, ReadinessFailure, SongOutcome, SongPipeline, StartOutcome, StopOutcome,
};
pub use command::{ArchiveCommand, CommandDispatcher, CommandResponse};
pub use db::{Database, DatabaseOptions, DbError};
pub use events::{
    ArchiveContext, ArchiveEvent, BroadcastSink, EventSink, NullSink, ProcessStatus,
    RecordingSink,
};
pub use layout::FileLayout;
pub use library::{
    Album, ArchiveRepository, ArchiveStatus, Artist, FileDescriptor, FileDocument, Library,
    LibraryError, NewAlbum, NewArtist, NewSong, Song,
};
pub use media::{LoftyInspector, MediaError, MediaInspector, TrackTags};
pub use plugin::{
    DependencyCheck, DownloadPlugin, DownloadRequest, DownloadResult, PluginDescriptor,
    PluginError, PluginLoader, PluginManager, PluginMetadata, SubprocessLoader,
};
pub use service::{ArchiveService, ImportManifest, ImportSummary, ServiceError};
pub use status::{StatusCounts, album_status};
