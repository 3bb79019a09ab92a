//! Downloader plugin contract and lifecycle management.
//!
//! # Architecture
//!
//! - [`DownloadPlugin`] - Async trait every downloader implementation satisfies
//! - [`PluginLoader`] - Turns an artifact on disk into a [`DownloadPlugin`]
//! - [`SubprocessLoader`] - Default loader: the artifact is an executable
//!   answering one JSON document per call
//! - [`PluginManager`] - Holds at most one plugin and gates it behind activation
//!
//! Only [`PluginManager::get_active_plugin`] hands out a plugin for real work.

mod error;
mod manager;
mod subprocess;

pub use error::PluginError;
pub use manager::{ACTIVATION_FILE, PluginLoader, PluginManager};
pub use subprocess::{SubprocessLoader, SubprocessPlugin};

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type for plugin operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Self-description returned by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
}

/// Descriptor of the loaded plugin plus its activation flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginMetadata {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    pub is_active: bool,
}

impl PluginMetadata {
    #[must_use]
    pub fn from_descriptor(descriptor: PluginDescriptor, is_active: bool) -> Self {
        Self {
            id: descriptor.id,
            name: descriptor.name,
            version: descriptor.version,
            description: descriptor.description,
            author: descriptor.author,
            is_active,
        }
    }
}

/// Outcome of a plugin's runtime dependency check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyCheck {
    pub installed: bool,
    /// Missing capabilities, in the order the plugin reported them.
    #[serde(default)]
    pub missing: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DependencyCheck {
    /// Everything is in place.
    #[must_use]
    pub fn satisfied() -> Self {
        Self {
            installed: true,
            missing: Vec::new(),
            message: None,
        }
    }

    /// The given capabilities are missing.
    #[must_use]
    pub fn missing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            installed: false,
            missing: names.into_iter().map(Into::into).collect(),
            message: None,
        }
    }
}

/// Everything a plugin needs to fetch one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub artist: String,
    pub album: String,
    pub track: Option<i64>,
    pub title: String,
    pub year: Option<i64>,
    /// Where the plugin should write the audio file.
    pub dest_path: PathBuf,
}

/// Where the plugin actually wrote the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DownloadResult {
    pub path: PathBuf,
}

/// Capability set of a downloader plugin.
///
/// # Object Safety
///
/// Uses `async_trait` so the manager can hold `Arc<dyn DownloadPlugin>`.
#[async_trait]
pub trait DownloadPlugin: Send + Sync {
    /// Returns the plugin's self-description.
    fn descriptor(&self) -> PluginDescriptor;

    /// Prepares the plugin for use. Called once right after loading.
    async fn initialize(&self) -> Result<()>;

    /// Reports whether the plugin's external requirements are present.
    async fn check_dependencies(&self) -> Result<DependencyCheck>;

    /// Looks up a source URL for a song; `None` when nothing matches.
    async fn search_song(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
    ) -> Result<Option<String>>;

    /// Downloads the source to (or near) `request.dest_path`.
    async fn download_song(&self, request: &DownloadRequest) -> Result<DownloadResult>;

    /// Checks whether a user-supplied URL is usable by this plugin.
    async fn validate_url(&self, url: &str) -> Result<bool>;

    /// Releases resources before the plugin is dropped.
    async fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
