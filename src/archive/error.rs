//! Error types for the archive orchestrator and song pipeline.

use thiserror::Error;

use crate::library::LibraryError;
use crate::plugin::PluginError;

/// Why the background process cannot run (or had to stop).
///
/// Each variant maps to a localizable reason key reported on the
/// `archive-process-status` event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessFailure {
    /// No plugin is loaded, or it is not active.
    #[error("no active archive plugin")]
    NoActivePlugin,

    /// Exactly one dependency is missing.
    #[error("missing dependency: {0}")]
    MissingDependency(String),

    /// Several dependencies are missing.
    #[error("missing dependencies: {}", .0.join(", "))]
    MissingDependencies(Vec<String>),

    /// The plugin reported missing dependencies without naming them.
    #[error("plugin dependencies missing")]
    DependenciesMissing,

    /// The dependency check itself failed.
    #[error("dependency check failed: {0}")]
    CheckFailed(String),
}

impl ReadinessFailure {
    /// Builds the failure for a dependency report listing `missing` names.
    #[must_use]
    pub fn from_missing(missing: &[String]) -> Self {
        match missing {
            [] => Self::DependenciesMissing,
            [single] => Self::MissingDependency(single.clone()),
            several => Self::MissingDependencies(several.to_vec()),
        }
    }

    /// Reason key for localized display.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::NoActivePlugin => "no_active_plugin",
            Self::MissingDependency(_) => "missing_dependency",
            Self::MissingDependencies(_) => "missing_dependencies_multiple",
            Self::DependenciesMissing => "plugin_dependencies_missing",
            Self::CheckFailed(_) => "dependency_check_failed",
        }
    }

    /// Interpolation parameters that go with [`ReadinessFailure::key`].
    #[must_use]
    pub fn params(&self) -> Option<Vec<String>> {
        match self {
            Self::NoActivePlugin | Self::DependenciesMissing => None,
            Self::MissingDependency(name) => Some(vec![name.clone()]),
            Self::MissingDependencies(names) => Some(vec![names.join(", ")]),
            Self::CheckFailed(message) => Some(vec![message.clone()]),
        }
    }
}

/// Errors from starting the orchestrator or archiving a song.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The plugin is absent, inactive, or missing dependencies.
    #[error("archive process not ready: {0}")]
    NotReady(ReadinessFailure),

    /// The plugin failed to search for or download a song.
    #[error("download failed for song {song_id}: {source}")]
    DownloadFailure {
        song_id: i64,
        #[source]
        source: PluginError,
    },

    /// The song's album or artist row is missing.
    #[error("song {song_id} has no {missing}")]
    MissingParent {
        song_id: i64,
        missing: &'static str,
    },

    /// Destination directory could not be prepared.
    #[error("file layout error: {0}")]
    Io(#[from] std::io::Error),

    /// Storage gateway failure.
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// Plugin manager failure outside a song download.
    #[error(transparent)]
    Plugin(#[from] PluginError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_from_missing_picks_variant() {
        assert_eq!(
            ReadinessFailure::from_missing(&[]),
            ReadinessFailure::DependenciesMissing
        );
        assert_eq!(
            ReadinessFailure::from_missing(&["tool-x".to_string()]),
            ReadinessFailure::MissingDependency("tool-x".to_string())
        );
        assert!(matches!(
            ReadinessFailure::from_missing(&["a".to_string(), "b".to_string()]),
            ReadinessFailure::MissingDependencies(_)
        ));
    }

    #[test]
    fn test_readiness_keys_and_params() {
        let single = ReadinessFailure::MissingDependency("tool-x".to_string());
        assert_eq!(single.key(), "missing_dependency");
        assert_eq!(single.params(), Some(vec!["tool-x".to_string()]));

        let multiple =
            ReadinessFailure::MissingDependencies(vec!["yt-dlp".to_string(), "ffmpeg".to_string()]);
        assert_eq!(multiple.key(), "missing_dependencies_multiple");
        assert_eq!(multiple.params(), Some(vec!["yt-dlp, ffmpeg".to_string()]));

        assert_eq!(ReadinessFailure::NoActivePlugin.key(), "no_active_plugin");
        assert_eq!(ReadinessFailure::NoActivePlugin.params(), None);
        assert_eq!(
            ReadinessFailure::DependenciesMissing.key(),
            "plugin_dependencies_missing"
        );
    }
}
