//! Error types for plugin loading, activation and calls.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the plugin manager or by a plugin call.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin is loaded.
    #[error("no plugin loaded")]
    PluginAbsent,

    /// Instantiating or initializing the plugin failed.
    #[error("failed to load plugin from {}: {reason}", path.display())]
    LoadFailure {
        /// Artifact that was being loaded.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Activation was refused.
    #[error("plugin activation rejected: {0}")]
    ActivationRejected(String),

    /// An install request carried an unusable artifact name.
    #[error("invalid plugin artifact name: '{0}'")]
    InvalidArtifact(String),

    /// Filesystem error around the plugin directory.
    #[error("plugin IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The plugin answered with something that does not match the contract.
    #[error("plugin protocol error in '{command}': {message}")]
    Protocol {
        /// Contract call that produced the reply.
        command: String,
        /// Parse or validation failure.
        message: String,
    },

    /// The plugin call itself reported failure.
    #[error("plugin call '{command}' failed: {message}")]
    CallFailed {
        /// Contract call that failed.
        command: String,
        /// Exit status and stderr, or the plugin's own message.
        message: String,
    },

    /// The plugin did not answer in time.
    #[error("plugin call '{command}' timed out after {secs}s")]
    Timeout {
        /// Contract call that timed out.
        command: String,
        /// Configured limit.
        secs: u64,
    },
}

impl PluginError {
    /// Shorthand for a failed call with a free-form message.
    #[must_use]
    pub fn call_failed(command: &str, message: impl Into<String>) -> Self {
        Self::CallFailed {
            command: command.to_string(),
            message: message.into(),
        }
    }
}
