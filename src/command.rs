//! Inbound command boundary.
//!
//! A host (UI bridge, CLI, IPC socket) sends [`ArchiveCommand`]s to a
//! [`CommandDispatcher`] and always gets a [`CommandResponse`] back; no error
//! escapes to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::archive::{ArchiveError, ArchiveOrchestrator};
use crate::plugin::PluginManager;
use crate::service::ArchiveService;

/// Everything the outside world can ask the archiver to do.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ArchiveCommand {
    StartArchive,
    StopArchive,
    GetProcessStatus,
    GetQueueStatus,
    GetPlugin,
    /// Loads `path`, or rescans the plugin directory when absent.
    #[serde(rename_all = "camelCase")]
    LoadPlugin {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    /// Installs the artifact found at `source`.
    #[serde(rename_all = "camelCase")]
    InstallPlugin {
        source: PathBuf,
    },
    ActivatePlugin,
    DeactivatePlugin,
    DeletePlugin,
    CheckDependencies,
    #[serde(rename_all = "camelCase")]
    SetSongVideoUrl {
        song_id: i64,
        #[serde(default)]
        url: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UploadSongFile {
        song_id: i64,
        path: PathBuf,
    },
    #[serde(rename_all = "camelCase")]
    DeleteSongFile {
        song_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    ResetAlbum {
        album_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    DeleteAlbum {
        album_id: i64,
    },
    ListAlbums,
}

/// Uniform reply to every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResponse {
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

fn to_response<T: Serialize, E: std::fmt::Display>(result: Result<T, E>) -> CommandResponse {
    match result {
        Ok(value) => match serde_json::to_value(value) {
            Ok(Value::Null) => CommandResponse::empty(),
            Ok(data) => CommandResponse::ok(data),
            Err(e) => CommandResponse::failure(e),
        },
        Err(e) => CommandResponse::failure(e),
    }
}

/// Routes commands to the orchestrator, plugin manager and user-action service.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    orchestrator: ArchiveOrchestrator,
    plugins: Arc<PluginManager>,
    service: ArchiveService,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(
        orchestrator: ArchiveOrchestrator,
        plugins: Arc<PluginManager>,
        service: ArchiveService,
    ) -> Self {
        Self {
            orchestrator,
            plugins,
            service,
        }
    }

    /// Executes `command`. Failures are reported in the response.
    pub async fn dispatch(&self, command: ArchiveCommand) -> CommandResponse {
        debug!(?command, "dispatching command");
        let response = self.execute(command).await;
        if let Some(error) = &response.error {
            warn!(error = %error, "command failed");
        }
        response
    }

    /// Parses a JSON command and executes it.
    pub async fn dispatch_json(&self, raw: &str) -> CommandResponse {
        match serde_json::from_str::<ArchiveCommand>(raw) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => CommandResponse::failure(format!("invalid command: {e}")),
        }
    }

    async fn execute(&self, command: ArchiveCommand) -> CommandResponse {
        match command {
            ArchiveCommand::StartArchive => match self.orchestrator.start().await {
                Ok(outcome) => CommandResponse::ok(json!({ "outcome": outcome })),
                Err(ArchiveError::NotReady(failure)) => CommandResponse {
                    success: false,
                    data: Some(json!({
                        "errorKey": failure.key(),
                        "errorParams": failure.params(),
                    })),
                    error: Some(failure.to_string()),
                },
                Err(e) => CommandResponse::failure(e),
            },
            ArchiveCommand::StopArchive => {
                CommandResponse::ok(json!({ "outcome": self.orchestrator.stop() }))
            }
            ArchiveCommand::GetProcessStatus => {
                to_response::<_, ArchiveError>(Ok(self.orchestrator.status()))
            }
            ArchiveCommand::GetQueueStatus => to_response(self.orchestrator.queue_status().await),
            ArchiveCommand::GetPlugin => {
                to_response::<_, ArchiveError>(Ok(self.plugins.metadata().await))
            }
            ArchiveCommand::LoadPlugin { path } => match path {
                Some(path) => to_response(self.plugins.load(&path).await),
                None => to_response(self.plugins.load_from_directory().await),
            },
            ArchiveCommand::InstallPlugin { source } => {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match tokio::fs::read(&source).await {
                    Ok(content) => to_response(self.plugins.install(&name, &content).await),
                    Err(e) => {
                        CommandResponse::failure(format!("cannot read {}: {e}", source.display()))
                    }
                }
            }
            ArchiveCommand::ActivatePlugin => to_response(self.plugins.activate().await),
            ArchiveCommand::DeactivatePlugin => to_response(self.plugins.deactivate().await),
            ArchiveCommand::DeletePlugin => to_response(self.plugins.delete().await),
            ArchiveCommand::CheckDependencies => {
                to_response(self.plugins.check_dependencies().await)
            }
            ArchiveCommand::SetSongVideoUrl { song_id, url } => to_response(
                self.service
                    .set_song_video_url(song_id, url.as_deref())
                    .await,
            ),
            ArchiveCommand::UploadSongFile { song_id, path } => {
                to_response(self.service.upload_song_file(song_id, &path).await)
            }
            ArchiveCommand::DeleteSongFile { song_id } => {
                to_response(self.service.delete_song_file(song_id).await)
            }
            ArchiveCommand::ResetAlbum { album_id } => {
                to_response(self.service.reset_album(album_id).await)
            }
            ArchiveCommand::DeleteAlbum { album_id } => {
                to_response(self.service.delete_album(album_id).await)
            }
            ArchiveCommand::ListAlbums => to_response(self.service.list_albums().await),
        }
    }
}
