//! Subprocess-isolated plugins.
//!
//! The plugin artifact is an executable. Every contract call runs it once:
//!
//! ```text
//! <artifact> <subcommand> [--flag value]...
//! ```
//!
//! and reads a single JSON document from stdout. A non-zero exit status is a
//! failed call; stderr becomes the error message.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{
    DependencyCheck, DownloadPlugin, DownloadRequest, DownloadResult, PluginDescriptor,
    PluginError, PluginLoader, Result,
};

#[derive(Debug, Deserialize)]
struct SearchReply {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateReply {
    valid: bool,
}

/// Loads plugin artifacts as subprocess plugins.
#[derive(Debug, Clone, Default)]
pub struct SubprocessLoader {
    timeout: Option<Duration>,
}

impl SubprocessLoader {
    /// Creates a loader; `timeout` bounds every plugin call when set.
    #[must_use]
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl PluginLoader for SubprocessLoader {
    async fn load(&self, path: &Path) -> Result<Box<dyn DownloadPlugin>> {
        let plugin = SubprocessPlugin::spawn_describe(path, self.timeout).await?;
        Ok(Box::new(plugin))
    }
}

/// A plugin backed by an executable artifact.
#[derive(Debug, Clone)]
pub struct SubprocessPlugin {
    program: PathBuf,
    descriptor: PluginDescriptor,
    timeout: Option<Duration>,
}

impl SubprocessPlugin {
    /// Runs the artifact's `metadata` call and keeps the answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be run or its reply is not a
    /// valid descriptor.
    #[instrument(skip(timeout), fields(program = %program.display()))]
    pub async fn spawn_describe(program: &Path, timeout: Option<Duration>) -> Result<Self> {
        let stdout = run_plugin(program, "metadata", &[], timeout).await?;
        let descriptor: PluginDescriptor = parse_reply("metadata", &stdout)?;
        debug!(id = %descriptor.id, version = %descriptor.version, "plugin described itself");

        Ok(Self {
            program: program.to_path_buf(),
            descriptor,
            timeout,
        })
    }

    /// Path of the executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn call<T: DeserializeOwned>(
        &self,
        subcommand: &str,
        args: &[(&str, String)],
    ) -> Result<T> {
        let stdout = run_plugin(&self.program, subcommand, args, self.timeout).await?;
        parse_reply(subcommand, &stdout)
    }

    async fn call_unit(&self, subcommand: &str) -> Result<()> {
        run_plugin(&self.program, subcommand, &[], self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl DownloadPlugin for SubprocessPlugin {
    fn descriptor(&self) -> PluginDescriptor {
        self.descriptor.clone()
    }

    async fn initialize(&self) -> Result<()> {
        self.call_unit("initialize").await
    }

    async fn check_dependencies(&self) -> Result<DependencyCheck> {
        self.call("check-dependencies", &[]).await
    }

    async fn search_song(
        &self,
        artist: &str,
        title: &str,
        album: Option<&str>,
    ) -> Result<Option<String>> {
        let mut args = vec![("artist", artist.to_string()), ("title", title.to_string())];
        if let Some(album) = album {
            args.push(("album", album.to_string()));
        }
        let reply: SearchReply = self.call("search", &args).await?;
        Ok(reply.url.filter(|url| !url.trim().is_empty()))
    }

    async fn download_song(&self, request: &DownloadRequest) -> Result<DownloadResult> {
        let mut args = vec![
            ("url", request.url.clone()),
            ("artist", request.artist.clone()),
            ("album", request.album.clone()),
            ("title", request.title.clone()),
            ("dest", request.dest_path.display().to_string()),
        ];
        if let Some(track) = request.track {
            args.push(("track", track.to_string()));
        }
        if let Some(year) = request.year {
            args.push(("year", year.to_string()));
        }
        self.call("download", &args).await
    }

    async fn validate_url(&self, url: &str) -> Result<bool> {
        let reply: ValidateReply = self.call("validate-url", &[("url", url.to_string())]).await?;
        Ok(reply.valid)
    }

    async fn dispose(&self) -> Result<()> {
        self.call_unit("dispose").await
    }
}

fn parse_reply<T: DeserializeOwned>(subcommand: &str, stdout: &str) -> Result<T> {
    serde_json::from_str(stdout.trim()).map_err(|e| PluginError::Protocol {
        command: subcommand.to_string(),
        message: e.to_string(),
    })
}

async fn run_plugin(
    program: &Path,
    subcommand: &str,
    args: &[(&str, String)],
    timeout: Option<Duration>,
) -> Result<String> {
    let mut cmd = Command::new(program);
    cmd.arg(subcommand)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (flag, value) in args {
        cmd.arg(format!("--{flag}")).arg(value);
    }

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| PluginError::Timeout {
                command: subcommand.to_string(),
                secs: limit.as_secs(),
            })?,
        None => cmd.output().await,
    }
    .map_err(|e| PluginError::call_failed(subcommand, format!("failed to execute plugin: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PluginError::call_failed(
            subcommand,
            format!("exit {}: {}", output.status, stderr.trim()),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
