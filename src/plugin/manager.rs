//! Plugin lifecycle: load, activate, validate, install and delete.
//!
//! State machine: `Empty -> Loaded -> Active -> Loaded -> Empty`. `Active` is
//! only reachable through a passing dependency check; the activation flag is
//! persisted next to the artifact and keyed to its name and SHA-256 digest, so
//! replacing the file by hand never inherits a stale activation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{DependencyCheck, DownloadPlugin, PluginError, PluginMetadata, Result};
use crate::events::{ArchiveContext, ArchiveEvent, NotificationLevel, PluginDependencyStatus};

/// File holding the persisted activation flag inside the plugin directory.
pub const ACTIVATION_FILE: &str = "plugin-config.json";

/// Turns an artifact on disk into a plugin instance.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Box<dyn DownloadPlugin>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ActivationState {
    artifact: String,
    sha256: String,
    is_active: bool,
}

struct LoadedPlugin {
    plugin: Arc<dyn DownloadPlugin>,
    artifact: PathBuf,
    digest: String,
}

impl LoadedPlugin {
    fn artifact_name(&self) -> String {
        artifact_name(&self.artifact)
    }
}

#[derive(Default)]
struct ManagerState {
    loaded: Option<LoadedPlugin>,
    active: bool,
}

/// Owns zero or one downloader plugin.
pub struct PluginManager {
    plugins_dir: PathBuf,
    loader: Arc<dyn PluginLoader>,
    ctx: ArchiveContext,
    state: Mutex<ManagerState>,
}

impl std::fmt::Debug for PluginManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("plugins_dir", &self.plugins_dir)
            .finish_non_exhaustive()
    }
}

impl PluginManager {
    #[must_use]
    pub fn new(plugins_dir: PathBuf, loader: Arc<dyn PluginLoader>, ctx: ArchiveContext) -> Self {
        Self {
            plugins_dir,
            loader,
            ctx,
            state: Mutex::new(ManagerState::default()),
        }
    }

    /// Directory scanned for the plugin artifact.
    #[must_use]
    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Loads the artifact at `path`, replacing any loaded plugin.
    ///
    /// The previous plugin is disposed first. On failure the manager is left
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::LoadFailure`] if the loader or the plugin's
    /// `initialize` fails.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn load(&self, path: &Path) -> Result<PluginMetadata> {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state, path).await
    }

    /// Loads the first artifact found in the plugin directory.
    ///
    /// Returns `Ok(None)` and leaves the manager empty when the directory holds
    /// no artifact. With several candidates the first by name wins.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the directory cannot be read, or a load
    /// error from [`PluginManager::load`].
    #[instrument(skip(self), fields(dir = %self.plugins_dir.display()))]
    pub async fn load_from_directory(&self) -> Result<Option<PluginMetadata>> {
        let mut state = self.state.lock().await;
        self.load_from_directory_locked(&mut state).await
    }

    /// Deactivates, then rescans the plugin directory.
    ///
    /// # Errors
    ///
    /// See [`PluginManager::load_from_directory`].
    pub async fn reload(&self) -> Result<Option<PluginMetadata>> {
        let mut state = self.state.lock().await;
        self.set_active_locked(&mut state, false).await?;
        self.load_from_directory_locked(&mut state).await
    }

    /// Activates the loaded plugin after a passing dependency check.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ActivationRejected`] if no plugin is loaded or
    /// its dependencies are missing.
    #[instrument(skip(self))]
    pub async fn activate(&self) -> Result<PluginMetadata> {
        let mut state = self.state.lock().await;
        let Some(loaded) = state.loaded.as_ref() else {
            return Err(PluginError::ActivationRejected("no plugin loaded".to_string()));
        };
        let plugin = Arc::clone(&loaded.plugin);

        let check = self.run_dependency_check(plugin.as_ref()).await?;
        if !check.installed {
            let reason = if check.missing.is_empty() {
                check
                    .message
                    .unwrap_or_else(|| "plugin dependencies missing".to_string())
            } else {
                format!("missing dependencies: {}", check.missing.join(", "))
            };
            warn!(reason = %reason, "activation rejected");
            return Err(PluginError::ActivationRejected(reason));
        }

        self.set_active_locked(&mut state, true).await?;
        let metadata = PluginMetadata::from_descriptor(plugin.descriptor(), true);
        info!(plugin = %metadata.id, "plugin activated");
        self.ctx
            .notify(NotificationLevel::Info, "plugin_activated", vec![metadata.name.clone()]);
        Ok(metadata)
    }

    /// Clears the activation flag. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Io`] if the activation file cannot be written.
    #[instrument(skip(self))]
    pub async fn deactivate(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.set_active_locked(&mut state, false).await
    }

    /// Asks the loaded plugin for its dependency status and broadcasts it.
    ///
    /// Works whether or not the plugin is active.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PluginAbsent`] if nothing is loaded, or the
    /// plugin's own error.
    #[instrument(skip(self))]
    pub async fn check_dependencies(&self) -> Result<DependencyCheck> {
        let plugin = {
            let state = self.state.lock().await;
            match state.loaded.as_ref() {
                Some(loaded) => Arc::clone(&loaded.plugin),
                None => return Err(PluginError::PluginAbsent),
            }
        };
        self.run_dependency_check(plugin.as_ref()).await
    }

    /// Replaces the installed plugin with a new artifact.
    ///
    /// The current plugin is deactivated, disposed and its artifact deleted
    /// before the new artifact is written and loaded. The new plugin starts
    /// inactive.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidArtifact`] for an unusable name,
    /// [`PluginError::Io`] if writing fails, or a load error.
    #[instrument(skip(self, content), fields(bytes = content.len()))]
    pub async fn install(&self, name: &str, content: &[u8]) -> Result<PluginMetadata> {
        let file_name = sanitize_artifact_name(name)?;
        let mut state = self.state.lock().await;

        if state.loaded.is_some() {
            self.set_active_locked(&mut state, false).await?;
        }
        if let Some(old) = self.unload_locked(&mut state).await {
            remove_if_exists(&old).await?;
            debug!(artifact = %old.display(), "removed previous plugin artifact");
        }
        remove_if_exists(&self.activation_path()).await?;

        tokio::fs::create_dir_all(&self.plugins_dir).await?;
        let target = self.plugins_dir.join(&file_name);
        tokio::fs::write(&target, content).await?;
        mark_executable(&target).await?;
        info!(artifact = %file_name, "plugin artifact written");

        self.load_locked(&mut state, &target).await
    }

    /// Removes the loaded plugin, its artifact and its activation state.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::PluginAbsent`] if nothing is loaded, or
    /// [`PluginError::Io`] if a file cannot be removed.
    #[instrument(skip(self))]
    pub async fn delete(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.loaded.is_none() {
            return Err(PluginError::PluginAbsent);
        }

        state.active = false;
        if let Some(artifact) = self.unload_locked(&mut state).await {
            remove_if_exists(&artifact).await?;
            info!(artifact = %artifact.display(), "plugin deleted");
        }
        remove_if_exists(&self.activation_path()).await?;
        Ok(())
    }

    /// Returns the plugin only when it is both loaded and active.
    pub async fn get_active_plugin(&self) -> Option<Arc<dyn DownloadPlugin>> {
        let state = self.state.lock().await;
        match state.loaded.as_ref() {
            Some(loaded) if state.active => Some(Arc::clone(&loaded.plugin)),
            _ => None,
        }
    }

    /// Describes the loaded plugin, if any.
    pub async fn metadata(&self) -> Option<PluginMetadata> {
        let state = self.state.lock().await;
        state
            .loaded
            .as_ref()
            .map(|loaded| PluginMetadata::from_descriptor(loaded.plugin.descriptor(), state.active))
    }

    pub async fn has_plugin(&self) -> bool {
        self.state.lock().await.loaded.is_some()
    }

    pub async fn is_active(&self) -> bool {
        let state = self.state.lock().await;
        state.loaded.is_some() && state.active
    }

    /// Disposes the loaded plugin without touching the persisted flag.
    pub async fn dispose(&self) {
        let mut state = self.state.lock().await;
        self.unload_locked(&mut state).await;
    }

    fn activation_path(&self) -> PathBuf {
        self.plugins_dir.join(ACTIVATION_FILE)
    }

    async fn run_dependency_check(&self, plugin: &dyn DownloadPlugin) -> Result<DependencyCheck> {
        let check = plugin.check_dependencies().await?;
        self.ctx
            .emit(ArchiveEvent::PluginDependencyStatus(PluginDependencyStatus {
                plugin_id: plugin.descriptor().id,
                status: check.clone(),
            }));
        Ok(check)
    }

    async fn load_locked(&self, state: &mut ManagerState, path: &Path) -> Result<PluginMetadata> {
        self.unload_locked(state).await;

        // Digest first: an unreadable artifact leaves nothing to dispose.
        let digest = file_digest(path).await?;
        let plugin = self
            .loader
            .load(path)
            .await
            .map_err(|e| load_failure(path, &e))?;
        if let Err(e) = plugin.initialize().await {
            let err = load_failure(path, &e);
            if let Err(dispose_err) = plugin.dispose().await {
                debug!(error = %dispose_err, "dispose after failed initialize");
            }
            return Err(err);
        }

        let loaded = LoadedPlugin {
            plugin: Arc::from(plugin),
            artifact: path.to_path_buf(),
            digest,
        };
        let active = self
            .read_activation()
            .await
            .is_some_and(|saved| {
                saved.is_active
                    && saved.artifact == loaded.artifact_name()
                    && saved.sha256 == loaded.digest
            });

        let metadata = PluginMetadata::from_descriptor(loaded.plugin.descriptor(), active);
        info!(plugin = %metadata.id, version = %metadata.version, active, "plugin loaded");
        state.loaded = Some(loaded);
        state.active = active;
        Ok(metadata)
    }

    async fn load_from_directory_locked(
        &self,
        state: &mut ManagerState,
    ) -> Result<Option<PluginMetadata>> {
        tokio::fs::create_dir_all(&self.plugins_dir).await?;
        let candidates = list_candidates(&self.plugins_dir).await?;

        let Some(first) = candidates.first() else {
            debug!("no plugin artifact found");
            self.unload_locked(state).await;
            return Ok(None);
        };
        if candidates.len() > 1 {
            warn!(
                count = candidates.len(),
                chosen = %first.display(),
                "more than one plugin artifact found; only the first is loaded"
            );
        }

        let path = first.clone();
        self.load_locked(state, &path).await.map(Some)
    }

    async fn set_active_locked(&self, state: &mut ManagerState, active: bool) -> Result<()> {
        state.active = active && state.loaded.is_some();
        let Some(loaded) = state.loaded.as_ref() else {
            return Ok(());
        };

        let saved = ActivationState {
            artifact: loaded.artifact_name(),
            sha256: loaded.digest.clone(),
            is_active: state.active,
        };
        let json = serde_json::to_vec_pretty(&saved).map_err(|e| PluginError::Protocol {
            command: "activation-state".to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::create_dir_all(&self.plugins_dir).await?;
        tokio::fs::write(self.activation_path(), json).await?;
        Ok(())
    }

    /// Disposes and forgets the loaded plugin; returns its artifact path.
    async fn unload_locked(&self, state: &mut ManagerState) -> Option<PathBuf> {
        state.active = false;
        let loaded = state.loaded.take()?;
        if let Err(e) = loaded.plugin.dispose().await {
            warn!(error = %e, "plugin dispose failed");
        }
        Some(loaded.artifact)
    }

    async fn read_activation(&self) -> Option<ActivationState> {
        let raw = tokio::fs::read(self.activation_path()).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(saved) => Some(saved),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable plugin activation file");
                None
            }
        }
    }
}

fn load_failure(path: &Path, err: &PluginError) -> PluginError {
    PluginError::LoadFailure {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn artifact_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Keeps only the final path component and rejects empty or hidden names.
fn sanitize_artifact_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let file_name = Path::new(trimmed)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    if file_name.is_empty() || file_name.starts_with('.') || file_name == ACTIVATION_FILE {
        return Err(PluginError::InvalidArtifact(name.to_string()));
    }
    Ok(file_name)
}

async fn list_candidates(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == ACTIVATION_FILE {
            continue;
        }
        if entry.file_type().await?.is_file() {
            candidates.push(entry.path());
        }
    }
    candidates.sort();
    Ok(candidates)
}

async fn file_digest(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
async fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path).await?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_artifact_name_strips_directories() {
        assert_eq!(
            sanitize_artifact_name("../../etc/yt-plugin").unwrap(),
            "yt-plugin"
        );
        assert_eq!(sanitize_artifact_name(" plugin.sh ").unwrap(), "plugin.sh");
    }

    #[test]
    fn test_sanitize_artifact_name_rejects_hidden_and_empty() {
        assert!(matches!(
            sanitize_artifact_name(".hidden"),
            Err(PluginError::InvalidArtifact(_))
        ));
        assert!(matches!(
            sanitize_artifact_name("   "),
            Err(PluginError::InvalidArtifact(_))
        ));
        assert!(matches!(
            sanitize_artifact_name(ACTIVATION_FILE),
            Err(PluginError::InvalidArtifact(_))
        ));
    }

    #[tokio::test]
    async fn test_list_candidates_skips_config_and_hidden() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b-plugin"), "b").unwrap();
        std::fs::write(dir.path().join("a-plugin"), "a").unwrap();
        std::fs::write(dir.path().join(ACTIVATION_FILE), "{}").unwrap();
        std::fs::write(dir.path().join(".DS_Store"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();

        let candidates = list_candidates(dir.path()).await.unwrap();
        let names: Vec<String> = candidates.iter().map(|p| artifact_name(p)).collect();
        assert_eq!(names, vec!["a-plugin", "b-plugin"]);
    }

    #[tokio::test]
    async fn test_file_digest_is_hex_sha256() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p");
        std::fs::write(&path, "abc").unwrap();
        assert_eq!(
            file_digest(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
