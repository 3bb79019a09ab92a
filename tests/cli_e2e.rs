//! End-to-end CLI tests for the archiver binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Binary isolated from the user's config and data directories.
fn archiver(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("archiver").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("XDG_DATA_HOME", home.path().join("share"))
        .env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(home.path().join("data"));
    cmd
}

fn write_manifest(dir: &Path) -> PathBuf {
    let path = dir.join("manifest.json");
    std::fs::write(
        &path,
        r#"{
            "artist": {"name": "Broadcast", "catalogId": "artist-broadcast"},
            "album": {"name": "Tender Buttons", "catalogId": "album-tb", "releaseYear": 2005},
            "songs": [
                {"name": "Black Cat", "catalogId": "tb-1", "trackNumber": 1},
                {"name": "Missing", "catalogId": "tb-2", "trackNumber": 2}
            ]
        }"#,
    )
    .unwrap();
    path
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Archive a personal music library"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("archiver"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .args(["status", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_requires_subcommand() {
    let home = TempDir::new().unwrap();
    archiver(&home).assert().failure();
}

#[test]
fn test_status_on_empty_library() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"queueLength\": 0"));
    assert!(home.path().join("data").join("archiver.db").exists());
}

#[test]
fn test_plugin_show_without_plugin() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .args(["plugin", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"success\": true"));
}

#[test]
fn test_pass_without_plugin_reports_reason() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("pass")
        .assert()
        .failure()
        .stdout(predicate::str::contains("no_active_plugin"));
}

#[test]
fn test_run_without_plugin_exits_with_reason() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("run")
        .timeout(std::time::Duration::from_secs(30))
        .assert()
        .failure()
        .stdout(predicate::str::contains("no_active_plugin"));
}

#[test]
fn test_import_then_list_albums() {
    let home = TempDir::new().unwrap();
    let manifest = write_manifest(home.path());

    archiver(&home)
        .arg("import")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"albumId\""));

    archiver(&home)
        .args(["album", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Tender Buttons"))
        .stdout(predicate::str::contains("\"totalTracks\": 2"));

    archiver(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"queueLength\": 2"));
}

#[test]
fn test_import_malformed_manifest_fails() {
    let home = TempDir::new().unwrap();
    let manifest = home.path().join("bad.json");
    std::fs::write(&manifest, "{ not json").unwrap();

    archiver(&home)
        .arg("import")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("manifest"));
}

#[test]
fn test_explicit_missing_config_fails() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .arg("--config")
        .arg(home.path().join("absent.toml"))
        .arg("status")
        .assert()
        .failure();
}

#[test]
fn test_reset_unknown_album_fails() {
    let home = TempDir::new().unwrap();
    archiver(&home)
        .args(["album", "reset", "999"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("album not found"));
}

#[cfg(unix)]
fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .map(|path| if path.is_dir() { count_files(&path) } else { 1 })
        .sum()
}

#[cfg(unix)]
const SHELL_PLUGIN: &str = r#"#!/bin/sh
cmd="$1"; shift
dest=""; title=""
while [ $# -gt 1 ]; do
  case "$1" in
    --dest) dest="$2" ;;
    --title) title="$2" ;;
  esac
  shift 2
done
case "$cmd" in
  metadata) echo '{"id":"e2e","name":"E2E Plugin","version":"1.0.0"}' ;;
  initialize|dispose) echo '{}' ;;
  check-dependencies) echo '{"installed":true}' ;;
  search)
    if [ "$title" = "Missing" ]; then echo '{"url":null}'; else echo '{"url":"https://video.example/track"}'; fi ;;
  validate-url) echo '{"valid":true}' ;;
  download) printf 'not really audio' > "$dest"; printf '{"path":"%s"}\n' "$dest" ;;
  *) exit 64 ;;
esac
"#;

/// Install, activate, import and archive through real plugin subprocesses.
#[cfg(unix)]
#[test]
fn test_full_archive_flow_with_shell_plugin() {
    let home = TempDir::new().unwrap();
    let artifact = home.path().join("e2e-plugin");
    std::fs::write(&artifact, SHELL_PLUGIN).unwrap();
    let manifest = write_manifest(home.path());

    archiver(&home)
        .args(["plugin", "install"])
        .arg(&artifact)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"isActive\": false"));

    archiver(&home)
        .args(["plugin", "activate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"isActive\": true"));

    archiver(&home).arg("import").arg(&manifest).assert().success();

    archiver(&home)
        .arg("pass")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"archived\": 1"))
        .stdout(predicate::str::contains("\"notFound\": 1"));

    let library = home.path().join("data").join("library");
    assert_eq!(count_files(&library), 1);

    archiver(&home)
        .args(["album", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ARCHIVING_FAILURE"));

    archiver(&home)
        .args(["plugin", "delete"])
        .assert()
        .success();
    assert!(!home.path().join("data").join("plugins").join("e2e-plugin").exists());
}
