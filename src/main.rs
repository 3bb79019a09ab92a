//! CLI entry point for the archiver.

use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use archiver_core::{
    ArchiveCommand, ArchiveError, ArchiveEvent, BroadcastSink, CommandResponse, ImportManifest,
};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod runtime;

use cli::{AlbumCommand, Command, PluginCommand, SongCommand};
use runtime::{AppContext, Settings};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let (cli, sources) = runtime::parse_cli_with_sources();

    let loaded = app_config::load_file_config(cli.global.config.as_deref())?;
    let settings = Settings::resolve(&cli.global, sources, loaded.config.as_ref());
    runtime::init_tracing(settings.log_level, settings.force_cli_level);

    debug!(?cli, "CLI arguments parsed");
    if let Some(path) = &loaded.path {
        debug!(path = %path.display(), loaded = loaded.config.is_some(), "config file");
    }

    let app = AppContext::build(&settings).await?;
    let exit = match cli.command {
        Command::Run => run_forever(&app).await?,
        Command::Pass => run_single_pass(&app, &settings).await?,
        Command::Status => {
            let status = app.dispatcher.dispatch(ArchiveCommand::GetQueueStatus).await;
            print_response(&status)?
        }
        Command::Import { manifest } => import_manifest(&app, &manifest).await?,
        Command::Plugin { command } => {
            let command = match command {
                PluginCommand::Show => ArchiveCommand::GetPlugin,
                PluginCommand::Install { path } => ArchiveCommand::InstallPlugin { source: path },
                PluginCommand::Activate => ArchiveCommand::ActivatePlugin,
                PluginCommand::Deactivate => ArchiveCommand::DeactivatePlugin,
                PluginCommand::Delete => ArchiveCommand::DeletePlugin,
                PluginCommand::Check => ArchiveCommand::CheckDependencies,
            };
            print_response(&app.dispatcher.dispatch(command).await)?
        }
        Command::Song { command } => {
            let command = match command {
                SongCommand::SetUrl { song_id, url } => ArchiveCommand::SetSongVideoUrl {
                    song_id,
                    url: Some(url),
                },
                SongCommand::ClearUrl { song_id } => {
                    ArchiveCommand::SetSongVideoUrl { song_id, url: None }
                }
                SongCommand::Upload { song_id, path } => {
                    ArchiveCommand::UploadSongFile { song_id, path }
                }
                SongCommand::DeleteFile { song_id } => ArchiveCommand::DeleteSongFile { song_id },
            };
            print_response(&app.dispatcher.dispatch(command).await)?
        }
        Command::Album { command } => {
            let command = match command {
                AlbumCommand::List => ArchiveCommand::ListAlbums,
                AlbumCommand::Reset { album_id } => ArchiveCommand::ResetAlbum { album_id },
                AlbumCommand::Delete { album_id } => ArchiveCommand::DeleteAlbum { album_id },
            };
            print_response(&app.dispatcher.dispatch(command).await)?
        }
    };

    app.shutdown().await;
    Ok(exit)
}

fn print_response(response: &CommandResponse) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, response)?;
    writeln!(stdout)?;
    Ok(if response.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_event(event: &ArchiveEvent) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, event)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

async fn import_manifest(app: &AppContext, path: &std::path::Path) -> Result<ExitCode> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
    let manifest = ImportManifest::from_json(&raw)
        .with_context(|| format!("Failed to parse manifest '{}'", path.display()))?;
    let response = match app.service.import(&manifest).await {
        Ok(summary) => CommandResponse::ok(serde_json::to_value(summary)?),
        Err(e) => CommandResponse::failure(e),
    };
    print_response(&response)
}

/// Starts the background process and streams events until Ctrl+C or a fatal stop.
async fn run_forever(app: &AppContext) -> Result<ExitCode> {
    let mut events = app.events.subscribe();
    let started = app.dispatcher.dispatch(ArchiveCommand::StartArchive).await;
    if !started.success {
        while let Ok(event) = events.try_recv() {
            print_event(&event)?;
        }
        return print_response(&started);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                info!("interrupt received, finishing current song");
                interrupted = true;
                app.orchestrator.stop();
            }
            event = events.recv() => match event {
                Ok(event) => {
                    print_event(&event)?;
                    if let ArchiveEvent::ArchiveProcessStatus(status) = &event
                        && !status.is_active
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    app.orchestrator.join().await;
    while let Ok(event) = events.try_recv() {
        print_event(&event)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs one pass with a progress spinner on stderr.
async fn run_single_pass(app: &AppContext, settings: &Settings) -> Result<ExitCode> {
    let use_spinner = runtime::should_use_spinner(io::stderr().is_terminal(), settings.quiet);
    let spinner = use_spinner.then(|| spawn_spinner(&app.events));

    let result = app.orchestrator.run_once().await;
    if let Some((handle, stop)) = spinner {
        let _ = stop.send(());
        let _ = handle.await;
    }

    let response = match result {
        Ok(report) => CommandResponse::ok(serde_json::to_value(report)?),
        Err(ArchiveError::NotReady(failure)) => CommandResponse {
            success: false,
            data: Some(serde_json::json!({
                "errorKey": failure.key(),
                "errorParams": failure.params(),
            })),
            error: Some(failure.to_string()),
        },
        Err(e) => CommandResponse::failure(e),
    };
    print_response(&response)
}

/// Returns the spinner task and the sender that stops it.
fn spawn_spinner(
    events: &BroadcastSink,
) -> (tokio::task::JoinHandle<()>, oneshot::Sender<()>) {
    let mut rx = events.subscribe();
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let handle = tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Checking plugin...");

        loop {
            let event = tokio::select! {
                _ = &mut stop_rx => break,
                event = rx.recv() => event,
            };
            match event {
                Ok(
                    ArchiveEvent::AlbumArchiveStarted(progress)
                    | ArchiveEvent::AlbumArchiveProgress(progress),
                ) => {
                    let current = progress
                        .current_song
                        .map(|song| format!(" - {song}"))
                        .unwrap_or_default();
                    spinner.set_message(format!(
                        "[{}/{}] {} / {}{}",
                        progress.completed_tracks,
                        progress.total_tracks,
                        progress.artist_name,
                        progress.album_name,
                        current
                    ));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
        spinner.finish_and_clear();
    });
    (handle, stop_tx)
}
