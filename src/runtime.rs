//! Settings resolution and wiring of the archiver components for the CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use archiver_core::{
    ArchiveContext, ArchiveOrchestrator, ArchiveService, BroadcastSink, CommandDispatcher,
    DEFAULT_ARCHIVE_INTERVAL, Database, DatabaseOptions, FileLayout, Library, LoftyInspector,
    PluginManager, SongPipeline, SubprocessLoader,
};
use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches};
use tracing::{debug, info, warn};

use crate::app_config::{ArchiverConfig, VerbositySetting, resolve_default_data_dir};
use crate::cli::{Cli, GlobalArgs};

const DATABASE_FILE: &str = "archiver.db";

/// Which verbosity flags were given on the command line.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CliValueSources {
    pub(crate) verbose: bool,
    pub(crate) quiet: bool,
}

pub(crate) fn parse_cli_with_sources() -> (Cli, CliValueSources) {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|err| err.exit());
    let sources = CliValueSources {
        verbose: is_commandline_value(&matches, "verbose"),
        quiet: is_commandline_value(&matches, "quiet"),
    };
    (cli, sources)
}

fn is_commandline_value(matches: &ArgMatches, id: &str) -> bool {
    if matches.value_source(id) == Some(ValueSource::CommandLine) {
        return true;
    }
    // Global flags given after the subcommand are recorded on its matches.
    matches
        .subcommand()
        .is_some_and(|(_, sub)| is_commandline_value(sub, id))
}

/// Fully resolved runtime settings: CLI flags over config file over defaults.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) data_dir: PathBuf,
    pub(crate) library_dir: PathBuf,
    pub(crate) plugins_dir: PathBuf,
    pub(crate) interval: Duration,
    pub(crate) plugin_timeout: Option<Duration>,
    pub(crate) db_options: DatabaseOptions,
    pub(crate) log_level: &'static str,
    pub(crate) force_cli_level: bool,
    pub(crate) quiet: bool,
}

impl Settings {
    pub(crate) fn resolve(
        args: &GlobalArgs,
        sources: CliValueSources,
        file: Option<&ArchiverConfig>,
    ) -> Self {
        let file = file.cloned().unwrap_or_default();

        let data_dir = args
            .data_dir
            .clone()
            .or(file.data_dir)
            .unwrap_or_else(resolve_default_data_dir);
        let library_dir = args
            .library_dir
            .clone()
            .or(file.library_dir)
            .unwrap_or_else(|| data_dir.join("library"));
        let plugins_dir = args
            .plugins_dir
            .clone()
            .or(file.plugins_dir)
            .unwrap_or_else(|| data_dir.join("plugins"));

        let interval = args
            .interval
            .or(file.archive_interval_secs)
            .map_or(DEFAULT_ARCHIVE_INTERVAL, Duration::from_secs);
        let plugin_timeout = args
            .plugin_timeout
            .or(file.plugin_timeout_secs)
            .map(Duration::from_secs);

        let mut db_options = DatabaseOptions::default();
        if let Some(max) = file.db_max_connections {
            db_options.max_connections = max;
        }
        if let Some(busy) = file.db_busy_timeout_ms {
            db_options.busy_timeout_ms = busy;
        }

        let force_cli_level = sources.verbose || sources.quiet;
        let (log_level, quiet) = if force_cli_level {
            (cli_log_level(args.verbose, args.quiet), args.quiet)
        } else {
            match file.verbosity {
                Some(VerbositySetting::Quiet) => ("error", true),
                Some(VerbositySetting::Verbose) => ("debug", false),
                Some(VerbositySetting::Debug) => ("trace", false),
                Some(VerbositySetting::Default) | None => ("info", false),
            }
        };

        Self {
            data_dir,
            library_dir,
            plugins_dir,
            interval,
            plugin_timeout,
            db_options,
            log_level,
            force_cli_level,
            quiet,
        }
    }
}

fn cli_log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
pub(crate) fn init_tracing(default_level: &str, force_cli_level: bool) {
    let filter = if force_cli_level {
        tracing_subscriber::EnvFilter::new(default_level)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
    };
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

pub(crate) fn should_use_spinner(stderr_is_terminal: bool, quiet: bool) -> bool {
    let dumb_terminal = std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false);
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Every long-lived component, wired together.
pub(crate) struct AppContext {
    pub(crate) events: BroadcastSink,
    pub(crate) plugins: Arc<PluginManager>,
    pub(crate) orchestrator: ArchiveOrchestrator,
    pub(crate) service: ArchiveService,
    pub(crate) dispatcher: CommandDispatcher,
    db: Database,
}

impl AppContext {
    pub(crate) async fn build(settings: &Settings) -> Result<Self> {
        tokio::fs::create_dir_all(&settings.data_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create data directory '{}'",
                    settings.data_dir.display()
                )
            })?;
        let db_path = settings.data_dir.join(DATABASE_FILE);
        let db = Database::new_with_options(&db_path, &settings.db_options)
            .await
            .with_context(|| format!("Failed to open database '{}'", db_path.display()))?;
        debug!(path = %db_path.display(), "database opened");

        let events = BroadcastSink::default();
        let ctx = ArchiveContext::new(Arc::new(events.clone()));

        let library = Library::new(db.clone());
        let layout = FileLayout::new(settings.library_dir.clone());
        let media = Arc::new(LoftyInspector);

        let plugins = Arc::new(PluginManager::new(
            settings.plugins_dir.clone(),
            Arc::new(SubprocessLoader::new(settings.plugin_timeout)),
            ctx.clone(),
        ));
        match plugins.load_from_directory().await {
            Ok(Some(metadata)) => {
                info!(plugin = %metadata.id, active = metadata.is_active, "plugin ready");
            }
            Ok(None) => debug!("no plugin installed"),
            Err(e) => warn!(error = %e, "failed to load plugin"),
        }

        let repo = Arc::new(library.clone());
        let pipeline = SongPipeline::new(repo.clone(), layout.clone(), media.clone(), ctx.clone());
        let orchestrator = ArchiveOrchestrator::new(
            repo,
            Arc::clone(&plugins),
            pipeline,
            ctx.clone(),
            settings.interval,
        );
        let service = ArchiveService::new(library, layout, media, ctx);
        let dispatcher =
            CommandDispatcher::new(orchestrator.clone(), Arc::clone(&plugins), service.clone());

        Ok(Self {
            events,
            plugins,
            orchestrator,
            service,
            dispatcher,
            db,
        })
    }

    pub(crate) async fn shutdown(self) {
        self.plugins.dispose().await;
        self.db.close().await;
    }
}
