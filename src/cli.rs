//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Archive a personal music library through a downloader plugin.
///
/// Songs waiting in the library are searched for, downloaded, tagged and
/// filed under `<library>/<artist>/<album>/`, one at a time.
#[derive(Parser, Debug)]
#[command(name = "archiver")]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/archiver/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the library database
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Root directory of archived files
    #[arg(long, global = true)]
    pub library_dir: Option<PathBuf>,

    /// Directory holding the plugin artifact
    #[arg(long, global = true)]
    pub plugins_dir: Option<PathBuf>,

    /// Seconds between automatic passes (1-86400)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub interval: Option<u64>,

    /// Per-call plugin timeout in seconds (1-86400)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..=86_400))]
    pub plugin_timeout: Option<u64>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the background archive process until interrupted
    Run,
    /// Run a single pass over pending songs and exit
    Pass,
    /// Show the process state and pending queue
    Status,
    /// Import an artist, album and tracklist from a JSON manifest
    Import {
        /// Path to the manifest file
        manifest: PathBuf,
    },
    /// Manage the downloader plugin
    Plugin {
        #[command(subcommand)]
        command: PluginCommand,
    },
    /// Act on a single song
    Song {
        #[command(subcommand)]
        command: SongCommand,
    },
    /// Act on an album
    Album {
        #[command(subcommand)]
        command: AlbumCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PluginCommand {
    /// Show the loaded plugin
    Show,
    /// Replace the installed plugin with the given artifact
    Install {
        /// Executable plugin artifact
        path: PathBuf,
    },
    /// Activate the loaded plugin after checking its dependencies
    Activate,
    /// Deactivate the loaded plugin
    Deactivate,
    /// Remove the plugin and its activation state
    Delete,
    /// Report the plugin's dependency status
    Check,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SongCommand {
    /// Set a manual source URL
    SetUrl {
        song_id: i64,
        url: String,
    },
    /// Clear the manual source URL
    ClearUrl {
        song_id: i64,
    },
    /// Attach a local audio file as the song's archive
    Upload {
        song_id: i64,
        path: PathBuf,
    },
    /// Delete the archived file and queue the song again
    DeleteFile {
        song_id: i64,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AlbumCommand {
    /// List albums with their archive progress
    List,
    /// Queue every song of the album again and delete its files
    Reset {
        album_id: i64,
    },
    /// Delete the album, its songs and their files
    Delete {
        album_id: i64,
    },
}
