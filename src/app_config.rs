//! Configuration file loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// Line-oriented `key = value` configuration for the archiver.
#[derive(Debug, Clone, Default)]
pub struct ArchiverConfig {
    /// Directory holding the library database.
    pub data_dir: Option<PathBuf>,
    /// Root of the archived file tree.
    pub library_dir: Option<PathBuf>,
    /// Directory scanned for the plugin artifact.
    pub plugins_dir: Option<PathBuf>,
    /// Seconds between automatic passes (1..=86400).
    pub archive_interval_secs: Option<u64>,
    /// Per-call plugin timeout in seconds (1..=86400); unset means no limit.
    pub plugin_timeout_secs: Option<u64>,
    /// Database pool max connections (1..=20).
    pub db_max_connections: Option<u32>,
    /// Database busy timeout in milliseconds (0..=120000).
    pub db_busy_timeout_ms: Option<u32>,
    pub verbosity: Option<VerbositySetting>,
}

impl ArchiverConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        validate_secs("archive_interval_secs", self.archive_interval_secs)?;
        validate_secs("plugin_timeout_secs", self.plugin_timeout_secs)?;

        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!("Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000");
        }
        Ok(())
    }
}

fn validate_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=86_400).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=86400");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<ArchiverConfig>,
}

/// Resolves a per-user `archiver` directory.
///
/// Priority:
/// 1. `$<xdg_var>/archiver`
/// 2. `$HOME/<home_suffix...>/archiver`
fn user_dir(xdg_var: &str, home_suffix: &[&str]) -> Option<PathBuf> {
    if let Some(xdg) = env_var_non_empty_os(xdg_var) {
        return Some(PathBuf::from(xdg).join("archiver"));
    }
    let mut path = PathBuf::from(env_var_non_empty_os("HOME")?);
    for part in home_suffix {
        path.push(part);
    }
    Some(path.join("archiver"))
}

/// Default config file location.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    user_dir("XDG_CONFIG_HOME", &[".config"]).map(|dir| dir.join("config.toml"))
}

/// Default directory for the database, library and plugins.
#[must_use]
pub fn resolve_default_data_dir() -> PathBuf {
    user_dir("XDG_DATA_HOME", &[".local", "share"]).unwrap_or_else(|| PathBuf::from(".archiver"))
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from `explicit` or the default path, if present.
pub fn load_file_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(resolve_default_config_path);
    let Some(path_ref) = path.as_deref() else {
        return Ok(LoadedConfig { path, config: None });
    };

    if !path_ref.exists() {
        if explicit.is_some() {
            bail!("Config file '{}' does not exist", path_ref.display());
        }
        return Ok(LoadedConfig { path, config: None });
    }

    let raw = fs::read_to_string(path_ref)
        .with_context(|| format!("Failed to read config file '{}'", path_ref.display()))?;
    let config = parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path_ref.display()))?;
    Ok(LoadedConfig {
        path,
        config: Some(config),
    })
}

fn parse_config_str(raw: &str) -> Result<ArchiverConfig> {
    let mut cfg = ArchiverConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "data_dir" => {
                cfg.data_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "library_dir" => {
                cfg.library_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "plugins_dir" => {
                cfg.plugins_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "archive_interval_secs" => {
                cfg.archive_interval_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "plugin_timeout_secs" => {
                cfg.plugin_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "db_max_connections" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_max_connections out of range for u32"))?;
                cfg.db_max_connections = Some(n);
            }
            "db_busy_timeout_ms" => {
                let parsed = parse_integer_u64(value).with_context(invalid)?;
                let n = u32::try_from(parsed)
                    .map_err(|_| anyhow::anyhow!("db_busy_timeout_ms out of range for u32"))?;
                cfg.db_busy_timeout_ms = Some(n);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
