//! Configuration for the `TaskPulse` server and flag-update commands.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskpulse/config.toml`)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use taskpulse::recompute::DEFAULT_PAGE_SIZE;
use taskpulse::sweeper::DEFAULT_SWEEP_INTERVAL;

/// Default display offset: UTC+03:00.
pub const DEFAULT_UTC_OFFSET_MINUTES: i32 = 180;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    database: DatabaseFileConfig,
    display: DisplayFileConfig,
    sweeper: SweeperFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
}

/// `[database]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DatabaseFileConfig {
    path: Option<PathBuf>,
}

/// `[display]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DisplayFileConfig {
    utc_offset_minutes: Option<i32>,
}

/// `[sweeper]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SweeperFileConfig {
    enabled: Option<bool>,
    interval_secs: Option<u64>,
    page_size: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for `taskpulse-server`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "TaskPulse task API and flag updater")]
pub struct ServerCliArgs {
    /// Path to config file (default: `~/.config/taskpulse/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the `SQLite` database file.
    #[arg(long, global = true, env = "TASKPULSE_DB")]
    pub database: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "TASKPULSE_LOG")]
    pub log_level: String,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// What to run (default: `serve`).
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(short, long, env = "TASKPULSE_ADDR")]
        bind: Option<String>,

        /// Display timezone as minutes east of UTC.
        #[arg(long, allow_negative_numbers = true)]
        utc_offset_minutes: Option<i32>,

        /// Run the hourly flag sweeper inside the server process.
        #[arg(long)]
        sweeper: Option<bool>,
    },

    /// Recompute every task's flags once and exit.
    UpdateFlags {
        /// Records read per page.
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Recompute flags on an interval until interrupted.
    RunUpdater {
        /// Seconds between passes.
        #[arg(long)]
        interval_secs: Option<u64>,

        /// Records read per page.
        #[arg(long)]
        page_size: Option<usize>,
    },
}

impl Default for Command {
    fn default() -> Self {
        Self::Serve {
            bind: None,
            utc_offset_minutes: None,
            sweeper: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the HTTP server to (e.g., `0.0.0.0:8000`).
    pub bind_addr: String,
    /// `SQLite` database file.
    pub database_path: PathBuf,
    /// Timezone deadlines are read and rendered in.
    pub display_offset: FixedOffset,
    /// Whether `serve` embeds the recurring sweeper.
    pub sweeper_enabled: bool,
    /// Pause between sweeper passes.
    pub sweep_interval: Duration,
    /// Records read per recompute page.
    pub page_size: usize,
    /// Log level filter string.
    pub log_level: String,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            database_path: default_database_path(),
            display_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_MINUTES * 60)
                .unwrap_or_else(|| Utc.fix()),
            sweeper_enabled: true,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or a resolved value is out of range.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &ServerCliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let (bind, offset_minutes, sweeper, interval_secs, page_size) = match &cli.command {
            Some(Command::Serve {
                bind,
                utc_offset_minutes,
                sweeper,
            }) => (bind.clone(), *utc_offset_minutes, *sweeper, None, None),
            Some(Command::UpdateFlags { page_size }) => (None, None, None, None, *page_size),
            Some(Command::RunUpdater {
                interval_secs,
                page_size,
            }) => (None, None, None, *interval_secs, *page_size),
            None => (None, None, None, None, None),
        };

        let display_offset = match offset_minutes.or(file.display.utc_offset_minutes) {
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!("utc_offset_minutes out of range: {minutes}"))
                })?,
            None => defaults.display_offset,
        };

        let page_size = page_size
            .or(file.sweeper.page_size)
            .unwrap_or(defaults.page_size);
        if page_size == 0 {
            return Err(ConfigError::Invalid("page_size must be at least 1".to_string()));
        }

        let sweep_interval = match interval_secs.or(file.sweeper.interval_secs) {
            Some(0) => {
                return Err(ConfigError::Invalid(
                    "interval_secs must be at least 1".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.sweep_interval,
        };

        Ok(Self {
            bind_addr: bind
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            database_path: cli
                .database
                .clone()
                .or_else(|| file.database.path.clone())
                .unwrap_or(defaults.database_path),
            display_offset,
            sweeper_enabled: sweeper
                .or(file.sweeper.enabled)
                .unwrap_or(defaults.sweeper_enabled),
            sweep_interval,
            page_size,
            log_level: cli.log_level.clone(),
            log_file: cli.log_file.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// `<data dir>/taskpulse/tasks.db`, or `./tasks.db` when the platform has no
/// data directory.
fn default_database_path() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("tasks.db"),
        |dir| dir.join("taskpulse").join("tasks.db"),
    )
}

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskpulse").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
