//! Command-line surface of `rkcache`
//!
//! Argument parsing, layering of flags over file and environment settings,
//! and the error type every command returns.

use crate::commands::Command;
use crate::tracing::LogLevel;
use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use rkcache_cache::{CacheConfig, parse_size};
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// `fetch` found no entry for the key
pub const EXIT_MISS: i32 = 1;
/// CLI, configuration or cache error exit code
pub const EXIT_ERROR: i32 = 2;

/// CLI-specific error types
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CliError {
    /// Bad flags, configuration or keys
    #[error("Configuration error: {message}")]
    #[diagnostic(code(rkcache::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// A cache operation failed
    #[error("Cache error: {message}")]
    #[diagnostic(code(rkcache::cli::cache))]
    Cache {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
}

impl CliError {
    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new cache error
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new cache error with help text
    #[must_use]
    pub fn cache_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Cache { .. } => "cache",
        }
    }
}

impl From<rkcache_cache::Error> for CliError {
    fn from(err: rkcache_cache::Error) -> Self {
        match err {
            // Extract just the message to avoid a doubled "Configuration error:" prefix
            rkcache_cache::Error::Configuration { message } => Self::config_with_help(
                message,
                "Check the --config file, RKCACHE_* variables and --dir/--max-size flags",
            ),
            rkcache_cache::Error::InvalidKey { .. } => Self::config_with_help(
                err.to_string(),
                "Keys must be a single file name: no '/', '\\' or NUL",
            ),
            rkcache_cache::Error::Io { .. } | rkcache_cache::Error::Persist { .. } => {
                let message = match std::error::Error::source(&err) {
                    Some(cause) => format!("{err}: {cause}"),
                    None => err.to_string(),
                };
                Self::cache_with_help(message, "Check file permissions and ensure the path exists")
            }
        }
    }
}

/// Error response envelope for JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope<E> {
    /// Status indicator - always "error" for failures
    pub status: &'static str,
    /// The error details
    pub error: E,
}

impl<E> ErrorEnvelope<E> {
    /// Create a new error envelope
    #[must_use]
    pub const fn new(error: E) -> Self {
        Self {
            status: "error",
            error,
        }
    }
}

/// Render error appropriately based on JSON flag
#[allow(clippy::print_stdout, clippy::print_stderr)]
pub fn render_error(err: &CliError, json_mode: bool) {
    if json_mode {
        let envelope = ErrorEnvelope::new(serde_json::json!({
            "code": err.code(),
            "message": err.to_string(),
        }));

        match serde_json::to_string(&envelope) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error serializing error response"),
        }
    } else {
        let report = Report::new(err.clone());
        eprintln!("{report:?}");
        let _ = io::stderr().flush();
    }
}

/// Main CLI entry point for rkcache.
///
/// Inspect and maintain a local build artifact cache.
#[derive(Parser, Debug)]
#[command(name = "rkcache")]
#[command(about = "Local build artifact cache keyed by rule keys")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,

    /// Cache root, overriding the file and `RKCACHE_DIR`
    #[arg(long, global = true, help = "Cache root directory")]
    pub dir: Option<PathBuf>,

    /// Size bound in bytes, overriding the file and `RKCACHE_MAX_SIZE`
    #[arg(
        long,
        global = true,
        help = "Maximum cache size, e.g. 512MiB or 10G",
        value_parser = parse_max_size
    )]
    pub max_size: Option<u64>,

    /// TOML settings file
    #[arg(long, global = true, help = "Path to a TOML file with a [cache] table")]
    pub config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset
    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    /// JSON logs on stderr and JSON error envelopes on stdout
    #[arg(long, global = true, help = "Output logs in JSON format")]
    pub json: bool,
}

/// Subcommands of `rkcache`
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore an artifact
    #[command(about = "Copy a cached artifact to DEST; exits 1 on a miss")]
    Fetch {
        /// Rule key
        #[arg(help = "Rule key of the artifact")]
        key: String,
        /// Destination path
        #[arg(help = "Where to write the artifact")]
        dest: PathBuf,
    },
    /// Save an artifact
    #[command(about = "Store SOURCE under KEY")]
    Store {
        /// Rule key
        #[arg(help = "Rule key of the artifact")]
        key: String,
        /// File to copy into the cache
        #[arg(help = "Artifact file to store")]
        source: PathBuf,
    },
    /// Run one retention pass
    #[command(about = "Evict least recently used entries down to the size limit")]
    Gc,
    /// Report usage
    #[command(about = "Show cache usage statistics")]
    Stats,
    /// Print the version
    #[command(about = "Show version information")]
    Version,
}

impl From<Commands> for Command {
    fn from(cmd: Commands) -> Self {
        match cmd {
            Commands::Fetch { key, dest } => Self::Fetch { key, dest },
            Commands::Store { key, source } => Self::Store { key, source },
            Commands::Gc => Self::Gc,
            Commands::Stats => Self::Stats,
            Commands::Version => Self::Version,
        }
    }
}

fn parse_max_size(value: &str) -> Result<u64, String> {
    parse_size(value).map_err(|e| e.to_string())
}

impl Cli {
    /// Layer the config file, `RKCACHE_*` variables and flags into one config
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file or an environment value is
    /// invalid
    pub fn cache_config(&self) -> Result<CacheConfig, CliError> {
        let base = match &self.config {
            Some(path) => CacheConfig::from_toml_file(path)?,
            None => CacheConfig::default(),
        };
        let mut config = base.with_env()?;

        if let Some(dir) = &self.dir {
            config.dir = Some(dir.clone());
        }
        if let Some(max) = self.max_size {
            config.max_size_bytes = Some(max);
        }

        tracing::debug!(?config, "Resolved cache configuration");
        Ok(config)
    }
}

/// Parse process arguments, exiting on `--help` or usage errors
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
