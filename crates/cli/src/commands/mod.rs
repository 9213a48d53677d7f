//! Command implementations for the rkcache CLI

pub mod artifact;
pub mod maintenance;
pub mod version;

use crate::cli::{CliError, EXIT_MISS, EXIT_OK};
use rkcache_cache::CacheConfig;
use std::path::PathBuf;

/// Internal command representation, decoupled from clap
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Command {
    Fetch { key: String, dest: PathBuf },
    Store { key: String, source: PathBuf },
    Gc,
    Stats,
    Version,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Store { .. } => "store",
            Self::Gc => "gc",
            Self::Stats => "stats",
            Self::Version => "version",
        }
    }
}

/// What a command printed and how the process should exit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Text for stdout, without trailing newline
    pub stdout: String,
    /// Process exit status
    pub exit_code: i32,
}

impl CommandOutput {
    fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_code: EXIT_OK,
        }
    }

    fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }
}

/// Run one command against the configured cache
///
/// # Errors
///
/// Returns error if the cache cannot be set up or the command fails outright.
/// A fetch miss is not an error; it is reported through the exit code.
pub fn execute(command: Command, config: &CacheConfig) -> Result<CommandOutput, CliError> {
    let span = tracing::info_span!(
        "command",
        command = command.name(),
        correlation_id = %crate::tracing::correlation_id(),
    );
    let _guard = span.enter();

    match command {
        Command::Fetch { key, dest } => {
            let result = artifact::fetch(config, &key, &dest)?;
            let output = CommandOutput::ok(result.to_string());
            Ok(if result.is_hit() {
                output
            } else {
                output.with_exit_code(EXIT_MISS)
            })
        }
        Command::Store { key, source } => {
            artifact::store(config, &key, &source)?;
            Ok(CommandOutput::ok(String::new()))
        }
        Command::Gc => {
            let report = maintenance::gc(config)?;
            Ok(CommandOutput::ok(to_json(&report)?))
        }
        Command::Stats => {
            let stats = maintenance::stats(config)?;
            Ok(CommandOutput::ok(to_json(&stats)?))
        }
        Command::Version => Ok(CommandOutput::ok(version::get_version_info())),
    }
}

fn to_json(value: &impl serde::Serialize) -> Result<String, CliError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CliError::cache(format!("Failed to serialize output: {e}")))
}
