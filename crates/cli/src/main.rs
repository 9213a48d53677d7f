//! rkcache CLI Application
//!
//! Operator front end for the local build artifact cache: fetch and store
//! artifacts by rule key, run eviction, and inspect usage.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use rkcache_cli::cli::{self, CliError, EXIT_ERROR, render_error};
use rkcache_cli::commands::{self, Command};
use rkcache_cli::tracing::{self, TracingConfig, TracingFormat};

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: if cli.json {
            TracingFormat::Json
        } else {
            TracingFormat::Compact
        },
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = tracing::init_tracing(tracing_config) {
        eprintln!("{e:?}");
    }

    std::process::exit(run(cli));
}

/// Resolve configuration, execute the command and map the result to an exit code
fn run(cli: cli::Cli) -> i32 {
    let json_mode = cli.json;
    let outcome = cli
        .cache_config()
        .and_then(|config| commands::execute(Command::from(cli.command), &config));

    match outcome {
        Ok(output) => {
            if !output.stdout.is_empty() {
                println!("{}", output.stdout);
            }
            output.exit_code
        }
        Err(err) => {
            report(&err, json_mode);
            EXIT_ERROR
        }
    }
}

fn report(err: &CliError, json_mode: bool) {
    ::tracing::debug!(error = %err, "Command failed");
    render_error(err, json_mode);
}
