// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tokenscope - token usage and cost accounting for LLM sessions.
//!
//! This is the binary entry point. The JSON report goes to stdout; logs go
//! to stderr.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod analyze;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokenscope_config::{ConfigError, ScopeConfig};

/// Tokenscope - token usage and cost accounting for LLM sessions.
#[derive(Parser, Debug)]
#[command(name = "tokenscope", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyze one session of a JSON snapshot and print the report.
    Analyze {
        /// Snapshot file (`{"sessions": [...], "tools": [...]}`).
        snapshot: PathBuf,
        /// Session to analyze. Defaults to the first session without a parent.
        #[arg(long)]
        session: Option<String>,
        /// Entries kept in each category's top list.
        #[arg(long)]
        entry_limit: Option<usize>,
    },
    /// Validate configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            tokenscope_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.analysis.log_level);

    match cli.command {
        Some(Commands::Analyze {
            snapshot,
            session,
            entry_limit,
        }) => {
            let report = analyze::run_analyze(config, &snapshot, session, entry_limit).await;
            match report.and_then(|r| analyze::render_report(&r)) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("error: {e}");
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::CheckConfig) => {
            eprintln!(
                "tokenscope: config ok (entry_limit={}, pricing overrides={})",
                config.analysis.entry_limit,
                config.pricing.len()
            );
        }
        None => {
            println!("tokenscope: use --help for available commands");
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<ScopeConfig, Vec<ConfigError>> {
    match path {
        Some(path) => tokenscope_config::load_and_validate_path(path),
        None => tokenscope_config::load_and_validate(),
    }
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tokenscope={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
