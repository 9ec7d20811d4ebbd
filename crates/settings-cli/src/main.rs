//! `settings` – command-line host for settings-map.
//!
//! Opens one XML settings file, applies one command, and exits.  Each
//! mutating command leaves the file fully rewritten.
//!
//! # Usage
//!
//! ```text
//! settings [--file PATH] [--config PATH] <COMMAND>
//!
//! Commands:
//!   init [--root NAME]   Create a new settings file
//!   get KEY              Print a value
//!   set KEY VALUE        Insert or update
//!   add KEY VALUE        Insert; fail if KEY exists
//!   remove KEY           Delete; fail if KEY is missing
//!   list                 Print all KEY=VALUE pairs
//!   clear                Delete all variables
//!   import PATH          Apply KEY=VALUE lines with one save
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable          | Description                              |
//! |-------------------|------------------------------------------|
//! | `SETTINGS_FILE`   | Settings file (same as `--file`)         |
//! | `SETTINGS_CONFIG` | Config file (same as `--config`)         |
//! | `RUST_LOG`        | Log filter; overrides `cli.log_level`    |

mod cli;
mod config;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())
        .context("failed to load configuration")?;

    // Logs go to stderr; stdout is reserved for command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    cli::run(cli, &config, &mut out)
}
