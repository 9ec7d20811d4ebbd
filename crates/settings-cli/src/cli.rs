//! Command-line definitions and command dispatch.
//!
//! [`run`] maps each subcommand onto one [`PersistentMap`] operation.  Output
//! goes to the writer it is given (stdout in production), logs go to stderr
//! via `tracing`, so scripted callers can rely on stdout containing only
//! values.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use settings_map::PersistentMap;
use tracing::{debug, info};

use crate::config::CliConfig;

/// Read and edit the variables of an XML settings file.
///
/// Every change is written to the file before the command exits.
#[derive(Debug, Parser)]
#[command(name = "settings", version)]
pub struct Cli {
    /// Settings file to operate on.
    ///
    /// Falls back to `default_file` from the config file.
    #[arg(long, short, global = true, env = "SETTINGS_FILE")]
    pub file: Option<PathBuf>,

    /// Config file to use instead of the platform default location.
    #[arg(long, global = true, env = "SETTINGS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Create a new settings file with an empty `Variables` element.
    Init {
        /// Root element name [default: `root_name` from config].
        #[arg(long)]
        root: Option<String>,
    },
    /// Print the value of a variable.
    Get { key: String },
    /// Insert or update a variable.
    Set { key: String, value: String },
    /// Insert a variable; fails if it already exists.
    Add { key: String, value: String },
    /// Delete a variable; fails if it does not exist.
    Remove { key: String },
    /// Print every variable as `KEY=VALUE`, sorted by key.
    List,
    /// Delete every variable.
    Clear,
    /// Apply `KEY=VALUE` lines from a file with a single save.
    Import {
        /// File of `KEY=VALUE` lines; blank lines and `#` comments are skipped.
        source: PathBuf,
    },
}

/// Executes `cli.command` against the resolved settings file.
///
/// # Errors
///
/// Returns an error if no settings file can be resolved, if the file cannot
/// be opened or saved, or if the command itself fails (missing key on `get`
/// or `remove`, existing key on `add`).
pub fn run(cli: Cli, config: &CliConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let path = resolve_file(cli.file, config)?;
    debug!("settings file: {}", path.display());

    let command = match cli.command {
        Command::Init { root } => {
            let root = root.as_deref().unwrap_or(&config.cli.root_name);
            PersistentMap::create(&path, root, config.output.clone())
                .with_context(|| format!("failed to create {}", path.display()))?;
            info!("created {}", path.display());
            return Ok(());
        }
        other => other,
    };

    let mut map = PersistentMap::open_with_options(&path, config.output.clone())
        .with_context(|| format!("failed to open {}", path.display()))?;

    match command {
        Command::Init { .. } => {}
        Command::Get { key } => {
            let value = map.get(&key)?;
            writeln!(out, "{value}")?;
        }
        Command::Set { key, value } => {
            map.set(key, value)?;
        }
        Command::Add { key, value } => {
            map.add(key, value)?;
        }
        Command::Remove { key } => {
            if map.remove(&key)?.is_none() {
                bail!("no variable named `{key}`");
            }
        }
        Command::List => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_unstable();
            for (key, value) in entries {
                writeln!(out, "{key}={value}")?;
            }
        }
        Command::Clear => {
            let count = map.len();
            map.clear()?;
            info!("removed {count} variables");
        }
        Command::Import { source } => {
            let assignments = read_assignments(&source)?;
            let count = assignments.len();
            map.batch(|m| {
                for (key, value) in assignments {
                    m.set(key, value)?;
                }
                Ok(())
            })?;
            info!("imported {count} variables from {}", source.display());
        }
    }
    Ok(())
}

fn resolve_file(flag: Option<PathBuf>, config: &CliConfig) -> anyhow::Result<PathBuf> {
    flag.or_else(|| config.cli.default_file.clone())
        .context("no settings file: pass --file, set SETTINGS_FILE, or set cli.default_file in the config")
}

fn read_assignments(source: &Path) -> anyhow::Result<Vec<(String, String)>> {
    let text = std::fs::read_to_string(source)
        .with_context(|| format!("failed to read {}", source.display()))?;
    parse_assignments(&text).with_context(|| format!("in {}", source.display()))
}

/// Parses `KEY=VALUE` lines.  Only the first `=` splits; the key is trimmed,
/// the value is kept verbatim.
fn parse_assignments(text: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut assignments = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            bail!("line {}: expected KEY=VALUE", index + 1);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("line {}: empty key", index + 1);
        }
        assignments.push((key.to_string(), value.to_string()));
    }
    Ok(assignments)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
