//! TOML configuration for the `settings` command-line tool.
//!
//! Read from the platform-appropriate config file unless `--config` names
//! another one:
//! - Windows:  `%APPDATA%\SettingsMap\config.toml`
//! - Linux:    `~/.config/settingsmap/config.toml`
//! - macOS:    `~/Library/Application Support/SettingsMap/config.toml`
//!
//! Example:
//!
//! ```toml
//! [cli]
//! default_file = "/home/me/project/settings.xml"
//! log_level = "debug"
//! root_name = "Settings"
//!
//! [output]
//! indent = true
//! indent_string = "    "
//! write_declaration = true
//! ```
//!
//! Every field is optional; missing fields take the defaults below, and a
//! missing file at the platform location means "all defaults".

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use settings_map::StoreOptions;
use thiserror::Error;
use tracing::debug;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level CLI configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CliConfig {
    #[serde(default)]
    pub cli: CliSection,
    /// Formatting applied whenever the tool saves a settings file.
    #[serde(default)]
    pub output: StoreOptions,
}

/// General behaviour of the tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CliSection {
    /// Settings file used when `--file` is not given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_file: Option<PathBuf>,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Root element name written by `settings init`.
    #[serde(default = "default_root_name")]
    pub root_name: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_root_name() -> String {
    "Settings".to_string()
}

impl Default for CliSection {
    fn default() -> Self {
        Self {
            default_file: None,
            log_level: default_log_level(),
            root_name: default_root_name(),
        }
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Resolves the default config file path, if the platform has a config directory.
pub fn config_file_path() -> Option<PathBuf> {
    platform_config_dir().map(|dir| dir.join("config.toml"))
}

/// Loads the CLI configuration.
///
/// With `explicit = Some(path)` the file must exist.  Otherwise the platform
/// default location is tried and a missing file yields
/// [`CliConfig::default()`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(explicit: Option<&Path>) -> Result<CliConfig, ConfigError> {
    if let Some(path) = explicit {
        return read_config(path);
    }

    let Some(path) = config_file_path() else {
        debug!("no platform config directory; using defaults");
        return Ok(CliConfig::default());
    };

    match read_config(&path) {
        Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            debug!("no config at {}; using defaults", path.display());
            Ok(CliConfig::default())
        }
        other => other,
    }
}

fn read_config(path: &Path) -> Result<CliConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg: CliConfig = toml::from_str(&content)?;
    debug!("loaded config from {}", path.display());
    Ok(cfg)
}

/// Resolves the platform config base directory for this tool.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("SettingsMap"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("settingsmap"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("SettingsMap")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
