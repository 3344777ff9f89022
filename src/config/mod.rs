//! Configuration management for ClipStash
//!
//! Resolves where the history database lives and loads the optional
//! `config.toml` holding display and polling settings.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::{CONFIG_PATH_ENV, DB_PATH_ENV};

/// Name of the per-user directory under the platform config dir
const APP_DIR: &str = "clipstash";
const DB_FILE: &str = "clipstash.db";
const CONFIG_FILE: &str = "config.toml";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading config file or creating directories
    #[error("Failed to access config path: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML rendering error
    #[error("Failed to render TOML: {0}")]
    Render(#[from] toml::ser::Error),

    /// Validation error
    #[error("Config validation failed: {0}")]
    Validation(String),

    /// The platform has no per-user config directory
    #[error("Could not determine user config directory")]
    NoConfigDir,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level used when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Storage configuration
    #[serde(default)]
    pub history: HistoryConfig,

    /// Output configuration for the query commands
    #[serde(default)]
    pub display: DisplayConfig,

    /// Clipboard sampling configuration
    #[serde(default)]
    pub clipboard: ClipboardConfig,
}

/// Storage configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Database location; CLIPSTASH_DB_PATH takes precedence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    /// Entries shown by `list`
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,

    /// Matches shown by `search`
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Characters of content shown per line before truncation
    #[serde(default = "default_preview_width")]
    pub preview_width: usize,
}

/// Clipboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipboardConfig {
    /// How often the clipboard is sampled for changes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_list_limit() -> usize {
    10
}

fn default_search_limit() -> usize {
    20
}

fn default_preview_width() -> usize {
    80
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            search_limit: default_search_limit(),
            preview_width: default_preview_width(),
        }
    }
}

impl Default for ClipboardConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            history: HistoryConfig::default(),
            display: DisplayConfig::default(),
            clipboard: ClipboardConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Checks in order:
    /// 1. Path from CLIPSTASH_CONFIG environment variable
    /// 2. `<config dir>/clipstash/config.toml`
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        match Self::find_config_path() {
            Some(path) => Self::load_from_path(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration with an optional explicit path
    pub fn load_config(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        match config_path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml_str)?;
        if let Some(path) = config.history.db_path.take() {
            config.history.db_path = Some(expand_path(&path));
        }
        config.validate()?;
        Ok(config)
    }

    fn find_config_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = expand_path(Path::new(&path));
            if path.exists() {
                return Some(path);
            }
        }

        default_config_path().filter(|p| p.exists())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("display.list_limit", self.display.list_limit as u64, 1, 1000)?;
        check_range("display.search_limit", self.display.search_limit as u64, 1, 1000)?;
        check_range("display.preview_width", self.display.preview_width as u64, 8, 1000)?;
        check_range(
            "clipboard.poll_interval_ms",
            self.clipboard.poll_interval_ms,
            50,
            60_000,
        )?;
        Ok(())
    }

    /// Resolve the history database path and create its directory
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        let from_env = std::env::var(DB_PATH_ENV).ok();
        resolve_db_path(from_env.as_deref(), self.history.db_path.as_deref())
    }

    /// Render a commented example configuration file
    pub fn generate_example() -> String {
        let config = Config::default();
        format!(
            r#"# ClipStash Configuration File
# Location: ~/.config/clipstash/config.toml

# Logging level (trace, debug, info, warn, error); RUST_LOG overrides it
log_level = "{}"

[history]
# Database file; the CLIPSTASH_DB_PATH environment variable overrides it
# db_path = "~/.config/clipstash/clipstash.db"

[display]
# Entries printed by `clipstash list`
list_limit = {}
# Matches printed by `clipstash search`
search_limit = {}
# Characters of content per line before it is cut with "..."
preview_width = {}

[clipboard]
# How often the clipboard is sampled, in milliseconds
poll_interval_ms = {}
"#,
            config.log_level,
            config.display.list_limit,
            config.display.search_limit,
            config.display.preview_width,
            config.clipboard.poll_interval_ms,
        )
    }

    /// Write the example configuration to the default location
    pub fn write_example(force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = default_config_path().ok_or(ConfigError::NoConfigDir)?;
        if let Some(parent) = config_path.parent() {
            create_private_dir(parent)?;
        }

        if !force && config_path.exists() {
            return Err(ConfigError::Validation(
                "Config file already exists. Use --force to overwrite.".to_string(),
            ));
        }

        std::fs::write(&config_path, Self::generate_example())?;
        Ok(config_path)
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Pick the database path: explicit override, then configured path, then
/// `<config dir>/clipstash/clipstash.db`. The containing directory is created
/// owner-only.
pub fn resolve_db_path(
    env_override: Option<&str>,
    configured: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let explicit = env_override
        .filter(|v| !v.is_empty())
        .map(|v| expand_path(Path::new(v)))
        .or_else(|| configured.map(Path::to_path_buf));

    if let Some(path) = explicit {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent)?;
        }
        return Ok(path);
    }

    let app_dir = app_config_dir().ok_or(ConfigError::NoConfigDir)?;
    create_private_dir(&app_dir)?;
    Ok(app_dir.join(DB_FILE))
}

/// Per-user application directory:
/// - Linux:   ~/.config/clipstash
/// - macOS:   ~/Library/Application Support/clipstash
/// - Windows: %APPDATA%\clipstash
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

fn default_config_path() -> Option<PathBuf> {
    app_config_dir().map(|p| p.join(CONFIG_FILE))
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Validation(format!(
            "{} must be between {} and {} (got {})",
            name, min, max, value
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)
}

/// Expand tilde in path
fn expand_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    let expanded = shellexpand::tilde(path_str.as_ref());
    PathBuf::from(expanded.into_owned())
}
