//! # ClipStash
//!
//! Clipboard history recorder. A long-running watcher stores every distinct
//! text snapshot copied to the system clipboard in a local SQLite file, and a
//! small set of one-shot commands lists, searches, restores or clears them.

pub mod cli;
pub mod clipboard;
pub mod config;
pub mod daemon;
pub mod history;
pub mod watcher;

pub use config::Config;
pub use history::{HistoryDatabase, HistoryEntry, HistoryItem};
pub use watcher::{Capture, Watcher};

/// Result type alias for ClipStash operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for ClipStash operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration or path resolution error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Clipboard operation error
    #[error("Clipboard error: {0}")]
    Clipboard(#[from] clipboard::ClipboardError),

    /// Storage error
    #[error("History error: {0}")]
    History(#[from] history::HistoryError),
}

/// Open the history database the configuration points at, honouring the
/// `CLIPSTASH_DB_PATH` override
pub async fn open_history(config: &Config) -> Result<HistoryDatabase> {
    let path = config.db_path()?;
    tracing::info!("Opening history database at {}", path.display());
    Ok(HistoryDatabase::open(&path).await?)
}

/// Create the system clipboard provider with the configured poll interval
pub fn open_clipboard(config: &Config) -> Result<Box<dyn clipboard::ClipboardProvider>> {
    let poll_interval = std::time::Duration::from_millis(config.clipboard.poll_interval_ms);
    Ok(clipboard::create_provider(poll_interval)?)
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable overriding the history database location
pub const DB_PATH_ENV: &str = "CLIPSTASH_DB_PATH";

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "CLIPSTASH_CONFIG";
