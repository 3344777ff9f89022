//! Clipboard history persistence

pub mod database;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use database::{HistoryDatabase, BUSY_TIMEOUT};

/// A stored clipboard snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Row id assigned on insert; increases with insertion order
    pub id: i64,
    /// Text exactly as it was read from the clipboard
    pub content: String,
    /// When the watcher captured it
    pub created_at: DateTime<Utc>,
}

/// The `(id, content)` pair returned by listing and searching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub content: String,
}

/// History storage errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Failed to prepare the database location
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another connection held the write lock past the busy timeout
    #[error("Database is busy: {0}")]
    Busy(rusqlite::Error),

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    /// Empty snapshots are never stored
    #[error("Refusing to store empty clipboard content")]
    EmptyContent,

    /// A row carries a timestamp that does not parse
    #[error("Invalid timestamp {value:?} on entry {id}")]
    InvalidTimestamp { id: i64, value: String },
}

impl HistoryError {
    /// Whether the failure was lock contention rather than a hard error
    pub fn is_busy(&self) -> bool {
        matches!(self, HistoryError::Busy(_))
    }
}

impl From<rusqlite::Error> for HistoryError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                HistoryError::Busy(err)
            }
            _ => HistoryError::Database(err),
        }
    }
}
