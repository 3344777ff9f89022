//! SQLite database implementation for clipboard history

use crate::history::{HistoryEntry, HistoryError, HistoryItem};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long a writer waits for another connection's lock before giving up
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type Result<T> = std::result::Result<T, HistoryError>;

/// SQLite database wrapper for clipboard history storage.
///
/// Holds a single connection, so writes from one process never contend with
/// each other; writes from other processes are serialized by SQLite's file
/// locks and fail with [`HistoryError::Busy`] after the busy timeout.
pub struct HistoryDatabase {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl HistoryDatabase {
    /// Open or create the history database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, BUSY_TIMEOUT).await
    }

    /// Open with a custom lock wait
    pub async fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // The lock wait has to be in place before switching journal modes,
        // which itself takes a lock when another process has the file open.
        conn.busy_timeout(busy_timeout)?;

        match conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0)) {
            Ok(mode) if mode.eq_ignore_ascii_case("wal") => {}
            Ok(mode) => warn!("WAL unavailable, journal mode is {}", mode),
            Err(e) => warn!("Failed to set WAL mode: {}", e),
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
        };

        db.initialize().await?;
        debug!("Opened history database at {}", db.path.display());
        Ok(db)
    }

    async fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                created_at DATETIME NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a snapshot and return its id
    pub async fn insert(&self, content: &str, timestamp: DateTime<Utc>) -> Result<i64> {
        if content.is_empty() {
            return Err(HistoryError::EmptyContent);
        }

        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO history (content, created_at) VALUES (?1, ?2)",
            params![content, timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Content of the most recently inserted entry
    pub async fn last_content(&self) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let content = conn
            .query_row(
                "SELECT content FROM history ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(content)
    }

    /// Most recent entries first
    pub async fn list_recent(&self, limit: usize) -> Result<Vec<HistoryItem>> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT id, content FROM history ORDER BY id DESC LIMIT ?1")?;

        let items = stmt
            .query_map(params![sql_limit(limit)], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Content of the entry with the given id
    pub async fn get_by_id(&self, id: i64) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let content = conn
            .query_row(
                "SELECT content FROM history WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(content)
    }

    /// Full entry, including its capture time
    pub async fn get_entry(&self, id: i64) -> Result<Option<HistoryEntry>> {
        let conn = self.conn.lock().await;
        let raw = conn
            .query_row(
                "SELECT id, content, created_at FROM history WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        match raw {
            Some((id, content, created_at)) => {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|_| HistoryError::InvalidTimestamp {
                        id,
                        value: created_at.clone(),
                    })?
                    .with_timezone(&Utc);

                Ok(Some(HistoryEntry {
                    id,
                    content,
                    created_at,
                }))
            }
            None => Ok(None),
        }
    }

    /// Entries whose content contains `term` (SQLite LIKE semantics, so ASCII
    /// letters match case-insensitively), most recent first
    pub async fn search(&self, term: &str, limit: usize) -> Result<Vec<HistoryItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, content FROM history
             WHERE content LIKE '%' || ?1 || '%'
             ORDER BY id DESC
             LIMIT ?2",
        )?;

        let items = stmt
            .query_map(params![term, sql_limit(limit)], row_to_item)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(items)
    }

    /// Number of stored entries
    pub async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Delete every entry and compact the file. Returns the number of rows
    /// removed; a failed VACUUM is logged and otherwise ignored since the
    /// rows are already gone.
    pub async fn clear(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        let deleted = conn.execute("DELETE FROM history", [])?;

        if let Err(e) = conn.execute_batch("VACUUM") {
            warn!("VACUUM after clear failed: {}", e);
        }

        Ok(deleted)
    }
}

/// SQLite takes a signed limit; anything past `i64::MAX` means "all rows"
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn row_to_item(row: &Row) -> rusqlite::Result<HistoryItem> {
    Ok(HistoryItem {
        id: row.get(0)?,
        content: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn setup_test_db() -> (HistoryDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = HistoryDatabase::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();
        (db, temp_dir)
    }

    #[tokio::test]
    async fn test_insert_and_retrieve() {
        let (db, _temp_dir) = setup_test_db().await;

        let id = db.insert("  hello\n", Utc::now()).await.unwrap();
        assert_eq!(db.get_by_id(id).await.unwrap().as_deref(), Some("  hello\n"));
        assert_eq!(db.last_content().await.unwrap().as_deref(), Some("  hello\n"));
    }

    #[tokio::test]
    async fn test_ids_increase() {
        let (db, _temp_dir) = setup_test_db().await;

        let first = db.insert("a", Utc::now()).await.unwrap();
        let second = db.insert("b", Utc::now()).await.unwrap();
        assert!(second > first);
    }

    #[tokio::test]
    async fn test_empty_content_rejected() {
        let (db, _temp_dir) = setup_test_db().await;

        let result = db.insert("", Utc::now()).await;
        assert!(matches!(result, Err(HistoryError::EmptyContent)));
        assert_eq!(db.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_last_content_empty_store() {
        let (db, _temp_dir) = setup_test_db().await;
        assert_eq!(db.last_content().await.unwrap(), None);
        assert_eq!(db.get_by_id(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_entry_keeps_timestamp() {
        let (db, _temp_dir) = setup_test_db().await;

        let at = DateTime::parse_from_rfc3339("2024-05-01T12:30:45.123456Z")
            .unwrap()
            .with_timezone(&Utc);
        let id = db.insert("stamped", at).await.unwrap();

        let entry = db.get_entry(id).await.unwrap().unwrap();
        assert_eq!(
            entry,
            HistoryEntry {
                id,
                content: "stamped".to_string(),
                created_at: at,
            }
        );
    }

    #[tokio::test]
    async fn test_search_matches_substring() {
        let (db, _temp_dir) = setup_test_db().await;

        db.insert("Hello world", Utc::now()).await.unwrap();
        db.insert("Goodbye", Utc::now()).await.unwrap();
        db.insert("WORLD peace", Utc::now()).await.unwrap();

        let results = db.search("world", 20).await.unwrap();
        let contents: Vec<_> = results.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["WORLD peace", "Hello world"]);
    }

    #[tokio::test]
    async fn test_unbounded_limit_returns_all_rows() {
        let (db, _temp_dir) = setup_test_db().await;

        for content in ["a", "b", "c"] {
            db.insert(content, Utc::now()).await.unwrap();
        }

        let all = db.list_recent(usize::MAX).await.unwrap();
        let contents: Vec<_> = all.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["c", "b", "a"]);
        assert_eq!(db.search("b", usize::MAX).await.unwrap().len(), 1);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }

    #[tokio::test]
    async fn test_clear_reports_count() {
        let (db, _temp_dir) = setup_test_db().await;

        assert_eq!(db.clear().await.unwrap(), 0);

        for i in 0..5 {
            db.insert(&format!("Entry {}", i), Utc::now()).await.unwrap();
        }
        assert_eq!(db.clear().await.unwrap(), 5);
        assert!(db.list_recent(10).await.unwrap().is_empty());
        assert_eq!(db.last_content().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_clear() {
        let (db, _temp_dir) = setup_test_db().await;

        let before = db.insert("first life", Utc::now()).await.unwrap();
        db.clear().await.unwrap();
        let after = db.insert("second life", Utc::now()).await.unwrap();
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_wal_mode_enabled() {
        let (db, _temp_dir) = setup_test_db().await;

        let conn = db.conn.lock().await;
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_busy_error_classification() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(HistoryError::from(err).is_busy());

        let err = rusqlite::Error::QueryReturnedNoRows;
        assert!(!HistoryError::from(err).is_busy());
    }
}
