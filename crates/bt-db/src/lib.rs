//! Storage layer for the browser usage timer.
//!
//! Provides a key/value blob store for session snapshots using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared
//! across threads without external synchronization. The host keeps it inside
//! the single task that owns the session controller.
//!
//! # Schema
//!
//! A single `blobs` table maps a TEXT key to an opaque TEXT value (JSON
//! snapshots, or the name of the active session). `updated_at` records the
//! last write in ISO 8601 UTC (e.g., `2024-01-15T10:30:00Z`), which keeps
//! lexicographic and chronological order aligned.

use std::path::Path;
use std::time::Duration;

use bt_core::{BlobStore, StoreError};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

/// How long a writer waits for a lock held by another process (e.g. `bt report`
/// reading while the host checkpoints).
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::new(err)
    }
}

/// A stored key with its last write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: String,
    pub updated_at: String,
    pub size: usize,
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let db = Self { conn };
        db.init()?;
        tracing::debug!(path = %path.display(), "opened database");
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Returns the value stored under `key`.
    pub fn get_blob(&self, key: &str) -> Result<Option<String>, DbError> {
        let value = self
            .conn
            .query_row("SELECT value FROM blobs WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Inserts or replaces the value under `key`.
    pub fn put_blob(&self, key: &str, value: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO blobs (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
            params![key, value, now_timestamp()],
        )?;
        Ok(())
    }

    /// Deletes `key`. Returns whether a row was removed.
    pub fn delete_blob(&self, key: &str) -> Result<bool, DbError> {
        let removed = self
            .conn
            .execute("DELETE FROM blobs WHERE key = ?1", params![key])?;
        Ok(removed > 0)
    }

    /// Lists all keys in lexicographic order.
    pub fn list_blob_keys(&self) -> Result<Vec<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT key FROM blobs ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        let keys = rows.collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Returns write metadata for `key`, if stored.
    pub fn blob_info(&self, key: &str) -> Result<Option<BlobInfo>, DbError> {
        let info = self
            .conn
            .query_row(
                "SELECT key, updated_at, length(value) FROM blobs WHERE key = ?1",
                params![key],
                |row| {
                    Ok(BlobInfo {
                        key: row.get(0)?,
                        updated_at: row.get(1)?,
                        size: usize::try_from(row.get::<_, i64>(2)?).unwrap_or(0),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }
}

impl BlobStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_blob(key)?)
    }

    fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError> {
        Ok(self.put_blob(key, blob)?)
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        Ok(self.delete_blob(key)?)
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.list_blob_keys()?)
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use bt_core::{ManualClock, SessionController, StartOutcome};

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");
        let mut stmt = db
            .conn
            .prepare("PRAGMA table_info(blobs)")
            .expect("prepare table_info");
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info")
            .map(|row| row.expect("table_info row"))
            .collect();
        assert_eq!(columns, vec!["key", "value", "updated_at"]);
    }

    #[test]
    fn init_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.put_blob("k", "v").unwrap();
        db.init().unwrap();
        assert_eq!(db.get_blob("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn put_replaces_existing_value() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.get_blob("session:work").unwrap(), None);

        db.put_blob("session:work", "{}").unwrap();
        db.put_blob("session:work", r#"{"a":1}"#).unwrap();
        assert_eq!(
            db.get_blob("session:work").unwrap().as_deref(),
            Some(r#"{"a":1}"#)
        );

        let count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM blobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn delete_reports_presence() {
        let db = Database::open_in_memory().unwrap();
        db.put_blob("k", "v").unwrap();
        assert!(db.delete_blob("k").unwrap());
        assert!(!db.delete_blob("k").unwrap());
        assert_eq!(db.get_blob("k").unwrap(), None);
    }

    #[test]
    fn keys_are_listed_in_order() {
        let db = Database::open_in_memory().unwrap();
        for key in ["session:b", "active_session", "session:a"] {
            db.put_blob(key, "x").unwrap();
        }
        assert_eq!(
            db.list_blob_keys().unwrap(),
            vec!["active_session", "session:a", "session:b"]
        );
    }

    #[test]
    fn blob_info_reports_size_and_timestamp() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.blob_info("k").unwrap(), None);
        db.put_blob("k", "hello").unwrap();

        let info = db.blob_info("k").unwrap().unwrap();
        assert_eq!(info.key, "k");
        assert_eq!(info.size, 5);
        assert!(info.updated_at.ends_with('Z'));
    }

    #[test]
    fn data_survives_reopen() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bt.db");
        {
            let db = Database::open(&path).unwrap();
            db.put_blob("session:work", "{}").unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_blob("session:work").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn controller_round_trips_through_sqlite() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("bt.db");
        let clock = ManualClock::new(0);

        let mut ctl = SessionController::new(Database::open(&path).unwrap(), Arc::new(clock.clone()));
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://news.site/today", 1).unwrap();
        clock.advance(42_000);
        ctl.stop().unwrap();
        drop(ctl);

        let mut ctl = SessionController::new(Database::open(&path).unwrap(), Arc::new(clock));
        assert_eq!(ctl.list_sessions().unwrap(), vec!["work"]);
        assert_eq!(ctl.start("work", true).unwrap(), StartOutcome::Restored);
        let report = ctl.report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].path, "news.site/today");
        assert_eq!(report[0].aggregate_time, 42_000);
    }
}
