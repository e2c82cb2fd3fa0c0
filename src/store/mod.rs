//! SQLite persistence shared by the listing cache and the snapshot history.
//!
//! The store only provides continuity across restarts; live reads are served from memory.
//! Every write runs in its own transaction, so a crash mid-write leaves no partial row behind.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::error::{AppError, Context, Result};

mod cache_entries;
mod schema;
mod snapshots;

pub use cache_entries::CacheRow;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub database_file: Option<String>,
    pub database_size_bytes: u64,
    pub cache_entries: u64,
    pub price_snapshots: u64,
    pub oldest_cache_expiry: Option<DateTime<Utc>>,
    pub oldest_snapshot: Option<DateTime<Utc>>,
    pub newest_snapshot: Option<DateTime<Utc>>,
}

pub struct Store {
    path: Option<PathBuf>,
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {}", path.display()))?;
        let store = Self::from_connection(conn, Some(path.to_path_buf()))?;
        info!("SQLite store initialised at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(schema::SCHEMA)
            .context("Failed to create database schema")?;
        Ok(Self {
            path,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| {
            warn!("Store connection mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Run `op` against the open connection.
    fn with_conn<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut guard = self.lock();
        let conn = guard
            .as_mut()
            .ok_or_else(|| AppError::message("database connection is closed"))?;
        Ok(op(conn)?)
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let (cache_entries, price_snapshots, oldest_cache, oldest, newest) =
            self.with_conn(|conn| {
                let cache_entries: i64 =
                    conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
                let price_snapshots: i64 =
                    conn.query_row("SELECT COUNT(*) FROM price_snapshots", [], |row| row.get(0))?;
                let oldest_cache: Option<i64> =
                    conn.query_row("SELECT MIN(expires_at) FROM cache_entries", [], |row| {
                        row.get(0)
                    })?;
                let (oldest, newest): (Option<i64>, Option<i64>) = conn.query_row(
                    "SELECT MIN(timestamp), MAX(timestamp) FROM price_snapshots",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                Ok((cache_entries, price_snapshots, oldest_cache, oldest, newest))
            })?;

        let database_size_bytes = self
            .path
            .as_ref()
            .and_then(|path| std::fs::metadata(path).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        Ok(DatabaseStats {
            database_file: self.path.as_ref().map(|path| path.display().to_string()),
            database_size_bytes,
            cache_entries: cache_entries.max(0) as u64,
            price_snapshots: price_snapshots.max(0) as u64,
            oldest_cache_expiry: oldest_cache.and_then(from_millis),
            oldest_snapshot: oldest.and_then(from_millis),
            newest_snapshot: newest.and_then(from_millis),
        })
    }

    /// Close the connection; later operations fail instead of reopening.
    pub fn close(&self) -> Result<()> {
        if let Some(conn) = self.lock().take() {
            conn.close().map_err(|(_, err)| AppError::from(err))?;
            info!("Database connection closed");
        }
        Ok(())
    }
}

pub(crate) fn to_millis(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_on_empty_store() {
        let store = Store::open_in_memory().expect("store opens");

        let stats = store.stats().expect("stats");

        assert_eq!(stats.cache_entries, 0);
        assert_eq!(stats.price_snapshots, 0);
        assert!(stats.oldest_snapshot.is_none());
        assert!(stats.database_file.is_none());
    }

    #[test]
    fn closed_store_rejects_operations() {
        let store = Store::open_in_memory().expect("store opens");

        store.close().expect("close");
        store.close().expect("second close is a no-op");

        let err = store.stats().expect_err("stats after close");
        assert!(err.to_string().contains("closed"), "unexpected: {err}");
    }

    #[test]
    fn creates_database_file_on_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("cache.db");

        let store = Store::open(&path).expect("store opens");

        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(store.stats().expect("stats").database_size_bytes > 0);
    }
}
