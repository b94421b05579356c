//! # SQLite Cache Store
//!
//! Durable [`CacheStore`] for deployments where the summary cache should
//! survive a restart. Entries are MessagePack blobs keyed by cache key, with
//! an absolute expiry. Reads skip expired rows; [`SqliteCacheStore::purge_expired`]
//! deletes them. Freshness itself is still decided by
//! [`TtlCache`](crate::TtlCache) from the entry timestamp.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};

use crate::cache::{CacheEntry, CacheStore};
use crate::error::{Result, TrailError};

/// SQLite-backed cache store.
pub struct SqliteCacheStore {
    db: Mutex<Connection>,
}

impl SqliteCacheStore {
    /// Open (or create) a store at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::init_schema(&conn)?;
        info!("[SqliteCacheStore] Opened {}", db_path);
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create a store backed by an in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                entry BLOB NOT NULL,
                expires_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expiry ON cache_entries(expires_at_ms);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| TrailError::cache("sqlite connection lock poisoned"))
    }

    /// Delete entries whose expiry is at or before `now_ms`. Returns the
    /// number of rows removed.
    pub fn purge_expired(&self, now_ms: i64) -> Result<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM cache_entries WHERE expires_at_ms <= ?",
            params![now_ms],
        )?;
        if removed > 0 {
            debug!("[SqliteCacheStore] Purged {} expired entries", removed);
        }
        Ok(removed)
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> Result<usize> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        self.conn()?.execute_batch("DELETE FROM cache_entries;")?;
        Ok(())
    }
}

impl CacheStore for SqliteCacheStore {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheEntry>> {
        let blob: Option<Vec<u8>> = self
            .conn()?
            .query_row(
                "SELECT entry FROM cache_entries WHERE key = ? AND expires_at_ms > ?",
                params![key, now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;

        blob.map(|bytes| {
            rmp_serde::from_slice(&bytes).map_err(|e| TrailError::Serialization {
                message: e.to_string(),
            })
        })
        .transpose()
    }

    fn put(&self, key: &str, entry: CacheEntry, expiration: Duration) -> Result<()> {
        let blob = rmp_serde::to_vec(&entry).map_err(|e| TrailError::Serialization {
            message: e.to_string(),
        })?;
        let expires_at_ms = entry
            .timestamp_ms
            .saturating_add(i64::try_from(expiration.as_millis()).unwrap_or(i64::MAX));

        self.conn()?.execute(
            "INSERT OR REPLACE INTO cache_entries (key, entry, expires_at_ms) VALUES (?, ?, ?)",
            params![key, blob, expires_at_ms],
        )?;
        Ok(())
    }
}
