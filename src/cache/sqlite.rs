//! SQLite cache backend
//!
//! Bodies survive process restarts. The connection sits behind a mutex that
//! is only taken inside `spawn_blocking`, so no async task ever waits on it.

use crate::cache::schema::initialize_schema;
use crate::cache::traits::{CacheError, CacheResult, CacheStore};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Persistent cache of response bodies
#[derive(Clone)]
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Opens or creates a cache database at `path`
    ///
    /// Expired entries left over from earlier runs are purged on open.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        initialize_schema(&conn)?;

        let purged = purge_expired(&conn)?;
        if purged > 0 {
            tracing::debug!("Purged {} expired cache entries", purged);
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates a cache backed by an in-memory database
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Deletes every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> CacheResult<usize> {
        self.with_conn(|conn| Ok(purge_expired(conn)?)).await
    }

    /// Runs `f` against the connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> CacheResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CacheError::Worker("cache connection mutex poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| CacheError::Worker(e.to_string()))?
    }
}

impl std::fmt::Debug for SqliteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteCache").finish_non_exhaustive()
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_millis(expires_after: Option<Duration>) -> Option<i64> {
    expires_after.map(|ttl| {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_add(ttl_ms)
    })
}

fn purge_expired(conn: &Connection) -> Result<usize, rusqlite::Error> {
    conn.execute(
        "DELETE FROM cache_entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
        params![now_millis()],
    )
}

#[async_trait]
impl CacheStore for SqliteCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Arc<[u8]>>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let row: Option<(Vec<u8>, Option<i64>)> = conn
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((_, Some(expires_at))) if expires_at <= now_millis() => {
                    conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(Arc::from(value))),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        value: Arc<[u8]>,
        expires_after: Option<Duration>,
    ) -> CacheResult<()> {
        let key = key.to_string();
        let expires_at = expiry_millis(expires_after);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries (key, value, stored_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    stored_at = excluded.stored_at,
                    expires_at = excluded.expires_at",
                params![key, &value[..], Utc::now().to_rfc3339(), expires_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear(&self) -> CacheResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM cache_entries", [])?;
            Ok(())
        })
        .await
    }
}
