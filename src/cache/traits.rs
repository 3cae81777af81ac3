//! Cache store trait and error types
//!
//! This module defines the interface the fetcher uses to read and write
//! cached response bodies. Key derivation belongs to the caller; storage and
//! expiry enforcement belong to the implementation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur inside a cache backend
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache worker failed: {0}")]
    Worker(String),
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// A shared store of response bodies keyed by string
///
/// Implementations must tolerate concurrent `get`/`set` calls from many
/// in-flight scrapes and must not hold a lock across an `.await`.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the cached body for `key`, or `None` on a miss or an expired entry
    async fn get(&self, key: &str) -> CacheResult<Option<Arc<[u8]>>>;

    /// Stores `value` under `key`
    ///
    /// # Arguments
    ///
    /// * `key` - The cache key
    /// * `value` - The body to store
    /// * `expires_after` - Lifetime of the entry; `None` keeps it until evicted
    async fn set(
        &self,
        key: &str,
        value: Arc<[u8]>,
        expires_after: Option<Duration>,
    ) -> CacheResult<()>;

    /// Removes every entry
    async fn clear(&self) -> CacheResult<()>;
}
