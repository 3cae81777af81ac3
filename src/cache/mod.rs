//! Cache module for response bodies
//!
//! This module provides the cache store the fetcher reads through:
//! - the [`CacheStore`] trait the rest of the crate depends on
//! - an in-process backend built on moka
//! - a persistent SQLite backend
//!
//! Backends are shared as `Arc<dyn CacheStore>` across scrapes.

mod memory;
mod schema;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheError, CacheResult, CacheStore};

use crate::config::{CacheBackend, CacheConfig};
use std::path::Path;
use std::sync::Arc;

/// Opens the cache backend selected by the configuration
///
/// # Arguments
///
/// * `config` - The cache section of the configuration
///
/// # Returns
///
/// * `Ok(Arc<dyn CacheStore>)` - The opened backend
/// * `Err(CacheError)` - The SQLite database could not be opened
pub fn open_cache(config: &CacheConfig) -> CacheResult<Arc<dyn CacheStore>> {
    match config.backend {
        CacheBackend::Memory => {
            tracing::debug!("Using in-memory cache ({} entries)", config.max_entries);
            Ok(Arc::new(MemoryCache::new(config.max_entries)))
        }
        CacheBackend::Sqlite => {
            tracing::debug!("Using SQLite cache at {}", config.path);
            Ok(Arc::new(SqliteCache::open(Path::new(&config.path))?))
        }
    }
}
