//! In-process cache backend using moka
//!
//! Entries carry their own lifetime, so a page cached for an hour and an
//! image cached forever can live in the same store.

use crate::cache::traits::{CacheResult, CacheStore};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CachedBody {
    body: Arc<[u8]>,
    ttl: Option<Duration>,
}

/// Applies the per-entry lifetime given at insertion time
struct BodyExpiry;

impl Expiry<String, CachedBody> for BodyExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedBody,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedBody,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Bounded in-memory cache of response bodies
#[derive(Clone)]
pub struct MemoryCache {
    inner: Cache<String, CachedBody>,
}

impl MemoryCache {
    /// Creates a cache holding at most `max_entries` bodies
    pub fn new(max_entries: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(BodyExpiry)
                .build(),
        }
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Arc<[u8]>>> {
        Ok(self.inner.get(key).await.map(|cached| cached.body))
    }

    async fn set(
        &self,
        key: &str,
        value: Arc<[u8]>,
        expires_after: Option<Duration>,
    ) -> CacheResult<()> {
        self.inner
            .insert(
                key.to_string(),
                CachedBody {
                    body: value,
                    ttl: expires_after,
                },
            )
            .await;
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }
}
