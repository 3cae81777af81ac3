//! Cache-or-fetch retrieval of response bodies
//!
//! Every lookup in a batch is answered from the cache before the first
//! network request goes out, so cached URLs never wait behind slow misses.

use crate::cache::CacheStore;
use crate::fetch::cache_key;
use crate::FetchError;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Default number of concurrent network fetches in a batch
const DEFAULT_CONCURRENCY: usize = 4;

/// Fetches URL bodies through a shared cache store
#[derive(Clone)]
pub struct CachingFetcher {
    client: Client,
    cache: Arc<dyn CacheStore>,
    concurrency: usize,
}

impl CachingFetcher {
    /// Creates a fetcher over `client` and `cache`
    pub fn new(client: Client, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            client,
            cache,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Sets the maximum number of network fetches in flight during a batch
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Returns the cache store shared by this fetcher
    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Returns the cached body for `url` without touching the network
    pub async fn cached(&self, url: &str) -> Option<Arc<[u8]>> {
        self.lookup(url, &cache_key(url)).await
    }

    /// Fetches a single URL, consulting the cache first
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to fetch
    /// * `headers` - Extra request headers
    /// * `expires_after` - Lifetime of the cached body; `None` never expires
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<[u8]>)` - The cached or freshly fetched body
    /// * `Err(FetchError)` - The network request failed
    pub async fn fetch(
        &self,
        url: &str,
        headers: &HeaderMap,
        expires_after: Option<Duration>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let key = cache_key(url);
        if let Some(body) = self.lookup(url, &key).await {
            return Ok(body);
        }
        self.fetch_and_store(url, &key, headers, expires_after)
            .await
    }

    /// Fetches a batch of URLs, isolating failures per URL
    ///
    /// # Batch Flow
    ///
    /// 1. Look every URL up in the cache
    /// 2. Fetch each distinct missing URL once, concurrently
    /// 3. Store fetched bodies and return results in input order
    ///
    /// # Returns
    ///
    /// One result per input URL, in the same order.
    pub async fn fetch_batch(
        &self,
        urls: &[String],
        headers: &HeaderMap,
        expires_after: Option<Duration>,
    ) -> Vec<Result<Arc<[u8]>, FetchError>> {
        let mut slots: Vec<Option<Result<Arc<[u8]>, FetchError>>> =
            (0..urls.len()).map(|_| None).collect();

        // Phase 1: cache lookups
        let mut misses: IndexMap<&str, (String, Vec<usize>)> = IndexMap::new();
        for (index, url) in urls.iter().enumerate() {
            let key = cache_key(url);
            match self.lookup(url, &key).await {
                Some(body) => slots[index] = Some(Ok(body)),
                None => misses
                    .entry(url.as_str())
                    .or_insert_with(|| (key, Vec::new()))
                    .1
                    .push(index),
            }
        }

        tracing::debug!(
            "Batch of {} URLs: {} cached, {} to fetch",
            urls.len(),
            urls.len() - misses.values().map(|(_, i)| i.len()).sum::<usize>(),
            misses.len()
        );

        // Phase 2: network fetches for distinct misses
        let fetched: Vec<(Vec<usize>, Result<Arc<[u8]>, FetchError>)> = stream::iter(misses)
            .map(|(url, (key, indices))| async move {
                let result = self
                    .fetch_and_store(url, &key, headers, expires_after)
                    .await;
                (indices, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for (indices, result) in fetched {
            for index in indices {
                slots[index] = Some(result.clone());
            }
        }

        // Every slot is filled by exactly one of the two phases
        slots.into_iter().flatten().collect()
    }

    async fn lookup(&self, url: &str, key: &str) -> Option<Arc<[u8]>> {
        match self.cache.get(key).await {
            Ok(Some(body)) => {
                tracing::trace!("Cache hit for {}", url);
                Some(body)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Cache read failed for {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch_and_store(
        &self,
        url: &str,
        key: &str,
        headers: &HeaderMap,
        expires_after: Option<Duration>,
    ) -> Result<Arc<[u8]>, FetchError> {
        let body = fetch_remote(&self.client, url, headers).await?;

        if let Err(e) = self.cache.set(key, Arc::clone(&body), expires_after).await {
            tracing::warn!("Cache write failed for {}: {}", url, e);
        }

        Ok(body)
    }
}

impl std::fmt::Debug for CachingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingFetcher")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

/// Issues a GET request and reads the whole body
async fn fetch_remote(
    client: &Client,
    url: &str,
    headers: &HeaderMap,
) -> Result<Arc<[u8]>, FetchError> {
    tracing::debug!("Fetching {}", url);

    let response = client
        .get(url)
        .headers(headers.clone())
        .send()
        .await
        .map_err(|e| FetchError::http(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| FetchError::http(url, e))?;

    Ok(Arc::from(&body[..]))
}
