//! HTTP fetching module
//!
//! This module handles all body retrieval for the scraper, including:
//! - Building HTTP clients with proper user agent strings
//! - Deriving cache keys from URLs
//! - Cache-or-fetch retrieval of single URLs and batches

mod caching;
mod client;

pub use caching::CachingFetcher;
pub use client::{build_http_client, user_agent};

use sha2::{Digest, Sha256};

/// Prefix shared by every cache key this crate writes
const CACHE_KEY_PREFIX: &str = "sumi_scrape.";

/// Derives the cache key for a URL
///
/// The key is the prefix followed by the hex SHA-256 of the exact URL
/// string, so it is stable across runs and fits any backend's key rules.
///
/// # Example
///
/// ```
/// use sumi_scrape::fetch::cache_key;
///
/// let key = cache_key("https://example.com/a.png");
/// assert!(key.starts_with("sumi_scrape."));
/// assert_eq!(key, cache_key("https://example.com/a.png"));
/// ```
pub fn cache_key(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}{}", CACHE_KEY_PREFIX, hex::encode(digest))
}
