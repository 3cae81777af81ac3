//! Sumi-Scrape: image harvesting for web pages
//!
//! This crate discovers the images a web page references, resolves them to
//! absolute URLs, probes their pixel dimensions, drops the ones below a size
//! threshold and downloads and decodes the rest.

pub mod cache;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod probe;
pub mod pipeline;
pub mod url;

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Main error type returned by the scrape entry points
///
/// Only failures that abort a whole scrape end up here. Per-URL failures
/// (resolution, probing, fetching, decoding) are counted in
/// [`pipeline::ScrapeStats`] and the URL is dropped from the result.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to acquire page markup: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("Scrape cancelled")]
    Cancelled,

    #[error("Scrape timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Cache error: {0}")]
    Cache(#[from] cache::CacheError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Invalid request header {name}: {message}")]
    InvalidHeader { name: String, message: String },
}

impl ScrapeError {
    /// Returns true if the scrape stopped because of cancellation or timeout
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::TimedOut(_))
    }
}

/// Errors raised while obtaining the markup to scan
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Neither markup nor a page URL was provided")]
    MissingSource,

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A network failure for a single URL
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        source: Arc<reqwest::Error>,
    },

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },
}

impl FetchError {
    pub(crate) fn http(url: &str, source: reqwest::Error) -> Self {
        Self::Http {
            url: url.to_string(),
            source: Arc::new(source),
        }
    }

    /// The URL the failed request was made for
    pub fn url(&self) -> &str {
        match self {
            Self::Http { url, .. } | Self::Status { url, .. } => url,
        }
    }
}

/// Downloaded content that could not be turned into an image
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode image from {url}: {source}")]
    Image {
        url: String,
        source: image::ImageError,
    },

    #[error("Decode worker for {url} failed: {message}")]
    Worker { url: String, message: String },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// A reference that cannot be turned into an absolute URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("Empty image reference")]
    Empty,

    #[error("No origin can be extracted from base URL '{base}' to resolve '{reference}'")]
    MissingOrigin { base: String, reference: String },

    #[error("Cannot resolve '{reference}' against '{base}': {message}")]
    Malformed {
        base: String,
        reference: String,
        message: String,
    },
}

/// Result type alias for scrape operations
pub type Result<T> = std::result::Result<T, ScrapeError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL resolution
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

// Re-export commonly used types
pub use config::ScraperConfig;
pub use probe::{DimensionProber, ProbeResult};
pub use pipeline::{DecodedImage, ImageScraper, ScrapeRequest, ScrapeStats};
pub use url::UrlResolver;
