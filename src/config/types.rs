use serde::Deserialize;
use std::time::Duration;

/// Default pattern for `<img src="...">` references, capturing the src value
pub const DEFAULT_IMAGE_REFERENCE_PATTERN: &str =
    r#"(?i)<img\b[^>]*?\ssrc\s*=\s*["']([^"']+)["']"#;

/// Default pattern for the scheme + host[:port] part of an absolute URL
pub const DEFAULT_URL_ORIGIN_PATTERN: &str = r"^[a-zA-Z][a-zA-Z0-9+.\-]*://[^/?#]+";

/// Main configuration structure for Sumi-Scrape
///
/// Every section may be omitted from the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub patterns: PatternConfig,
    pub http: HttpConfig,
    pub cache: CacheConfig,
    pub probe: ProbeConfig,
    pub download: DownloadConfig,
    pub pipeline: PipelineConfig,
}

/// How image references are recognised in markup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Regex over the raw markup text
    #[default]
    Pattern,
    /// CSS selector over the parsed HTML document
    Selector,
}

/// Reference extraction and URL origin patterns
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Regex whose first capture group is an image reference
    #[serde(rename = "image-reference")]
    pub image_reference: String,

    /// Regex matching the origin (scheme + host) of an absolute URL
    #[serde(rename = "url-origin")]
    pub url_origin: String,

    pub extraction: ExtractionMode,

    /// CSS selector used in selector mode
    pub selector: String,

    /// Attribute read from matched elements in selector mode
    #[serde(rename = "selector-attribute")]
    pub selector_attribute: String,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            image_reference: DEFAULT_IMAGE_REFERENCE_PATTERN.to_string(),
            url_origin: DEFAULT_URL_ORIGIN_PATTERN.to_string(),
            extraction: ExtractionMode::Pattern,
            selector: "img[src]".to_string(),
            selector_attribute: "src".to_string(),
        }
    }
}

/// HTTP client identification and timeouts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(rename = "client-name")]
    pub client_name: String,

    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the client, added to the user agent
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,

    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs")]
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            client_name: "SumiScrape".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

/// Which cache store backs the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Cache store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,

    /// Path to the SQLite cache database (sqlite backend only)
    pub path: String,

    /// Maximum number of cached bodies (memory backend only)
    #[serde(rename = "max-entries")]
    pub max_entries: u64,

    /// Lifetime of cached page markup in seconds, 0 for no expiry
    #[serde(rename = "page-lifetime-secs")]
    pub page_lifetime_secs: u64,
}

impl CacheConfig {
    /// Expiry applied to cached page markup
    pub fn page_lifetime(&self) -> Option<Duration> {
        (self.page_lifetime_secs > 0).then(|| Duration::from_secs(self.page_lifetime_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            path: "./sumi-scrape-cache.db".to_string(),
            max_entries: 10_000,
            page_lifetime_secs: 3600,
        }
    }
}

/// Dimension probing limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Maximum number of probes in flight
    pub concurrency: usize,

    /// Upper bound on bytes read from a single image while probing
    #[serde(rename = "max-probe-bytes")]
    pub max_probe_bytes: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            max_probe_bytes: 512 * 1024,
        }
    }
}

/// Image body download limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Maximum number of downloads and decodes in flight
    pub concurrency: usize,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

/// Whole-pipeline settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Deadline for a whole scrape in seconds, 0 for none
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl PipelineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}
