use crate::cache::{open_cache, CacheStore};
use crate::config::ScraperConfig;
use crate::extract::ReferenceExtractor;
use crate::fetch::{build_http_client, CachingFetcher};
use crate::pipeline::{ScrapeRequest, ScrapeStats};
use crate::probe::{read_dimensions, DimensionProber, ProbeResult};
use crate::url::UrlResolver;
use crate::{AcquisitionError, ConfigError, DecodeError, FetchError, Result, ScrapeError};
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use indexmap::IndexSet;
use reqwest::header::HeaderMap;
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A downloaded image together with the URL it came from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub url: String,
    pub image: DynamicImage,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Outcome of downloading one accepted URL
enum Download {
    Image(DecodedImage),
    FetchFailed(FetchError),
    DecodeFailed(DecodeError),
}

/// Runs the resolve, probe, filter and download stages for scrape requests
///
/// One scraper can serve any number of requests, concurrently or in
/// sequence. Everything it holds is shared read-only between them; the cache
/// store is the only mutable state, and it synchronizes itself.
#[derive(Debug, Clone)]
pub struct ImageScraper {
    fetcher: CachingFetcher,
    prober: DimensionProber,
    extractor: ReferenceExtractor,
    resolver: UrlResolver,
    page_lifetime: Option<Duration>,
    download_concurrency: usize,
    timeout: Option<Duration>,
}

impl ImageScraper {
    /// Creates a scraper from a configuration, an HTTP client and a cache
    ///
    /// # Arguments
    ///
    /// * `config` - The scraper configuration
    /// * `client` - Client used for page, probe and image requests
    /// * `cache` - Store shared by every request made through this scraper
    ///
    /// # Returns
    ///
    /// * `Ok(ImageScraper)` - Ready to serve requests
    /// * `Err(ConfigError)` - A pattern or selector failed to compile
    pub fn new(
        config: &ScraperConfig,
        client: Client,
        cache: Arc<dyn CacheStore>,
    ) -> std::result::Result<Self, ConfigError> {
        let extractor = ReferenceExtractor::from_config(&config.patterns)?;
        let resolver = UrlResolver::from_config(&config.patterns)?;
        let download_concurrency = config.download.concurrency.max(1);

        Ok(Self {
            fetcher: CachingFetcher::new(client.clone(), cache)
                .with_concurrency(download_concurrency),
            prober: DimensionProber::from_config(client, &config.probe),
            extractor,
            resolver,
            page_lifetime: config.cache.page_lifetime(),
            download_concurrency,
            timeout: config.pipeline.timeout(),
        })
    }

    /// Creates a scraper whose client and cache are built from `config`
    pub fn from_config(config: &ScraperConfig) -> Result<Self> {
        let client = build_http_client(&config.http)?;
        let cache = open_cache(&config.cache)?;
        Ok(Self::new(config, client, cache)?)
    }

    /// Returns the fetcher, and through it the cache store
    pub fn fetcher(&self) -> &CachingFetcher {
        &self.fetcher
    }

    /// Downloads every image of the request that meets its size thresholds
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<DecodedImage>)` - Images in first-appearance order of their URLs
    /// * `Err(ScrapeError)` - The markup could not be acquired or the scrape timed out
    pub async fn get(&self, request: &ScrapeRequest) -> Result<Vec<DecodedImage>> {
        self.get_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`ImageScraper::get`], stopping early once `token` is cancelled
    ///
    /// In-flight requests are abandoned and no partial result is returned.
    pub async fn get_with_cancel(
        &self,
        request: &ScrapeRequest,
        token: &CancellationToken,
    ) -> Result<Vec<DecodedImage>> {
        let (images, _) = self.get_with_stats(request, token).await?;
        Ok(images)
    }

    /// Like [`ImageScraper::get_with_cancel`], also returning the scrape's counters
    pub async fn get_with_stats(
        &self,
        request: &ScrapeRequest,
        token: &CancellationToken,
    ) -> Result<(Vec<DecodedImage>, ScrapeStats)> {
        self.guard(token, async {
            let mut stats = ScrapeStats::default();
            let urls = self.accepted_urls(request, &mut stats).await?;
            let images = self
                .download_images(&urls, request.headers(), &mut stats)
                .await;
            stats.log_summary();
            Ok((images, stats))
        })
        .await
    }

    /// Returns the URLs of the images that meet the request's size thresholds
    ///
    /// Nothing beyond the probe prefix of each image is downloaded.
    pub async fn get_urls(&self, request: &ScrapeRequest) -> Result<Vec<String>> {
        self.get_urls_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`ImageScraper::get_urls`], stopping early once `token` is cancelled
    pub async fn get_urls_with_cancel(
        &self,
        request: &ScrapeRequest,
        token: &CancellationToken,
    ) -> Result<Vec<String>> {
        self.guard(token, async {
            let mut stats = ScrapeStats::default();
            let urls = self.accepted_urls(request, &mut stats).await?;
            stats.log_summary();
            Ok(urls)
        })
        .await
    }

    /// Races `work` against cancellation and the configured timeout
    async fn guard<T, F>(&self, token: &CancellationToken, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cancellable = async {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::info!("Scrape cancelled");
                    Err(ScrapeError::Cancelled)
                }
                result = work => result,
            }
        };

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cancellable)
                .await
                .unwrap_or_else(|_| {
                    tracing::warn!("Scrape timed out after {:?}", limit);
                    Err(ScrapeError::TimedOut(limit))
                }),
            None => cancellable.await,
        }
    }

    /// Acquire, extract, resolve, dedupe, probe and filter
    async fn accepted_urls(
        &self,
        request: &ScrapeRequest,
        stats: &mut ScrapeStats,
    ) -> Result<Vec<String>> {
        let markup = self.acquire_markup(request).await?;

        let references = self.extractor.extract(&markup);
        stats.references_found = references.len();

        let urls = self.resolve_references(request.url().unwrap_or(""), &references, stats);
        stats.unique_urls = urls.len();
        tracing::debug!(
            "Found {} image references, {} unique URLs",
            stats.references_found,
            stats.unique_urls
        );

        if urls.is_empty() {
            return Ok(urls);
        }

        let (mut probes, uncached) = self.measure_cached(&urls).await;
        probes.extend(self.prober.probe_batch(&uncached, request.headers()).await);
        stats.probe_failures = probes.values().filter(|p| p.probe_failed).count();

        let accepted = retain_large_enough(
            &urls,
            &probes,
            request.min_width(),
            request.min_height(),
        );
        stats.accepted_urls = accepted.len();
        stats.below_threshold = stats
            .unique_urls
            .saturating_sub(stats.accepted_urls + stats.probe_failures);

        Ok(accepted)
    }

    /// Reads dimensions from bodies already in the cache
    ///
    /// # Returns
    ///
    /// The results for cached images, and the URLs that still need a probe.
    async fn measure_cached(
        &self,
        urls: &[String],
    ) -> (HashMap<String, ProbeResult>, Vec<String>) {
        let mut measured = HashMap::new();
        let mut uncached = Vec::new();

        for url in urls {
            match self.fetcher.cached(url).await.as_deref().and_then(read_dimensions) {
                Some(dimensions) => {
                    measured.insert(url.clone(), ProbeResult::measured(url.as_str(), dimensions));
                }
                None => uncached.push(url.clone()),
            }
        }

        if !measured.is_empty() {
            tracing::debug!("Measured {} images from the cache", measured.len());
        }
        (measured, uncached)
    }

    /// Returns the markup to scan, fetching the page if none was given
    async fn acquire_markup(
        &self,
        request: &ScrapeRequest,
    ) -> std::result::Result<String, AcquisitionError> {
        if let Some(markup) = request.markup() {
            return Ok(markup.to_string());
        }

        let url = request.url().ok_or(AcquisitionError::MissingSource)?;
        tracing::info!("Scraping images from {}", url);

        let body = self
            .fetcher
            .fetch(url, request.headers(), self.page_lifetime)
            .await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Resolves every reference against `base_url`, dropping the ones that fail
    fn resolve_references(
        &self,
        base_url: &str,
        references: &[String],
        stats: &mut ScrapeStats,
    ) -> Vec<String> {
        let resolved = references
            .iter()
            .filter_map(|reference| match self.resolver.resolve(base_url, reference) {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::debug!("Skipping reference: {}", e);
                    stats.invalid_references += 1;
                    None
                }
            })
            .collect::<Vec<_>>();

        dedupe_urls(resolved)
    }

    /// Downloads and decodes `urls`, keeping their order
    async fn download_images(
        &self,
        urls: &[String],
        headers: &HeaderMap,
        stats: &mut ScrapeStats,
    ) -> Vec<DecodedImage> {
        if urls.is_empty() {
            return Vec::new();
        }

        let bodies = self.fetcher.fetch_batch(urls, headers, None).await;

        let downloads: Vec<Download> = stream::iter(urls.iter().cloned().zip(bodies))
            .map(|(url, body)| async move {
                match body {
                    Ok(body) => match decode_image(url, body).await {
                        Ok(image) => Download::Image(image),
                        Err(e) => Download::DecodeFailed(e),
                    },
                    Err(e) => Download::FetchFailed(e),
                }
            })
            .buffered(self.download_concurrency)
            .collect()
            .await;

        let mut images = Vec::with_capacity(downloads.len());
        for download in downloads {
            match download {
                Download::Image(image) => images.push(image),
                Download::FetchFailed(e) => {
                    tracing::warn!("{}", e);
                    stats.fetch_failures += 1;
                }
                Download::DecodeFailed(e) => {
                    tracing::warn!("{}", e);
                    stats.decode_failures += 1;
                }
            }
        }
        stats.images_returned = images.len();
        images
    }
}

/// Decodes a body on the blocking pool
async fn decode_image(
    url: String,
    body: Arc<[u8]>,
) -> std::result::Result<DecodedImage, DecodeError> {
    let joined = tokio::task::spawn_blocking(move || image::load_from_memory(&body)).await;
    match joined {
        Ok(Ok(image)) => Ok(DecodedImage { url, image }),
        Ok(Err(source)) => Err(DecodeError::Image { url, source }),
        Err(e) => Err(DecodeError::Worker {
            url,
            message: e.to_string(),
        }),
    }
}

/// Removes repeated URLs, keeping the first occurrence of each
///
/// # Example
///
/// ```
/// use sumi_scrape::pipeline::dedupe_urls;
///
/// let urls = vec!["a".to_string(), "b".to_string(), "a".to_string()];
/// assert_eq!(dedupe_urls(urls), vec!["a", "b"]);
/// ```
pub fn dedupe_urls(urls: impl IntoIterator<Item = String>) -> Vec<String> {
    urls.into_iter()
        .collect::<IndexSet<String>>()
        .into_iter()
        .collect()
}

/// Keeps the URLs whose probe succeeded and meets both minimums
///
/// # Arguments
///
/// * `urls` - Candidate URLs, in the order results should come back
/// * `probes` - Probe results keyed by URL
/// * `min_width` - Inclusive minimum width in pixels
/// * `min_height` - Inclusive minimum height in pixels
///
/// # Returns
///
/// The passing URLs in their original order. URLs without a probe result
/// are dropped.
pub fn retain_large_enough(
    urls: &[String],
    probes: &HashMap<String, ProbeResult>,
    min_width: u32,
    min_height: u32,
) -> Vec<String> {
    urls.iter()
        .filter(|url| {
            probes
                .get(url.as_str())
                .map_or(false, |probe| probe.meets(min_width, min_height))
        })
        .cloned()
        .collect()
}
