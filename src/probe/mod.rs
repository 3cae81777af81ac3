//! Image dimension probing
//!
//! This module determines the pixel size of remote images without
//! downloading them in full:
//! - a ranged GET caps what the server sends
//! - the body is streamed chunk by chunk and inspected after each chunk
//! - the request is dropped as soon as the format header yields a size
//!
//! Batches run concurrently with a bounded number of probes in flight, and a
//! failed probe only marks its own URL.

mod header;

pub use header::{read_dimensions, Dimensions};

use crate::config::ProbeConfig;
use crate::FetchError;
use futures::stream::{self, StreamExt};
use header::{scan_header, tiff_directory, tiff_directory_dimensions, HeaderScan, TiffDirectory};
use indexmap::IndexSet;
use reqwest::header::{HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::collections::HashMap;
use thiserror::Error;

/// Reasons a probe could not determine a size
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Unsupported image format at {url}")]
    UnsupportedFormat { url: String },

    #[error("Could not determine dimensions of {url} from {bytes} bytes")]
    Undetermined { url: String, bytes: usize },

    #[error("No dimensions found in the first {limit} bytes of {url}")]
    LimitExceeded { url: String, limit: usize },
}

/// Dimensions of one probed URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub probe_failed: bool,
}

impl ProbeResult {
    /// A successful probe
    pub fn measured(url: impl Into<String>, dimensions: Dimensions) -> Self {
        Self {
            url: url.into(),
            width: dimensions.width,
            height: dimensions.height,
            probe_failed: false,
        }
    }

    /// A probe that could not determine a size
    pub fn failed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: 0,
            height: 0,
            probe_failed: true,
        }
    }

    /// Returns true if the probe succeeded and both sides reach the minimums
    pub fn meets(&self, min_width: u32, min_height: u32) -> bool {
        !self.probe_failed && self.width >= min_width && self.height >= min_height
    }
}

/// Probes remote images for their pixel dimensions
#[derive(Debug, Clone)]
pub struct DimensionProber {
    client: Client,
    concurrency: usize,
    max_probe_bytes: usize,
}

impl DimensionProber {
    /// Creates a prober with the default limits
    pub fn new(client: Client) -> Self {
        Self::from_config(client, &ProbeConfig::default())
    }

    /// Creates a prober with the configured limits
    pub fn from_config(client: Client, config: &ProbeConfig) -> Self {
        Self {
            client,
            concurrency: config.concurrency.max(1),
            max_probe_bytes: config.max_probe_bytes.max(1),
        }
    }

    /// Probes a single URL
    ///
    /// TIFF files whose first directory lies past the prefix get one more
    /// ranged read at the directory offset.
    ///
    /// # Returns
    ///
    /// * `Ok(Dimensions)` - The image size
    /// * `Err(ProbeError)` - The request failed or no size could be read
    pub async fn probe(&self, url: &str, headers: &HeaderMap) -> Result<Dimensions, ProbeError> {
        let (decision, prefix) = self
            .read_range(url, headers, 0, |bytes| match scan_header(bytes) {
                HeaderScan::NeedMore => None,
                decided => Some(decided),
            })
            .await?;

        match decision {
            Some(HeaderScan::Found(dimensions)) => {
                tracing::trace!(
                    "Probed {} as {}x{} after {} bytes",
                    url,
                    dimensions.width,
                    dimensions.height,
                    prefix.len()
                );
                Ok(dimensions)
            }
            Some(_) => Err(ProbeError::UnsupportedFormat {
                url: url.to_string(),
            }),
            None if prefix.len() >= self.max_probe_bytes => match tiff_directory(&prefix) {
                Some(directory) if directory.offset >= prefix.len() as u64 => {
                    self.probe_tiff_directory(url, headers, directory).await
                }
                _ => Err(self.limit_exceeded(url)),
            },
            None => Err(ProbeError::Undetermined {
                url: url.to_string(),
                bytes: prefix.len(),
            }),
        }
    }

    async fn probe_tiff_directory(
        &self,
        url: &str,
        headers: &HeaderMap,
        directory: TiffDirectory,
    ) -> Result<Dimensions, ProbeError> {
        tracing::trace!("Reading TIFF directory of {} at {}", url, directory.offset);
        let (dimensions, _) = self
            .read_range(url, headers, directory.offset, |bytes| {
                tiff_directory_dimensions(bytes, directory.little_endian)
            })
            .await?;
        dimensions.ok_or_else(|| self.limit_exceeded(url))
    }

    /// Streams at most `max_probe_bytes` starting at `start`
    ///
    /// `inspect` runs after every chunk; reading stops as soon as it returns
    /// a value. A read that does not start at zero requires a partial
    /// content response, since a full body would not begin at `start`.
    async fn read_range<T>(
        &self,
        url: &str,
        headers: &HeaderMap,
        start: u64,
        mut inspect: impl FnMut(&[u8]) -> Option<T>,
    ) -> Result<(Option<T>, Vec<u8>), ProbeError> {
        let end = start + self.max_probe_bytes as u64 - 1;
        let mut response = self
            .client
            .get(url)
            .headers(headers.clone())
            .header(RANGE, format!("bytes={}-{}", start, end))
            .send()
            .await
            .map_err(|e| FetchError::http(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if start > 0 && status != StatusCode::PARTIAL_CONTENT {
            return Err(self.limit_exceeded(url));
        }

        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::http(url, e))?
        {
            let remaining = self.max_probe_bytes - buffer.len();
            buffer.extend_from_slice(&chunk[..chunk.len().min(remaining)]);

            if let Some(decided) = inspect(&buffer) {
                return Ok((Some(decided), buffer));
            }
            if buffer.len() >= self.max_probe_bytes {
                break;
            }
        }

        Ok((None, buffer))
    }

    fn limit_exceeded(&self, url: &str) -> ProbeError {
        ProbeError::LimitExceeded {
            url: url.to_string(),
            limit: self.max_probe_bytes,
        }
    }

    /// Probes every distinct URL in `urls` concurrently
    ///
    /// # Returns
    ///
    /// One [`ProbeResult`] per distinct URL. Failures are recorded with
    /// `probe_failed = true` and never abort the batch.
    pub async fn probe_batch(
        &self,
        urls: &[String],
        headers: &HeaderMap,
    ) -> HashMap<String, ProbeResult> {
        let unique: IndexSet<&str> = urls.iter().map(String::as_str).collect();
        tracing::debug!(
            "Probing {} images ({} in flight)",
            unique.len(),
            self.concurrency
        );

        stream::iter(unique)
            .map(|url| async move {
                let result = match self.probe(url, headers).await {
                    Ok(dimensions) => ProbeResult::measured(url, dimensions),
                    Err(e) => {
                        tracing::debug!("Probe failed: {}", e);
                        ProbeResult::failed(url)
                    }
                };
                (url.to_string(), result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
