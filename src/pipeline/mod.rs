//! Scrape orchestration
//!
//! This module ties the stages of a scrape together:
//! - Acquiring markup, either given directly or fetched through the cache
//! - Extracting and resolving image references
//! - Probing dimensions and filtering by size
//! - Downloading and decoding the images that pass
//!
//! Cancellation and the optional pipeline timeout wrap the whole sequence.

mod image_scraper;
mod request;
mod stats;

pub use image_scraper::{dedupe_urls, retain_large_enough, DecodedImage, ImageScraper};
pub use request::{ScrapeRequest, ScrapeRequestBuilder};
pub use stats::ScrapeStats;
