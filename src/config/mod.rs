//! Configuration module for Sumi-Scrape
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every section is optional; a missing file section falls back to defaults.
//!
//! # Example
//!
//! ```no_run
//! use sumi_scrape::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scrape.toml")).unwrap();
//! println!("Origin pattern: {}", config.patterns.url_origin);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CacheBackend, CacheConfig, DownloadConfig, ExtractionMode, HttpConfig, PatternConfig,
    PipelineConfig, ProbeConfig, ScraperConfig, DEFAULT_IMAGE_REFERENCE_PATTERN,
    DEFAULT_URL_ORIGIN_PATTERN,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
pub use validation::validate;

pub(crate) use validation::compile_pattern;
