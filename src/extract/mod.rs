//! Image reference extraction from markup
//!
//! This module scans page markup and returns the raw image references it
//! contains, in document order. Two strategies are available:
//! - a regex applied to the raw text, returning the first capture group of
//!   every match (the default)
//! - a CSS selector applied to the parsed HTML, returning an attribute value
//!
//! References are not validated here; resolution and probing decide later
//! whether they point to anything useful.

use crate::config::{compile_pattern, ExtractionMode, PatternConfig};
use crate::ConfigError;
use regex::Regex;
use scraper::{Html, Selector};

/// Scans markup for image references
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    strategy: Strategy,
}

#[derive(Debug, Clone)]
enum Strategy {
    Pattern(Regex),
    Selector { selector: Selector, attribute: String },
}

impl ReferenceExtractor {
    /// Creates an extractor from a regex with at least one capture group
    pub fn from_pattern(pattern: &str) -> Result<Self, ConfigError> {
        let regex = compile_pattern("image-reference", pattern)?;
        if regex.captures_len() < 2 {
            return Err(ConfigError::InvalidPattern(format!(
                "image-reference pattern must contain a capture group, got '{}'",
                pattern
            )));
        }
        Ok(Self {
            strategy: Strategy::Pattern(regex),
        })
    }

    /// Creates an extractor reading `attribute` from elements matching `selector`
    pub fn from_selector(selector: &str, attribute: &str) -> Result<Self, ConfigError> {
        let parsed = Selector::parse(selector).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid selector '{}': {}", selector, e))
        })?;
        Ok(Self {
            strategy: Strategy::Selector {
                selector: parsed,
                attribute: attribute.to_string(),
            },
        })
    }

    /// Creates an extractor for the configured extraction mode
    pub fn from_config(config: &PatternConfig) -> Result<Self, ConfigError> {
        match config.extraction {
            ExtractionMode::Pattern => Self::from_pattern(&config.image_reference),
            ExtractionMode::Selector => {
                Self::from_selector(&config.selector, &config.selector_attribute)
            }
        }
    }

    /// Extracts every image reference from `markup`
    ///
    /// # Returns
    ///
    /// The references in document order; empty when nothing matches.
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_scrape::config::DEFAULT_IMAGE_REFERENCE_PATTERN;
    /// use sumi_scrape::extract::ReferenceExtractor;
    ///
    /// let extractor = ReferenceExtractor::from_pattern(DEFAULT_IMAGE_REFERENCE_PATTERN).unwrap();
    /// let refs = extractor.extract(r#"<img src="/a.png"><img alt="x" src='b.png'>"#);
    /// assert_eq!(refs, vec!["/a.png", "b.png"]);
    /// ```
    pub fn extract(&self, markup: &str) -> Vec<String> {
        match &self.strategy {
            Strategy::Pattern(regex) => regex
                .captures_iter(markup)
                .filter_map(|captures| captures.get(1))
                .map(|m| m.as_str().to_string())
                .collect(),
            Strategy::Selector {
                selector,
                attribute,
            } => {
                let document = Html::parse_document(markup);
                document
                    .select(selector)
                    .filter_map(|element| element.value().attr(attribute))
                    .map(str::to_string)
                    .collect()
            }
        }
    }
}
