//! Per-scrape counters

use std::fmt;

/// What happened to the references of a single scrape
///
/// Per-URL failures never abort a scrape; they are counted here instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    /// References found in the markup, duplicates included
    pub references_found: usize,

    /// References that could not be resolved to an absolute URL
    pub invalid_references: usize,

    /// Distinct absolute URLs after deduplication
    pub unique_urls: usize,

    /// URLs whose size could not be determined
    pub probe_failures: usize,

    /// URLs measured smaller than the requested minimums
    pub below_threshold: usize,

    /// URLs that passed the filter
    pub accepted_urls: usize,

    /// Accepted URLs whose body could not be downloaded
    pub fetch_failures: usize,

    /// Downloaded bodies that could not be decoded
    pub decode_failures: usize,

    /// Images returned to the caller
    pub images_returned: usize,
}

impl ScrapeStats {
    /// Emits the counters as a single log line
    pub fn log_summary(&self) {
        tracing::info!("Scrape finished: {}", self);
    }
}

impl fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} references ({} invalid), {} unique URLs, {} probe failures, \
             {} below threshold, {} accepted, {} fetch failures, {} decode failures, \
             {} images",
            self.references_found,
            self.invalid_references,
            self.unique_urls,
            self.probe_failures,
            self.below_threshold,
            self.accepted_urls,
            self.fetch_failures,
            self.decode_failures,
            self.images_returned
        )
    }
}
