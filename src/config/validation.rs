use crate::config::types::{
    CacheBackend, CacheConfig, ExtractionMode, HttpConfig, PatternConfig, ProbeConfig,
    ScraperConfig,
};
use crate::ConfigError;
use regex::Regex;
use scraper::Selector;
use url::Url;

/// Largest accepted value for any concurrency setting
const MAX_CONCURRENCY: usize = 64;

/// Smallest accepted probe read limit; no supported header fits in less
const MIN_PROBE_BYTES: usize = 64;

/// Validates the entire configuration
pub fn validate(config: &ScraperConfig) -> Result<(), ConfigError> {
    validate_patterns(&config.patterns)?;
    validate_http_config(&config.http)?;
    validate_cache_config(&config.cache)?;
    validate_probe_config(&config.probe)?;
    validate_concurrency("download.concurrency", config.download.concurrency)?;
    Ok(())
}

/// Validates the extraction and origin patterns
fn validate_patterns(config: &PatternConfig) -> Result<(), ConfigError> {
    let image_pattern = compile_pattern("image-reference", &config.image_reference)?;
    if image_pattern.captures_len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "image-reference pattern must contain a capture group, got '{}'",
            config.image_reference
        )));
    }

    compile_pattern("url-origin", &config.url_origin)?;

    if config.extraction == ExtractionMode::Selector {
        Selector::parse(&config.selector).map_err(|e| {
            ConfigError::InvalidPattern(format!("Invalid selector '{}': {}", config.selector, e))
        })?;

        if config.selector_attribute.trim().is_empty() {
            return Err(ConfigError::Validation(
                "selector-attribute cannot be empty".to_string(),
            ));
        }
    }

    Ok(())
}

/// Compiles a configured regex, naming the key in the error
pub(crate) fn compile_pattern(key: &str, pattern: &str) -> Result<Regex, ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(format!("{} cannot be empty", key)));
    }

    Regex::new(pattern)
        .map_err(|e| ConfigError::InvalidPattern(format!("Invalid {} pattern: {}", key, e)))
}

/// Validates HTTP client configuration
fn validate_http_config(config: &HttpConfig) -> Result<(), ConfigError> {
    // Client name: non-empty, alphanumeric + hyphens only
    if config.client_name.is_empty() {
        return Err(ConfigError::Validation(
            "client-name cannot be empty".to_string(),
        ));
    }

    if !config
        .client_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "client-name must contain only alphanumeric characters and hyphens, got '{}'",
            config.client_name
        )));
    }

    if let Some(contact_url) = &config.contact_url {
        Url::parse(contact_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact-url: {}", e)))?;
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates cache configuration
fn validate_cache_config(config: &CacheConfig) -> Result<(), ConfigError> {
    match config.backend {
        CacheBackend::Sqlite if config.path.trim().is_empty() => Err(ConfigError::Validation(
            "cache.path cannot be empty for the sqlite backend".to_string(),
        )),
        CacheBackend::Memory if config.max_entries == 0 => Err(ConfigError::Validation(
            "cache.max-entries must be >= 1 for the memory backend".to_string(),
        )),
        _ => Ok(()),
    }
}

/// Validates probe configuration
fn validate_probe_config(config: &ProbeConfig) -> Result<(), ConfigError> {
    validate_concurrency("probe.concurrency", config.concurrency)?;

    if config.max_probe_bytes < MIN_PROBE_BYTES {
        return Err(ConfigError::Validation(format!(
            "probe.max-probe-bytes must be >= {}, got {}",
            MIN_PROBE_BYTES, config.max_probe_bytes
        )));
    }

    Ok(())
}

fn validate_concurrency(key: &str, value: usize) -> Result<(), ConfigError> {
    if value < 1 || value > MAX_CONCURRENCY {
        return Err(ConfigError::Validation(format!(
            "{} must be between 1 and {}, got {}",
            key, MAX_CONCURRENCY, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&ScraperConfig::default()).is_ok());
    }

    #[test]
    fn test_image_pattern_requires_capture_group() {
        let mut config = ScraperConfig::default();
        config.patterns.image_reference = r"<img[^>]+>".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let mut config = ScraperConfig::default();
        config.patterns.url_origin = "^(unclosed".to_string();
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_selector_checked_only_in_selector_mode() {
        let mut config = ScraperConfig::default();
        config.patterns.selector = "img[".to_string();
        assert!(validate(&config).is_ok());

        config.patterns.extraction = ExtractionMode::Selector;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_client_name() {
        let mut config = ScraperConfig::default();
        config.http.client_name = "Bad Name!".to_string();
        assert!(validate(&config).is_err());

        config.http.client_name = String::new();
        assert!(validate(&config).is_err());

        config.http.client_name = "good-name2".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_contact_url() {
        let mut config = ScraperConfig::default();
        config.http.contact_url = Some("not a url".to_string());
        assert!(matches!(validate(&config), Err(ConfigError::InvalidUrl(_))));
    }

    #[test]
    fn test_concurrency_bounds() {
        assert!(validate_concurrency("x", 0).is_err());
        assert!(validate_concurrency("x", 1).is_ok());
        assert!(validate_concurrency("x", 64).is_ok());
        assert!(validate_concurrency("x", 65).is_err());
    }

    #[test]
    fn test_sqlite_backend_requires_path() {
        let mut config = ScraperConfig::default();
        config.cache.backend = CacheBackend::Sqlite;
        config.cache.path = "  ".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_probe_byte_floor() {
        let mut config = ScraperConfig::default();
        config.probe.max_probe_bytes = 16;
        assert!(validate(&config).is_err());
    }
}
