use crate::config::{compile_pattern, PatternConfig};
use crate::{ConfigError, ResolveError};
use regex::Regex;
use url::Url;

/// Turns image references into absolute URLs
///
/// Root-relative references are expanded with the origin matched by the
/// configured origin pattern. Other relative references are joined against
/// the base URL's directory.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    origin_pattern: Regex,
}

impl UrlResolver {
    /// Creates a resolver from an origin pattern
    ///
    /// # Arguments
    ///
    /// * `origin_pattern` - Regex whose whole match is the scheme + host of a URL
    pub fn new(origin_pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            origin_pattern: compile_pattern("url-origin", origin_pattern)?,
        })
    }

    /// Creates a resolver from the pattern section of the configuration
    pub fn from_config(config: &PatternConfig) -> Result<Self, ConfigError> {
        Self::new(&config.url_origin)
    }

    /// Extracts the origin of `url` using the origin pattern
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_scrape::config::DEFAULT_URL_ORIGIN_PATTERN;
    /// use sumi_scrape::UrlResolver;
    ///
    /// let resolver = UrlResolver::new(DEFAULT_URL_ORIGIN_PATTERN).unwrap();
    /// assert_eq!(resolver.origin("https://example.com/a/b.html"), Some("https://example.com"));
    /// assert_eq!(resolver.origin("/a/b.html"), None);
    /// ```
    pub fn origin<'a>(&self, url: &'a str) -> Option<&'a str> {
        self.origin_pattern.find(url).map(|m| m.as_str())
    }

    /// Resolves `reference` against the page at `base_url`
    ///
    /// # Resolution Rules
    ///
    /// 1. Absolute references (with a scheme) are returned unchanged
    /// 2. Protocol-relative references (`//host/path`) take the base scheme
    /// 3. Root-relative references (`/path`) are appended to the base origin
    /// 4. Anything else is resolved against the base URL's directory
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The absolute URL
    /// * `Err(ResolveError)` - The reference is empty or the base has no origin
    ///
    /// # Examples
    ///
    /// ```
    /// use sumi_scrape::config::DEFAULT_URL_ORIGIN_PATTERN;
    /// use sumi_scrape::UrlResolver;
    ///
    /// let resolver = UrlResolver::new(DEFAULT_URL_ORIGIN_PATTERN).unwrap();
    /// let base = "https://example.com/a/b.html";
    /// assert_eq!(resolver.resolve(base, "/img/x.png").unwrap(), "https://example.com/img/x.png");
    /// assert_eq!(resolver.resolve(base, "x.png").unwrap(), "https://example.com/a/x.png");
    /// ```
    pub fn resolve(&self, base_url: &str, reference: &str) -> Result<String, ResolveError> {
        let reference = clean_reference(reference);
        if reference.is_empty() {
            return Err(ResolveError::Empty);
        }

        if !reference.starts_with("//") && has_scheme(&reference) {
            return Ok(reference);
        }

        let origin = self
            .origin(base_url)
            .ok_or_else(|| ResolveError::MissingOrigin {
                base: base_url.to_string(),
                reference: reference.clone(),
            })?;

        if let Some(authority) = reference.strip_prefix("//") {
            let scheme = origin.split_once(':').map_or(origin, |(scheme, _)| scheme);
            return Ok(format!("{}://{}", scheme, authority));
        }

        if reference.starts_with('/') {
            return Ok(format!("{}{}", origin, reference));
        }

        let base = Url::parse(base_url).map_err(|e| ResolveError::Malformed {
            base: base_url.to_string(),
            reference: reference.clone(),
            message: e.to_string(),
        })?;

        base.join(&reference)
            .map(String::from)
            .map_err(|e| ResolveError::Malformed {
                base: base_url.to_string(),
                reference,
                message: e.to_string(),
            })
    }
}

/// Trims whitespace and decodes the `&amp;` entity left by HTML attribute escaping
fn clean_reference(reference: &str) -> String {
    reference.trim().replace("&amp;", "&")
}

/// Checks for an RFC 3986 scheme prefix (`ALPHA *( ALPHA / DIGIT / "+" / "-" / "." ) ":"`)
fn has_scheme(reference: &str) -> bool {
    let Some((scheme, _)) = reference.split_once(':') else {
        return false;
    };

    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
