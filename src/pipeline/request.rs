use crate::ScrapeError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// One scrape's inputs
///
/// Built once through [`ScrapeRequest::builder`] and never modified while a
/// scrape runs. Either markup or a page URL must be supplied; the scrape
/// fails with an acquisition error if both are missing.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    markup: Option<String>,
    url: Option<String>,
    min_width: u32,
    min_height: u32,
    headers: HeaderMap,
}

impl ScrapeRequest {
    /// Starts building a request
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_scrape::ScrapeRequest;
    ///
    /// let request = ScrapeRequest::builder()
    ///     .url("https://example.com/gallery.html")
    ///     .header("Accept-Language", "en")
    ///     .min_width(200)
    ///     .min_height(150)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(request.min_width(), 200);
    /// ```
    pub fn builder() -> ScrapeRequestBuilder {
        ScrapeRequestBuilder::default()
    }

    /// A request for the page at `url` with no thresholds or headers
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Markup to scan instead of fetching the page
    pub fn markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    /// Page URL, used both for fetching and as the resolution base
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn min_width(&self) -> u32 {
        self.min_width
    }

    pub fn min_height(&self) -> u32 {
        self.min_height
    }

    /// Headers sent with every request of this scrape
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Builder for [`ScrapeRequest`]
#[derive(Debug, Default)]
pub struct ScrapeRequestBuilder {
    markup: Option<String>,
    url: Option<String>,
    min_width: u32,
    min_height: u32,
    headers: Vec<(String, String)>,
}

impl ScrapeRequestBuilder {
    pub fn markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn min_width(mut self, min_width: u32) -> Self {
        self.min_width = min_width;
        self
    }

    pub fn min_height(mut self, min_height: u32) -> Self {
        self.min_height = min_height;
        self
    }

    /// Adds a header; repeated names are all sent
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Finishes the request
    ///
    /// # Returns
    ///
    /// * `Ok(ScrapeRequest)` - The immutable request
    /// * `Err(ScrapeError::InvalidHeader)` - A header name or value is not valid HTTP
    pub fn build(self) -> Result<ScrapeRequest, ScrapeError> {
        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| ScrapeError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            let header_value =
                HeaderValue::from_str(&value).map_err(|e| ScrapeError::InvalidHeader {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            headers.append(header_name, header_value);
        }

        Ok(ScrapeRequest {
            markup: self.markup,
            url: self.url,
            min_width: self.min_width,
            min_height: self.min_height,
            headers,
        })
    }
}
