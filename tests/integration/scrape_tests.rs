//! Integration tests for the scrape pipeline
//!
//! These tests use wiremock to serve pages and images and run full scrapes
//! end-to-end against it.

use reqwest::header::HeaderMap;
use reqwest::Client;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use sumi_scrape::cache::{CacheStore, MemoryCache};
use sumi_scrape::config::{CacheBackend, ScraperConfig};
use sumi_scrape::fetch::CachingFetcher;
use sumi_scrape::{
    AcquisitionError, FetchError, ImageScraper, ScrapeError, ScrapeRequest,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Encodes a blank PNG of the given size
fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::new_rgb8(width, height)
        .write_to(&mut buffer, image::ImageFormat::Png)
        .expect("Failed to encode test image");
    buffer.into_inner()
}

fn image_response(width: u32, height: u32) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_bytes(png(width, height))
        .insert_header("content-type", "image/png")
}

fn page_response(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body)
        .insert_header("content-type", "text/html")
}

/// Creates a scraper over a fresh in-memory cache
fn memory_scraper(config: &ScraperConfig) -> ImageScraper {
    ImageScraper::new(config, Client::new(), Arc::new(MemoryCache::new(256)))
        .expect("Failed to create scraper")
}

async fn mount_gallery(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/p/q.html"))
        .respond_with(page_response(
            r#"<html><body><img src="/a.png"><img src="b.png"></body></html>"#,
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(image_response(100, 50))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/p/b.png"))
        .respond_with(image_response(20, 20))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_two_images_with_threshold() {
    let server = MockServer::start().await;
    mount_gallery(&server).await;
    let base = server.uri();

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder()
        .url(format!("{}/p/q.html", base))
        .min_width(50)
        .min_height(30)
        .build()
        .unwrap();

    let images = scraper.get(&request).await.unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].url, format!("{}/a.png", base));
    assert_eq!((images[0].width(), images[0].height()), (100, 50));
}

#[tokio::test]
async fn test_zero_thresholds_keep_every_image_in_order() {
    let server = MockServer::start().await;
    mount_gallery(&server).await;
    let base = server.uri();

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::for_url(format!("{}/p/q.html", base));

    let (images, stats) = scraper
        .get_with_stats(&request, &CancellationToken::new())
        .await
        .unwrap();

    let urls: Vec<_> = images.iter().map(|i| i.url.clone()).collect();
    assert_eq!(
        urls,
        vec![format!("{}/a.png", base), format!("{}/p/b.png", base)]
    );
    assert_eq!(stats.references_found, 2);
    assert_eq!(stats.unique_urls, 2);
    assert_eq!(stats.images_returned, 2);
    assert_eq!(stats.below_threshold, 0);
}

#[tokio::test]
async fn test_get_urls_matches_get() {
    let server = MockServer::start().await;
    mount_gallery(&server).await;
    let base = server.uri();

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder()
        .url(format!("{}/p/q.html", base))
        .min_width(21)
        .build()
        .unwrap();

    let urls = scraper.get_urls(&request).await.unwrap();
    assert_eq!(urls, vec![format!("{}/a.png", base)]);
}

#[tokio::test]
async fn test_duplicate_references_are_fetched_once() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/dup.html"))
        .respond_with(page_response(&format!(
            r#"<img src="/a.png"><img src="{}/a.png"><img src="./a.png">"#,
            base
        )))
        .mount(&server)
        .await;

    // Exactly one probe and one download
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(image_response(10, 10))
        .expect(2)
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let (images, stats) = scraper
        .get_with_stats(
            &ScrapeRequest::for_url(format!("{}/dup.html", base)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(stats.references_found, 3);
    assert_eq!(stats.unique_urls, 1);
}

#[tokio::test]
async fn test_fetcher_serves_repeat_requests_from_cache() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(image_response(8, 8))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = CachingFetcher::new(Client::new(), Arc::new(MemoryCache::new(16)));
    let url = format!("{}/a.png", server.uri());

    let first = fetcher.fetch(&url, &HeaderMap::new(), None).await.unwrap();
    let second = fetcher.fetch(&url, &HeaderMap::new(), None).await.unwrap();
    assert_eq!(first, second);

    let batch = fetcher
        .fetch_batch(&[url.clone(), url], &HeaderMap::new(), None)
        .await;
    assert!(batch.iter().all(|r| r.as_ref().unwrap() == &first));
}

#[tokio::test]
async fn test_page_is_fetched_once_across_scrapes() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(page_response("<p>nothing to see</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::for_url(format!("{}/page.html", base));

    assert!(scraper.get_urls(&request).await.unwrap().is_empty());
    assert!(scraper.get_urls(&request).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sqlite_cache_survives_new_scraper() {
    let server = MockServer::start().await;
    let base = server.uri();
    let temp_dir = tempfile::tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(page_response("<p>nothing to see</p>"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = ScraperConfig::default();
    config.cache.backend = CacheBackend::Sqlite;
    config.cache.path = temp_dir
        .path()
        .join("cache.db")
        .to_string_lossy()
        .into_owned();

    let request = ScrapeRequest::for_url(format!("{}/page.html", base));
    for _ in 0..2 {
        let scraper = ImageScraper::from_config(&config).unwrap();
        assert!(scraper.get_urls(&request).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/ok1.png"))
        .respond_with(image_response(4, 4))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok2.png"))
        .respond_with(image_response(6, 6))
        .mount(&server)
        .await;

    let fetcher = CachingFetcher::new(Client::new(), Arc::new(MemoryCache::new(16)));
    let urls = vec![
        format!("{}/ok1.png", base),
        format!("{}/missing.png", base),
        format!("{}/ok2.png", base),
    ];

    let results = fetcher.fetch_batch(&urls, &HeaderMap::new(), None).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        &results[1],
        Err(FetchError::Status { status: 404, .. })
    ));
    assert!(results[2].is_ok());

    // Failures are not cached
    let missing_key = sumi_scrape::fetch::cache_key(&urls[1]);
    assert!(fetcher.cache().get(&missing_key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_download_failure_drops_only_that_image() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/gallery.html"))
        .respond_with(page_response(
            r#"<img src="/a.png"><img src="/b.png"><img src="/c.png">"#,
        ))
        .mount(&server)
        .await;

    for name in ["/a.png", "/c.png"] {
        Mock::given(method("GET"))
            .and(path(name))
            .respond_with(image_response(30, 30))
            .mount(&server)
            .await;
    }

    // b.png answers the ranged probe but fails the full download
    Mock::given(method("GET"))
        .and(path("/b.png"))
        .and(header_exists("range"))
        .respond_with(image_response(30, 30))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let (images, stats) = scraper
        .get_with_stats(
            &ScrapeRequest::for_url(format!("{}/gallery.html", base)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let urls: Vec<_> = images.iter().map(|i| i.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![format!("{}/a.png", base), format!("{}/c.png", base)]
    );
    assert_eq!(stats.accepted_urls, 3);
    assert_eq!(stats.fetch_failures, 1);
}

#[tokio::test]
async fn test_corrupt_image_data_drops_only_that_image() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/gallery.html"))
        .respond_with(page_response(r#"<img src="/bad.png"><img src="/ok.png">"#))
        .mount(&server)
        .await;

    // Header intact, pixel data cut in half
    let full = png(40, 40);
    let truncated = full[..full.len() / 2].to_vec();
    Mock::given(method("GET"))
        .and(path("/bad.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(truncated))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ok.png"))
        .respond_with(image_response(40, 40))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let (images, stats) = scraper
        .get_with_stats(
            &ScrapeRequest::for_url(format!("{}/gallery.html", base)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].url, format!("{}/ok.png", base));
    assert_eq!(stats.accepted_urls, 2);
    assert_eq!(stats.fetch_failures, 0);
    assert_eq!(stats.decode_failures, 1);
    assert_eq!(stats.images_returned, 1);
}

#[tokio::test]
async fn test_cached_images_are_measured_without_requests() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(page_response(r#"<img src="/a.png">"#))
        .expect(1)
        .mount(&server)
        .await;
    // One ranged read and one download, both during the first scrape
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .respond_with(image_response(64, 48))
        .expect(2)
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder()
        .url(format!("{}/page.html", base))
        .min_width(60)
        .build()
        .unwrap();

    let first = scraper.get(&request).await.unwrap();
    let (second, stats) = scraper
        .get_with_stats(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);
    assert_eq!((second[0].width(), second[0].height()), (64, 48));
    assert_eq!(stats.probe_failures, 0);
    assert_eq!(stats.accepted_urls, 1);
}

#[tokio::test]
async fn test_unprobeable_references_are_excluded() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/mixed.html"))
        .respond_with(page_response(
            r#"<img src="/real.png"><img src="/fake.png"><img src="/gone.png">"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/real.png"))
        .respond_with(image_response(12, 12))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fake.png"))
        .respond_with(page_response(
            "<!doctype html><html><body>This is a soft 404 page</body></html>",
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gone.png"))
        .respond_with(ResponseTemplate::new(410))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let (images, stats) = scraper
        .get_with_stats(
            &ScrapeRequest::for_url(format!("{}/mixed.html", base)),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(images.len(), 1);
    assert_eq!(images[0].url, format!("{}/real.png", base));
    assert_eq!(stats.probe_failures, 2);
}

#[tokio::test]
async fn test_request_headers_are_sent() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/private.html"))
        .and(header("x-session", "abc"))
        .respond_with(page_response(r#"<img src="/a.png">"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/a.png"))
        .and(header("x-session", "abc"))
        .respond_with(image_response(5, 5))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder()
        .url(format!("{}/private.html", base))
        .header("X-Session", "abc")
        .build()
        .unwrap();

    assert_eq!(scraper.get(&request).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_markup_is_used_instead_of_fetching() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/page.html"))
        .respond_with(page_response("<p>should not be requested</p>"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/img/a.png"))
        .respond_with(image_response(9, 9))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder()
        .markup(r#"<img src="img/a.png">"#)
        .url(format!("{}/page.html", base))
        .build()
        .unwrap();

    assert_eq!(
        scraper.get_urls(&request).await.unwrap(),
        vec![format!("{}/img/a.png", base)]
    );
}

#[tokio::test]
async fn test_page_failure_aborts_scrape() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/broken.html"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let result = scraper
        .get(&ScrapeRequest::for_url(format!(
            "{}/broken.html",
            server.uri()
        )))
        .await;

    assert!(matches!(
        result,
        Err(ScrapeError::Acquisition(AcquisitionError::Fetch(
            FetchError::Status { status: 503, .. }
        )))
    ));
}

#[tokio::test]
async fn test_missing_source_is_acquisition_error() {
    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::builder().min_width(10).build().unwrap();

    let result = scraper.get_urls(&request).await;
    assert!(matches!(
        result,
        Err(ScrapeError::Acquisition(AcquisitionError::MissingSource))
    ));
}

#[tokio::test]
async fn test_cancellation_during_probe() {
    let server = MockServer::start().await;
    let base = server.uri();

    Mock::given(method("GET"))
        .and(path("/slow.html"))
        .respond_with(page_response(r#"<img src="/slow.png">"#))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/slow.png"))
        .respond_with(image_response(10, 10).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let scraper = memory_scraper(&ScraperConfig::default());
    let request = ScrapeRequest::for_url(format!("{}/slow.html", base));
    let token = CancellationToken::new();

    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let result = scraper.get_with_cancel(&request, &token).await;

    assert!(matches!(result, Err(ScrapeError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_pipeline_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow.html"))
        .respond_with(page_response("<p>late</p>").set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let mut config = ScraperConfig::default();
    config.pipeline.timeout_secs = 1;
    let scraper = memory_scraper(&config);

    let started = Instant::now();
    let result = scraper
        .get_urls(&ScrapeRequest::for_url(format!("{}/slow.html", server.uri())))
        .await;

    match result {
        Err(e @ ScrapeError::TimedOut(_)) => assert!(e.is_cancellation()),
        other => panic!("expected timeout, got {:?}", other.map(|u| u.len())),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}
