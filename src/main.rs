//! Sumi-Scrape main entry point
//!
//! This is the command-line interface for the Sumi-Scrape image harvester.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_scrape::config::load_config;
use sumi_scrape::{ImageScraper, ScrapeRequest, ScraperConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Sumi-Scrape: image harvesting for web pages
///
/// Sumi-Scrape fetches a page, finds the images it references, probes their
/// sizes and prints the ones that meet the given minimum dimensions.
#[derive(Parser, Debug)]
#[command(name = "sumi-scrape")]
#[command(version = "1.0.0")]
#[command(about = "Harvest the images of a web page", long_about = None)]
struct Cli {
    /// Page to scrape
    #[arg(value_name = "URL")]
    url: String,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Minimum image width in pixels
    #[arg(long, default_value_t = 0)]
    min_width: u32,

    /// Minimum image height in pixels
    #[arg(long, default_value_t = 0)]
    min_height: u32,

    /// Extra request header, as 'Name: value' (repeatable)
    #[arg(short = 'H', long = "header", value_name = "HEADER")]
    headers: Vec<String>,

    /// Print matching URLs without downloading the images
    #[arg(long)]
    urls_only: bool,

    /// Empty the cache before scraping
    #[arg(long)]
    clear_cache: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => ScraperConfig::default(),
    };

    let mut builder = ScrapeRequest::builder()
        .url(&cli.url)
        .min_width(cli.min_width)
        .min_height(cli.min_height);
    for header in &cli.headers {
        let (name, value) = parse_header(header)?;
        builder = builder.header(name, value);
    }
    let request = builder.build()?;

    let scraper = ImageScraper::from_config(&config)?;
    if cli.clear_cache {
        scraper
            .fetcher()
            .cache()
            .clear()
            .await
            .context("Failed to clear cache")?;
        tracing::info!("Cache cleared");
    }

    // Ctrl-C stops the scrape without printing partial results
    let token = CancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping scrape");
            interrupt.cancel();
        }
    });

    if cli.urls_only {
        for url in scraper.get_urls_with_cancel(&request, &token).await? {
            println!("{}", url);
        }
    } else {
        let (images, _stats) = scraper.get_with_stats(&request, &token).await?;
        for image in images {
            println!("{}\t{}x{}", image.url, image.width(), image.height());
        }
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_scrape=info,warn"),
            1 => EnvFilter::new("sumi_scrape=debug,info"),
            2 => EnvFilter::new("sumi_scrape=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // Results go to stdout, so logs stay on stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Splits a `Name: value` header argument
fn parse_header(raw: &str) -> anyhow::Result<(&str, &str)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("Header '{}' must look like 'Name: value'", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("Header '{}' has an empty name", raw);
    }
    Ok((name, value.trim()))
}
