//! URL handling module for Sumi-Scrape
//!
//! This module resolves raw image references found in markup into absolute,
//! fetchable URLs. Resolution is a pure string transformation; nothing here
//! touches the network.

mod resolve;

pub use resolve::UrlResolver;
