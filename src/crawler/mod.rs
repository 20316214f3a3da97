//! Crawler module: the worker pool and its collaborators
//!
//! This module contains the crawl engine around the frontier:
//! - HTTP fetching behind the [`Fetcher`] trait
//! - Link extraction behind the [`ContentExtractor`] trait
//! - The [`CrawlPolicy`] hooks an application implements
//! - Workers, their supervising monitor, and the [`CrawlController`]

mod controller;
mod extractor;
mod fetcher;
mod monitor;
mod policy;
mod worker;

pub use controller::{CrawlController, CrawlCounters, CrawlSummary, ShutdownHandle};
pub use extractor::{ContentExtractor, ExtractedLink, HtmlExtractor, ParseData};
pub use fetcher::{build_http_client, FetchError, FetchResponse, Fetcher, HttpFetcher};
pub use policy::{CrawlPolicy, DefaultPolicy, Page};
