//! Fetcher: the IO boundary `url -> (html, outlinks)` (spec §2, §4.7).
//! The concrete Selenium/HTTP implementation is an external collaborator
//! out of scope for this crate (spec §1); only the trait contract lives
//! here, the way `intelligent-crawler::traits::PageFetcher` is a trait
//! the crawler depends on without owning a concrete client.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Default per-fetch timeout (spec §5: "fetch (~10s)").
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("non-success status: {0}")]
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

/// A fetched page's HTML plus outlinks (spec §4.7d: "Fetch HTML and
/// outlinks via Fetcher"). Outlink extraction is delegated to the
/// Content Extractor in this crate's implementation, but the contract
/// allows a fetcher to surface links it discovered during rendering
/// (e.g. JS-rendered anchors a static HTML parse would miss).
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// A fetcher that always fails, standing in for "no fetcher configured"
/// in contexts (tests, the RAG Answerer's local-only phases) that never
/// actually need live fetches.
pub struct NullFetcher;

#[async_trait]
impl Fetcher for NullFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedPage, FetchError> {
        Err(FetchError::Network("no fetcher configured".to_string()))
    }
}
