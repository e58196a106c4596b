//! SERP adapter contract (spec §6): given a query string, returns up to
//! N search-engine-results-page hits. Used only by the RAG Answerer's
//! Phase 4 live-crawl fallback (spec §4.12). The concrete adapter
//! (calling a real search API or browser-driven search) is an
//! out-of-scope external collaborator per spec §1 — only the trait
//! contract lives here, the way `Fetcher` specifies `url -> html`
//! without owning a concrete client.

use async_trait::async_trait;
use thiserror::Error;

/// One search-result hit. `title`/`body` are optional because not every
/// adapter surfaces a snippet (spec §6: "each with at least `href`,
/// optionally `title` and `body`").
#[derive(Debug, Clone)]
pub struct SerpResult {
    pub href: String,
    pub title: Option<String>,
    pub body: Option<String>,
}

#[derive(Debug, Error)]
pub enum SerpError {
    #[error("network error: {0}")]
    Network(String),
}

#[async_trait]
pub trait SerpAdapter: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SerpResult>, SerpError>;
}

/// A SERP adapter that always returns no results, standing in for "no
/// live-search adapter configured" the way `NullFetcher` stands in for
/// "no fetcher configured" — Phase 4 simply finds zero candidate URLs
/// and the Answerer falls through to the user-visible fallback message.
pub struct NullSerpAdapter;

#[async_trait]
impl SerpAdapter for NullSerpAdapter {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SerpResult>, SerpError> {
        Ok(Vec::new())
    }
}
