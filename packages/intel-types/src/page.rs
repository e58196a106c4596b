use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::hash::ContentHash;
use crate::ids::PageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FetchStatus {
    Pending,
    Ok,
    Failed,
}

/// The canonical representation of a fetched web resource (spec §3).
/// Kept small so list/scan queries stay cheap; body and derived fields
/// live on the 1:1 `PageContent` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub url: String,
    pub domain_key: String,
    pub depth: u32,
    pub priority_score: f64,
    pub page_type: String,
    pub fetch_status: FetchStatus,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub text_length: usize,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(url: impl Into<String>, domain_key: impl Into<String>, depth: u32, priority_score: f64) -> Self {
        let url = url.into();
        let now = Utc::now();
        Self {
            id: PageId::from_normalized_url(&normalize_url(&url)),
            url,
            domain_key: domain_key.into(),
            depth,
            priority_score,
            page_type: "unknown".to_string(),
            fetch_status: FetchStatus::Pending,
            last_fetched_at: None,
            text_length: 0,
            created_at: now,
        }
    }
}

/// Raw HTML, cleaned text, metadata and structured-extraction map, 1:1
/// with a `Page` by id (spec §3). Replaced wholesale on refetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContent {
    pub page_id: PageId,
    pub raw_html: String,
    pub clean_text: String,
    pub content_hash: ContentHash,
    pub metadata: HashMap<String, Value>,
    pub structured_extraction: HashMap<String, Value>,
}

impl PageContent {
    pub fn new(page_id: PageId, raw_html: String, clean_text: String) -> Self {
        let content_hash = ContentHash::compute(&clean_text);
        Self {
            page_id,
            raw_html,
            clean_text,
            content_hash,
            metadata: HashMap::new(),
            structured_extraction: HashMap::new(),
        }
    }
}

/// URL normalization used for visited tracking and page-id derivation:
/// scheme + host + path, trailing slash stripped; fragment and query are
/// dropped. The *original* URL (not this normalized form) is still used
/// for fetch and storage (spec §4.7).
pub fn normalize_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            let host = parsed.host_str().unwrap_or_default();
            let mut path = parsed.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                path.pop();
            }
            format!("{scheme}://{host}{path}")
        }
        Err(_) => url.trim_end_matches('/').to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_drops_fragment_and_query_and_trailing_slash() {
        assert_eq!(
            normalize_url("https://example.com/about/?utm=1#team"),
            "https://example.com/about"
        );
        assert_eq!(normalize_url("https://example.com/"), "https://example.com");
    }

    #[test]
    fn same_normalized_url_yields_same_page_id() {
        let a = Page::new("https://example.com/about/", "example.com", 0, 40.0);
        let b = Page::new("https://example.com/about", "example.com", 0, 40.0);
        assert_eq!(a.id, b.id);
    }
}
