use serde::{Deserialize, Serialize};

/// A learned domain prior the URL Scorer applies additively, plus an
/// `is_official` flag that confers the +150 official-domain boost
/// (spec §4.1, §4.9 "official_domains").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    pub domain: String,
    pub weight: f64,
    pub is_official: bool,
}

/// A learned URL-regex pattern weight the URL Scorer applies additively
/// (spec §4.1 "Data-driven patterns").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub pattern: String,
    pub weight: f64,
}

/// Selectors-of-interest per page for targeted re-extraction, consumed
/// by the Refresher (spec §3 "Fingerprint / Pattern / Domain").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub page_url: String,
    pub selectors: Vec<String>,
}
