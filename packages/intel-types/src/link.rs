use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::LinkId;

/// A hyperlink observed on one page pointing to another URL (spec §3).
/// Upgraded to a `page_link` Relationship once both endpoints have Page
/// records (the Relational Store's responsibility on save, see §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from_url: String,
    pub to_url: String,
    pub anchor_text: String,
    pub scoring_reason: String,
    pub score: f64,
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
}

impl Link {
    pub fn new(
        from_url: impl Into<String>,
        to_url: impl Into<String>,
        anchor_text: impl Into<String>,
        scoring_reason: impl Into<String>,
        score: f64,
        depth: u32,
    ) -> Self {
        Self {
            id: LinkId::new(),
            from_url: from_url.into(),
            to_url: to_url.into(),
            anchor_text: anchor_text.into(),
            scoring_reason: scoring_reason.into(),
            score,
            depth,
            discovered_at: Utc::now(),
        }
    }
}
