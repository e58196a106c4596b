use intel_types::Finding;
use serde::{Deserialize, Serialize};

/// The subject the Explorer/Answerer is gathering facts about (spec §4.7
/// "an Entity profile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityProfile {
    pub name: String,
    pub kind: String,
    pub location_hint: Option<String>,
    pub official_domains: Vec<String>,
    pub aliases: Vec<String>,
}

impl EntityProfile {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            location_hint: None,
            official_domains: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

/// One unverified finding proposed by `extract_intelligence`, before
/// `reflect_and_verify` gates it (spec §4.4, §4.7h).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFinding {
    pub finding: Finding,
}

/// Result of a reflection call on one candidate finding (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectResult {
    pub verified: bool,
    pub confidence: u8,
    pub reason: String,
}

/// The minimum threshold a candidate must clear to be kept (spec §4.7h).
pub const KEEP_CONFIDENCE_THRESHOLD: u8 = 70;

impl ReflectResult {
    /// Whether this candidate should be persisted as Intelligence
    /// (spec §4.7h: `verified = true AND confidence >= 70`).
    pub fn should_keep(&self) -> bool {
        self.verified && self.confidence >= KEEP_CONFIDENCE_THRESHOLD
    }
}

/// An outbound link as seen on a page, before scoring (input to
/// `rank_links`, spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub url: String,
    pub anchor_text: String,
}

/// A link with its LLM-assigned score, to be combined with the
/// heuristic URL Scorer score via `max()` (spec §4.7k).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedLink {
    pub url: String,
    pub anchor_text: String,
    pub llm_score: u8,
}

/// One SERP-style search result, ranked and flagged official-or-not by
/// the LLM (spec §4.4, §9 "is_official criterion ... LLM-judged").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedSearchResult {
    pub href: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub is_official: bool,
}

/// A raw SERP candidate before LLM ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub href: String,
    pub title: Option<String>,
    pub body: Option<String>,
}

/// The literal sentinel `synthesize_answer` may return internally. Never
/// surfaced to a caller of the RAG Answerer — it is always replaced by
/// the user-visible fallback message before leaving that component
/// (spec §7, §8 "RAG sufficiency gate").
pub const INSUFFICIENT_DATA_SENTINEL: &str = "INSUFFICIENT_DATA";

/// One piece of retrieved context passed to `synthesize_answer`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHit {
    pub url: String,
    pub snippet: String,
    pub score: f64,
    pub source: HitSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitSource {
    Rag,
    Sql,
}
