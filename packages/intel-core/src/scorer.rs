//! URL Scorer: a pure function `(url, anchor_text, depth, learned_priors)
//! -> (score, reason)` (spec §4.1). Grounded on
//! `original_source/src/explorer/scorer.py`, recast into the teacher's
//! pattern of small pure-data structs plus a function operating over them
//! (`intelligent-crawler`'s `config.rs`/`relationships.rs` style) rather
//! than a stateful object — the only state (learned domain/pattern
//! weights) is passed in explicitly via `LearnedPriors`.

use std::collections::HashMap;

use regex::Regex;

pub const BASE_SCORE: f64 = 40.0;
pub const MAX_SCORE: f64 = 150.0;
pub const MIN_SCORE: f64 = 0.0;
pub const OFFICIAL_DOMAIN_BOOST: f64 = 150.0;
pub const NAME_WORD_BOOST: f64 = 50.0;
pub const SECOND_LEVEL_DOMAIN_MATCH_BOOST: f64 = 40.0;
pub const ENTITY_TYPE_KEYWORD_BOOST: f64 = 20.0;
pub const TOPIC_KEYWORD_BOOST: f64 = 30.0;
pub const DEPTH_PENALTY_PER_LEVEL: f64 = 5.0;
const MIN_NAME_WORD_LEN: usize = 3;

/// Known-generic "registry" domains: allowed, crawled, but never promoted
/// to "official" by this scorer (spec §4.1).
pub const REGISTRY_DOMAINS: &[&str] = &[
    "opencorporates.com",
    "linkedin.com",
    "wikipedia.org",
    "crunchbase.com",
    "bloomberg.com",
    "reuters.com",
    "techcrunch.com",
];

/// Hard-zero blacklist: schemes and routes that should never be crawled
/// regardless of score (spec §4.1).
fn blacklisted(url: &str) -> bool {
    let lower = url.to_lowercase();
    const SCHEME_PREFIXES: &[&str] = &["mailto:", "tel:", "sms:", "javascript:"];
    if SCHEME_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return true;
    }
    const BLOCKED_SUBSTRINGS: &[&str] = &[
        "sharer",
        "share?",
        "intent/tweet",
        "/privacy",
        "/terms",
        "/login",
        "/signup",
        "/register",
        "/newsletter",
        "/rss",
        "/feed",
    ];
    if BLOCKED_SUBSTRINGS.iter().any(|s| lower.contains(s)) {
        return true;
    }
    if lower.ends_with('#') || lower == "#" {
        return true;
    }
    false
}

/// Entity kind, mirroring the keyword branches the original scorer keeps
/// per type (spec §4.1; `Topic` branch supplemented from
/// `original_source` per SPEC_FULL.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Company,
    Person,
    News,
    Topic,
    Other,
}

impl EntityType {
    fn keywords(self) -> &'static [&'static str] {
        match self {
            EntityType::News => &["news", "headline", "breaking", "latest"],
            EntityType::Person => &["bio", "profile", "interview"],
            EntityType::Company => &["investor", "annual report", "leadership", "board", "sec"],
            EntityType::Topic => &["wiki", "encyclopedia", "journal", "edu", "theory", "science"],
            EntityType::Other => &["about", "article", "story"],
        }
    }

    fn keyword_boost(self) -> f64 {
        match self {
            EntityType::Topic => TOPIC_KEYWORD_BOOST,
            _ => ENTITY_TYPE_KEYWORD_BOOST,
        }
    }
}

/// A target entity's profile as the scorer needs it: name (split into
/// words for matching), entity type, and the set of domains it is known
/// to control.
#[derive(Debug, Clone)]
pub struct ScoringTarget {
    pub name: String,
    pub entity_type: EntityType,
    pub official_domains: Vec<String>,
}

/// Learned weights the Explorer accumulates over a run (spec §3
/// "Fingerprint / Pattern / Domain", §4.1 "Learned domain-prior weights
/// and URL-regex pattern weights").
#[derive(Debug, Clone, Default)]
pub struct LearnedPriors {
    pub domain_weights: HashMap<String, f64>,
    pub pattern_weights: Vec<(String, f64)>,
}

impl LearnedPriors {
    /// Raises a domain's prior by `amount`, used by the Explorer after a
    /// high-confidence extraction lands from it (spec §4.1 "Dynamic
    /// boost", §4.7j).
    pub fn boost_domain(&mut self, domain: &str, amount: f64) {
        *self.domain_weights.entry(domain.to_string()).or_insert(0.0) += amount;
    }

    fn domain_weight(&self, domain: &str) -> f64 {
        self.domain_weights.get(domain).copied().unwrap_or(0.0)
    }

    fn pattern_weight(&self, url: &str) -> f64 {
        self.pattern_weights
            .iter()
            .filter_map(|(pattern, weight)| {
                Regex::new(pattern).ok().and_then(|re| re.is_match(url).then_some(*weight))
            })
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct ScoreResult {
    pub score: f64,
    pub reason: String,
}

fn second_level_domain(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        Some(parts[parts.len() - 2].to_lowercase())
    } else {
        Some(host.to_lowercase())
    }
}

fn host_of(url: &str) -> Option<String> {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase()))
}

/// Scores a candidate URL (spec §4.1). Deterministic given its inputs.
pub fn score_url(
    url: &str,
    anchor_text: &str,
    depth: u32,
    target: &ScoringTarget,
    priors: &LearnedPriors,
) -> ScoreResult {
    if blacklisted(url) {
        return ScoreResult { score: 0.0, reason: "blacklisted".to_string() };
    }

    let mut score = BASE_SCORE;
    let mut reasons = vec!["base".to_string()];

    let haystack = format!("{} {}", url.to_lowercase(), anchor_text.to_lowercase());
    let name_words: Vec<&str> = target
        .name
        .split_whitespace()
        .filter(|w| w.len() > MIN_NAME_WORD_LEN)
        .collect();
    for word in &name_words {
        if haystack.contains(&word.to_lowercase()) {
            score += NAME_WORD_BOOST;
            reasons.push(format!("name-word:{word}"));
        }
    }

    if let Some(sld) = second_level_domain(url) {
        let canonical_lower = target.name.to_lowercase().replace(' ', "");
        if !sld.is_empty() && canonical_lower.contains(&sld) {
            score += SECOND_LEVEL_DOMAIN_MATCH_BOOST;
            reasons.push("second-level-domain-match".to_string());
        }
    }

    for keyword in target.entity_type.keywords() {
        if haystack.contains(keyword) {
            score += target.entity_type.keyword_boost();
            reasons.push(format!("type-keyword:{keyword}"));
        }
    }

    // Second late-stage name-word pass over the anchor text alone,
    // supplemented from original_source per SPEC_FULL.md §4.1.
    for word in &name_words {
        if anchor_text.to_lowercase().contains(&word.to_lowercase()) {
            score += NAME_WORD_BOOST * 0.3;
            reasons.push(format!("anchor-name-word:{word}"));
        }
    }

    if let Some(host) = host_of(url) {
        let domain_weight = priors.domain_weight(&host);
        if domain_weight != 0.0 {
            score += domain_weight;
            reasons.push(format!("learned-domain-weight:{domain_weight}"));
        }
        if target.official_domains.iter().any(|d| d.eq_ignore_ascii_case(&host)) {
            score += OFFICIAL_DOMAIN_BOOST;
            reasons.push("official-domain".to_string());
        } else if REGISTRY_DOMAINS.iter().any(|d| host.ends_with(d)) {
            reasons.push("registry-domain".to_string());
        }
    }

    let pattern_weight = priors.pattern_weight(url);
    if pattern_weight != 0.0 {
        score += pattern_weight;
        reasons.push(format!("learned-pattern-weight:{pattern_weight}"));
    }

    let depth_penalty = DEPTH_PENALTY_PER_LEVEL * depth as f64;
    score -= depth_penalty;
    reasons.push(format!("depth-penalty:-{depth_penalty}"));

    let clamped = score.clamp(MIN_SCORE, MAX_SCORE);
    ScoreResult { score: clamped, reason: reasons.join(", ") }
}

/// Returns true iff `score_url(...)` clears `threshold` (spec §4.1
/// `should_explore`).
pub fn should_explore(
    url: &str,
    anchor_text: &str,
    depth: u32,
    target: &ScoringTarget,
    priors: &LearnedPriors,
    threshold: f64,
) -> bool {
    score_url(url, anchor_text, depth, target, priors).score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> ScoringTarget {
        ScoringTarget {
            name: "Acme Corporation".to_string(),
            entity_type: EntityType::Company,
            official_domains: vec!["acme.com".to_string()],
        }
    }

    #[test]
    fn blacklisted_schemes_score_zero() {
        let priors = LearnedPriors::default();
        let result = score_url("mailto:foo@acme.com", "", 0, &target(), &priors);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn official_domain_gets_full_boost() {
        let priors = LearnedPriors::default();
        let result = score_url("https://acme.com/about", "About Acme", 0, &target(), &priors);
        assert!(result.score >= BASE_SCORE + OFFICIAL_DOMAIN_BOOST - 1.0);
    }

    #[test]
    fn depth_penalty_reduces_score() {
        let priors = LearnedPriors::default();
        let shallow = score_url("https://other.com/acme", "Acme", 0, &target(), &priors).score;
        let deep = score_url("https://other.com/acme", "Acme", 4, &target(), &priors).score;
        assert!(deep < shallow);
    }

    #[test]
    fn boost_domain_is_additive_and_keyed_by_domain() {
        let mut priors = LearnedPriors::default();
        priors.boost_domain("other.com", 25.0);
        priors.boost_domain("other.com", 25.0);
        assert_eq!(priors.domain_weight("other.com"), 50.0);
        assert_eq!(priors.domain_weight("unrelated.com"), 0.0);
    }

    #[test]
    fn score_clamps_to_150() {
        let mut priors = LearnedPriors::default();
        priors.boost_domain("acme.com", 1000.0);
        let result = score_url("https://acme.com/acme-leadership", "Acme leadership", 0, &target(), &priors);
        assert_eq!(result.score, MAX_SCORE);
    }

    #[test]
    fn should_explore_honors_threshold() {
        let priors = LearnedPriors::default();
        assert!(should_explore("https://acme.com", "Acme", 0, &target(), &priors, 100.0));
        assert!(!should_explore("https://random.com/xyz", "", 5, &target(), &priors, 100.0));
    }
}
