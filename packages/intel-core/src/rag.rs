//! RAG Answerer: a multi-phase search loop over the stored graph (spec
//! §4.12) — local hybrid retrieval, thin-snippet expansion, paraphrased
//! retry, then a bounded live crawl, stopping at the first phase whose
//! answer passes the sufficiency gate. Grounded on
//! `original_source/src/garuda_intel/search/handlers.py`'s
//! `perform_rag_search`/`interactive_chat`,
//! `search/snippet_expander.py`'s `expand_snippet_window`/
//! `expand_snippet_hits`, and `search/deduplication.py`'s
//! `_dedupe_payload_hits`/`_aggregate_entities`, recast into the
//! teacher's `Explorer`-as-orchestrator shape: one struct owning the
//! trait objects it needs, one method per phase, driven by a single
//! public entry point.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::warn;
use uuid::Uuid;

use llm_client::{ContextHit, EntityProfile, HitSource, LlmClient, INSUFFICIENT_DATA_SENTINEL};

use crate::events::{CoreEvent, EventBus};
use crate::explorer::{Explorer, ExplorerLimits};
use crate::fetcher::Fetcher;
use crate::serp::{SerpAdapter, SerpResult};
use crate::store::RelationalStore;
use crate::vector::{vector_point_id, VectorHit, VectorIndex, KIND_PAGE_SENTENCE};

/// Snippet-expansion constants, grounded exactly on
/// `original_source/src/garuda_intel/search/snippet_expander.py`'s
/// `_MAX_EXPANSION_ROUNDS` / `_EXPANSION_WINDOW` / `_MIN_SUFFICIENT_LENGTH`
/// (spec §4.12 / SPEC_FULL.md §4.12).
pub const MAX_EXPANSION_ROUNDS: u32 = 4;
pub const EXPANSION_WINDOW: i64 = 2;
pub const MIN_SUFFICIENT_LENGTH: usize = 200;

/// The literal user-visible fallback when even the live-crawl phase
/// fails to produce a sufficient answer (spec §7).
pub const FALLBACK_MESSAGE: &str = "I searched online but still couldn't find a definitive answer.";

/// Phrases that mark an answer as a refusal regardless of what
/// `evaluate_sufficiency` says (spec §4.12 "non-refusal heuristic").
const REFUSAL_PHRASES: &[&str] = &[
    "i don't know",
    "i do not know",
    "i could not find",
    "i couldn't find",
    "no information",
    "not enough information",
    "insufficient data",
    "i am unable to",
    "i'm unable to",
    "cannot find",
    "can't find",
];

/// Payload keys excluded from entity-attribute aggregation because they
/// are identity/cross-reference fields, not attributes (spec §4.12
/// supplement).
const RESERVED_PAYLOAD_KEYS: &[&str] =
    &["kind", "url", "entity", "entity_type", "text", "chunk_index", "sql_page_id", "sql_intel_id", "sql_entity_id"];

#[derive(Debug, Clone)]
pub struct RagLimits {
    pub top_k: usize,
    pub rag_quality_threshold: f64,
    pub min_high_quality_hits: usize,
    pub max_pages_per_chat_crawl: usize,
    pub chat_max_search_cycles: u32,
}

impl Default for RagLimits {
    fn default() -> Self {
        Self {
            top_k: 10,
            rag_quality_threshold: 0.7,
            min_high_quality_hits: 2,
            max_pages_per_chat_crawl: 5,
            chat_max_search_cycles: 3,
        }
    }
}

/// One retrieved piece of context, carried through retrieval, expansion
/// and aggregation before being flattened to an `llm_client::ContextHit`
/// for the final synthesis call.
#[derive(Debug, Clone)]
pub struct Hit {
    pub url: String,
    pub snippet: String,
    pub score: f64,
    pub source: HitSource,
    pub kind: Option<String>,
    pub page_id: Option<Uuid>,
    pub chunk_index: Option<i64>,
    pub point_id: Option<Uuid>,
    pub expanded: bool,
    pub expansion_window: i64,
    pub payload: Map<String, Value>,
}

fn to_context_hit(hit: &Hit) -> ContextHit {
    ContextHit { url: hit.url.clone(), snippet: hit.snippet.clone(), score: hit.score, source: hit.source }
}

#[derive(Debug, Clone, Default)]
pub struct AggregatedEntity {
    pub entity: String,
    pub entity_kind: Option<String>,
    pub attrs: HashMap<String, Vec<Value>>,
    pub sources: Vec<String>,
}

/// Merges entity attributes across hits by `(entity, entity_kind)`,
/// capping each attribute's distinct values at `max_field_vals` while
/// preserving encounter order (spec §4.12 supplement, grounded on
/// `original_source`'s `_aggregate_entities`).
pub fn aggregate_entities(hits: &[Hit], max_field_vals: usize) -> Vec<AggregatedEntity> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), AggregatedEntity> = HashMap::new();

    for hit in hits {
        let Some(entity) = hit.payload.get("entity").and_then(|v| v.as_str()) else { continue };
        let entity_kind = hit.payload.get("entity_type").and_then(|v| v.as_str()).map(str::to_string);
        let key = (entity.to_string(), entity_kind.clone().unwrap_or_default());
        if !groups.contains_key(&key) {
            order.push(key.clone());
            groups.insert(
                key.clone(),
                AggregatedEntity { entity: entity.to_string(), entity_kind: entity_kind.clone(), attrs: HashMap::new(), sources: Vec::new() },
            );
        }
        let group = groups.get_mut(&key).expect("just inserted");

        if !hit.url.is_empty() && !group.sources.contains(&hit.url) {
            group.sources.push(hit.url.clone());
        }

        for (field, value) in &hit.payload {
            if RESERVED_PAYLOAD_KEYS.contains(&field.as_str()) || value.is_null() {
                continue;
            }
            let values = group.attrs.entry(field.clone()).or_default();
            if !values.contains(value) && values.len() < max_field_vals {
                values.push(value.clone());
            }
        }
    }

    order.into_iter().filter_map(|key| groups.remove(&key)).collect()
}

/// Deduplicates by vector point id when present, falling back to a
/// `url`+`kind` composite key (spec §4.12 supplement, grounded on
/// `_dedupe_payload_hits`).
fn dedupe_hits(hits: Vec<Hit>) -> Vec<Hit> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::with_capacity(hits.len());
    for hit in hits {
        let key = match hit.point_id {
            Some(id) => id.to_string(),
            None => format!("{}|{}", hit.url, hit.kind.clone().unwrap_or_default()),
        };
        if seen.insert(key) {
            out.push(hit);
        }
    }
    out
}

/// Deduplicates by URL, keeping the highest-scoring version (spec §4.12
/// Phase 3: "deduplicate by URL keeping the highest-scoring version").
fn dedupe_by_url_keep_best(hits: Vec<Hit>) -> Vec<Hit> {
    let mut best: HashMap<String, Hit> = HashMap::new();
    for hit in hits {
        match best.get(&hit.url) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.url.clone(), hit);
            }
        }
    }
    best.into_values().collect()
}

/// The non-refusal half of the sufficiency gate (spec §4.12: "the answer
/// does not match any of a fixed set of 'I don't know' phrases and is
/// not dominated by non-alphanumeric characters").
fn is_non_refusal(answer: &str) -> bool {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if REFUSAL_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return false;
    }
    let alnum = trimmed.chars().filter(|c| c.is_alphanumeric()).count();
    let total = trimmed.chars().count();
    alnum * 2 >= total
}

fn sanitize_final_answer(answer: &str) -> String {
    if answer.contains(INSUFFICIENT_DATA_SENTINEL) || !is_non_refusal(answer) {
        FALLBACK_MESSAGE.to_string()
    } else {
        answer.to_string()
    }
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub context: Vec<ContextHit>,
    pub aggregated_entities: Vec<AggregatedEntity>,
    pub online_search_triggered: bool,
    pub retry_attempted: bool,
    pub rag_hit_count: usize,
    pub sql_hit_count: usize,
    pub paraphrased_queries: Vec<String>,
}

pub struct RagAnswerer {
    llm: Arc<dyn LlmClient>,
    vector_index: Arc<dyn VectorIndex>,
    store: Arc<dyn RelationalStore>,
    serp: Arc<dyn SerpAdapter>,
    explorer: Explorer,
    events: EventBus,
}

impl RagAnswerer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        vector_index: Arc<dyn VectorIndex>,
        store: Arc<dyn RelationalStore>,
        fetcher: Arc<dyn Fetcher>,
        serp: Arc<dyn SerpAdapter>,
        events: EventBus,
    ) -> Self {
        let explorer = Explorer::new(fetcher, llm.clone(), vector_index.clone(), store.clone(), events.clone());
        Self { llm, vector_index, store, serp, explorer, events }
    }

    /// Answers `question`, optionally scoped to `entity_name` (spec
    /// §4.12). Always returns a `RagAnswer` — a cancelled run simply
    /// stops escalating and returns whatever it has.
    pub async fn answer(&self, question: &str, entity_name: Option<&str>, limits: &RagLimits, cancel: Arc<AtomicBool>) -> RagAnswer {
        let mut hits = self.retrieve(question, limits.top_k).await;
        hits = self.expand_thin_snippets(hits).await;

        if let Some(answer) = self.try_synthesize(question, &hits).await {
            return self.finish(answer, hits, false, false, Vec::new());
        }

        let mut paraphrased_queries = Vec::new();
        let retry_attempted = self.high_quality_count(&hits, limits.rag_quality_threshold) < limits.min_high_quality_hits;

        if retry_attempted {
            for _cycle in 0..limits.chat_max_search_cycles.max(1) {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let alt_queries = self.llm.paraphrase_query(question).await.unwrap_or_default();
                paraphrased_queries.extend(alt_queries.iter().cloned());

                let mut round_hits = Vec::new();
                for alt in &alt_queries {
                    round_hits.extend(self.retrieve(alt, limits.top_k).await);
                }
                round_hits = self.expand_thin_snippets(round_hits).await;
                hits = dedupe_by_url_keep_best(hits.into_iter().chain(round_hits).collect());

                if let Some(answer) = self.try_synthesize(question, &hits).await {
                    return self.finish(answer, hits, false, true, paraphrased_queries);
                }
                if self.high_quality_count(&hits, limits.rag_quality_threshold) >= limits.min_high_quality_hits {
                    break;
                }
            }
        }

        // Phase 4: live crawl fallback (spec §4.12).
        let seed_entity = entity_name.unwrap_or("General Research");
        let seed_queries = self.llm.generate_seed_queries(question, seed_entity).await.unwrap_or_default();
        let candidate_urls = self.resolve_candidate_urls(&seed_queries).await;

        if candidate_urls.is_empty() {
            warn!(question, "RAG Phase 4 found no candidate URLs from the SERP adapter");
        } else {
            let profile = EntityProfile::new(seed_entity, "topic");
            let crawl_limits = ExplorerLimits {
                max_pages_per_domain: limits.max_pages_per_chat_crawl,
                max_total_pages: limits.max_pages_per_chat_crawl,
                max_depth: 1,
                score_threshold: 0.0,
                use_llm_link_rank: false,
            };
            self.explorer.explore(&profile, &candidate_urls, &crawl_limits, cancel).await;

            let mut fresh_hits = self.retrieve(question, limits.top_k).await;
            fresh_hits = self.expand_thin_snippets(fresh_hits).await;
            hits = dedupe_by_url_keep_best(hits.into_iter().chain(fresh_hits).collect());
        }

        let raw_answer = self.synthesize(question, &hits).await;
        let answer = sanitize_final_answer(&raw_answer);
        self.finish(answer, hits, true, retry_attempted, paraphrased_queries)
    }

    /// Phase 1 (spec §4.12): embed the question and query the Vector
    /// Index; in parallel, keyword-search Intelligence. Hits are merged
    /// with vector hits first (spec: "prioritizing vector hits") and
    /// deduplicated.
    async fn retrieve(&self, query: &str, top_k: usize) -> Vec<Hit> {
        let (vector_hits, sql_hits) = tokio::join!(self.vector_retrieve(query, top_k), self.keyword_retrieve(query));
        dedupe_hits(vector_hits.into_iter().chain(sql_hits).collect())
    }

    async fn vector_retrieve(&self, query: &str, top_k: usize) -> Vec<Hit> {
        let Ok(embedding) = self.llm.embed(query).await else { return Vec::new() };
        if embedding.is_empty() {
            return Vec::new();
        }
        let hits = self.vector_index.search(&embedding, top_k, None).await.unwrap_or_default();
        hits.into_iter().map(hit_from_vector).collect()
    }

    async fn keyword_retrieve(&self, query: &str) -> Vec<Hit> {
        let intel = self.store.search_intelligence_by_text(query).await.unwrap_or_default();
        let mut hits = Vec::with_capacity(intel.len());
        for item in intel {
            let page_url = self.store.get_page(item.page_id.0).await.ok().flatten().map(|p| p.url).unwrap_or_default();
            let entity = self.store.get_entity(item.entity_id.0).await.ok().flatten();
            let snippet = item.findings.iter().map(|f| format!("{f:?}")).collect::<Vec<_>>().join(" ");

            let mut payload = Map::new();
            payload.insert("kind".to_string(), json!("intelligence"));
            payload.insert("sql_intel_id".to_string(), json!(item.id.0.to_string()));
            payload.insert("sql_entity_id".to_string(), json!(item.entity_id.0.to_string()));
            payload.insert("sql_page_id".to_string(), json!(item.page_id.0.to_string()));
            if let Some(entity) = &entity {
                payload.insert("entity".to_string(), json!(entity.name));
                payload.insert("entity_type".to_string(), json!(entity.kind));
                for (key, value) in &entity.data {
                    payload.insert(key.clone(), value.clone());
                }
            }

            hits.push(Hit {
                url: page_url,
                snippet,
                score: item.confidence as f64 / 100.0,
                source: HitSource::Sql,
                kind: Some("intelligence".to_string()),
                page_id: Some(item.page_id.0),
                chunk_index: None,
                point_id: None,
                expanded: false,
                expansion_window: 0,
                payload,
            });
        }
        hits
    }

    /// Phase 2 (spec §4.12): widen each thin sentence-level snippet's
    /// window until it reaches `MIN_SUFFICIENT_LENGTH` or no more
    /// neighbours exist, bounded by `MAX_EXPANSION_ROUNDS`. Non-snippet
    /// hits pass through unchanged.
    async fn expand_thin_snippets(&self, hits: Vec<Hit>) -> Vec<Hit> {
        let mut out = Vec::with_capacity(hits.len());
        for hit in hits {
            let is_snippet = hit.kind.as_deref() == Some(KIND_PAGE_SENTENCE) && hit.chunk_index.is_some();
            if is_snippet {
                out.push(self.expand_snippet_window(hit).await);
            } else {
                out.push(hit);
            }
        }
        out
    }

    async fn expand_snippet_window(&self, hit: Hit) -> Hit {
        let (Some(chunk_index), false) = (hit.chunk_index, hit.url.is_empty()) else { return hit };

        let mut seen: HashSet<i64> = HashSet::from([chunk_index]);
        let mut before: Vec<(i64, String)> = Vec::new();
        let mut after: Vec<(i64, String)> = Vec::new();
        let mut current_window: i64 = 0;
        let mut expanded = false;
        let mut snippet_text = hit.snippet.clone();

        for _round in 0..MAX_EXPANSION_ROUNDS {
            current_window += EXPANSION_WINDOW;
            let mut new_found = false;

            for idx in (chunk_index - current_window)..=(chunk_index + current_window) {
                if idx < 0 || seen.contains(&idx) {
                    continue;
                }
                let point_id = vector_point_id(&hit.url, KIND_PAGE_SENTENCE, idx as usize);
                let Ok(Some(point)) = self.vector_index.get(point_id).await else { continue };
                seen.insert(idx);
                new_found = true;
                expanded = true;
                let text = point.payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                if idx < chunk_index {
                    before.push((idx, text));
                } else {
                    after.push((idx, text));
                }
            }

            if !new_found {
                break;
            }

            before.sort_by_key(|(idx, _)| *idx);
            after.sort_by_key(|(idx, _)| *idx);
            snippet_text = before
                .iter()
                .map(|(_, t)| t.as_str())
                .chain(std::iter::once(hit.snippet.as_str()))
                .chain(after.iter().map(|(_, t)| t.as_str()))
                .collect::<Vec<_>>()
                .join(" ");

            if snippet_text.len() >= MIN_SUFFICIENT_LENGTH {
                break;
            }
        }

        if !expanded {
            return hit;
        }

        let mut payload = hit.payload.clone();
        payload.insert("text".to_string(), json!(snippet_text));
        Hit { snippet: snippet_text, expanded: true, expansion_window: current_window, payload, ..hit }
    }

    async fn resolve_candidate_urls(&self, seed_queries: &[String]) -> Vec<String> {
        let mut urls = Vec::new();
        for query in seed_queries {
            if urls.len() >= 5 {
                break;
            }
            let results: Vec<SerpResult> = self.serp.search(query, 5).await.unwrap_or_default();
            for result in results {
                if urls.len() >= 5 {
                    break;
                }
                if !urls.contains(&result.href) {
                    urls.push(result.href);
                }
            }
        }
        urls
    }

    async fn synthesize(&self, question: &str, hits: &[Hit]) -> String {
        let context: Vec<ContextHit> = hits.iter().map(to_context_hit).collect();
        self.llm.synthesize_answer(question, &context).await.unwrap_or_else(|err| {
            warn!(error = %err, "synthesize_answer failed");
            INSUFFICIENT_DATA_SENTINEL.to_string()
        })
    }

    /// Synthesizes an answer and checks it against the sufficiency gate
    /// (spec §4.12: `evaluate_sufficiency` AND the non-refusal
    /// heuristic); `None` if no phase should stop here yet.
    async fn try_synthesize(&self, question: &str, hits: &[Hit]) -> Option<String> {
        if hits.is_empty() {
            return None;
        }
        let answer = self.synthesize(question, hits).await;
        if answer == INSUFFICIENT_DATA_SENTINEL || !is_non_refusal(&answer) {
            return None;
        }
        match self.llm.evaluate_sufficiency(&answer).await {
            Ok(true) => Some(answer),
            _ => None,
        }
    }

    fn high_quality_count(&self, hits: &[Hit], threshold: f64) -> usize {
        hits.iter().filter(|h| h.source == HitSource::Rag && h.score >= threshold).count()
    }

    fn finish(&self, answer: String, hits: Vec<Hit>, online_search_triggered: bool, retry_attempted: bool, paraphrased_queries: Vec<String>) -> RagAnswer {
        let rag_hit_count = hits.iter().filter(|h| h.source == HitSource::Rag).count();
        let sql_hit_count = hits.iter().filter(|h| h.source == HitSource::Sql).count();
        let aggregated_entities = aggregate_entities(&hits, 10);
        let context = hits.iter().map(to_context_hit).collect();
        self.events.publish(CoreEvent::RagQueryAnswered { online_search_triggered, retry_attempted });
        RagAnswer { answer, context, aggregated_entities, online_search_triggered, retry_attempted, rag_hit_count, sql_hit_count, paraphrased_queries }
    }
}

fn hit_from_vector(hit: VectorHit) -> Hit {
    let payload = hit.point.payload.clone();
    let url = payload.get("url").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let snippet = payload.get("text").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    Hit {
        url,
        snippet,
        score: hit.score as f64,
        source: HitSource::Rag,
        kind: hit.point.kind().map(str::to_string),
        page_id: hit.point.page_id(),
        chunk_index: hit.point.chunk_index(),
        point_id: Some(hit.point.id),
        expanded: false,
        expansion_window: 0,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_client::testing::MockLlmClient;

    use crate::fetcher::{FetchError, FetchedPage};
    use crate::serp::SerpError;
    use crate::store::memory::InMemoryStore;
    use crate::vector::memory::InMemoryVectorIndex;
    use crate::vector::{VectorPoint, KIND_PAGE_RAW};

    struct StaticFetcher {
        html: String,
    }

    #[async_trait::async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage { url: url.to_string(), html: self.html.clone() })
        }
    }

    struct StaticSerp {
        href: String,
    }

    #[async_trait::async_trait]
    impl SerpAdapter for StaticSerp {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SerpResult>, SerpError> {
            Ok(vec![SerpResult { href: self.href.clone(), title: None, body: None }])
        }
    }

    fn answerer(
        llm: MockLlmClient,
        vector_index: Arc<InMemoryVectorIndex>,
        store: Arc<InMemoryStore>,
        fetcher: Arc<dyn Fetcher>,
        serp: Arc<dyn SerpAdapter>,
    ) -> RagAnswerer {
        RagAnswerer::new(Arc::new(llm), vector_index, store, fetcher, serp, EventBus::new())
    }

    #[tokio::test]
    async fn sufficient_phase_one_answer_skips_escalation() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        vector_index
            .upsert(
                VectorPoint::new(Uuid::new_v4(), vec![1.0, 0.0])
                    .with_payload("kind", json!("page_sentence"))
                    .with_payload("url", json!("https://acme.com"))
                    .with_payload("text", json!("Acme was founded in 1999.")),
            )
            .await
            .unwrap();
        let store = Arc::new(InMemoryStore::new());
        let llm = MockLlmClient {
            embed_response: vec![1.0, 0.0],
            synthesize_response: "Acme was founded in 1999.".to_string(),
            sufficiency_response: true,
            ..MockLlmClient::new()
        };
        let answerer = answerer(
            llm,
            vector_index,
            store,
            Arc::new(crate::fetcher::NullFetcher),
            Arc::new(crate::serp::NullSerpAdapter),
        );

        let result = answerer
            .answer("When was Acme founded?", None, &RagLimits::default(), Arc::new(AtomicBool::new(false)))
            .await;

        assert_eq!(result.answer, "Acme was founded in 1999.");
        assert!(!result.online_search_triggered);
        assert!(!result.retry_attempted);
    }

    #[tokio::test]
    async fn empty_store_escalates_through_all_phases_and_finds_an_answer() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryStore::new());
        let fetcher: Arc<dyn Fetcher> = Arc::new(StaticFetcher {
            html: "<html><head><title>Microsoft</title></head><body>Bill Gates founded Microsoft in 1975. \
                   Microsoft is a technology company."
                .to_string(),
        });
        let serp: Arc<dyn SerpAdapter> = Arc::new(StaticSerp { href: "https://microsoft-history.example/about".to_string() });
        let llm = MockLlmClient {
            embed_response: vec![1.0, 0.0, 0.0],
            seed_queries_response: vec!["who founded microsoft".to_string()],
            synthesize_response: "Bill Gates founded Microsoft.".to_string(),
            sufficiency_response: false,
            ..MockLlmClient::new()
        };
        let answerer = answerer(llm, vector_index, store, fetcher, serp);

        let result = answerer
            .answer("Who founded Microsoft?", Some("Microsoft"), &RagLimits::default(), Arc::new(AtomicBool::new(false)))
            .await;

        assert!(result.online_search_triggered);
        assert!(result.retry_attempted);
        assert_eq!(result.answer, "Bill Gates founded Microsoft.");
        assert_ne!(result.answer, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn no_candidates_anywhere_falls_back_to_user_visible_message() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryStore::new());
        let llm = MockLlmClient { synthesize_response: String::new(), ..MockLlmClient::new() };
        let answerer = answerer(
            llm,
            vector_index,
            store,
            Arc::new(crate::fetcher::NullFetcher),
            Arc::new(crate::serp::NullSerpAdapter),
        );

        let result = answerer
            .answer("What is the capital of nowhere?", None, &RagLimits::default(), Arc::new(AtomicBool::new(false)))
            .await;

        assert_eq!(result.answer, FALLBACK_MESSAGE);
        assert!(!result.answer.contains(INSUFFICIENT_DATA_SENTINEL));
    }

    #[tokio::test]
    async fn thin_snippet_expands_to_neighbouring_sentences() {
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let url = "https://acme.com/about";
        for (idx, text) in [
            "Acme was founded in a garage.",
            "Short.",
            "It grew into a large company over several decades of steady expansion.",
        ]
        .into_iter()
        .enumerate()
        {
            vector_index
                .upsert(
                    VectorPoint::new(vector_point_id(url, KIND_PAGE_SENTENCE, idx), vec![1.0, 0.0])
                        .with_payload("kind", json!(KIND_PAGE_SENTENCE))
                        .with_payload("url", json!(url))
                        .with_payload("chunk_index", json!(idx as i64))
                        .with_payload("text", json!(text)),
                )
                .await
                .unwrap();
        }
        let store = Arc::new(InMemoryStore::new());
        let llm = MockLlmClient::new();
        let answerer = answerer(
            llm,
            vector_index,
            store,
            Arc::new(crate::fetcher::NullFetcher),
            Arc::new(crate::serp::NullSerpAdapter),
        );

        let thin_hit = Hit {
            url: url.to_string(),
            snippet: "Short.".to_string(),
            score: 0.9,
            source: HitSource::Rag,
            kind: Some(KIND_PAGE_SENTENCE.to_string()),
            page_id: None,
            chunk_index: Some(1),
            point_id: Some(vector_point_id(url, KIND_PAGE_SENTENCE, 1)),
            expanded: false,
            expansion_window: 0,
            payload: Map::new(),
        };

        let expanded = answerer.expand_snippet_window(thin_hit).await;
        assert!(expanded.expanded);
        assert!(expanded.snippet.len() >= MIN_SUFFICIENT_LENGTH || expanded.snippet.contains("garage"));
        assert!(expanded.snippet.contains("Short."));
    }

    #[test]
    fn dedupe_prefers_point_id_over_url_kind() {
        let shared_id = Uuid::new_v4();
        let hits = vec![
            Hit {
                url: "https://acme.com".to_string(),
                snippet: "a".to_string(),
                score: 1.0,
                source: HitSource::Rag,
                kind: Some("page_title".to_string()),
                page_id: None,
                chunk_index: None,
                point_id: Some(shared_id),
                expanded: false,
                expansion_window: 0,
                payload: Map::new(),
            },
            Hit {
                url: "https://acme.com".to_string(),
                snippet: "b".to_string(),
                score: 0.5,
                source: HitSource::Rag,
                kind: Some("page_title".to_string()),
                page_id: None,
                chunk_index: None,
                point_id: Some(shared_id),
                expanded: false,
                expansion_window: 0,
                payload: Map::new(),
            },
        ];
        let deduped = dedupe_hits(hits);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].snippet, "a");
    }

    #[test]
    fn aggregate_entities_caps_values_and_preserves_order() {
        let mut hits = Vec::new();
        for (entity, kind, field_val, url) in [
            ("Acme", "company", "founder-a", "https://acme.com/1"),
            ("Acme", "company", "founder-b", "https://acme.com/2"),
            ("Acme", "company", "founder-c", "https://acme.com/3"),
            ("Zenith", "company", "founder-z", "https://zenith.com/1"),
        ] {
            let mut payload = Map::new();
            payload.insert("entity".to_string(), json!(entity));
            payload.insert("entity_type".to_string(), json!(kind));
            payload.insert("founder".to_string(), json!(field_val));
            hits.push(Hit {
                url: url.to_string(),
                snippet: String::new(),
                score: 1.0,
                source: HitSource::Rag,
                kind: Some("entity".to_string()),
                page_id: None,
                chunk_index: None,
                point_id: Some(Uuid::new_v4()),
                expanded: false,
                expansion_window: 0,
                payload,
            });
        }

        let aggregated = aggregate_entities(&hits, 2);
        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated[0].entity, "Acme");
        assert_eq!(aggregated[0].attrs["founder"].len(), 2);
        assert_eq!(aggregated[0].sources.len(), 3);
        assert_eq!(aggregated[1].entity, "Zenith");
    }

    #[test]
    fn non_refusal_heuristic_rejects_fixed_phrases_and_symbol_soup() {
        assert!(!is_non_refusal("I'm unable to find that."));
        assert!(!is_non_refusal("???...---"));
        assert!(!is_non_refusal(""));
        assert!(is_non_refusal("Bill Gates founded Microsoft in 1975."));
    }

    #[test]
    fn sanitize_replaces_sentinel_but_keeps_real_answers() {
        assert_eq!(sanitize_final_answer(INSUFFICIENT_DATA_SENTINEL), FALLBACK_MESSAGE);
        assert_eq!(sanitize_final_answer("Redmond, Washington."), "Redmond, Washington.");
    }
}
