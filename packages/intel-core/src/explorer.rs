//! Intelligent Explorer: the orchestrator that drives
//! fetch -> extract -> reflect -> store -> enqueue (spec §4.7). Grounded
//! on `original_source/src/explorer/engine.py`'s
//! `IntelligentExplorer.explore`, recast into the teacher's
//! `crawl_site`-style free function (`intelligent-crawler/src/crawler.rs`)
//! that takes trait objects for the fetcher, LLM client, vector index and
//! relational store rather than owning concrete clients. A single
//! logical worker drives the loop (spec §4.7 "Main loop (single logical
//! worker; parallelism optional, see §5)"); see DESIGN.md for why this
//! crate does not parallelize per-URL fetch/extract within one run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use intel_types::{Finding, Intelligence, Link, Page, PageContent};
use llm_client::{CandidateFinding, EntityProfile, LinkCandidate, LlmClient};

use crate::events::{CoreEvent, EventBus};
use crate::extractor::{self, ExtractedContent};
use crate::fetcher::Fetcher;
use crate::frontier::Frontier;
use crate::merger;
use crate::scorer::{self, EntityType, LearnedPriors, ScoringTarget};
use crate::store::RelationalStore;
use crate::vector::{vector_point_id, PayloadFilter, VectorIndex, VectorPoint, KIND_ENTITY, KIND_FINDING, KIND_PAGE_DESCRIPTION, KIND_PAGE_RAW, KIND_PAGE_SENTENCE, KIND_PAGE_SUMMARY, KIND_PAGE_TITLE, KIND_PAGE_URL};

/// `(intel_id, entity_id)` of one finding that survived reflection and was
/// persisted, carried through to `build_page_embeddings` so finding/entity
/// vector points can reference their SQL rows (spec §4.5 cross-reference
/// payload fields).
type PersistedFinding = (CandidateFinding, Uuid, Uuid);

/// Similarity above which a page is treated as a semantic near-duplicate
/// of one already indexed and is skipped entirely (spec §4.7g).
pub const NEAR_DUPLICATE_THRESHOLD: f32 = 0.96;

/// Domain prior boost applied after a high-confidence extraction lands
/// (spec §4.7j).
pub const HIGH_CONFIDENCE_DOMAIN_BOOST: f64 = 25.0;

/// How many characters of a page's text are embedded for prior-context
/// retrieval (spec §4.7f: "embed a prefix of the text").
const PRIOR_CONTEXT_PREFIX_LEN: usize = 2000;

/// Cap on how many outlinks get an LLM rank call per page (spec §4.7k).
const LLM_RANK_CAP: usize = 15;

/// Cap on per-page sentence vectors (spec §4.5 "N≈40").
const MAX_SENTENCE_VECTORS: usize = 40;

#[derive(Debug, Clone)]
pub struct ExplorerLimits {
    pub max_pages_per_domain: usize,
    pub max_total_pages: usize,
    pub max_depth: u32,
    pub score_threshold: f64,
    pub use_llm_link_rank: bool,
}

impl Default for ExplorerLimits {
    fn default() -> Self {
        Self {
            max_pages_per_domain: 10,
            max_total_pages: 50,
            max_depth: 2,
            score_threshold: 35.0,
            use_llm_link_rank: false,
        }
    }
}

pub struct Explorer {
    fetcher: Arc<dyn Fetcher>,
    llm: Arc<dyn LlmClient>,
    vector_index: Arc<dyn VectorIndex>,
    store: Arc<dyn RelationalStore>,
    events: EventBus,
}

impl Explorer {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        llm: Arc<dyn LlmClient>,
        vector_index: Arc<dyn VectorIndex>,
        store: Arc<dyn RelationalStore>,
        events: EventBus,
    ) -> Self {
        Self { fetcher, llm, vector_index, store, events }
    }

    /// Runs the main loop (spec §4.7 steps 1-3), returning the map
    /// `url -> page-record` of everything actually explored (semantic
    /// near-duplicate skips are not included: spec §8 scenario 4).
    pub async fn explore(
        &self,
        profile: &EntityProfile,
        seed_urls: &[String],
        limits: &ExplorerLimits,
        cancel: Arc<AtomicBool>,
    ) -> HashMap<String, Page> {
        let mut frontier = Frontier::new();
        let mut priors = LearnedPriors::default();
        let target = scoring_target(profile);

        for url in seed_urls {
            let result = scorer::score_url(url, "", 0, &target, &priors);
            frontier.push(result.score, 0, url.clone(), "");
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut domain_counts: HashMap<String, usize> = HashMap::new();
        let mut explored: HashMap<String, Page> = HashMap::new();

        while explored.len() < limits.max_total_pages && !frontier.is_empty() {
            if cancel.load(AtomicOrdering::Relaxed) {
                info!("explorer run cancelled");
                break;
            }

            let Some(item) = frontier.pop() else { break };
            let normalized = intel_types::page::normalize_url(&item.url);

            if visited.contains(&normalized) || item.depth > limits.max_depth {
                continue;
            }
            let domain = host_of(&item.url);
            if domain_counts.get(&domain).copied().unwrap_or(0) >= limits.max_pages_per_domain {
                continue;
            }

            visited.insert(normalized);
            *domain_counts.entry(domain.clone()).or_insert(0) += 1;

            self.events.publish(CoreEvent::PageFetchStarted { url: item.url.clone(), depth: item.depth });

            if let Some(page) = self
                .process_page(profile, &target, &mut priors, &item.url, item.depth, item.score, &domain, limits, &mut frontier)
                .await
            {
                explored.insert(item.url.clone(), page);
            }
        }

        explored
    }

    /// One page's worth of the loop body (spec §4.7d-k). Returns `None`
    /// when the page was skipped as a semantic near-duplicate (spec
    /// §4.7g) so it is not counted toward `pages_explored`.
    #[allow(clippy::too_many_arguments)]
    async fn process_page(
        &self,
        profile: &EntityProfile,
        target: &ScoringTarget,
        priors: &mut LearnedPriors,
        url: &str,
        depth: u32,
        inherited_score: f64,
        domain: &str,
        limits: &ExplorerLimits,
        frontier: &mut Frontier,
    ) -> Option<Page> {
        let fetched = match self.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(err) => {
                warn!(url, error = %err, "fetch failed, continuing with empty content");
                self.events.publish(CoreEvent::PageFetchFailed { url: url.to_string(), reason: err.to_string() });
                crate::fetcher::FetchedPage { url: url.to_string(), html: String::new() }
            }
        };

        let extracted = extractor::extract(&fetched.html, url);

        // Prior-context retrieval (spec §4.7f): avoid duplicating
        // already-known findings about this entity.
        let prefix: String = extracted.clean_text.chars().take(PRIOR_CONTEXT_PREFIX_LEN).collect();
        let prior_intel = self.retrieve_prior_context(profile, &prefix).await;

        // Semantic near-duplicate gate (spec §4.7g).
        if !extracted.clean_text.is_empty() {
            let full_embedding = self.llm.embed(&extracted.clean_text).await.unwrap_or_default();
            if !full_embedding.is_empty() {
                let filter = PayloadFilter::new().eq("kind", json!(KIND_PAGE_RAW));
                if let Ok(hits) = self.vector_index.search(&full_embedding, 1, Some(&filter)).await {
                    if let Some(top) = hits.first() {
                        if top.score > NEAR_DUPLICATE_THRESHOLD {
                            debug!(url, similarity = %top.score, "skipping semantic near-duplicate page");
                            self.events.publish(CoreEvent::PageSkippedDuplicate {
                                url: url.to_string(),
                                similarity: top.score,
                            });
                            return None;
                        }
                    }
                }
                let point_id = vector_point_id(url, KIND_PAGE_RAW, 0);
                let point = VectorPoint::new(point_id, full_embedding)
                    .with_payload("kind", json!(KIND_PAGE_RAW))
                    .with_payload("url", json!(url));
                let _ = self.vector_index.upsert(point).await;
            }
        }

        let page = Page::new(url, domain, depth, inherited_score);
        let mut page = page;
        page.page_type = extracted.page_type.clone();
        page.fetch_status = if fetched.html.is_empty() {
            intel_types::FetchStatus::Failed
        } else {
            intel_types::FetchStatus::Ok
        };
        page.last_fetched_at = Some(Utc::now());
        page.text_length = extracted.clean_text.len();

        let (kept_findings, high_confidence) = self
            .extract_and_reflect(profile, &extracted, &page, &prior_intel)
            .await;

        let page_content = PageContent::new(page.id, fetched.html, extracted.clean_text.clone());
        if let Err(err) = self.store.save_page(&page).await {
            warn!(url, error = %err, "failed to save page");
        }
        if let Err(err) = self.store.save_page_content(&page_content).await {
            warn!(url, error = %err, "failed to save page content");
        }

        let mut persisted_findings = Vec::new();
        for (finding, confidence) in &kept_findings {
            if let Some((intel_id, entity_id)) = self.persist_finding(profile, &page, finding, *confidence).await {
                persisted_findings.push((finding.clone(), intel_id, entity_id));
            }
        }

        self.build_page_embeddings(&page, &extracted, profile, &persisted_findings).await;

        if high_confidence {
            priors.boost_domain(domain, HIGH_CONFIDENCE_DOMAIN_BOOST);
        }

        self.events.publish(CoreEvent::PageExplored {
            url: url.to_string(),
            page_type: page.page_type.clone(),
            findings: kept_findings.len(),
        });

        self.enqueue_outlinks(profile, target, priors, &page, &extracted, limits, frontier).await;

        Some(page)
    }

    async fn retrieve_prior_context(&self, profile: &EntityProfile, prefix: &str) -> Vec<String> {
        if prefix.is_empty() {
            return Vec::new();
        }
        let Ok(embedding) = self.llm.embed(prefix).await else { return Vec::new() };
        if embedding.is_empty() {
            return Vec::new();
        }
        let filter = PayloadFilter::new()
            .eq("kind", json!(KIND_FINDING))
            .eq("entity", json!(profile.name.clone()));
        let hits = self.vector_index.search(&embedding, 5, Some(&filter)).await.unwrap_or_default();
        hits.into_iter()
            .filter_map(|hit| hit.point.payload.get("text").and_then(|v| v.as_str()).map(str::to_string))
            .collect()
    }

    /// extract_intelligence + reflect_and_verify gating (spec §4.7h).
    /// Returns the kept findings and whether any cleared a
    /// high-confidence bar worth a domain boost.
    async fn extract_and_reflect(
        &self,
        profile: &EntityProfile,
        extracted: &ExtractedContent,
        page: &Page,
        prior_intel: &[String],
    ) -> (Vec<(CandidateFinding, u8)>, bool) {
        if extracted.clean_text.is_empty() {
            return (Vec::new(), false);
        }
        let candidates = match self
            .llm
            .extract_intelligence(profile, &extracted.clean_text, &extracted.page_type, &page.url, prior_intel)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(url = %page.url, error = %err, "extraction failed, continuing with no findings");
                return (Vec::new(), false);
            }
        };

        let mut kept = Vec::new();
        let mut high_confidence = false;
        for candidate in candidates {
            match self.llm.reflect_and_verify(profile, &candidate).await {
                Ok(reflection) if reflection.should_keep() => {
                    if reflection.confidence >= llm_client::KEEP_CONFIDENCE_THRESHOLD {
                        high_confidence = true;
                    }
                    kept.push((candidate, reflection.confidence));
                }
                Ok(_) => debug!(url = %page.url, "candidate finding discarded by reflection"),
                Err(err) => warn!(url = %page.url, error = %err, "reflection failed, discarding candidate"),
            }
        }
        (kept, high_confidence)
    }

    /// Saves a kept finding as Intelligence and upserts any sub-entity it
    /// names via the Entity Merger (spec §4.7h-i). Returns the
    /// `(intel_id, entity_id)` pair it wrote, for the caller to carry into
    /// per-finding vector payloads; `None` if persistence failed.
    async fn persist_finding(
        &self,
        profile: &EntityProfile,
        page: &Page,
        candidate: &CandidateFinding,
        confidence: u8,
    ) -> Option<(Uuid, Uuid)> {
        let (primary_entity, _) =
            match merger::get_or_create_entity(self.store.as_ref(), &profile.name, &profile.kind, HashMap::new())
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "failed to resolve primary entity");
                    return None;
                }
            };

        let intel = Intelligence::new(page.id, primary_entity.id, confidence, vec![candidate.finding.clone()]);
        if let Err(err) = self.store.save_intelligence(&intel).await {
            warn!(error = %err, "failed to save intelligence");
            return None;
        }

        if let Some((name, kind, data)) = sub_entity_of(&candidate.finding) {
            if let Err(err) = merger::get_or_create_entity(self.store.as_ref(), &name, &kind, data).await {
                warn!(error = %err, "failed to upsert derived sub-entity");
            }
        }

        Some((intel.id.0, primary_entity.id.0))
    }

    /// The elaborate `build_embeddings_for_page` variant (spec §9:
    /// authoritative over the source's trivial alternative):
    /// title/description/summary/url/sentence/finding/entity views.
    async fn build_page_embeddings(
        &self,
        page: &Page,
        extracted: &ExtractedContent,
        profile: &EntityProfile,
        persisted_findings: &[PersistedFinding],
    ) {
        let mut points = Vec::new();

        if let Some(title) = extracted.metadata.get("title").and_then(|v| v.as_str()) {
            if let Ok(vector) = self.llm.embed(title).await {
                points.push(
                    VectorPoint::new(vector_point_id(&page.url, KIND_PAGE_TITLE, 0), vector)
                        .with_payload("kind", json!(KIND_PAGE_TITLE))
                        .with_payload("url", json!(page.url))
                        .with_payload("entity", json!(profile.name))
                        .with_payload("entity_type", json!(profile.kind))
                        .with_payload("sql_page_id", json!(page.id.0.to_string())),
                );
            }
        }

        if let Some(description) = extracted
            .metadata
            .get("description")
            .or_else(|| extracted.metadata.get("og:description"))
            .and_then(|v| v.as_str())
        {
            if let Ok(vector) = self.llm.embed(description).await {
                points.push(
                    VectorPoint::new(vector_point_id(&page.url, KIND_PAGE_DESCRIPTION, 0), vector)
                        .with_payload("kind", json!(KIND_PAGE_DESCRIPTION))
                        .with_payload("url", json!(page.url))
                        .with_payload("entity", json!(profile.name))
                        .with_payload("sql_page_id", json!(page.id.0.to_string())),
                );
            }
        }

        if !extracted.clean_text.is_empty() {
            if let Ok(summary) = self.llm.summarize_page(&extracted.clean_text).await {
                if let Ok(vector) = self.llm.embed(&summary).await {
                    points.push(
                        VectorPoint::new(vector_point_id(&page.url, KIND_PAGE_SUMMARY, 0), vector)
                            .with_payload("kind", json!(KIND_PAGE_SUMMARY))
                            .with_payload("url", json!(page.url))
                            .with_payload("entity", json!(profile.name))
                            .with_payload("sql_page_id", json!(page.id.0.to_string())),
                    );
                }
            }
        }

        if let Ok(vector) = self.llm.embed(&page.url).await {
            points.push(
                VectorPoint::new(vector_point_id(&page.url, KIND_PAGE_URL, 0), vector)
                    .with_payload("kind", json!(KIND_PAGE_URL))
                    .with_payload("url", json!(page.url))
                    .with_payload("sql_page_id", json!(page.id.0.to_string())),
            );
        }

        let sentences = extractor::split_sentences(&extracted.clean_text);
        for (index, sentence) in sentences.iter().take(MAX_SENTENCE_VECTORS).enumerate() {
            if let Ok(vector) = self.llm.embed(sentence).await {
                points.push(
                    VectorPoint::new(vector_point_id(&page.url, KIND_PAGE_SENTENCE, index), vector)
                        .with_payload("kind", json!(KIND_PAGE_SENTENCE))
                        .with_payload("url", json!(page.url))
                        .with_payload("chunk_index", json!(index as i64))
                        .with_payload("text", json!(sentence))
                        .with_payload("sql_page_id", json!(page.id.0.to_string())),
                );
            }
        }

        for (ordinal, (candidate, intel_id, entity_id)) in persisted_findings.iter().enumerate() {
            let finding_text = format!("{:?}", candidate.finding);
            if let Ok(vector) = self.llm.embed(&finding_text).await {
                points.push(
                    VectorPoint::new(vector_point_id(&page.url, KIND_FINDING, ordinal), vector)
                        .with_payload("kind", json!(KIND_FINDING))
                        .with_payload("url", json!(page.url))
                        .with_payload("entity", json!(profile.name))
                        .with_payload("text", json!(finding_text))
                        .with_payload("sql_page_id", json!(page.id.0.to_string()))
                        .with_payload("sql_intel_id", json!(intel_id.to_string()))
                        .with_payload("sql_entity_id", json!(entity_id.to_string())),
                );
            }

            if let Ok(vector) = self.llm.embed(&profile.name).await {
                points.push(
                    VectorPoint::new(vector_point_id(&page.url, KIND_ENTITY, ordinal), vector)
                        .with_payload("kind", json!(KIND_ENTITY))
                        .with_payload("entity", json!(profile.name))
                        .with_payload("sql_entity_id", json!(entity_id.to_string())),
                );
            }
        }

        if let Err(err) = self.vector_index.upsert_batch(points).await {
            warn!(url = %page.url, error = %err, "failed to upsert page embeddings");
        }
    }

    /// Enqueues outlinks (spec §4.7k): optional LLM ranking, heuristic
    /// scoring, `max(heuristic, llm)`, pushed when `>= score_threshold`.
    async fn enqueue_outlinks(
        &self,
        profile: &EntityProfile,
        target: &ScoringTarget,
        priors: &LearnedPriors,
        page: &Page,
        extracted: &ExtractedContent,
        limits: &ExplorerLimits,
        frontier: &mut Frontier,
    ) {
        if page.depth >= limits.max_depth {
            return;
        }

        let mut llm_scores: HashMap<String, u8> = HashMap::new();
        if limits.use_llm_link_rank && !extracted.outlinks.is_empty() {
            let candidates: Vec<LinkCandidate> = extracted
                .outlinks
                .iter()
                .take(LLM_RANK_CAP)
                .map(|link| LinkCandidate { url: link.url.clone(), anchor_text: link.anchor_text.clone() })
                .collect();
            let page_ctx = extracted.clean_text.chars().take(500).collect::<String>();
            if let Ok(ranked) = self.llm.rank_links(profile, &page_ctx, &candidates).await {
                for ranked_link in ranked {
                    llm_scores.insert(ranked_link.url, ranked_link.llm_score);
                }
            }
        }

        let mut links_to_save = Vec::new();
        for outlink in &extracted.outlinks {
            let resolved_url = resolve_against(&page.url, &outlink.url);
            let heuristic = scorer::score_url(&resolved_url, &outlink.anchor_text, page.depth + 1, target, priors);
            let llm_score = llm_scores.get(&outlink.url).copied().unwrap_or(0) as f64;
            let final_score = heuristic.score.max(llm_score);

            links_to_save.push(Link::new(
                page.url.clone(),
                resolved_url.clone(),
                outlink.anchor_text.clone(),
                heuristic.reason.clone(),
                final_score,
                page.depth + 1,
            ));

            if final_score >= limits.score_threshold {
                frontier.push(final_score, page.depth + 1, resolved_url, outlink.anchor_text.clone());
            }
        }
        if let Err(err) = self.store.save_links(&links_to_save).await {
            warn!(url = %page.url, error = %err, "failed to save links");
        }
    }
}

fn resolve_against(base: &str, link: &str) -> String {
    url::Url::parse(base)
        .and_then(|b| b.join(link))
        .map(|joined| joined.to_string())
        .unwrap_or_else(|_| link.to_string())
}

fn host_of(url: &str) -> String {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default()
}

fn scoring_target(profile: &EntityProfile) -> ScoringTarget {
    let entity_type = match profile.kind.as_str() {
        "person" | "ceo" | "founder" | "cto" | "chairman" => EntityType::Person,
        "news" => EntityType::News,
        "topic" => EntityType::Topic,
        "company" | "org" => EntityType::Company,
        _ => EntityType::Other,
    };
    ScoringTarget {
        name: profile.name.clone(),
        entity_type,
        official_domains: profile.official_domains.clone(),
    }
}

/// Extracts a sub-entity `(name, kind, data)` from a finding, for
/// `get_or_create_entity` (spec §4.7h "collect derived sub-entities").
fn sub_entity_of(finding: &Finding) -> Option<(String, String, HashMap<String, Value>)> {
    match finding {
        Finding::Person { name, role, .. } => {
            let mut data = HashMap::new();
            if let Some(role) = role {
                data.insert("title".to_string(), json!(role));
            }
            Some((name.clone(), "person".to_string(), data))
        }
        Finding::Location { label, address, .. } => {
            let mut data = HashMap::new();
            if let Some(address) = address {
                data.insert("address".to_string(), json!(address));
            }
            Some((label.clone(), "location".to_string(), data))
        }
        Finding::Product { name, description, .. } => {
            let mut data = HashMap::new();
            if let Some(description) = description {
                data.insert("description".to_string(), json!(description));
            }
            Some((name.clone(), "product".to_string(), data))
        }
        Finding::Event { label, .. } => Some((label.clone(), "event".to_string(), HashMap::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm_client::testing::MockLlmClient;
    use std::sync::atomic::AtomicBool;

    use crate::fetcher::{FetchError, FetchedPage};
    use crate::store::memory::InMemoryStore;
    use crate::vector::memory::InMemoryVectorIndex;

    struct StaticFetcher {
        html: String,
    }

    #[async_trait::async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage { url: url.to_string(), html: self.html.clone() })
        }
    }

    fn profile() -> EntityProfile {
        let mut profile = EntityProfile::new("Acme Corporation", "company");
        profile.official_domains = vec!["acme.com".to_string()];
        profile
    }

    #[tokio::test]
    async fn explores_seed_and_records_page() {
        let fetcher = Arc::new(StaticFetcher {
            html: "<html><head><title>Acme</title></head><body>Acme builds things.</body></html>".to_string(),
        });
        let llm = Arc::new(MockLlmClient::new());
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryStore::new());
        let explorer = Explorer::new(fetcher, llm, vector_index, store.clone(), EventBus::new());

        let limits = ExplorerLimits { score_threshold: 0.0, ..Default::default() };
        let explored = explorer
            .explore(&profile(), &["https://acme.com".to_string()], &limits, Arc::new(AtomicBool::new(false)))
            .await;

        assert_eq!(explored.len(), 1);
        let page = store.get_page_by_url("https://acme.com").await.unwrap();
        assert!(page.is_some());
    }

    #[tokio::test]
    async fn near_duplicate_second_url_is_not_counted() {
        let fetcher = Arc::new(StaticFetcher {
            html: "<html><body>Identical content every time, long enough to embed meaningfully.</body></html>"
                .to_string(),
        });
        let llm = Arc::new(MockLlmClient { embed_response: vec![1.0, 0.0, 0.0], ..MockLlmClient::new() });
        let vector_index = Arc::new(InMemoryVectorIndex::new());
        let store = Arc::new(InMemoryStore::new());
        let explorer = Explorer::new(fetcher, llm, vector_index, store, EventBus::new());

        let limits = ExplorerLimits { score_threshold: 0.0, ..Default::default() };
        let seeds = vec!["https://acme.com/a".to_string(), "https://acme.com/b".to_string()];
        let explored = explorer.explore(&profile(), &seeds, &limits, Arc::new(AtomicBool::new(false))).await;

        assert_eq!(explored.len(), 1);
    }
}
