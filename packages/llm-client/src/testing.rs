//! Mock `LlmClient` for tests, in the teacher's `MockAIDetector`/
//! `MockCrawler` style: a hand-written struct implementing the trait,
//! configurable via fields set before use.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::client::LlmClient;
use crate::error::Result;
use crate::types::{
    CandidateFinding, ContextHit, EntityProfile, LinkCandidate, RankedLink, RankedSearchResult,
    ReflectResult, SearchCandidate,
};

/// Returns canned responses configured up front; records call counts for
/// assertions. Unconfigured operations return harmless defaults rather
/// than panicking, since most tests only care about one or two calls.
#[derive(Default)]
pub struct MockLlmClient {
    pub embed_response: Vec<f32>,
    pub summarize_response: String,
    pub extract_response: Vec<CandidateFinding>,
    pub reflect_response: Mutex<Vec<ReflectResult>>,
    pub rank_links_response: Vec<RankedLink>,
    pub seed_queries_response: Vec<String>,
    pub rank_search_response: Vec<RankedSearchResult>,
    pub paraphrase_response: Vec<String>,
    pub synthesize_response: String,
    pub sufficiency_response: bool,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues results returned by successive `reflect_and_verify` calls,
    /// in order — useful for tests that exercise several candidates.
    pub fn queue_reflect_results(&self, results: Vec<ReflectResult>) {
        *self.reflect_response.lock().unwrap() = results;
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_response.clone())
    }

    async fn summarize_page(&self, _text: &str) -> Result<String> {
        Ok(self.summarize_response.clone())
    }

    async fn extract_intelligence(
        &self,
        _profile: &EntityProfile,
        _text: &str,
        _page_type: &str,
        _url: &str,
        _prior_intel: &[String],
    ) -> Result<Vec<CandidateFinding>> {
        Ok(self.extract_response.clone())
    }

    async fn reflect_and_verify(
        &self,
        _profile: &EntityProfile,
        _finding: &CandidateFinding,
    ) -> Result<ReflectResult> {
        let mut queue = self.reflect_response.lock().unwrap();
        if queue.is_empty() {
            Ok(ReflectResult {
                verified: false,
                confidence: 0,
                reason: "no mock response queued".to_string(),
            })
        } else {
            Ok(queue.remove(0))
        }
    }

    async fn rank_links(
        &self,
        _profile: &EntityProfile,
        _page_ctx: &str,
        _links: &[LinkCandidate],
    ) -> Result<Vec<RankedLink>> {
        Ok(self.rank_links_response.clone())
    }

    async fn generate_seed_queries(&self, _question: &str, _entity: &str) -> Result<Vec<String>> {
        Ok(self.seed_queries_response.clone())
    }

    async fn rank_search_results(
        &self,
        _profile: &EntityProfile,
        _candidates: &[SearchCandidate],
    ) -> Result<Vec<RankedSearchResult>> {
        Ok(self.rank_search_response.clone())
    }

    async fn paraphrase_query(&self, _question: &str) -> Result<Vec<String>> {
        Ok(self.paraphrase_response.clone())
    }

    async fn synthesize_answer(&self, _question: &str, _hits: &[ContextHit]) -> Result<String> {
        Ok(self.synthesize_response.clone())
    }

    async fn evaluate_sufficiency(&self, _answer: &str) -> Result<bool> {
        Ok(self.sufficiency_response)
    }
}
