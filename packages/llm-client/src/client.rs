use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chunk::{merge_chunk_summaries, split_into_chunks};
use crate::error::{LlmError, Result};
use crate::types::{
    CandidateFinding, ContextHit, EntityProfile, LinkCandidate, RankedLink, RankedSearchResult,
    ReflectResult, SearchCandidate,
};

/// Collects every model-dependent operation behind one contract (spec
/// §4.4), so orchestration code (Explorer, RAG Answerer, Agent Service)
/// depends only on this trait and can be driven against a mock in tests,
/// the same way `intelligent-crawler` abstracts `AIDetector`/
/// `AIExtractor`/`AIRelationshipResolver` rather than a concrete HTTP
/// client.
///
/// Every operation MUST be tolerant of a malformed reply: a non-JSON or
/// schema-mismatched response is a failed operation, never a panic or a
/// bubbled fatal error (spec §4.4, §7 "Protocol violation").
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn summarize_page(&self, text: &str) -> Result<String>;

    async fn extract_intelligence(
        &self,
        profile: &EntityProfile,
        text: &str,
        page_type: &str,
        url: &str,
        prior_intel: &[String],
    ) -> Result<Vec<CandidateFinding>>;

    async fn reflect_and_verify(
        &self,
        profile: &EntityProfile,
        finding: &CandidateFinding,
    ) -> Result<ReflectResult>;

    async fn rank_links(
        &self,
        profile: &EntityProfile,
        page_ctx: &str,
        links: &[LinkCandidate],
    ) -> Result<Vec<RankedLink>>;

    async fn generate_seed_queries(&self, question: &str, entity: &str) -> Result<Vec<String>>;

    async fn rank_search_results(
        &self,
        profile: &EntityProfile,
        candidates: &[SearchCandidate],
    ) -> Result<Vec<RankedSearchResult>>;

    async fn paraphrase_query(&self, question: &str) -> Result<Vec<String>>;

    async fn synthesize_answer(&self, question: &str, hits: &[ContextHit]) -> Result<String>;

    async fn evaluate_sufficiency(&self, answer: &str) -> Result<bool>;
}

/// Size above which `summarize_page` splits the input, summarizes chunks
/// in parallel, then summarizes the concatenation of chunk summaries
/// (spec §4.4 "Hierarchical summarization").
const SUMMARIZE_CHUNK_SIZE: usize = 6_000;

/// Default bound on `generate_json` retries, mirroring
/// `intel_core::Config::llm_json_retries`'s default (spec §7: "retry is
/// performed only for LLM JSON-parse errors (bounded retries)").
const DEFAULT_JSON_RETRIES: u32 = 3;

/// Ollama-shaped generate endpoint: `POST {model, prompt, stream, format}`
/// -> `{response: "<string>"}` (see SPEC_FULL.md §4.4, grounded on
/// `original_source/src/garuda_intel/config.py`'s `ollama_url`/
/// `ollama_model`). Built the way the teacher's `OpenAIClient` is built —
/// a `reqwest::Client` plus base url plus `tracing` instrumentation on
/// every call — but against this simpler single-endpoint contract.
#[derive(Clone)]
pub struct OllamaLlmClient {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    embedding_model: String,
    timeout: Duration,
    json_retries: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaLlmClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            embedding_model: embedding_model.into(),
            timeout: Duration::from_secs(900),
            json_retries: DEFAULT_JSON_RETRIES,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Bounds how many times `generate_json` re-issues a request after a
    /// JSON-parse failure (spec §7), mirroring
    /// `intel_core::Config::llm_json_retries`.
    pub fn with_json_retries(mut self, retries: u32) -> Self {
        self.json_retries = retries;
        self
    }

    /// Sends one generate request. `format_json = true` requests a JSON
    /// response body; callers of non-JSON operations (summaries,
    /// paraphrase lists rendered as plain text) pass `false`.
    async fn generate(&self, prompt: String, format_json: bool) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: format_json.then_some("json"),
        };

        let response = self
            .http_client
            .post(&self.base_url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "LLM generate request failed");
                LlmError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "LLM endpoint returned an error");
            return Err(LlmError::Endpoint(format!("status {status}: {body}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        debug!(model = %self.model, format_json, "LLM generate completed");
        Ok(parsed.response)
    }

    /// `format_json = true` requests, then parses, a JSON reply. A
    /// malformed reply re-issues the same request up to `json_retries`
    /// more times; any other failure (network, endpoint) is returned
    /// immediately, unretried (spec §7: "retry is performed only for LLM
    /// JSON-parse errors (bounded retries)").
    async fn generate_json<T: for<'de> Deserialize<'de>>(&self, prompt: String) -> Result<T> {
        let mut attempt = 0;
        loop {
            let raw = self.generate(prompt.clone(), true).await?;
            match serde_json::from_str(&raw) {
                Ok(parsed) => return Ok(parsed),
                Err(e) if attempt < self.json_retries => {
                    attempt += 1;
                    warn!(attempt, retries = self.json_retries, error = %e, "LLM reply failed to parse as JSON, retrying");
                }
                Err(e) => return Err(LlmError::Parse(format!("{e}: {raw}"))),
            }
        }
    }
}

#[async_trait]
impl LlmClient for OllamaLlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Deserialize)]
        struct EmbedResponse {
            embedding: Vec<f32>,
        }
        let request = serde_json::json!({ "model": self.embedding_model, "prompt": text });
        let response = self
            .http_client
            .post(self.base_url.replace("/generate", "/embeddings"))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(LlmError::Endpoint(format!("embedding status {}", response.status())));
        }
        let parsed: EmbedResponse = response.json().await.map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(parsed.embedding)
    }

    async fn summarize_page(&self, text: &str) -> Result<String> {
        if text.len() <= SUMMARIZE_CHUNK_SIZE {
            let prompt = format!(
                "Summarize the following page content in 3-5 sentences:\n\n{text}"
            );
            return self.generate(prompt, false).await;
        }

        // Hierarchical summarization: chunk, summarize each chunk
        // (safe to parallelize, summarize/embed are pure per spec §9),
        // then summarize the concatenation of chunk summaries.
        let chunks = split_into_chunks(text, SUMMARIZE_CHUNK_SIZE);
        let mut futures = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let prompt = format!("Summarize the following excerpt in 3-5 sentences:\n\n{chunk}");
            futures.push(self.generate(prompt, false));
        }
        let chunk_summaries: Vec<String> = futures::future::join_all(futures)
            .await
            .into_iter()
            .filter_map(|r| r.ok())
            .collect();

        let combined = merge_chunk_summaries(&chunk_summaries);
        let prompt = format!("Summarize the following summaries in 3-5 sentences:\n\n{combined}");
        self.generate(prompt, false).await
    }

    async fn extract_intelligence(
        &self,
        profile: &EntityProfile,
        text: &str,
        page_type: &str,
        url: &str,
        prior_intel: &[String],
    ) -> Result<Vec<CandidateFinding>> {
        let prompt = format!(
            "Extract structured facts about \"{}\" ({}) from this {page_type} page at {url}.\n\
             Known prior intel:\n{}\n\nPage text:\n{text}",
            profile.name,
            profile.kind,
            prior_intel.join("\n"),
        );
        let value: Value = self.generate_json(prompt).await?;
        Ok(parse_candidate_findings(&value))
    }

    async fn reflect_and_verify(
        &self,
        profile: &EntityProfile,
        finding: &CandidateFinding,
    ) -> Result<ReflectResult> {
        let prompt = format!(
            "Does this candidate finding about \"{}\" hold up? Respond as JSON \
             {{\"verified\": bool, \"confidence\": 0-100, \"reason\": string}}.\n\n{:?}",
            profile.name, finding.finding
        );
        self.generate_json(prompt).await
    }

    async fn rank_links(
        &self,
        profile: &EntityProfile,
        page_ctx: &str,
        links: &[LinkCandidate],
    ) -> Result<Vec<RankedLink>> {
        let prompt = format!(
            "Given context \"{page_ctx}\" about \"{}\", score each link 0-100 for relevance. \
             Respond as a JSON array of {{url, anchor_text, llm_score}}.\n\n{:?}",
            profile.name, links
        );
        self.generate_json(prompt).await
    }

    async fn generate_seed_queries(&self, question: &str, entity: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Generate 3 paraphrased search queries for the question \"{question}\" about \
             \"{entity}\". Respond as a JSON array of strings."
        );
        self.generate_json(prompt).await
    }

    async fn rank_search_results(
        &self,
        profile: &EntityProfile,
        candidates: &[SearchCandidate],
    ) -> Result<Vec<RankedSearchResult>> {
        let prompt = format!(
            "Rank these search results for relevance to \"{}\" and flag whether each looks like \
             an official source. Respond as a JSON array of {{href, title, body, is_official}}.\n\n{:?}",
            profile.name, candidates
        );
        self.generate_json(prompt).await
    }

    async fn paraphrase_query(&self, question: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Give 2-3 alternative phrasings of this question, as a JSON array of strings: \
             \"{question}\""
        );
        self.generate_json(prompt).await
    }

    async fn synthesize_answer(&self, question: &str, hits: &[ContextHit]) -> Result<String> {
        let context = hits
            .iter()
            .map(|h| format!("[{}] {}", h.url, h.snippet))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!(
            "Answer the question using only the context below. If the context is insufficient, \
             respond with exactly the text INSUFFICIENT_DATA.\n\nQuestion: {question}\n\nContext:\n{context}"
        );
        self.generate(prompt, false).await
    }

    async fn evaluate_sufficiency(&self, answer: &str) -> Result<bool> {
        let prompt = format!(
            "Does this answer sufficiently address the question it was given? Respond as JSON \
             {{\"sufficient\": bool}}.\n\nAnswer: {answer}"
        );
        #[derive(Deserialize)]
        struct Sufficiency {
            sufficient: bool,
        }
        let parsed: Sufficiency = self.generate_json(prompt).await?;
        Ok(parsed.sufficient)
    }
}

fn parse_candidate_findings(value: &Value) -> Vec<CandidateFinding> {
    // A malformed or unexpected-shape reply demotes to an empty result
    // rather than failing the whole operation (spec §7 "Protocol
    // violation ... demote to empty result, log, continue").
    serde_json::from_value::<Vec<CandidateFinding>>(value.clone()).unwrap_or_default()
}
