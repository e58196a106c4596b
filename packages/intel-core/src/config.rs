//! Runtime configuration (SPEC_FULL.md §10.3).
//!
//! Every option enumerated in spec.md §6, each overridable via an
//! environment variable, following the teacher's `GARUDA_*`-with-
//! bare-fallback pattern from `original_source/config.py` (e.g.
//! `GARUDA_OLLAMA_URL` falling back to `OLLAMA_URL` falling back to a
//! literal default), generalized to one `INTEL_` prefix with a
//! bare-fallback read. Loaded via `dotenvy`, matching the teacher's
//! workspace dependency. Configuration *loading* beyond this (file
//! formats, secret management) is out of scope per spec.md §1.

use std::env;
use std::time::Duration;

/// Reads `INTEL_{name}`, falling back to bare `{name}`, falling back to
/// `default`.
fn env_or(name: &str, default: &str) -> String {
    env::var(format!("INTEL_{name}"))
        .or_else(|_| env::var(name))
        .unwrap_or_else(|_| default.to_string())
}

fn env_or_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env_or(name, "")
        .parse()
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    // LLM / embedding endpoints
    pub ollama_url: String,
    pub model: String,
    pub embedding_model: String,

    // Vector index
    pub vector_index_url: String,
    pub vector_collection: String,
    pub embedding_dim: usize,

    // Retrieval
    pub top_k: usize,
    pub chat_max_search_cycles: u32,
    pub max_pages_per_chat_crawl: usize,
    pub rag_quality_threshold: f64,
    pub min_high_quality_hits: usize,

    // Agent Service
    pub agent_max_exploration_depth: u32,
    pub entity_merge_threshold: f64,
    pub priority_weight_unknown: f64,
    pub priority_weight_relation: f64,

    // Crawl / Explorer
    pub crawl_score_threshold: f64,
    pub max_pages_per_domain: usize,
    pub max_total_pages: usize,
    pub max_depth: u32,
    pub seed_limit: usize,

    // LLM timeouts & retries
    pub llm_summarize_timeout: Duration,
    pub llm_extract_timeout: Duration,
    pub llm_reflect_timeout: Duration,
    pub llm_json_retries: u32,

    // Task Queue
    pub task_queue_worker_count: usize,
    pub task_queue_poll_interval: Duration,

    // Relational store
    pub database_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434/api/generate".to_string(),
            model: "llama3".to_string(),
            embedding_model: "nomic-embed-text".to_string(),

            vector_index_url: "http://localhost:6333".to_string(),
            vector_collection: "intel".to_string(),
            embedding_dim: 384,

            top_k: 10,
            chat_max_search_cycles: 3,
            max_pages_per_chat_crawl: 5,
            rag_quality_threshold: 0.7,
            min_high_quality_hits: 2,

            agent_max_exploration_depth: 3,
            entity_merge_threshold: 0.85,
            priority_weight_unknown: 0.7,
            priority_weight_relation: 0.3,

            crawl_score_threshold: 35.0,
            max_pages_per_domain: 10,
            max_total_pages: 50,
            max_depth: 2,
            seed_limit: 25,

            llm_summarize_timeout: Duration::from_secs(900),
            llm_extract_timeout: Duration::from_secs(900),
            llm_reflect_timeout: Duration::from_secs(300),
            llm_json_retries: 3,

            task_queue_worker_count: 4,
            task_queue_poll_interval: Duration::from_secs(2),

            database_url: "postgres://localhost/intel".to_string(),
        }
    }
}

impl Config {
    /// Loads `.env` (if present, via `dotenvy`) then builds a `Config`
    /// from environment variables layered over the defaults above.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        Self {
            ollama_url: env_or("OLLAMA_URL", &defaults.ollama_url),
            model: env_or("OLLAMA_MODEL", &defaults.model),
            embedding_model: env_or("EMBEDDING_MODEL", &defaults.embedding_model),

            vector_index_url: env_or("VECTOR_INDEX_URL", &defaults.vector_index_url),
            vector_collection: env_or("VECTOR_COLLECTION", &defaults.vector_collection),
            embedding_dim: env_or_parse("EMBEDDING_DIM", defaults.embedding_dim),

            top_k: env_or_parse("TOP_K", defaults.top_k),
            chat_max_search_cycles: env_or_parse(
                "CHAT_MAX_SEARCH_CYCLES",
                defaults.chat_max_search_cycles,
            ),
            max_pages_per_chat_crawl: env_or_parse(
                "MAX_PAGES_PER_CHAT_CRAWL",
                defaults.max_pages_per_chat_crawl,
            ),
            rag_quality_threshold: env_or_parse(
                "RAG_QUALITY_THRESHOLD",
                defaults.rag_quality_threshold,
            ),
            min_high_quality_hits: env_or_parse(
                "MIN_HIGH_QUALITY_HITS",
                defaults.min_high_quality_hits,
            ),

            agent_max_exploration_depth: env_or_parse(
                "AGENT_MAX_EXPLORATION_DEPTH",
                defaults.agent_max_exploration_depth,
            ),
            entity_merge_threshold: env_or_parse(
                "ENTITY_MERGE_THRESHOLD",
                defaults.entity_merge_threshold,
            ),
            priority_weight_unknown: env_or_parse(
                "PRIORITY_WEIGHT_UNKNOWN",
                defaults.priority_weight_unknown,
            ),
            priority_weight_relation: env_or_parse(
                "PRIORITY_WEIGHT_RELATION",
                defaults.priority_weight_relation,
            ),

            crawl_score_threshold: env_or_parse(
                "CRAWL_SCORE_THRESHOLD",
                defaults.crawl_score_threshold,
            ),
            max_pages_per_domain: env_or_parse(
                "MAX_PAGES_PER_DOMAIN",
                defaults.max_pages_per_domain,
            ),
            max_total_pages: env_or_parse("MAX_TOTAL_PAGES", defaults.max_total_pages),
            max_depth: env_or_parse("MAX_DEPTH", defaults.max_depth),
            seed_limit: env_or_parse("SEED_LIMIT", defaults.seed_limit),

            llm_summarize_timeout: Duration::from_secs(env_or_parse(
                "LLM_SUMMARIZE_TIMEOUT_SECS",
                defaults.llm_summarize_timeout.as_secs(),
            )),
            llm_extract_timeout: Duration::from_secs(env_or_parse(
                "LLM_EXTRACT_TIMEOUT_SECS",
                defaults.llm_extract_timeout.as_secs(),
            )),
            llm_reflect_timeout: Duration::from_secs(env_or_parse(
                "LLM_REFLECT_TIMEOUT_SECS",
                defaults.llm_reflect_timeout.as_secs(),
            )),
            llm_json_retries: env_or_parse("LLM_JSON_RETRIES", defaults.llm_json_retries),

            task_queue_worker_count: env_or_parse(
                "TASK_QUEUE_WORKER_COUNT",
                defaults.task_queue_worker_count,
            ),
            task_queue_poll_interval: Duration::from_millis(env_or_parse(
                "TASK_QUEUE_POLL_INTERVAL_MS",
                defaults.task_queue_poll_interval.as_millis() as u64,
            )),

            database_url: env_or("DATABASE_URL", &defaults.database_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = Config::default();
        assert_eq!(config.top_k, 10);
        assert_eq!(config.chat_max_search_cycles, 3);
        assert_eq!(config.max_pages_per_chat_crawl, 5);
        assert_eq!(config.rag_quality_threshold, 0.7);
        assert_eq!(config.min_high_quality_hits, 2);
        assert_eq!(config.agent_max_exploration_depth, 3);
        assert_eq!(config.entity_merge_threshold, 0.85);
        assert_eq!((config.priority_weight_unknown, config.priority_weight_relation), (0.7, 0.3));
        assert_eq!(config.crawl_score_threshold, 35.0);
        assert_eq!(config.max_pages_per_domain, 10);
        assert_eq!(config.max_total_pages, 50);
        assert_eq!(config.max_depth, 2);
        assert_eq!(config.seed_limit, 25);
    }
}
