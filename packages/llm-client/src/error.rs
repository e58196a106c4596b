//! Error types for the LLM client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors a caller might want to match on. Every variant here corresponds
/// to a "Transient IO" or "Protocol violation" severity tier in the
/// error-handling design (SPEC_FULL.md §7) — orchestration code downgrades
/// these to logged-and-skip outcomes rather than propagating them.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("model endpoint returned an error: {0}")]
    Endpoint(String),

    #[error("response was not valid JSON: {0}")]
    Parse(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}
