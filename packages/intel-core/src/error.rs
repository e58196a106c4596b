//! Error types for the core crate.
//!
//! Following the teacher's split (SPEC_FULL.md §7/§10.2): library-boundary
//! concerns (the Relational Store, the Vector Index) expose `thiserror`
//! enums callers can match on, the way `openai-client::error::OpenAIError`
//! and `intelligent-crawler`'s `CrawlerStorage::Error` do. Orchestration
//! code (Explorer, Agent Service, RAG Answerer, Task Queue) works in
//! `anyhow::Result` and downgrades Transient IO / Protocol violation /
//! Data validation failures to logged-and-continue outcomes rather than
//! propagating them.

use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;
pub type VectorResult<T> = std::result::Result<T, VectorIndexError>;

/// Errors from the Relational Store (spec §4.6, §7).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors from the Vector Index (spec §4.5, §7).
#[derive(Debug, Error)]
pub enum VectorIndexError {
    #[error("network error: {0}")]
    Network(String),

    #[error("endpoint error: {0}")]
    Endpoint(String),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("serialization error: {0}")]
    Serialization(String),
}
