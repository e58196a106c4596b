//! Client for every model-dependent operation the intelligence platform
//! relies on (embeddings, summaries, extraction, reflection, ranking,
//! answer synthesis), collected behind one trait (spec §4.4).

pub mod chunk;
pub mod client;
pub mod error;
pub mod testing;
pub mod types;

pub use client::{LlmClient, OllamaLlmClient};
pub use error::{LlmError, Result};
pub use types::{
    CandidateFinding, ContextHit, EntityProfile, HitSource, LinkCandidate, RankedLink,
    RankedSearchResult, ReflectResult, SearchCandidate, INSUFFICIENT_DATA_SENTINEL,
    KEEP_CONFIDENCE_THRESHOLD,
};
