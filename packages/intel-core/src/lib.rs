//! Core of the entity-aware web intelligence platform: the Intelligent
//! Explorer, the Knowledge Store (Relational + Vector), the Entity Graph
//! & Deduplication, and the Retrieval-Augmented Question Answerer (spec
//! §2). Everything outside this crate — CLI, HTTP/JSON API, browser UI,
//! concrete Fetcher/SERP implementations, config loading — is an external
//! collaborator reached only through the traits defined here (spec §1).

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod explorer;
pub mod extractor;
pub mod fetcher;
pub mod frontier;
pub mod gap;
pub mod merger;
pub mod rag;
pub mod scorer;
pub mod serp;
pub mod store;
pub mod task_queue;
pub mod vector;

pub use agent::{
    AgentMode, AgentRunStatus, AgentService, InvestigateReport, InvestigationTask,
    PrioritizedEntity, ReflectGroup, ReflectReport,
};
pub use config::Config;
pub use error::{StoreError, StoreResult, VectorIndexError, VectorResult};
pub use events::{CoreEvent, EventBus, EventEnvelope};
pub use explorer::{Explorer, ExplorerLimits};
pub use fetcher::{FetchError, Fetcher, FetchedPage, NullFetcher};
pub use frontier::{Frontier, FrontierItem};
pub use gap::{analyze as analyze_gaps, GapReport, MissingField};
pub use merger::{canonical, deduplicate_entities, get_or_create_entity, merge_entities};
pub use rag::{RagAnswer, RagAnswerer, RagLimits};
pub use scorer::{score_url, should_explore, EntityType, LearnedPriors, ScoreResult, ScoringTarget};
pub use serp::{NullSerpAdapter, SerpAdapter, SerpError, SerpResult};
pub use store::{PageFilter, RelationalStore, UpsertOutcome};
pub use task_queue::{TaskContext, TaskHandler, TaskQueue};
pub use vector::{PayloadFilter, VectorHit, VectorIndex, VectorPoint};
