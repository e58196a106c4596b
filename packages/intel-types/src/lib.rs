//! Shared data model for the entity-aware web intelligence platform core.
//!
//! Types here are pure data: no IO, no store access. The Relational Store
//! and Vector Index crates read and write these types; they do not own
//! their definitions.

pub mod entity;
pub mod fingerprint;
pub mod hash;
pub mod ids;
pub mod intelligence;
pub mod link;
pub mod page;
pub mod relationship;
pub mod task;

pub use entity::{Entity, EntityMetadata, MergeHistoryEntry, TypeHistoryEntry};
pub use fingerprint::{Domain, Fingerprint, Pattern};
pub use hash::ContentHash;
pub use ids::{AgentRunId, EntityId, IntelId, LinkId, PageId, RelationshipId, TaskId};
pub use intelligence::{Finding, Intelligence};
pub use link::Link;
pub use page::{normalize_url, FetchStatus, Page, PageContent};
pub use relationship::{NodeType, Relationship};
pub use task::{Task, TaskCategory, TaskStatus, MAX_PROGRESS_MESSAGE_LENGTH, RESTART_RECOVERY_REASON};
