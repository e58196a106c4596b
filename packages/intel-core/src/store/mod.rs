//! Relational Store: transactional persistence for Page, PageContent,
//! Entity, Intelligence, Relationship, Link and Task (spec §3, §4.6).
//! The trait is generic over no associated types (unlike the teacher's
//! `CrawlerStorage`, which parameterizes ids) because every id in this
//! crate's data model is already a concrete `Uuid` newtype — the
//! flexibility the teacher's associated types buy isn't needed here.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use intel_types::{Entity, Intelligence, Link, NodeType, Page, PageContent, Relationship, Task, TaskCategory};

use crate::error::StoreResult;

/// Filters for `RelationalStore::list_pages` (spec §4.6 "list with
/// filters and sort").
#[derive(Debug, Clone, Default)]
pub struct PageFilter {
    pub domain_key: Option<String>,
    pub page_type: Option<String>,
    pub limit: Option<usize>,
}

/// Result of an upsert-style write, distinguishing insert from update the
/// way the teacher's `UpsertResult` / `xmax = 0` pattern does (spec §4.6).
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    pub was_inserted: bool,
}

#[async_trait]
pub trait RelationalStore: Send + Sync {
    // ---- Pages ----------------------------------------------------
    async fn save_page(&self, page: &Page) -> StoreResult<UpsertOutcome>;
    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>>;
    async fn get_page_by_url(&self, url: &str) -> StoreResult<Option<Page>>;
    async fn list_pages(&self, filter: &PageFilter) -> StoreResult<Vec<Page>>;
    async fn save_page_content(&self, content: &PageContent) -> StoreResult<()>;
    async fn get_page_content(&self, page_id: Uuid) -> StoreResult<Option<PageContent>>;

    // ---- Intelligence -----------------------------------------------
    /// Saves `intel` and emits a `has_intel` relationship
    /// `entity -> intelligence` (spec §4.6 "auto-link to source page and
    /// primary entity").
    async fn save_intelligence(&self, intel: &Intelligence) -> StoreResult<()>;
    async fn get_intelligence(&self, id: Uuid) -> StoreResult<Option<Intelligence>>;
    async fn search_intelligence_by_entity_name(&self, name: &str) -> StoreResult<Vec<Intelligence>>;
    async fn search_intelligence_by_text(&self, needle: &str) -> StoreResult<Vec<Intelligence>>;
    async fn list_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<Vec<Intelligence>>;
    async fn reassign_intelligence_entity(&self, from_entity: Uuid, to_entity: Uuid) -> StoreResult<()>;
    async fn tombstone_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<()>;

    // ---- Entities -----------------------------------------------------
    async fn get_entity(&self, id: Uuid) -> StoreResult<Option<Entity>>;
    async fn find_entity_by_identity(&self, canonical_name: &str, normalized_kind: &str) -> StoreResult<Option<Entity>>;
    async fn find_entities_by_name_like(&self, pattern: &str) -> StoreResult<Vec<Entity>>;
    async fn find_entities_by_kind(&self, kind: &str) -> StoreResult<Vec<Entity>>;
    /// All entities not tombstoned by a merge (spec §3 invariant 2).
    async fn list_live_entities(&self) -> StoreResult<Vec<Entity>>;
    async fn save_entity(&self, entity: &Entity) -> StoreResult<()>;

    // ---- Relationships --------------------------------------------
    /// Idempotent on `(source_id, target_id, relation_type)`: repeated
    /// calls increment `occurrence_count` and never decrease confidence
    /// (spec §3 invariant, §8 "Idempotent relationship upsert").
    async fn upsert_relationship(
        &self,
        source_id: Uuid,
        source_type: NodeType,
        target_id: Uuid,
        target_type: NodeType,
        relation_type: &str,
        confidence: f64,
        source_url: Option<&str>,
    ) -> StoreResult<Relationship>;
    async fn delete_relationship(&self, id: Uuid) -> StoreResult<()>;
    async fn list_relationships_for(&self, node_id: Uuid) -> StoreResult<Vec<Relationship>>;
    /// Repoints every relationship whose source or target is `from` to
    /// `to` instead, dropping any rewrite that would duplicate an
    /// existing relationship rather than inserting a second row (spec
    /// §4.9 step 5).
    async fn rewire_relationships(&self, from: Uuid, to: Uuid) -> StoreResult<()>;
    /// Connected components over the live entity graph (spec §4.6 "list
    /// clusters of connected entities by connected-components").
    async fn connected_components(&self) -> StoreResult<Vec<Vec<Uuid>>>;

    // ---- Links --------------------------------------------------------
    /// Saves a batch of links; for each whose endpoints are both known
    /// Pages, also emits a `page_link` Relationship (spec §4.6).
    async fn save_links(&self, links: &[Link]) -> StoreResult<()>;

    // ---- Tasks ----------------------------------------------------
    async fn submit_task(&self, task: &Task) -> StoreResult<()>;
    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>>;
    async fn list_tasks(&self) -> StoreResult<Vec<Task>>;
    async fn update_task(&self, task: &Task) -> StoreResult<()>;
    /// Pops the highest-priority pending task for the given category
    /// (priority desc, created-at asc), marking none — the caller marks
    /// it running once claimed (spec §4.11).
    async fn next_pending_task(&self, category: Option<TaskCategory>) -> StoreResult<Option<Task>>;
    /// Crash recovery: every task left `running` transitions to `failed`
    /// with `RESTART_RECOVERY_REASON` (spec §3, §4.11, §8).
    async fn recover_running_tasks(&self) -> StoreResult<usize>;
}
