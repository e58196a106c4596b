//! In-memory `RelationalStore`, in the teacher's `MockStorage` style (a
//! single `Mutex`-guarded struct of maps) — used for tests and for
//! running the Explorer/Agent/RAG Answerer without a live Postgres
//! instance. A single mutex trivially satisfies the "concurrent writers
//! serialized per row" requirement (spec §5) since it serializes all
//! writes.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use intel_types::{
    Entity, Intelligence, Link, NodeType, Page, PageContent, Relationship, Task, TaskCategory,
    TaskStatus, RESTART_RECOVERY_REASON,
};

use super::{PageFilter, RelationalStore, UpsertOutcome};
use crate::error::{StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    pages: HashMap<Uuid, Page>,
    page_by_url: HashMap<String, Uuid>,
    page_contents: HashMap<Uuid, PageContent>,
    entities: HashMap<Uuid, Entity>,
    intelligence: HashMap<Uuid, Intelligence>,
    relationships: HashMap<Uuid, Relationship>,
    relationship_index: HashMap<(Uuid, Uuid, String), Uuid>,
    tasks: HashMap<Uuid, Task>,
    links: Vec<Link>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelationalStore for InMemoryStore {
    async fn save_page(&self, page: &Page) -> StoreResult<UpsertOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let was_inserted = !inner.pages.contains_key(&page.id.0);
        inner.page_by_url.insert(page.url.clone(), page.id.0);
        inner.pages.insert(page.id.0, page.clone());
        Ok(UpsertOutcome { was_inserted })
    }

    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>> {
        Ok(self.inner.lock().unwrap().pages.get(&id).cloned())
    }

    async fn get_page_by_url(&self, url: &str) -> StoreResult<Option<Page>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.page_by_url.get(url).and_then(|id| inner.pages.get(id)).cloned())
    }

    async fn list_pages(&self, filter: &PageFilter) -> StoreResult<Vec<Page>> {
        let inner = self.inner.lock().unwrap();
        let mut pages: Vec<Page> = inner
            .pages
            .values()
            .filter(|p| filter.domain_key.as_deref().map(|d| d == p.domain_key).unwrap_or(true))
            .filter(|p| filter.page_type.as_deref().map(|t| t == p.page_type).unwrap_or(true))
            .cloned()
            .collect();
        pages.sort_by_key(|p| p.created_at);
        if let Some(limit) = filter.limit {
            pages.truncate(limit);
        }
        Ok(pages)
    }

    async fn save_page_content(&self, content: &PageContent) -> StoreResult<()> {
        self.inner.lock().unwrap().page_contents.insert(content.page_id.0, content.clone());
        Ok(())
    }

    async fn get_page_content(&self, page_id: Uuid) -> StoreResult<Option<PageContent>> {
        Ok(self.inner.lock().unwrap().page_contents.get(&page_id).cloned())
    }

    async fn save_intelligence(&self, intel: &Intelligence) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.intelligence.insert(intel.id.0, intel.clone());
        drop(inner);
        self.upsert_relationship(
            intel.entity_id.0,
            NodeType::Entity,
            intel.id.0,
            NodeType::Intelligence,
            "has_intel",
            intel.confidence as f64,
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_intelligence(&self, id: Uuid) -> StoreResult<Option<Intelligence>> {
        Ok(self.inner.lock().unwrap().intelligence.get(&id).cloned())
    }

    async fn search_intelligence_by_entity_name(&self, name: &str) -> StoreResult<Vec<Intelligence>> {
        let inner = self.inner.lock().unwrap();
        let needle = name.to_lowercase();
        let matching_entity_ids: Vec<Uuid> = inner
            .entities
            .values()
            .filter(|e| e.name.to_lowercase().contains(&needle))
            .map(|e| e.id.0)
            .collect();
        Ok(inner
            .intelligence
            .values()
            .filter(|i| matching_entity_ids.contains(&i.entity_id.0) && !i.tombstoned)
            .cloned()
            .collect())
    }

    async fn search_intelligence_by_text(&self, needle: &str) -> StoreResult<Vec<Intelligence>> {
        let inner = self.inner.lock().unwrap();
        let needle = needle.to_lowercase();
        Ok(inner
            .intelligence
            .values()
            .filter(|i| !i.tombstoned)
            .filter(|i| {
                i.findings
                    .iter()
                    .any(|f| format!("{f:?}").to_lowercase().contains(&needle))
            })
            .cloned()
            .collect())
    }

    async fn list_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<Vec<Intelligence>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .intelligence
            .values()
            .filter(|i| i.entity_id.0 == entity_id && !i.tombstoned)
            .cloned()
            .collect())
    }

    async fn reassign_intelligence_entity(&self, from_entity: Uuid, to_entity: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for intel in inner.intelligence.values_mut() {
            if intel.entity_id.0 == from_entity {
                intel.entity_id = to_entity.into();
            }
        }
        Ok(())
    }

    async fn tombstone_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for intel in inner.intelligence.values_mut() {
            if intel.entity_id.0 == entity_id {
                intel.tombstoned = true;
            }
        }
        Ok(())
    }

    async fn get_entity(&self, id: Uuid) -> StoreResult<Option<Entity>> {
        Ok(self.inner.lock().unwrap().entities.get(&id).cloned())
    }

    async fn find_entity_by_identity(&self, canonical_name: &str, normalized_kind: &str) -> StoreResult<Option<Entity>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entities
            .values()
            .find(|e| {
                !e.is_tombstone()
                    && intel_types::entity::normalize_kind(&e.kind) == normalized_kind
                    && crate::merger::canonical(&e.name) == canonical_name
            })
            .cloned())
    }

    async fn find_entities_by_name_like(&self, pattern: &str) -> StoreResult<Vec<Entity>> {
        let inner = self.inner.lock().unwrap();
        let needle = pattern.to_lowercase();
        Ok(inner
            .entities
            .values()
            .filter(|e| !e.is_tombstone() && e.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn find_entities_by_kind(&self, kind: &str) -> StoreResult<Vec<Entity>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entities
            .values()
            .filter(|e| !e.is_tombstone() && e.kind == kind)
            .cloned()
            .collect())
    }

    async fn list_live_entities(&self) -> StoreResult<Vec<Entity>> {
        Ok(self.inner.lock().unwrap().entities.values().filter(|e| !e.is_tombstone()).cloned().collect())
    }

    async fn save_entity(&self, entity: &Entity) -> StoreResult<()> {
        self.inner.lock().unwrap().entities.insert(entity.id.0, entity.clone());
        Ok(())
    }

    async fn upsert_relationship(
        &self,
        source_id: Uuid,
        source_type: NodeType,
        target_id: Uuid,
        target_type: NodeType,
        relation_type: &str,
        confidence: f64,
        source_url: Option<&str>,
    ) -> StoreResult<Relationship> {
        let mut inner = self.inner.lock().unwrap();
        let key = (source_id, target_id, relation_type.to_string());
        if let Some(existing_id) = inner.relationship_index.get(&key).copied() {
            let relationship = inner.relationships.get_mut(&existing_id).unwrap();
            relationship.observe_again(confidence, source_url);
            return Ok(relationship.clone());
        }
        let mut relationship =
            Relationship::new(source_id, source_type, target_id, target_type, relation_type, confidence);
        if let Some(url) = source_url {
            relationship.source_urls.push(url.to_string());
        }
        inner.relationship_index.insert(key, relationship.id.0);
        inner.relationships.insert(relationship.id.0, relationship.clone());
        Ok(relationship)
    }

    async fn delete_relationship(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(relationship) = inner.relationships.remove(&id) {
            inner.relationship_index.remove(&relationship.identity_key());
        }
        Ok(())
    }

    async fn list_relationships_for(&self, node_id: Uuid) -> StoreResult<Vec<Relationship>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .relationships
            .values()
            .filter(|r| r.source_id == node_id || r.target_id == node_id)
            .cloned()
            .collect())
    }

    async fn rewire_relationships(&self, from: Uuid, to: Uuid) -> StoreResult<()> {
        if from == to {
            return Err(StoreError::Invariant("rewire source == target".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        let ids: Vec<Uuid> = inner
            .relationships
            .values()
            .filter(|r| r.source_id == from || r.target_id == from)
            .map(|r| r.id.0)
            .collect();

        for id in ids {
            let mut relationship = inner.relationships.remove(&id).unwrap();
            inner.relationship_index.remove(&relationship.identity_key());

            if relationship.source_id == from {
                relationship.source_id = to;
            }
            if relationship.target_id == from {
                relationship.target_id = to;
            }
            // Self-loops created by the rewire (e.g. a relationship that
            // already linked the two merge participants) are dropped.
            if relationship.source_id == relationship.target_id {
                continue;
            }

            let key = relationship.identity_key();
            if let Some(dup_id) = inner.relationship_index.get(&key).copied() {
                // Skip rewrites that would duplicate an existing
                // relationship (spec §4.9 step 5).
                let existing = inner.relationships.get_mut(&dup_id).unwrap();
                existing.observe_again(relationship.confidence, None);
                continue;
            }

            inner.relationship_index.insert(key, relationship.id.0);
            inner.relationships.insert(relationship.id.0, relationship);
        }
        Ok(())
    }

    async fn connected_components(&self) -> StoreResult<Vec<Vec<Uuid>>> {
        let inner = self.inner.lock().unwrap();
        let live_ids: Vec<Uuid> = inner.entities.values().filter(|e| !e.is_tombstone()).map(|e| e.id.0).collect();
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for relationship in inner.relationships.values() {
            if live_ids.contains(&relationship.source_id) && live_ids.contains(&relationship.target_id) {
                adjacency.entry(relationship.source_id).or_default().push(relationship.target_id);
                adjacency.entry(relationship.target_id).or_default().push(relationship.source_id);
            }
        }

        let mut visited = std::collections::HashSet::new();
        let mut components = Vec::new();
        for &id in &live_ids {
            if visited.contains(&id) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![id];
            while let Some(current) = stack.pop() {
                if !visited.insert(current) {
                    continue;
                }
                component.push(current);
                if let Some(neighbors) = adjacency.get(&current) {
                    for &neighbor in neighbors {
                        if !visited.contains(&neighbor) {
                            stack.push(neighbor);
                        }
                    }
                }
            }
            components.push(component);
        }
        Ok(components)
    }

    async fn save_links(&self, links: &[Link]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        for link in links {
            inner.links.push(link.clone());
            let from_page = inner.page_by_url.get(&link.from_url).copied();
            let to_page = inner.page_by_url.get(&link.to_url).copied();
            if let (Some(from_id), Some(to_id)) = (from_page, to_page) {
                drop(inner);
                self.upsert_relationship(
                    from_id,
                    NodeType::Page,
                    to_id,
                    NodeType::Page,
                    "page_link",
                    1.0,
                    Some(&link.from_url),
                )
                .await?;
                inner = self.inner.lock().unwrap();
            }
        }
        Ok(())
    }

    async fn submit_task(&self, task: &Task) -> StoreResult<()> {
        self.inner.lock().unwrap().tasks.insert(task.id.0, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        Ok(self.inner.lock().unwrap().tasks.get(&id).cloned())
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        Ok(self.inner.lock().unwrap().tasks.values().cloned().collect())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        self.inner.lock().unwrap().tasks.insert(task.id.0, task.clone());
        Ok(())
    }

    async fn next_pending_task(&self, category: Option<TaskCategory>) -> StoreResult<Option<Task>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .filter(|t| category.map(|c| t.category == c).unwrap_or(true))
            .max_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.created_at.cmp(&a.created_at)))
            .cloned())
    }

    async fn recover_running_tasks(&self) -> StoreResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut recovered = 0;
        for task in inner.tasks.values_mut() {
            if task.status == TaskStatus::Running {
                task.mark_failed(RESTART_RECOVERY_REASON);
                task.completed_at = Some(Utc::now());
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intel_types::TaskCategory;

    #[tokio::test]
    async fn relationship_upsert_is_idempotent_and_monotonic() {
        let store = InMemoryStore::new();
        let (s, t) = (Uuid::new_v4(), Uuid::new_v4());
        for _ in 0..3 {
            store
                .upsert_relationship(s, NodeType::Entity, t, NodeType::Entity, "ceo_of", 80.0, None)
                .await
                .unwrap();
        }
        let rels = store.list_relationships_for(s).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].occurrence_count, 3);
    }

    #[tokio::test]
    async fn recover_running_tasks_marks_failed_with_reason() {
        let store = InMemoryStore::new();
        let mut task = Task::new("crawl", TaskCategory::Io, 0, serde_json::Value::Null);
        task.mark_running();
        store.submit_task(&task).await.unwrap();

        let recovered = store.recover_running_tasks().await.unwrap();
        assert_eq!(recovered, 1);

        let reloaded = store.get_task(task.id.0).await.unwrap().unwrap();
        assert_eq!(reloaded.status, TaskStatus::Failed);
        assert_eq!(reloaded.error.as_deref(), Some(RESTART_RECOVERY_REASON));
    }

    #[tokio::test]
    async fn rewire_skips_duplicate_relationships() {
        let store = InMemoryStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store.upsert_relationship(a, NodeType::Entity, c, NodeType::Entity, "mentions_entity", 50.0, None).await.unwrap();
        store.upsert_relationship(b, NodeType::Entity, c, NodeType::Entity, "mentions_entity", 90.0, None).await.unwrap();

        store.rewire_relationships(a, b).await.unwrap();

        let rels = store.list_relationships_for(b).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].confidence, 90.0);
    }

    #[tokio::test]
    async fn next_pending_task_orders_by_priority_then_age() {
        let store = InMemoryStore::new();
        let low = Task::new("a", TaskCategory::Io, 1, serde_json::Value::Null);
        let high = Task::new("b", TaskCategory::Io, 10, serde_json::Value::Null);
        store.submit_task(&low).await.unwrap();
        store.submit_task(&high).await.unwrap();

        let next = store.next_pending_task(None).await.unwrap().unwrap();
        assert_eq!(next.id, high.id);
    }
}
