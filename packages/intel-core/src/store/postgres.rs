//! Postgres-backed `RelationalStore`, grounded on
//! `intelligent-crawler::storage::postgres::PostgresStorage`'s manual
//! `Row::get` mapping style (no `query!` macro, no `FromRow` derive: the
//! domain types carry open `serde_json::Value` maps that don't round-trip
//! cleanly through a derived row struct). Behavioral parity with
//! `store::memory::InMemoryStore` is the correctness bar for every method
//! here, not just schema coverage.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use intel_types::{
    Entity, EntityMetadata, FetchStatus, Intelligence, Link, NodeType, Page, PageContent,
    Relationship, Task, TaskCategory, TaskStatus, RESTART_RECOVERY_REASON,
};

use super::{PageFilter, RelationalStore, UpsertOutcome};
use crate::error::{StoreError, StoreResult};

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs the embedded SQL migrations (spec §4.6 "schema is owned by the
    /// store, applied on startup"), grounded on
    /// `server::main`'s `sqlx::migrate!("./migrations")` startup step.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|err| StoreError::Invariant(format!("migration failed: {err}")))
    }
}

fn fetch_status_to_str(status: FetchStatus) -> &'static str {
    match status {
        FetchStatus::Pending => "pending",
        FetchStatus::Ok => "ok",
        FetchStatus::Failed => "failed",
    }
}

fn fetch_status_from_str(s: &str) -> FetchStatus {
    match s {
        "ok" => FetchStatus::Ok,
        "failed" => FetchStatus::Failed,
        _ => FetchStatus::Pending,
    }
}

fn node_type_to_str(kind: NodeType) -> &'static str {
    match kind {
        NodeType::Entity => "entity",
        NodeType::Page => "page",
        NodeType::Intelligence => "intelligence",
    }
}

fn node_type_from_str(s: &str) -> NodeType {
    match s {
        "page" => NodeType::Page,
        "intelligence" => NodeType::Intelligence,
        _ => NodeType::Entity,
    }
}

fn task_category_to_str(category: TaskCategory) -> &'static str {
    match category {
        TaskCategory::Io => "io",
        TaskCategory::Llm => "llm",
    }
}

fn task_category_from_str(s: &str) -> TaskCategory {
    match s {
        "llm" => TaskCategory::Llm,
        _ => TaskCategory::Io,
    }
}

fn task_status_to_str(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
        TaskStatus::Cancelled => "cancelled",
    }
}

fn task_status_from_str(s: &str) -> TaskStatus {
    match s {
        "running" => TaskStatus::Running,
        "completed" => TaskStatus::Completed,
        "failed" => TaskStatus::Failed,
        "cancelled" => TaskStatus::Cancelled,
        _ => TaskStatus::Pending,
    }
}

fn row_to_page(r: &sqlx::postgres::PgRow) -> Page {
    Page {
        id: Uuid::from(r.get::<Uuid, _>("id")).into(),
        url: r.get("url"),
        domain_key: r.get("domain_key"),
        depth: r.get::<i32, _>("depth") as u32,
        priority_score: r.get("priority_score"),
        page_type: r.get("page_type"),
        fetch_status: fetch_status_from_str(r.get::<String, _>("fetch_status").as_str()),
        last_fetched_at: r.get("last_fetched_at"),
        text_length: r.get::<i64, _>("text_length") as usize,
        created_at: r.get("created_at"),
    }
}

fn row_to_page_content(r: &sqlx::postgres::PgRow) -> PageContent {
    PageContent {
        page_id: Uuid::from(r.get::<Uuid, _>("page_id")).into(),
        raw_html: r.get("raw_html"),
        clean_text: r.get("clean_text"),
        content_hash: intel_types::ContentHash(r.get("content_hash")),
        metadata: serde_json::from_value(r.get("metadata")).unwrap_or_default(),
        structured_extraction: serde_json::from_value(r.get("structured_extraction")).unwrap_or_default(),
    }
}

fn row_to_entity(r: &sqlx::postgres::PgRow) -> Entity {
    let merged_into: Option<Uuid> = r.get("merged_into");
    let mut metadata: EntityMetadata = serde_json::from_value(r.get("metadata")).unwrap_or_default();
    metadata.merged_into = merged_into.map(Into::into);
    Entity {
        id: Uuid::from(r.get::<Uuid, _>("id")).into(),
        name: r.get("name"),
        kind: r.get("kind"),
        data: serde_json::from_value(r.get("data")).unwrap_or_default(),
        metadata,
        last_seen: r.get("last_seen"),
    }
}

fn row_to_intelligence(r: &sqlx::postgres::PgRow) -> Intelligence {
    Intelligence {
        id: Uuid::from(r.get::<Uuid, _>("id")).into(),
        page_id: Uuid::from(r.get::<Uuid, _>("page_id")).into(),
        entity_id: Uuid::from(r.get::<Uuid, _>("entity_id")).into(),
        confidence: r.get::<i16, _>("confidence") as u8,
        findings: serde_json::from_value(r.get("findings")).unwrap_or_default(),
        created_at: r.get("created_at"),
        tombstoned: r.get("tombstoned"),
    }
}

fn row_to_relationship(r: &sqlx::postgres::PgRow) -> Relationship {
    Relationship {
        id: Uuid::from(r.get::<Uuid, _>("id")).into(),
        source_id: r.get("source_id"),
        source_type: node_type_from_str(r.get::<String, _>("source_type").as_str()),
        target_id: r.get("target_id"),
        target_type: node_type_from_str(r.get::<String, _>("target_type").as_str()),
        relation_type: r.get("relation_type"),
        confidence: r.get("confidence"),
        occurrence_count: r.get::<i32, _>("occurrence_count") as u32,
        source_urls: serde_json::from_value(r.get("source_urls")).unwrap_or_default(),
        last_seen: r.get("last_seen"),
    }
}

fn row_to_task(r: &sqlx::postgres::PgRow) -> Task {
    Task {
        id: Uuid::from(r.get::<Uuid, _>("id")).into(),
        task_type: r.get("task_type"),
        category: task_category_from_str(r.get::<String, _>("category").as_str()),
        status: task_status_from_str(r.get::<String, _>("status").as_str()),
        priority: r.get("priority"),
        params: r.get("params"),
        progress: r.get("progress"),
        progress_message: r.get("progress_message"),
        result: r.get("result"),
        error: r.get("error"),
        created_at: r.get("created_at"),
        started_at: r.get("started_at"),
        completed_at: r.get("completed_at"),
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    // ---- Pages ------------------------------------------------------

    async fn save_page(&self, page: &Page) -> StoreResult<UpsertOutcome> {
        let row = sqlx::query(
            r#"
            INSERT INTO pages (id, url, domain_key, depth, priority_score, page_type, fetch_status, last_fetched_at, text_length, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                url = EXCLUDED.url,
                domain_key = EXCLUDED.domain_key,
                depth = EXCLUDED.depth,
                priority_score = EXCLUDED.priority_score,
                page_type = EXCLUDED.page_type,
                fetch_status = EXCLUDED.fetch_status,
                last_fetched_at = EXCLUDED.last_fetched_at,
                text_length = EXCLUDED.text_length
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(page.id.0)
        .bind(&page.url)
        .bind(&page.domain_key)
        .bind(page.depth as i32)
        .bind(page.priority_score)
        .bind(page.page_type.clone())
        .bind(fetch_status_to_str(page.fetch_status))
        .bind(page.last_fetched_at)
        .bind(page.text_length as i64)
        .bind(page.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome { was_inserted: row.get("inserted") })
    }

    async fn get_page(&self, id: Uuid) -> StoreResult<Option<Page>> {
        let row = sqlx::query("SELECT * FROM pages WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_page))
    }

    async fn get_page_by_url(&self, url: &str) -> StoreResult<Option<Page>> {
        let row = sqlx::query("SELECT * FROM pages WHERE url = $1").bind(url).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_page))
    }

    async fn list_pages(&self, filter: &PageFilter) -> StoreResult<Vec<Page>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM pages
            WHERE ($1::text IS NULL OR domain_key = $1)
              AND ($2::text IS NULL OR page_type = $2)
            ORDER BY created_at ASC
            LIMIT $3
            "#,
        )
        .bind(&filter.domain_key)
        .bind(&filter.page_type)
        .bind(filter.limit.map(|l| l as i64).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_page).collect())
    }

    async fn save_page_content(&self, content: &PageContent) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO page_contents (page_id, raw_html, clean_text, content_hash, metadata, structured_extraction)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (page_id) DO UPDATE SET
                raw_html = EXCLUDED.raw_html,
                clean_text = EXCLUDED.clean_text,
                content_hash = EXCLUDED.content_hash,
                metadata = EXCLUDED.metadata,
                structured_extraction = EXCLUDED.structured_extraction
            "#,
        )
        .bind(content.page_id.0)
        .bind(&content.raw_html)
        .bind(&content.clean_text)
        .bind(&content.content_hash.0)
        .bind(serde_json::to_value(&content.metadata).unwrap_or(Value::Null))
        .bind(serde_json::to_value(&content.structured_extraction).unwrap_or(Value::Null))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_page_content(&self, page_id: Uuid) -> StoreResult<Option<PageContent>> {
        let row = sqlx::query("SELECT * FROM page_contents WHERE page_id = $1").bind(page_id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_page_content))
    }

    // ---- Intelligence -------------------------------------------------

    async fn save_intelligence(&self, intel: &Intelligence) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO intelligence (id, page_id, entity_id, confidence, findings, created_at, tombstoned)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                confidence = EXCLUDED.confidence,
                findings = EXCLUDED.findings,
                tombstoned = EXCLUDED.tombstoned
            "#,
        )
        .bind(intel.id.0)
        .bind(intel.page_id.0)
        .bind(intel.entity_id.0)
        .bind(intel.confidence as i16)
        .bind(serde_json::to_value(&intel.findings).unwrap_or(Value::Null))
        .bind(intel.created_at)
        .bind(intel.tombstoned)
        .execute(&self.pool)
        .await?;

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
        let row = sqlx::query("SELECT * FROM intelligence WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_intelligence))
    }

    async fn search_intelligence_by_entity_name(&self, name: &str) -> StoreResult<Vec<Intelligence>> {
        let needle = format!("%{}%", name.to_lowercase());
        let rows = sqlx::query(
            r#"
            SELECT i.* FROM intelligence i
            JOIN entities e ON e.id = i.entity_id
            WHERE NOT i.tombstoned AND LOWER(e.name) LIKE $1
            "#,
        )
        .bind(needle)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_intelligence).collect())
    }

    async fn search_intelligence_by_text(&self, needle: &str) -> StoreResult<Vec<Intelligence>> {
        let pattern = format!("%{}%", needle.to_lowercase());
        let rows = sqlx::query(
            r#"
            SELECT * FROM intelligence
            WHERE NOT tombstoned AND LOWER(findings::text) LIKE $1
            "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_intelligence).collect())
    }

    async fn list_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<Vec<Intelligence>> {
        let rows = sqlx::query("SELECT * FROM intelligence WHERE entity_id = $1 AND NOT tombstoned")
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_intelligence).collect())
    }

    async fn reassign_intelligence_entity(&self, from_entity: Uuid, to_entity: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE intelligence SET entity_id = $1 WHERE entity_id = $2")
            .bind(to_entity)
            .bind(from_entity)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn tombstone_intelligence_for_entity(&self, entity_id: Uuid) -> StoreResult<()> {
        sqlx::query("UPDATE intelligence SET tombstoned = TRUE WHERE entity_id = $1")
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- Entities -------------------------------------------------------

    async fn get_entity(&self, id: Uuid) -> StoreResult<Option<Entity>> {
        let row = sqlx::query("SELECT * FROM entities WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_entity))
    }

    async fn find_entity_by_identity(&self, canonical_name: &str, normalized_kind: &str) -> StoreResult<Option<Entity>> {
        let row = sqlx::query(
            "SELECT * FROM entities WHERE merged_into IS NULL AND canonical_name = $1 AND normalized_kind = $2 LIMIT 1",
        )
        .bind(canonical_name)
        .bind(normalized_kind)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_entity))
    }

    async fn find_entities_by_name_like(&self, pattern: &str) -> StoreResult<Vec<Entity>> {
        let needle = format!("%{}%", pattern.to_lowercase());
        let rows = sqlx::query("SELECT * FROM entities WHERE merged_into IS NULL AND LOWER(name) LIKE $1")
            .bind(needle)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_entity).collect())
    }

    async fn find_entities_by_kind(&self, kind: &str) -> StoreResult<Vec<Entity>> {
        let rows = sqlx::query("SELECT * FROM entities WHERE merged_into IS NULL AND kind = $1")
            .bind(kind)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_entity).collect())
    }

    async fn list_live_entities(&self) -> StoreResult<Vec<Entity>> {
        let rows = sqlx::query("SELECT * FROM entities WHERE merged_into IS NULL").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_entity).collect())
    }

    async fn save_entity(&self, entity: &Entity) -> StoreResult<()> {
        let canonical_name = crate::merger::canonical(&entity.name);
        let normalized_kind = intel_types::entity::normalize_kind(&entity.kind);
        sqlx::query(
            r#"
            INSERT INTO entities (id, name, kind, canonical_name, normalized_kind, data, metadata, merged_into, last_seen)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                canonical_name = EXCLUDED.canonical_name,
                normalized_kind = EXCLUDED.normalized_kind,
                data = EXCLUDED.data,
                metadata = EXCLUDED.metadata,
                merged_into = EXCLUDED.merged_into,
                last_seen = EXCLUDED.last_seen
            "#,
        )
        .bind(entity.id.0)
        .bind(&entity.name)
        .bind(&entity.kind)
        .bind(canonical_name)
        .bind(normalized_kind)
        .bind(serde_json::to_value(&entity.data).unwrap_or(Value::Null))
        .bind(serde_json::to_value(&entity.metadata).unwrap_or(Value::Null))
        .bind(entity.metadata.merged_into.map(|id| id.0))
        .bind(entity.last_seen)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Relationships --------------------------------------------

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
        let mut tx = self.pool.begin().await?;
        let existing = sqlx::query("SELECT * FROM relationships WHERE source_id = $1 AND target_id = $2 AND relation_type = $3 FOR UPDATE")
            .bind(source_id)
            .bind(target_id)
            .bind(relation_type)
            .fetch_optional(&mut *tx)
            .await?;

        let relationship = if let Some(row) = existing {
            let mut relationship = row_to_relationship(&row);
            relationship.observe_again(confidence, source_url);
            sqlx::query(
                r#"
                UPDATE relationships SET
                    confidence = $1, occurrence_count = $2, source_urls = $3, last_seen = $4
                WHERE id = $5
                "#,
            )
            .bind(relationship.confidence)
            .bind(relationship.occurrence_count as i32)
            .bind(serde_json::to_value(&relationship.source_urls).unwrap_or(Value::Null))
            .bind(relationship.last_seen)
            .bind(relationship.id.0)
            .execute(&mut *tx)
            .await?;
            relationship
        } else {
            let mut relationship = Relationship::new(source_id, source_type, target_id, target_type, relation_type, confidence);
            if let Some(url) = source_url {
                relationship.source_urls.push(url.to_string());
            }
            sqlx::query(
                r#"
                INSERT INTO relationships (id, source_id, source_type, target_id, target_type, relation_type, confidence, occurrence_count, source_urls, last_seen)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(relationship.id.0)
            .bind(relationship.source_id)
            .bind(node_type_to_str(relationship.source_type))
            .bind(relationship.target_id)
            .bind(node_type_to_str(relationship.target_type))
            .bind(&relationship.relation_type)
            .bind(relationship.confidence)
            .bind(relationship.occurrence_count as i32)
            .bind(serde_json::to_value(&relationship.source_urls).unwrap_or(Value::Null))
            .bind(relationship.last_seen)
            .execute(&mut *tx)
            .await?;
            relationship
        };

        tx.commit().await?;
        Ok(relationship)
    }

    async fn delete_relationship(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM relationships WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_relationships_for(&self, node_id: Uuid) -> StoreResult<Vec<Relationship>> {
        let rows = sqlx::query("SELECT * FROM relationships WHERE source_id = $1 OR target_id = $1")
            .bind(node_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_relationship).collect())
    }

    /// Mirrors `InMemoryStore::rewire_relationships` row for row inside one
    /// transaction: duplicate rewrites are merged into the existing row
    /// rather than inserted, and rewires that would create a self-loop are
    /// dropped (spec §4.9 step 5).
    async fn rewire_relationships(&self, from: Uuid, to: Uuid) -> StoreResult<()> {
        if from == to {
            return Err(StoreError::Invariant("rewire source == target".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query("SELECT * FROM relationships WHERE source_id = $1 OR target_id = $1 FOR UPDATE")
            .bind(from)
            .fetch_all(&mut *tx)
            .await?;

        for row in rows {
            let mut relationship = row_to_relationship(&row);
            sqlx::query("DELETE FROM relationships WHERE id = $1").bind(relationship.id.0).execute(&mut *tx).await?;

            if relationship.source_id == from {
                relationship.source_id = to;
            }
            if relationship.target_id == from {
                relationship.target_id = to;
            }
            if relationship.source_id == relationship.target_id {
                continue;
            }

            let dup = sqlx::query("SELECT * FROM relationships WHERE source_id = $1 AND target_id = $2 AND relation_type = $3 FOR UPDATE")
                .bind(relationship.source_id)
                .bind(relationship.target_id)
                .bind(&relationship.relation_type)
                .fetch_optional(&mut *tx)
                .await?;

            if let Some(dup_row) = dup {
                let mut existing = row_to_relationship(&dup_row);
                existing.observe_again(relationship.confidence, None);
                sqlx::query(
                    "UPDATE relationships SET confidence = $1, occurrence_count = $2, last_seen = $3 WHERE id = $4",
                )
                .bind(existing.confidence)
                .bind(existing.occurrence_count as i32)
                .bind(existing.last_seen)
                .bind(existing.id.0)
                .execute(&mut *tx)
                .await?;
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO relationships (id, source_id, source_type, target_id, target_type, relation_type, confidence, occurrence_count, source_urls, last_seen)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(relationship.id.0)
            .bind(relationship.source_id)
            .bind(node_type_to_str(relationship.source_type))
            .bind(relationship.target_id)
            .bind(node_type_to_str(relationship.target_type))
            .bind(&relationship.relation_type)
            .bind(relationship.confidence)
            .bind(relationship.occurrence_count as i32)
            .bind(serde_json::to_value(&relationship.source_urls).unwrap_or(Value::Null))
            .bind(relationship.last_seen)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Loaded into Rust and walked with the same stack-based DFS as
    /// `InMemoryStore`, rather than a recursive CTE, to keep the two
    /// stores behaviorally identical (DESIGN.md).
    async fn connected_components(&self) -> StoreResult<Vec<Vec<Uuid>>> {
        let live_rows = sqlx::query("SELECT id FROM entities WHERE merged_into IS NULL").fetch_all(&self.pool).await?;
        let live_ids: Vec<Uuid> = live_rows.iter().map(|r| r.get("id")).collect();
        let live_set: HashSet<Uuid> = live_ids.iter().copied().collect();

        let rel_rows = sqlx::query("SELECT source_id, target_id FROM relationships").fetch_all(&self.pool).await?;
        let mut adjacency: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for row in &rel_rows {
            let source_id: Uuid = row.get("source_id");
            let target_id: Uuid = row.get("target_id");
            if live_set.contains(&source_id) && live_set.contains(&target_id) {
                adjacency.entry(source_id).or_default().push(target_id);
                adjacency.entry(target_id).or_default().push(source_id);
            }
        }

        let mut visited = HashSet::new();
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

    // ---- Links --------------------------------------------------------

    async fn save_links(&self, links: &[Link]) -> StoreResult<()> {
        for link in links {
            sqlx::query(
                r#"
                INSERT INTO links (id, from_url, to_url, anchor_text, scoring_reason, score, depth, discovered_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(link.id.0)
            .bind(&link.from_url)
            .bind(&link.to_url)
            .bind(&link.anchor_text)
            .bind(&link.scoring_reason)
            .bind(link.score)
            .bind(link.depth as i32)
            .bind(link.discovered_at)
            .execute(&self.pool)
            .await?;

            let from_page: Option<Uuid> = sqlx::query_scalar("SELECT id FROM pages WHERE url = $1")
                .bind(&link.from_url)
                .fetch_optional(&self.pool)
                .await?;
            let to_page: Option<Uuid> = sqlx::query_scalar("SELECT id FROM pages WHERE url = $1")
                .bind(&link.to_url)
                .fetch_optional(&self.pool)
                .await?;

            if let (Some(from_id), Some(to_id)) = (from_page, to_page) {
                self.upsert_relationship(from_id, NodeType::Page, to_id, NodeType::Page, "page_link", 1.0, Some(&link.from_url))
                    .await?;
            }
        }
        Ok(())
    }

    // ---- Tasks ----------------------------------------------------

    async fn submit_task(&self, task: &Task) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, task_type, category, status, priority, params, progress, progress_message, result, error, created_at, started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(task.id.0)
        .bind(&task.task_type)
        .bind(task_category_to_str(task.category))
        .bind(task_status_to_str(task.status))
        .bind(task.priority)
        .bind(task.params.clone())
        .bind(task.progress)
        .bind(&task.progress_message)
        .bind(task.result.clone())
        .bind(&task.error)
        .bind(task.created_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> StoreResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = $1").bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(row_to_task))
    }

    async fn list_tasks(&self) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks").fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn update_task(&self, task: &Task) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE tasks SET
                status = $1, priority = $2, progress = $3, progress_message = $4,
                result = $5, error = $6, started_at = $7, completed_at = $8
            WHERE id = $9
            "#,
        )
        .bind(task_status_to_str(task.status))
        .bind(task.priority)
        .bind(task.progress)
        .bind(&task.progress_message)
        .bind(task.result.clone())
        .bind(&task.error)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn next_pending_task(&self, category: Option<TaskCategory>) -> StoreResult<Option<Task>> {
        let category_str = category.map(task_category_to_str);
        let row = sqlx::query(
            r#"
            SELECT * FROM tasks
            WHERE status = 'pending' AND ($1::text IS NULL OR category = $1)
            ORDER BY priority DESC, created_at ASC
            LIMIT 1
            "#,
        )
        .bind(category_str)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    async fn recover_running_tasks(&self) -> StoreResult<usize> {
        let rows = sqlx::query(
            r#"
            UPDATE tasks SET status = 'failed', error = $1, completed_at = $2
            WHERE status = 'running'
            RETURNING id
            "#,
        )
        .bind(RESTART_RECOVERY_REASON)
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.len())
    }
}
