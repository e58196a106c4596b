//! Agent Service: three self-contained reflective meta-loops over the
//! stored graph (spec §4.10). Grounded on
//! `original_source/src/garuda_intel/services/agent_service.py`'s three
//! modes, recast the way the teacher tracks long-running work in
//! `intelligent-crawler::crawler`: a run id, started/completed
//! timestamps, counters, and a cooperative-stop flag the caller can flip
//! mid-run.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use intel_types::{Entity, NodeType};

use crate::error::StoreResult;
use crate::events::{CoreEvent, EventBus};
use crate::gap::{self, GapReport};
use crate::merger;
use crate::store::RelationalStore;

/// Default weights and depth from spec §4.10 / SPEC_FULL.md §4.10.
pub const DEFAULT_PRIORITY_WEIGHT_UNKNOWN: f64 = 0.7;
pub const DEFAULT_PRIORITY_WEIGHT_RELATION: f64 = 0.3;
pub const DEFAULT_MAX_EXPLORATION_DEPTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    ReflectAndRefine,
    ExploreAndPrioritize,
    InvestigateAndRelate,
}

impl AgentMode {
    fn label(self) -> &'static str {
        match self {
            AgentMode::ReflectAndRefine => "reflect_and_refine",
            AgentMode::ExploreAndPrioritize => "explore_and_prioritize",
            AgentMode::InvestigateAndRelate => "investigate_and_relate",
        }
    }
}

/// Status of one tracked run, pollable by id (spec §4.10 "every run has a
/// process id with started/completed timestamps, counters...").
#[derive(Debug, Clone)]
pub struct AgentRunStatus {
    pub id: Uuid,
    pub mode: AgentMode,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counters: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ReflectGroup {
    pub canonical_name: String,
    pub kind: String,
    pub entity_ids: Vec<Uuid>,
    pub survivor_id: Option<Uuid>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReflectReport {
    pub dry_run: bool,
    pub groups: Vec<ReflectGroup>,
}

#[derive(Debug, Clone)]
pub struct PrioritizedEntity {
    pub entity_id: Uuid,
    pub depth: u32,
    pub relation_count: usize,
    pub priority: f64,
}

#[derive(Debug, Clone)]
pub struct InvestigationTask {
    pub entity_id: Uuid,
    pub entity_name: String,
    pub gap: GapReport,
    pub related_entity_id: Option<Uuid>,
    pub related_entity_name: Option<String>,
    pub search_queries: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InvestigateReport {
    pub tasks: Vec<InvestigationTask>,
}

/// Priority score for `Explore & Prioritize` (spec §4.10):
/// `w_unknown · depth/max_depth + w_relation · min(relations/10, 1)`.
pub fn priority_score(depth: u32, max_depth: u32, relation_count: usize, weight_unknown: f64, weight_relation: f64) -> f64 {
    let depth_term = if max_depth == 0 { 0.0 } else { depth as f64 / max_depth as f64 };
    let relation_term = (relation_count as f64 / 10.0).min(1.0);
    weight_unknown * depth_term + weight_relation * relation_term
}

pub struct AgentService {
    store: Arc<dyn RelationalStore>,
    events: EventBus,
    runs: Mutex<HashMap<Uuid, AgentRunStatus>>,
}

impl AgentService {
    pub fn new(store: Arc<dyn RelationalStore>, events: EventBus) -> Self {
        Self { store, events, runs: Mutex::new(HashMap::new()) }
    }

    pub async fn status(&self, run_id: Uuid) -> Option<AgentRunStatus> {
        self.runs.lock().await.get(&run_id).cloned()
    }

    async fn start_run(&self, mode: AgentMode) -> Uuid {
        let run_id = Uuid::new_v4();
        let status = AgentRunStatus { id: run_id, mode, started_at: Utc::now(), completed_at: None, counters: HashMap::new() };
        self.runs.lock().await.insert(run_id, status);
        self.events.publish(CoreEvent::AgentRunStarted { run_id, mode: mode.label().to_string() });
        run_id
    }

    async fn finish_run(&self, run_id: Uuid, counters: HashMap<String, usize>) {
        let mode_label = {
            let mut runs = self.runs.lock().await;
            if let Some(status) = runs.get_mut(&run_id) {
                status.completed_at = Some(Utc::now());
                status.counters = counters;
                status.mode.label().to_string()
            } else {
                return;
            }
        };
        self.events.publish(CoreEvent::AgentRunCompleted { run_id, mode: mode_label });
    }

    /// `Reflect & Refine` (spec §4.10): groups live entities by canonical
    /// name, merges duplicates (or dry-runs the report), and surfaces
    /// data-quality issues (missing kind, empty name).
    pub async fn reflect_and_refine(&self, dry_run: bool, cancel: Arc<AtomicBool>) -> StoreResult<ReflectReport> {
        let run_id = self.start_run(AgentMode::ReflectAndRefine).await;
        let live = self.store.list_live_entities().await?;

        let mut by_identity: HashMap<(String, String), Vec<Entity>> = HashMap::new();
        for entity in live {
            let key = (merger::canonical(&entity.name), intel_types::entity::normalize_kind(&entity.kind));
            by_identity.entry(key).or_default().push(entity);
        }

        let mut groups = Vec::new();
        let mut merged_count = 0usize;
        for ((canonical_name, kind), mut members) in by_identity {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let mut issues = Vec::new();
            if canonical_name.is_empty() {
                issues.push("empty canonical name".to_string());
            }
            members.retain(|e| !e.is_tombstone());
            if members.is_empty() {
                continue;
            }
            let entity_ids: Vec<Uuid> = members.iter().map(|e| e.id.0).collect();

            let survivor_id = if members.len() > 1 {
                if dry_run {
                    None
                } else {
                    members.sort_by_key(|e| e.id.0);
                    let mut survivor_id = members[0].id.0;
                    for other in &members[1..] {
                        let survivor = merger::merge_entities(self.store.as_ref(), survivor_id, other.id.0).await?;
                        survivor_id = survivor.id.0;
                        merged_count += 1;
                    }
                    Some(survivor_id)
                }
            } else {
                None
            };

            groups.push(ReflectGroup { canonical_name, kind, entity_ids, survivor_id, issues });
        }

        let mut counters = HashMap::new();
        counters.insert("groups".to_string(), groups.len());
        counters.insert("merged".to_string(), merged_count);
        self.finish_run(run_id, counters).await;

        Ok(ReflectReport { dry_run, groups })
    }

    /// `Explore & Prioritize` (spec §4.10): breadth-first over the live
    /// relationship graph from `roots`, scoring each encountered entity,
    /// returning the top `top_n` for targeted crawling.
    #[allow(clippy::too_many_arguments)]
    pub async fn explore_and_prioritize(
        &self,
        roots: &[Uuid],
        max_depth: u32,
        weight_unknown: f64,
        weight_relation: f64,
        top_n: usize,
        cancel: Arc<AtomicBool>,
    ) -> StoreResult<Vec<PrioritizedEntity>> {
        let run_id = self.start_run(AgentMode::ExploreAndPrioritize).await;

        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut frontier: Vec<(Uuid, u32)> = roots.iter().map(|id| (*id, 0)).collect();
        let mut found: Vec<PrioritizedEntity> = Vec::new();

        while let Some((entity_id, depth)) = frontier.pop() {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            if !visited.insert(entity_id) {
                continue;
            }

            let relations = self.store.list_relationships_for(entity_id).await?;
            let relation_count = relations.len();
            let priority = priority_score(depth, max_depth.max(1), relation_count, weight_unknown, weight_relation);
            found.push(PrioritizedEntity { entity_id, depth, relation_count, priority });

            if depth >= max_depth {
                continue;
            }
            for relation in relations {
                let neighbor = if relation.source_id == entity_id { relation.target_id } else { relation.source_id };
                if !visited.contains(&neighbor) {
                    frontier.push((neighbor, depth + 1));
                }
            }
        }

        found.sort_by(|a, b| b.priority.partial_cmp(&a.priority).unwrap_or(std::cmp::Ordering::Equal));
        found.truncate(top_n);

        let mut counters = HashMap::new();
        counters.insert("visited".to_string(), visited.len());
        counters.insert("returned".to_string(), found.len());
        self.finish_run(run_id, counters).await;

        Ok(found)
    }

    /// `Investigate & Relate` (spec §4.10): per live entity, runs the Gap
    /// Analyzer and looks for inferred relations (entities not directly
    /// related but sharing a common neighbour), emitting one
    /// investigation per gap/inferred-relation pairing with a combined
    /// search-query set.
    pub async fn investigate_and_relate(&self, cancel: Arc<AtomicBool>) -> StoreResult<InvestigateReport> {
        let run_id = self.start_run(AgentMode::InvestigateAndRelate).await;

        let live = self.store.list_live_entities().await?;
        let mut neighbors_of: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
        for entity in &live {
            let relations = self.store.list_relationships_for(entity.id.0).await?;
            let neighbors = relations
                .iter()
                .filter(|r| r.source_type == NodeType::Entity && r.target_type == NodeType::Entity)
                .map(|r| if r.source_id == entity.id.0 { r.target_id } else { r.source_id })
                .collect();
            neighbors_of.insert(entity.id.0, neighbors);
        }

        let by_id: HashMap<Uuid, &Entity> = live.iter().map(|e| (e.id.0, e)).collect();
        let mut tasks = Vec::new();

        for entity in &live {
            if cancel.load(Ordering::Relaxed) {
                break;
            }
            let gap = gap::analyze(entity);
            let own_neighbors = neighbors_of.get(&entity.id.0).cloned().unwrap_or_default();

            let inferred = inferred_relation_for(entity.id.0, &own_neighbors, &neighbors_of, &by_id);

            let mut queries: Vec<String> = gap
                .missing_fields
                .iter()
                .flat_map(|f| f.query_templates.clone())
                .collect();
            if let Some((related_id, related_name)) = &inferred {
                queries.push(format!("\"{}\" \"{}\"", entity.name, related_name));
                queries.push(format!("\"{}\" site:* \"{}\"", entity.name, related_name));
                tasks.push(InvestigationTask {
                    entity_id: entity.id.0,
                    entity_name: entity.name.clone(),
                    gap,
                    related_entity_id: Some(*related_id),
                    related_entity_name: Some(related_name.clone()),
                    search_queries: queries,
                });
            } else if !queries.is_empty() {
                tasks.push(InvestigationTask {
                    entity_id: entity.id.0,
                    entity_name: entity.name.clone(),
                    gap,
                    related_entity_id: None,
                    related_entity_name: None,
                    search_queries: queries,
                });
            }
        }

        info!(count = tasks.len(), "investigate_and_relate produced investigations");
        let mut counters = HashMap::new();
        counters.insert("investigations".to_string(), tasks.len());
        self.finish_run(run_id, counters).await;

        Ok(InvestigateReport { tasks })
    }
}

/// Finds one entity that shares a common neighbour with `entity_id` but
/// is not itself directly related to it (spec §4.10 "inferred relations
/// (co-occurring unrelated entities sharing common neighbours)").
fn inferred_relation_for(
    entity_id: Uuid,
    own_neighbors: &HashSet<Uuid>,
    neighbors_of: &HashMap<Uuid, HashSet<Uuid>>,
    by_id: &HashMap<Uuid, &Entity>,
) -> Option<(Uuid, String)> {
    for &common_neighbor in own_neighbors {
        let Some(their_neighbors) = neighbors_of.get(&common_neighbor) else { continue };
        for &candidate in their_neighbors {
            if candidate == entity_id || own_neighbors.contains(&candidate) {
                continue;
            }
            if let Some(candidate_entity) = by_id.get(&candidate) {
                return Some((candidate, candidate_entity.name.clone()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use std::collections::HashMap as Map;

    #[tokio::test]
    async fn reflect_and_refine_merges_canonical_duplicates() {
        let store = Arc::new(InMemoryStore::new());
        merger::get_or_create_entity(store.as_ref(), "Microsoft Corporation", "org", Map::new()).await.unwrap();
        merger::get_or_create_entity(store.as_ref(), "Microsoft Corp.", "org", Map::new()).await.unwrap();

        let service = AgentService::new(store.clone(), EventBus::new());
        let report = service.reflect_and_refine(false, Arc::new(AtomicBool::new(false))).await.unwrap();

        let merged_group = report.groups.iter().find(|g| g.canonical_name == "microsoft").unwrap();
        assert_eq!(merged_group.entity_ids.len(), 2);
        assert!(merged_group.survivor_id.is_some());

        let live = store.list_live_entities().await.unwrap();
        assert_eq!(live.iter().filter(|e| merger::canonical(&e.name) == "microsoft").count(), 1);
    }

    #[tokio::test]
    async fn reflect_and_refine_dry_run_does_not_merge() {
        let store = Arc::new(InMemoryStore::new());
        merger::get_or_create_entity(store.as_ref(), "Acme Inc.", "org", Map::new()).await.unwrap();
        merger::get_or_create_entity(store.as_ref(), "Acme", "org", Map::new()).await.unwrap();

        let service = AgentService::new(store.clone(), EventBus::new());
        let report = service.reflect_and_refine(true, Arc::new(AtomicBool::new(false))).await.unwrap();

        let group = report.groups.iter().find(|g| g.canonical_name == "acme").unwrap();
        assert!(group.survivor_id.is_none());
        let live = store.list_live_entities().await.unwrap();
        assert_eq!(live.iter().filter(|e| merger::canonical(&e.name) == "acme").count(), 2);
    }

    #[tokio::test]
    async fn explore_and_prioritize_ranks_by_depth_and_relation_count() {
        let store = Arc::new(InMemoryStore::new());
        let (root, _) = merger::get_or_create_entity(store.as_ref(), "Root Co", "org", Map::new()).await.unwrap();
        let (child, _) = merger::get_or_create_entity(store.as_ref(), "Child Co", "org", Map::new()).await.unwrap();
        store
            .upsert_relationship(root.id.0, NodeType::Entity, child.id.0, NodeType::Entity, "related_entity", 80.0, None)
            .await
            .unwrap();

        let service = AgentService::new(store, EventBus::new());
        let results = service
            .explore_and_prioritize(&[root.id.0], DEFAULT_MAX_EXPLORATION_DEPTH, DEFAULT_PRIORITY_WEIGHT_UNKNOWN, DEFAULT_PRIORITY_WEIGHT_RELATION, 10, Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().any(|r| r.entity_id == root.id.0 && r.depth == 0));
        assert!(results.iter().any(|r| r.entity_id == child.id.0 && r.depth == 1));
    }

    #[tokio::test]
    async fn investigate_and_relate_flags_incomplete_entities() {
        let store = Arc::new(InMemoryStore::new());
        merger::get_or_create_entity(store.as_ref(), "Gapful Co", "company", Map::new()).await.unwrap();

        let service = AgentService::new(store, EventBus::new());
        let report = service.investigate_and_relate(Arc::new(AtomicBool::new(false))).await.unwrap();

        let investigation = report.tasks.iter().find(|t| t.entity_name == "Gapful Co").unwrap();
        assert!(!investigation.search_queries.is_empty());
        assert!(investigation.related_entity_id.is_none());
    }

    #[test]
    fn priority_score_matches_spec_formula() {
        let score = priority_score(2, 3, 10, 0.7, 0.3);
        assert!((score - (0.7 * (2.0 / 3.0) + 0.3)).abs() < 1e-9);
    }
}
