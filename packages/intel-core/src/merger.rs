//! Entity Merger: canonicalization, identity, type hierarchy,
//! get-or-create, soft merge, and the two-pass deduplication sweep (spec
//! §4.9). Implemented as free functions over `&dyn RelationalStore`
//! (and, for semantic dedup, `&dyn VectorIndex`), the way
//! `intelligent-crawler::relationships::resolve_relationships` is a
//! function taking borrowed trait objects rather than a stateful struct.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use intel_types::entity::{normalize_kind, parent_kind, specificity_rank};
use intel_types::{Entity, MergeHistoryEntry, TypeHistoryEntry};

use crate::error::StoreResult;
use crate::store::RelationalStore;
use crate::vector::{PayloadFilter, VectorIndex, KIND_ENTITY};

/// Company-suffix list stripped during canonicalization (spec §4.9).
const COMPANY_SUFFIXES: &[&str] = &[
    "incorporated", "inc.", "inc", "corporation", "corp.", "corp", "limited", "ltd.", "ltd",
    "l.l.c.", "llc", "company", "co.", "co", "gmbh", "ag",
];

/// `canonical(name) = lowercase(strip_accents(collapse_whitespace(
/// strip_punct(strip_company_suffixes(name)))))` (spec §4.9), so
/// "Microsoft", "Microsoft Corp.", and "Microsoft Corporation" collapse
/// to the same identity key.
pub fn canonical(name: &str) -> String {
    let mut words: Vec<String> = name
        .split_whitespace()
        .map(|w| strip_punct(&strip_accents(w)).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect();

    while let Some(last) = words.last() {
        if COMPANY_SUFFIXES.contains(&last.as_str()) {
            words.pop();
        } else {
            break;
        }
    }

    words.join(" ")
}

fn strip_punct(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn strip_accents(word: &str) -> String {
    // A small explicit accent map covers the common Latin-1 cases without
    // pulling in a normalization crate the teacher's stack doesn't use.
    word.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

fn merge_data(existing: &mut HashMap<String, Value>, incoming: HashMap<String, Value>) {
    for (key, value) in incoming {
        match existing.get(&key) {
            None => {
                existing.insert(key, value);
            }
            Some(current) if is_empty_value(current) && !is_empty_value(&value) => {
                existing.insert(key, value);
            }
            _ => {}
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// `get_or_create_entity(name, kind, data)` (spec §4.9): finds by
/// `canonical(name)`; merges `data`, promoting the stored kind when the
/// incoming kind outranks it and recording a `TypeHistoryEntry`.
pub async fn get_or_create_entity(
    store: &dyn RelationalStore,
    name: &str,
    kind: &str,
    data: HashMap<String, Value>,
) -> StoreResult<(Entity, bool)> {
    let canonical_name = canonical(name);
    let normalized = normalize_kind(kind);

    if let Some(mut existing) = store.find_entity_by_identity(&canonical_name, &normalized).await? {
        merge_data(&mut existing.data, data);

        if specificity_rank(kind) > specificity_rank(&existing.kind) {
            let from = existing.kind.clone();
            existing.metadata.type_history.push(TypeHistoryEntry {
                from: from.clone(),
                to: kind.to_string(),
                at: Utc::now(),
                reason: "higher-specificity kind observed".to_string(),
            });
            info!(entity_id = %existing.id, from = %from, to = %kind, "entity type promoted");
            existing.kind = kind.to_string();
        }
        existing.last_seen = Utc::now();
        store.save_entity(&existing).await?;
        return Ok((existing, false));
    }

    let entity = Entity::new(name, kind, data);
    store.save_entity(&entity).await?;
    debug!(entity_id = %entity.id, name, kind, "entity created");
    Ok((entity, true))
}

/// Picks the merge survivor by (kind-specificity desc, data-richness
/// desc, name-length desc) (spec §4.9 step 2).
fn pick_survivor<'a>(a: &'a Entity, b: &'a Entity) -> (&'a Entity, &'a Entity) {
    let a_key = (specificity_rank(&a.kind), a.data.len(), a.name.len());
    let b_key = (specificity_rank(&b.kind), b.data.len(), b.name.len());
    if a_key >= b_key {
        (a, b)
    } else {
        (b, a)
    }
}

/// Soft merge: never deletes. Rewires Relationships/Intelligence to point
/// at the survivor, tombstones the loser (spec §4.9 step 1-6).
pub async fn merge_entities(
    store: &dyn RelationalStore,
    a_id: Uuid,
    b_id: Uuid,
) -> StoreResult<Entity> {
    if a_id == b_id {
        return Err(crate::error::StoreError::Invariant("merge source == target".to_string()));
    }
    let a = store
        .get_entity(a_id)
        .await?
        .ok_or_else(|| crate::error::StoreError::NotFound(format!("entity {a_id}")))?;
    let b = store
        .get_entity(b_id)
        .await?
        .ok_or_else(|| crate::error::StoreError::NotFound(format!("entity {b_id}")))?;

    let (survivor, loser) = pick_survivor(&a, &b);
    let mut survivor = survivor.clone();
    let loser = loser.clone();

    merge_data(&mut survivor.data, loser.data.clone());
    survivor.metadata.merge_history.push(MergeHistoryEntry {
        merged_from: loser.id,
        merged_from_name: loser.name.clone(),
        merged_from_kind: loser.kind.clone(),
        at: Utc::now(),
    });
    survivor.last_seen = survivor.last_seen.max(loser.last_seen);
    store.save_entity(&survivor).await?;

    store.rewire_relationships(loser.id.0, survivor.id.0).await?;
    store.reassign_intelligence_entity(loser.id.0, survivor.id.0).await?;

    let mut tombstone = loser.clone();
    tombstone.metadata.merged_into = Some(survivor.id);
    tombstone.metadata.merge_reason = Some("merge_entities".to_string());
    tombstone.metadata.merged_at = Some(Utc::now());
    store.save_entity(&tombstone).await?;

    info!(survivor = %survivor.id, tombstoned = %loser.id, "entities merged");
    Ok(survivor)
}

/// Two-pass deduplication sweep (spec §4.9 `deduplicate_entities`):
/// within-kind merge by canonical name, then cross-kind promotion of
/// generic `entity`-kind survivors into a matching more-specific entity.
/// Returns a map `source_id -> target_id` for every merge performed.
pub async fn deduplicate_entities(
    store: &dyn RelationalStore,
    embedder: Option<(&dyn VectorIndex, f32)>,
) -> StoreResult<HashMap<Uuid, Uuid>> {
    let mut merges = HashMap::new();

    // Pass 1: within-kind, grouped by canonical name.
    let live = store.list_live_entities().await?;
    let mut groups: HashMap<(String, String), Vec<Entity>> = HashMap::new();
    for entity in live {
        let key = (canonical(&entity.name), normalize_kind(&entity.kind));
        groups.entry(key).or_default().push(entity);
    }
    for mut group in groups.into_values() {
        if group.len() < 2 {
            continue;
        }
        group.sort_by_key(|e| e.id.0);
        let mut survivor_id = group[0].id.0;
        for other in &group[1..] {
            let survivor = merge_entities(store, survivor_id, other.id.0).await?;
            merges.insert(other.id.0, survivor.id.0);
            survivor_id = survivor.id.0;
        }
    }

    // Pass 2: cross-kind — generic `entity`-kind survivors absorbed into
    // a more-specific entity sharing the same canonical name, in
    // priority order person, org, company, product, location, event.
    const PRIORITY_KINDS: &[&str] = &["person", "org", "company", "product", "location", "event"];
    let live = store.list_live_entities().await?;
    let by_canonical: HashMap<String, Vec<Entity>> = live.into_iter().fold(HashMap::new(), |mut acc, e| {
        acc.entry(canonical(&e.name)).or_default().push(e);
        acc
    });
    for candidates in by_canonical.values() {
        let generic: Vec<&Entity> = candidates.iter().filter(|e| normalize_kind(&e.kind) == "entity").collect();
        if generic.is_empty() {
            continue;
        }
        let specific = PRIORITY_KINDS
            .iter()
            .find_map(|kind| candidates.iter().find(|e| normalize_kind(&e.kind) == *kind));
        if let Some(specific) = specific {
            for generic_entity in generic {
                if generic_entity.id == specific.id {
                    continue;
                }
                let survivor = merge_entities(store, generic_entity.id.0, specific.id.0).await?;
                merges.insert(generic_entity.id.0, survivor.id.0);
            }
        }
    }

    // Optional semantic dedup pass: merge pairs of still-live entities
    // whose name embeddings exceed the similarity threshold and whose
    // kinds are compatible (spec §4.9 "Semantic dedup").
    if let Some((vector_index, threshold)) = embedder {
        let live = store.list_live_entities().await?;
        for entity in &live {
            if merges.contains_key(&entity.id.0) {
                continue;
            }
            let Some(point) = find_entity_point(vector_index, entity.id.0).await? else { continue };
            let filter = PayloadFilter::new().eq("kind", serde_json::json!(KIND_ENTITY));
            let hits = vector_index.search(&point.vector, 5, Some(&filter)).await.map_err(|e| {
                crate::error::StoreError::Invariant(format!("vector search failed: {e}"))
            })?;
            for hit in hits {
                if hit.score < threshold {
                    continue;
                }
                let Some(candidate_id) = hit.point.entity_id() else { continue };
                if candidate_id == entity.id.0 || merges.contains_key(&candidate_id) {
                    continue;
                }
                let Some(candidate) = store.get_entity(candidate_id).await? else { continue };
                if !kinds_compatible(&entity.kind, &candidate.kind) {
                    continue;
                }
                let survivor = merge_entities(store, candidate.id.0, entity.id.0).await?;
                merges.insert(candidate.id.0, survivor.id.0);
            }
        }
    }

    Ok(merges)
}

async fn find_entity_point(
    vector_index: &dyn VectorIndex,
    entity_id: Uuid,
) -> StoreResult<Option<crate::vector::VectorPoint>> {
    Ok(vector_index.get(entity_id).await.map_err(|e| {
        crate::error::StoreError::Invariant(format!("vector lookup failed: {e}"))
    })?)
}

fn kinds_compatible(a: &str, b: &str) -> bool {
    let (na, nb) = (normalize_kind(a), normalize_kind(b));
    if na == nb {
        return true;
    }
    parent_kind(&na) == Some(nb.as_str()) || parent_kind(&nb) == Some(na.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use intel_types::NodeType;

    #[test]
    fn canonicalization_closure_over_suffixes_and_case() {
        assert_eq!(canonical("Microsoft"), canonical("Microsoft Corp."));
        assert_eq!(canonical("Microsoft"), canonical("MICROSOFT CORPORATION"));
        assert_eq!(canonical("Acme, Inc."), canonical("acme inc"));
    }

    #[tokio::test]
    async fn get_or_create_promotes_type_on_more_specific_kind() {
        let store = InMemoryStore::new();
        let (entity, created) =
            get_or_create_entity(&store, "Bill Gates", "person", HashMap::new()).await.unwrap();
        assert!(created);

        let (promoted, created) =
            get_or_create_entity(&store, "Bill Gates", "founder", HashMap::new()).await.unwrap();
        assert!(!created);
        assert_eq!(promoted.id, entity.id);
        assert_eq!(promoted.kind, "founder");
        assert_eq!(promoted.metadata.type_history.len(), 1);
        assert_eq!(promoted.metadata.type_history[0].from, "person");
        assert_eq!(promoted.metadata.type_history[0].to, "founder");
    }

    #[tokio::test]
    async fn merge_preserves_kind_rank_and_never_deletes() {
        let store = InMemoryStore::new();
        let (person, _) = get_or_create_entity(&store, "B. Gates", "person", HashMap::new()).await.unwrap();
        let (founder, _) = get_or_create_entity(&store, "William Gates", "founder", HashMap::new()).await.unwrap();

        let survivor = merge_entities(&store, person.id.0, founder.id.0).await.unwrap();
        assert_eq!(survivor.kind, "founder");

        let tombstone_id = if survivor.id == person.id { founder.id } else { person.id };
        let tombstone = store.get_entity(tombstone_id.0).await.unwrap().unwrap();
        assert_eq!(tombstone.metadata.merged_into, Some(survivor.id));
    }

    #[tokio::test]
    async fn soft_merge_rewires_relationships_and_intel() {
        let store = InMemoryStore::new();
        let (source, _) = get_or_create_entity(&store, "Source Co", "company", HashMap::new()).await.unwrap();
        let (target, _) = get_or_create_entity(&store, "Target Co", "company", HashMap::new()).await.unwrap();
        let other = Uuid::new_v4();

        store
            .upsert_relationship(source.id.0, NodeType::Entity, other, NodeType::Entity, "related_entity", 60.0, None)
            .await
            .unwrap();

        let survivor = merge_entities(&store, source.id.0, target.id.0).await.unwrap();
        let rels = store.list_relationships_for(survivor.id.0).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source_id, survivor.id.0);

        let tombstone_id = if survivor.id == source.id { target.id } else { source.id };
        assert!(store.list_relationships_for(tombstone_id.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deduplicate_collapses_canonical_collisions() {
        let store = InMemoryStore::new();
        get_or_create_entity(&store, "Microsoft Corporation", "org", HashMap::new()).await.unwrap();
        get_or_create_entity(&store, "Microsoft Corp.", "org", HashMap::new()).await.unwrap();
        get_or_create_entity(&store, "Microsoft", "org", HashMap::new()).await.unwrap();

        deduplicate_entities(&store, None).await.unwrap();

        let live = store.list_live_entities().await.unwrap();
        assert_eq!(live.iter().filter(|e| canonical(&e.name) == "microsoft").count(), 1);
    }
}
