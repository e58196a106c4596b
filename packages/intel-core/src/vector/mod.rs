//! Vector Index: upsert/search dense vectors with an open payload map and
//! equality filters (spec §4.5). Collection auto-creates on first use
//! with the configured dimension and cosine distance (spec §6).

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::VectorResult;

/// The kinds of point a payload's `kind` field may carry (spec §4.5,
/// §4.7g/i, §9 "build_embeddings_for_page").
pub const KIND_PAGE_RAW: &str = "page_raw";
pub const KIND_PAGE_TITLE: &str = "page_title";
pub const KIND_PAGE_DESCRIPTION: &str = "page_description";
pub const KIND_PAGE_SUMMARY: &str = "page_summary";
pub const KIND_PAGE_URL: &str = "page_url";
pub const KIND_PAGE_SENTENCE: &str = "page_sentence";
pub const KIND_FINDING: &str = "finding";
pub const KIND_ENTITY: &str = "entity";

/// One point to upsert: a UUID id, a dense vector, and an open payload
/// map. The payload carries at minimum `kind`, `url` (when applicable),
/// `entity`, `entity_type`, and the cross-reference ids `sql_page_id`/
/// `sql_intel_id`/`sql_entity_id` (spec §4.5).
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: Map<String, Value>,
}

impl VectorPoint {
    pub fn new(id: Uuid, vector: Vec<f32>) -> Self {
        Self { id, vector, payload: Map::new() }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> Option<&str> {
        self.payload.get("kind").and_then(|v| v.as_str())
    }

    pub fn page_id(&self) -> Option<Uuid> {
        self.payload.get("sql_page_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
    }

    pub fn intel_id(&self) -> Option<Uuid> {
        self.payload.get("sql_intel_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
    }

    pub fn entity_id(&self) -> Option<Uuid> {
        self.payload.get("sql_entity_id").and_then(|v| v.as_str()).and_then(|s| s.parse().ok())
    }

    pub fn chunk_index(&self) -> Option<i64> {
        self.payload.get("chunk_index").and_then(|v| v.as_i64())
    }
}

/// An equality filter on payload fields (spec §4.5 "honoring an optional
/// equality filter on payload fields").
#[derive(Debug, Clone, Default)]
pub struct PayloadFilter {
    pub equals: Vec<(String, Value)>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    fn matches(&self, payload: &Map<String, Value>) -> bool {
        self.equals.iter().all(|(field, value)| payload.get(field) == Some(value))
    }
}

/// One search hit: the point plus its similarity score.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub point: VectorPoint,
    pub score: f32,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Ensures the backing collection exists with the given dimension
    /// and cosine distance (spec §4.5, §6). Implementations are
    /// idempotent: calling this repeatedly is not an error.
    async fn ensure_collection(&self, dim: usize) -> VectorResult<()>;

    async fn upsert(&self, point: VectorPoint) -> VectorResult<()>;

    async fn upsert_batch(&self, points: Vec<VectorPoint>) -> VectorResult<()> {
        for point in points {
            self.upsert(point).await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> VectorResult<Vec<VectorHit>>;

    /// Fetches a single point by id, used to hydrate neighbouring
    /// sentence vectors during snippet expansion (spec §4.12 Phase 2).
    async fn get(&self, id: Uuid) -> VectorResult<Option<VectorPoint>>;
}

/// Fixed namespace UUID for deterministic vector-point ids, derived from
/// `(page url, kind, ordinal)` (spec §4.5: "a deterministic id derived
/// from the page URL, kind, and ordinal"). Shared by the Explorer (to
/// write points) and the RAG Answerer (to reconstruct a neighbour's id
/// for snippet expansion without a lookup-by-page-and-index query).
const VECTOR_POINT_NAMESPACE: Uuid = Uuid::from_bytes([
    0x2a, 0x9e, 0x61, 0x0d, 0x77, 0x1b, 0x4c, 0x3f, 0x9a, 0x55, 0x0e, 0x1d, 0x2c, 0x3b, 0x4a, 0x59,
]);

pub fn vector_point_id(url: &str, kind: &str, ordinal: usize) -> Uuid {
    Uuid::new_v5(&VECTOR_POINT_NAMESPACE, format!("{url}|{kind}|{ordinal}").as_bytes())
}

/// Cosine similarity between two equal-length vectors; `0.0` if either
/// is zero-length or the lengths differ (dimension mismatch is reported
/// by implementations, not silently coerced here).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_vectors_have_similarity_one() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        assert!((cosine_similarity(&[1.0, 0.0], &[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn mismatched_lengths_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
