//! In-memory `VectorIndex` for tests and for running the Explorer /
//! Answerer without a live vector database, in the teacher's
//! `MockStorage` style (a `Mutex`-guarded map).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{cosine_similarity, PayloadFilter, VectorHit, VectorIndex, VectorPoint};
use crate::error::VectorResult;

#[derive(Default)]
pub struct InMemoryVectorIndex {
    points: Mutex<HashMap<Uuid, VectorPoint>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(&self, _dim: usize) -> VectorResult<()> {
        Ok(())
    }

    async fn upsert(&self, point: VectorPoint) -> VectorResult<()> {
        self.points.lock().unwrap().insert(point.id, point);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> VectorResult<Vec<VectorHit>> {
        let points = self.points.lock().unwrap();
        let mut hits: Vec<VectorHit> = points
            .values()
            .filter(|point| filter.map(|f| f.matches(&point.payload)).unwrap_or(true))
            .map(|point| VectorHit {
                point: point.clone(),
                score: cosine_similarity(vector, &point.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get(&self, id: Uuid) -> VectorResult<Option<VectorPoint>> {
        Ok(self.points.lock().unwrap().get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn search_honors_filter_and_top_k() {
        let index = InMemoryVectorIndex::new();
        for i in 0..5 {
            let point = VectorPoint::new(Uuid::new_v4(), vec![1.0, i as f32])
                .with_payload("kind", json!(if i % 2 == 0 { "page_raw" } else { "finding" }));
            index.upsert(point).await.unwrap();
        }
        let filter = PayloadFilter::new().eq("kind", json!("page_raw"));
        let hits = index.search(&[1.0, 0.0], 10, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|h| h.point.kind() == Some("page_raw")));
    }

    #[tokio::test]
    async fn near_duplicate_detection_via_top1_similarity() {
        let index = InMemoryVectorIndex::new();
        let existing = VectorPoint::new(Uuid::new_v4(), vec![1.0, 0.0, 0.0])
            .with_payload("kind", json!("page_raw"));
        index.upsert(existing).await.unwrap();

        let filter = PayloadFilter::new().eq("kind", json!("page_raw"));
        let hits = index.search(&[1.0, 0.0001, 0.0], 1, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].score > 0.96);
    }
}
