//! HTTP-backed `VectorIndex` against a Qdrant-shaped REST endpoint (spec
//! §6 "Vector index endpoint": create-collection, upsert points
//! `{id, vector[D], payload{}}`, query by vector with limit and optional
//! equality filter on payload fields). Built the way `llm-client`'s
//! `OllamaLlmClient` is built: a `reqwest::Client` + base url +
//! `tracing` instrumentation on every call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PayloadFilter, VectorHit, VectorIndex, VectorPoint};
use crate::error::VectorIndexError;

pub struct QdrantVectorIndex {
    http_client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl QdrantVectorIndex {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection: collection.into(),
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.base_url, self.collection)
    }
}

#[derive(Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

#[derive(Serialize)]
struct UpsertRequest {
    points: Vec<QdrantPoint>,
}

#[derive(Serialize)]
struct QdrantPoint {
    id: Uuid,
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

#[derive(Serialize)]
struct SearchRequest {
    vector: Vec<f32>,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<QdrantFilter>,
    with_payload: bool,
    with_vector: bool,
}

#[derive(Serialize)]
struct QdrantFilter {
    must: Vec<QdrantFieldCondition>,
}

#[derive(Serialize)]
struct QdrantFieldCondition {
    key: String,
    #[serde(rename = "match")]
    match_: QdrantMatch,
}

#[derive(Serialize)]
struct QdrantMatch {
    value: Value,
}

#[derive(Deserialize)]
struct SearchResponse {
    result: Vec<SearchResultPoint>,
}

#[derive(Deserialize)]
struct SearchResultPoint {
    id: Uuid,
    score: f32,
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    vector: Vec<f32>,
}

#[derive(Deserialize)]
struct GetPointResponse {
    result: Option<GetPointResult>,
}

#[derive(Deserialize)]
struct GetPointResult {
    #[serde(default)]
    payload: Map<String, Value>,
    #[serde(default)]
    vector: Vec<f32>,
}

fn to_qdrant_filter(filter: &PayloadFilter) -> Option<QdrantFilter> {
    if filter.equals.is_empty() {
        return None;
    }
    Some(QdrantFilter {
        must: filter
            .equals
            .iter()
            .map(|(key, value)| QdrantFieldCondition {
                key: key.clone(),
                match_: QdrantMatch { value: value.clone() },
            })
            .collect(),
    })
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn ensure_collection(&self, dim: usize) -> Result<(), VectorIndexError> {
        let request = CreateCollectionRequest { vectors: VectorParams { size: dim, distance: "Cosine" } };
        let response = self
            .http_client
            .put(self.collection_url())
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorIndexError::Network(e.to_string()))?;
        // Qdrant returns 409/400 if the collection already exists; that is
        // not a failure for an idempotent ensure (spec §4.5 "auto-creation
        // on first use").
        if !response.status().is_success() && response.status().as_u16() != 409 {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "collection create failed");
            return Err(VectorIndexError::Endpoint(format!("status {status}: {body}")));
        }
        Ok(())
    }

    async fn upsert(&self, point: VectorPoint) -> Result<(), VectorIndexError> {
        let request = UpsertRequest {
            points: vec![QdrantPoint { id: point.id, vector: point.vector, payload: point.payload }],
        };
        let response = self
            .http_client
            .put(format!("{}/points", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorIndexError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(VectorIndexError::Endpoint(format!("upsert status {status}")));
        }
        debug!(collection = %self.collection, "vector point upserted");
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: Option<&PayloadFilter>,
    ) -> Result<Vec<VectorHit>, VectorIndexError> {
        let request = SearchRequest {
            vector: vector.to_vec(),
            limit: top_k,
            filter: filter.and_then(to_qdrant_filter),
            with_payload: true,
            with_vector: true,
        };
        let response = self
            .http_client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| VectorIndexError::Network(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            return Err(VectorIndexError::Endpoint(format!("search status {status}")));
        }
        let parsed: SearchResponse =
            response.json().await.map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
        Ok(parsed
            .result
            .into_iter()
            .map(|p| VectorHit {
                point: VectorPoint { id: p.id, vector: p.vector, payload: p.payload },
                score: p.score,
            })
            .collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VectorPoint>, VectorIndexError> {
        let response = self
            .http_client
            .get(format!("{}/points/{}", self.collection_url(), id))
            .send()
            .await
            .map_err(|e| VectorIndexError::Network(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(VectorIndexError::Endpoint(format!("get status {status}")));
        }
        let parsed: GetPointResponse =
            response.json().await.map_err(|e| VectorIndexError::Serialization(e.to_string()))?;
        Ok(parsed.result.map(|r| VectorPoint { id, vector: r.vector, payload: r.payload }))
    }
}
