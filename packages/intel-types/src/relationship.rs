use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::RelationshipId;

/// Which table a relationship endpoint's id refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Entity,
    Page,
    Intelligence,
}

/// A directed, typed edge between any two nodes (spec §3). Deduplicated
/// by `(source_id, target_id, relation_type)`; repeated observation
/// increments `occurrence_count` and boosts `confidence` rather than
/// inserting a second row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub source_id: uuid::Uuid,
    pub source_type: NodeType,
    pub target_id: uuid::Uuid,
    pub target_type: NodeType,
    pub relation_type: String,
    pub confidence: f64,
    pub occurrence_count: u32,
    pub source_urls: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        source_id: uuid::Uuid,
        source_type: NodeType,
        target_id: uuid::Uuid,
        target_type: NodeType,
        relation_type: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RelationshipId::new(),
            source_id,
            source_type,
            target_id,
            target_type,
            relation_type: relation_type.into(),
            confidence,
            occurrence_count: 1,
            source_urls: Vec::new(),
            last_seen: now,
        }
    }

    /// Identity key used for upsert/idempotency (spec §3 invariant).
    pub fn identity_key(&self) -> (uuid::Uuid, uuid::Uuid, String) {
        (self.source_id, self.target_id, self.relation_type.clone())
    }

    /// Records a repeated observation: bumps the occurrence count and
    /// nudges confidence upward without ever decreasing it (spec §8
    /// "Idempotent relationship upsert": occurrence_count monotonic
    /// non-decreasing).
    pub fn observe_again(&mut self, new_confidence: f64, source_url: Option<&str>) {
        self.occurrence_count += 1;
        self.confidence = self.confidence.max(new_confidence);
        self.last_seen = Utc::now();
        if let Some(url) = source_url {
            if !self.source_urls.iter().any(|u| u == url) {
                self.source_urls.push(url.to_string());
            }
        }
    }
}
