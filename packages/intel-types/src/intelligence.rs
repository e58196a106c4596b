use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{EntityId, IntelId, PageId};

/// One verified fact-cluster extracted from one page about one primary
/// entity (spec §3). Immutable once created; tombstoned (not deleted) if
/// its entity is later merged away.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intelligence {
    pub id: IntelId,
    pub page_id: PageId,
    pub entity_id: EntityId,
    pub confidence: u8,
    pub findings: Vec<Finding>,
    pub created_at: DateTime<Utc>,
    pub tombstoned: bool,
}

impl Intelligence {
    pub fn new(page_id: PageId, entity_id: EntityId, confidence: u8, findings: Vec<Finding>) -> Self {
        Self {
            id: IntelId::new(),
            page_id,
            entity_id,
            confidence,
            findings,
            created_at: Utc::now(),
            tombstoned: false,
        }
    }
}

/// The intel schema sections (spec §4.4/§9), modeled as tagged variants
/// of one sum type rather than the source's loose dict-of-dicts. Every
/// variant keeps an open `extras` map for fields the schema doesn't yet
/// name explicitly, preserving forward compatibility with the dynamic
/// attribute bags the source produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "snake_case")]
pub enum Finding {
    BasicInfo {
        fields: Map<String, Value>,
        extras: Map<String, Value>,
    },
    Person {
        name: String,
        role: Option<String>,
        extras: Map<String, Value>,
    },
    Metric {
        label: String,
        value: Value,
        unit: Option<String>,
        extras: Map<String, Value>,
    },
    Location {
        label: String,
        address: Option<String>,
        extras: Map<String, Value>,
    },
    Financial {
        label: String,
        value: Value,
        currency: Option<String>,
        extras: Map<String, Value>,
    },
    Product {
        name: String,
        description: Option<String>,
        extras: Map<String, Value>,
    },
    Event {
        label: String,
        at: Option<DateTime<Utc>>,
        extras: Map<String, Value>,
    },
    Relationship {
        related_entity: String,
        relation_type: String,
        extras: Map<String, Value>,
    },
}

impl Finding {
    pub fn section_name(&self) -> &'static str {
        match self {
            Finding::BasicInfo { .. } => "basic_info",
            Finding::Person { .. } => "persons",
            Finding::Metric { .. } => "metrics",
            Finding::Location { .. } => "locations",
            Finding::Financial { .. } => "financials",
            Finding::Product { .. } => "products",
            Finding::Event { .. } => "events",
            Finding::Relationship { .. } => "relationships",
        }
    }
}
