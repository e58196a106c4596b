use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::ids::EntityId;

/// A named real-world thing (spec §3). `kind` is an open string so callers
/// can introduce refinements beyond the ones this crate knows the
/// specificity rank of (`specificity_rank` falls back to 1 for unknown
/// kinds, treating them as plain parent-level kinds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub kind: String,
    pub data: HashMap<String, Value>,
    pub metadata: EntityMetadata,
    pub last_seen: DateTime<Utc>,
}

/// Provenance, merge history and type-upgrade history (spec §3). Carried
/// separately from `data` because it is machine-authored bookkeeping, not
/// an extracted fact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub type_history: Vec<TypeHistoryEntry>,
    pub merge_history: Vec<MergeHistoryEntry>,
    /// Set when this entity has been soft-merged into another; a
    /// non-`None` value makes this entity a tombstone (spec §3 invariant
    /// 2): invisible to dedup, graph walks, and new writes.
    pub merged_into: Option<EntityId>,
    pub merged_at: Option<DateTime<Utc>>,
    pub merge_reason: Option<String>,
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeHistoryEntry {
    pub from: String,
    pub to: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeHistoryEntry {
    pub merged_from: EntityId,
    pub merged_from_name: String,
    pub merged_from_kind: String,
    pub at: DateTime<Utc>,
}

impl Entity {
    pub fn new(name: impl Into<String>, kind: impl Into<String>, data: HashMap<String, Value>) -> Self {
        Self {
            id: EntityId::new(),
            name: name.into(),
            kind: kind.into(),
            data,
            metadata: EntityMetadata::default(),
            last_seen: Utc::now(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.metadata.merged_into.is_some()
    }
}

/// Organization synonyms that normalize to `org` (spec §4.9 "Identity").
pub const ORG_SYNONYMS: &[&str] = &[
    "organization",
    "organisation",
    "corporation",
    "corp",
    "company",
    "business",
    "firm",
];

/// Parent -> subtype kind hierarchy (spec §4.9 "Type hierarchy").
pub fn parent_kind(specialized: &str) -> Option<&'static str> {
    match specialized {
        "ceo" | "founder" | "cto" | "chairman" => Some("person"),
        "headquarters" | "office" => Some("location"),
        "subsidiary" => Some("company"),
        _ => None,
    }
}

/// Normalizes a raw kind string into its identity-bearing form: org
/// synonyms collapse to `org`; persons stay `person`; more specific kinds
/// (ceo, founder, headquarters, subsidiary, ...) are preserved verbatim.
pub fn normalize_kind(kind: &str) -> String {
    let lower = kind.trim().to_lowercase();
    if ORG_SYNONYMS.contains(&lower.as_str()) {
        "org".to_string()
    } else {
        lower
    }
}

/// Specificity rank used to choose merge survivors and to gate type
/// promotion (spec §4.9): generic = 0, parent kinds = 1, specialized
/// kinds = 2. Unrecognized kinds are treated as parent-level (rank 1)
/// since they carry more information than a bare "entity"/"general".
pub fn specificity_rank(kind: &str) -> u8 {
    let lower = kind.trim().to_lowercase();
    match lower.as_str() {
        "entity" | "general" | "unknown" | "" => 0,
        "ceo" | "founder" | "cto" | "chairman" | "headquarters" | "office" | "subsidiary" => 2,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_synonyms_collapse() {
        for syn in ORG_SYNONYMS {
            assert_eq!(normalize_kind(syn), "org");
        }
        assert_eq!(normalize_kind("Corporation"), "org");
    }

    #[test]
    fn specificity_rank_orders_generic_below_parent_below_specialized() {
        assert!(specificity_rank("entity") < specificity_rank("person"));
        assert!(specificity_rank("person") < specificity_rank("founder"));
        assert_eq!(specificity_rank("ceo"), 2);
    }

    #[test]
    fn parent_kind_hierarchy() {
        assert_eq!(parent_kind("ceo"), Some("person"));
        assert_eq!(parent_kind("headquarters"), Some("location"));
        assert_eq!(parent_kind("subsidiary"), Some("company"));
        assert_eq!(parent_kind("person"), None);
    }
}
