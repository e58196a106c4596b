//! Gap Analyzer: compares an Entity's known data fields against a
//! per-kind expected-field catalogue, producing a completeness score and
//! missing-field list with suggested search-query templates (spec
//! §4.8). Consumed by the Agent Service's Investigate & Relate mode.

use intel_types::Entity;

#[derive(Debug, Clone)]
pub struct MissingField {
    pub field: String,
    pub query_templates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct GapReport {
    pub completeness: f64,
    pub missing_fields: Vec<MissingField>,
}

/// Expected fields per normalized entity kind (spec §4.8: "a company is
/// expected to have industry, founded, website, locations, key persons;
/// a person: title/role, bio, affiliation").
fn expected_fields(kind: &str) -> &'static [&'static str] {
    match kind {
        "org" | "company" | "subsidiary" => {
            &["industry", "founded", "website", "locations", "key_persons"]
        }
        "person" | "ceo" | "founder" | "cto" | "chairman" => &["title", "bio", "affiliation"],
        "location" | "headquarters" | "office" => &["address", "country"],
        "product" => &["category", "description"],
        "event" => &["date", "location"],
        _ => &["description"],
    }
}

fn query_templates_for(entity_name: &str, entity_type: &str, field: &str) -> Vec<String> {
    vec![
        format!("\"{entity_name}\" {field}"),
        format!("\"{entity_name}\" \"{entity_type}\" {field}"),
    ]
}

/// Produces a completeness score in `[0,1]` and the list of missing
/// fields with suggested query templates (spec §4.8).
pub fn analyze(entity: &Entity) -> GapReport {
    let normalized_kind = intel_types::entity::normalize_kind(&entity.kind);
    let fields = expected_fields(&normalized_kind);

    let missing_fields: Vec<MissingField> = fields
        .iter()
        .filter(|field| !has_value(entity, field))
        .map(|field| MissingField {
            field: field.to_string(),
            query_templates: query_templates_for(&entity.name, &entity.kind, field),
        })
        .collect();

    let completeness = if fields.is_empty() {
        1.0
    } else {
        (fields.len() - missing_fields.len()) as f64 / fields.len() as f64
    };

    GapReport { completeness, missing_fields }
}

fn has_value(entity: &Entity, field: &str) -> bool {
    entity
        .data
        .get(*field)
        .map(|v| !matches!(v, serde_json::Value::Null) && v != &serde_json::Value::String(String::new()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn full_company_data_has_completeness_one() {
        let mut data = HashMap::new();
        for field in expected_fields("company") {
            data.insert(field.to_string(), serde_json::json!("known"));
        }
        let entity = Entity::new("Acme", "company", data);
        let report = analyze(&entity);
        assert_eq!(report.completeness, 1.0);
        assert!(report.missing_fields.is_empty());
    }

    #[test]
    fn missing_fields_produce_query_templates() {
        let entity = Entity::new("Acme", "company", HashMap::new());
        let report = analyze(&entity);
        assert_eq!(report.completeness, 0.0);
        assert_eq!(report.missing_fields.len(), 5);
        assert!(report.missing_fields[0].query_templates[0].contains("Acme"));
    }
}
