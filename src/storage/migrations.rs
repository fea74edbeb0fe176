//! Payload migrations between schema versions.
//!
//! Each step rewrites the raw JSON payload of one version into the shape of
//! the next. Steps are chained until the current version is reached; a
//! version with no registered step yields [`Migration::NoPath`] instead of
//! being passed through silently.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::model::{EntryId, EntryIdAllocator, Snapshot, SCHEMA_VERSION};

/// A single migration step between two payload versions.
struct Step {
    from: &'static str,
    to: &'static str,
    apply: fn(Value) -> Value,
}

/// All known steps. `from` values are unique.
const MIGRATIONS: &[Step] = &[Step {
    from: "1.0.0",
    to: "2.0.0",
    apply: legacy_v1_to_v2,
}];

/// Collections of id-keyed entries and the field an entry must have to
/// survive a legacy migration or an import.
pub const ENTRY_COLLECTIONS: [(&str, &str); 2] = [("education", "degree"), ("experience", "title")];

/// Result of [`migrate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Migration {
    /// The payload was brought up to the current version.
    Upgraded(Snapshot),

    /// No chain of steps leads from `from` to the current version.
    NoPath { from: String, payload: Value },
}

/// Bring a payload written by version `from` up to the current version.
///
/// Pure: touches no storage and emits nothing.
///
/// # Errors
///
/// Returns `Error::CorruptRecord` if the migrated payload does not decode
/// as a snapshot.
pub fn migrate(payload: Value, from: &str) -> Result<Migration> {
    let mut version = from;
    let mut value = payload;

    while version != SCHEMA_VERSION {
        let Some(step) = MIGRATIONS.iter().find(|s| s.from == version) else {
            warn!(from, "No migration path to {SCHEMA_VERSION}");
            return Ok(Migration::NoPath {
                from: from.to_string(),
                payload: value,
            });
        };

        info!(from = step.from, to = step.to, "Applying migration");
        value = (step.apply)(value);
        version = step.to;
    }

    decode_snapshot(value)
        .map(Migration::Upgraded)
        .map_err(|e| Error::CorruptRecord {
            key: "data".to_string(),
            reason: format!("migrated payload from {from}: {e}"),
        })
}

/// Decode a current-version payload into a snapshot.
///
/// Tolerates entry collections stored as id-keyed maps and skills stored as
/// a comma-separated string. No entries are dropped.
///
/// # Errors
///
/// Returns a JSON error if the payload is not a snapshot.
pub fn decode_snapshot(mut value: Value) -> serde_json::Result<Snapshot> {
    if let Value::Object(map) = &mut value {
        for (field, _) in ENTRY_COLLECTIONS {
            normalize_field(map, field, None);
        }
        if let Some(skills) = map.get_mut("skills") {
            normalize_skills(skills);
        }
    }
    serde_json::from_value(value)
}

fn legacy_v1_to_v2(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        for (field, required) in ENTRY_COLLECTIONS {
            normalize_field(map, field, Some(required));
        }
        if let Some(skills) = map.get_mut("skills") {
            normalize_skills(skills);
        }
    }
    value
}

fn normalize_field(map: &mut Map<String, Value>, field: &str, required: Option<&str>) {
    if let Some(entries) = map.remove(field) {
        map.insert(field.to_string(), normalize_entries(entries, required));
    }
}

/// Turn an entry collection into an ordered sequence of entries with ids.
///
/// Accepts an id-keyed map (`{"1": {...}, "3": {...}}`) or a sequence.
/// Map keys that are positive integers become the entry id, ordered
/// numerically; otherwise an entry's own `id` is kept. Entries left without
/// a usable, unique id are numbered after the largest id seen. When
/// `required` is given, entries whose `required` field is blank are dropped.
/// Anything that is not a map or a sequence becomes an empty sequence.
#[must_use]
pub fn normalize_entries(entries: Value, required: Option<&str>) -> Value {
    let mut keyed: Vec<(Option<u32>, Value)> = match entries {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (parse_id(&Value::String(k)), v))
            .collect(),
        Value::Array(items) => items.into_iter().map(|v| (None, v)).collect(),
        _ => Vec::new(),
    };
    // Integer-like keys first, ascending, then the rest in their stored order.
    keyed.sort_by_key(|(id, _)| id.map_or((1, 0), |n| (0, n)));

    let mut kept: Vec<(Option<u32>, Map<String, Value>)> = keyed
        .into_iter()
        .filter_map(|(key_id, entry)| match entry {
            Value::Object(obj) => Some((key_id, obj)),
            _ => None,
        })
        .filter(|(_, obj)| required.is_none_or(|field| obj.get(field).is_some_and(is_truthy)))
        .collect();

    let mut used = std::collections::BTreeSet::new();
    for (key_id, obj) in &mut kept {
        let candidate = key_id.or_else(|| obj.get("id").and_then(parse_id));
        *key_id = candidate.filter(|id| used.insert(*id));
    }

    let mut ids = EntryIdAllocator::seeded(used.into_iter().filter_map(EntryId::new));
    Value::Array(
        kept.into_iter()
            .filter_map(|(id, mut obj)| {
                let id = match id {
                    Some(id) => id,
                    None => ids.allocate()?.get(),
                };
                obj.insert("id".to_string(), Value::from(id));
                Some(Value::Object(obj))
            })
            .collect(),
    )
}

/// Split a comma-separated skills string into trimmed, non-empty strings.
///
/// Sequences and other shapes are left as they are.
pub fn normalize_skills(skills: &mut Value) {
    if let Value::String(raw) = skills {
        *skills = Value::Array(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| Value::String(s.to_string()))
                .collect(),
        );
    }
}

fn parse_id(value: &Value) -> Option<u32> {
    let id = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse::<u32>().ok(),
        _ => None,
    };
    id.filter(|&n| n > 0)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn upgraded(migration: Migration) -> Snapshot {
        match migration {
            Migration::Upgraded(snapshot) => snapshot,
            Migration::NoPath { from, .. } => panic!("no path from {from}"),
        }
    }

    #[test]
    fn test_legacy_map_and_skill_string() {
        let payload = json!({
            "education": {"1": {"degree": "BSc"}},
            "skills": "go, rust"
        });

        let snapshot = upgraded(migrate(payload, "1.0.0").unwrap());

        assert_eq!(snapshot.education.len(), 1);
        assert_eq!(snapshot.education[0].id, EntryId::new(1).unwrap());
        assert_eq!(snapshot.education[0].degree, "BSc");
        assert_eq!(snapshot.skills, vec!["go", "rust"]);
    }

    #[test]
    fn test_legacy_drops_entries_without_required_field() {
        let payload = json!({
            "education": {"1": {"degree": "BSc"}, "2": {"institution": "MIT"}},
            "experience": {"4": {"title": "Engineer"}, "7": {"title": ""}},
            "skills": " , rust,, "
        });

        let snapshot = upgraded(migrate(payload, "1.0.0").unwrap());

        assert_eq!(snapshot.education.len(), 1);
        assert_eq!(snapshot.experience.len(), 1);
        assert_eq!(snapshot.experience[0].id.get(), 4);
        assert_eq!(snapshot.skills, vec!["rust"]);
    }

    #[test]
    fn test_map_keys_order_numerically() {
        let value = normalize_entries(
            json!({"10": {"degree": "PhD"}, "2": {"degree": "BSc"}}),
            Some("degree"),
        );
        assert_eq!(value, json!([{"degree": "BSc", "id": 2}, {"degree": "PhD", "id": 10}]));
    }

    #[test]
    fn test_entries_without_ids_are_numbered_after_max() {
        let value = normalize_entries(
            json!([{"title": "A", "id": 5}, {"title": "B"}, {"title": "C", "id": 5}]),
            None,
        );
        let ids: Vec<u64> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["id"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![5, 6, 7]);
    }

    #[test]
    fn test_entries_past_id_space_are_dropped() {
        let value = normalize_entries(json!([{"title": "A", "id": u32::MAX}, {"title": "B"}]), None);
        assert_eq!(value, json!([{"title": "A", "id": u32::MAX}]));
    }

    #[test]
    fn test_unknown_version_is_no_path() {
        let payload = json!({"fullName": "Ada"});
        let result = migrate(payload.clone(), "0.9.0").unwrap();
        assert_eq!(
            result,
            Migration::NoPath {
                from: "0.9.0".to_string(),
                payload
            }
        );
    }

    #[test]
    fn test_current_version_decodes_directly() {
        let payload = json!({"fullName": "Ada", "education": [{"id": 3, "degree": "BSc"}]});
        let snapshot = upgraded(migrate(payload, SCHEMA_VERSION).unwrap());
        assert_eq!(snapshot.personal.full_name, "Ada");
        assert_eq!(snapshot.education[0].id.get(), 3);
    }

    #[test]
    fn test_undecodable_payload_is_corrupt() {
        let result = migrate(json!({"currentStep": "three"}), "1.0.0");
        assert!(matches!(result, Err(Error::CorruptRecord { .. })));
    }

    #[test]
    fn test_decode_keeps_blank_entries() {
        let snapshot = decode_snapshot(json!({"education": {"1": {}}})).unwrap();
        assert_eq!(snapshot.education.len(), 1);
    }

    #[test]
    fn test_registry_reaches_current_version() {
        let last = MIGRATIONS.last().map(|s| s.to);
        assert_eq!(last, Some(SCHEMA_VERSION));
    }
}
