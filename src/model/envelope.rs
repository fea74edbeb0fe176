//! Persisted envelope around a snapshot.
//!
//! Wire format under the fixed key:
//!
//! ```json
//! {"data":{"compressed":true,"data":"{\"fullName\":\"Ada\"}"},"timestamp":"2026-01-05T10:00:00.000Z","version":"2.0.0"}
//! ```
//!
//! Legacy `1.0.0` records carry the raw payload object directly under
//! `data`.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::model::Snapshot;

/// Schema version written by this build.
pub const SCHEMA_VERSION: &str = "2.0.0";

/// The persisted record wrapping a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Snapshot payload, possibly in compressed form.
    #[serde(rename = "data")]
    pub payload: Value,

    /// When the envelope was produced.
    #[serde(rename = "timestamp", with = "iso_millis")]
    pub saved_at: DateTime<Utc>,

    /// Version of the producer. Readers must check this before
    /// interpreting `payload`.
    #[serde(rename = "version")]
    pub schema_version: String,
}

impl Envelope {
    /// Wrap a snapshot in a current-version envelope.
    ///
    /// # Errors
    ///
    /// Returns `Error::EmptySnapshot` if the snapshot has no non-empty
    /// fields, or a JSON error if it cannot be serialized.
    pub fn seal(snapshot: &Snapshot, saved_at: DateTime<Utc>) -> Result<Self> {
        let compacted = compact(serde_json::to_value(snapshot)?);
        if compacted.as_object().is_none_or(Map::is_empty) {
            return Err(Error::EmptySnapshot);
        }

        Ok(Self {
            payload: serde_json::json!({
                "compressed": true,
                "data": serde_json::to_string(&compacted)?,
            }),
            saved_at: saved_at.trunc_subsecs(3),
            schema_version: SCHEMA_VERSION.to_string(),
        })
    }

    /// Whether this envelope was produced by the current schema version.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.schema_version == SCHEMA_VERSION
    }

    /// Parse an envelope from its stored string form.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the string is not an envelope.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Serialize to the stored string form.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The payload with compression undone.
    ///
    /// Compressed payloads hold the snapshot as a JSON string; anything else
    /// (including `{"compressed": false, ...}`) is returned as stored.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a compressed payload's inner string does not
    /// parse.
    pub fn unpack(&self) -> serde_json::Result<Value> {
        match &self.payload {
            Value::Object(map) if map.get("compressed") == Some(&Value::Bool(true)) => {
                let inner = map.get("data").and_then(Value::as_str).unwrap_or("{}");
                serde_json::from_str(inner)
            }
            other => Ok(other.clone()),
        }
    }
}

/// Drop `null` values and empty strings, recursively.
///
/// Array elements that reduce to nothing are dropped as well, so
/// `["rust", ""]` compacts to `["rust"]`.
#[must_use]
pub fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !is_blank(v))
                .map(|(k, v)| (k, compact(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !is_blank(v))
                .map(compact)
                .collect(),
        ),
        other => other,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// ISO-8601 with millisecond precision, the form browsers emit.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
