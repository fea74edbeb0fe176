//! Content fingerprints for change detection.
//!
//! Auto-save compares the fingerprint of the snapshot it is about to write
//! with the one it wrote last, so an unchanged form costs one hash and no
//! storage round trip.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::model::compact;

/// SHA-256 of a value's JSON form, as lowercase hex.
///
/// # Errors
///
/// Returns a JSON error if the value cannot be serialized.
pub fn content_hash<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of what would actually be persisted for `value`.
///
/// Null and empty-string fields are dropped first, so two snapshots that
/// differ only in blank fields fingerprint the same.
///
/// # Errors
///
/// Returns a JSON error if the value cannot be serialized.
pub fn snapshot_fingerprint<T: Serialize>(value: &T) -> serde_json::Result<String> {
    content_hash(&compact(serde_json::to_value(value)?))
}

/// Check whether content has changed since it was last stored.
///
/// Returns `true` when nothing was stored or the hashes differ.
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Snapshot;

    #[test]
    fn test_content_hash_deterministic() {
        let value = serde_json::json!({"fullName": "Ada", "skills": ["rust"]});
        let hash1 = content_hash(&value).unwrap();
        let hash2 = content_hash(&value).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_fingerprint_ignores_blank_fields() {
        let mut a = Snapshot::default();
        a.personal.full_name = "Ada".into();
        let mut b = a.clone();
        b.extra.insert("lastSaved".into(), serde_json::Value::Null);

        assert_eq!(
            snapshot_fingerprint(&a).unwrap(),
            snapshot_fingerprint(&b).unwrap()
        );

        b.personal.email = "ada@example.com".into();
        assert_ne!(
            snapshot_fingerprint(&a).unwrap(),
            snapshot_fingerprint(&b).unwrap()
        );
    }

    #[test]
    fn test_has_changed() {
        assert!(has_changed("abc123", None));
        assert!(has_changed("abc123", Some("xyz789")));
        assert!(!has_changed("abc123", Some("abc123")));
    }
}
