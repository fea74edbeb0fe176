//! Backup and restore.
//!
//! A backup is the loaded snapshot in a small JSON wrapper:
//!
//! ```json
//! {"data": {...}, "timestamp": "2026-01-05T10:00:00.000Z", "version": "2.0.0", "type": "backup"}
//! ```
//!
//! Restore only accepts backups written by the same schema version.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Snapshot, SCHEMA_VERSION};
use crate::storage::migrations::decode_snapshot;
use crate::storage::{BackingStore, PersistenceStore};
use crate::transfer::export::{ExportFile, ExportFormat};

/// `type` tag of backup documents.
pub const BACKUP_TYPE: &str = "backup";

/// A backup document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backup {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Back up the stored snapshot, stamped with `now`.
///
/// # Errors
///
/// Returns `Error::NoData` if nothing loadable is stored.
pub fn create_backup<B: BackingStore>(
    store: &PersistenceStore<B>,
    now: DateTime<Utc>,
) -> Result<ExportFile> {
    let snapshot = store.load().ok_or(Error::NoData)?;
    let backup = Backup {
        data: Some(serde_json::to_value(&snapshot)?),
        timestamp: Some(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        version: Some(SCHEMA_VERSION.to_string()),
        kind: Some(BACKUP_TYPE.to_string()),
    };

    Ok(ExportFile {
        filename: format!("cv-backup-{}.json", now.format("%Y-%m-%d")),
        content: serde_json::to_string_pretty(&backup)?,
        format: ExportFormat::Json,
    })
}

/// Restore a backup document and save it.
///
/// # Errors
///
/// - `Error::InvalidImportFile` if the content is not a backup, lacks
///   `data` or `timestamp`, or was written by another schema version
/// - any error from [`PersistenceStore::save`]
pub fn restore_backup<B: BackingStore>(
    store: &PersistenceStore<B>,
    content: &str,
) -> Result<Snapshot> {
    let backup: Backup = serde_json::from_str(content)
        .map_err(|e| Error::InvalidImportFile(format!("not a backup file: {e}")))?;

    let (Some(data), Some(_), Some(SCHEMA_VERSION)) =
        (backup.data, backup.timestamp, backup.version.as_deref())
    else {
        return Err(Error::InvalidImportFile(
            "Invalid or incompatible backup file".to_string(),
        ));
    };
    if data.is_null() {
        return Err(Error::InvalidImportFile(
            "Invalid or incompatible backup file".to_string(),
        ));
    }

    let snapshot = decode_snapshot(data)
        .map_err(|e| Error::InvalidImportFile(format!("backup data is not a CV: {e}")))?;
    store.save(&snapshot)?;
    info!("Restored backup");
    Ok(snapshot)
}
