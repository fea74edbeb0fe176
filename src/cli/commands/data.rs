//! Save, load, clear and cleanup commands.

use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::model::{Snapshot, SCHEMA_VERSION};
use crate::storage::migrations::decode_snapshot;
use crate::storage::LoadOutcome;
use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use serde::Serialize;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SaveOutput {
    saved: bool,
    saved_at: String,
    version: String,
    fields: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadOutput {
    snapshot: Option<Snapshot>,
    saved_at: Option<String>,
    migrated_from: Option<String>,
}

/// Read a snapshot document from `file`, or stdin for `None` / `-`.
pub(crate) fn read_snapshot(file: Option<&Path>) -> Result<Snapshot> {
    let content = match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)?,
        _ => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let value = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidArgument(format!("snapshot is not valid JSON: {e}")))?;
    decode_snapshot(value)
        .map_err(|e| Error::InvalidArgument(format!("not a CV snapshot: {e}")))
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Execute the save command.
pub fn save(
    file: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let snapshot = read_snapshot(file.map(PathBuf::as_path))?;
    let store = open_store(db_path, namespace)?;
    let envelope = store.save(&snapshot)?;

    if json {
        let output = SaveOutput {
            saved: true,
            saved_at: iso(envelope.saved_at),
            version: envelope.schema_version,
            fields: snapshot.field_count(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!(
            "{} Saved {} fields at {}",
            "✓".green(),
            snapshot.field_count(),
            iso(envelope.saved_at)
        );
    }
    Ok(())
}

/// Execute the load command.
///
/// Legacy records are migrated in memory; the stored copy is left alone.
pub fn load(db_path: Option<&PathBuf>, namespace: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path, namespace)?;

    let output = match store.load_detailed()? {
        LoadOutcome::Empty => LoadOutput {
            snapshot: None,
            saved_at: None,
            migrated_from: None,
        },
        LoadOutcome::Current { snapshot, saved_at } => LoadOutput {
            snapshot: Some(snapshot),
            saved_at: Some(iso(saved_at)),
            migrated_from: None,
        },
        LoadOutcome::Migrated {
            snapshot,
            saved_at,
            from,
        } => LoadOutput {
            snapshot: Some(snapshot),
            saved_at: Some(iso(saved_at)),
            migrated_from: Some(from),
        },
        LoadOutcome::Unmigrated { from, .. } => {
            return Err(Error::IncompatibleVersion {
                found: from,
                supported: SCHEMA_VERSION.to_string(),
            });
        }
    };

    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    let Some(snapshot) = output.snapshot else {
        println!("No saved data.");
        return Ok(());
    };
    let saved_at = output.saved_at.unwrap_or_default();
    match output.migrated_from {
        Some(from) => println!(
            "{}",
            format!("Saved {saved_at} (migrated from {from})").dimmed()
        ),
        None => println!("{}", format!("Saved {saved_at}").dimmed()),
    }
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

/// Execute the clear command.
pub fn clear(db_path: Option<&PathBuf>, namespace: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path, namespace)?;
    store.clear()?;

    if json {
        println!("{}", serde_json::json!({ "cleared": true }));
    } else {
        println!("{} Cleared saved data", "✓".green());
    }
    Ok(())
}

/// Execute the cleanup command.
pub fn cleanup(
    max_age_days: Option<u32>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = open_store(db_path, namespace)?;
    let days = max_age_days.unwrap_or(store.config().cleanup_max_age_days);
    let removed = store.cleanup_old_data(days)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "removed": removed, "maxAgeDays": days })
        );
    } else if removed == 0 {
        println!("Nothing to clean up.");
    } else {
        println!("{} Removed {removed} stale entries", "✓".green());
    }
    Ok(())
}
