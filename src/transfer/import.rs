//! JSON and plain-text import.
//!
//! Imported documents are normalized before they are saved:
//! - export metadata (`exportDate`, `version`, `source`, `type`) is dropped
//! - a comma-separated `skills` string becomes a list
//! - education and experience entries without a `degree` / `title` are
//!   dropped, and entries without an id are numbered by position

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use crate::error::{Error, Result};
use crate::model::Snapshot;
use crate::storage::migrations::{decode_snapshot, normalize_entries, normalize_skills, ENTRY_COLLECTIONS};
use crate::storage::{BackingStore, PersistenceStore};
use crate::transfer::export::ExportFormat;
use crate::transfer::file::read_import_file;

/// Fields added by export and backup that are not part of a snapshot.
pub const EXPORT_METADATA: [&str; 4] = ["exportDate", "version", "source", "type"];

static SECTION_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\r?\n-{50}\r?\n").expect("static regex compile"));

/// Imports a document and saves it through the store.
pub struct Importer<'a, B: BackingStore> {
    store: &'a PersistenceStore<B>,
}

impl<'a, B: BackingStore> Importer<'a, B> {
    #[must_use]
    pub const fn new(store: &'a PersistenceStore<B>) -> Self {
        Self { store }
    }

    /// Import a file. The format is taken from the extension unless given.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidImportFile` if the file cannot be read or parsed
    /// - any error from [`PersistenceStore::save`]
    pub fn import_file(&self, path: &Path, format: Option<ExportFormat>) -> Result<Snapshot> {
        let content = read_import_file(path)?;
        let format = format.unwrap_or_else(|| ExportFormat::from_path(path));
        info!(path = %path.display(), format = %format, "Importing");
        self.import_str(&content, format)
    }

    /// Import document content in the given format.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidImportFile` if the content cannot be parsed
    /// - any error from [`PersistenceStore::save`]
    pub fn import_str(&self, content: &str, format: ExportFormat) -> Result<Snapshot> {
        let raw = match format {
            ExportFormat::Json => serde_json::from_str(content)
                .map_err(|e| Error::InvalidImportFile(format!("not valid JSON: {e}")))?,
            ExportFormat::Txt => parse_text(content),
        };

        let snapshot = normalize_imported(raw)?;
        self.store.save(&snapshot)?;
        Ok(snapshot)
    }
}

/// Turn an imported JSON document into a snapshot.
///
/// # Errors
///
/// Returns `Error::InvalidImportFile` if the document is not an object or
/// does not describe a snapshot.
pub fn normalize_imported(value: Value) -> Result<Snapshot> {
    let Value::Object(mut map) = value else {
        return Err(Error::InvalidImportFile(
            "expected a JSON object at the top level".to_string(),
        ));
    };

    for field in EXPORT_METADATA {
        map.remove(field);
    }
    if let Some(skills) = map.get_mut("skills") {
        normalize_skills(skills);
    }
    for (field, required) in ENTRY_COLLECTIONS {
        if let Some(entries) = map.remove(field) {
            map.insert(
                field.to_string(),
                normalize_entries(number_by_position(entries), Some(required)),
            );
        }
    }

    decode_snapshot(Value::Object(map))
        .map_err(|e| Error::InvalidImportFile(format!("not a CV document: {e}")))
}

/// Give sequence entries without an `id` the id `index + 1`.
fn number_by_position(entries: Value) -> Value {
    match entries {
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| match item {
                    Value::Object(mut obj) => {
                        if !obj.contains_key("id") {
                            obj.insert("id".to_string(), Value::from(index + 1));
                        }
                        Value::Object(obj)
                    }
                    other => other,
                })
                .collect(),
        ),
        other => other,
    }
}

/// Best-effort reader for the plain-text export.
///
/// Only the PERSONAL INFORMATION section is recovered.
#[must_use]
pub fn parse_text(text: &str) -> Value {
    let mut data = Map::new();
    let chunks: Vec<&str> = SECTION_RULE.split(text).collect();

    // A section's title is the last line before its rule.
    for pair in chunks.windows(2) {
        let title = pair[0].lines().last().map_or("", str::trim);
        if title != "PERSONAL INFORMATION" {
            continue;
        }
        for line in pair[1].lines().map(str::trim) {
            for (label, field) in [
                ("Name:", "fullName"),
                ("Email:", "email"),
                ("Phone:", "phone"),
                ("Address:", "address"),
            ] {
                if let Some(value) = line.strip_prefix(label) {
                    data.insert(field.to_string(), Value::String(value.trim().to_string()));
                }
            }
        }
    }

    Value::Object(data)
}
