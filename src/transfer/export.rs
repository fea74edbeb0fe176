//! JSON and plain-text export.
//!
//! The JSON document is the snapshot plus `exportDate`, `version` and
//! `source` fields. The text form is a human-readable summary; reading it
//! back only recovers personal information (see
//! [`parse_text`](super::import::parse_text)).

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::info;

use crate::error::{Error, Result};
use crate::model::{Snapshot, SCHEMA_VERSION};
use crate::storage::{BackingStore, PersistenceStore};
use crate::transfer::file::write_into;

/// Value of the `source` field in exported documents.
pub const EXPORT_SOURCE: &str = "CV Builder";

/// Width of the banner and section rules in text exports.
pub const RULE_WIDTH: usize = 50;

/// Export file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl ExportFormat {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Txt => "txt",
        }
    }

    /// Guess the format from a file extension. Defaults to JSON.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("txt") => Self::Txt,
            _ => Self::Json,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "txt" | "text" => Ok(Self::Txt),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered export, not yet written anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub filename: String,
    pub content: String,
    pub format: ExportFormat,
}

impl ExportFile {
    /// Atomically write the export into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = write_into(dir, &self.filename, &self.content)?;
        info!(path = %path.display(), format = %self.format, "Wrote export");
        Ok(path)
    }
}

/// Renders the stored snapshot as an export file.
pub struct Exporter<'a, B: BackingStore> {
    store: &'a PersistenceStore<B>,
}

impl<'a, B: BackingStore> Exporter<'a, B> {
    #[must_use]
    pub const fn new(store: &'a PersistenceStore<B>) -> Self {
        Self { store }
    }

    /// Export the stored snapshot, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoData` if nothing loadable is stored.
    pub fn export(&self, format: ExportFormat) -> Result<ExportFile> {
        self.export_at(format, Utc::now())
    }

    /// Export the stored snapshot, stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NoData` if nothing loadable is stored.
    pub fn export_at(&self, format: ExportFormat, now: DateTime<Utc>) -> Result<ExportFile> {
        let snapshot = self.store.load().ok_or(Error::NoData)?;
        render(&snapshot, format, now)
    }
}

/// Render a snapshot in the given format.
///
/// # Errors
///
/// Returns a JSON error if the snapshot cannot be serialized.
pub fn render(snapshot: &Snapshot, format: ExportFormat, now: DateTime<Utc>) -> Result<ExportFile> {
    let date = now.format("%Y-%m-%d");
    let document = export_document(snapshot, now)?;

    Ok(match format {
        ExportFormat::Json => ExportFile {
            filename: format!("cv-data-{date}.json"),
            content: serde_json::to_string_pretty(&document)?,
            format,
        },
        ExportFormat::Txt => ExportFile {
            filename: format!("cv-{date}.txt"),
            content: render_text(snapshot, now),
            format,
        },
    })
}

/// The snapshot as a JSON object with export metadata added.
///
/// # Errors
///
/// Returns a JSON error if the snapshot cannot be serialized.
pub fn export_document(snapshot: &Snapshot, now: DateTime<Utc>) -> Result<Value> {
    let mut document = serde_json::to_value(snapshot)?;
    if let Value::Object(map) = &mut document {
        map.insert(
            "exportDate".into(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        map.insert("version".into(), Value::String(SCHEMA_VERSION.into()));
        map.insert("source".into(), Value::String(EXPORT_SOURCE.into()));
    }
    Ok(document)
}

/// Plain-text summary of a snapshot.
#[must_use]
pub fn render_text(snapshot: &Snapshot, now: DateTime<Utc>) -> String {
    let banner = "=".repeat(RULE_WIDTH);
    let rule = "-".repeat(RULE_WIDTH);
    let mut text = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(text, "{banner}");
    let _ = writeln!(text, "CV EXPORT - {}", now.format("%Y-%m-%d"));
    let _ = writeln!(text, "{banner}\n");

    let personal = &snapshot.personal;
    if !personal.full_name.is_empty() || !personal.email.is_empty() || !personal.phone.is_empty() {
        let _ = writeln!(text, "PERSONAL INFORMATION\n{rule}");
        for (label, value) in [
            ("Name", &personal.full_name),
            ("Email", &personal.email),
            ("Phone", &personal.phone),
            ("Address", &personal.address),
        ] {
            if !value.is_empty() {
                let _ = writeln!(text, "{label}: {value}");
            }
        }
        text.push('\n');
    }

    if !snapshot.education.is_empty() {
        let _ = writeln!(text, "EDUCATION\n{rule}");
        for (index, edu) in snapshot.education.iter().enumerate() {
            let grade = if edu.grade.is_empty() {
                String::new()
            } else {
                format!(" - {}", edu.grade)
            };
            let _ = writeln!(text, "{}. {}", index + 1, edu.degree);
            let _ = writeln!(text, "   {}", edu.institution);
            let _ = writeln!(text, "   {}{grade}\n", edu.year);
        }
    }

    if !snapshot.experience.is_empty() {
        let _ = writeln!(text, "EXPERIENCE\n{rule}");
        for (index, exp) in snapshot.experience.iter().enumerate() {
            let end = if exp.current { "Present" } else { exp.end_date.as_str() };
            let _ = writeln!(text, "{}. {}", index + 1, exp.title);
            let _ = writeln!(text, "   {}", exp.company);
            let _ = writeln!(text, "   {} - {end}", exp.start_date);
            if !exp.description.is_empty() {
                let _ = writeln!(text, "   {}", exp.description.replace('\n', "\n   "));
            }
            text.push('\n');
        }
    }

    if !snapshot.skills.is_empty() {
        let _ = writeln!(text, "SKILLS\n{rule}");
        for skill in &snapshot.skills {
            let _ = writeln!(text, "• {skill}");
        }
        text.push('\n');
    }

    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::model::{EducationEntry, EntryId, ExperienceEntry};
    use crate::storage::MemoryStore;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 5, 10, 0, 0).unwrap()
    }

    fn sample() -> Snapshot {
        let mut snapshot = Snapshot::default();
        snapshot.personal.full_name = "Ada Lovelace".into();
        snapshot.personal.email = "ada@example.com".into();
        let mut edu = EducationEntry::new(EntryId::new(1).unwrap());
        edu.degree = "BSc Mathematics".into();
        edu.institution = "University of London".into();
        edu.year = "1835".into();
        edu.grade = "First".into();
        snapshot.education.push(edu);
        let mut exp = ExperienceEntry::new(EntryId::new(2).unwrap());
        exp.title = "Analyst".into();
        exp.company = "Analytical Engine".into();
        exp.start_date = "1842".into();
        exp.current = true;
        exp.description = "Wrote notes\nIncluding Note G".into();
        snapshot.experience.push(exp);
        snapshot.skills = vec!["mathematics".into(), "poetry".into()];
        snapshot
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("txt".parse::<ExportFormat>().unwrap(), ExportFormat::Txt);
        assert!(matches!(
            "pdf".parse::<ExportFormat>(),
            Err(Error::UnsupportedFormat(_))
        ));
        assert_eq!(ExportFormat::from_path(Path::new("cv.TXT")), ExportFormat::Txt);
        assert_eq!(ExportFormat::from_path(Path::new("cv")), ExportFormat::Json);
    }

    #[test]
    fn test_json_export() {
        let file = render(&sample(), ExportFormat::Json, at()).unwrap();
        assert_eq!(file.filename, "cv-data-2026-01-05.json");

        let doc: Value = serde_json::from_str(&file.content).unwrap();
        assert_eq!(doc["fullName"], "Ada Lovelace");
        assert_eq!(doc["source"], "CV Builder");
        assert_eq!(doc["version"], "2.0.0");
        assert_eq!(doc["exportDate"], "2026-01-05T10:00:00.000Z");
    }

    #[test]
    fn test_text_export() {
        let file = render(&sample(), ExportFormat::Txt, at()).unwrap();
        assert_eq!(file.filename, "cv-2026-01-05.txt");

        let text = file.content;
        let rule = "-".repeat(50);
        assert!(text.starts_with(&format!("{}\nCV EXPORT - 2026-01-05\n", "=".repeat(50))));
        assert!(text.contains(&format!("PERSONAL INFORMATION\n{rule}\nName: Ada Lovelace\nEmail: ada@example.com\n\n")));
        assert!(text.contains("1. BSc Mathematics\n   University of London\n   1835 - First\n"));
        assert!(text.contains("   1842 - Present\n   Wrote notes\n   Including Note G\n"));
        assert!(text.contains(&format!("SKILLS\n{rule}\n• mathematics\n• poetry\n")));
        assert!(!text.contains("Phone:"));
    }

    #[test]
    fn test_exporter_without_data() {
        let store = PersistenceStore::new(MemoryStore::new(), StoreConfig::default());
        let result = Exporter::new(&store).export(ExportFormat::Json);
        assert!(matches!(result, Err(Error::NoData)));
    }

    #[test]
    fn test_exporter_writes_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = PersistenceStore::new(MemoryStore::new(), StoreConfig::default());
        store.save(&sample()).unwrap();

        let file = Exporter::new(&store).export_at(ExportFormat::Txt, at()).unwrap();
        let path = file.write_to(temp_dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "cv-2026-01-05.txt");
        assert!(std::fs::read_to_string(path).unwrap().contains("Ada Lovelace"));
    }
}
