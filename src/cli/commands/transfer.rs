//! Export, import, backup and restore commands.

use crate::cli::commands::{open_store, output_dir};
use crate::error::Result;
use crate::transfer::{create_backup, read_import_file, restore_backup, ExportFormat, Exporter, Importer};
use chrono::Utc;
use colored::Colorize;
use std::path::{Path, PathBuf};

/// Execute the export command.
pub fn export(
    format: &str,
    out: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let format: ExportFormat = format.parse()?;
    let store = open_store(db_path, namespace)?;
    let file = Exporter::new(&store).export(format)?;
    let path = file.write_to(&output_dir(out)?)?;

    if json {
        let output = serde_json::json!({
            "path": path.display().to_string(),
            "format": format.as_str(),
            "bytes": file.content.len(),
        });
        println!("{output}");
    } else {
        println!("{} Exported {} to {}", "✓".green(), format, path.display());
    }
    Ok(())
}

/// Execute the import command.
pub fn import(
    file: &Path,
    format: Option<&str>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let format = format.map(str::parse::<ExportFormat>).transpose()?;
    let store = open_store(db_path, namespace)?;
    let snapshot = Importer::new(&store).import_file(file, format)?;

    if json {
        let output = serde_json::json!({
            "imported": true,
            "fields": snapshot.field_count(),
            "education": snapshot.education.len(),
            "experience": snapshot.experience.len(),
            "skills": snapshot.skills.len(),
        });
        println!("{output}");
    } else {
        println!("{} Imported {}", "✓".green(), file.display());
        println!("  Education:  {}", snapshot.education.len());
        println!("  Experience: {}", snapshot.experience.len());
        println!("  Skills:     {}", snapshot.skills.len());
    }
    Ok(())
}

/// Execute the backup command.
pub fn backup(
    out: Option<&PathBuf>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = open_store(db_path, namespace)?;
    let file = create_backup(&store, Utc::now())?;
    let path = file.write_to(&output_dir(out)?)?;

    if json {
        println!("{}", serde_json::json!({ "path": path.display().to_string() }));
    } else {
        println!("{} Backup written to {}", "✓".green(), path.display());
    }
    Ok(())
}

/// Execute the restore command.
pub fn restore(
    file: &Path,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let content = read_import_file(file)?;
    let store = open_store(db_path, namespace)?;
    let snapshot = restore_backup(&store, &content)?;

    if json {
        println!(
            "{}",
            serde_json::json!({ "restored": true, "fields": snapshot.field_count() })
        );
    } else {
        println!("{} Restored {}", "✓".green(), file.display());
    }
    Ok(())
}
