//! Moving CV data in and out of the store.
//!
//! - **Export**: stored snapshot → JSON document or plain-text summary
//! - **Import**: JSON document or plain-text summary → normalized snapshot → save
//! - **Backup**: stored snapshot → versioned backup file, and back
//!
//! All files are written atomically (temp file, fsync, rename).
//!
//! # Example
//!
//! ```ignore
//! use cvstore::transfer::{Exporter, ExportFormat, Importer};
//!
//! let file = Exporter::new(&store).export(ExportFormat::Json)?;
//! file.write_to(&out_dir)?;
//!
//! let snapshot = Importer::new(&store).import_file(&path, None)?;
//! ```

mod backup;
mod export;
mod file;
mod import;

pub use backup::{create_backup, restore_backup, Backup, BACKUP_TYPE};
pub use export::{
    export_document, render, render_text, ExportFile, ExportFormat, Exporter, EXPORT_SOURCE,
};
pub use file::{atomic_write, read_import_file, write_into};
pub use import::{normalize_imported, parse_text, Importer, EXPORT_METADATA};
