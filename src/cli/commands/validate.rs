//! Validate command implementation.

use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::validate::validate_snapshot;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the validate command.
///
/// # Errors
///
/// Returns `Error::NoData` when nothing is stored, and
/// `Error::InvalidArgument` when the stored snapshot fails validation
/// (after printing the report).
pub fn execute(db_path: Option<&PathBuf>, namespace: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path, namespace)?;
    let snapshot = store.load().ok_or(Error::NoData)?;
    let report = validate_snapshot(&snapshot);

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else if report.is_valid {
        println!("{} Saved draft is valid", "✓".green());
    } else {
        for error in &report.errors {
            println!("  {} {}: {}", "✗".red(), error.field.bold(), error.message);
        }
    }

    if report.is_valid {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "{} field(s) failed validation",
            report.errors.len()
        )))
    }
}
