//! Stats command implementation.

use crate::cli::commands::open_store;
use crate::error::Result;
use chrono::SecondsFormat;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the stats command.
pub fn execute(db_path: Option<&PathBuf>, namespace: Option<&str>, json: bool) -> Result<()> {
    let store = open_store(db_path, namespace)?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string(&stats)?);
        return Ok(());
    }

    let budget = store.config().max_storage_bytes;
    let last_saved = stats.last_saved.map_or_else(
        || "Never".to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );

    println!("{}", "Saved draft".bold());
    println!("  Last saved:  {last_saved}");
    println!(
        "  Version:     {}",
        stats.schema_version.as_deref().unwrap_or("-")
    );
    println!("  Fields:      {}", stats.items_count);
    println!("  Size:        {} bytes", stats.data_size);
    println!();
    println!("{}", format!("Namespace '{}'", store.config().namespace).bold());
    println!("  Entries:     {}", stats.storage_item_count);
    println!(
        "  Used:        {} of {budget} bytes ({:.1}%)",
        stats.total_storage_size, stats.storage_usage
    );

    let available = format!("{} bytes", stats.available_storage);
    if stats.available_storage < 0 {
        println!("  Available:   {}", available.red());
    } else {
        println!("  Available:   {available}");
    }
    Ok(())
}
