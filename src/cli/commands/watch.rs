//! Watch command implementation.
//!
//! Polls the store for changes made by other processes and, when given a
//! snapshot file, auto-saves that file on the same interval.

use crate::cli::commands::data::read_snapshot;
use crate::cli::commands::open_store;
use crate::error::{Error, Result};
use crate::storage::{EventKind, StoreEvent};
use chrono::{SecondsFormat, Utc};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Execute the watch command.
///
/// Runs until interrupted unless `ticks` is given.
pub fn execute(
    file: Option<&PathBuf>,
    interval_ms: Option<u64>,
    ticks: Option<u64>,
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
    json: bool,
) -> Result<()> {
    let store = Arc::new(open_store(db_path, namespace)?);
    let interval = interval_ms.map_or_else(|| store.config().auto_save_interval(), Duration::from_millis);
    if interval.is_zero() {
        return Err(Error::InvalidArgument("--interval-ms must be positive".to_string()));
    }

    for kind in [EventKind::AutoSave, EventKind::ExternalChange, EventKind::Error] {
        store.subscribe(kind, move |event| print_event(event, json));
    }

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| Error::Runtime(format!("Failed to create async runtime: {e}")))?;

    rt.block_on(async {
        if let Some(path) = file.cloned() {
            let producer = move || {
                read_snapshot(Some(path.as_path()))
                    .inspect_err(|e| warn!(path = %path.display(), error = %e, "Skipping auto-save tick"))
                    .ok()
            };
            store.start_auto_save(producer, interval)?;
        }

        // First poll records the baseline.
        store.poll_external_change()?;
        if !json {
            println!("Watching every {}ms", interval.as_millis());
        }

        let mut elapsed = 0;
        while ticks.is_none_or(|limit| elapsed < limit) {
            tokio::time::sleep(interval).await;
            store.poll_external_change()?;
            elapsed += 1;
        }

        store.stop_auto_save();
        Ok::<(), Error>(())
    })
}

fn print_event(event: &StoreEvent, json: bool) {
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

    if json {
        let line = match event {
            StoreEvent::AutoSave { timestamp, data_size } => serde_json::json!({
                "event": event.kind().as_str(),
                "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
                "dataSize": data_size,
            }),
            StoreEvent::ExternalChange { old_value, new_value } => serde_json::json!({
                "event": event.kind().as_str(),
                "timestamp": now,
                "oldValue": old_value,
                "newValue": new_value,
            }),
            StoreEvent::Error { code, message } => serde_json::json!({
                "event": event.kind().as_str(),
                "timestamp": now,
                "code": code.as_str(),
                "message": message,
            }),
            _ => serde_json::json!({ "event": event.kind().as_str(), "timestamp": now }),
        };
        println!("{line}");
        return;
    }

    match event {
        StoreEvent::AutoSave { data_size, .. } => {
            println!("{} {} auto-saved ({data_size} bytes)", now.dimmed(), "✓".green());
        }
        StoreEvent::ExternalChange { new_value, .. } => {
            let what = if new_value.is_some() { "updated" } else { "removed" };
            println!("{} {} draft {what} by another process", now.dimmed(), "!".yellow());
        }
        StoreEvent::Error { code, message } => {
            println!("{} {} {code}: {message}", now.dimmed(), "✗".red());
        }
        _ => {}
    }
}
