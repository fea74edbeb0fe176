//! Command implementations.

pub mod completions;
pub mod data;
pub mod stats;
pub mod transfer;
pub mod validate;
pub mod version;
pub mod watch;

use crate::config::{load_config, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::{PersistenceStore, SqliteStore};
use std::path::PathBuf;
use tracing::debug;

/// Open the store the CLI operates on.
///
/// Configuration comes from the config file and environment; `namespace`
/// overrides the configured namespace.
pub(crate) fn open_store(
    db_path: Option<&PathBuf>,
    namespace: Option<&str>,
) -> Result<PersistenceStore<SqliteStore>> {
    let mut config = load_config()?;
    if let Some(namespace) = namespace {
        config.namespace = namespace.to_string();
        config.validate()?;
    }

    let db_path = resolve_db_path(db_path.map(PathBuf::as_path)).ok_or_else(|| {
        Error::Config("Could not determine a database location; pass --db".to_string())
    })?;
    debug!(path = %db_path.display(), namespace = %config.namespace, "Opening store");

    let backend = SqliteStore::open(&db_path, &config.namespace)?.with_quota(config.max_storage_bytes);
    Ok(PersistenceStore::new(backend, config))
}

/// Directory for written files: `out`, or the current directory.
pub(crate) fn output_dir(out: Option<&PathBuf>) -> Result<PathBuf> {
    match out {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()?),
    }
}
