//! Configuration management.
//!
//! Store settings come from `~/.cvstore/config.json` (all fields optional)
//! and are then overridden by environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `CVSTORE_KEY` | `storageKey` |
//! | `CVSTORE_MAX_BYTES` | `maxStorageBytes` |
//! | `CVSTORE_NAMESPACE` | `namespace` |
//!
//! `CVSTORE_CONFIG` points at a different config file. The database
//! location is resolved separately by [`resolve_db_path`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Fixed key the envelope is stored under.
pub const DEFAULT_STORAGE_KEY: &str = "cvBuilderData";

/// Namespace budget: 5 MiB.
pub const DEFAULT_MAX_STORAGE_BYTES: u64 = 5 * 1024 * 1024;

/// Settings for a [`PersistenceStore`](crate::storage::PersistenceStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    /// Key the envelope lives under.
    pub storage_key: String,

    /// Namespace inside the backing database (one per "origin").
    pub namespace: String,

    /// Upper bound on the estimated size of every entry in the namespace.
    pub max_storage_bytes: u64,

    /// Default auto-save period.
    pub auto_save_interval_ms: u64,

    /// Default age for a standalone cleanup.
    pub cleanup_max_age_days: u32,

    /// Age used when a save has to compact before writing.
    pub compaction_max_age_days: u32,

    /// Substrings marking keys whose unparseable values may be evicted.
    pub transient_key_markers: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            namespace: "default".to_string(),
            max_storage_bytes: DEFAULT_MAX_STORAGE_BYTES,
            auto_save_interval_ms: 10_000,
            cleanup_max_age_days: 30,
            compaction_max_age_days: 7,
            transient_key_markers: vec!["old_".to_string(), "temp_".to_string()],
        }
    }
}

impl StoreConfig {
    /// The auto-save period as a `Duration`.
    #[must_use]
    pub const fn auto_save_interval(&self) -> Duration {
        Duration::from_millis(self.auto_save_interval_ms)
    }

    /// Whether `key` matches one of the transient markers.
    #[must_use]
    pub fn is_transient_key(&self, key: &str) -> bool {
        self.transient_key_markers
            .iter()
            .any(|marker| !marker.is_empty() && key.contains(marker.as_str()))
    }

    /// Reject settings the store cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.storage_key.is_empty() {
            return Err(Error::Config("storageKey must not be empty".into()));
        }
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".into()));
        }
        if self.max_storage_bytes == 0 {
            return Err(Error::Config("maxStorageBytes must be positive".into()));
        }
        if self.auto_save_interval_ms == 0 {
            return Err(Error::Config("autoSaveIntervalMs must be positive".into()));
        }
        Ok(())
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `CVSTORE_MAX_BYTES` is not an integer.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("CVSTORE_KEY") {
            self.storage_key = key;
        }
        if let Some(namespace) = non_empty("CVSTORE_NAMESPACE") {
            self.namespace = namespace;
        }
        if let Some(bytes) = non_empty("CVSTORE_MAX_BYTES") {
            self.max_storage_bytes = bytes.trim().parse().map_err(|e| {
                Error::Config(format!("CVSTORE_MAX_BYTES must be a byte count: {e}"))
            })?;
        }
        Ok(())
    }
}

/// Get the global cvstore directory (`~/.cvstore/`).
#[must_use]
pub fn global_cvstore_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".cvstore"))
}

/// Get the config file path.
///
/// Priority:
/// 1. `CVSTORE_CONFIG` environment variable
/// 2. `~/.cvstore/config.json`
fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CVSTORE_CONFIG") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    global_cvstore_dir()
        .map(|dir| dir.join("config.json"))
        .ok_or(Error::Config("Could not determine home directory".into()))
}

/// Load configuration from the config file and the environment.
///
/// A missing config file yields the defaults.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read or parsed, an
/// override is malformed, or the result fails validation.
pub fn load_config() -> Result<StoreConfig> {
    let path = config_path()?;
    let mut config = load_config_from(&path)?;
    config.apply_env(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a specific file, without environment overrides.
///
/// # Errors
///
/// Returns `Error::Config` if the file exists but cannot be read or parsed.
pub fn load_config_from(path: &Path) -> Result<StoreConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "No config file, using defaults");
        return Ok(StoreConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file: {e}")))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse config file: {e}")))
}

/// Resolve the database path.
///
/// Priority:
/// 1. If `explicit_path` is provided, use it directly
/// 2. `CVSTORE_DB` environment variable
/// 3. Global location: `~/.cvstore/data/cvstore.db`
///
/// # Returns
///
/// Returns the path to the database file, or `None` if no location found.
#[must_use]
pub fn resolve_db_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path.to_path_buf());
    }

    if let Ok(db_path) = std::env::var("CVSTORE_DB") {
        if !db_path.trim().is_empty() {
            return Some(PathBuf::from(db_path));
        }
    }

    global_cvstore_dir().map(|dir| dir.join("data").join("cvstore.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.storage_key, "cvBuilderData");
        assert_eq!(config.max_storage_bytes, 5 * 1024 * 1024);
        assert_eq!(config.auto_save_interval(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transient_keys() {
        let config = StoreConfig::default();
        assert!(config.is_transient_key("temp_draft"));
        assert!(config.is_transient_key("cv_old_1"));
        assert!(!config.is_transient_key("cvBuilderData"));
    }

    #[test]
    fn test_partial_config_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"storageKey": "draft", "maxStorageBytes": 1024}"#).unwrap();

        let config = load_config_from(&path).unwrap();
        assert_eq!(config.storage_key, "draft");
        assert_eq!(config.max_storage_bytes, 1024);
        assert_eq!(config.compaction_max_age_days, 7);
    }

    #[test]
    fn test_missing_config_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_config_from(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn test_malformed_config_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config_from(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("CVSTORE_KEY", "otherKey"),
            ("CVSTORE_MAX_BYTES", " 2048 "),
            ("CVSTORE_NAMESPACE", ""),
        ]
        .into_iter()
        .collect();

        let mut config = StoreConfig::default();
        config
            .apply_env(|name| env.get(name).map(|v| (*v).to_string()))
            .unwrap();

        assert_eq!(config.storage_key, "otherKey");
        assert_eq!(config.max_storage_bytes, 2048);
        assert_eq!(config.namespace, "default");
    }

    #[test]
    fn test_bad_byte_override() {
        let mut config = StoreConfig::default();
        let result = config.apply_env(|name| (name == "CVSTORE_MAX_BYTES").then(|| "lots".into()));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/cv.db");
        assert_eq!(resolve_db_path(Some(&explicit)), Some(explicit));
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = StoreConfig {
            max_storage_bytes: 0,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
