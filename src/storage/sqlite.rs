//! SQLite backing store.
//!
//! Stores every key of a namespace as a row of `kv_entries`. Several
//! processes may open the same database file; `PRAGMA data_version` tells a
//! connection when one of the others has committed.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::backend::{entry_size, BackingStore};
use crate::storage::schema::apply_schema;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based key-value namespace.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
    quota: Option<u64>,
}

impl SqliteStore {
    /// Open a database at the given path, scoped to `namespace`.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path, namespace: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_schema(&conn)?;

        debug!(path = %path.display(), namespace, "Opened SQLite backing store");
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
            quota: None,
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory(namespace: &str) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.to_string(),
            quota: None,
        })
    }

    /// Bound this namespace at `bytes`, measured with [`entry_size`].
    ///
    /// Other namespaces in the same file have their own budgets.
    #[must_use]
    pub fn with_quota(mut self, bytes: u64) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// The namespace this store reads and writes.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Bytes used by every entry of `namespace` except `skip`.
fn usage_excluding(conn: &Connection, namespace: &str, skip: &str) -> rusqlite::Result<u64> {
    let mut stmt = conn.prepare("SELECT key, value FROM kv_entries WHERE namespace = ?1 AND key != ?2")?;
    let rows = stmt.query_map(rusqlite::params![namespace, skip], |row| {
        Ok(entry_size(&row.get::<_, String>(0)?, &row.get::<_, String>(1)?))
    })?;
    rows.sum()
}

fn unavailable(err: &rusqlite::Error) -> Error {
    Error::StorageUnavailable(err.to_string())
}

fn is_disk_full(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::DiskFull
    )
}

impl BackingStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![self.namespace, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| unavailable(&e))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock();
        if let Some(quota) = self.quota {
            let others = usage_excluding(&conn, &self.namespace, key).map_err(|e| unavailable(&e))?;
            let needed = others + entry_size(key, value);
            if needed > quota {
                return Err(Error::QuotaExceeded {
                    needed,
                    budget: quota,
                });
            }
        }

        let result = conn.execute(
            "INSERT INTO kv_entries (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(namespace, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            rusqlite::params![
                self.namespace,
                key,
                value,
                chrono::Utc::now().timestamp_millis()
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_disk_full(&e) => Err(Error::QuotaExceeded {
                needed: entry_size(key, value),
                budget: self.quota.unwrap_or(0),
            }),
            Err(e) => Err(unavailable(&e)),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()
            .execute(
                "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                rusqlite::params![self.namespace, key],
            )
            .map(|_| ())
            .map_err(|e| unavailable(&e))
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT key FROM kv_entries WHERE namespace = ?1 ORDER BY key")
            .map_err(|e| unavailable(&e))?;
        let rows = stmt
            .query_map([&self.namespace], |row| row.get(0))
            .map_err(|e| unavailable(&e))?;
        rows.collect::<rusqlite::Result<Vec<String>>>()
            .map_err(|e| unavailable(&e))
    }

    fn change_token(&self) -> Result<Option<u64>> {
        let version: i64 = self
            .lock()
            .query_row("PRAGMA data_version", [], |row| row.get(0))
            .map_err(|e| unavailable(&e))?;
        Ok(Some(version.unsigned_abs()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_memory() {
        let store = SqliteStore::open_memory("cv");
        assert!(store.is_ok());
    }

    #[test]
    fn test_kv_crud() {
        let store = SqliteStore::open_memory("cv").unwrap();
        assert_eq!(store.get("cvBuilderData").unwrap(), None);

        store.set("cvBuilderData", "one").unwrap();
        store.set("cvBuilderData", "two").unwrap();
        assert_eq!(store.get("cvBuilderData").unwrap().as_deref(), Some("two"));

        store.set("temp_draft", "x").unwrap();
        assert_eq!(
            store.keys().unwrap(),
            vec!["cvBuilderData".to_string(), "temp_draft".to_string()]
        );

        store.remove("cvBuilderData").unwrap();
        store.remove("cvBuilderData").unwrap();
        assert_eq!(store.get("cvBuilderData").unwrap(), None);
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cv.db");
        let a = SqliteStore::open(&path, "alpha").unwrap();
        let b = SqliteStore::open(&path, "beta").unwrap();

        a.set("k", "from-a").unwrap();
        assert_eq!(b.get("k").unwrap(), None);
        assert!(b.keys().unwrap().is_empty());
        assert_eq!(a.namespace(), "alpha");
    }

    #[test]
    fn test_quota_rejects_oversized_write() {
        let store = SqliteStore::open_memory("cv").unwrap().with_quota(64 * 1024);

        let big = "x".repeat(512 * 1024);
        let err = store.set("big", &big).unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { budget, .. } if budget == 64 * 1024));
        assert_eq!(store.get("big").unwrap(), None);

        store.set("small", "ok").unwrap();
        store.set("small", &"y".repeat(1000)).unwrap();
    }

    #[test]
    fn test_quota_is_per_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cv.db");
        let value = "x".repeat(600);
        let quota = entry_size("draft", &value) + 100;
        let a = SqliteStore::open(&path, "alpha").unwrap().with_quota(quota);
        let b = SqliteStore::open(&path, "beta").unwrap().with_quota(quota);

        // Together the two drafts exceed one budget; each namespace fits.
        a.set("draft", &value).unwrap();
        b.set("draft", &value).unwrap();

        assert!(matches!(
            a.set("second", &value),
            Err(Error::QuotaExceeded { .. })
        ));
        assert_eq!(b.get("draft").unwrap().as_deref(), Some(value.as_str()));
    }

    #[test]
    fn test_change_token_tracks_other_connections() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cv.db");
        let ours = SqliteStore::open(&path, "cv").unwrap();
        let theirs = SqliteStore::open(&path, "cv").unwrap();

        let before = ours.change_token().unwrap();
        ours.set("k", "mine").unwrap();
        assert_eq!(ours.change_token().unwrap(), before);

        theirs.set("k", "theirs").unwrap();
        assert_ne!(ours.change_token().unwrap(), before);
    }
}
