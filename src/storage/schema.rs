//! Database schema for the SQLite backing store.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema.
///
/// Timestamps are stored as INTEGER (Unix milliseconds).
pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- One row per key; a namespace plays the role of a browser origin.
CREATE TABLE IF NOT EXISTS kv_entries (
    namespace TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (namespace, key)
);

CREATE INDEX IF NOT EXISTS idx_kv_entries_updated ON kv_entries(namespace, updated_at);
";

/// Apply pragmas and the schema to a connection.
///
/// Idempotent; safe to call on every open.
///
/// # Errors
///
/// Returns an error if a pragma or DDL statement fails.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<String>>>()
            .unwrap()
    }

    #[test]
    fn test_creates_kv_table() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        assert_eq!(table_names(&conn), vec!["kv_entries", "schema_migrations"]);
    }

    #[test]
    fn test_reapply_keeps_rows() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO kv_entries (namespace, key, value, updated_at) VALUES ('default', 'k', 'v', 0)",
            [],
        )
        .unwrap();

        apply_schema(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))
            .unwrap();
        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!((rows, versions), (1, 1));
    }

    #[test]
    fn test_key_is_unique_per_namespace() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let insert = "INSERT INTO kv_entries (namespace, key, value, updated_at) VALUES (?1, 'k', 'v', 0)";

        conn.execute(insert, ["a"]).unwrap();
        conn.execute(insert, ["b"]).unwrap();
        assert!(conn.execute(insert, ["a"]).is_err());
    }
}
