//! Database schema definitions and migration logic.

use rusqlite::{Connection, Result};

pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Metadata key holding the schema version.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// The complete SQL schema for the report database.
pub const SCHEMA_SQL: &str = r"
    -- One row per result, in the order results were produced.
    -- JSON columns (suite_path, meta_info, history, error, images_info)
    -- hold serde_json text.
    CREATE TABLE IF NOT EXISTS suites (
        row_id INTEGER PRIMARY KEY AUTOINCREMENT,
        suite_path TEXT NOT NULL,
        suite_name TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL,
        suite_url TEXT,
        meta_info TEXT NOT NULL DEFAULT '{}',
        history TEXT NOT NULL DEFAULT '[]',
        description TEXT,
        error TEXT,
        skip_reason TEXT,
        images_info TEXT NOT NULL DEFAULT '[]',
        screenshot INTEGER NOT NULL DEFAULT 0,
        multiple_tabs INTEGER NOT NULL DEFAULT 0,
        status TEXT NOT NULL,
        timestamp INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_suites_suite_path ON suites(suite_path, name);

    -- Browser names seen in this report
    CREATE TABLE IF NOT EXISTS browsers (
        name TEXT PRIMARY KEY
    );

    -- Flattened tree snapshot
    CREATE TABLE IF NOT EXISTS tree_nodes (
        kind TEXT NOT NULL,
        id TEXT NOT NULL,
        parent_id TEXT,
        position INTEGER NOT NULL,
        data TEXT NOT NULL,
        PRIMARY KEY (kind, id),
        CHECK (kind IN ('suite', 'browser', 'result', 'image'))
    );

    CREATE INDEX IF NOT EXISTS idx_tree_nodes_position ON tree_nodes(kind, position);

    -- Metadata
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire schema definition.
/// It is idempotent because all CREATE statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    run_migrations(conn)?;

    // Set journal mode to WAL for concurrency
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.pragma_update(None, "foreign_keys", "ON")?;

    Ok(())
}

/// Record the schema version for databases created before it was tracked.
fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO metadata (key, value) VALUES (?, ?)",
        [SCHEMA_VERSION_KEY, &CURRENT_SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"suites".to_string()));
        assert!(tables.contains(&"browsers".to_string()));
        assert!(tables.contains(&"tree_nodes".to_string()));
        assert!(tables.contains(&"metadata".to_string()));

        // In-memory DBs use MEMORY journaling, regardless of what we set
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert!(journal_mode.to_uppercase() == "WAL" || journal_mode.to_uppercase() == "MEMORY");

        let version: String = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?",
                [SCHEMA_VERSION_KEY],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(version, CURRENT_SCHEMA_VERSION.to_string());
    }

    #[test]
    fn test_apply_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        apply_schema(&conn).unwrap();
    }

    #[test]
    fn test_unknown_node_kind_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        let inserted = conn.execute(
            "INSERT INTO tree_nodes (kind, id, parent_id, position, data) VALUES ('leaf', 'x', NULL, 0, '{}')",
            [],
        );
        assert!(inserted.is_err());
    }
}
