//! `SQLite` storage implementation.

use crate::error::{ReportError, Result};
use crate::model::{NodeKind, TestStatus, Tree};
use crate::storage::rows::{ResultRow, TreeRow, flatten, unflatten};
use crate::storage::schema::apply_schema;
use crate::tree::stats::{StaticReport, StaticTreeBuilder};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Metadata key recording when the tree snapshot was last written.
pub const TREE_SAVED_AT_KEY: &str = "tree_saved_at";

/// SQLite-backed report database.
#[derive(Debug)]
pub struct ReportStorage {
    conn: Connection,
}

/// A `suites` row as stored, before its JSON columns are decoded.
struct RawResultRow {
    suite_path: String,
    suite_name: String,
    name: String,
    suite_url: Option<String>,
    meta_info: String,
    history: String,
    description: Option<String>,
    error: Option<String>,
    skip_reason: Option<String>,
    images_info: String,
    screenshot: bool,
    multiple_tabs: bool,
    status: String,
    timestamp: i64,
}

impl RawResultRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            suite_path: row.get(0)?,
            suite_name: row.get(1)?,
            name: row.get(2)?,
            suite_url: row.get(3)?,
            meta_info: row.get(4)?,
            history: row.get(5)?,
            description: row.get(6)?,
            error: row.get(7)?,
            skip_reason: row.get(8)?,
            images_info: row.get(9)?,
            screenshot: row.get(10)?,
            multiple_tabs: row.get(11)?,
            status: row.get(12)?,
            timestamp: row.get(13)?,
        })
    }

    fn decode(self, row_id: i64) -> Result<ResultRow> {
        let corrupt = |column: &str, e: &dyn fmt::Display| {
            ReportError::corrupted(format!("suites row {row_id}: bad {column}: {e}"))
        };

        Ok(ResultRow {
            suite_path: serde_json::from_str(&self.suite_path)
                .map_err(|e| corrupt("suite_path", &e))?,
            suite_name: self.suite_name,
            name: self.name,
            suite_url: self.suite_url,
            meta_info: serde_json::from_str(&self.meta_info)
                .map_err(|e| corrupt("meta_info", &e))?,
            history: serde_json::from_str(&self.history).map_err(|e| corrupt("history", &e))?,
            description: self.description,
            error: self
                .error
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .map_err(|e| corrupt("error", &e))?,
            skip_reason: self.skip_reason,
            images_info: serde_json::from_str(&self.images_info)
                .map_err(|e| corrupt("images_info", &e))?,
            screenshot: self.screenshot,
            multiple_tabs: self.multiple_tabs,
            status: self
                .status
                .parse::<TestStatus>()
                .map_err(|e| corrupt("status", &e))?,
            timestamp: self.timestamp,
        })
    }
}

const SELECT_RESULT_ROWS: &str = "SELECT suite_path, suite_name, name, suite_url, meta_info, history,
        description, error, skip_reason, images_info, screenshot, multiple_tabs, status, timestamp,
        row_id
     FROM suites ORDER BY row_id";

impl ReportStorage {
    /// Open (or create) the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a new connection with an optional busy timeout (ms).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema application fails.
    pub fn open_with_timeout(path: &Path, lock_timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;
        if let Some(timeout) = lock_timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        apply_schema(&conn)?;
        debug!(path = %path.display(), "Opened report database");
        Ok(Self { conn })
    }

    /// Open a database that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `ReportNotFound` if there is no file at `path`.
    pub fn open_existing(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ReportError::ReportNotFound {
                path: path.to_path_buf(),
            });
        }
        Self::open(path)
    }

    /// Open an in-memory database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Run `f` in an immediate transaction, rolled back on error.
    ///
    /// # Errors
    ///
    /// Returns an error if `f` fails or the transaction cannot be committed.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        debug!(op, "Committed report mutation");
        Ok(result)
    }

    fn insert_result_row_in_tx(tx: &Transaction, row: &ResultRow) -> Result<i64> {
        tx.execute(
            "INSERT INTO suites (suite_path, suite_name, name, suite_url, meta_info, history,
                description, error, skip_reason, images_info, screenshot, multiple_tabs, status,
                timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                serde_json::to_string(&row.suite_path)?,
                row.suite_name,
                row.name,
                row.suite_url,
                serde_json::to_string(&row.meta_info)?,
                serde_json::to_string(&row.history)?,
                row.description,
                row.error.as_ref().map(serde_json::to_string).transpose()?,
                row.skip_reason,
                serde_json::to_string(&row.images_info)?,
                row.screenshot,
                row.multiple_tabs,
                row.status.as_str(),
                row.timestamp,
            ],
        )?;
        let row_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT OR IGNORE INTO browsers (name) VALUES (?)",
            [&row.name],
        )?;
        Ok(row_id)
    }

    /// Append one result row.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be encoded or inserted.
    pub fn insert_result_row(&mut self, row: &ResultRow) -> Result<i64> {
        self.mutate("insert_result_row", |tx| Self::insert_result_row_in_tx(tx, row))
    }

    /// Append rows in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any row cannot be inserted; nothing is written then.
    pub fn insert_result_rows(&mut self, rows: &[ResultRow]) -> Result<usize> {
        self.mutate("insert_result_rows", |tx| {
            for row in rows {
                Self::insert_result_row_in_tx(tx, row)?;
            }
            Ok(rows.len())
        })
    }

    /// Replace every stored result row (and the browser list) with `rows`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rows cannot be written; nothing changes then.
    pub fn replace_result_rows(&mut self, rows: &[ResultRow]) -> Result<usize> {
        self.mutate("replace_result_rows", |tx| {
            tx.execute("DELETE FROM suites", [])?;
            tx.execute("DELETE FROM browsers", [])?;
            for row in rows {
                Self::insert_result_row_in_tx(tx, row)?;
            }
            Ok(rows.len())
        })
    }

    /// All result rows in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedTree` if a JSON column cannot be decoded.
    pub fn read_result_rows(&self) -> Result<Vec<ResultRow>> {
        let mut stmt = self.conn.prepare(SELECT_RESULT_ROWS)?;
        let raw = stmt
            .query_map([], |row| Ok((RawResultRow::from_row(row)?, row.get::<_, i64>(14)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter().map(|(row, row_id)| row.decode(row_id)).collect()
    }

    /// Number of stored result rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn count_result_rows(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM suites", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Delete the latest row matching a result identity.
    ///
    /// A row is identified by its suite path, browser, status, timestamp and
    /// the state name of its first image. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn delete_result_row<S: AsRef<str>>(
        &mut self,
        suite_path: &[S],
        browser: &str,
        status: TestStatus,
        timestamp: i64,
        state_name: Option<&str>,
    ) -> Result<bool> {
        let path: Vec<&str> = suite_path.iter().map(AsRef::as_ref).collect();
        let path = serde_json::to_string(&path)?;

        let deleted = self.mutate("delete_result_row", |tx| {
            Ok(tx.execute(
                "DELETE FROM suites WHERE row_id = (
                    SELECT row_id FROM suites
                    WHERE suite_path = ? AND name = ? AND status = ? AND timestamp = ?
                      AND json_extract(images_info, '$[0].stateName') IS ?
                    ORDER BY row_id DESC LIMIT 1
                )",
                params![path, browser, status.as_str(), timestamp, state_name],
            )?)
        })?;

        debug!(suite_path = %path, browser, deleted, "Deleted result row");
        Ok(deleted > 0)
    }

    /// Browser names seen in this report, alphabetically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn browsers(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM browsers ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    /// Replace the stored tree snapshot with `tree`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tree cannot be flattened or written.
    pub fn save_tree(&mut self, tree: &Tree) -> Result<usize> {
        let rows = flatten(tree)?;
        let saved_at = Utc::now().to_rfc3339();

        let count = self.mutate("save_tree", |tx| {
            tx.execute("DELETE FROM tree_nodes", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO tree_nodes (kind, id, parent_id, position, data)
                     VALUES (?, ?, ?, ?, ?)",
                )?;
                for row in &rows {
                    stmt.execute(params![
                        row.kind.as_str(),
                        row.id,
                        row.parent_id,
                        row.position,
                        row.data
                    ])?;
                }
            }
            Self::set_metadata_in_tx(tx, TREE_SAVED_AT_KEY, &saved_at)?;
            Ok(rows.len())
        })?;

        info!(nodes = count, "Saved tree snapshot");
        Ok(count)
    }

    fn read_tree_rows(&self) -> Result<Vec<TreeRow>> {
        let mut stmt = self
            .conn
            .prepare("SELECT kind, id, parent_id, position, data FROM tree_nodes")?;
        let raw = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        raw.into_iter()
            .map(|(kind, id, parent_id, position, data)| {
                Ok(TreeRow {
                    kind: kind.parse::<NodeKind>()?,
                    id,
                    parent_id,
                    position,
                    data,
                })
            })
            .collect()
    }

    /// Load the persisted tree.
    ///
    /// Prefers the snapshot; without one, rebuilds from result rows.
    /// Returns `Ok(None)` when the database holds neither.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedTree` if the snapshot or a row cannot be decoded.
    pub fn load_tree(&self) -> Result<Option<Tree>> {
        let rows = self.read_tree_rows()?;
        if !rows.is_empty() {
            let tree = unflatten(rows)?;
            debug!(results = tree.results.len(), "Loaded tree snapshot");
            return Ok(Some(tree));
        }

        let result_rows = self.read_result_rows()?;
        if result_rows.is_empty() {
            return Ok(None);
        }
        debug!(rows = result_rows.len(), "No snapshot, rebuilding tree from rows");
        let report = StaticTreeBuilder::new().build(result_rows)?;
        Ok(Some(report.tree))
    }

    /// Build a report with statistics from the stored rows.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedTree` if a row cannot be decoded.
    pub fn load_static_report(&self) -> Result<StaticReport> {
        StaticTreeBuilder::new().build(self.read_result_rows()?)
    }

    /// Get a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database update fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }

    fn set_metadata_in_tx(conn: &Connection, key: &str, value: &str) -> Result<()> {
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
            [key, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FormattedResult, ImageInfo};
    use crate::tree::TestsTreeBuilder;
    use tempfile::TempDir;

    fn row(path: &[&str], browser: &str, status: TestStatus, state: &str, timestamp: i64) -> ResultRow {
        let mut result = FormattedResult::new(path, browser, status);
        result.images_info = vec![ImageInfo::with_state(state, status)];
        result.timestamp = Some(timestamp);
        ResultRow::from_formatted(&result)
    }

    #[test]
    fn test_result_rows_roundtrip_in_order() {
        let mut storage = ReportStorage::open_memory().unwrap();
        let rows = vec![
            row(&["s", "t"], "chrome", TestStatus::Fail, "plain", 1),
            row(&["s", "t"], "firefox", TestStatus::Success, "plain", 2),
        ];
        assert_eq!(storage.insert_result_rows(&rows).unwrap(), 2);

        assert_eq!(storage.read_result_rows().unwrap(), rows);
        assert_eq!(storage.browsers().unwrap(), vec!["chrome", "firefox"]);
        assert_eq!(storage.count_result_rows().unwrap(), 2);
    }

    #[test]
    fn test_delete_result_row_matches_first_state() {
        let mut storage = ReportStorage::open_memory().unwrap();
        storage
            .insert_result_row(&row(&["s", "t"], "chrome", TestStatus::Updated, "plain", 7))
            .unwrap();
        storage
            .insert_result_row(&row(&["s", "t"], "chrome", TestStatus::Updated, "header", 7))
            .unwrap();

        let deleted = storage
            .delete_result_row(&["s", "t"], "chrome", TestStatus::Updated, 7, Some("header"))
            .unwrap();
        assert!(deleted);

        let left = storage.read_result_rows().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].first_state_name(), Some("plain"));

        let missing = storage
            .delete_result_row(&["s", "t"], "chrome", TestStatus::Updated, 8, Some("plain"))
            .unwrap();
        assert!(!missing);
    }

    #[test]
    fn test_load_tree_absent_is_none() {
        let storage = ReportStorage::open_memory().unwrap();
        assert!(storage.load_tree().unwrap().is_none());
    }

    #[test]
    fn test_save_and_load_tree_snapshot() {
        let mut builder = TestsTreeBuilder::default();
        builder
            .add_test_result(&FormattedResult::new(&["s", "t"], "chrome", TestStatus::Fail))
            .unwrap();
        let tree = builder.into_tree();

        let mut storage = ReportStorage::open_memory().unwrap();
        assert_eq!(storage.save_tree(&tree).unwrap(), 4);
        assert!(storage.get_metadata(TREE_SAVED_AT_KEY).unwrap().is_some());

        assert_eq!(storage.load_tree().unwrap(), Some(tree.clone()));

        // Saving again replaces rather than duplicates.
        storage.save_tree(&tree).unwrap();
        assert_eq!(storage.load_tree().unwrap(), Some(tree));
    }

    #[test]
    fn test_load_tree_falls_back_to_rows() {
        let mut storage = ReportStorage::open_memory().unwrap();
        storage
            .insert_result_rows(&[
                row(&["s", "t"], "chrome", TestStatus::Fail, "plain", 1),
                row(&["s", "t"], "chrome", TestStatus::Success, "plain", 2),
            ])
            .unwrap();

        let tree = storage.load_tree().unwrap().unwrap();
        assert_eq!(
            tree.browsers.get("s t chrome").unwrap().result_ids,
            vec!["s t chrome 0", "s t chrome 1"]
        );
    }

    #[test]
    fn test_corrupted_snapshot_is_distinct_error() {
        let storage = ReportStorage::open_memory().unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO tree_nodes (kind, id, parent_id, position, data)
                 VALUES ('suite', 's', NULL, 0, 'not json')",
                [],
            )
            .unwrap();

        let err = storage.load_tree().unwrap_err();
        assert!(matches!(err, ReportError::CorruptedTree { .. }));
    }

    #[test]
    fn test_open_existing_requires_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sqlite.db");
        let err = ReportStorage::open_existing(&path).unwrap_err();
        assert!(matches!(err, ReportError::ReportNotFound { .. }));

        {
            let mut storage = ReportStorage::open(&path).unwrap();
            storage.set_metadata("k", "v").unwrap();
        }
        let storage = ReportStorage::open_existing(&path).unwrap();
        assert_eq!(storage.get_metadata("k").unwrap().as_deref(), Some("v"));
    }
}
