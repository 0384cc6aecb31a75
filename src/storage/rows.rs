//! Row shapes exchanged with the database.
//!
//! - [`ResultRow`] - one result in the `suites` table, the report's
//!   append-only source of truth
//! - [`TreeRow`] - one node of a flattened tree snapshot
//!
//! [`flatten`] and [`unflatten`] are a lossless round trip of a [`Tree`]:
//! table order (`allIds`), root order and every child list survive.

use crate::error::{ReportError, Result};
use crate::model::{
    BrowserNode, FormattedResult, ImageInfo, ImageNode, NodeKind, ResultNode, SuiteNode,
    TestError, TestStatus, Tree,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One persisted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ResultRow {
    pub suite_path: Vec<String>,
    pub suite_name: String,
    /// Browser name.
    pub name: String,
    pub suite_url: Option<String>,
    pub meta_info: Map<String, Value>,
    pub history: Vec<String>,
    pub description: Option<String>,
    pub error: Option<TestError>,
    pub skip_reason: Option<String>,
    pub images_info: Vec<ImageInfo>,
    pub screenshot: bool,
    pub multiple_tabs: bool,
    pub status: TestStatus,
    pub timestamp: i64,
}

impl ResultRow {
    #[must_use]
    pub fn from_formatted(result: &FormattedResult) -> Self {
        Self {
            suite_path: result.test_path.clone(),
            suite_name: result.test_path.last().cloned().unwrap_or_default(),
            name: result.browser_id.clone(),
            suite_url: result.suite_url.clone(),
            meta_info: result.meta_info.clone(),
            history: result.history.clone(),
            description: result.description.clone(),
            error: result.error.clone(),
            skip_reason: result.skip_reason.clone(),
            images_info: result.images_info.clone(),
            screenshot: result.screenshot,
            multiple_tabs: result.multiple_tabs,
            status: result.status,
            timestamp: result.timestamp.unwrap_or_default(),
        }
    }

    /// Row of a result already in `tree`, with its images in order.
    fn from_tree_result(tree: &Tree, suite: &SuiteNode, browser: &BrowserNode, result: &ResultNode) -> Self {
        Self {
            suite_path: suite.suite_path.clone(),
            suite_name: suite.name.clone(),
            name: browser.name.clone(),
            suite_url: result.suite_url.clone(),
            meta_info: result.meta_info.clone(),
            history: result.history.clone(),
            description: result.description.clone(),
            error: result.error.clone(),
            skip_reason: result.skip_reason.clone(),
            images_info: result
                .image_ids
                .iter()
                .filter_map(|id| tree.images.get(id))
                .map(|image| image.info.clone())
                .collect(),
            screenshot: result.screenshot,
            multiple_tabs: result.multiple_tabs,
            status: result.status,
            timestamp: result.timestamp,
        }
    }

    #[must_use]
    pub fn into_formatted(self, attempt: u32) -> FormattedResult {
        FormattedResult {
            test_path: self.suite_path,
            browser_id: self.name,
            attempt: Some(attempt),
            status: self.status,
            meta_info: self.meta_info,
            images_info: self.images_info,
            timestamp: Some(self.timestamp),
            error: self.error,
            skip_reason: self.skip_reason,
            description: self.description,
            suite_url: self.suite_url,
            multiple_tabs: self.multiple_tabs,
            screenshot: self.screenshot,
            history: self.history,
        }
    }

    /// State name of the first image, used to identify a row on delete.
    #[must_use]
    pub fn first_state_name(&self) -> Option<&str> {
        self.images_info.first()?.state_name.as_deref()
    }
}

/// Rows for every result of `tree`, grouped by browser in attempt order.
///
/// Replaying these rows through the static builder yields the same attempts.
#[must_use]
pub fn result_rows(tree: &Tree) -> Vec<ResultRow> {
    let mut rows = Vec::with_capacity(tree.results.len());
    for browser in tree.browsers.iter() {
        let Some(suite) = tree.suites.get(&browser.parent_id) else {
            continue;
        };
        for result in browser.result_ids.iter().filter_map(|id| tree.results.get(id)) {
            rows.push(ResultRow::from_tree_result(tree, suite, browser, result));
        }
    }
    rows
}

/// One flattened tree node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeRow {
    pub kind: NodeKind,
    pub id: String,
    pub parent_id: Option<String>,
    /// Index in the table's `allIds`.
    pub position: i64,
    /// JSON-encoded node record.
    pub data: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuitePayload {
    #[serde(flatten)]
    node: SuiteNode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    root_position: Option<usize>,
}

fn row<T: Serialize>(
    kind: NodeKind,
    id: &str,
    parent_id: Option<&str>,
    position: usize,
    node: &T,
) -> Result<TreeRow> {
    Ok(TreeRow {
        kind,
        id: id.to_string(),
        parent_id: parent_id.map(ToString::to_string),
        position: i64::try_from(position)
            .map_err(|_| ReportError::corrupted(format!("{kind} table too large")))?,
        data: serde_json::to_string(node)?,
    })
}

/// Flatten `tree` into rows, suites first, each table in `allIds` order.
///
/// # Errors
///
/// Returns an error if a node cannot be serialized.
pub fn flatten(tree: &Tree) -> Result<Vec<TreeRow>> {
    let mut rows = Vec::with_capacity(
        tree.suites.len() + tree.browsers.len() + tree.results.len() + tree.images.len(),
    );

    for (position, suite) in tree.suites.iter().enumerate() {
        let payload = SuitePayload {
            node: suite.clone(),
            root_position: tree.suites.all_root_ids.iter().position(|id| id == &suite.id),
        };
        rows.push(row(
            NodeKind::Suite,
            &suite.id,
            suite.parent_id.as_deref(),
            position,
            &payload,
        )?);
    }
    for (position, browser) in tree.browsers.iter().enumerate() {
        rows.push(row(
            NodeKind::Browser,
            &browser.id,
            Some(&browser.parent_id),
            position,
            browser,
        )?);
    }
    for (position, result) in tree.results.iter().enumerate() {
        rows.push(row(
            NodeKind::Result,
            &result.id,
            Some(&result.parent_id),
            position,
            result,
        )?);
    }
    for (position, image) in tree.images.iter().enumerate() {
        rows.push(row(
            NodeKind::Image,
            &image.id,
            Some(&image.parent_id),
            position,
            image,
        )?);
    }

    Ok(rows)
}

const fn kind_rank(kind: NodeKind) -> u8 {
    match kind {
        NodeKind::Suite => 0,
        NodeKind::Browser => 1,
        NodeKind::Result => 2,
        NodeKind::Image => 3,
    }
}

fn decode<T: for<'de> Deserialize<'de>>(row: &TreeRow) -> Result<T> {
    serde_json::from_str(&row.data).map_err(|e| {
        ReportError::corrupted(format!("{} '{}': undecodable payload: {e}", row.kind, row.id))
    })
}

fn check_row(row: &TreeRow, id: &str, parent_id: Option<&str>) -> Result<()> {
    if row.id != id || row.parent_id.as_deref() != parent_id {
        return Err(ReportError::corrupted(format!(
            "{} '{}': row does not match its payload",
            row.kind, row.id
        )));
    }
    Ok(())
}

fn check_parent(row: &TreeRow, exists: bool) -> Result<()> {
    if exists {
        return Ok(());
    }
    Err(ReportError::corrupted(format!(
        "{} '{}': parent '{}' is missing",
        row.kind,
        row.id,
        row.parent_id.as_deref().unwrap_or_default()
    )))
}

fn duplicate(row: &TreeRow) -> ReportError {
    ReportError::corrupted(format!("{} '{}': duplicate row", row.kind, row.id))
}

/// Rebuild a tree from rows produced by [`flatten`].
///
/// # Errors
///
/// Returns `CorruptedTree` for undecodable payloads, rows that disagree with
/// their payload, duplicate rows, missing parents, or child lists that
/// reference missing nodes.
pub fn unflatten<I>(rows: I) -> Result<Tree>
where
    I: IntoIterator<Item = TreeRow>,
{
    let mut rows: Vec<TreeRow> = rows.into_iter().collect();
    rows.sort_by(|a, b| {
        kind_rank(a.kind)
            .cmp(&kind_rank(b.kind))
            .then(a.position.cmp(&b.position))
    });

    let mut tree = Tree::new();
    let mut roots: BTreeMap<usize, String> = BTreeMap::new();

    for row in &rows {
        match row.kind {
            NodeKind::Suite => {
                let payload: SuitePayload = decode(row)?;
                let suite = payload.node;
                check_row(row, &suite.id, suite.parent_id.as_deref())?;
                if let Some(position) = payload.root_position {
                    roots.insert(position, suite.id.clone());
                }
                if tree.suites.by_id.insert(suite.id.clone(), suite).is_some() {
                    return Err(duplicate(row));
                }
                tree.suites.all_ids.push(row.id.clone());
            }
            NodeKind::Browser => {
                let browser: BrowserNode = decode(row)?;
                check_row(row, &browser.id, Some(&browser.parent_id))?;
                check_parent(row, tree.suites.contains(&browser.parent_id))?;
                if !tree.browsers.insert(&row.id, browser) {
                    return Err(duplicate(row));
                }
            }
            NodeKind::Result => {
                let result: ResultNode = decode(row)?;
                check_row(row, &result.id, Some(&result.parent_id))?;
                check_parent(row, tree.browsers.contains(&result.parent_id))?;
                if !tree.results.insert(&row.id, result) {
                    return Err(duplicate(row));
                }
            }
            NodeKind::Image => {
                let image: ImageNode = decode(row)?;
                check_row(row, &image.id, Some(&image.parent_id))?;
                check_parent(row, tree.results.contains(&image.parent_id))?;
                if !tree.images.insert(&row.id, image) {
                    return Err(duplicate(row));
                }
            }
        }
    }

    // Suite parents can only be checked once every suite is in.
    for row in rows.iter().filter(|row| row.kind == NodeKind::Suite) {
        if let Some(parent_id) = &row.parent_id {
            check_parent(row, tree.suites.contains(parent_id))?;
        }
    }

    tree.suites.all_root_ids = roots.into_values().collect();
    tree.check_integrity()?;
    Ok(tree)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageFile;
    use crate::tree::TestsTreeBuilder;

    fn sample_tree() -> Tree {
        let mut builder = TestsTreeBuilder::default();
        for (path, browser, status) in [
            (vec!["b-suite", "t1"], "chrome", TestStatus::Fail),
            (vec!["a-suite", "t2"], "firefox", TestStatus::Success),
            (vec!["b-suite", "t1"], "chrome", TestStatus::Success),
        ] {
            let mut result = FormattedResult::new(path.as_slice(), browser, status);
            let mut image = ImageInfo::with_state("plain", status);
            image.actual_img = Some(ImageFile::new("images/plain/current.png"));
            result.images_info = vec![image];
            builder.add_test_result(&result).unwrap();
        }
        builder.sort_tree();
        builder.into_tree()
    }

    #[test]
    fn test_flatten_roundtrip_keeps_order() {
        let tree = sample_tree();
        // Sorting reorders roots but not insertion order of allIds.
        assert_eq!(tree.suites.all_root_ids, vec!["a-suite", "b-suite"]);
        assert_eq!(tree.suites.all_ids[0], "b-suite");

        let rows = flatten(&tree).unwrap();
        assert_eq!(rows.len(), 4 + 2 + 3 + 3);

        let restored = unflatten(rows).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_unflatten_ignores_row_order() {
        let tree = sample_tree();
        let mut rows = flatten(&tree).unwrap();
        rows.reverse();
        assert_eq!(unflatten(rows).unwrap(), tree);
    }

    #[test]
    fn test_unflatten_rejects_bad_payload() {
        let mut rows = flatten(&sample_tree()).unwrap();
        rows[0].data = "{not json".to_string();
        let err = unflatten(rows).unwrap_err();
        assert!(matches!(err, ReportError::CorruptedTree { .. }));
    }

    #[test]
    fn test_unflatten_rejects_dangling_parent() {
        let rows: Vec<TreeRow> = flatten(&sample_tree())
            .unwrap()
            .into_iter()
            .filter(|row| row.kind != NodeKind::Browser)
            .collect();
        let err = unflatten(rows).unwrap_err();
        assert!(err.to_string().contains("parent"));
    }

    #[test]
    fn test_unflatten_rejects_missing_child() {
        let rows: Vec<TreeRow> = flatten(&sample_tree())
            .unwrap()
            .into_iter()
            .filter(|row| row.kind != NodeKind::Image || row.id != "a-suite t2 firefox 0 plain")
            .collect();
        let err = unflatten(rows).unwrap_err();
        assert!(matches!(err, ReportError::CorruptedTree { .. }));
    }

    #[test]
    fn test_unflatten_rejects_mismatched_row() {
        let mut rows = flatten(&sample_tree()).unwrap();
        let browser = rows
            .iter_mut()
            .find(|row| row.kind == NodeKind::Browser)
            .unwrap();
        browser.id = "elsewhere".to_string();
        assert!(unflatten(rows).is_err());
    }

    #[test]
    fn test_result_rows_replay_attempt_order() {
        let tree = sample_tree();
        let rows = result_rows(&tree);
        assert_eq!(rows.len(), 3);

        let chrome: Vec<TestStatus> = rows
            .iter()
            .filter(|row| row.name == "chrome")
            .map(|row| row.status)
            .collect();
        assert_eq!(chrome, vec![TestStatus::Fail, TestStatus::Success]);
        assert_eq!(rows[0].first_state_name(), Some("plain"));
    }

    #[test]
    fn test_formatted_row_roundtrip() {
        let mut result = FormattedResult::new(&["s", "t"], "chrome", TestStatus::Skipped);
        result.skip_reason = Some("not today".to_string());
        result.timestamp = Some(42);

        let row = ResultRow::from_formatted(&result);
        assert_eq!(row.suite_name, "t");

        let back = row.into_formatted(3);
        assert_eq!(back.attempt, Some(3));
        assert_eq!(back.skip_reason.as_deref(), Some("not today"));
        assert_eq!(back.timestamp, Some(42));
    }
}
