//! Core data types for `report_tree`.
//!
//! This module defines the fundamental types used throughout the application:
//! - `TestStatus` - Result / image / suite statuses
//! - `ImageInfo` - One visual assertion ("state") as reported by a runner
//! - `FormattedResult` - One attempt of a test in a browser, as fed to the builder
//! - `SuiteNode`, `BrowserNode`, `ResultNode`, `ImageNode` - Normalized tree records
//! - `Tree` - The four id-keyed tables

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Browser version recorded when the runner does not report one.
pub const UNKNOWN_BROWSER_VERSION: &str = "unknown";

/// Key under which runners put the browser version in `metaInfo`.
pub const BROWSER_VERSION_META_KEY: &str = "browserVersion";

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Status of a result, an image or (aggregated) a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Skipped,
    Success,
    Updated,
    Fail,
    Error,
}

impl TestStatus {
    pub const ALL: [Self; 8] = [
        Self::Idle,
        Self::Queued,
        Self::Running,
        Self::Skipped,
        Self::Success,
        Self::Updated,
        Self::Fail,
        Self::Error,
    ];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Skipped => "skipped",
            Self::Success => "success",
            Self::Updated => "updated",
            Self::Fail => "fail",
            Self::Error => "error",
        }
    }

    /// Upper-case form used in synthetic image keys (`FAIL_0`).
    #[must_use]
    pub fn as_key(&self) -> String {
        self.as_str().to_uppercase()
    }

    /// Running and queued tests have no outcome yet.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Running | Self::Queued)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Fail | Self::Error)
    }

    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated)
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TestStatus {
    type Err = crate::error::ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(Self::Idle),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "skipped" => Ok(Self::Skipped),
            "success" => Ok(Self::Success),
            "updated" => Ok(Self::Updated),
            "fail" => Ok(Self::Fail),
            "error" => Ok(Self::Error),
            other => Err(crate::error::ReportError::InvalidStatus {
                status: other.to_string(),
            }),
        }
    }
}

/// Pixel dimensions of a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// A screenshot file on disk (path relative to the report directory).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<ImageSize>,
}

impl ImageFile {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: None,
        }
    }
}

/// The reference image a runner compared against.
///
/// `size` is absent when no reference existed before the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefImageFile {
    pub path: String,
    #[serde(default)]
    pub size: Option<ImageSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative_path: Option<String>,
}

/// Bounding box of one cluster of differing pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordBounds {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
}

impl CoordBounds {
    #[must_use]
    pub const fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    #[must_use]
    pub const fn height(&self) -> i64 {
        self.bottom - self.top + 1
    }
}

/// Error reported by a runner for a result or an assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestError {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
}

/// One named visual assertion within an attempt, with its diff fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImageInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_name: Option<String>,
    pub status: TestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_img: Option<RefImageFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_img: Option<ImageFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_img: Option<ImageFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_img: Option<ImageFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff_clusters: Vec<CoordBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub different_pixels: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
}

impl ImageInfo {
    #[must_use]
    pub fn with_state(state_name: impl Into<String>, status: TestStatus) -> Self {
        Self {
            state_name: Some(state_name.into()),
            status,
            ..Self::default()
        }
    }

    /// Every file path this image refers to.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.ref_img
            .as_ref()
            .map(|img| img.path.as_str())
            .into_iter()
            .chain(self.expected_img.as_ref().map(|img| img.path.as_str()))
            .chain(self.actual_img.as_ref().map(|img| img.path.as_str()))
            .chain(self.diff_img.as_ref().map(|img| img.path.as_str()))
    }
}

/// A test result normalized by a runner adapter: the builder's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct FormattedResult {
    pub test_path: Vec<String>,
    pub browser_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    pub status: TestStatus,
    #[serde(default)]
    pub meta_info: Map<String, Value>,
    #[serde(default)]
    pub images_info: Vec<ImageInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multiple_tabs: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub screenshot: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
}

impl FormattedResult {
    #[must_use]
    pub fn new(test_path: &[&str], browser_id: &str, status: TestStatus) -> Self {
        Self {
            test_path: test_path.iter().map(ToString::to_string).collect(),
            browser_id: browser_id.to_string(),
            status,
            ..Self::default()
        }
    }

    /// Space-joined test path (the leaf suite id).
    #[must_use]
    pub fn full_name(&self) -> String {
        self.test_path.join(crate::util::id::ID_DELIMITER)
    }

    /// Browser version from `metaInfo`, or `unknown`.
    #[must_use]
    pub fn browser_version(&self) -> &str {
        browser_version_of(&self.meta_info)
    }
}

/// Read the browser version out of a `metaInfo` map.
#[must_use]
pub fn browser_version_of(meta_info: &Map<String, Value>) -> &str {
    meta_info
        .get(BROWSER_VERSION_META_KEY)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN_BROWSER_VERSION)
}

/// A grouping node in the test hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteNode {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub root: bool,
    pub suite_path: Vec<String>,
    #[serde(default)]
    pub status: Option<TestStatus>,
    #[serde(default)]
    pub suite_ids: Vec<String>,
    #[serde(default)]
    pub browser_ids: Vec<String>,
}

/// One (suite, browser-name) pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserNode {
    pub id: String,
    pub name: String,
    pub parent_id: String,
    #[serde(default)]
    pub result_ids: Vec<String>,
    pub version: String,
}

/// One attempt of running a test in a browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct ResultNode {
    pub id: String,
    pub parent_id: String,
    #[serde(default)]
    pub image_ids: Vec<String>,
    pub attempt: u32,
    pub status: TestStatus,
    #[serde(default)]
    pub meta_info: Map<String, Value>,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TestError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suite_url: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub multiple_tabs: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub screenshot: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<String>,
}

/// One named assertion within a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageNode {
    pub id: String,
    pub parent_id: String,
    #[serde(flatten)]
    pub info: ImageInfo,
}

/// Discriminates the four tables (used by flattening and generic traversal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Suite,
    Browser,
    Result,
    Image,
}

impl NodeKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Suite => "suite",
            Self::Browser => "browser",
            Self::Result => "result",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = crate::error::ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "suite" => Ok(Self::Suite),
            "browser" => Ok(Self::Browser),
            "result" => Ok(Self::Result),
            "image" => Ok(Self::Image),
            other => Err(crate::error::ReportError::corrupted(format!(
                "unknown node kind '{other}'"
            ))),
        }
    }
}

/// An id-keyed table plus its iteration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table<T> {
    pub by_id: BTreeMap<String, T>,
    pub all_ids: Vec<String>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            by_id: BTreeMap::new(),
            all_ids: Vec::new(),
        }
    }
}

impl<T> Table<T> {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut T> {
        self.by_id.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Insert or overwrite. Returns `true` when the id is new.
    pub fn insert(&mut self, id: &str, node: T) -> bool {
        let is_new = self.by_id.insert(id.to_string(), node).is_none();
        if is_new {
            self.all_ids.push(id.to_string());
        }
        is_new
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        let removed = self.by_id.remove(id);
        if removed.is_some() {
            self.all_ids.retain(|existing| existing != id);
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Records in `all_ids` order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.all_ids.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// Suites table: a `Table` that also tracks root suites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuiteTable {
    pub by_id: BTreeMap<String, SuiteNode>,
    pub all_ids: Vec<String>,
    pub all_root_ids: Vec<String>,
}

impl SuiteTable {
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SuiteNode> {
        self.by_id.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut SuiteNode> {
        self.by_id.get_mut(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SuiteNode> {
        self.all_ids.iter().filter_map(|id| self.by_id.get(id))
    }
}

/// The normalized results tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Tree {
    pub suites: SuiteTable,
    pub browsers: Table<BrowserNode>,
    pub results: Table<ResultNode>,
    pub images: Table<ImageNode>,
}

impl Tree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.suites.is_empty() && self.browsers.is_empty() && self.results.is_empty()
    }
}
