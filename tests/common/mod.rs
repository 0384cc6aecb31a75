#![allow(dead_code)]

use report_tree::model::{FormattedResult, ImageFile, ImageInfo, TestStatus};
use report_tree::storage::ReportStorage;
use serde_json::json;
use std::sync::Once;
use std::time::Instant;
use tempfile::TempDir;
use tracing::info;

pub mod cli;

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        report_tree::logging::init_test_logging();
    });
}

pub struct TestLogGuard {
    name: String,
    start: Instant,
}

impl TestLogGuard {
    fn new(name: &str) -> Self {
        init_test_logging();
        info!("{name}: starting");
        Self {
            name: name.to_string(),
            start: Instant::now(),
        }
    }
}

impl Drop for TestLogGuard {
    fn drop(&mut self) {
        info!(
            "{}: assertions passed (elapsed {:?})",
            self.name,
            self.start.elapsed()
        );
    }
}

pub fn test_log(name: &str) -> TestLogGuard {
    TestLogGuard::new(name)
}

pub fn test_db() -> ReportStorage {
    init_test_logging();
    ReportStorage::open_memory().expect("Failed to create test database")
}

pub fn test_db_with_dir() -> (ReportStorage, TempDir) {
    init_test_logging();
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = dir.path().join("html-report").join("sqlite.db");
    std::fs::create_dir_all(db_path.parent().unwrap()).unwrap();
    let storage = ReportStorage::open(&db_path).expect("Failed to create test database");
    (storage, dir)
}

/// A result with an explicit attempt and timestamp.
pub fn result(path: &[&str], browser: &str, attempt: u32, status: TestStatus) -> FormattedResult {
    FormattedResult {
        attempt: Some(attempt),
        timestamp: Some(1_000 + i64::from(attempt)),
        ..FormattedResult::new(path, browser, status)
    }
}

/// Same as [`result`], reporting a browser version in `metaInfo`.
pub fn versioned_result(
    path: &[&str],
    browser: &str,
    version: &str,
    attempt: u32,
    status: TestStatus,
) -> FormattedResult {
    let mut formatted = result(path, browser, attempt, status);
    formatted
        .meta_info
        .insert("browserVersion".to_string(), json!(version));
    formatted
}

/// A screenshot assertion with the usual expected/actual/diff files.
pub fn screenshot(state: &str, browser: &str, attempt: u32, status: TestStatus) -> ImageInfo {
    ImageInfo {
        expected_img: Some(ImageFile::new(format!(
            "images/{state}/{browser}~ref_{attempt}.png"
        ))),
        actual_img: Some(ImageFile::new(format!(
            "images/{state}/{browser}~current_{attempt}.png"
        ))),
        diff_img: (status == TestStatus::Fail).then(|| {
            ImageFile::new(format!("images/{state}/{browser}~diff_{attempt}.png"))
        }),
        ..ImageInfo::with_state(state, status)
    }
}

/// Serialize results as the JSON-lines input of `rtree build`.
pub fn to_jsonl(results: &[FormattedResult]) -> String {
    results
        .iter()
        .map(|result| serde_json::to_string(result).expect("serialize result"))
        .collect::<Vec<_>>()
        .join("\n")
}
