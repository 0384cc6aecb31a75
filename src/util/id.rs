//! Identity scheme for tree nodes.
//!
//! Ids are space-joined paths:
//! - suite:   `"s1 s2"` (root suite: `"s1"`)
//! - browser: `"<suite id> <browser name>"`
//! - result:  `"<browser id> <attempt>"`
//! - image:   `"<result id> <state name>"`, or `"<result id> <STATUS>_<index>"`
//!   when the assertion has no state name
//!
//! Segments are not escaped. A segment containing a space can make two
//! different paths produce the same id; persisted reports depend on the
//! exact string format, so this is left as is.

use crate::error::{ReportError, Result};
use crate::model::TestStatus;

/// Separator between id segments.
pub const ID_DELIMITER: &str = " ";

/// Join id segments with the delimiter.
#[must_use]
pub fn build_id<S: AsRef<str>>(parts: &[S]) -> String {
    let mut id = String::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            id.push_str(ID_DELIMITER);
        }
        id.push_str(part.as_ref());
    }
    id
}

/// Suite id for a suite path.
#[must_use]
pub fn suite_id<S: AsRef<str>>(suite_path: &[S]) -> String {
    build_id(suite_path)
}

/// Parent suite id, `None` for root suites.
#[must_use]
pub fn parent_suite_id<S: AsRef<str>>(suite_path: &[S]) -> Option<String> {
    if suite_path.len() <= 1 {
        None
    } else {
        Some(build_id(&suite_path[..suite_path.len() - 1]))
    }
}

#[must_use]
pub fn browser_id(suite_id: &str, browser_name: &str) -> String {
    build_id(&[suite_id, browser_name])
}

#[must_use]
pub fn result_id(browser_id: &str, attempt: u32) -> String {
    format!("{browser_id}{ID_DELIMITER}{attempt}")
}

/// Attempt that follows `attempt` in the browser `browser_id`.
///
/// # Errors
///
/// Returns `AttemptOverflow` when `attempt` is already `u32::MAX`.
pub fn next_attempt(browser_id: &str, attempt: u32) -> Result<u32> {
    attempt
        .checked_add(1)
        .ok_or_else(|| ReportError::AttemptOverflow {
            browser_id: browser_id.to_string(),
            attempt,
        })
}

/// Key that identifies an image within its result.
#[must_use]
pub fn image_key(state_name: Option<&str>, status: TestStatus, index: usize) -> String {
    match state_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}_{index}", status.as_key()),
    }
}

#[must_use]
pub fn image_id(result_id: &str, key: &str) -> String {
    build_id(&[result_id, key])
}

/// The ids derived for one (test, browser, attempt) tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestIds {
    pub suite_id: String,
    pub browser_id: String,
    pub result_id: String,
}

impl TestIds {
    #[must_use]
    pub fn derive<S: AsRef<str>>(test_path: &[S], browser_name: &str, attempt: u32) -> Self {
        let suite_id = suite_id(test_path);
        let browser_id = browser_id(&suite_id, browser_name);
        let result_id = result_id(&browser_id, attempt);
        Self {
            suite_id,
            browser_id,
            result_id,
        }
    }

    #[must_use]
    pub fn image_id(&self, key: &str) -> String {
        image_id(&self.result_id, key)
    }
}

/// Reject paths and browser names that cannot produce a well-formed id.
///
/// # Errors
///
/// Returns `InvalidTestPath` for an empty path or an empty segment and
/// `InvalidBrowser` for an empty browser name.
pub fn validate_test_identity<S: AsRef<str>>(
    test_path: &[S],
    browser_name: &str,
    attempt: Option<u32>,
) -> Result<()> {
    let owned_path = || test_path.iter().map(|s| s.as_ref().to_string()).collect();

    if test_path.is_empty() {
        return Err(ReportError::InvalidTestPath {
            path: Vec::new(),
            browser: browser_name.to_string(),
            attempt,
            reason: "test path is empty".to_string(),
        });
    }

    if let Some(pos) = test_path.iter().position(|s| s.as_ref().is_empty()) {
        return Err(ReportError::InvalidTestPath {
            path: owned_path(),
            browser: browser_name.to_string(),
            attempt,
            reason: format!("segment {pos} is empty"),
        });
    }

    if browser_name.trim().is_empty() {
        return Err(ReportError::InvalidBrowser {
            path: owned_path(),
            browser: browser_name.to_string(),
            reason: "browser name is empty".to_string(),
        });
    }

    Ok(())
}
