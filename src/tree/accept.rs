//! Accepting screenshots and undoing an accept.
//!
//! Accepting a state records a new result whose images are copied from the
//! failed attempt with the accepted state replaced. Undoing either removes
//! that result (when it only existed for this state) or reverts the image
//! to its record in the previous attempt.

use crate::error::{ReportError, Result};
use crate::model::{FormattedResult, ImageInfo, ImageNode, TestStatus, Tree};
use crate::tree::builder::TestsTreeBuilder;
use crate::util::{ImageKind, image_path, short_hash};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// What undoing an accept of `state_name` in `result_id` would touch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnacceptImageData {
    pub image_id: String,
    pub status: TestStatus,
    pub timestamp: i64,
    pub previous_image: Option<ImageNode>,
    pub previous_image_id: Option<String>,
    pub should_remove_result: bool,
    /// Reference path the previous attempt compared against.
    pub previous_expected_path: Option<String>,
    /// No reference existed before the accept: delete the file.
    pub should_remove_reference: bool,
    /// A reference existed before the accept: restore it.
    pub should_revert_reference: bool,
}

/// Outcome of [`TestsTreeBuilder::undo_accept_image`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoAcceptImageResult {
    pub updated_image: Option<ImageNode>,
    pub removed_result: Option<String>,
    pub previous_expected_path: Option<String>,
    pub should_remove_reference: bool,
    pub should_revert_reference: bool,
    /// Status and timestamp of the undone result, for deleting its row.
    pub status: TestStatus,
    pub timestamp: i64,
}

/// Status of a result built from accepted images.
fn derive_updated_status(images: &[ImageInfo], has_error: bool) -> TestStatus {
    if images.iter().any(|image| image.status == TestStatus::Fail) {
        TestStatus::Fail
    } else if has_error || images.iter().any(|image| image.status == TestStatus::Error) {
        TestStatus::Error
    } else {
        TestStatus::Success
    }
}

impl TestsTreeBuilder {
    /// Record accepted screenshots as a new (or the current updated) attempt.
    ///
    /// Images of `fail_result_id` are copied and each accepted image replaces
    /// the one with its state name, or the last one when it has none.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` for an unknown `fail_result_id`, or the
    /// errors of [`TestsTreeBuilder::add_test_result`].
    pub fn add_updated_result(
        &mut self,
        accepted: &FormattedResult,
        fail_result_id: Option<&str>,
    ) -> Result<String> {
        let mut images: Vec<ImageInfo> = match fail_result_id {
            Some(result_id) => self
                .get_images_info(result_id)?
                .into_iter()
                .map(|image| image.info.clone())
                .collect(),
            None => Vec::new(),
        };

        if images.is_empty() {
            images.clone_from(&accepted.images_info);
        } else {
            for accepted_image in &accepted.images_info {
                let index = images
                    .iter()
                    .position(|image| image.state_name == accepted_image.state_name)
                    .unwrap_or(images.len() - 1);
                images[index] = accepted_image.clone();
            }
        }

        let attempt = accepted.attempt.unwrap_or_else(|| {
            self.updated_attempt(accepted.test_path.as_slice(), &accepted.browser_id)
                .unwrap_or(0)
        });
        let status = derive_updated_status(&images, accepted.error.is_some());

        let result = FormattedResult {
            attempt: Some(attempt),
            status,
            images_info: images,
            ..accepted.clone()
        };
        let result_id = self.add_test_result(&result)?;

        info!(result_id = %result_id, status = %status, "Recorded accepted screenshots");
        Ok(result_id)
    }

    /// Work out how to undo accepting `state_name` in `result_id`.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` or `StateNotFound`.
    pub fn get_result_data_to_unaccept_image(
        &self,
        result_id: &str,
        state_name: &str,
    ) -> Result<UnacceptImageData> {
        let tree = self.tree();
        let result = tree
            .results
            .get(result_id)
            .ok_or_else(|| ReportError::ResultNotFound {
                id: result_id.to_string(),
            })?;
        let image = find_state(tree, &result.image_ids, state_name).ok_or_else(|| {
            ReportError::StateNotFound {
                result_id: result_id.to_string(),
                state_name: state_name.to_string(),
            }
        })?;

        let previous_result = tree.browsers.get(&result.parent_id).and_then(|browser| {
            let position = browser.result_ids.iter().position(|id| id == result_id)?;
            let previous_id = browser.result_ids.get(position.checked_sub(1)?)?;
            tree.results.get(previous_id)
        });
        let previous_image =
            previous_result.and_then(|prev| find_state(tree, &prev.image_ids, state_name));

        let should_remove_result = image.info.status.is_updated() && result.image_ids.len() == 1;
        let should_remove_reference = previous_image
            .and_then(|prev| prev.info.ref_img.as_ref())
            .and_then(|ref_img| ref_img.size)
            .is_none();

        Ok(UnacceptImageData {
            image_id: image.id.clone(),
            status: image.info.status,
            timestamp: result.timestamp,
            previous_image: previous_image.cloned(),
            previous_image_id: previous_image.map(|prev| prev.id.clone()),
            should_remove_result,
            previous_expected_path: previous_image
                .and_then(|prev| prev.info.expected_img.as_ref())
                .map(|img| img.path.clone()),
            should_remove_reference,
            should_revert_reference: !should_remove_reference,
        })
    }

    /// Undo accepting `state_name` in `result_id`.
    ///
    /// Returns `Ok(None)` when that image is not in the updated state.
    /// The expected-path cache entry of the state is pointed back at the
    /// previous reference, or cleared when there was none.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` or `StateNotFound`.
    pub fn undo_accept_image(
        &mut self,
        result_id: &str,
        state_name: &str,
        cache: &mut ExpectedPathCache,
    ) -> Result<Option<UndoAcceptImageResult>> {
        let data = self.get_result_data_to_unaccept_image(result_id, state_name)?;
        if !data.status.is_updated() {
            debug!(result_id, state_name, "Image is not accepted, nothing to undo");
            return Ok(None);
        }

        let (test_path, browser_name) = self.test_identity(result_id)?;
        let mut updated_image = None;
        let mut removed_result = None;

        if data.should_remove_result {
            self.remove_test_result(result_id)?;
            removed_result = Some(result_id.to_string());
        } else if let Some(previous) = &data.previous_image {
            let image = self.update_image_info(&data.image_id, previous.info.clone())?;
            self.rederive_result_status(result_id);
            updated_image = Some(image);
        }

        cache.update(
            test_path.as_slice(),
            &browser_name,
            Some(state_name),
            data.previous_expected_path.as_deref(),
        );

        info!(
            result_id,
            state_name,
            removed = removed_result.is_some(),
            "Undid accepted screenshot"
        );

        Ok(Some(UndoAcceptImageResult {
            updated_image,
            removed_result,
            previous_expected_path: data.previous_expected_path,
            should_remove_reference: data.should_remove_reference,
            should_revert_reference: data.should_revert_reference,
            status: data.status,
            timestamp: data.timestamp,
        }))
    }

    fn test_identity(&self, result_id: &str) -> Result<(Vec<String>, String)> {
        let tree = self.tree();
        let browser = tree
            .results
            .get(result_id)
            .and_then(|result| tree.browsers.get(&result.parent_id))
            .ok_or_else(|| ReportError::ResultNotFound {
                id: result_id.to_string(),
            })?;
        let suite = tree
            .suites
            .get(&browser.parent_id)
            .ok_or_else(|| ReportError::SuiteNotFound {
                id: browser.parent_id.clone(),
            })?;
        Ok((suite.suite_path.clone(), browser.name.clone()))
    }

    fn rederive_result_status(&mut self, result_id: &str) {
        let Some(result) = self.tree.results.get(result_id) else {
            return;
        };
        let images: Vec<ImageInfo> = result
            .image_ids
            .iter()
            .filter_map(|id| self.tree.images.get(id))
            .map(|image| image.info.clone())
            .collect();
        let status = derive_updated_status(&images, result.error.is_some());
        let browser_id = result.parent_id.clone();

        if let Some(result) = self.tree.results.get_mut(result_id) {
            result.status = status;
        }
        if let Some(suite_id) = self.tree.browsers.get(&browser_id).map(|b| b.parent_id.clone()) {
            self.tree.recompute_branch(&suite_id);
        }
    }
}

fn find_state<'a>(tree: &'a Tree, image_ids: &[String], state_name: &str) -> Option<&'a ImageNode> {
    image_ids
        .iter()
        .filter_map(|id| tree.images.get(id))
        .find(|image| image.info.state_name.as_deref() == Some(state_name))
}

/// Input to [`ExpectedPathCache::resolve`].
#[derive(Debug, Clone, Copy)]
pub struct ExpectedPathRequest<'a> {
    pub test_path: &'a [String],
    pub browser_name: &'a str,
    pub attempt: u32,
    pub status: TestStatus,
    pub state_name: Option<&'a str>,
}

/// A resolved reference image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedPath {
    pub path: String,
    /// The path came from the cache or an earlier attempt.
    pub reused: bool,
}

/// Session-scoped cache of reference image destinations.
///
/// Keyed by a short hash of (test, browser) plus the state name, so every
/// attempt of a state compares against the same reference file.
#[derive(Debug, Clone, Default)]
pub struct ExpectedPathCache {
    image_dir: String,
    paths: HashMap<String, String>,
}

impl ExpectedPathCache {
    #[must_use]
    pub fn new(image_dir: impl Into<String>) -> Self {
        Self {
            image_dir: image_dir.into(),
            paths: HashMap::new(),
        }
    }

    #[must_use]
    pub fn key<S: AsRef<str>>(test_path: &[S], browser_name: &str, state_name: Option<&str>) -> String {
        let full_name = crate::util::id::build_id(test_path);
        format!(
            "{}#{}",
            short_hash(&[full_name.as_str(), browser_name]),
            state_name.unwrap_or_default()
        )
    }

    fn reference_path(&self, request: &ExpectedPathRequest<'_>) -> String {
        let test_dir = format!(
            "{}/{}",
            self.image_dir,
            short_hash(&[crate::util::id::build_id(request.test_path)])
        );
        image_path(
            &test_dir,
            request.state_name,
            request.browser_name,
            ImageKind::Ref,
            request.attempt,
        )
    }

    /// Resolve where the reference image of a state lives.
    ///
    /// Order: an accepted image gets a fresh path; then a cached path;
    /// then the expected image of the latest attempt with that state;
    /// otherwise a fresh path. Every outcome is cached.
    pub fn resolve(&mut self, tree: &Tree, request: &ExpectedPathRequest<'_>) -> ExpectedPath {
        let key = Self::key(request.test_path, request.browser_name, request.state_name);

        if request.status.is_updated() {
            let path = self.reference_path(request);
            self.paths.insert(key, path.clone());
            return ExpectedPath {
                path,
                reused: false,
            };
        }

        if let Some(path) = self.paths.get(&key) {
            return ExpectedPath {
                path: path.clone(),
                reused: true,
            };
        }

        if let Some(path) = last_expected_path(tree, request) {
            self.paths.insert(key, path.clone());
            return ExpectedPath { path, reused: true };
        }

        let path = self.reference_path(request);
        self.paths.insert(key, path.clone());
        ExpectedPath {
            path,
            reused: false,
        }
    }

    /// Point a state at `expected_path`, or forget it when `None`.
    pub fn update<S: AsRef<str>>(
        &mut self,
        test_path: &[S],
        browser_name: &str,
        state_name: Option<&str>,
        expected_path: Option<&str>,
    ) {
        let key = Self::key(test_path, browser_name, state_name);
        match expected_path.filter(|path| !path.is_empty()) {
            Some(path) => {
                self.paths.insert(key, path.to_string());
            }
            None => {
                self.paths.remove(&key);
            }
        }
    }

    #[must_use]
    pub fn get<S: AsRef<str>>(
        &self,
        test_path: &[S],
        browser_name: &str,
        state_name: Option<&str>,
    ) -> Option<&str> {
        self.paths
            .get(&Self::key(test_path, browser_name, state_name))
            .map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn last_expected_path(tree: &Tree, request: &ExpectedPathRequest<'_>) -> Option<String> {
    let state_name = request.state_name?;
    let browser_id = crate::util::id::browser_id(
        &crate::util::id::suite_id(request.test_path),
        request.browser_name,
    );
    let browser = tree.browsers.get(&browser_id)?;

    browser
        .result_ids
        .iter()
        .rev()
        .filter_map(|result_id| tree.results.get(result_id))
        .find_map(|result| find_state(tree, &result.image_ids, state_name))
        .and_then(|image| image.info.expected_img.as_ref())
        .map(|img| img.path.clone())
}
