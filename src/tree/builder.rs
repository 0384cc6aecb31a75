//! Tree builder: folds formatted results into a [`Tree`] one at a time.
//!
//! Besides `add_test_result`, the builder exposes the read helpers the
//! report UI needs (images of a result, breadcrumb branch, last result and
//! attempt bookkeeping for retries and accepted screenshots).

use crate::error::{ReportError, Result};
use crate::model::{FormattedResult, ImageInfo, ImageNode, ResultNode, TestStatus, Tree};
use crate::tree::reuse::{ReuseReport, reuse_tests_tree};
use crate::util::id::{self, TestIds, validate_test_identity};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Builder behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderOptions {
    /// Sort the tree after every insertion (interactive use).
    pub sort_on_insert: bool,
}

/// One suite in a result's ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchSuite {
    pub id: String,
    pub status: Option<TestStatus>,
}

/// A result with its images and its root-first suite chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestBranch {
    pub result: ResultNode,
    pub images: Vec<ImageNode>,
    pub suites: Vec<BranchSuite>,
}

/// Everything needed to overwrite reference images for one result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefUpdateData {
    /// Suite path without the test name.
    pub suite_path: Vec<String>,
    pub test_name: String,
    pub browser_id: String,
    pub meta_info: Map<String, Value>,
    pub images_info: Vec<ImageInfo>,
    pub attempt: u32,
}

/// An image together with the name of the browser that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserImage {
    #[serde(flatten)]
    pub image: ImageNode,
    pub browser_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct TestsTreeBuilder {
    pub(crate) tree: Tree,
    options: BuilderOptions,
}

impl TestsTreeBuilder {
    #[must_use]
    pub fn new(options: BuilderOptions) -> Self {
        Self {
            tree: Tree::new(),
            options,
        }
    }

    /// Continue building on top of an existing tree.
    #[must_use]
    pub const fn from_tree(tree: Tree, options: BuilderOptions) -> Self {
        Self { tree, options }
    }

    #[must_use]
    pub const fn tree(&self) -> &Tree {
        &self.tree
    }

    #[must_use]
    pub fn into_tree(self) -> Tree {
        self.tree
    }

    #[must_use]
    pub const fn options(&self) -> BuilderOptions {
        self.options
    }

    /// Insert one attempt of a test and re-aggregate its suite branch.
    ///
    /// When `attempt` is absent it defaults to the number of results the
    /// browser already holds. Re-adding an existing attempt overwrites it in
    /// place: images whose ids survive keep their position.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTestPath` / `InvalidBrowser` for a malformed identity;
    /// nothing is inserted in that case.
    pub fn add_test_result(&mut self, formatted: &FormattedResult) -> Result<String> {
        let test_path = formatted.test_path.as_slice();
        validate_test_identity(test_path, &formatted.browser_id, formatted.attempt)?;

        let suite_id = self.tree.upsert_suite_path(test_path)?;
        let browser_id = self.tree.upsert_browser(
            &suite_id,
            &formatted.browser_id,
            formatted.browser_version(),
        )?;

        let attempt = formatted.attempt.unwrap_or_else(|| {
            self.tree
                .browsers
                .get(&browser_id)
                .map_or(0, |b| u32::try_from(b.result_ids.len()).unwrap_or(u32::MAX))
        });
        let ids = TestIds::derive(test_path, &formatted.browser_id, attempt);

        let image_keys: Vec<String> = formatted
            .images_info
            .iter()
            .enumerate()
            .map(|(index, info)| id::image_key(info.state_name.as_deref(), info.status, index))
            .collect();
        let mut image_ids: Vec<String> = Vec::with_capacity(image_keys.len());
        for key in &image_keys {
            let image_id = ids.image_id(key);
            if !image_ids.contains(&image_id) {
                image_ids.push(image_id);
            }
        }

        let result = ResultNode {
            id: ids.result_id.clone(),
            parent_id: browser_id,
            image_ids,
            attempt,
            status: formatted.status,
            meta_info: formatted.meta_info.clone(),
            timestamp: formatted.timestamp.unwrap_or_default(),
            error: formatted.error.clone(),
            skip_reason: formatted.skip_reason.clone(),
            description: formatted.description.clone(),
            suite_url: formatted.suite_url.clone(),
            multiple_tabs: formatted.multiple_tabs,
            screenshot: formatted.screenshot,
            history: formatted.history.clone(),
        };
        self.tree.upsert_result(result)?;

        for (key, info) in image_keys.iter().zip(&formatted.images_info) {
            self.tree.upsert_image(&ids.result_id, key, info.clone())?;
        }

        self.tree.recompute_branch(&suite_id);
        if self.options.sort_on_insert {
            self.tree.sort_tree();
        }

        debug!(
            result_id = %ids.result_id,
            status = %formatted.status,
            images = formatted.images_info.len(),
            "Added test result"
        );

        Ok(ids.result_id)
    }

    pub fn sort_tree(&mut self) {
        self.tree.sort_tree();
    }

    /// Overlay a previously persisted tree onto this one.
    pub fn reuse_tests_tree(&mut self, previous: Option<&Tree>) -> ReuseReport {
        reuse_tests_tree(&mut self.tree, previous)
    }

    fn result(&self, result_id: &str) -> Result<&ResultNode> {
        self.tree
            .results
            .get(result_id)
            .ok_or_else(|| ReportError::ResultNotFound {
                id: result_id.to_string(),
            })
    }

    fn image(&self, image_id: &str) -> Result<&ImageNode> {
        self.tree
            .images
            .get(image_id)
            .ok_or_else(|| ReportError::ImageNotFound {
                id: image_id.to_string(),
            })
    }

    /// Images of a result in assertion order.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the result does not exist.
    pub fn get_images_info(&self, result_id: &str) -> Result<Vec<&ImageNode>> {
        let result = self.result(result_id)?;
        Ok(result
            .image_ids
            .iter()
            .filter_map(|image_id| self.tree.images.get(image_id))
            .collect())
    }

    /// Result, images and root-first suite chain of a result.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the result does not exist.
    pub fn get_test_branch(&self, result_id: &str) -> Result<TestBranch> {
        let result = self.result(result_id)?;
        let images = self
            .get_images_info(result_id)?
            .into_iter()
            .cloned()
            .collect();
        let suites = self
            .tree
            .browsers
            .get(&result.parent_id)
            .map(|browser| {
                self.tree
                    .suite_chain(&browser.parent_id)
                    .into_iter()
                    .map(|suite| BranchSuite {
                        id: suite.id.clone(),
                        status: suite.status,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(TestBranch {
            result: result.clone(),
            images,
            suites,
        })
    }

    /// Latest result of a test in a browser.
    #[must_use]
    pub fn get_last_result<S: AsRef<str>>(
        &self,
        test_path: &[S],
        browser_name: &str,
    ) -> Option<&ResultNode> {
        let browser_id = id::browser_id(&id::suite_id(test_path), browser_name);
        self.tree.latest_result(&browser_id)
    }

    fn require_last_result<S: AsRef<str>>(
        &self,
        test_path: &[S],
        browser_name: &str,
    ) -> Result<&ResultNode> {
        self.get_last_result(test_path, browser_name)
            .ok_or_else(|| ReportError::ResultNotFound {
                id: id::browser_id(&id::suite_id(test_path), browser_name),
            })
    }

    /// Attempt for a result that is about to start or finish.
    ///
    /// A last result that never produced an outcome (idle, running or
    /// skipped) is overwritten in place; otherwise a new attempt is opened.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the test has no result in that browser,
    /// `AttemptOverflow` if a new attempt would not fit in a `u32`.
    pub fn current_attempt<S: AsRef<str>>(&self, test_path: &[S], browser_name: &str) -> Result<u32> {
        let last = self.require_last_result(test_path, browser_name)?;
        match last.status {
            TestStatus::Idle | TestStatus::Running | TestStatus::Skipped => Ok(last.attempt),
            _ => id::next_attempt(&last.parent_id, last.attempt),
        }
    }

    /// Attempt for a result recording an accepted screenshot.
    ///
    /// Accepting several states of one test lands in the same attempt.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the test has no result in that browser,
    /// `AttemptOverflow` if a new attempt would not fit in a `u32`.
    pub fn updated_attempt<S: AsRef<str>>(&self, test_path: &[S], browser_name: &str) -> Result<u32> {
        let last = self.require_last_result(test_path, browser_name)?;
        let has_updated_image = last
            .image_ids
            .iter()
            .filter_map(|image_id| self.tree.images.get(image_id))
            .any(|image| image.info.status.is_updated());

        if has_updated_image {
            Ok(last.attempt)
        } else {
            id::next_attempt(&last.parent_id, last.attempt)
        }
    }

    /// Group the given images by result and describe the reference update
    /// each result needs. Results appear in first-seen order.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for any unknown image or a broken parent chain.
    pub fn get_tests_data_to_update_refs<S: AsRef<str>>(
        &self,
        image_ids: &[S],
    ) -> Result<Vec<RefUpdateData>> {
        let mut grouped: Vec<(String, Vec<&ImageNode>)> = Vec::new();
        for image_id in image_ids {
            let image = self.image(image_id.as_ref())?;
            match grouped.iter_mut().find(|(rid, _)| *rid == image.parent_id) {
                Some((_, images)) => images.push(image),
                None => grouped.push((image.parent_id.clone(), vec![image])),
            }
        }

        grouped
            .into_iter()
            .map(|(result_id, images)| {
                let result = self.result(&result_id)?;
                let browser = self.tree.browsers.get(&result.parent_id).ok_or_else(|| {
                    ReportError::BrowserNotFound {
                        id: result.parent_id.clone(),
                    }
                })?;
                let suite = self.tree.suites.get(&browser.parent_id).ok_or_else(|| {
                    ReportError::SuiteNotFound {
                        id: browser.parent_id.clone(),
                    }
                })?;

                let mut suite_path = suite.suite_path.clone();
                suite_path.pop();

                Ok(RefUpdateData {
                    suite_path,
                    test_name: suite.name.clone(),
                    browser_id: browser.name.clone(),
                    meta_info: result.meta_info.clone(),
                    images_info: images
                        .into_iter()
                        .map(|image| ImageInfo {
                            state_name: image.info.state_name.clone(),
                            status: TestStatus::Updated,
                            actual_img: image.info.actual_img.clone(),
                            ..ImageInfo::default()
                        })
                        .collect(),
                    attempt: result.attempt,
                })
            })
            .collect()
    }

    /// The given images, each tagged with its browser name.
    ///
    /// # Errors
    ///
    /// Returns a not-found error for any unknown image or a broken parent chain.
    pub fn get_image_data_to_find_equal_diffs<S: AsRef<str>>(
        &self,
        image_ids: &[S],
    ) -> Result<Vec<BrowserImage>> {
        image_ids
            .iter()
            .map(|image_id| {
                let image = self.image(image_id.as_ref())?;
                let result = self.result(&image.parent_id)?;
                let browser = self.tree.browsers.get(&result.parent_id).ok_or_else(|| {
                    ReportError::BrowserNotFound {
                        id: result.parent_id.clone(),
                    }
                })?;
                Ok(BrowserImage {
                    image: image.clone(),
                    browser_name: browser.name.clone(),
                })
            })
            .collect()
    }

    /// Replace an image payload, keeping its id and parent.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if the image does not exist.
    pub fn update_image_info(&mut self, image_id: &str, info: ImageInfo) -> Result<ImageNode> {
        self.tree.update_image_info(image_id, info).cloned()
    }

    /// Remove a result and its images.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the result does not exist.
    pub fn remove_test_result(&mut self, result_id: &str) -> Result<ResultNode> {
        let removed = self.tree.remove_result(result_id)?;
        debug!(result_id, "Removed test result");
        Ok(removed)
    }
}
