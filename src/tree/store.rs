//! Tree store: insertion, lookup, ordering and removal over the four tables.
//!
//! All records are owned by the [`Tree`]; callers address them by id and
//! never keep references across mutations.

use crate::error::{ReportError, Result};
use crate::model::{
    BrowserNode, ImageInfo, ImageNode, ResultNode, SuiteNode, TestStatus, Tree,
    UNKNOWN_BROWSER_VERSION,
};
use crate::tree::status::aggregate_status;
use crate::util::id;
use std::collections::{BTreeSet, HashSet};

fn push_unique(ids: &mut Vec<String>, id: &str) -> bool {
    if ids.iter().any(|existing| existing == id) {
        false
    } else {
        ids.push(id.to_string());
        true
    }
}

impl Tree {
    /// Walk `path`, creating every missing suite, and return the leaf suite id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTestPath` if `path` is empty.
    pub fn upsert_suite_path<S: AsRef<str>>(&mut self, path: &[S]) -> Result<String> {
        if path.is_empty() {
            return Err(ReportError::InvalidTestPath {
                path: Vec::new(),
                browser: String::new(),
                attempt: None,
                reason: "cannot insert an empty suite path".to_string(),
            });
        }

        let segments: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        let mut parent_id: Option<String> = None;

        for depth in 0..segments.len() {
            let suite_path = &segments[..=depth];
            let suite_id = id::suite_id(suite_path);

            if !self.suites.contains(&suite_id) {
                let is_root = depth == 0;
                let suite = SuiteNode {
                    id: suite_id.clone(),
                    name: segments[depth].clone(),
                    parent_id: parent_id.clone(),
                    root: is_root,
                    suite_path: suite_path.to_vec(),
                    status: None,
                    suite_ids: Vec::new(),
                    browser_ids: Vec::new(),
                };
                self.suites.by_id.insert(suite_id.clone(), suite);
                self.suites.all_ids.push(suite_id.clone());
                if is_root {
                    self.suites.all_root_ids.push(suite_id.clone());
                }
            }

            if let Some(parent) = parent_id.as_deref().and_then(|p| self.suites.get_mut(p)) {
                push_unique(&mut parent.suite_ids, &suite_id);
            }

            parent_id = Some(suite_id);
        }

        // `segments` is non-empty, so the loop ran at least once.
        Ok(parent_id.unwrap_or_default())
    }

    /// Create or refresh the browser `browser_name` under `suite_id`.
    ///
    /// A known `version` replaces the stored one; `unknown` never does.
    ///
    /// # Errors
    ///
    /// Returns `SuiteNotFound` if the suite does not exist.
    pub fn upsert_browser(
        &mut self,
        suite_id: &str,
        browser_name: &str,
        version: &str,
    ) -> Result<String> {
        let browser_id = id::browser_id(suite_id, browser_name);
        let suite = self
            .suites
            .get_mut(suite_id)
            .ok_or_else(|| ReportError::SuiteNotFound {
                id: suite_id.to_string(),
            })?;
        push_unique(&mut suite.browser_ids, &browser_id);

        let known_version = version != UNKNOWN_BROWSER_VERSION && !version.is_empty();

        if let Some(browser) = self.browsers.get_mut(&browser_id) {
            if known_version {
                browser.version = version.to_string();
            }
        } else {
            let browser = BrowserNode {
                id: browser_id.clone(),
                name: browser_name.to_string(),
                parent_id: suite_id.to_string(),
                result_ids: Vec::new(),
                version: if known_version {
                    version.to_string()
                } else {
                    UNKNOWN_BROWSER_VERSION.to_string()
                },
            };
            self.browsers.insert(&browser_id, browser);
        }

        Ok(browser_id)
    }

    /// Insert `result` under its browser, or overwrite it in place.
    ///
    /// New ids are placed in `resultIds` by attempt. Images of an
    /// overwritten result that the new record no longer lists are dropped;
    /// listed ones stay where they are until `upsert_image` refreshes them.
    ///
    /// # Errors
    ///
    /// Returns `BrowserNotFound` if `result.parent_id` does not exist.
    pub fn upsert_result(&mut self, result: ResultNode) -> Result<String> {
        let result_id = result.id.clone();
        let attempt = result.attempt;

        if !self.browsers.contains(&result.parent_id) {
            return Err(ReportError::BrowserNotFound {
                id: result.parent_id,
            });
        }

        let stale_images: Vec<String> = self
            .results
            .get(&result_id)
            .map(|old| {
                old.image_ids
                    .iter()
                    .filter(|image_id| !result.image_ids.contains(image_id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for image_id in &stale_images {
            self.images.remove(image_id);
        }

        let browser_id = result.parent_id.clone();
        self.results.insert(&result_id, result);

        let attempts: Vec<u32> = self
            .browsers
            .get(&browser_id)
            .map(|browser| {
                browser
                    .result_ids
                    .iter()
                    .map(|rid| self.results.get(rid).map_or(0, |r| r.attempt))
                    .collect()
            })
            .unwrap_or_default();

        if let Some(browser) = self.browsers.get_mut(&browser_id) {
            if !browser.result_ids.contains(&result_id) {
                let position = attempts
                    .iter()
                    .position(|existing| *existing > attempt)
                    .unwrap_or(browser.result_ids.len());
                browser.result_ids.insert(position, result_id.clone());
            }
        }

        Ok(result_id)
    }

    /// Insert or overwrite the image `key` of `result_id`.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the result does not exist.
    pub fn upsert_image(&mut self, result_id: &str, key: &str, info: ImageInfo) -> Result<String> {
        let image_id = id::image_id(result_id, key);
        let result = self
            .results
            .get_mut(result_id)
            .ok_or_else(|| ReportError::ResultNotFound {
                id: result_id.to_string(),
            })?;
        push_unique(&mut result.image_ids, &image_id);

        self.images.insert(
            &image_id,
            ImageNode {
                id: image_id.clone(),
                parent_id: result_id.to_string(),
                info,
            },
        );

        Ok(image_id)
    }

    /// Sort root ids and every suite's `suiteIds` / `browserIds` by name.
    ///
    /// Idempotent; ids are only reordered, never added or removed.
    pub fn sort_tree(&mut self) {
        let mut roots = std::mem::take(&mut self.suites.all_root_ids);
        self.sort_suite_ids(&mut roots);
        self.suites.all_root_ids = roots;

        let suite_ids: Vec<String> = self.suites.all_ids.clone();
        for suite_id in &suite_ids {
            let Some(suite) = self.suites.get_mut(suite_id) else {
                continue;
            };
            let mut child_suites = std::mem::take(&mut suite.suite_ids);
            let mut child_browsers = std::mem::take(&mut suite.browser_ids);

            self.sort_suite_ids(&mut child_suites);
            child_browsers.sort_by(|a, b| {
                let name_a = self.browsers.get(a).map_or("", |br| br.name.as_str());
                let name_b = self.browsers.get(b).map_or("", |br| br.name.as_str());
                name_a.cmp(name_b).then_with(|| a.cmp(b))
            });

            if let Some(suite) = self.suites.get_mut(suite_id) {
                suite.suite_ids = child_suites;
                suite.browser_ids = child_browsers;
            }
        }
    }

    fn sort_suite_ids(&self, ids: &mut [String]) {
        ids.sort_by(|a, b| {
            let name_a = self.suites.get(a).map_or("", |s| s.name.as_str());
            let name_b = self.suites.get(b).map_or("", |s| s.name.as_str());
            name_a.cmp(name_b).then_with(|| a.cmp(b))
        });
    }

    /// The result with the highest attempt for a browser.
    #[must_use]
    pub fn latest_result(&self, browser_id: &str) -> Option<&ResultNode> {
        self.browsers
            .get(browser_id)
            .and_then(|browser| browser.result_ids.last())
            .and_then(|result_id| self.results.get(result_id))
    }

    /// Statuses a suite aggregates over, in traversal order: the latest
    /// result of each direct browser, then each child suite.
    #[must_use]
    pub fn suite_child_statuses(&self, suite: &SuiteNode) -> Vec<TestStatus> {
        let browser_statuses = suite
            .browser_ids
            .iter()
            .filter_map(|browser_id| self.latest_result(browser_id))
            .map(|result| result.status);
        let suite_statuses = suite
            .suite_ids
            .iter()
            .filter_map(|suite_id| self.suites.get(suite_id))
            .filter_map(|child| child.status);

        browser_statuses.chain(suite_statuses).collect()
    }

    fn recompute_suite(&mut self, suite_id: &str) {
        let status = match self.suites.get(suite_id) {
            Some(suite) => aggregate_status(self.suite_child_statuses(suite)),
            None => return,
        };
        if let Some(suite) = self.suites.get_mut(suite_id) {
            suite.status = status;
        }
    }

    /// Re-aggregate `suite_id` and every ancestor up to the root.
    pub fn recompute_branch(&mut self, suite_id: &str) {
        let mut current = Some(suite_id.to_string());
        while let Some(id) = current {
            self.recompute_suite(&id);
            current = self.suites.get(&id).and_then(|s| s.parent_id.clone());
        }
    }

    /// Re-aggregate the given suites and all their ancestors, deepest first,
    /// each suite exactly once.
    pub fn recompute_suites<I, S>(&mut self, suite_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut affected: HashSet<String> = HashSet::new();
        for suite_id in suite_ids {
            let mut current = Some(suite_id.as_ref().to_string());
            while let Some(id) = current {
                if !affected.insert(id.clone()) {
                    break;
                }
                current = self.suites.get(&id).and_then(|s| s.parent_id.clone());
            }
        }

        let mut ordered: Vec<(usize, String)> = affected
            .into_iter()
            .filter_map(|id| self.suites.get(&id).map(|s| (s.suite_path.len(), id)))
            .collect();
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        for (_, id) in ordered {
            self.recompute_suite(&id);
        }
    }

    /// Re-aggregate every suite in the tree.
    pub fn recompute_all(&mut self) {
        let ids = self.suites.all_ids.clone();
        self.recompute_suites(ids);
    }

    /// Root-first chain of suites from the root to `suite_id`.
    #[must_use]
    pub fn suite_chain(&self, suite_id: &str) -> Vec<&SuiteNode> {
        let mut chain = Vec::new();
        let mut current = self.suites.get(suite_id);
        while let Some(suite) = current {
            chain.push(suite);
            current = suite.parent_id.as_deref().and_then(|p| self.suites.get(p));
        }
        chain.reverse();
        chain
    }

    /// Remove an image and detach it from its result.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if the image does not exist.
    pub fn remove_image(&mut self, image_id: &str) -> Result<ImageNode> {
        let image = self
            .images
            .remove(image_id)
            .ok_or_else(|| ReportError::ImageNotFound {
                id: image_id.to_string(),
            })?;
        if let Some(result) = self.results.get_mut(&image.parent_id) {
            result.image_ids.retain(|id| id != image_id);
        }
        Ok(image)
    }

    /// Remove a result with its images, detach it from its browser and
    /// re-aggregate the owning suite branch.
    ///
    /// # Errors
    ///
    /// Returns `ResultNotFound` if the result does not exist.
    pub fn remove_result(&mut self, result_id: &str) -> Result<ResultNode> {
        let result = self
            .results
            .remove(result_id)
            .ok_or_else(|| ReportError::ResultNotFound {
                id: result_id.to_string(),
            })?;

        for image_id in &result.image_ids {
            self.images.remove(image_id);
        }

        let suite_id = self.browsers.get_mut(&result.parent_id).map(|browser| {
            browser.result_ids.retain(|id| id != result_id);
            browser.parent_id.clone()
        });
        if let Some(suite_id) = suite_id {
            self.recompute_branch(&suite_id);
        }

        Ok(result)
    }

    /// Replace the payload of an image, keeping its id and parent.
    ///
    /// # Errors
    ///
    /// Returns `ImageNotFound` if the image does not exist.
    pub fn update_image_info(&mut self, image_id: &str, info: ImageInfo) -> Result<&ImageNode> {
        let image = self
            .images
            .get_mut(image_id)
            .ok_or_else(|| ReportError::ImageNotFound {
                id: image_id.to_string(),
            })?;
        image.info = info;
        Ok(image)
    }

    /// Verify referential integrity: every child id exists, no child list
    /// holds duplicates, and every `allIds` entry has a record.
    ///
    /// # Errors
    ///
    /// Returns `CorruptedTree` describing the first violation found.
    pub fn check_integrity(&self) -> Result<()> {
        fn unique(ids: &[String], owner: &str, field: &str) -> Result<()> {
            let mut seen = BTreeSet::new();
            for id in ids {
                if !seen.insert(id) {
                    return Err(ReportError::corrupted(format!(
                        "{owner}: duplicate id '{id}' in {field}"
                    )));
                }
            }
            Ok(())
        }

        let dangling = |owner: &str, field: &str, id: &str| {
            ReportError::corrupted(format!("{owner}: {field} references missing '{id}'"))
        };

        for suite in self.suites.by_id.values() {
            unique(&suite.suite_ids, &suite.id, "suiteIds")?;
            unique(&suite.browser_ids, &suite.id, "browserIds")?;
            if let Some(missing) = suite.suite_ids.iter().find(|id| !self.suites.contains(id)) {
                return Err(dangling(&suite.id, "suiteIds", missing));
            }
            if let Some(missing) = suite
                .browser_ids
                .iter()
                .find(|id| !self.browsers.contains(id))
            {
                return Err(dangling(&suite.id, "browserIds", missing));
            }
        }
        for browser in self.browsers.by_id.values() {
            unique(&browser.result_ids, &browser.id, "resultIds")?;
            if let Some(missing) = browser
                .result_ids
                .iter()
                .find(|id| !self.results.contains(id))
            {
                return Err(dangling(&browser.id, "resultIds", missing));
            }
        }
        for result in self.results.by_id.values() {
            unique(&result.image_ids, &result.id, "imageIds")?;
            if let Some(missing) = result.image_ids.iter().find(|id| !self.images.contains(id)) {
                return Err(dangling(&result.id, "imageIds", missing));
            }
        }

        let index_checks = [
            ("suites", self.suites.all_ids.len(), self.suites.by_id.len()),
            ("browsers", self.browsers.all_ids.len(), self.browsers.len()),
            ("results", self.results.all_ids.len(), self.results.len()),
            ("images", self.images.all_ids.len(), self.images.len()),
        ];
        for (table, indexed, stored) in index_checks {
            if indexed != stored {
                return Err(ReportError::corrupted(format!(
                    "{table}: allIds has {indexed} entries for {stored} records"
                )));
            }
        }
        if let Some(missing) = self
            .suites
            .all_root_ids
            .iter()
            .find(|id| !self.suites.contains(id))
        {
            return Err(dangling("suites", "allRootIds", missing));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn result_node(browser_id: &str, attempt: u32, status: TestStatus) -> ResultNode {
        ResultNode {
            id: id::result_id(browser_id, attempt),
            parent_id: browser_id.to_string(),
            image_ids: Vec::new(),
            attempt,
            status,
            meta_info: Map::new(),
            timestamp: 0,
            error: None,
            skip_reason: None,
            description: None,
            suite_url: None,
            multiple_tabs: false,
            screenshot: false,
            history: Vec::new(),
        }
    }

    #[test]
    fn test_upsert_suite_path_creates_ancestors() {
        let mut tree = Tree::new();
        let leaf = tree.upsert_suite_path(&["s1", "s2", "s3"]).unwrap();

        assert_eq!(leaf, "s1 s2 s3");
        assert_eq!(tree.suites.all_root_ids, vec!["s1"]);
        assert_eq!(tree.suites.get("s1").unwrap().suite_ids, vec!["s1 s2"]);
        assert_eq!(tree.suites.get("s1 s2").unwrap().suite_ids, vec!["s1 s2 s3"]);
        let leaf_suite = tree.suites.get("s1 s2 s3").unwrap();
        assert_eq!(leaf_suite.parent_id.as_deref(), Some("s1 s2"));
        assert!(!leaf_suite.root);
        assert_eq!(leaf_suite.suite_path, vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_upsert_suite_path_is_idempotent() {
        let mut tree = Tree::new();
        tree.upsert_suite_path(&["s1", "s2"]).unwrap();
        tree.upsert_suite_path(&["s1", "s2"]).unwrap();

        assert_eq!(tree.suites.len(), 2);
        assert_eq!(tree.suites.all_ids.len(), 2);
        assert_eq!(tree.suites.get("s1").unwrap().suite_ids, vec!["s1 s2"]);
    }

    #[test]
    fn test_upsert_suite_path_rejects_empty() {
        let mut tree = Tree::new();
        let err = tree.upsert_suite_path::<&str>(&[]).unwrap_err();
        assert!(matches!(err, ReportError::InvalidTestPath { .. }));
    }

    #[test]
    fn test_upsert_browser_keeps_known_version() {
        let mut tree = Tree::new();
        let suite_id = tree.upsert_suite_path(&["s1"]).unwrap();

        let bro = tree.upsert_browser(&suite_id, "chrome", "120").unwrap();
        tree.upsert_browser(&suite_id, "chrome", UNKNOWN_BROWSER_VERSION)
            .unwrap();
        assert_eq!(tree.browsers.get(&bro).unwrap().version, "120");

        tree.upsert_browser(&suite_id, "chrome", "121").unwrap();
        assert_eq!(tree.browsers.get(&bro).unwrap().version, "121");
        assert_eq!(tree.suites.get("s1").unwrap().browser_ids, vec!["s1 chrome"]);
    }

    #[test]
    fn test_upsert_browser_requires_suite() {
        let mut tree = Tree::new();
        let err = tree.upsert_browser("nope", "chrome", "1").unwrap_err();
        assert!(matches!(err, ReportError::SuiteNotFound { .. }));
    }

    #[test]
    fn test_upsert_result_orders_by_attempt() {
        let mut tree = Tree::new();
        let suite_id = tree.upsert_suite_path(&["s1"]).unwrap();
        let bro = tree.upsert_browser(&suite_id, "chrome", "1").unwrap();

        tree.upsert_result(result_node(&bro, 2, TestStatus::Fail)).unwrap();
        tree.upsert_result(result_node(&bro, 0, TestStatus::Fail)).unwrap();
        tree.upsert_result(result_node(&bro, 1, TestStatus::Fail)).unwrap();
        tree.upsert_result(result_node(&bro, 1, TestStatus::Success)).unwrap();

        let browser = tree.browsers.get(&bro).unwrap();
        assert_eq!(
            browser.result_ids,
            vec!["s1 chrome 0", "s1 chrome 1", "s1 chrome 2"]
        );
        assert_eq!(
            tree.results.get("s1 chrome 1").unwrap().status,
            TestStatus::Success
        );
        assert_eq!(tree.results.all_ids.len(), 3);
    }

    #[test]
    fn test_overwriting_result_drops_unlisted_images() {
        let mut tree = Tree::new();
        let suite_id = tree.upsert_suite_path(&["s1"]).unwrap();
        let bro = tree.upsert_browser(&suite_id, "chrome", "1").unwrap();
        let rid = tree.upsert_result(result_node(&bro, 0, TestStatus::Fail)).unwrap();
        tree.upsert_image(&rid, "a", ImageInfo::with_state("a", TestStatus::Fail))
            .unwrap();
        tree.upsert_image(&rid, "b", ImageInfo::with_state("b", TestStatus::Fail))
            .unwrap();

        let mut replacement = result_node(&bro, 0, TestStatus::Success);
        replacement.image_ids = vec![id::image_id(&rid, "a")];
        tree.upsert_result(replacement).unwrap();

        assert!(tree.images.contains("s1 chrome 0 a"));
        assert!(!tree.images.contains("s1 chrome 0 b"));
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_sort_tree_is_idempotent() {
        let mut tree = Tree::new();
        for path in [["b", "y"], ["a", "z"], ["b", "x"]] {
            let suite_id = tree.upsert_suite_path(&path).unwrap();
            tree.upsert_browser(&suite_id, "firefox", "1").unwrap();
            tree.upsert_browser(&suite_id, "chrome", "1").unwrap();
        }

        tree.sort_tree();
        let once = tree.clone();
        tree.sort_tree();

        assert_eq!(tree, once);
        assert_eq!(tree.suites.all_root_ids, vec!["a", "b"]);
        assert_eq!(tree.suites.get("b").unwrap().suite_ids, vec!["b x", "b y"]);
        assert_eq!(
            tree.suites.get("b x").unwrap().browser_ids,
            vec!["b x chrome", "b x firefox"]
        );
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_remove_result_updates_browser_and_status() {
        let mut tree = Tree::new();
        let suite_id = tree.upsert_suite_path(&["s1"]).unwrap();
        let bro = tree.upsert_browser(&suite_id, "chrome", "1").unwrap();
        tree.upsert_result(result_node(&bro, 0, TestStatus::Fail)).unwrap();
        let rid = tree
            .upsert_result(result_node(&bro, 1, TestStatus::Success))
            .unwrap();
        tree.upsert_image(&rid, "a", ImageInfo::with_state("a", TestStatus::Updated))
            .unwrap();
        tree.recompute_branch(&suite_id);
        assert_eq!(
            tree.suites.get("s1").unwrap().status,
            Some(TestStatus::Success)
        );

        tree.remove_result(&rid).unwrap();

        assert_eq!(tree.browsers.get(&bro).unwrap().result_ids, vec!["s1 chrome 0"]);
        assert!(tree.images.is_empty());
        assert_eq!(tree.suites.get("s1").unwrap().status, Some(TestStatus::Fail));
        tree.check_integrity().unwrap();
    }

    #[test]
    fn test_remove_image_detaches_from_result() {
        let mut tree = Tree::new();
        let suite_id = tree.upsert_suite_path(&["s1"]).unwrap();
        let bro = tree.upsert_browser(&suite_id, "chrome", "1").unwrap();
        let rid = tree.upsert_result(result_node(&bro, 0, TestStatus::Fail)).unwrap();
        let image_id = tree
            .upsert_image(&rid, "a", ImageInfo::with_state("a", TestStatus::Fail))
            .unwrap();

        let removed = tree.remove_image(&image_id).unwrap();
        assert_eq!(removed.parent_id, rid);
        assert!(tree.results.get(&rid).unwrap().image_ids.is_empty());
        assert!(matches!(
            tree.remove_image(&image_id),
            Err(ReportError::ImageNotFound { .. })
        ));
    }

    #[test]
    fn test_check_integrity_detects_dangling_child() {
        let mut tree = Tree::new();
        tree.upsert_suite_path(&["s1"]).unwrap();
        tree.suites
            .get_mut("s1")
            .unwrap()
            .browser_ids
            .push("s1 ghost".to_string());

        let err = tree.check_integrity().unwrap_err();
        assert!(err.to_string().contains("s1 ghost"));
    }

    #[test]
    fn test_suite_chain_is_root_first() {
        let mut tree = Tree::new();
        tree.upsert_suite_path(&["a", "b", "c"]).unwrap();
        let chain: Vec<&str> = tree
            .suite_chain("a b c")
            .iter()
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(chain, vec!["a", "a b", "a b c"]);
    }
}
