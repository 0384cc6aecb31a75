//! Reuse of a previously persisted tree.
//!
//! Browsers present in both trees take the previous browser record with
//! its whole result and image subtree. Matching is by exact browser id.
//! Browsers only in the previous tree are dropped; browsers only in the
//! fresh tree stay as built.

use crate::model::{ImageNode, ResultNode, Tree};
use tracing::{debug, info, warn};

/// What a reuse pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReuseReport {
    /// Ids of the browsers that took their previous subtree.
    pub browser_ids: Vec<String>,
    pub reused_browsers: usize,
    pub reused_results: usize,
    pub reused_images: usize,
    /// Browsers whose previous subtree was inconsistent and left fresh.
    pub skipped_browsers: usize,
}

impl ReuseReport {
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.reused_browsers == 0
    }
}

struct Subtree<'a> {
    results: Vec<&'a ResultNode>,
    images: Vec<&'a ImageNode>,
}

/// Collect a browser's subtree, or `None` when any reference dangles or
/// points at a different parent.
fn collect_subtree<'a>(previous: &'a Tree, browser_id: &str) -> Option<Subtree<'a>> {
    let browser = previous.browsers.get(browser_id)?;
    let mut subtree = Subtree {
        results: Vec::with_capacity(browser.result_ids.len()),
        images: Vec::new(),
    };

    for result_id in &browser.result_ids {
        let result = previous.results.get(result_id)?;
        if result.parent_id != browser_id {
            return None;
        }
        for image_id in &result.image_ids {
            let image = previous.images.get(image_id)?;
            if image.parent_id != *result_id {
                return None;
            }
            subtree.images.push(image);
        }
        subtree.results.push(result);
    }

    Some(subtree)
}

/// Overlay `previous` onto `fresh` and re-aggregate touched suites.
///
/// An absent or empty `previous` leaves `fresh` unchanged.
pub fn reuse_tests_tree(fresh: &mut Tree, previous: Option<&Tree>) -> ReuseReport {
    let mut report = ReuseReport::default();

    let Some(previous) = previous.filter(|tree| !tree.is_empty()) else {
        warn!("Nothing to reuse: no previous report tree");
        return report;
    };

    let mut touched_suites = Vec::new();
    let browser_ids = fresh.browsers.all_ids.clone();

    for browser_id in &browser_ids {
        let Some(old_browser) = previous.browsers.get(browser_id) else {
            continue;
        };
        let fresh_parent = fresh
            .browsers
            .get(browser_id)
            .map(|browser| browser.parent_id.clone())
            .unwrap_or_default();

        let subtree = match collect_subtree(previous, browser_id) {
            Some(subtree) if old_browser.parent_id == fresh_parent => subtree,
            _ => {
                warn!(
                    browser_id = %browser_id,
                    "Previous browser subtree is inconsistent, keeping fresh data"
                );
                report.skipped_browsers += 1;
                continue;
            }
        };

        let fresh_result_ids = fresh
            .browsers
            .get(browser_id)
            .map(|browser| browser.result_ids.clone())
            .unwrap_or_default();
        for result_id in &fresh_result_ids {
            if let Some(result) = fresh.results.remove(result_id) {
                for image_id in &result.image_ids {
                    fresh.images.remove(image_id);
                }
            }
        }

        for result in &subtree.results {
            fresh.results.insert(&result.id, (*result).clone());
        }
        for image in &subtree.images {
            fresh.images.insert(&image.id, (*image).clone());
        }
        fresh.browsers.insert(browser_id, old_browser.clone());

        debug!(
            browser_id = %browser_id,
            results = subtree.results.len(),
            images = subtree.images.len(),
            "Reused browser"
        );

        report.browser_ids.push(browser_id.clone());
        report.reused_browsers += 1;
        report.reused_results += subtree.results.len();
        report.reused_images += subtree.images.len();
        touched_suites.push(fresh_parent);
    }

    fresh.recompute_suites(&touched_suites);

    info!(
        browsers = report.reused_browsers,
        results = report.reused_results,
        images = report.reused_images,
        skipped = report.skipped_browsers,
        "Reused previous report tree"
    );

    report
}
