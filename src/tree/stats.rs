//! Building a report from persisted result rows.
//!
//! Rows are replayed in storage order; each row becomes the next attempt of
//! its browser. Alongside the tree this computes the report statistics, the
//! list of skipped tests and the browser versions seen.

use crate::error::Result;
use crate::model::{TestStatus, Tree, browser_version_of};
use crate::storage::rows::ResultRow;
use crate::tree::builder::{BuilderOptions, TestsTreeBuilder};
use crate::util::id;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Counters for one scope (whole report, or one browser version).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retries: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStats {
    #[serde(flatten)]
    pub totals: Stats,
    /// Browser name -> browser version -> counters.
    pub per_browser: BTreeMap<String, BTreeMap<String, Stats>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipItem {
    pub browser: String,
    pub suite: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowserItem {
    pub id: String,
    pub versions: Vec<String>,
}

/// Everything built from a set of rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaticReport {
    pub tree: Tree,
    pub stats: ReportStats,
    pub skips: Vec<SkipItem>,
    pub browsers: Vec<BrowserItem>,
}

#[derive(Debug)]
pub struct StaticTreeBuilder {
    builder: TestsTreeBuilder,
    stats: ReportStats,
    skips: Vec<SkipItem>,
    failed: HashSet<String>,
    passed: HashSet<String>,
    skipped: HashSet<String>,
}

impl Default for StaticTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticTreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            builder: TestsTreeBuilder::new(BuilderOptions::default()),
            stats: ReportStats::default(),
            skips: Vec::new(),
            failed: HashSet::new(),
            passed: HashSet::new(),
            skipped: HashSet::new(),
        }
    }

    /// Replay `rows` and return the sorted tree with its statistics.
    ///
    /// # Errors
    ///
    /// Returns the builder's invalid-input errors for a malformed row, or
    /// `AttemptOverflow` when one browser has more rows than attempt numbers.
    pub fn build<I>(mut self, rows: I) -> Result<StaticReport>
    where
        I: IntoIterator<Item = ResultRow>,
    {
        let mut attempts: HashMap<String, u32> = HashMap::new();
        let mut browsers: Vec<BrowserItem> = Vec::new();
        let mut row_count = 0usize;

        for row in rows {
            let test_id = id::suite_id(row.suite_path.as_slice());
            let browser_id = id::browser_id(&test_id, &row.name);

            let attempt = match attempts.get(&browser_id) {
                Some(last) => id::next_attempt(&browser_id, *last)?,
                None => 0,
            };
            attempts.insert(browser_id, attempt);

            let version = browser_version_of(&row.meta_info).to_string();
            match browsers.iter_mut().find(|item| item.id == row.name) {
                Some(item) if !item.versions.contains(&version) => {
                    item.versions.push(version.clone());
                }
                Some(_) => {}
                None => browsers.push(BrowserItem {
                    id: row.name.clone(),
                    versions: vec![version.clone()],
                }),
            }

            let status = row.status;
            let skip_reason = row.skip_reason.clone();
            let browser_name = row.name.clone();
            self.builder.add_test_result(&row.into_formatted(attempt))?;
            self.calc_stats(&test_id, &browser_name, &version, status, skip_reason);
            row_count += 1;
        }

        self.builder.sort_tree();
        debug!(rows = row_count, "Built report from rows");

        Ok(StaticReport {
            tree: self.builder.into_tree(),
            stats: self.stats,
            skips: self.skips,
            browsers,
        })
    }

    fn bump(&mut self, browser: &str, version: &str, update: impl Fn(&mut Stats)) {
        update(&mut self.stats.totals);
        let scoped = self
            .stats
            .per_browser
            .entry(browser.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default();
        update(scoped);
    }

    fn calc_stats(
        &mut self,
        test_id: &str,
        browser: &str,
        version: &str,
        status: TestStatus,
        skip_reason: Option<String>,
    ) {
        let key = id::browser_id(test_id, browser);
        self.stats
            .per_browser
            .entry(browser.to_string())
            .or_default()
            .entry(version.to_string())
            .or_default();

        match status {
            TestStatus::Fail | TestStatus::Error => {
                if self.failed.contains(&key) {
                    self.bump(browser, version, |s| s.retries += 1);
                    return;
                }
                self.failed.insert(key);
                self.bump(browser, version, |s| {
                    s.failed += 1;
                    s.total += 1;
                });
            }
            TestStatus::Success => {
                if self.passed.contains(&key) {
                    self.bump(browser, version, |s| s.retries += 1);
                    return;
                }
                if self.failed.remove(&key) {
                    self.bump(browser, version, |s| {
                        s.failed = s.failed.saturating_sub(1);
                        s.passed += 1;
                        s.retries += 1;
                    });
                    return;
                }
                self.passed.insert(key);
                self.bump(browser, version, |s| {
                    s.passed += 1;
                    s.total += 1;
                });
            }
            TestStatus::Skipped => {
                if self.skipped.contains(&key) {
                    self.bump(browser, version, |s| s.retries += 1);
                    return;
                }
                self.skipped.insert(key.clone());
                self.skips.push(SkipItem {
                    browser: browser.to_string(),
                    suite: test_id.to_string(),
                    comment: skip_reason,
                });
                self.bump(browser, version, |s| s.skipped += 1);

                if self.failed.remove(&key) {
                    self.bump(browser, version, |s| s.failed = s.failed.saturating_sub(1));
                } else {
                    self.bump(browser, version, |s| s.total += 1);
                }
            }
            _ => {}
        }
    }
}
