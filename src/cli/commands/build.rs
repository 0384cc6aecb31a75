//! Build command implementation.
//!
//! Reads formatted results (JSON lines), folds them into a tree, optionally
//! overlays the tree persisted by the previous build, and writes both the
//! result rows and the tree snapshot.
//!
//! With reuse, browsers known to the previous build keep their history and
//! the new results are appended to it as further attempts.

use crate::cli::BuildArgs;
use crate::config::{self, CliOverrides};
use crate::error::{ReportError, Result};
use crate::model::{FormattedResult, Tree};
use crate::storage::{ReportStorage, ResultRow};
use crate::tree::{BuilderOptions, TestsTreeBuilder};
use crate::util::id;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};

/// Summary printed after a build.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub results: usize,
    pub reused_browsers: usize,
    pub suites: usize,
    pub browsers: usize,
    pub db_path: String,
}

/// Execute the build command.
///
/// # Errors
///
/// Returns an error if the input cannot be read or parsed, a result is
/// malformed, or the database cannot be written.
pub fn execute(args: &BuildArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let overrides = CliOverrides {
        reuse: args.no_reuse.then_some(false).or(cli.reuse),
        sort_on_insert: args.sort_on_insert.then_some(true).or(cli.sort_on_insert),
        ..cli.clone()
    };
    let config = config::load_config(&overrides)?;

    let results = read_results(&args.input)?;
    fs::create_dir_all(&config.report_dir)?;
    let db_path = config.db_path();
    let mut storage = ReportStorage::open(&db_path)?;

    let previous = if config.reuse {
        match storage.load_tree() {
            Ok(tree) => tree,
            Err(ReportError::CorruptedTree { reason }) => {
                warn!(%reason, "Persisted tree is corrupted, starting fresh");
                None
            }
            Err(e) => return Err(e),
        }
    } else {
        None
    };

    let options = BuilderOptions {
        sort_on_insert: config.sort_on_insert,
    };
    let (builder, reused_browsers) =
        build_tree(&results, config.reuse, previous.as_ref(), options)?;
    let tree = builder.into_tree();

    let rows: Vec<ResultRow> = results.iter().map(ResultRow::from_formatted).collect();
    if config.reuse {
        storage.insert_result_rows(&rows)?;
    } else {
        storage.replace_result_rows(&rows)?;
    }
    storage.save_tree(&tree)?;

    let summary = BuildSummary {
        results: results.len(),
        reused_browsers,
        suites: tree.suites.len(),
        browsers: tree.browsers.len(),
        db_path: db_path.display().to_string(),
    };
    info!(
        results = summary.results,
        reused = summary.reused_browsers,
        "Built report tree"
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Built {} result(s) into {} ({} suite(s), {} browser(s), {} reused)",
            summary.results, summary.db_path, summary.suites, summary.browsers, summary.reused_browsers
        );
    }

    Ok(())
}

/// Fold `results` into a tree.
///
/// With `reuse` set, `previous` (if any) is overlaid and results of
/// reused browsers are appended after their previous attempts. Returns the
/// builder and the number of reused browsers.
///
/// # Errors
///
/// Returns the builder's invalid-input error for the first malformed result,
/// or `AttemptOverflow` when a reused history has no attempt number left.
pub fn build_tree(
    results: &[FormattedResult],
    reuse: bool,
    previous: Option<&Tree>,
    options: BuilderOptions,
) -> Result<(TestsTreeBuilder, usize)> {
    let mut builder = TestsTreeBuilder::new(options);
    for result in results {
        builder.add_test_result(result)?;
    }
    if !reuse {
        builder.sort_tree();
        return Ok((builder, 0));
    }

    let report = builder.reuse_tests_tree(previous);
    let reused: HashSet<&str> = report.browser_ids.iter().map(String::as_str).collect();
    for result in results {
        let browser_id = id::browser_id(
            &id::suite_id(result.test_path.as_slice()),
            &result.browser_id,
        );
        if !reused.contains(browser_id.as_str()) {
            continue;
        }
        let last = builder.get_last_result(result.test_path.as_slice(), &result.browser_id);
        let attempt = match last {
            Some(last) => id::next_attempt(&browser_id, last.attempt)?,
            None => 0,
        };
        let appended = FormattedResult {
            attempt: Some(attempt),
            ..result.clone()
        };
        let result_id = builder.add_test_result(&appended)?;
        debug!(result_id = %result_id, "Appended result to reused history");
    }

    builder.sort_tree();
    Ok((builder, report.reused_browsers))
}

/// Read JSON-lines formatted results; blank lines are skipped.
///
/// Results without a timestamp are stamped with the current time.
///
/// # Errors
///
/// Returns an error if the input cannot be read or a line is not a result.
pub fn read_results(input: &Path) -> Result<Vec<FormattedResult>> {
    let reader: Box<dyn BufRead> = if input == Path::new("-") {
        Box::new(BufReader::new(io::stdin()))
    } else {
        Box::new(BufReader::new(File::open(input)?))
    };
    parse_results(reader, Utc::now().timestamp_millis())
}

fn parse_results<R: BufRead>(reader: R, now_millis: i64) -> Result<Vec<FormattedResult>> {
    let mut results = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let mut result: FormattedResult = serde_json::from_str(trimmed).map_err(|e| {
            ReportError::Other(anyhow::anyhow!("input line {}: {e}", index + 1))
        })?;
        result.timestamp.get_or_insert(now_millis);
        results.push(result);
    }
    debug!(count = results.len(), "Read formatted results");
    Ok(results)
}
