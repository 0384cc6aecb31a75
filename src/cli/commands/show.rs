//! Show command implementation.

use crate::cli::ShowArgs;
use crate::cli::commands::open_report;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::model::{SuiteNode, TestStatus, Tree};
use crate::tree::{BuilderOptions, TestBranch, TestsTreeBuilder};
use std::fmt::Write as _;
use tracing::debug;

/// Execute the show command.
///
/// # Errors
///
/// Returns an error if the report cannot be opened or loaded, or the
/// requested result does not exist.
pub fn execute(args: &ShowArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let (_, storage) = open_report(cli)?;
    let tree = storage.load_tree()?.unwrap_or_default();
    debug!(results = tree.results.len(), "Loaded tree for show");

    if let Some(result_id) = &args.result {
        let builder = TestsTreeBuilder::from_tree(tree, BuilderOptions::default());
        let branch = builder.get_test_branch(result_id)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&branch)?);
        } else {
            print!("{}", render_branch(&branch));
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else if tree.is_empty() {
        println!("Report is empty.");
    } else {
        print!("{}", render_tree(&tree));
    }
    Ok(())
}

fn status_label(status: Option<TestStatus>) -> &'static str {
    status.map_or("-", |status| status.as_str())
}

/// Indented text rendering, roots in display order.
#[must_use]
pub fn render_tree(tree: &Tree) -> String {
    let mut out = String::new();
    for root_id in &tree.suites.all_root_ids {
        if let Some(suite) = tree.suites.get(root_id) {
            render_suite(tree, suite, 0, &mut out);
        }
    }
    out
}

fn render_suite(tree: &Tree, suite: &SuiteNode, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    let _ = writeln!(out, "{indent}{} [{}]", suite.name, status_label(suite.status));

    for child_id in &suite.suite_ids {
        if let Some(child) = tree.suites.get(child_id) {
            render_suite(tree, child, depth + 1, out);
        }
    }
    for browser_id in &suite.browser_ids {
        let Some(browser) = tree.browsers.get(browser_id) else {
            continue;
        };
        let statuses: Vec<&str> = browser
            .result_ids
            .iter()
            .filter_map(|id| tree.results.get(id))
            .map(|result| result.status.as_str())
            .collect();
        let _ = writeln!(
            out,
            "{indent}  {} ({}): {}",
            browser.name,
            browser.version,
            statuses.join(" -> ")
        );
    }
}

fn render_branch(branch: &TestBranch) -> String {
    let mut out = String::new();
    for (depth, suite) in branch.suites.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}{} [{}]",
            "  ".repeat(depth),
            suite.id,
            status_label(suite.status)
        );
    }
    let _ = writeln!(
        out,
        "result {} attempt {} [{}]",
        branch.result.id, branch.result.attempt, branch.result.status
    );
    for image in &branch.images {
        let _ = writeln!(
            out,
            "  {} [{}]",
            image.info.state_name.as_deref().unwrap_or(&image.id),
            image.info.status
        );
    }
    out
}
