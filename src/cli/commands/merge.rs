//! Merge command implementation.
//!
//! Loads the tree of every source database in order, merges them, and
//! writes the merged rows and snapshot into the destination report.
//! Screenshot files are not moved; the renames they need are reported.

use crate::cli::MergeArgs;
use crate::config::{self, CliOverrides};
use crate::error::{ReportError, Result};
use crate::model::Tree;
use crate::storage::{ReportStorage, result_rows};
use crate::tree::{MergeReport, merge_trees};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Execute the merge command.
///
/// # Errors
///
/// Returns an error if a source is missing or the destination cannot be written.
pub fn execute(args: &MergeArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let overrides = CliOverrides {
        report_dir: Some(args.dest.clone()),
        ..cli.clone()
    };
    let config = config::load_config(&overrides)?;

    let mut sources = Vec::with_capacity(args.sources.len());
    for path in &args.sources {
        if let Some(tree) = load_source(path)? {
            sources.push(tree);
        }
    }

    let (merged, report) = merge_trees(&sources)?;

    fs::create_dir_all(&config.report_dir)?;
    let mut storage = ReportStorage::open(&config.db_path())?;
    storage.replace_result_rows(&result_rows(&merged))?;
    storage.save_tree(&merged)?;

    info!(
        sources = args.sources.len(),
        dest = %config.db_path().display(),
        "Merged reports"
    );
    print_report(&report, json)
}

/// Load one shard's tree; an empty or corrupted shard is skipped.
fn load_source(path: &Path) -> Result<Option<Tree>> {
    let storage = ReportStorage::open_existing(path)?;
    match storage.load_tree() {
        Ok(Some(tree)) => Ok(Some(tree)),
        Ok(None) => {
            warn!(path = %path.display(), "Source report is empty, skipping");
            Ok(None)
        }
        Err(ReportError::CorruptedTree { reason }) => {
            warn!(path = %path.display(), %reason, "Source report is corrupted, skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn print_report(report: &MergeReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!(
        "Merged {} source(s): {} result(s), {} collision(s)",
        report.sources,
        report.merged_results,
        report.collisions.len()
    );
    for collision in &report.collisions {
        println!(
            "  collision: {:?} {} (source {})",
            collision.kind, collision.id, collision.source_index
        );
    }
    for rename in &report.renamed_paths {
        println!("  move {} -> {}", rename.from, rename.to);
    }
    Ok(())
}
