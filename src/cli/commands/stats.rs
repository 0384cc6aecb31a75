//! Stats command implementation.
//!
//! Replays the stored result rows and prints pass/fail/skip counters,
//! retries, the skipped tests and the browser versions seen.

use crate::cli::StatsArgs;
use crate::cli::commands::open_report;
use crate::config::CliOverrides;
use crate::error::Result;
use crate::tree::{BrowserItem, ReportStats, SkipItem, Stats};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::info;

#[derive(Debug, Serialize)]
struct StatsOutput<'a> {
    stats: &'a ReportStats,
    skips: &'a [SkipItem],
    browsers: &'a [BrowserItem],
}

/// Execute the stats command.
///
/// # Errors
///
/// Returns an error if the report cannot be opened or a row cannot be decoded.
pub fn execute(args: &StatsArgs, json: bool, cli: &CliOverrides) -> Result<()> {
    let (_, storage) = open_report(cli)?;

    info!("Computing report statistics");
    let report = storage.load_static_report()?;

    if json {
        let output = StatsOutput {
            stats: &report.stats,
            skips: &report.skips,
            browsers: &report.browsers,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!(
            "{}",
            render_stats(&report.stats, &report.skips, &report.browsers, args.by_browser)
        );
    }
    Ok(())
}

fn render_counters(out: &mut String, indent: &str, stats: &Stats) {
    let _ = writeln!(out, "{indent}Total:   {}", stats.total);
    let _ = writeln!(out, "{indent}Passed:  {}", stats.passed);
    let _ = writeln!(out, "{indent}Failed:  {}", stats.failed);
    let _ = writeln!(out, "{indent}Skipped: {}", stats.skipped);
    let _ = writeln!(out, "{indent}Retries: {}", stats.retries);
}

fn render_stats(
    stats: &ReportStats,
    skips: &[SkipItem],
    browsers: &[BrowserItem],
    by_browser: bool,
) -> String {
    let mut out = String::from("Report Statistics\n=================\n\n");
    render_counters(&mut out, "", &stats.totals);

    if by_browser {
        for (browser, versions) in &stats.per_browser {
            for (version, counters) in versions {
                let _ = writeln!(out, "\n{browser} {version}:");
                render_counters(&mut out, "  ", counters);
            }
        }
    }

    if !browsers.is_empty() {
        out.push_str("\nBrowsers:\n");
        for browser in browsers {
            let _ = writeln!(out, "  {}: {}", browser.id, browser.versions.join(", "));
        }
    }

    if !skips.is_empty() {
        out.push_str("\nSkipped:\n");
        for skip in skips {
            let _ = write!(out, "  {} [{}]", skip.suite, skip.browser);
            if let Some(comment) = &skip.comment {
                let _ = write!(out, ": {comment}");
            }
            out.push('\n');
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_stats_sections() {
        let mut stats = ReportStats::default();
        stats.totals.total = 2;
        stats.totals.passed = 1;
        stats.totals.skipped = 1;
        stats
            .per_browser
            .entry("chrome".to_string())
            .or_default()
            .insert("120".to_string(), stats.totals);

        let skips = vec![SkipItem {
            browser: "chrome".to_string(),
            suite: "s t".to_string(),
            comment: Some("flaky".to_string()),
        }];
        let browsers = vec![BrowserItem {
            id: "chrome".to_string(),
            versions: vec!["120".to_string()],
        }];

        let text = render_stats(&stats, &skips, &browsers, true);
        assert!(text.contains("Total:   2"));
        assert!(text.contains("\nchrome 120:\n  Total:   2"));
        assert!(text.contains("  chrome: 120"));
        assert!(text.contains("  s t [chrome]: flaky"));

        let brief = render_stats(&stats, &[], &[], false);
        assert!(!brief.contains("chrome"));
    }
}
