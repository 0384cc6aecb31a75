//! End-to-end tests for the `rtree` binary.

mod common;

use common::cli::{ReportWorkspace, result_ids};
use common::{result, test_log, to_jsonl, versioned_result};
use predicates::prelude::*;
use report_tree::model::{FormattedResult, TestStatus};

fn unattempted(path: &[&str], browser: &str, status: TestStatus) -> FormattedResult {
    FormattedResult {
        attempt: None,
        ..result(path, browser, 0, status)
    }
}

#[test]
fn e2e_build_then_show() {
    let _log = test_log("e2e_build_then_show");
    let workspace = ReportWorkspace::new();
    workspace.write_results(
        "results.jsonl",
        &[
            result(&["suite1", "case1"], "chrome", 0, TestStatus::Fail),
            result(&["suite1", "case1"], "chrome", 1, TestStatus::Success),
            result(&["suite1", "case2"], "firefox", 0, TestStatus::Skipped),
        ],
    );

    let summary = workspace.build("report", "results.jsonl");
    assert_eq!(summary["results"], 3);
    assert_eq!(summary["suites"], 3);
    assert_eq!(summary["browsers"], 2);
    assert!(workspace.db_path("report").is_file());

    let tree = workspace.show("report");
    assert_eq!(
        result_ids(&tree, "suite1 case1 chrome"),
        vec!["suite1 case1 chrome 0", "suite1 case1 chrome 1"]
    );
    assert_eq!(tree["suites"]["byId"]["suite1 case1"]["status"], "success");
    assert_eq!(tree["suites"]["allRootIds"][0], "suite1");
    assert_eq!(tree, serde_json::to_value(workspace.stored_tree("report")).unwrap());

    let text = workspace.run(&["show", "--report-dir", "report"]);
    assert!(text.success());
    assert!(text.stdout.contains("chrome (unknown): fail -> success"));
}

#[test]
fn e2e_rebuild_appends_to_reused_history() {
    let _log = test_log("e2e_rebuild_appends_to_reused_history");
    let workspace = ReportWorkspace::new();
    workspace.write_results(
        "first.jsonl",
        &[unattempted(&["s", "t"], "chrome", TestStatus::Fail)],
    );
    workspace.write_results(
        "second.jsonl",
        &[
            unattempted(&["s", "t"], "chrome", TestStatus::Success),
            unattempted(&["s", "t"], "firefox", TestStatus::Success),
        ],
    );

    workspace.build("report", "first.jsonl");
    let summary = workspace.build("report", "second.jsonl");
    assert_eq!(summary["reusedBrowsers"], 1);

    let tree = workspace.show("report");
    assert_eq!(result_ids(&tree, "s t chrome"), vec!["s t chrome 0", "s t chrome 1"]);
    assert_eq!(tree["results"]["byId"]["s t chrome 0"]["status"], "fail");
    assert_eq!(tree["results"]["byId"]["s t chrome 1"]["status"], "success");
    assert_eq!(result_ids(&tree, "s t firefox"), vec!["s t firefox 0"]);

    let stats = workspace.run_json(&["stats", "--report-dir", "report"]);
    assert_eq!(stats["stats"]["total"], 2);
    assert_eq!(stats["stats"]["passed"], 2);
    assert_eq!(stats["stats"]["retries"], 1);
}

#[test]
fn e2e_no_reuse_starts_fresh() {
    let _log = test_log("e2e_no_reuse_starts_fresh");
    let workspace = ReportWorkspace::new();
    workspace.write_results(
        "first.jsonl",
        &[unattempted(&["s", "t"], "chrome", TestStatus::Fail)],
    );
    workspace.write_results(
        "second.jsonl",
        &[unattempted(&["s", "t"], "chrome", TestStatus::Success)],
    );

    workspace.build("report", "first.jsonl");
    let summary = workspace.run_json(&[
        "build",
        "--input",
        "second.jsonl",
        "--report-dir",
        "report",
        "--no-reuse",
    ]);
    assert_eq!(summary["reusedBrowsers"], 0);

    let stored = workspace.stored_tree("report");
    assert_eq!(
        stored.browsers.get("s t chrome").unwrap().result_ids,
        vec!["s t chrome 0"]
    );
    assert_eq!(
        stored.results.get("s t chrome 0").unwrap().status,
        TestStatus::Success
    );
}

#[test]
fn e2e_stats_by_browser_text() {
    let _log = test_log("e2e_stats_by_browser_text");
    let workspace = ReportWorkspace::new();
    let mut skipped = versioned_result(&["s", "u"], "chrome", "120", 0, TestStatus::Skipped);
    skipped.skip_reason = Some("flaky on ci".to_string());
    workspace.write_results(
        "results.jsonl",
        &[
            versioned_result(&["s", "t"], "chrome", "120", 0, TestStatus::Success),
            skipped,
        ],
    );
    workspace.build("report", "results.jsonl");

    let run = workspace.run(&["stats", "--report-dir", "report", "--by-browser"]);
    assert!(run.success(), "stats failed: {}", run.stderr);
    assert!(run.stdout.contains("Total:   2"));
    assert!(run.stdout.contains("chrome 120:"));
    assert!(run.stdout.contains("s u [chrome]: flaky on ci"));
}

#[test]
fn e2e_merge_shards() {
    let _log = test_log("e2e_merge_shards");
    let workspace = ReportWorkspace::new();
    workspace.write_results(
        "a.jsonl",
        &[result(&["s", "t"], "chrome", 0, TestStatus::Fail)],
    );
    workspace.write_results(
        "b.jsonl",
        &[
            result(&["s", "t"], "chrome", 0, TestStatus::Success),
            result(&["s", "v"], "chrome", 0, TestStatus::Success),
        ],
    );
    workspace.build("shard-a", "a.jsonl");
    workspace.build("shard-b", "b.jsonl");

    let report = workspace.run_json(&[
        "merge",
        "--dest",
        "merged",
        "shard-a/sqlite.db",
        "shard-b/sqlite.db",
    ]);
    assert_eq!(report["sources"], 2);
    assert_eq!(report["mergedResults"], 3);

    let tree = workspace.show("merged");
    assert_eq!(result_ids(&tree, "s t chrome"), vec!["s t chrome 0", "s t chrome 1"]);
    assert_eq!(tree["suites"]["byId"]["s"]["status"], "success");
}

#[test]
fn e2e_show_missing_report_fails() {
    let _log = test_log("e2e_show_missing_report_fails");
    let workspace = ReportWorkspace::new();

    let run = workspace.run(&["show", "--report-dir", "nowhere", "--json"]);
    assert_eq!(run.code, Some(1));
    let error = run.error_json();
    assert_eq!(error["error"]["code"], "REPORT_NOT_FOUND");
    assert!(
        error["error"]["context"]["path"]
            .as_str()
            .unwrap()
            .ends_with("sqlite.db")
    );
}

#[test]
fn e2e_invalid_input_is_rejected() {
    let _log = test_log("e2e_invalid_input_is_rejected");
    let workspace = ReportWorkspace::new();
    workspace.write("broken.jsonl", "{\"testPath\": [\"s\"]}\n");
    workspace.write(
        "empty_path.jsonl",
        "{\"testPath\": [], \"browserId\": \"chrome\", \"status\": \"fail\"}\n",
    );

    let broken = workspace.run(&["build", "--input", "broken.jsonl", "--report-dir", "report"]);
    assert!(!broken.success());
    assert!(broken.stderr.contains("input line 1"));

    let empty = workspace.run(&[
        "build",
        "--input",
        "empty_path.jsonl",
        "--report-dir",
        "report",
        "--json",
    ]);
    assert_eq!(empty.code, Some(2));
    let error = empty.error_json();
    assert_eq!(error["error"]["code"], "INVALID_TEST_PATH");
    assert_eq!(error["error"]["context"]["browser"], "chrome");
}

#[test]
fn e2e_build_reads_stdin() {
    let _log = test_log("e2e_build_reads_stdin");
    let workspace = ReportWorkspace::new();
    let input = to_jsonl(&[result(&["s", "t"], "chrome", 0, TestStatus::Success)]);

    workspace
        .command()
        .args(["build", "--input", "-", "--report-dir", "report"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Built 1 result(s)"));
    assert_eq!(workspace.stored_tree("report").results.len(), 1);
}
