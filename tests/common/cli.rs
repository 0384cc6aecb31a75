//! Drives the `rtree` binary inside a scratch directory that holds the
//! JSON-lines inputs and the report directories they are built into.

use super::to_jsonl;
use assert_cmd::Command;
use report_tree::model::{FormattedResult, Tree};
use report_tree::storage::ReportStorage;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::debug;

/// Captured output of one `rtree` run.
#[derive(Debug)]
pub struct RtreeRun {
    pub stdout: String,
    pub stderr: String,
    pub code: Option<i32>,
}

impl RtreeRun {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// The structured error a failed run prints as the last block of stderr.
    pub fn error_json(&self) -> Value {
        let lines: Vec<&str> = self.stderr.lines().collect();
        let start = lines
            .iter()
            .rposition(|line| *line == "{")
            .unwrap_or_else(|| panic!("no structured error in stderr:\n{}", self.stderr));
        serde_json::from_str(&lines[start..].join("\n")).expect("structured error json")
    }
}

pub struct ReportWorkspace {
    _dir: TempDir,
    pub root: PathBuf,
}

impl ReportWorkspace {
    pub fn new() -> Self {
        super::init_test_logging();
        let dir = TempDir::new().expect("temp dir");
        let root = dir.path().to_path_buf();
        Self { _dir: dir, root }
    }

    /// Write a raw input file relative to the workspace root.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.root.join(name);
        fs::write(&path, contents).expect("write workspace file");
        path
    }

    /// Write `results` as a JSON-lines input file.
    pub fn write_results(&self, name: &str, results: &[FormattedResult]) -> PathBuf {
        self.write(name, &to_jsonl(results))
    }

    pub fn db_path(&self, report_dir: &str) -> PathBuf {
        self.root.join(report_dir).join("sqlite.db")
    }

    /// Snapshot stored in `report_dir`, read straight from the database.
    pub fn stored_tree(&self, report_dir: &str) -> Tree {
        ReportStorage::open_existing(&self.db_path(report_dir))
            .expect("open report database")
            .load_tree()
            .expect("load tree")
            .expect("report has a tree")
    }

    /// `rtree` running in the workspace with color and user config disabled.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("rtree"));
        cmd.current_dir(&self.root)
            .env("NO_COLOR", "1")
            .env("HOME", &self.root)
            .env_remove("RTREE_REPORT_DIR")
            .env_remove("RTREE_DB_FILE")
            .env_remove("RTREE_REUSE");
        cmd
    }

    pub fn run(&self, args: &[&str]) -> RtreeRun {
        let output = self.command().args(args).output().expect("run rtree");
        let run = RtreeRun {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            code: output.status.code(),
        };
        debug!(?args, code = ?run.code, "rtree finished");
        run
    }

    /// Run with `--json` appended and parse stdout; the run must succeed.
    pub fn run_json(&self, args: &[&str]) -> Value {
        let mut args = args.to_vec();
        args.push("--json");
        let run = self.run(&args);
        assert!(run.success(), "rtree {args:?} failed:\n{}", run.stderr);
        serde_json::from_str(run.stdout.trim())
            .unwrap_or_else(|e| panic!("rtree {args:?} printed invalid JSON ({e}):\n{}", run.stdout))
    }

    /// Build `input` into `report_dir`, returning the build summary.
    pub fn build(&self, report_dir: &str, input: &str) -> Value {
        self.run_json(&["build", "--input", input, "--report-dir", report_dir])
    }

    /// The tree `rtree show --json` prints for `report_dir`.
    pub fn show(&self, report_dir: &str) -> Value {
        self.run_json(&["show", "--report-dir", report_dir])
    }
}

/// `resultIds` of `browser_id` in a tree printed by `rtree show --json`.
pub fn result_ids(tree: &Value, browser_id: &str) -> Vec<String> {
    tree["browsers"]["byId"][browser_id]["resultIds"]
        .as_array()
        .expect("resultIds array")
        .iter()
        .map(|id| id.as_str().expect("result id").to_string())
        .collect()
}
