//! `report_tree` - results tree for browser-test visual reports.
//!
//! Folds per-attempt test results into a normalized tree of suites,
//! browsers, results and images, keeps aggregate statuses current, reuses
//! a previously persisted tree, merges shard trees, and persists the
//! whole thing to `SQLite`.
//!
//! - [`tree`] - builder, reuse, accept/undo, merge, statistics
//! - [`storage`] - schema, row flattening, [`ReportStorage`]
//! - [`config`] - layered configuration
//! - [`cli`] - the `rtree` command line

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod storage;
pub mod tree;
pub mod util;

pub use error::{ReportError, Result, StructuredError};
pub use model::{FormattedResult, ImageInfo, TestStatus, Tree};
pub use storage::ReportStorage;
pub use tree::{StaticTreeBuilder, TestsTreeBuilder, merge_trees, reuse_tests_tree};
