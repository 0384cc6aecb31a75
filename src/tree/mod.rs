//! The results tree: storage, building, reuse, accept and merge.
//!
//! - [`status`] - aggregate status of a suite from its children
//! - [`store`] - insertion, ordering and removal over the four tables
//! - [`builder`] - folding formatted results into a tree, UI read helpers
//! - [`reuse`] - overlaying a previously persisted tree
//! - [`accept`] - accepting screenshots, undo, expected-path cache
//! - [`merge`] - combining shard trees
//! - [`stats`] - building from stored rows with report statistics
//! - [`diffs`] - equal-diff search over an image comparator

pub mod accept;
pub mod builder;
pub mod diffs;
pub mod merge;
pub mod reuse;
pub mod stats;
pub mod status;
mod store;

pub use accept::{
    ExpectedPath, ExpectedPathCache, ExpectedPathRequest, UnacceptImageData, UndoAcceptImageResult,
};
pub use builder::{BranchSuite, BrowserImage, BuilderOptions, RefUpdateData, TestBranch, TestsTreeBuilder};
pub use diffs::{CompareOptions, ImageComparator, ImageRegion, find_equal_diffs};
pub use merge::{CollisionKind, MergeCollision, MergeReport, PathRename, merge_trees};
pub use reuse::{ReuseReport, reuse_tests_tree};
pub use stats::{BrowserItem, ReportStats, SkipItem, StaticReport, StaticTreeBuilder, Stats};
pub use status::aggregate_status;
