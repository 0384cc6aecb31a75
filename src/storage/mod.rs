//! Report persistence.
//!
//! - [`schema`] - SQL schema and migrations
//! - [`rows`] - result rows and the flattened tree snapshot
//! - [`sqlite`] - [`ReportStorage`] over `rusqlite`

pub mod rows;
pub mod schema;
pub mod sqlite;

pub use rows::{ResultRow, TreeRow, flatten, result_rows, unflatten};
pub use sqlite::ReportStorage;
