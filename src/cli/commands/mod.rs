//! Command implementations.

pub mod build;
pub mod merge;
pub mod show;
pub mod stats;

use crate::config::{self, CliOverrides, ReportConfig};
use crate::error::Result;
use crate::storage::ReportStorage;

/// Resolve config and open the report database, which must exist.
///
/// # Errors
///
/// Returns `ReportNotFound` if the report has not been built yet.
pub fn open_report(cli: &CliOverrides) -> Result<(ReportConfig, ReportStorage)> {
    let config = config::load_config(cli)?;
    let storage = ReportStorage::open_existing(&config.db_path())?;
    Ok((config, storage))
}
