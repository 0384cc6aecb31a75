//! Error types and handling for `report_tree`.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Invalid-input variants carry the test path, browser and attempt that
//!   triggered them so a broken adapter upstream can be located
//! - Missing prior data is not an error (loaders return `Ok(None)`);
//!   a snapshot that cannot be parsed is `CorruptedTree`
//! - Supports `anyhow` integration for CLI plumbing

mod structured;

pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `report_tree` operations.
#[derive(Error, Debug)]
pub enum ReportError {
    // === Input Errors ===
    /// Formatted result has no usable test path.
    #[error("Invalid test path {path:?} (browser '{browser}', attempt {attempt:?}): {reason}")]
    InvalidTestPath {
        path: Vec<String>,
        browser: String,
        attempt: Option<u32>,
        reason: String,
    },

    /// Formatted result has no usable browser name.
    #[error("Invalid browser '{browser}' for test {path:?}: {reason}")]
    InvalidBrowser {
        path: Vec<String>,
        browser: String,
        reason: String,
    },

    /// Unknown status value.
    #[error("Invalid status: {status}")]
    InvalidStatus { status: String },

    /// No attempt number is left after the browser's last one.
    #[error("Attempt counter exhausted for {browser_id} (last attempt {attempt})")]
    AttemptOverflow { browser_id: String, attempt: u32 },

    // === Lookup Errors ===
    /// Suite with the specified ID was not found.
    #[error("Suite not found: {id}")]
    SuiteNotFound { id: String },

    /// Browser with the specified ID was not found.
    #[error("Browser not found: {id}")]
    BrowserNotFound { id: String },

    /// Result with the specified ID was not found.
    #[error("Result not found: {id}")]
    ResultNotFound { id: String },

    /// Image with the specified ID was not found.
    #[error("Image not found: {id}")]
    ImageNotFound { id: String },

    /// Result has no image for the given state name.
    #[error("State '{state_name}' not found in result {result_id}")]
    StateNotFound {
        result_id: String,
        state_name: String,
    },

    // === Storage Errors ===
    /// Report database not found at the specified path.
    #[error("Report database not found at '{path}'")]
    ReportNotFound { path: PathBuf },

    /// Persisted tree could not be reconstructed.
    #[error("Corrupted tree snapshot: {reason}")]
    CorruptedTree { reason: String },

    /// `SQLite` database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // === Configuration Errors ===
    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReportError {
    /// Can the user fix this without code changes?
    #[must_use]
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ReportNotFound { .. }
                | Self::Config(_)
                | Self::CorruptedTree { .. }
                | Self::StateNotFound { .. }
                | Self::ResultNotFound { .. }
        )
    }

    /// Is this a broken-adapter input error?
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidTestPath { .. } | Self::InvalidBrowser { .. }
        )
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ReportNotFound { .. } => Some("Check --report-dir or run: rtree build"),
            Self::CorruptedTree { .. } => {
                Some("Delete the report database and rebuild it with: rtree build")
            }
            Self::Config(_) => Some("Check report-tree.yaml and RTREE_* environment variables"),
            Self::InvalidTestPath { .. } | Self::InvalidBrowser { .. } => {
                Some("The runner adapter produced a malformed result")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidTestPath { .. } | Self::InvalidBrowser { .. } => 2,
            _ => 1,
        }
    }

    /// Create a corruption error with a reason.
    #[must_use]
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Self::CorruptedTree {
            reason: reason.into(),
        }
    }
}

/// Result type using `ReportError`.
pub type Result<T> = std::result::Result<T, ReportError>;
