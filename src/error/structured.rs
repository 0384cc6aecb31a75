//! Structured error output for the CLI.
//!
//! Gives scripts a stable error code, the message, a hint and whatever
//! context the error carries, as JSON on stderr.

use crate::error::ReportError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Input ===
    InvalidTestPath,
    InvalidBrowser,
    InvalidStatus,
    AttemptOverflow,

    // === Lookup ===
    SuiteNotFound,
    BrowserNotFound,
    ResultNotFound,
    ImageNotFound,
    StateNotFound,

    // === Storage ===
    ReportNotFound,
    CorruptedTree,
    DatabaseError,

    // === Config / I/O ===
    ConfigError,
    IoError,
    JsonError,
    YamlError,

    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTestPath => "INVALID_TEST_PATH",
            Self::InvalidBrowser => "INVALID_BROWSER",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::AttemptOverflow => "ATTEMPT_OVERFLOW",
            Self::SuiteNotFound => "SUITE_NOT_FOUND",
            Self::BrowserNotFound => "BROWSER_NOT_FOUND",
            Self::ResultNotFound => "RESULT_NOT_FOUND",
            Self::ImageNotFound => "IMAGE_NOT_FOUND",
            Self::StateNotFound => "STATE_NOT_FOUND",
            Self::ReportNotFound => "REPORT_NOT_FOUND",
            Self::CorruptedTree => "CORRUPTED_TREE",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::YamlError => "YAML_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Process exit code for this error.
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    #[must_use]
    pub fn from_error(err: &ReportError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);
        Self {
            code,
            message: err.to_string(),
            hint: err.suggestion().map(ToString::to_string),
            exit_code: err.exit_code(),
            context,
        }
    }

    /// Format as JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }
        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &ReportError) -> (ErrorCode, Option<Value>) {
        match err {
            ReportError::InvalidTestPath {
                path,
                browser,
                attempt,
                ..
            } => (
                ErrorCode::InvalidTestPath,
                Some(json!({"testPath": path, "browser": browser, "attempt": attempt})),
            ),
            ReportError::InvalidBrowser { path, browser, .. } => (
                ErrorCode::InvalidBrowser,
                Some(json!({"testPath": path, "browser": browser})),
            ),
            ReportError::InvalidStatus { status } => {
                (ErrorCode::InvalidStatus, Some(json!({"status": status})))
            }
            ReportError::AttemptOverflow {
                browser_id,
                attempt,
            } => (
                ErrorCode::AttemptOverflow,
                Some(json!({"browserId": browser_id, "attempt": attempt})),
            ),
            ReportError::SuiteNotFound { id } => (ErrorCode::SuiteNotFound, Some(json!({"id": id}))),
            ReportError::BrowserNotFound { id } => {
                (ErrorCode::BrowserNotFound, Some(json!({"id": id})))
            }
            ReportError::ResultNotFound { id } => {
                (ErrorCode::ResultNotFound, Some(json!({"id": id})))
            }
            ReportError::ImageNotFound { id } => (ErrorCode::ImageNotFound, Some(json!({"id": id}))),
            ReportError::StateNotFound {
                result_id,
                state_name,
            } => (
                ErrorCode::StateNotFound,
                Some(json!({"resultId": result_id, "stateName": state_name})),
            ),
            ReportError::ReportNotFound { path } => (
                ErrorCode::ReportNotFound,
                Some(json!({"path": path.display().to_string()})),
            ),
            ReportError::CorruptedTree { reason } => {
                (ErrorCode::CorruptedTree, Some(json!({"reason": reason})))
            }
            ReportError::Database(_) => (ErrorCode::DatabaseError, None),
            ReportError::Config(_) => (ErrorCode::ConfigError, None),
            ReportError::Io(_) => (ErrorCode::IoError, None),
            ReportError::Json(_) => (ErrorCode::JsonError, None),
            ReportError::Yaml(_) => (ErrorCode::YamlError, None),
            ReportError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}
