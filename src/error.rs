//! Error types for crit
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad args, unknown task, bad config)
//! - 3: Transition rejected by the state machine
//! - 4: Operation failed (I/O, serialization, lock)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the crit CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const TRANSITION_REJECTED: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for crit operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Not a crit project (no .crit/ found from {0})")]
    NotInitialized(PathBuf),

    // Rejected transitions (exit code 3)
    #[error("Transition rejected: {}", .errors.join("; "))]
    TransitionRejected { task_id: String, errors: Vec<String> },

    // Operation failures (exit code 4)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidConfig(_)
            | Error::InvalidArgument(_)
            | Error::Validation(_)
            | Error::TaskNotFound(_)
            | Error::NotInitialized(_) => exit_codes::USER_ERROR,

            Error::TransitionRejected { .. } => exit_codes::TRANSITION_REJECTED,

            Error::Io(_)
            | Error::Json(_)
            | Error::TomlSerialize(_)
            | Error::LockFailed(_)
            | Error::OperationFailed(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured details for JSON error output, when the error carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::Validation(errors) => Some(serde_json::json!({ "errors": errors })),
            Error::TransitionRejected { task_id, errors } => Some(serde_json::json!({
                "task_id": task_id,
                "errors": errors,
            })),
            _ => None,
        }
    }
}

/// Result type alias for crit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wrapper for displaying errors in JSON format
#[derive(serde::Serialize)]
pub struct JsonError {
    pub error: String,
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&Error> for JsonError {
    fn from(err: &Error) -> Self {
        JsonError {
            error: err.to_string(),
            code: err.exit_code(),
            details: err.details(),
        }
    }
}
