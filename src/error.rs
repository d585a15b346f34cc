//! Error types for planr
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (validation, unknown id, bad args or config)
//! - 3: Store unavailable (not signed in, namespace missing, lock contention)
//! - 4: Operation failed (batch commit, provider, io)

use std::path::PathBuf;
use thiserror::Error;

/// Exit codes for the planr CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const USER_ERROR: i32 = 2;
    pub const STORE_UNAVAILABLE: i32 = 3;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Main error type for planr operations
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Store availability (exit code 3)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Lock acquisition failed: {0}")]
    LockFailed(PathBuf),

    // Operation failures (exit code 4)
    #[error("Batch commit failed: {0}")]
    BatchCommit(String),

    #[error("Plan provider error: {0}")]
    ExternalProvider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Error {
    pub fn task_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "task",
            id: id.into(),
        }
    }

    pub fn routine_not_found(id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: "routine",
            id: id.into(),
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Validation(_)
            | Error::NotFound { .. }
            | Error::InvalidConfig(_)
            | Error::InvalidArgument(_) => exit_codes::USER_ERROR,

            Error::StoreUnavailable(_) | Error::LockFailed(_) => exit_codes::STORE_UNAVAILABLE,

            Error::BatchCommit(_)
            | Error::ExternalProvider(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::TomlParse(_)
            | Error::TomlSerialize(_) => exit_codes::OPERATION_FAILED,
        }
    }

    /// Structured fields for JSON error output.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Error::NotFound { kind, id } => Some(serde_json::json!({
                "kind": kind,
                "id": id,
            })),
            Error::LockFailed(path) => Some(serde_json::json!({
                "lock": path.display().to_string(),
            })),
            Error::Validation(message)
            | Error::InvalidConfig(message)
            | Error::InvalidArgument(message)
            | Error::StoreUnavailable(message)
            | Error::BatchCommit(message)
            | Error::ExternalProvider(message) => Some(serde_json::json!({
                "message": message,
            })),
            _ => None,
        }
    }
}

/// Result type alias for planr operations
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
