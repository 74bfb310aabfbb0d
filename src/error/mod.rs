//! Error handling for splitlab.
//!
//! This module provides:
//! - [`LabError`]: The main error enum for all engine and storage operations
//! - [`ErrorCode`]: Standardized error codes for machine parsing
//! - [`StructuredError`]: Rich error type with suggestion and context for robot output

mod codes;

use std::io;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use codes::ErrorCode;

/// Main error type for splitlab operations.
#[derive(Error, Debug)]
pub enum LabError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Experiment {experiment_id} is not running (status: {status})")]
    ExperimentInactive {
        experiment_id: String,
        status: String,
    },

    #[error("Config error: {0}")]
    Config(String),
}

impl LabError {
    /// Get the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::SerializationError,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidConfiguration(_) => ErrorCode::AllocationInvalid,
            Self::Conflict(_) => ErrorCode::AssignmentConflict,
            Self::StorageUnavailable(_) => ErrorCode::StorageUnavailable,
            Self::ValidationFailed(_) => ErrorCode::ValidationFailed,
            Self::ExperimentInactive { .. } => ErrorCode::ExperimentInactive,
            Self::Config(_) => ErrorCode::ConfigInvalid,
        }
    }

    /// True for failures of the storage collaborator itself, as opposed to
    /// caller-actionable errors such as a missing experiment.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::StorageUnavailable(_))
    }

    /// Get context information for this error as JSON.
    #[must_use]
    pub fn context(&self) -> Option<Value> {
        match self {
            Self::NotFound(what) => Some(serde_json::json!({ "resource": what })),
            Self::InvalidConfiguration(reason) => Some(serde_json::json!({ "reason": reason })),
            Self::ExperimentInactive {
                experiment_id,
                status,
            } => Some(serde_json::json!({
                "experiment_id": experiment_id,
                "status": status,
            })),
            _ => None,
        }
    }

    /// Convert this error to a structured error.
    #[must_use]
    pub fn to_structured(&self) -> StructuredError {
        StructuredError::from_lab_error(self)
    }
}

/// A structured error with machine-readable code, suggestion, and context.
///
/// Emitted on stdout in robot mode so scripts can branch on `code`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// The error code (e.g., "NOT_FOUND")
    pub code: ErrorCode,

    /// The numeric error code (e.g., 104)
    pub numeric_code: u16,

    /// Human-readable error message
    pub message: String,

    /// Actionable suggestion for recovery
    pub suggestion: String,

    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Whether this error is potentially recoverable by the user
    pub recoverable: bool,

    /// Error category (e.g., "experiment", "storage")
    pub category: String,
}

impl StructuredError {
    /// Create a new structured error.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            numeric_code: code.numeric(),
            suggestion: code.suggestion().to_string(),
            context: None,
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
            code,
            message: message.into(),
        }
    }

    /// Create a structured error from a [`LabError`].
    #[must_use]
    pub fn from_lab_error(err: &LabError) -> Self {
        let code = err.code();
        Self {
            code,
            numeric_code: code.numeric(),
            message: err.to_string(),
            suggestion: code.suggestion().to_string(),
            context: err.context(),
            recoverable: code.is_recoverable(),
            category: code.category().to_string(),
        }
    }

    /// Add context to this error.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl From<&LabError> for StructuredError {
    fn from(err: &LabError) -> Self {
        Self::from_lab_error(err)
    }
}

/// Result type alias using [`LabError`].
pub type Result<T> = std::result::Result<T, LabError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_mapping_keeps_caller_actionable_kinds_distinct() {
        assert_eq!(LabError::NotFound("e1".into()).code(), ErrorCode::NotFound);
        assert_eq!(
            LabError::InvalidConfiguration("zero".into()).code(),
            ErrorCode::AllocationInvalid
        );
        assert_eq!(
            LabError::StorageUnavailable("down".into()).code(),
            ErrorCode::StorageUnavailable
        );
        assert_ne!(
            LabError::NotFound("e1".into()).code(),
            LabError::InvalidConfiguration("zero".into()).code()
        );
    }

    #[test]
    fn unavailable_groups_storage_failures_only() {
        assert!(LabError::StorageUnavailable("down".into()).is_unavailable());
        assert!(
            LabError::Database(rusqlite::Error::InvalidQuery).is_unavailable()
        );
        assert!(!LabError::NotFound("x".into()).is_unavailable());
        assert!(!LabError::Conflict("x".into()).is_unavailable());
    }

    #[test]
    fn structured_error_carries_context() {
        let err = LabError::ExperimentInactive {
            experiment_id: "exp-1".into(),
            status: "PAUSED".into(),
        };
        let structured = err.to_structured();
        assert_eq!(structured.code, ErrorCode::ExperimentInactive);
        assert_eq!(structured.category, "experiment");
        let context = structured.context.unwrap();
        assert_eq!(context["experiment_id"], "exp-1");
        assert_eq!(context["status"], "PAUSED");
    }

    #[test]
    fn structured_error_display_includes_code() {
        let structured = StructuredError::new(ErrorCode::NotFound, "experiment not found: x");
        assert_eq!(structured.to_string(), "[NOT_FOUND] experiment not found: x");
    }
}
