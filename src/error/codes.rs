//! Standardized error codes for machine-parseable output.
//!
//! Error codes follow a numeric taxonomy:
//! - 1xx: Experiment errors
//! - 3xx: Config errors
//! - 6xx: Storage errors
//! - 8xx: Validation errors
//! - 9xx: Internal errors

use serde::{Deserialize, Serialize};

/// Standardized error codes for robot mode output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================
    // Experiment errors (1xx)
    // ========================================
    /// E101: Variant weights cannot be allocated against (e.g. sum to zero)
    AllocationInvalid,
    /// E102: A concurrent writer created the same assignment first
    AssignmentConflict,
    /// E103: Experiment exists but is not accepting assignments
    ExperimentInactive,
    /// E104: Requested experiment or record was not found
    NotFound,

    // ========================================
    // Config errors (3xx)
    // ========================================
    /// E302: Config file has invalid syntax or values
    ConfigInvalid,

    // ========================================
    // Storage errors (6xx)
    // ========================================
    /// E601: Storage backend could not serve the request
    StorageUnavailable,
    /// E602: SQLite reported an error
    DatabaseError,
    /// E603: Stored or supplied data could not be (de)serialized
    SerializationError,

    // ========================================
    // Validation errors (8xx)
    // ========================================
    /// E801: Input failed validation
    ValidationFailed,

    // ========================================
    // Internal errors (9xx)
    // ========================================
    /// E906: File operation failed
    IoError,
}

impl ErrorCode {
    /// Get the numeric error code.
    #[must_use]
    pub const fn numeric(&self) -> u16 {
        match self {
            Self::AllocationInvalid => 101,
            Self::AssignmentConflict => 102,
            Self::ExperimentInactive => 103,
            Self::NotFound => 104,
            Self::ConfigInvalid => 302,
            Self::StorageUnavailable => 601,
            Self::DatabaseError => 602,
            Self::SerializationError => 603,
            Self::ValidationFailed => 801,
            Self::IoError => 906,
        }
    }

    /// Get the error code as a formatted string (e.g., "E101").
    #[must_use]
    pub fn code_string(&self) -> String {
        format!("E{}", self.numeric())
    }

    /// Get the default suggestion for this error code.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::AllocationInvalid => "Give at least one variant a positive traffic_allocation_percent",
            Self::AssignmentConflict => "Retry the request; the existing assignment will be returned",
            Self::ExperimentInactive => "Set the experiment to RUNNING with `splitlab experiment set-status <id> running`",
            Self::NotFound => "Check the identifier. Run `splitlab experiment list` to see known experiments",
            Self::ConfigInvalid => "Check TOML syntax in the config file and SPLITLAB_* environment variables",
            Self::StorageUnavailable => "The storage backend failed. Retry once it is reachable",
            Self::DatabaseError => "Check the database path and permissions, then retry",
            Self::SerializationError => "The data format may be corrupted. Check input data for validity",
            Self::ValidationFailed => "Review the validation error and fix the input",
            Self::IoError => "File operation failed. Check path exists and permissions are correct",
        }
    }

    /// Check if this error is potentially recoverable by the user.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::SerializationError)
    }

    /// Get the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self.numeric() / 100 {
            1 => "experiment",
            3 => "config",
            6 => "storage",
            8 => "validation",
            9 => "internal",
            _ => "unknown",
        }
    }

    /// Iterate over all error codes.
    pub fn all() -> impl Iterator<Item = Self> {
        [
            Self::AllocationInvalid,
            Self::AssignmentConflict,
            Self::ExperimentInactive,
            Self::NotFound,
            Self::ConfigInvalid,
            Self::StorageUnavailable,
            Self::DatabaseError,
            Self::SerializationError,
            Self::ValidationFailed,
            Self::IoError,
        ]
        .into_iter()
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_else(|| self.code_string());
        write!(f, "{name}")
    }
}
