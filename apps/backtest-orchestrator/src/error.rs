//! Error handling for the backtest orchestrator.
//!
//! Every public operation returns [`OrchestratorError`]. Each variant maps to
//! a stable [`ErrorKind`] so callers (and the CLI's JSON output) can branch on
//! the category without matching message text.
//!
//! | Kind | Raised by |
//! |------|-----------|
//! | `VALIDATION_ERROR` | Config invariants, sort keys, filter keys, `top_n(0)` |
//! | `EXECUTION_ERROR` | Engine could not start, exited non-zero, timed out, was cancelled |
//! | `DATA_ERROR` | Output or results file missing, empty or unparsable |
//! | `NOT_FOUND` | Unknown task id |
//! | `CAPACITY_EXCEEDED` | Task registry cap reached |
//! | `UNAVAILABLE` | Submission after shutdown |
//!
//! Execution failures of scheduled tasks never surface through this type from
//! `submit`; they are stored on the task as a terminal FAILED state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::ExecutionFailure;

/// Error categories for the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed caller input.
    Validation,
    /// External engine failure.
    Execution,
    /// Missing or unparsable output data.
    Data,
    /// Unknown task.
    NotFound,
    /// Registry full.
    CapacityExceeded,
    /// Scheduler no longer accepts work.
    Unavailable,
}

impl ErrorKind {
    /// Get the stable reason string for this kind.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Execution => "EXECUTION_ERROR",
            Self::Data => "DATA_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::CapacityExceeded => "CAPACITY_EXCEEDED",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.reason())
    }
}

/// Errors returned by orchestrator operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// Caller input failed validation.
    #[error("Validation failed: {message}")]
    Validation {
        /// What was wrong with the input.
        message: String,
    },

    /// The external engine could not be run to a successful exit.
    #[error("Execution failed: {0}")]
    Execution(#[from] ExecutionFailure),

    /// Expected output data was missing or could not be parsed.
    #[error("Data error: {message}")]
    Data {
        /// Description of the data problem.
        message: String,
    },

    /// No task with the given identifier exists.
    #[error("Task '{task_id}' not found")]
    NotFound {
        /// Requested task identifier.
        task_id: String,
    },

    /// The task registry reached its configured cap.
    #[error("Task registry is full ({limit} tasks)")]
    Capacity {
        /// Configured registry cap.
        limit: usize,
    },

    /// The scheduler has been shut down.
    #[error("Scheduler is shutting down")]
    ShuttingDown,
}

impl OrchestratorError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Create a not-found error.
    pub fn not_found(task_id: impl Into<String>) -> Self {
        Self::NotFound {
            task_id: task_id.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Data { .. } => ErrorKind::Data,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Capacity { .. } => ErrorKind::CapacityExceeded,
            Self::ShuttingDown => ErrorKind::Unavailable,
        }
    }
}

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::FailureKind;

    #[test]
    fn test_error_kind_reasons() {
        assert_eq!(ErrorKind::Validation.reason(), "VALIDATION_ERROR");
        assert_eq!(ErrorKind::Data.to_string(), "DATA_ERROR");
        assert_eq!(ErrorKind::CapacityExceeded.reason(), "CAPACITY_EXCEEDED");
    }

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            OrchestratorError::validation("bad").kind(),
            ErrorKind::Validation
        );
        assert_eq!(OrchestratorError::not_found("t-1").kind(), ErrorKind::NotFound);
        assert_eq!(
            OrchestratorError::Capacity { limit: 3 }.kind(),
            ErrorKind::CapacityExceeded
        );

        let failure = ExecutionFailure::new(FailureKind::Timeout { seconds: 5 }, "slow");
        let err: OrchestratorError = failure.into();
        assert_eq!(err.kind(), ErrorKind::Execution);
    }

    #[test]
    fn test_error_messages() {
        let err = OrchestratorError::not_found("abc");
        assert_eq!(err.to_string(), "Task 'abc' not found");

        let err = OrchestratorError::data("missing key 'best_params'");
        assert!(err.to_string().contains("best_params"));
    }
}
