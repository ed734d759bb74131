//! Result types for evaluation and hyperopt runs.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::metrics::{PerformanceMetrics, TradeRecord};

// ============================================
// Failures
// ============================================

/// Why an engine run did not produce a usable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureKind {
    /// The process could not be started (missing binary, permissions, I/O).
    SpawnFailed,
    /// The process exited unsuccessfully. `code` is `None` when it died to a signal.
    NonZeroExit {
        /// Exit code, if any.
        code: Option<i32>,
    },
    /// The process exceeded its wall-clock budget and was killed.
    Timeout {
        /// Configured timeout in seconds.
        seconds: u64,
    },
    /// The run was cancelled and the process was killed.
    Cancelled,
    /// The process succeeded but produced no parsable output.
    OutputUnreadable,
    /// The executor panicked before reporting an outcome.
    Crashed,
}

/// A failed engine run with a human-readable diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Captured stderr, or a description of what went wrong.
    pub message: String,
}

impl ExecutionFailure {
    /// Create a failure.
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether this failure came from a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, FailureKind::Cancelled)
    }

    /// Whether this failure came from a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, FailureKind::Timeout { .. })
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::SpawnFailed => write!(f, "failed to start engine: {}", self.message),
            FailureKind::NonZeroExit { code: Some(code) } => {
                write!(f, "engine exited with code {code}: {}", self.message)
            }
            FailureKind::NonZeroExit { code: None } => {
                write!(f, "engine terminated by signal: {}", self.message)
            }
            FailureKind::Timeout { seconds } => {
                write!(f, "engine run timed out after {seconds}s: {}", self.message)
            }
            FailureKind::Cancelled => write!(f, "engine run cancelled: {}", self.message),
            FailureKind::OutputUnreadable => {
                write!(f, "engine output unreadable: {}", self.message)
            }
            FailureKind::Crashed => write!(f, "task execution panicked: {}", self.message),
        }
    }
}

impl std::error::Error for ExecutionFailure {}

// ============================================
// Evaluation Results
// ============================================

/// Outcome status of an evaluation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// Engine exited successfully and output was parsed.
    Completed,
    /// Engine failed; see the error.
    Failed,
}

/// Result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Evaluated strategy.
    pub strategy_id: String,
    /// Run status.
    pub status: RunStatus,
    /// Parsed metrics (defaults when the run failed).
    pub metrics: PerformanceMetrics,
    /// Trades from the export file, if one was written.
    pub trades: Vec<TradeRecord>,
    /// Wall-clock time from spawn to exit, in milliseconds.
    pub duration_ms: u64,
    /// Failure detail when `status` is `Failed`.
    pub error: Option<ExecutionFailure>,
}

impl BacktestResult {
    /// Create a completed result.
    #[must_use]
    pub fn completed(
        strategy_id: impl Into<String>,
        metrics: PerformanceMetrics,
        trades: Vec<TradeRecord>,
        duration_ms: u64,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            status: RunStatus::Completed,
            metrics,
            trades,
            duration_ms,
            error: None,
        }
    }

    /// Create a failed result.
    #[must_use]
    pub fn failed(
        strategy_id: impl Into<String>,
        failure: ExecutionFailure,
        duration_ms: u64,
    ) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            status: RunStatus::Failed,
            metrics: PerformanceMetrics::default(),
            trades: Vec::new(),
            duration_ms,
            error: Some(failure),
        }
    }

    /// Whether the run completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Human-readable error message, if the run failed.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

// ============================================
// Hyperopt Results
// ============================================

/// Parameter value chosen by a search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer parameter.
    Int(i64),
    /// Floating point parameter.
    Float(f64),
    /// String parameter.
    String(String),
    /// Boolean parameter.
    Bool(bool),
    /// Nested or list parameter (e.g. ROI tables).
    Other(serde_json::Value),
}

impl ParamValue {
    /// Get as integer if applicable.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as float if applicable.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Parameter set keyed by parameter name.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// One explored point of a parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperoptSample {
    /// Parameters tried.
    pub params: ParamSet,
    /// Objective value reported for these parameters, if any.
    pub metric: Option<Decimal>,
}

/// Parsed output of a parameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperoptResult {
    /// Best parameter set found.
    pub best_params: ParamSet,
    /// Metrics of the best parameter set.
    pub metrics: PerformanceMetrics,
    /// Every sample explored, in file order.
    pub samples: Vec<HyperoptSample>,
}

/// Explicitly tagged placeholder for a run that succeeded but whose
/// structured output could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DegradedResult {
    /// Strategy that was run.
    pub strategy_id: String,
    /// Why the structured result is missing.
    pub reason: String,
    /// Best-effort metrics recovered from console output.
    pub metrics: PerformanceMetrics,
    /// Path of the results file that failed to parse.
    pub results_path: Option<PathBuf>,
}

// ============================================
// Task Results
// ============================================

/// Result stored on a task, one variant per run kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum TaskResult {
    /// Evaluation run result.
    Evaluation(BacktestResult),
    /// Parameter search result.
    Search(HyperoptResult),
    /// Successful run with unreadable structured output.
    Degraded(DegradedResult),
}

impl TaskResult {
    /// Metrics carried by any variant.
    #[must_use]
    pub const fn metrics(&self) -> &PerformanceMetrics {
        match self {
            Self::Evaluation(r) => &r.metrics,
            Self::Search(r) => &r.metrics,
            Self::Degraded(r) => &r.metrics,
        }
    }

    /// The evaluation result, if this is one.
    #[must_use]
    pub const fn as_backtest(&self) -> Option<&BacktestResult> {
        match self {
            Self::Evaluation(r) => Some(r),
            _ => None,
        }
    }

    /// The search result, if this is one.
    #[must_use]
    pub const fn as_hyperopt(&self) -> Option<&HyperoptResult> {
        match self {
            Self::Search(r) => Some(r),
            _ => None,
        }
    }

    /// Whether this is a degraded placeholder.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded(_))
    }
}
