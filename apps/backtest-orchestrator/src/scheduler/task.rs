//! Task records and scheduler statistics.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backtest::{
    BacktestConfig, BacktestResult, ExecutionFailure, FailureKind, TaskKind, TaskResult,
};
use crate::error::{OrchestratorError, Result};

// =============================================================================
// Task Status
// =============================================================================

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Queued, waiting for a worker.
    Pending,
    /// A worker is running it.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with an error.
    Failed,
    /// Cancelled before or during execution.
    Cancelled,
}

impl TaskStatus {
    /// Whether the task can no longer change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase metric label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// =============================================================================
// Task
// =============================================================================

/// One scheduled unit of work. Snapshots handed to callers are clones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier.
    pub task_id: String,
    /// Run kind.
    pub kind: TaskKind,
    /// Strategy under test.
    pub strategy_id: String,
    /// Run configuration.
    pub config: BacktestConfig,
    /// Current state.
    pub status: TaskStatus,
    /// When the task was accepted.
    pub submitted_at: DateTime<Utc>,
    /// When a worker picked it up.
    pub started_at: Option<DateTime<Utc>>,
    /// When it reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Result, once produced.
    pub result: Option<TaskResult>,
    /// Human-readable error for FAILED and CANCELLED tasks.
    pub error: Option<String>,
    /// Structured executor failure, when the executor reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
}

impl Task {
    pub(super) fn pending(request: TaskRequest, task_id: String) -> Self {
        Self {
            task_id,
            kind: request.kind,
            strategy_id: request.strategy_id,
            config: request.config,
            status: TaskStatus::Pending,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            failure: None,
        }
    }

    /// Whether the task is finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Run time from pickup to completion, in milliseconds.
    #[must_use]
    pub fn run_time_ms(&self) -> Option<i64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }

    /// The task as an evaluation record the comparator can rank.
    ///
    /// Search and degraded results contribute their metrics as a completed
    /// run. Tasks that failed without a result, or were cancelled before
    /// starting, become FAILED records. Non-terminal tasks yield `None`.
    #[must_use]
    pub fn comparable_result(&self) -> Option<BacktestResult> {
        if !self.is_terminal() {
            return None;
        }
        let duration_ms = self
            .run_time_ms()
            .and_then(|ms| u64::try_from(ms).ok())
            .unwrap_or_default();

        let record = match &self.result {
            Some(TaskResult::Evaluation(result)) => result.clone(),
            Some(result) => BacktestResult::completed(
                self.strategy_id.clone(),
                result.metrics().clone(),
                Vec::new(),
                duration_ms,
            ),
            None => {
                let failure = self.failure.clone().unwrap_or_else(|| {
                    ExecutionFailure::new(
                        FailureKind::Cancelled,
                        self.error.clone().unwrap_or_default(),
                    )
                });
                BacktestResult::failed(self.strategy_id.clone(), failure, duration_ms)
            }
        };
        Some(record)
    }
}

/// A submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Caller-assigned id; generated when absent.
    #[serde(default)]
    pub task_id: Option<String>,
    /// Run kind.
    pub kind: TaskKind,
    /// Strategy to run.
    pub strategy_id: String,
    /// Run configuration.
    pub config: BacktestConfig,
}

impl TaskRequest {
    /// Create a request with a generated id.
    pub fn new(kind: TaskKind, strategy_id: impl Into<String>, config: BacktestConfig) -> Self {
        Self {
            task_id: None,
            kind,
            strategy_id: strategy_id.into(),
            config,
        }
    }

    /// Use a caller-assigned id.
    #[must_use]
    pub fn with_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Check the request before anything is queued.
    pub fn validate(&self) -> Result<()> {
        if self.strategy_id.trim().is_empty() {
            return Err(OrchestratorError::validation(
                "strategy_id must not be empty",
            ));
        }
        if let Some(task_id) = &self.task_id
            && task_id.trim().is_empty()
        {
            return Err(OrchestratorError::validation("task_id must not be empty"));
        }
        self.kind.validate()?;
        self.config.validate()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Point-in-time counts over the registry, taken under one lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatistics {
    /// Tasks in the registry.
    pub total_tasks: usize,
    /// Waiting for a worker.
    pub pending: usize,
    /// Currently executing.
    pub running: usize,
    /// Finished with a result.
    pub completed: usize,
    /// Finished with an error.
    pub failed: usize,
    /// Cancelled.
    pub cancelled: usize,
    /// Worker pool size.
    pub max_workers: usize,
}

impl SchedulerStatistics {
    /// Whether nothing is pending or running.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.pending == 0 && self.running == 0
    }

    pub(super) const fn count(&mut self, status: TaskStatus) {
        self.total_tasks += 1;
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Running => self.running += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_display_and_serde() {
        assert_eq!(TaskStatus::Cancelled.to_string(), "CANCELLED");
        assert_eq!(
            serde_json::to_string(&TaskStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(TaskStatus::Failed.label(), "failed");
    }

    fn sample_task() -> Task {
        let config = BacktestConfig::new(
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            "5m",
            vec!["BTC/USDT".to_string()],
            rust_decimal_macros::dec!(1000),
            3,
        );
        Task::pending(TaskRequest::new(TaskKind::Evaluation, "S", config), "t-1".to_string())
    }

    #[test]
    fn test_comparable_result() {
        let mut task = sample_task();
        assert!(task.comparable_result().is_none());

        task.status = TaskStatus::Failed;
        task.failure = Some(ExecutionFailure::new(
            FailureKind::NonZeroExit { code: Some(1) },
            "boom",
        ));
        let record = task.comparable_result().unwrap();
        assert!(!record.is_completed());
        assert_eq!(
            record.error.map(|e| e.kind),
            Some(FailureKind::NonZeroExit { code: Some(1) })
        );

        task.status = TaskStatus::Cancelled;
        task.failure = None;
        task.error = Some("cancelled before start".to_string());
        let record = task.comparable_result().unwrap();
        assert!(record.error.is_some_and(|e| e.is_cancelled()));
    }

    #[test]
    fn test_statistics_count() {
        let mut stats = SchedulerStatistics::default();
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Completed,
            TaskStatus::Cancelled,
        ] {
            stats.count(status);
        }
        assert_eq!(stats.total_tasks, 5);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 0);
        assert!(!stats.is_idle());
    }
}
