//! Process executors.
//!
//! [`TaskExecutor`] is the port the scheduler drives. [`EngineExecutor`] is
//! the one production implementation: it is built once at startup and shared
//! by every worker through an `Arc`, and it handles both run kinds.
//!
//! - Evaluation runs return a [`BacktestResult`] whether they succeed or not.
//! - Search runs use [`EngineExecutor::run_hyperopt`] then [`parse_results`];
//!   an unreadable results file after a clean exit becomes a degraded result.

mod evaluation;
mod hyperopt;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backtest::{
    BacktestConfig, BacktestResult, ExecutionFailure, FailureKind, TaskKind, TaskResult,
};
use crate::config::{Config, EngineSettings};
use crate::engine::{
    EngineCommand, EngineConfigFile, ProcessOutcome, ProcessOutput, TaskFiles, Workspace,
    run_process,
};
use crate::observability::record_engine_run;
use crate::parser::{ConsoleTextParser, ResultParser};

pub use hyperopt::{HyperoptRun, parse_results};

/// Lines of stdout kept as a diagnostic when stderr is empty.
const STDOUT_TAIL_LINES: usize = 20;

/// Seconds the engine gets to answer `--version`.
const VERSION_CHECK_TIMEOUT_SECS: u64 = 10;

// ============================================
// Executor Port
// ============================================

/// Everything an executor needs to run one task.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Scheduler task id (used for file naming).
    pub task_id: String,
    /// Strategy to run.
    pub strategy_id: String,
    /// Run kind and its parameters.
    pub kind: TaskKind,
    /// Validated configuration.
    pub config: BacktestConfig,
}

/// What an executor hands back to the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    /// The run produced a result (possibly degraded).
    Finished(TaskResult),
    /// The run failed. Evaluation failures still carry a FAILED result.
    Failed {
        /// Failure detail.
        error: ExecutionFailure,
        /// Result to store on the task, if any.
        result: Option<TaskResult>,
    },
}

impl TaskOutcome {
    /// Whether the failure was a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Failed { error, .. } if error.is_cancelled())
    }
}

impl From<BacktestResult> for TaskOutcome {
    fn from(result: BacktestResult) -> Self {
        match result.error.clone() {
            None => Self::Finished(TaskResult::Evaluation(result)),
            Some(error) => Self::Failed {
                error,
                result: Some(TaskResult::Evaluation(result)),
            },
        }
    }
}

/// Runs tasks. Implementations must kill any child process when `cancel`
/// fires and report that as a cancellation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    /// Run one task to a terminal outcome.
    async fn execute(&self, request: &ExecutionRequest, cancel: CancellationToken) -> TaskOutcome;
}

// ============================================
// Engine Executor
// ============================================

/// Executor backed by the external command-line engine.
#[derive(Debug, Clone)]
pub struct EngineExecutor {
    settings: EngineSettings,
    workspace: Workspace,
    parser: Arc<dyn ResultParser>,
}

impl EngineExecutor {
    /// Create an executor that parses console output.
    #[must_use]
    pub fn new(settings: EngineSettings, workspace: Workspace) -> Self {
        Self {
            settings,
            workspace,
            parser: Arc::new(ConsoleTextParser),
        }
    }

    /// Create an executor from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.engine.clone(),
            Workspace::from_config(&config.workspace),
        )
    }

    /// Replace the result parser.
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn ResultParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Engine settings.
    #[must_use]
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Confirm the engine can be started, returning the version line it
    /// reports.
    ///
    /// # Errors
    ///
    /// The [`ExecutionFailure`] when the binary is missing, exits non-zero or
    /// does not answer within ten seconds.
    pub async fn check_engine(&self) -> Result<String, ExecutionFailure> {
        let command = EngineCommand::version(&self.settings);
        let output = run_process(
            &command,
            Duration::from_secs(VERSION_CHECK_TIMEOUT_SECS),
            self.settings.kill_grace(),
            &CancellationToken::new(),
        )
        .await
        .map_err(|e| ExecutionFailure::new(FailureKind::SpawnFailed, e.to_string()))?;

        if let Some(failure) = classify(&output, VERSION_CHECK_TIMEOUT_SECS) {
            warn!(engine = %self.settings.binary, error = %failure, "Engine check failed");
            return Err(failure);
        }

        let version = output
            .stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("unknown version")
            .to_string();
        info!(engine = %self.settings.binary, version = %version, "Engine check passed");
        Ok(version)
    }

    /// Allocate task files and write the engine configuration.
    async fn prepare(
        &self,
        task_id: &str,
        strategy_id: &str,
        config: &BacktestConfig,
    ) -> Result<TaskFiles, ExecutionFailure> {
        let files = self.workspace.allocate(task_id).await.map_err(|e| {
            ExecutionFailure::new(
                FailureKind::SpawnFailed,
                format!("could not prepare workspace {}: {e}", self.workspace.dir().display()),
            )
        })?;

        EngineConfigFile::build(strategy_id, config, &self.settings, &files)
            .write_to(&files.config)
            .await
            .map_err(|e| {
                ExecutionFailure::new(
                    FailureKind::SpawnFailed,
                    format!("could not write {}: {e}", files.config.display()),
                )
            })?;

        Ok(files)
    }
}

#[async_trait]
impl TaskExecutor for EngineExecutor {
    async fn execute(&self, request: &ExecutionRequest, cancel: CancellationToken) -> TaskOutcome {
        match &request.kind {
            TaskKind::Evaluation => self
                .run_backtest(&request.task_id, &request.strategy_id, &request.config, &cancel)
                .await
                .into(),
            TaskKind::ParameterSearch(search) => {
                self.execute_search(request, search, &cancel).await
            }
        }
    }
}

// ============================================
// Outcome Classification
// ============================================

/// Map a non-successful process outcome to a failure. Returns `None` for a
/// clean exit.
fn classify(output: &ProcessOutput, timeout_secs: u64) -> Option<ExecutionFailure> {
    match output.outcome {
        ProcessOutcome::Exited(status) if status.success() => None,
        ProcessOutcome::Exited(status) => Some(ExecutionFailure::new(
            FailureKind::NonZeroExit {
                code: status.code(),
            },
            diagnostic(output),
        )),
        ProcessOutcome::TimedOut => Some(ExecutionFailure::new(
            FailureKind::Timeout {
                seconds: timeout_secs,
            },
            "engine process killed after exceeding its time budget",
        )),
        ProcessOutcome::Cancelled => Some(ExecutionFailure::new(
            FailureKind::Cancelled,
            "engine process killed on cancellation",
        )),
    }
}

/// Metric label for a process outcome.
fn outcome_label(output: &ProcessOutput) -> &'static str {
    match output.outcome {
        ProcessOutcome::Exited(status) if status.success() => "success",
        ProcessOutcome::Exited(_) => "exit_error",
        ProcessOutcome::TimedOut => "timeout",
        ProcessOutcome::Cancelled => "cancelled",
    }
}

/// Stderr verbatim, else the tail of stdout.
fn diagnostic(output: &ProcessOutput) -> String {
    let stderr = output.stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let lines: Vec<&str> = output.stdout.trim().lines().collect();
    if lines.is_empty() {
        return "no output captured".to_string();
    }
    lines[lines.len().saturating_sub(STDOUT_TAIL_LINES)..].join("\n")
}

fn record_run(kind: &TaskKind, output: &ProcessOutput) {
    record_engine_run(kind.label(), outcome_label(output), output.duration.as_secs_f64());
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;
    use std::time::Duration;

    use super::*;

    fn output(outcome: ProcessOutcome, stdout: &str, stderr: &str) -> ProcessOutput {
        ProcessOutput {
            outcome,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_classify_success() {
        let out = output(ProcessOutcome::Exited(ExitStatus::from_raw(0)), "ok", "");
        assert!(classify(&out, 10).is_none());
        assert_eq!(outcome_label(&out), "success");
    }

    #[test]
    fn test_classify_non_zero_keeps_stderr() {
        // Raw wait status: exit code lives in the high byte.
        let out = output(
            ProcessOutcome::Exited(ExitStatus::from_raw(1 << 8)),
            "some progress",
            "strategy not found\n",
        );
        let failure = classify(&out, 10).unwrap();
        assert_eq!(failure.kind, FailureKind::NonZeroExit { code: Some(1) });
        assert_eq!(failure.message, "strategy not found");
        assert_eq!(outcome_label(&out), "exit_error");
    }

    #[test]
    fn test_diagnostic_falls_back_to_stdout_tail() {
        let stdout: String = (0..50).map(|i| format!("line {i}\n")).collect();
        let out = output(ProcessOutcome::Exited(ExitStatus::from_raw(2 << 8)), &stdout, "  ");
        let message = diagnostic(&out);
        assert!(message.starts_with("line 30"));
        assert!(message.ends_with("line 49"));

        let empty = output(ProcessOutcome::Exited(ExitStatus::from_raw(2 << 8)), "", "");
        assert_eq!(diagnostic(&empty), "no output captured");
    }

    #[test]
    fn test_classify_timeout_and_cancel() {
        let timed_out = classify(&output(ProcessOutcome::TimedOut, "", ""), 300).unwrap();
        assert!(timed_out.is_timeout());
        assert!(timed_out.to_string().contains("timed out after 300s"));

        let cancelled = classify(&output(ProcessOutcome::Cancelled, "", ""), 300).unwrap();
        assert!(cancelled.is_cancelled());
    }

    #[test]
    fn test_outcome_from_failed_backtest() {
        let failure = ExecutionFailure::new(FailureKind::Cancelled, "killed");
        let outcome = TaskOutcome::from(BacktestResult::failed("S", failure, 3));
        assert!(outcome.is_cancelled());
        let TaskOutcome::Failed { result, .. } = outcome else {
            panic!("expected failure");
        };
        assert!(result.and_then(|r| r.as_backtest().cloned()).is_some());
    }
}
