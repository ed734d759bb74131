//! Parameter search runs.
//!
//! The engine is expected to write a single JSON results document to the
//! `--export-filename` path. Running and reading are separate steps:
//! [`EngineExecutor::run_hyperopt`] fails with an execution error, while
//! [`parse_results`] fails with a data error.

use std::io;
use std::path::Path;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{EngineExecutor, ExecutionRequest, TaskOutcome, classify, record_run};
use crate::backtest::{
    BacktestConfig, DegradedResult, ExecutionFailure, FailureKind, HyperoptResult, SearchParams,
    TaskKind, TaskResult,
};
use crate::engine::{EngineCommand, TaskFiles, run_process};
use crate::error::{OrchestratorError, Result};
use crate::observability::{record_engine_run, record_parse_fallback};
use crate::parser::{EngineOutput, parse_hyperopt_document};

/// A search run that exited cleanly. Holds the task files until dropped.
#[derive(Debug)]
pub struct HyperoptRun {
    files: TaskFiles,
    /// Captured console output.
    pub stdout: String,
    /// Wall-clock time from spawn to exit, in milliseconds.
    pub duration_ms: u64,
}

impl HyperoptRun {
    /// Where the engine was told to write its results.
    #[must_use]
    pub fn results_path(&self) -> &Path {
        &self.files.results
    }
}

/// Read and parse a search results file.
///
/// Side-effect free: repeated calls on an unchanged file return equal
/// results.
///
/// # Errors
///
/// Returns a data error when the file is missing, unreadable, not JSON, or
/// lacks `best_params`, `results_metrics` or the sample list.
pub fn parse_results(path: &Path) -> Result<HyperoptResult> {
    let text = std::fs::read_to_string(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => {
            OrchestratorError::data(format!("results file not found: {}", path.display()))
        }
        _ => OrchestratorError::data(format!("could not read {}: {e}", path.display())),
    })?;

    parse_hyperopt_document(&text)
        .map_err(|e| OrchestratorError::data(format!("{}: {e}", path.display())))
}

impl EngineExecutor {
    /// Run a parameter search through the engine.
    ///
    /// # Errors
    ///
    /// Returns an execution error when the engine cannot be started, exits
    /// non-zero, times out or is cancelled.
    pub async fn run_hyperopt(
        &self,
        task_id: &str,
        strategy_id: &str,
        config: &BacktestConfig,
        search: &SearchParams,
        cancel: &CancellationToken,
    ) -> Result<HyperoptRun> {
        let kind = TaskKind::ParameterSearch(search.clone());
        let files = self.prepare(task_id, strategy_id, config).await?;

        let command = EngineCommand::hyperopt(
            &self.settings,
            &files.config,
            strategy_id,
            search,
            &files.results,
        );

        let output = run_process(
            &command,
            self.settings.hyperopt_timeout(),
            self.settings.kill_grace(),
            cancel,
        )
        .await
        .map_err(|e| {
            record_engine_run(kind.label(), "spawn_error", 0.0);
            ExecutionFailure::new(FailureKind::SpawnFailed, e.to_string())
        })?;
        record_run(&kind, &output);

        if let Some(failure) = classify(&output, self.settings.hyperopt_timeout_secs) {
            warn!(task_id, strategy_id, error = %failure, "Search run failed");
            return Err(failure.into());
        }

        info!(
            task_id,
            strategy_id,
            epochs = search.epochs,
            duration_ms = output.duration_ms(),
            "Search run exited cleanly"
        );
        Ok(HyperoptRun {
            duration_ms: output.duration_ms(),
            stdout: output.stdout,
            files,
        })
    }

    /// Run a search and read its results. A clean exit with an unreadable
    /// results file yields a degraded result rather than a failure.
    pub(super) async fn execute_search(
        &self,
        request: &ExecutionRequest,
        search: &SearchParams,
        cancel: &CancellationToken,
    ) -> TaskOutcome {
        let run = match self
            .run_hyperopt(&request.task_id, &request.strategy_id, &request.config, search, cancel)
            .await
        {
            Ok(run) => run,
            Err(OrchestratorError::Execution(error)) => {
                return TaskOutcome::Failed {
                    error,
                    result: None,
                };
            }
            Err(other) => {
                return TaskOutcome::Failed {
                    error: ExecutionFailure::new(FailureKind::SpawnFailed, other.to_string()),
                    result: None,
                };
            }
        };

        match parse_results(run.results_path()) {
            Ok(result) => TaskOutcome::Finished(TaskResult::Search(result)),
            Err(e) => {
                warn!(
                    task_id = %request.task_id,
                    strategy_id = %request.strategy_id,
                    error = %e,
                    "Search results unreadable, recording degraded result"
                );
                record_parse_fallback("hyperopt_results");
                let metrics = self
                    .parser
                    .parse(&EngineOutput::console_only(&request.strategy_id, &run.stdout))
                    .map(|parsed| parsed.metrics)
                    .unwrap_or_default();
                TaskOutcome::Finished(TaskResult::Degraded(DegradedResult {
                    strategy_id: request.strategy_id.clone(),
                    reason: e.to_string(),
                    metrics,
                    results_path: Some(run.results_path().to_path_buf()),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    const DOCUMENT: &str = r#"{
        "best_params": {"buy_rsi": 28, "sell_rsi": 71},
        "results_metrics": {"profit_total_pct": 12.5, "max_drawdown_pct": 5.0,
                            "total_trades": 20, "wins": 12, "losses": 8},
        "hyperopt_results": [
            {"params": {"buy_rsi": 30}, "loss": -0.8},
            {"params": {"buy_rsi": 28}, "loss": -1.2}
        ]
    }"#;

    fn write_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_results_reads_document() {
        let file = write_file(DOCUMENT);
        let result = parse_results(file.path()).unwrap();
        assert_eq!(result.best_params["buy_rsi"].as_int(), Some(28));
        assert_eq!(result.samples.len(), 2);
        assert_eq!(result.metrics.total_trades, Some(20));
    }

    #[test]
    fn test_parse_results_is_idempotent() {
        let file = write_file(DOCUMENT);
        assert_eq!(
            parse_results(file.path()).unwrap(),
            parse_results(file.path()).unwrap()
        );
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let Err(err) = parse_results(&dir.path().join("nope.json")) else {
            panic!("missing file should fail");
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_missing_best_params_is_data_error() {
        let file = write_file(r#"{"results_metrics": {}, "hyperopt_results": []}"#);
        let Err(err) = parse_results(file.path()) else {
            panic!("missing best_params should fail");
        };
        assert_eq!(err.kind(), ErrorKind::Data);
        assert!(err.to_string().contains("best_params"));
    }

    #[test]
    fn test_invalid_json_is_data_error() {
        let file = write_file("{not json");
        assert!(matches!(
            parse_results(file.path()),
            Err(OrchestratorError::Data { .. })
        ));
    }
}
