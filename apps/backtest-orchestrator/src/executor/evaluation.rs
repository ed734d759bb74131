//! Evaluation runs.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{EngineExecutor, classify, record_run};
use crate::backtest::{BacktestConfig, BacktestResult, ExecutionFailure, FailureKind, TaskKind};
use crate::engine::{EngineCommand, run_process};
use crate::observability::record_engine_run;
use crate::parser::EngineOutput;

impl EngineExecutor {
    /// Run one evaluation through the engine.
    ///
    /// Never fails: every failure mode is folded into a FAILED
    /// [`BacktestResult`] carrying the diagnosis.
    pub async fn run_backtest(
        &self,
        task_id: &str,
        strategy_id: &str,
        config: &BacktestConfig,
        cancel: &CancellationToken,
    ) -> BacktestResult {
        let files = match self.prepare(task_id, strategy_id, config).await {
            Ok(files) => files,
            Err(failure) => {
                warn!(task_id, strategy_id, error = %failure, "Could not prepare evaluation run");
                return BacktestResult::failed(strategy_id, failure, 0);
            }
        };

        let command = EngineCommand::backtesting(
            &self.settings,
            &files.config,
            strategy_id,
            &config.timerange(),
            &files.export,
        );

        let output = match run_process(
            &command,
            self.settings.backtest_timeout(),
            self.settings.kill_grace(),
            cancel,
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(task_id, strategy_id, error = %e, "Engine process could not be run");
                record_engine_run(TaskKind::Evaluation.label(), "spawn_error", 0.0);
                return BacktestResult::failed(
                    strategy_id,
                    ExecutionFailure::new(FailureKind::SpawnFailed, e.to_string()),
                    0,
                );
            }
        };
        record_run(&TaskKind::Evaluation, &output);
        let duration_ms = output.duration_ms();

        if let Some(failure) = classify(&output, self.settings.backtest_timeout_secs) {
            warn!(task_id, strategy_id, duration_ms, error = %failure, "Evaluation run failed");
            return BacktestResult::failed(strategy_id, failure, duration_ms);
        }

        let export = match tokio::fs::read_to_string(&files.export).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(task_id, path = %files.export.display(), error = %e, "No export file");
                None
            }
        };
        let engine_output = EngineOutput {
            strategy_id,
            console: &output.stdout,
            export: export.as_deref(),
        };

        match self.parser.parse(&engine_output) {
            Ok(parsed) => {
                info!(
                    task_id,
                    strategy_id,
                    duration_ms,
                    parser = self.parser.name(),
                    total_trades = parsed.metrics.total_trades,
                    "Evaluation run completed"
                );
                BacktestResult::completed(strategy_id, parsed.metrics, parsed.trades, duration_ms)
            }
            Err(e) => {
                warn!(task_id, strategy_id, error = %e, "Evaluation output could not be parsed");
                BacktestResult::failed(
                    strategy_id,
                    ExecutionFailure::new(FailureKind::OutputUnreadable, e.to_string()),
                    duration_ms,
                )
            }
        }
    }
}
