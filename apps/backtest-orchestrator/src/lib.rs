// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Backtest Orchestrator
//!
//! Runs many evaluations of trading strategies through an external
//! command-line backtesting engine and compares the results.
//!
//! # Architecture
//!
//! - **Scheduler** (`scheduler`): bounded worker pool, FIFO dispatch, task
//!   registry, cancellation and graceful shutdown
//! - **Executors** (`executor`): evaluation and hyperopt runs behind the
//!   `TaskExecutor` port
//! - **Engine plumbing** (`engine`): per-task files, engine config document,
//!   command construction, process supervision with timeout and kill
//! - **Parser** (`parser`): tolerant extraction of metrics from console text
//!   and export documents
//! - **Comparator** (`comparator`): ranking, filtering, matrix and summary
//!
//! Ambient concerns: `config` (YAML with env interpolation), `telemetry`
//! (tracing + OTLP), `observability` (Prometheus), `error`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use backtest_orchestrator::{EngineExecutor, TaskKind, TaskScheduler, load_config};
//!
//! let config = load_config(None)?;
//! let executor = Arc::new(EngineExecutor::from_config(&config));
//! let scheduler = TaskScheduler::start(&config.scheduler, executor)?;
//! let id = scheduler.submit(TaskKind::Evaluation, "SampleStrategy", backtest_config)?;
//! let task = scheduler.wait_for(&id).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Modules
// =============================================================================

/// Backtest domain types: configuration, metrics, results.
pub mod backtest;

/// Ranking, filtering and comparison of results.
pub mod comparator;

/// Orchestrator configuration loading.
pub mod config;

/// External engine plumbing.
pub mod engine;

/// Error types.
pub mod error;

/// Evaluation and hyperopt executors.
pub mod executor;

/// Prometheus metrics.
pub mod observability;

/// Engine output parsing.
pub mod parser;

/// YAML sweep plans.
pub mod plan;

/// Bounded-concurrency task scheduler.
pub mod scheduler;

/// Tracing and OpenTelemetry setup.
pub mod telemetry;

// =============================================================================
// Re-exports
// =============================================================================

pub use backtest::{
    BacktestConfig, BacktestResult, ExecutionFailure, FailureKind, HyperoptResult,
    PerformanceMetrics, RunStatus, SearchParams, TaskKind, TaskResult,
};
pub use comparator::{
    FilterSpec, MetricWeights, PerformanceMatrix, RiskReturnAnalysis, SortKey, build_matrix,
    filter, rank_weighted, risk_return, top_n,
};
pub use config::{Config, ConfigError, load_config};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use executor::{EngineExecutor, ExecutionRequest, TaskExecutor, TaskOutcome};
pub use parser::{ConsoleTextParser, ExportOnlyParser, ResultParser};
pub use plan::{PlanError, SweepPlan, load_plan};
pub use scheduler::{SchedulerStatistics, Task, TaskRequest, TaskScheduler, TaskStatus};
