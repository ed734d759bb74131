//! Backtest domain types.
//!
//! Configuration handed in by callers, and the metrics and result records
//! handed back out by executors.

mod config;
mod metrics;
mod request;
mod result;

pub use config::{BacktestConfig, StakeAmount, VALID_TIMEFRAMES};
pub use metrics::{
    HUNDRED, MetricField, PerformanceMetrics, TradeRecord, format_metric,
};
pub use request::{DEFAULT_EPOCHS, DEFAULT_LOSS, SearchParams, TaskKind};
pub use result::{
    BacktestResult, DegradedResult, ExecutionFailure, FailureKind, HyperoptResult,
    HyperoptSample, ParamSet, ParamValue, RunStatus, TaskResult,
};
