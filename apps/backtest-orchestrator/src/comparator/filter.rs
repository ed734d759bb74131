//! Predicate filtering.

use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestResult;
use crate::error::{OrchestratorError, Result};

/// One recognized filter constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum Constraint {
    /// Win rate percent at least this.
    MinWinRate(Decimal),
    /// Max drawdown percent magnitude at most this.
    MaxDrawdown(Decimal),
    /// At least this many closed trades.
    MinTradeCount(u64),
    /// Total return percent at least this.
    MinTotalReturn(Decimal),
    /// Sharpe ratio at least this.
    MinSharpeRatio(Decimal),
    /// Profit factor at least this.
    MinProfitFactor(Decimal),
}

impl Constraint {
    /// Recognized keys.
    pub const KEYS: [&'static str; 6] = [
        "min_win_rate",
        "max_drawdown",
        "min_trade_count",
        "min_total_return",
        "min_sharpe_ratio",
        "min_profit_factor",
    ];

    /// Build a constraint from its key.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an unknown key or a trade count that
    /// is not a non-negative integer.
    pub fn parse(key: &str, value: Decimal) -> Result<Self> {
        let constraint = match key.trim() {
            "min_win_rate" => Self::MinWinRate(value),
            "max_drawdown" => Self::MaxDrawdown(value.abs()),
            "min_trade_count" => {
                let count = (value.fract().is_zero())
                    .then(|| value.to_u64())
                    .flatten()
                    .ok_or_else(|| {
                        OrchestratorError::validation(format!(
                            "min_trade_count must be a non-negative integer, got {value}"
                        ))
                    })?;
                Self::MinTradeCount(count)
            }
            "min_total_return" => Self::MinTotalReturn(value),
            "min_sharpe_ratio" => Self::MinSharpeRatio(value),
            "min_profit_factor" => Self::MinProfitFactor(value),
            other => {
                return Err(OrchestratorError::validation(format!(
                    "unknown filter key '{other}', expected one of: {}",
                    Self::KEYS.join(", ")
                )));
            }
        };
        Ok(constraint)
    }

    /// Whether a completed result satisfies the constraint. A missing metric
    /// never satisfies it.
    fn accepts(&self, result: &BacktestResult) -> bool {
        let metrics = &result.metrics;
        match *self {
            Self::MinWinRate(min) => metrics.win_rate >= min,
            Self::MaxDrawdown(max) => metrics.max_drawdown_pct.is_some_and(|dd| dd.abs() <= max),
            Self::MinTradeCount(min) => metrics.total_trades.is_some_and(|n| n >= min),
            Self::MinTotalReturn(min) => metrics.total_return_pct.is_some_and(|v| v >= min),
            Self::MinSharpeRatio(min) => metrics.sharpe_ratio.is_some_and(|v| v >= min),
            Self::MinProfitFactor(min) => metrics.profit_factor.is_some_and(|v| v >= min),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MinWinRate(v) => write!(f, "min_win_rate={v}"),
            Self::MaxDrawdown(v) => write!(f, "max_drawdown={v}"),
            Self::MinTradeCount(v) => write!(f, "min_trade_count={v}"),
            Self::MinTotalReturn(v) => write!(f, "min_total_return={v}"),
            Self::MinSharpeRatio(v) => write!(f, "min_sharpe_ratio={v}"),
            Self::MinProfitFactor(v) => write!(f, "min_profit_factor={v}"),
        }
    }
}

/// A conjunction of constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    constraints: Vec<Constraint>,
}

impl FilterSpec {
    /// Empty filter; accepts every result.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            constraints: Vec::new(),
        }
    }

    /// Build from `(key, value)` pairs.
    ///
    /// # Errors
    ///
    /// Returns a validation error for any unrecognized key.
    pub fn from_pairs<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Decimal)>,
        K: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(key, value)| Constraint::parse(key.as_ref(), value))
            .collect::<Result<Vec<_>>>()
            .map(|constraints| Self { constraints })
    }

    /// Add a constraint.
    #[must_use]
    pub fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    /// Require a minimum win rate percent.
    #[must_use]
    pub fn min_win_rate(self, min: Decimal) -> Self {
        self.with(Constraint::MinWinRate(min))
    }

    /// Require a maximum drawdown percent magnitude.
    #[must_use]
    pub fn max_drawdown(self, max: Decimal) -> Self {
        self.with(Constraint::MaxDrawdown(max.abs()))
    }

    /// Require a minimum trade count.
    #[must_use]
    pub fn min_trade_count(self, min: u64) -> Self {
        self.with(Constraint::MinTradeCount(min))
    }

    /// Require a minimum total return percent.
    #[must_use]
    pub fn min_total_return(self, min: Decimal) -> Self {
        self.with(Constraint::MinTotalReturn(min))
    }

    /// Constraints in insertion order.
    #[must_use]
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Whether there are no constraints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Whether `result` passes every constraint. Failed runs pass only an
    /// empty filter.
    #[must_use]
    pub fn matches(&self, result: &BacktestResult) -> bool {
        if self.is_empty() {
            return true;
        }
        result.is_completed() && self.constraints.iter().all(|c| c.accepts(result))
    }
}

/// Results passing `spec`, in input order.
#[must_use]
pub fn filter<'a>(results: &'a [BacktestResult], spec: &FilterSpec) -> Vec<&'a BacktestResult> {
    results.iter().filter(|r| spec.matches(r)).collect()
}
