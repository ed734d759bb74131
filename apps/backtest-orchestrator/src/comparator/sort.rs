//! Ranking by a sort key.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestResult;
use crate::error::{OrchestratorError, Result};

/// Metric a ranking is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    /// Total return percent.
    TotalReturn,
    /// Win rate percent.
    WinRate,
    /// Sharpe ratio.
    SharpeRatio,
    /// Max drawdown percent, by magnitude.
    MaxDrawdown,
    /// Closed trade count.
    TradeCount,
    /// Profit factor.
    ProfitFactor,
}

impl SortKey {
    /// Every key.
    pub const ALL: [Self; 6] = [
        Self::TotalReturn,
        Self::WinRate,
        Self::SharpeRatio,
        Self::MaxDrawdown,
        Self::TradeCount,
        Self::ProfitFactor,
    ];

    /// Key name as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TotalReturn => "total_return",
            Self::WinRate => "win_rate",
            Self::SharpeRatio => "sharpe_ratio",
            Self::MaxDrawdown => "max_drawdown",
            Self::TradeCount => "trade_count",
            Self::ProfitFactor => "profit_factor",
        }
    }

    /// The value ranked on. Failed runs have no value for any key.
    #[must_use]
    pub fn value(&self, result: &BacktestResult) -> Option<Decimal> {
        if !result.is_completed() {
            return None;
        }
        let metrics = &result.metrics;
        match self {
            Self::TotalReturn => metrics.total_return_pct,
            Self::WinRate => Some(metrics.win_rate),
            Self::SharpeRatio => metrics.sharpe_ratio,
            Self::MaxDrawdown => metrics.max_drawdown_pct.map(|v| v.abs()),
            Self::TradeCount => metrics.total_trades.map(Decimal::from),
            Self::ProfitFactor => metrics.profit_factor,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SortKey {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|key| key.name() == normalized)
            .ok_or_else(|| {
                let names: Vec<&str> = Self::ALL.iter().map(SortKey::name).collect();
                OrchestratorError::validation(format!(
                    "unknown sort key '{s}', expected one of: {}",
                    names.join(", ")
                ))
            })
    }
}

/// Order two results. Missing values go last in either direction; ties fall
/// back to strategy id ascending.
fn compare(a: &BacktestResult, b: &BacktestResult, key: SortKey, descending: bool) -> Ordering {
    let by_value = match (key.value(a), key.value(b)) {
        (Some(x), Some(y)) if descending => y.cmp(&x),
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_value.then_with(|| a.strategy_id.cmp(&b.strategy_id))
}

/// Rank results by `key`.
#[must_use]
pub fn sort(results: &[BacktestResult], key: SortKey, descending: bool) -> Vec<&BacktestResult> {
    let mut ranked: Vec<&BacktestResult> = results.iter().collect();
    ranked.sort_by(|a, b| compare(a, b, key, descending));
    ranked
}

/// The first `n` results of [`sort`].
///
/// # Errors
///
/// Returns a validation error when `n` is zero.
pub fn top_n(
    results: &[BacktestResult],
    n: usize,
    key: SortKey,
    descending: bool,
) -> Result<Vec<&BacktestResult>> {
    if n == 0 {
        return Err(OrchestratorError::validation("n must be greater than 0"));
    }
    let mut ranked = sort(results, key, descending);
    ranked.truncate(n);
    Ok(ranked)
}
