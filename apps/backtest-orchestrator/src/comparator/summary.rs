//! Aggregate view over a result set.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::sort::{SortKey, sort};
use crate::backtest::BacktestResult;

/// Decimal places kept on averages.
const AVERAGE_DP: u32 = 4;

/// Summary of a comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    /// Results considered.
    pub count: usize,
    /// Completed runs.
    pub completed: usize,
    /// Failed runs.
    pub failed: usize,
    /// Strategy with the highest total return percent.
    pub best_strategy: Option<String>,
    /// Its total return percent.
    pub best_total_return_pct: Option<Decimal>,
    /// Mean win rate over completed runs.
    pub avg_win_rate: Option<Decimal>,
    /// Mean total return percent where reported.
    pub avg_total_return_pct: Option<Decimal>,
    /// Mean Sharpe ratio where reported.
    pub avg_sharpe_ratio: Option<Decimal>,
}

/// Mean of the values; `None` when empty or when the sum overflows.
fn mean(values: impl Iterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, n) = values.fold((Some(Decimal::ZERO), 0u32), |(sum, n), v| {
        (sum.and_then(|s| s.checked_add(v)), n + 1)
    });
    if n == 0 {
        return None;
    }
    sum?.checked_div(Decimal::from(n)).map(|v| v.round_dp(AVERAGE_DP))
}

/// Summarize a result set.
#[must_use]
pub fn summarize(results: &[BacktestResult]) -> ComparisonSummary {
    let completed: Vec<&BacktestResult> = results.iter().filter(|r| r.is_completed()).collect();

    let best = sort(results, SortKey::TotalReturn, true)
        .into_iter()
        .find(|r| SortKey::TotalReturn.value(r).is_some());

    ComparisonSummary {
        count: results.len(),
        completed: completed.len(),
        failed: results.len() - completed.len(),
        best_strategy: best.map(|r| r.strategy_id.clone()),
        best_total_return_pct: best.and_then(|r| r.metrics.total_return_pct),
        avg_win_rate: mean(completed.iter().map(|r| r.metrics.win_rate)),
        avg_total_return_pct: mean(completed.iter().filter_map(|r| r.metrics.total_return_pct)),
        avg_sharpe_ratio: mean(completed.iter().filter_map(|r| r.metrics.sharpe_ratio)),
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::backtest::{ExecutionFailure, FailureKind, PerformanceMetrics};

    #[test]
    fn test_summary() {
        let a = PerformanceMetrics {
            total_return_pct: Some(dec!(10)),
            win_rate: dec!(40),
            sharpe_ratio: Some(dec!(1.5)),
            ..PerformanceMetrics::default()
        };
        let b = PerformanceMetrics {
            total_return_pct: Some(dec!(30)),
            win_rate: dec!(60),
            ..PerformanceMetrics::default()
        };
        let results = vec![
            BacktestResult::completed("A", a, Vec::new(), 1),
            BacktestResult::completed("B", b, Vec::new(), 1),
            BacktestResult::failed(
                "C",
                ExecutionFailure::new(FailureKind::Timeout { seconds: 5 }, "killed"),
                5000,
            ),
        ];

        let summary = summarize(&results);
        assert_eq!(summary.count, 3);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.best_strategy.as_deref(), Some("B"));
        assert_eq!(summary.best_total_return_pct, Some(dec!(30)));
        assert_eq!(summary.avg_win_rate, Some(dec!(50)));
        assert_eq!(summary.avg_total_return_pct, Some(dec!(20)));
        assert_eq!(summary.avg_sharpe_ratio, Some(dec!(1.5)));
    }

    #[test]
    fn test_overflowing_average_is_absent() {
        let huge = PerformanceMetrics {
            total_return_pct: Some(Decimal::MAX),
            win_rate: dec!(50),
            ..PerformanceMetrics::default()
        };
        let results = vec![
            BacktestResult::completed("A", huge.clone(), Vec::new(), 1),
            BacktestResult::completed("B", huge, Vec::new(), 1),
        ];
        let summary = summarize(&results);
        assert_eq!(summary.avg_total_return_pct, None);
        assert_eq!(summary.avg_win_rate, Some(dec!(50)));
    }

    #[test]
    fn test_empty_summary() {
        let summary = summarize(&[]);
        assert_eq!(summary, ComparisonSummary::default());
    }
}
