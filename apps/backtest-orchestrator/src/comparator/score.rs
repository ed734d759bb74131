//! Weighted composite scoring.
//!
//! Each weighted metric is normalized so that higher is better: drawdowns map
//! to `1 / (1 + |drawdown|)`, everything else is clamped at zero. The score is
//! the weighted sum of the normalized values. A metric the run did not report
//! contributes nothing. Failed runs have no score and rank last.

use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::backtest::{BacktestResult, MetricField};
use crate::error::{OrchestratorError, Result};

/// Decimal places kept on scores.
const SCORE_DP: u32 = 6;

/// Metric weights for the composite score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricWeights {
    weights: Vec<(MetricField, Decimal)>,
}

impl Default for MetricWeights {
    fn default() -> Self {
        Self {
            weights: vec![
                (MetricField::TotalReturnPct, dec!(0.30)),
                (MetricField::WinRate, dec!(0.20)),
                (MetricField::MaxDrawdownPct, dec!(0.20)),
                (MetricField::SharpeRatio, dec!(0.15)),
                (MetricField::TotalTrades, dec!(0.10)),
            ],
        }
    }
}

impl MetricWeights {
    /// Build a custom weighting.
    ///
    /// # Errors
    ///
    /// Returns a validation error when no weight is given, a weight is
    /// negative, or a metric appears twice.
    pub fn new<I>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (MetricField, Decimal)>,
    {
        let weights: Vec<(MetricField, Decimal)> = weights.into_iter().collect();
        if weights.is_empty() {
            return Err(OrchestratorError::validation(
                "at least one metric weight is required",
            ));
        }
        let mut seen = HashSet::new();
        for (field, weight) in &weights {
            if *weight < Decimal::ZERO {
                return Err(OrchestratorError::validation(format!(
                    "weight for {field} must not be negative"
                )));
            }
            if !seen.insert(*field) {
                return Err(OrchestratorError::validation(format!(
                    "metric {field} is weighted twice"
                )));
            }
        }
        Ok(Self { weights })
    }

    /// Weights in the order given.
    #[must_use]
    pub fn weights(&self) -> &[(MetricField, Decimal)] {
        &self.weights
    }
}

fn normalized(field: MetricField, value: Decimal) -> Decimal {
    match field {
        MetricField::MaxDrawdown | MetricField::MaxDrawdownPct => Decimal::ONE
            .checked_div(Decimal::ONE.saturating_add(value.abs()))
            .unwrap_or(Decimal::ZERO),
        _ => value.max(Decimal::ZERO),
    }
}

/// Composite score of one result, `None` for a failed run.
#[must_use]
pub fn score(result: &BacktestResult, weights: &MetricWeights) -> Option<Decimal> {
    if !result.is_completed() {
        return None;
    }
    let total = weights
        .weights
        .iter()
        .filter_map(|(field, weight)| {
            result
                .metrics
                .get(*field)
                .map(|value| normalized(*field, value).saturating_mul(*weight))
        })
        .fold(Decimal::ZERO, Decimal::saturating_add);
    Some(total.round_dp(SCORE_DP))
}

/// One entry of a weighted ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeightedRank<'a> {
    /// 1-based position.
    pub rank: usize,
    /// Composite score, `None` for failed runs.
    pub score: Option<Decimal>,
    /// The ranked result.
    pub result: &'a BacktestResult,
}

/// Rank results by composite score, highest first. Ties fall back to
/// strategy id ascending.
#[must_use]
pub fn rank_weighted<'a>(results: &'a [BacktestResult], weights: &MetricWeights) -> Vec<WeightedRank<'a>> {
    let mut scored: Vec<(Option<Decimal>, &BacktestResult)> =
        results.iter().map(|r| (score(r, weights), r)).collect();
    scored.sort_by(|(sa, a), (sb, b)| {
        let by_score = match (sa, sb) {
            (Some(x), Some(y)) => y.cmp(x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        };
        by_score.then_with(|| a.strategy_id.cmp(&b.strategy_id))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, result))| WeightedRank {
            rank: i + 1,
            score,
            result,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::backtest::{ExecutionFailure, FailureKind, PerformanceMetrics};

    fn run(id: &str, ret: Decimal, win_rate: Decimal, drawdown: Decimal) -> BacktestResult {
        let metrics = PerformanceMetrics {
            total_return_pct: Some(ret),
            win_rate,
            max_drawdown_pct: Some(drawdown),
            total_trades: Some(10),
            ..PerformanceMetrics::default()
        };
        BacktestResult::completed(id, metrics, Vec::new(), 1)
    }

    fn failed(id: &str) -> BacktestResult {
        BacktestResult::failed(
            id,
            ExecutionFailure::new(FailureKind::NonZeroExit { code: Some(1) }, "boom"),
            1,
        )
    }

    #[test]
    fn test_single_metric_score() {
        let weights = MetricWeights::new([(MetricField::TotalReturnPct, dec!(1))]).unwrap();
        assert_eq!(score(&run("A", dec!(12.5), dec!(50), dec!(3)), &weights), Some(dec!(12.5)));
        // Losses do not push a score below zero.
        assert_eq!(score(&run("B", dec!(-8), dec!(50), dec!(3)), &weights), Some(Decimal::ZERO));
        assert_eq!(score(&failed("C"), &weights), None);
    }

    #[test]
    fn test_drawdown_lower_is_better() {
        let weights = MetricWeights::new([(MetricField::MaxDrawdownPct, dec!(1))]).unwrap();
        assert_eq!(score(&run("A", dec!(0), dec!(0), dec!(4)), &weights), Some(dec!(0.2)));
        assert_eq!(score(&run("B", dec!(0), dec!(0), dec!(-9)), &weights), Some(dec!(0.1)));
        assert_eq!(score(&run("C", dec!(0), dec!(0), dec!(0)), &weights), Some(dec!(1)));
    }

    #[test]
    fn test_default_weights() {
        let result = run("A", dec!(10), dec!(50), dec!(4));
        // 0.3*10 + 0.2*50 + 0.2*(1/5) + 0.1*10, no sharpe reported.
        assert_eq!(score(&result, &MetricWeights::default()), Some(dec!(14.04)));
    }

    #[test]
    fn test_rank_weighted_orders_and_numbers() {
        let results = vec![
            failed("Broken"),
            run("Low", dec!(5), dec!(40), dec!(10)),
            run("High", dec!(30), dec!(60), dec!(5)),
            run("AlsoLow", dec!(5), dec!(40), dec!(10)),
        ];
        let ranking = rank_weighted(&results, &MetricWeights::default());
        let order: Vec<(usize, &str)> = ranking
            .iter()
            .map(|r| (r.rank, r.result.strategy_id.as_str()))
            .collect();
        assert_eq!(order, [(1, "High"), (2, "AlsoLow"), (3, "Low"), (4, "Broken")]);
        assert_eq!(ranking[3].score, None);
    }

    #[test]
    fn test_invalid_weights() {
        assert!(MetricWeights::new(Vec::<(MetricField, Decimal)>::new()).is_err());
        assert!(MetricWeights::new([(MetricField::WinRate, dec!(-0.1))]).is_err());
        assert!(
            MetricWeights::new([(MetricField::WinRate, dec!(0.5)), (MetricField::WinRate, dec!(0.5))])
                .is_err()
        );
        assert!(MetricWeights::new([(MetricField::SharpeRatio, Decimal::ZERO)]).is_ok());
    }

    proptest! {
        #[test]
        fn prop_scores_are_non_negative(
            ret in -100_000i64..100_000,
            win in 0i64..10_000,
            dd in -10_000i64..10_000,
        ) {
            let result = run("P", Decimal::new(ret, 2), Decimal::new(win, 2), Decimal::new(dd, 2));
            let value = score(&result, &MetricWeights::default()).unwrap();
            prop_assert!(value >= Decimal::ZERO);
        }
    }
}
