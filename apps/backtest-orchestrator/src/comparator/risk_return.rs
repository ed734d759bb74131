//! Risk/return quadrants.
//!
//! Completed runs that report both total return percent and max drawdown
//! percent are split around the medians of those two values. A run sitting
//! exactly on a median counts as high return or low risk respectively.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::backtest::BacktestResult;

/// Position relative to the median return and median drawdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quadrant {
    /// Return at or above median, drawdown at or below median.
    HighReturnLowRisk,
    /// Return at or above median, drawdown above median.
    HighReturnHighRisk,
    /// Return below median, drawdown at or below median.
    LowReturnLowRisk,
    /// Return below median, drawdown above median.
    LowReturnHighRisk,
}

impl Quadrant {
    fn classify(return_pct: Decimal, drawdown_pct: Decimal, medians: (Decimal, Decimal)) -> Self {
        let (median_return, median_drawdown) = medians;
        match (return_pct >= median_return, drawdown_pct <= median_drawdown) {
            (true, true) => Self::HighReturnLowRisk,
            (true, false) => Self::HighReturnHighRisk,
            (false, true) => Self::LowReturnLowRisk,
            (false, false) => Self::LowReturnHighRisk,
        }
    }
}

/// Strategy ids grouped by quadrant, each list in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskReturnAnalysis {
    /// Median total return percent of the classified runs.
    pub median_return_pct: Option<Decimal>,
    /// Median drawdown percent magnitude of the classified runs.
    pub median_drawdown_pct: Option<Decimal>,
    /// See [`Quadrant::HighReturnLowRisk`].
    pub high_return_low_risk: Vec<String>,
    /// See [`Quadrant::HighReturnHighRisk`].
    pub high_return_high_risk: Vec<String>,
    /// See [`Quadrant::LowReturnLowRisk`].
    pub low_return_low_risk: Vec<String>,
    /// See [`Quadrant::LowReturnHighRisk`].
    pub low_return_high_risk: Vec<String>,
    /// Failed runs and runs missing either metric.
    pub unclassified: Vec<String>,
}

impl RiskReturnAnalysis {
    /// Strategies in one quadrant.
    #[must_use]
    pub fn members(&self, quadrant: Quadrant) -> &[String] {
        match quadrant {
            Quadrant::HighReturnLowRisk => &self.high_return_low_risk,
            Quadrant::HighReturnHighRisk => &self.high_return_high_risk,
            Quadrant::LowReturnLowRisk => &self.low_return_low_risk,
            Quadrant::LowReturnHighRisk => &self.low_return_high_risk,
        }
    }

    /// Quadrant a strategy landed in.
    #[must_use]
    pub fn quadrant_of(&self, strategy_id: &str) -> Option<Quadrant> {
        [
            Quadrant::HighReturnLowRisk,
            Quadrant::HighReturnHighRisk,
            Quadrant::LowReturnLowRisk,
            Quadrant::LowReturnHighRisk,
        ]
        .into_iter()
        .find(|q| self.members(*q).iter().any(|id| id == strategy_id))
    }

    fn push(&mut self, quadrant: Quadrant, strategy_id: String) {
        match quadrant {
            Quadrant::HighReturnLowRisk => self.high_return_low_risk.push(strategy_id),
            Quadrant::HighReturnHighRisk => self.high_return_high_risk.push(strategy_id),
            Quadrant::LowReturnLowRisk => self.low_return_low_risk.push(strategy_id),
            Quadrant::LowReturnHighRisk => self.low_return_high_risk.push(strategy_id),
        }
    }
}

fn median(mut values: Vec<Decimal>) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        return Some(values[mid]);
    }
    // Halve first so the sum cannot overflow.
    Some(values[mid - 1] / Decimal::TWO + values[mid] / Decimal::TWO)
}

/// Classify results into risk/return quadrants.
#[must_use]
pub fn risk_return(results: &[BacktestResult]) -> RiskReturnAnalysis {
    let mut analysis = RiskReturnAnalysis::default();

    let mut points = Vec::new();
    for result in results {
        let metrics = &result.metrics;
        match (result.is_completed(), metrics.total_return_pct, metrics.max_drawdown_pct) {
            (true, Some(ret), Some(dd)) => points.push((result.strategy_id.as_str(), ret, dd.abs())),
            _ => analysis.unclassified.push(result.strategy_id.clone()),
        }
    }

    let (Some(median_return), Some(median_drawdown)) = (
        median(points.iter().map(|(_, ret, _)| *ret).collect()),
        median(points.iter().map(|(_, _, dd)| *dd).collect()),
    ) else {
        return analysis;
    };
    analysis.median_return_pct = Some(median_return);
    analysis.median_drawdown_pct = Some(median_drawdown);

    for (strategy_id, ret, dd) in points {
        let quadrant = Quadrant::classify(ret, dd, (median_return, median_drawdown));
        analysis.push(quadrant, strategy_id.to_string());
    }
    analysis
}
