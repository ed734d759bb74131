//! Extracted primary values and the derived-metric computations.

use rust_decimal::Decimal;

use crate::backtest::{HUNDRED, PerformanceMetrics, TradeRecord};

/// Scale used for derived ratios.
const DERIVED_DP: u32 = 4;

/// Primary values pulled from engine output before derivation.
///
/// Every field is optional: `None` means the engine never reported it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMetrics {
    pub total_return: Option<Decimal>,
    pub total_return_pct: Option<Decimal>,
    pub total_trades: Option<u64>,
    pub winning_trades: Option<u64>,
    pub losing_trades: Option<u64>,
    pub max_drawdown: Option<Decimal>,
    pub max_drawdown_pct: Option<Decimal>,
    pub sharpe_ratio: Option<Decimal>,
    pub sortino_ratio: Option<Decimal>,
    pub profit_factor: Option<Decimal>,
    pub gross_profit: Option<Decimal>,
    pub gross_loss: Option<Decimal>,
}

impl RawMetrics {
    /// Fill fields this record lacks from `other`. Existing values win.
    pub fn fill_gaps(&mut self, other: Self) {
        self.total_return = self.total_return.or(other.total_return);
        self.total_return_pct = self.total_return_pct.or(other.total_return_pct);
        self.total_trades = self.total_trades.or(other.total_trades);
        self.winning_trades = self.winning_trades.or(other.winning_trades);
        self.losing_trades = self.losing_trades.or(other.losing_trades);
        self.max_drawdown = self.max_drawdown.or(other.max_drawdown);
        self.max_drawdown_pct = self.max_drawdown_pct.or(other.max_drawdown_pct);
        self.sharpe_ratio = self.sharpe_ratio.or(other.sharpe_ratio);
        self.sortino_ratio = self.sortino_ratio.or(other.sortino_ratio);
        self.profit_factor = self.profit_factor.or(other.profit_factor);
        self.gross_profit = self.gross_profit.or(other.gross_profit);
        self.gross_loss = self.gross_loss.or(other.gross_loss);
    }

    /// Whether nothing at all was extracted.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Compute derived fields and produce the final metrics record.
    ///
    /// Trade counts missing from the reported values are taken from the
    /// export trade list when one is available, and stay `None` otherwise.
    pub fn finish(self, trades: &[TradeRecord]) -> PerformanceMetrics {
        let from_trades = |count: usize| (!trades.is_empty()).then_some(count as u64);

        let total_trades = self.total_trades.or_else(|| from_trades(trades.len()));
        let winning_trades = self
            .winning_trades
            .or_else(|| from_trades(trades.iter().filter(|t| t.is_winner()).count()));
        let losing_trades = self
            .losing_trades
            .or_else(|| from_trades(trades.iter().filter(|t| t.is_loser()).count()));

        let profit_factor = match (self.gross_profit, self.gross_loss) {
            (Some(profit), Some(loss)) => profit_factor(profit, loss),
            _ => self
                .profit_factor
                .or_else(|| trade_profit_factor(trades)),
        };

        PerformanceMetrics {
            total_return: self.total_return,
            total_return_pct: self.total_return_pct,
            total_trades,
            winning_trades,
            losing_trades,
            win_rate: win_rate(winning_trades.unwrap_or(0), total_trades.unwrap_or(0)),
            max_drawdown: self.max_drawdown,
            max_drawdown_pct: self.max_drawdown_pct,
            sharpe_ratio: self.sharpe_ratio,
            sortino_ratio: self.sortino_ratio,
            calmar_ratio: calmar_ratio(self.total_return_pct, self.max_drawdown_pct),
            profit_factor,
        }
    }
}

/// Winning trades as a percentage of total trades.
///
/// Zero when there are no trades; clamped to 100 when the engine reports
/// more winners than trades.
pub fn win_rate(winning_trades: u64, total_trades: u64) -> Decimal {
    if total_trades == 0 {
        return Decimal::ZERO;
    }
    let winners = Decimal::from(winning_trades.min(total_trades));
    winners
        .checked_mul(HUNDRED)
        .and_then(|v| v.checked_div(Decimal::from(total_trades)))
        .map_or(Decimal::ZERO, |v| v.round_dp(DERIVED_DP))
}

/// Return percent over the magnitude of the drawdown percent.
///
/// Undefined (`None`) when either input is missing or the drawdown is zero.
pub fn calmar_ratio(
    total_return_pct: Option<Decimal>,
    max_drawdown_pct: Option<Decimal>,
) -> Option<Decimal> {
    let drawdown = max_drawdown_pct?.abs();
    if drawdown.is_zero() {
        return None;
    }
    total_return_pct?
        .checked_div(drawdown)
        .map(|v| v.round_dp(DERIVED_DP))
}

/// Gross profit over the magnitude of gross loss; undefined for zero loss.
pub fn profit_factor(gross_profit: Decimal, gross_loss: Decimal) -> Option<Decimal> {
    let loss = gross_loss.abs();
    if loss.is_zero() {
        return None;
    }
    gross_profit
        .abs()
        .checked_div(loss)
        .map(|v| v.round_dp(DERIVED_DP))
}

fn trade_profit_factor(trades: &[TradeRecord]) -> Option<Decimal> {
    if trades.is_empty() {
        return None;
    }
    let gross_profit = checked_sum(trades.iter().filter(|t| t.is_winner()))?;
    let gross_loss = checked_sum(trades.iter().filter(|t| t.is_loser()))?;
    profit_factor(gross_profit, gross_loss)
}

/// Sum of trade profits; `None` when the total does not fit a `Decimal`.
fn checked_sum<'a>(mut trades: impl Iterator<Item = &'a TradeRecord>) -> Option<Decimal> {
    trades.try_fold(Decimal::ZERO, |acc, t| acc.checked_add(t.profit_abs))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use super::*;

    fn trade(profit: Decimal) -> TradeRecord {
        TradeRecord {
            pair: "BTC/USDT".to_string(),
            profit_abs: profit,
            ..TradeRecord::default()
        }
    }

    #[test]
    fn test_win_rate() {
        assert_eq!(win_rate(7, 15), dec!(46.6667));
        assert_eq!(win_rate(0, 0), Decimal::ZERO);
        assert_eq!(win_rate(5, 0), Decimal::ZERO);
        assert_eq!(win_rate(20, 10), dec!(100));
    }

    #[test]
    fn test_calmar_ratio_undefined_for_zero_drawdown() {
        assert_eq!(calmar_ratio(Some(dec!(25)), Some(dec!(10))), Some(dec!(2.5)));
        assert_eq!(calmar_ratio(Some(dec!(25)), Some(dec!(-10))), Some(dec!(2.5)));
        assert_eq!(calmar_ratio(Some(dec!(-5)), Some(dec!(10))), Some(dec!(-0.5)));
        assert_eq!(calmar_ratio(Some(dec!(25)), Some(Decimal::ZERO)), None);
        assert_eq!(calmar_ratio(Some(dec!(25)), None), None);
        assert_eq!(calmar_ratio(None, Some(dec!(10))), None);
    }

    #[test]
    fn test_profit_factor_sources() {
        let raw = RawMetrics {
            gross_profit: Some(dec!(300)),
            gross_loss: Some(dec!(-150)),
            profit_factor: Some(dec!(9)),
            ..RawMetrics::default()
        };
        assert_eq!(raw.finish(&[]).profit_factor, Some(dec!(2)));

        let raw = RawMetrics {
            profit_factor: Some(dec!(1.7)),
            ..RawMetrics::default()
        };
        assert_eq!(raw.finish(&[]).profit_factor, Some(dec!(1.7)));

        let trades = [trade(dec!(10)), trade(dec!(-4)), trade(dec!(2))];
        let metrics = RawMetrics::default().finish(&trades);
        assert_eq!(metrics.profit_factor, Some(dec!(3)));
        assert_eq!(metrics.total_trades, Some(3));
        assert_eq!(metrics.winning_trades, Some(2));
        assert_eq!(metrics.losing_trades, Some(1));

        let only_winners = [trade(dec!(10))];
        assert_eq!(RawMetrics::default().finish(&only_winners).profit_factor, None);
        assert_eq!(RawMetrics::default().finish(&[]).profit_factor, None);
    }

    #[test]
    fn test_reported_counts_take_precedence_over_trades() {
        let raw = RawMetrics {
            total_trades: Some(15),
            winning_trades: Some(7),
            ..RawMetrics::default()
        };
        let metrics = raw.finish(&[trade(dec!(1))]);
        assert_eq!(metrics.total_trades, Some(15));
        assert_eq!(metrics.winning_trades, Some(7));
        assert_eq!(metrics.losing_trades, Some(0));
    }

    #[test]
    fn test_unreported_counts_stay_absent() {
        let raw = RawMetrics {
            total_trades: Some(15),
            winning_trades: Some(7),
            ..RawMetrics::default()
        };
        let metrics = raw.finish(&[]);
        assert_eq!(metrics.total_trades, Some(15));
        assert_eq!(metrics.losing_trades, None);
        assert_eq!(metrics.win_rate, dec!(46.6667));

        let metrics = RawMetrics::default().finish(&[]);
        assert_eq!(metrics.total_trades, None);
        assert_eq!(metrics.winning_trades, None);
        assert_eq!(metrics.win_rate, Decimal::ZERO);
    }

    #[test]
    fn test_trade_sum_overflow_leaves_profit_factor_absent() {
        let huge = Decimal::MAX;
        let trades = [trade(huge), trade(huge), trade(dec!(-1))];
        let metrics = RawMetrics::default().finish(&trades);
        assert_eq!(metrics.profit_factor, None);
        assert_eq!(metrics.total_trades, Some(3));
    }

    #[test]
    fn test_fill_gaps_keeps_existing() {
        let mut console = RawMetrics {
            total_return_pct: Some(dec!(25)),
            ..RawMetrics::default()
        };
        console.fill_gaps(RawMetrics {
            total_return_pct: Some(dec!(99)),
            sharpe_ratio: Some(dec!(1.1)),
            ..RawMetrics::default()
        });
        assert_eq!(console.total_return_pct, Some(dec!(25)));
        assert_eq!(console.sharpe_ratio, Some(dec!(1.1)));
        assert!(!console.is_empty());
        assert!(RawMetrics::default().is_empty());
    }

    proptest! {
        #[test]
        fn prop_win_rate_bounded(winning in 0u64..10_000, total in 0u64..10_000) {
            let rate = win_rate(winning, total);
            prop_assert!(rate >= Decimal::ZERO);
            prop_assert!(rate <= HUNDRED);
            prop_assert_eq!(rate.is_zero(), total == 0 || winning == 0);
        }
    }
}
