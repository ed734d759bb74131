//! Performance metrics and trade records produced by engine runs.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal 100 for percentage conversions.
pub const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Structured performance summary for one run.
///
/// The win rate is always present (zero when no trade count is known). Every
/// other metric, trade counts included, is `None` when the engine did not
/// report it (or, for the derived Calmar ratio and profit factor, when it is
/// mathematically undefined).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Absolute profit in stake currency.
    pub total_return: Option<Decimal>,
    /// Profit as a percentage of the starting balance.
    pub total_return_pct: Option<Decimal>,
    /// Number of closed trades.
    pub total_trades: Option<u64>,
    /// Trades closed with positive profit.
    pub winning_trades: Option<u64>,
    /// Trades closed with negative profit.
    pub losing_trades: Option<u64>,
    /// Winning trades as a percentage of all trades, in [0, 100].
    pub win_rate: Decimal,
    /// Largest peak-to-trough loss in stake currency.
    pub max_drawdown: Option<Decimal>,
    /// Largest peak-to-trough loss as a percentage.
    pub max_drawdown_pct: Option<Decimal>,
    /// Sharpe ratio.
    pub sharpe_ratio: Option<Decimal>,
    /// Sortino ratio.
    pub sortino_ratio: Option<Decimal>,
    /// Total return percent over absolute max drawdown percent.
    pub calmar_ratio: Option<Decimal>,
    /// Gross profit over absolute gross loss.
    pub profit_factor: Option<Decimal>,
}

impl PerformanceMetrics {
    /// Read one field as a decimal, `None` when not available.
    #[must_use]
    pub fn get(&self, field: MetricField) -> Option<Decimal> {
        match field {
            MetricField::TotalReturn => self.total_return,
            MetricField::TotalReturnPct => self.total_return_pct,
            MetricField::TotalTrades => self.total_trades.map(Decimal::from),
            MetricField::WinningTrades => self.winning_trades.map(Decimal::from),
            MetricField::LosingTrades => self.losing_trades.map(Decimal::from),
            MetricField::WinRate => Some(self.win_rate),
            MetricField::MaxDrawdown => self.max_drawdown,
            MetricField::MaxDrawdownPct => self.max_drawdown_pct,
            MetricField::SharpeRatio => self.sharpe_ratio,
            MetricField::SortinoRatio => self.sortino_ratio,
            MetricField::CalmarRatio => self.calmar_ratio,
            MetricField::ProfitFactor => self.profit_factor,
        }
    }
}

/// The fixed list of performance metric fields, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    /// Absolute total return.
    TotalReturn,
    /// Total return percent.
    TotalReturnPct,
    /// Closed trade count.
    TotalTrades,
    /// Winning trade count.
    WinningTrades,
    /// Losing trade count.
    LosingTrades,
    /// Win rate percent.
    WinRate,
    /// Absolute max drawdown.
    MaxDrawdown,
    /// Max drawdown percent.
    MaxDrawdownPct,
    /// Sharpe ratio.
    SharpeRatio,
    /// Sortino ratio.
    SortinoRatio,
    /// Calmar ratio.
    CalmarRatio,
    /// Profit factor.
    ProfitFactor,
}

impl MetricField {
    /// All fields in display order.
    pub const ALL: [Self; 12] = [
        Self::TotalReturn,
        Self::TotalReturnPct,
        Self::TotalTrades,
        Self::WinningTrades,
        Self::LosingTrades,
        Self::WinRate,
        Self::MaxDrawdown,
        Self::MaxDrawdownPct,
        Self::SharpeRatio,
        Self::SortinoRatio,
        Self::CalmarRatio,
        Self::ProfitFactor,
    ];

    /// Column name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::TotalReturn => "total_return",
            Self::TotalReturnPct => "total_return_pct",
            Self::TotalTrades => "total_trades",
            Self::WinningTrades => "winning_trades",
            Self::LosingTrades => "losing_trades",
            Self::WinRate => "win_rate",
            Self::MaxDrawdown => "max_drawdown",
            Self::MaxDrawdownPct => "max_drawdown_pct",
            Self::SharpeRatio => "sharpe_ratio",
            Self::SortinoRatio => "sortino_ratio",
            Self::CalmarRatio => "calmar_ratio",
            Self::ProfitFactor => "profit_factor",
        }
    }

    /// Whether the field is a trade count.
    #[must_use]
    pub const fn is_count(&self) -> bool {
        matches!(
            self,
            Self::TotalTrades | Self::WinningTrades | Self::LosingTrades
        )
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A closed trade from the engine's export file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Traded pair.
    #[serde(default)]
    pub pair: String,
    /// Net profit in stake currency.
    #[serde(default)]
    pub profit_abs: Decimal,
    /// Net profit as a ratio of the stake.
    #[serde(default)]
    pub profit_ratio: Decimal,
    /// Entry timestamp as reported by the engine.
    #[serde(default)]
    pub open_date: Option<String>,
    /// Exit timestamp as reported by the engine.
    #[serde(default)]
    pub close_date: Option<String>,
    /// Entry price.
    #[serde(default)]
    pub open_rate: Option<Decimal>,
    /// Position size.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Exit reason label.
    #[serde(default)]
    pub exit_reason: Option<String>,
}

impl TradeRecord {
    /// Check if this trade was profitable.
    #[must_use]
    pub fn is_winner(&self) -> bool {
        self.profit_abs > Decimal::ZERO
    }

    /// Check if this trade lost money.
    #[must_use]
    pub fn is_loser(&self) -> bool {
        self.profit_abs < Decimal::ZERO
    }
}

/// Format an optional metric, "N/A" when not available.
#[must_use]
pub fn format_metric(value: Option<Decimal>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
}
