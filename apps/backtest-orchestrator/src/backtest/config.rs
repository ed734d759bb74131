//! Backtest configuration supplied by callers.
//!
//! A configuration is immutable for the lifetime of a task. It is validated
//! once at submission; executors trust it afterwards.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Sampling intervals the engine accepts.
pub const VALID_TIMEFRAMES: [&str; 13] = [
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
];

/// Default fee rate (0.1%).
const DEFAULT_FEE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Stake sizing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StakeRepr", into = "StakeRepr")]
pub enum StakeAmount {
    /// Use the whole available balance split across open trades.
    #[default]
    Unlimited,
    /// Fixed stake per trade, in stake currency.
    Fixed(Decimal),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StakeRepr {
    Amount(Decimal),
    Mode(String),
}

impl TryFrom<StakeRepr> for StakeAmount {
    type Error = String;

    fn try_from(repr: StakeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            StakeRepr::Amount(amount) => Ok(Self::Fixed(amount)),
            StakeRepr::Mode(mode) if mode.eq_ignore_ascii_case("unlimited") => {
                Ok(Self::Unlimited)
            }
            StakeRepr::Mode(mode) => Err(format!(
                "stake must be a number or \"unlimited\", got \"{mode}\""
            )),
        }
    }
}

impl From<StakeAmount> for StakeRepr {
    fn from(stake: StakeAmount) -> Self {
        match stake {
            StakeAmount::Unlimited => Self::Mode("unlimited".to_string()),
            StakeAmount::Fixed(amount) => Self::Amount(amount),
        }
    }
}

/// Configuration for a single backtest or hyperopt run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// First day of the evaluated window.
    pub start_date: NaiveDate,

    /// Last day of the evaluated window (exclusive upper bound for the engine).
    pub end_date: NaiveDate,

    /// Candle interval, e.g. "5m" or "1h".
    pub timeframe: String,

    /// Traded instrument pairs, e.g. "BTC/USDT".
    pub pairs: Vec<String>,

    /// Starting balance in stake currency.
    pub initial_balance: Decimal,

    /// Maximum concurrently open positions.
    pub max_open_trades: u32,

    /// Fee rate applied per side (0.001 = 0.1%).
    #[serde(default = "default_fee")]
    pub fee: Decimal,

    /// Stake sizing mode.
    #[serde(default)]
    pub stake: StakeAmount,

    /// Simulated wallet size; defaults to the initial balance.
    #[serde(default)]
    pub wallet_size: Option<Decimal>,

    /// Allow multiple positions in the same pair.
    #[serde(default)]
    pub position_stacking: bool,
}

const fn default_fee() -> Decimal {
    DEFAULT_FEE
}

impl BacktestConfig {
    /// Create a configuration with default fee, stake and stacking settings.
    #[must_use]
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        timeframe: impl Into<String>,
        pairs: Vec<String>,
        initial_balance: Decimal,
        max_open_trades: u32,
    ) -> Self {
        Self {
            start_date,
            end_date,
            timeframe: timeframe.into(),
            pairs,
            initial_balance,
            max_open_trades,
            fee: DEFAULT_FEE,
            stake: StakeAmount::Unlimited,
            wallet_size: None,
            position_stacking: false,
        }
    }

    /// Check every configuration invariant.
    pub fn validate(&self) -> Result<()> {
        if self.start_date >= self.end_date {
            return Err(OrchestratorError::validation(format!(
                "start_date ({}) must be before end_date ({})",
                self.start_date, self.end_date
            )));
        }

        if self.pairs.is_empty() {
            return Err(OrchestratorError::validation("pairs must not be empty"));
        }

        if let Some(pair) = self.pairs.iter().find(|p| p.trim().is_empty()) {
            return Err(OrchestratorError::validation(format!(
                "pair names must not be blank, got {pair:?}"
            )));
        }

        if self.initial_balance <= Decimal::ZERO {
            return Err(OrchestratorError::validation(
                "initial_balance must be positive",
            ));
        }

        if !VALID_TIMEFRAMES.contains(&self.timeframe.as_str()) {
            return Err(OrchestratorError::validation(format!(
                "timeframe must be one of {VALID_TIMEFRAMES:?}, got \"{}\"",
                self.timeframe
            )));
        }

        if self.max_open_trades == 0 {
            return Err(OrchestratorError::validation(
                "max_open_trades must be greater than 0",
            ));
        }

        if self.fee < Decimal::ZERO || self.fee >= Decimal::ONE {
            return Err(OrchestratorError::validation(
                "fee must be in the range [0, 1)",
            ));
        }

        if let StakeAmount::Fixed(amount) = self.stake
            && amount <= Decimal::ZERO
        {
            return Err(OrchestratorError::validation(
                "stake amount must be positive",
            ));
        }

        if let Some(wallet) = self.wallet_size
            && wallet <= Decimal::ZERO
        {
            return Err(OrchestratorError::validation(
                "wallet_size must be positive",
            ));
        }

        Ok(())
    }

    /// Engine timerange argument, `YYYYMMDD-YYYYMMDD`.
    #[must_use]
    pub fn timerange(&self) -> String {
        format!(
            "{}-{}",
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d")
        )
    }

    /// Wallet size handed to the engine's dry-run wallet.
    #[must_use]
    pub fn effective_wallet(&self) -> Decimal {
        self.wallet_size.unwrap_or(self.initial_balance)
    }

    /// Length of the evaluated window in days.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use test_case::test_case;

    use super::*;
    use crate::error::ErrorKind;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample_config() -> BacktestConfig {
        BacktestConfig::new(
            date(2024, 1, 1),
            date(2024, 1, 8),
            "5m",
            vec!["BTC/USDT".to_string()],
            dec!(1000),
            3,
        )
    }

    #[test]
    fn test_defaults() {
        let config = sample_config();
        assert_eq!(config.fee, dec!(0.001));
        assert_eq!(config.stake, StakeAmount::Unlimited);
        assert!(!config.position_stacking);
        assert_eq!(config.effective_wallet(), dec!(1000));
        assert_eq!(config.days(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timerange_format() {
        assert_eq!(sample_config().timerange(), "20240101-20240108");
    }

    #[test_case(|c: &mut BacktestConfig| c.end_date = c.start_date ; "empty range")]
    #[test_case(|c: &mut BacktestConfig| c.pairs.clear() ; "no pairs")]
    #[test_case(|c: &mut BacktestConfig| c.pairs.push("  ".to_string()) ; "blank pair")]
    #[test_case(|c: &mut BacktestConfig| c.initial_balance = Decimal::ZERO ; "zero balance")]
    #[test_case(|c: &mut BacktestConfig| c.timeframe = "7m".to_string() ; "bad timeframe")]
    #[test_case(|c: &mut BacktestConfig| c.max_open_trades = 0 ; "no open trades")]
    #[test_case(|c: &mut BacktestConfig| c.fee = Decimal::ONE ; "fee too high")]
    #[test_case(|c: &mut BacktestConfig| c.stake = StakeAmount::Fixed(dec!(-5)) ; "negative stake")]
    #[test_case(|c: &mut BacktestConfig| c.wallet_size = Some(Decimal::ZERO) ; "zero wallet")]
    fn test_validation_rejects(mutate: fn(&mut BacktestConfig)) {
        let mut config = sample_config();
        mutate(&mut config);

        let Err(err) = config.validate() else {
            panic!("expected validation failure");
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_yaml_deserialize_with_stake_modes() {
        let yaml = r#"
start_date: 2024-01-01
end_date: 2024-02-01
timeframe: 1h
pairs: ["ETH/USDT", "BTC/USDT"]
initial_balance: 5000
max_open_trades: 2
stake: 100
"#;
        let config: BacktestConfig = serde_yaml_bw::from_str(yaml).unwrap();
        assert_eq!(config.stake, StakeAmount::Fixed(dec!(100)));
        assert_eq!(config.fee, dec!(0.001));

        let yaml = yaml.replace("stake: 100", "stake: unlimited");
        let config: BacktestConfig = serde_yaml_bw::from_str(&yaml).unwrap();
        assert_eq!(config.stake, StakeAmount::Unlimited);

        let yaml = yaml.replace("stake: unlimited", "stake: lots");
        assert!(serde_yaml_bw::from_str::<BacktestConfig>(&yaml).is_err());
    }
}
