//! Engine JSON configuration file.
//!
//! Derived deterministically from a [`BacktestConfig`], the strategy id and
//! the engine settings: the same inputs always serialize to the same document
//! apart from the per-task file paths.

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use serde_json::{Map, Value, json};

use super::workspace::TaskFiles;
use crate::backtest::{BacktestConfig, StakeAmount};
use crate::config::EngineSettings;

/// Top-level engine configuration document.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfigFile {
    strategy: String,
    timeframe: String,
    timerange: String,
    stake_currency: String,
    stake_amount: Value,
    dry_run: bool,
    dry_run_wallet: f64,
    max_open_trades: u32,
    fee: f64,
    enable_position_stacking: bool,
    exchange: ExchangeSection,
    pairlists: Vec<PairlistEntry>,
    datadir: PathBuf,
    user_data_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    strategy_path: Option<PathBuf>,
    logfile: PathBuf,
    db_url: String,
    export: &'static str,
    exportfilename: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
struct ExchangeSection {
    name: String,
    pair_whitelist: Vec<String>,
    pair_blacklist: Vec<String>,
    ccxt_config: Map<String, Value>,
    ccxt_async_config: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
struct PairlistEntry {
    method: &'static str,
}

fn decimal_number(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}

fn sqlite_url(path: &Path) -> String {
    format!("sqlite:///{}", path.display())
}

impl EngineConfigFile {
    /// Build the document for one run.
    #[must_use]
    pub fn build(
        strategy_id: &str,
        config: &BacktestConfig,
        engine: &EngineSettings,
        files: &TaskFiles,
    ) -> Self {
        let stake_amount = match config.stake {
            StakeAmount::Unlimited => json!("unlimited"),
            StakeAmount::Fixed(amount) => json!(decimal_number(amount)),
        };

        Self {
            strategy: strategy_id.to_string(),
            timeframe: config.timeframe.clone(),
            timerange: config.timerange(),
            stake_currency: engine.stake_currency.clone(),
            stake_amount,
            dry_run: true,
            dry_run_wallet: decimal_number(config.effective_wallet()),
            max_open_trades: config.max_open_trades,
            fee: decimal_number(config.fee),
            enable_position_stacking: config.position_stacking,
            exchange: ExchangeSection {
                name: engine.exchange.clone(),
                pair_whitelist: config.pairs.clone(),
                pair_blacklist: Vec::new(),
                ccxt_config: Map::new(),
                ccxt_async_config: Map::new(),
            },
            pairlists: vec![PairlistEntry {
                method: "StaticPairList",
            }],
            datadir: engine.datadir.clone(),
            user_data_dir: engine.user_data_dir.clone(),
            strategy_path: engine.strategy_path.clone(),
            logfile: files.logfile.clone(),
            db_url: sqlite_url(&files.database),
            export: "trades",
            exportfilename: files.export.clone(),
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the document to `path`.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let body = self.to_json().map_err(std::io::Error::other)?;
        tokio::fs::write(path, body).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    use super::*;
    use crate::config::CleanupPolicy;
    use crate::engine::Workspace;

    fn sample_config() -> BacktestConfig {
        BacktestConfig::new(
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
            "15m",
            vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            dec!(2500),
            5,
        )
    }

    #[tokio::test]
    async fn test_document_fields() {
        let dir = tempfile::tempdir().unwrap();
        let files = Workspace::new(dir.path(), CleanupPolicy::Remove)
            .allocate("t-1")
            .await
            .unwrap();
        let document =
            EngineConfigFile::build("SampleStrategy", &sample_config(), &EngineSettings::default(), &files);
        let value: Value = serde_json::from_str(&document.to_json().unwrap()).unwrap();

        assert_eq!(value["strategy"], "SampleStrategy");
        assert_eq!(value["timeframe"], "15m");
        assert_eq!(value["timerange"], "20240301-20240308");
        assert_eq!(value["stake_currency"], "USDT");
        assert_eq!(value["stake_amount"], "unlimited");
        assert_eq!(value["dry_run"], true);
        assert_eq!(value["dry_run_wallet"], 2500.0);
        assert_eq!(value["max_open_trades"], 5);
        assert_eq!(value["fee"], 0.001);
        assert_eq!(value["exchange"]["name"], "binance");
        assert_eq!(value["exchange"]["pair_whitelist"][1], "ETH/USDT");
        assert_eq!(value["pairlists"][0]["method"], "StaticPairList");
        assert_eq!(value["export"], "trades");
        assert!(value.get("strategy_path").is_none());
        assert!(value["db_url"].as_str().unwrap().starts_with("sqlite:///"));
        assert_eq!(
            value["exportfilename"].as_str().unwrap(),
            files.export.to_str().unwrap()
        );
    }

    #[tokio::test]
    async fn test_fixed_stake_and_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let files = Workspace::new(dir.path(), CleanupPolicy::Remove)
            .allocate("t-2")
            .await
            .unwrap();
        let mut config = sample_config();
        config.stake = StakeAmount::Fixed(dec!(100));
        config.wallet_size = Some(dec!(10000));
        config.position_stacking = true;

        let engine = EngineSettings {
            strategy_path: Some(PathBuf::from("strategies")),
            ..EngineSettings::default()
        };
        let value = serde_json::to_value(EngineConfigFile::build("S", &config, &engine, &files)).unwrap();
        assert_eq!(value["stake_amount"], 100.0);
        assert_eq!(value["dry_run_wallet"], 10000.0);
        assert_eq!(value["enable_position_stacking"], true);
        assert_eq!(value["strategy_path"], "strategies");
    }

    #[tokio::test]
    async fn test_write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let files = Workspace::new(dir.path(), CleanupPolicy::Keep)
            .allocate("t-3")
            .await
            .unwrap();
        let document = EngineConfigFile::build("S", &sample_config(), &EngineSettings::default(), &files);
        document.write_to(&files.config).await.unwrap();

        let written = std::fs::read_to_string(&files.config).unwrap();
        assert!(written.contains("\"strategy\": \"S\""));
    }
}
