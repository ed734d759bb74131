//! External engine invocation settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How to invoke the external backtesting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Engine executable.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Arguments placed before the subcommand (e.g. a script path when
    /// `binary` is an interpreter).
    #[serde(default)]
    pub base_args: Vec<String>,
    /// Exchange name written to the engine config.
    #[serde(default = "default_exchange")]
    pub exchange: String,
    /// Stake currency written to the engine config.
    #[serde(default = "default_stake_currency")]
    pub stake_currency: String,
    /// Market data directory.
    #[serde(default = "default_datadir")]
    pub datadir: PathBuf,
    /// Engine user data directory.
    #[serde(default = "default_user_data_dir")]
    pub user_data_dir: PathBuf,
    /// Directory containing strategy sources, if not the engine default.
    #[serde(default)]
    pub strategy_path: Option<PathBuf>,
    /// Wall-clock budget for an evaluation run.
    #[serde(default = "default_backtest_timeout_secs")]
    pub backtest_timeout_secs: u64,
    /// Wall-clock budget for a hyperopt run.
    #[serde(default = "default_hyperopt_timeout_secs")]
    pub hyperopt_timeout_secs: u64,
    /// How long output readers may drain after the process is killed.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            base_args: Vec::new(),
            exchange: default_exchange(),
            stake_currency: default_stake_currency(),
            datadir: default_datadir(),
            user_data_dir: default_user_data_dir(),
            strategy_path: None,
            backtest_timeout_secs: default_backtest_timeout_secs(),
            hyperopt_timeout_secs: default_hyperopt_timeout_secs(),
            kill_grace_ms: default_kill_grace_ms(),
        }
    }
}

impl EngineSettings {
    /// Evaluation run timeout.
    #[must_use]
    pub const fn backtest_timeout(&self) -> Duration {
        Duration::from_secs(self.backtest_timeout_secs)
    }

    /// Hyperopt run timeout.
    #[must_use]
    pub const fn hyperopt_timeout(&self) -> Duration {
        Duration::from_secs(self.hyperopt_timeout_secs)
    }

    /// Post-kill drain window.
    #[must_use]
    pub const fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

fn default_binary() -> String {
    "freqtrade".to_string()
}

fn default_exchange() -> String {
    "binance".to_string()
}

fn default_stake_currency() -> String {
    "USDT".to_string()
}

fn default_datadir() -> PathBuf {
    PathBuf::from("user_data/data/binance")
}

fn default_user_data_dir() -> PathBuf {
    PathBuf::from("user_data")
}

const fn default_backtest_timeout_secs() -> u64 {
    300
}

const fn default_hyperopt_timeout_secs() -> u64 {
    3600
}

const fn default_kill_grace_ms() -> u64 {
    2000
}
