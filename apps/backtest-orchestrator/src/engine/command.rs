//! Engine command-line construction.

use std::fmt;
use std::path::Path;

use crate::backtest::SearchParams;
use crate::config::EngineSettings;

/// A fully built engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    /// Executable.
    pub program: String,
    /// Arguments, base args first.
    pub args: Vec<String>,
}

impl EngineCommand {
    fn with_subcommand(engine: &EngineSettings, subcommand: &str) -> Self {
        let mut args = engine.base_args.clone();
        args.push(subcommand.to_string());
        Self {
            program: engine.binary.clone(),
            args,
        }
    }

    fn flag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.args.push(name.to_string());
        self.args.push(value.into());
        self
    }

    /// Availability check: `<binary> <base_args..> --version`.
    #[must_use]
    pub fn version(engine: &EngineSettings) -> Self {
        Self::with_subcommand(engine, "--version")
    }

    /// Evaluation run invocation.
    #[must_use]
    pub fn backtesting(
        engine: &EngineSettings,
        config_path: &Path,
        strategy_id: &str,
        timerange: &str,
        export_path: &Path,
    ) -> Self {
        Self::with_subcommand(engine, "backtesting")
            .flag("--config", config_path.display().to_string())
            .flag("--strategy", strategy_id)
            .flag("--timerange", timerange)
            .flag("--export", "trades")
            .flag("--export-filename", export_path.display().to_string())
    }

    /// Parameter search invocation.
    #[must_use]
    pub fn hyperopt(
        engine: &EngineSettings,
        config_path: &Path,
        strategy_id: &str,
        search: &SearchParams,
        results_path: &Path,
    ) -> Self {
        let mut command = Self::with_subcommand(engine, "hyperopt")
            .flag("--config", config_path.display().to_string())
            .flag("--strategy", strategy_id)
            .flag("--epochs", search.epochs.to_string());
        command.args.push("--spaces".to_string());
        command.args.extend(search.spaces.iter().cloned());
        command
            .flag("--hyperopt-loss", search.loss.clone())
            .flag("--export-filename", results_path.display().to_string())
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}
