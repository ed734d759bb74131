//! Sweep plans.
//!
//! A plan is a YAML list of runs handed to the scheduler in one batch:
//!
//! ```yaml
//! runs:
//!   - strategy: SampleStrategy
//!     kind: evaluation
//!     config:
//!       start_date: 2024-01-01
//!       end_date: 2024-03-01
//!       timeframe: 5m
//!       pairs: ["BTC/USDT"]
//!       initial_balance: 1000
//!       max_open_trades: 3
//!   - id: sample-search
//!     strategy: SampleStrategy
//!     kind: hyperopt
//!     epochs: 200
//!     loss: SharpeHyperOptLoss
//!     config: { ... }
//! ```
//!
//! `${VAR}` and `${VAR:-default}` are interpolated before parsing, as in the
//! orchestrator config.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::{BacktestConfig, SearchParams, TaskKind};
use crate::config::interpolate_env_vars;
use crate::error::Result;
use crate::scheduler::TaskRequest;

/// Plan loading errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The plan file could not be read.
    #[error("Failed to read plan file '{path}': {source}")]
    Read {
        /// Path to the plan file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The plan is not valid YAML or has unknown keys.
    #[error("Failed to parse plan YAML: {0}")]
    Parse(#[from] serde_yaml_bw::Error),

    /// The plan lists no runs.
    #[error("plan contains no runs")]
    Empty,
}

/// Run kind as written in a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    /// Single backtest.
    #[default]
    Evaluation,
    /// Hyperparameter search.
    Hyperopt,
}

/// One run in a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlannedRun {
    /// Task id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Strategy to run.
    pub strategy: String,
    /// Run kind.
    #[serde(default)]
    pub kind: RunKind,
    /// Search epochs (hyperopt only).
    #[serde(default)]
    pub epochs: Option<u32>,
    /// Search objective (hyperopt only).
    #[serde(default)]
    pub loss: Option<String>,
    /// Search spaces (hyperopt only).
    #[serde(default)]
    pub spaces: Option<Vec<String>>,
    /// Backtest configuration.
    pub config: BacktestConfig,
}

impl PlannedRun {
    /// Task kind, with search defaults filled in for hyperopt runs.
    #[must_use]
    pub fn task_kind(&self) -> TaskKind {
        match self.kind {
            RunKind::Evaluation => TaskKind::Evaluation,
            RunKind::Hyperopt => {
                let mut params = SearchParams::default();
                if let Some(epochs) = self.epochs {
                    params.epochs = epochs;
                }
                if let Some(loss) = &self.loss {
                    params.loss.clone_from(loss);
                }
                if let Some(spaces) = &self.spaces {
                    params.spaces.clone_from(spaces);
                }
                TaskKind::ParameterSearch(params)
            }
        }
    }

    /// Scheduler submission for this run.
    #[must_use]
    pub fn to_request(&self) -> TaskRequest {
        let request = TaskRequest::new(self.task_kind(), self.strategy.clone(), self.config.clone());
        match &self.id {
            Some(id) => request.with_id(id.clone()),
            None => request,
        }
    }
}

/// A batch of runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepPlan {
    /// Runs in submission order.
    pub runs: Vec<PlannedRun>,
}

impl SweepPlan {
    /// Parse a plan from YAML.
    ///
    /// # Errors
    ///
    /// Returns a `PlanError` if the YAML is malformed or lists no runs.
    pub fn from_yaml(yaml: &str) -> std::result::Result<Self, PlanError> {
        let plan: Self = serde_yaml_bw::from_str(&interpolate_env_vars(yaml))?;
        if plan.runs.is_empty() {
            return Err(PlanError::Empty);
        }
        Ok(plan)
    }

    /// Scheduler submissions, one per run.
    #[must_use]
    pub fn requests(&self) -> Vec<TaskRequest> {
        self.runs.iter().map(PlannedRun::to_request).collect()
    }

    /// Validate every run the way the scheduler would on submission.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn validate(&self) -> Result<()> {
        self.requests().iter().try_for_each(TaskRequest::validate)
    }
}

/// Load a plan file.
///
/// # Errors
///
/// Returns a `PlanError` if the file cannot be read or parsed.
pub fn load_plan(path: &Path) -> std::result::Result<SweepPlan, PlanError> {
    let contents = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: path.display().to_string(),
        source,
    })?;
    SweepPlan::from_yaml(&contents)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::backtest::DEFAULT_LOSS;
    use crate::error::ErrorKind;

    const PLAN: &str = r#"
runs:
  - strategy: SampleStrategy
    config:
      start_date: 2024-01-01
      end_date: 2024-01-08
      timeframe: 5m
      pairs: ["BTC/USDT"]
      initial_balance: 1000
      max_open_trades: 3
  - id: search-1
    strategy: SampleStrategy
    kind: hyperopt
    epochs: 50
    config:
      start_date: 2024-01-01
      end_date: 2024-02-01
      timeframe: 1h
      pairs: ["BTC/USDT", "ETH/USDT"]
      initial_balance: 500
      max_open_trades: 2
      stake: 100
"#;

    #[test]
    fn test_parse_plan() {
        let plan = SweepPlan::from_yaml(PLAN).unwrap();
        assert_eq!(plan.runs.len(), 2);
        assert_eq!(plan.runs[0].kind, RunKind::Evaluation);
        assert_eq!(plan.runs[1].id.as_deref(), Some("search-1"));
        assert_eq!(plan.runs[1].config.initial_balance, dec!(500));
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_requests_fill_search_defaults() {
        let requests = SweepPlan::from_yaml(PLAN).unwrap().requests();
        assert_eq!(requests[0].kind, TaskKind::Evaluation);
        assert_eq!(requests[0].task_id, None);

        let TaskKind::ParameterSearch(params) = &requests[1].kind else {
            panic!("expected a search run");
        };
        assert_eq!(params.epochs, 50);
        assert_eq!(params.loss, DEFAULT_LOSS);
        assert_eq!(params.spaces, vec!["default".to_string()]);
        assert_eq!(requests[1].task_id.as_deref(), Some("search-1"));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let yaml = PLAN.replace("kind: hyperopt", "kind: hyperopt\n    epoch: 5");
        assert!(matches!(
            SweepPlan::from_yaml(&yaml),
            Err(PlanError::Parse(_))
        ));
    }

    #[test]
    fn test_empty_plan_rejected() {
        assert!(matches!(
            SweepPlan::from_yaml("runs: []"),
            Err(PlanError::Empty)
        ));
    }

    #[test]
    fn test_invalid_run_fails_validation() {
        let yaml = PLAN.replace("epochs: 50", "epochs: 0");
        let plan = SweepPlan::from_yaml(&yaml).unwrap();
        let Err(err) = plan.validate() else {
            panic!("zero epochs must be rejected");
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_load_plan_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PLAN.as_bytes()).unwrap();
        let plan = load_plan(file.path()).unwrap();
        assert_eq!(plan.runs.len(), 2);

        let missing = load_plan(Path::new("/nonexistent/plan.yaml"));
        assert!(matches!(missing, Err(PlanError::Read { .. })));
    }
}
