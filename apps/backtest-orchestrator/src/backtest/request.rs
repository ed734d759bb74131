//! Task kinds and search parameters.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Default number of search epochs.
pub const DEFAULT_EPOCHS: u32 = 100;

/// Default optimization objective.
pub const DEFAULT_LOSS: &str = "ShortTradeDurHyperoptLoss";

/// Parameters for a hyperopt run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of search iterations.
    #[serde(default = "default_epochs")]
    pub epochs: u32,
    /// Objective (loss function) name.
    #[serde(default = "default_loss")]
    pub loss: String,
    /// Parameter spaces to search.
    #[serde(default = "default_spaces")]
    pub spaces: Vec<String>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            loss: default_loss(),
            spaces: default_spaces(),
        }
    }
}

const fn default_epochs() -> u32 {
    DEFAULT_EPOCHS
}

fn default_loss() -> String {
    DEFAULT_LOSS.to_string()
}

fn default_spaces() -> Vec<String> {
    vec!["default".to_string()]
}

impl SearchParams {
    /// Create search parameters with the default spaces.
    pub fn new(epochs: u32, loss: impl Into<String>) -> Self {
        Self {
            epochs,
            loss: loss.into(),
            spaces: default_spaces(),
        }
    }

    /// Check the parameters are usable.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(OrchestratorError::validation(
                "epochs must be greater than 0",
            ));
        }
        if self.loss.trim().is_empty() {
            return Err(OrchestratorError::validation("loss must not be empty"));
        }
        if self.spaces.is_empty() {
            return Err(OrchestratorError::validation("spaces must not be empty"));
        }
        Ok(())
    }
}

/// Kind of work a task performs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Single evaluation run.
    Evaluation,
    /// Hyperparameter search.
    ParameterSearch(SearchParams),
}

impl TaskKind {
    /// Metric label for this kind.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Evaluation => "evaluation",
            Self::ParameterSearch(_) => "parameter_search",
        }
    }

    /// Validate kind-specific parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Evaluation => Ok(()),
            Self::ParameterSearch(params) => params.validate(),
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_defaults() {
        let params = SearchParams::default();
        assert_eq!(params.epochs, 100);
        assert_eq!(params.loss, "ShortTradeDurHyperoptLoss");
        assert_eq!(params.spaces, vec!["default".to_string()]);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_zero_epochs_rejected() {
        let kind = TaskKind::ParameterSearch(SearchParams::new(0, "SharpeHyperOptLoss"));
        assert!(kind.validate().is_err());
        assert!(TaskKind::Evaluation.validate().is_ok());
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(TaskKind::Evaluation.to_string(), "evaluation");
        assert_eq!(
            TaskKind::ParameterSearch(SearchParams::default()).label(),
            "parameter_search"
        );
    }
}
