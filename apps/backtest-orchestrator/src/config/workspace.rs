//! Per-task file workspace configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What to do with per-task config and export files after a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupPolicy {
    /// Delete the files when the run finishes.
    #[default]
    Remove,
    /// Leave the files for inspection.
    Keep,
}

/// Where per-task files are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Directory for config, export and results files.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Cleanup policy.
    #[serde(default)]
    pub cleanup: CleanupPolicy,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            cleanup: CleanupPolicy::default(),
        }
    }
}

fn default_dir() -> PathBuf {
    std::env::temp_dir().join("backtest-orchestrator")
}
