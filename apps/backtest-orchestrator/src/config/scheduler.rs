//! Scheduler configuration.

use serde::{Deserialize, Serialize};

/// Worker pool and registry limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of concurrent engine processes.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Maximum number of tasks kept in the registry (`None` = unbounded).
    #[serde(default)]
    pub max_tasks: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_tasks: None,
        }
    }
}

impl SchedulerConfig {
    /// Configuration with the given worker count and no registry cap.
    #[must_use]
    pub const fn with_workers(max_workers: usize) -> Self {
        Self {
            max_workers,
            max_tasks: None,
        }
    }
}

const fn default_max_workers() -> usize {
    4
}
