//! Per-task file naming and cleanup.
//!
//! File names embed the (sanitized) task id, a millisecond timestamp and a
//! process-wide sequence number. Sanitizing can map distinct ids onto the
//! same text and timestamps repeat within a millisecond, so the sequence is
//! what keeps concurrent tasks from ever sharing a path.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tracing::debug;

use crate::config::{CleanupPolicy, WorkspaceConfig};

static ALLOCATIONS: AtomicU64 = AtomicU64::new(0);

/// Directory that holds per-task files.
#[derive(Debug, Clone)]
pub struct Workspace {
    dir: PathBuf,
    cleanup: CleanupPolicy,
}

impl Workspace {
    /// Create a workspace rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>, cleanup: CleanupPolicy) -> Self {
        Self {
            dir: dir.into(),
            cleanup,
        }
    }

    /// Create a workspace from configuration.
    #[must_use]
    pub fn from_config(config: &WorkspaceConfig) -> Self {
        Self::new(config.dir.clone(), config.cleanup)
    }

    /// Workspace directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate file paths for one task, creating the directory if needed.
    pub async fn allocate(&self, task_id: &str) -> io::Result<TaskFiles> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let stamp = Utc::now().timestamp_millis();
        let seq = ALLOCATIONS.fetch_add(1, Ordering::Relaxed);
        let safe_id = sanitize(task_id);
        let path = |role: &str, ext: &str| {
            self.dir.join(format!("{role}_{safe_id}_{stamp}_{seq}.{ext}"))
        };

        Ok(TaskFiles {
            config: path("config", "json"),
            export: path("export", "json"),
            results: path("hyperopt", "json"),
            database: path("tradesv3", "sqlite"),
            logfile: path("engine", "log"),
            cleanup: self.cleanup,
        })
    }
}

/// Keep ids filesystem-safe.
fn sanitize(task_id: &str) -> String {
    task_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Paths used by one engine run. Removes them on drop under
/// [`CleanupPolicy::Remove`].
#[derive(Debug)]
pub struct TaskFiles {
    /// Engine configuration file.
    pub config: PathBuf,
    /// Evaluation trade export.
    pub export: PathBuf,
    /// Hyperopt results document.
    pub results: PathBuf,
    /// Engine trade database.
    pub database: PathBuf,
    /// Engine log file.
    pub logfile: PathBuf,
    cleanup: CleanupPolicy,
}

impl TaskFiles {
    fn paths(&self) -> [&Path; 5] {
        [
            &self.config,
            &self.export,
            &self.results,
            &self.database,
            &self.logfile,
        ]
    }
}

impl Drop for TaskFiles {
    fn drop(&mut self) {
        if self.cleanup == CleanupPolicy::Keep {
            return;
        }
        for path in self.paths() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed task file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove task file"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paths_are_unique_per_task() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), CleanupPolicy::Keep);

        let a = workspace.allocate("task-a").await.unwrap();
        let b = workspace.allocate("task-b").await.unwrap();
        assert_ne!(a.config, b.config);
        assert_ne!(a.export, b.export);
        assert!(a.config.starts_with(dir.path()));
        let name = a.config.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("config_task-a_"));
        assert!(name.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_ids_that_sanitize_alike_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), CleanupPolicy::Keep);

        let dotted = workspace.allocate("run.1").await.unwrap();
        let underscored = workspace.allocate("run_1").await.unwrap();
        assert_ne!(dotted.config, underscored.config);
        assert_ne!(dotted.export, underscored.export);
        assert_ne!(dotted.database, underscored.database);

        let again = workspace.allocate("run_1").await.unwrap();
        assert_ne!(underscored.results, again.results);
    }

    #[tokio::test]
    async fn test_ids_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), CleanupPolicy::Keep);
        let files = workspace.allocate("../evil id").await.unwrap();
        assert_eq!(files.config.parent(), Some(dir.path()));
    }

    #[tokio::test]
    async fn test_remove_policy_deletes_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().join("nested"), CleanupPolicy::Remove);

        let files = workspace.allocate("t1").await.unwrap();
        std::fs::write(&files.config, "{}").unwrap();
        std::fs::write(&files.export, "{}").unwrap();
        let config = files.config.clone();
        drop(files);
        assert!(!config.exists());
    }

    #[tokio::test]
    async fn test_keep_policy_leaves_files() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path(), CleanupPolicy::Keep);

        let files = workspace.allocate("t1").await.unwrap();
        std::fs::write(&files.config, "{}").unwrap();
        let config = files.config.clone();
        drop(files);
        assert!(config.exists());
    }
}
