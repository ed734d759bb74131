//! Task scheduler.
//!
//! A fixed pool of `max_workers` worker tasks pulls task ids from one FIFO
//! channel, so at most `max_workers` engine processes run at any instant and
//! saturated submissions are dispatched in arrival order.
//!
//! # Design
//!
//! - The registry (`task_id -> Task`) is the only shared mutable state. It
//!   sits behind a `parking_lot::RwLock`; every status transition and its
//!   timestamps/result are written in a single critical section, so readers
//!   never see a half-applied transition.
//! - Each task owns a child of the scheduler's shutdown token. Cancelling a
//!   task or shutting down without waiting fires the token and the executor
//!   kills the engine process.
//! - Waiters subscribe to a `watch` channel bumped on every terminal
//!   transition.
//! - Each execution runs in its own spawned task. A panic there fails that
//!   task with [`FailureKind::Crashed`] and the worker carries on.
//!
//! Lock order is submission queue, then registry.

mod task;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::backtest::{BacktestConfig, ExecutionFailure, FailureKind, TaskKind};
use crate::config::SchedulerConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::{ExecutionRequest, TaskExecutor, TaskOutcome};
use crate::observability::{record_task_finished, record_task_submitted, update_task_gauges};

pub use task::{SchedulerStatistics, Task, TaskRequest, TaskStatus};

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct Entry {
    task: Task,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    /// Submission order.
    order: Vec<String>,
}

impl Registry {
    fn statistics(&self, max_workers: usize) -> SchedulerStatistics {
        let mut stats = SchedulerStatistics {
            max_workers,
            ..SchedulerStatistics::default()
        };
        for entry in self.entries.values() {
            stats.count(entry.task.status);
        }
        stats
    }

    /// Drop the given tasks entirely.
    fn remove_all(&mut self, task_ids: &[String]) {
        for task_id in task_ids {
            self.entries.remove(task_id);
        }
        self.order.retain(|id| !task_ids.contains(id));
    }

    fn ordered(&self) -> impl Iterator<Item = &Task> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).map(|entry| &entry.task))
    }
}

type Queue = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>;

struct Inner {
    registry: RwLock<Registry>,
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
    shutdown: CancellationToken,
    changes: watch::Sender<u64>,
    executor: Arc<dyn TaskExecutor>,
    max_workers: usize,
    max_tasks: Option<usize>,
}

impl Inner {
    fn notify(&self) {
        self.changes.send_modify(|version| *version = version.wrapping_add(1));
    }

    fn publish_gauges(&self, registry: &Registry) {
        let stats = registry.statistics(self.max_workers);
        update_task_gauges(stats.running, stats.pending);
    }

    /// Move a pending task to RUNNING. Returns `None` if it was cancelled (or
    /// cleared) while queued.
    fn begin(&self, task_id: &str) -> Option<(ExecutionRequest, CancellationToken)> {
        let mut registry = self.registry.write();
        let entry = registry.entries.get_mut(task_id)?;
        if entry.task.status != TaskStatus::Pending {
            debug!(task_id, status = %entry.task.status, "Skipping task that is no longer pending");
            return None;
        }
        entry.task.status = TaskStatus::Running;
        entry.task.started_at = Some(Utc::now());

        let request = ExecutionRequest {
            task_id: entry.task.task_id.clone(),
            strategy_id: entry.task.strategy_id.clone(),
            kind: entry.task.kind.clone(),
            config: entry.task.config.clone(),
        };
        let cancel = entry.cancel.clone();
        self.publish_gauges(&registry);
        Some((request, cancel))
    }

    /// Apply an executor outcome.
    fn finish(&self, task_id: &str, outcome: TaskOutcome) {
        let mut registry = self.registry.write();
        let Some(entry) = registry.entries.get_mut(task_id) else {
            warn!(task_id, "Finished task vanished from registry");
            return;
        };
        let task = &mut entry.task;

        let (status, result, failure) = match outcome {
            TaskOutcome::Finished(result) => (TaskStatus::Completed, Some(result), None),
            TaskOutcome::Failed { error, result } if error.is_cancelled() => {
                (TaskStatus::Cancelled, result, Some(error))
            }
            TaskOutcome::Failed { error, result } => (TaskStatus::Failed, result, Some(error)),
        };
        task.status = status;
        task.result = result;
        task.error = failure.as_ref().map(ToString::to_string);
        task.failure = failure;
        task.completed_at = Some(Utc::now());

        match status {
            TaskStatus::Completed => info!(task_id, "Task completed"),
            _ => warn!(task_id, %status, error = task.error.as_deref().unwrap_or_default(), "Task did not complete"),
        }
        record_task_finished(task.kind.label(), status.label());
        self.publish_gauges(&registry);
        drop(registry);
        self.notify();
    }

    /// Mark every pending task CANCELLED and fire every task token.
    fn cancel_outstanding(&self) -> usize {
        let mut registry = self.registry.write();
        let now = Utc::now();
        let mut cancelled = 0;
        for entry in registry.entries.values_mut() {
            match entry.task.status {
                TaskStatus::Pending => {
                    entry.task.status = TaskStatus::Cancelled;
                    entry.task.completed_at = Some(now);
                    entry.task.error = Some("cancelled by scheduler shutdown".to_string());
                    entry.cancel.cancel();
                    record_task_finished(entry.task.kind.label(), TaskStatus::Cancelled.label());
                    cancelled += 1;
                }
                TaskStatus::Running => entry.cancel.cancel(),
                _ => {}
            }
        }
        self.publish_gauges(&registry);
        drop(registry);
        self.notify();
        cancelled
    }
}

async fn worker_loop(worker_id: usize, inner: Arc<Inner>, queue: Queue) {
    debug!(worker_id, "Worker started");
    loop {
        let next = {
            let mut receiver = queue.lock().await;
            tokio::select! {
                biased;
                () = inner.shutdown.cancelled() => None,
                task_id = receiver.recv() => task_id,
            }
        };
        let Some(task_id) = next else {
            break;
        };
        let Some((request, cancel)) = inner.begin(&task_id) else {
            continue;
        };

        let span = info_span!(
            "task",
            task_id = %request.task_id,
            strategy_id = %request.strategy_id,
            kind = %request.kind,
            worker_id
        );
        // A panicking executor must not take the worker (or the task) down.
        let executor = Arc::clone(&inner.executor);
        let run = tokio::spawn(
            async move { executor.execute(&request, cancel).await }.instrument(span),
        );
        let outcome = match run.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(task_id = %task_id, worker_id, error = %e, "Task execution aborted");
                crashed(e)
            }
        };
        inner.finish(&task_id, outcome);
    }
    debug!(worker_id, "Worker stopped");
}

/// FAILED outcome for an execution that panicked or was aborted.
fn crashed(error: JoinError) -> TaskOutcome {
    let message = if error.is_panic() {
        let payload = error.into_panic();
        payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string())
    } else {
        error.to_string()
    };
    TaskOutcome::Failed {
        error: ExecutionFailure::new(FailureKind::Crashed, message),
        result: None,
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Bounded-concurrency task scheduler.
pub struct TaskScheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("max_workers", &self.inner.max_workers)
            .field("max_tasks", &self.inner.max_tasks)
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl TaskScheduler {
    /// Start the worker pool. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns a validation error when `max_workers` or `max_tasks` is zero.
    pub fn start(config: &SchedulerConfig, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        if config.max_workers == 0 {
            return Err(OrchestratorError::validation(
                "max_workers must be greater than 0",
            ));
        }
        if config.max_tasks == Some(0) {
            return Err(OrchestratorError::validation(
                "max_tasks must be greater than 0 when set",
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let (changes, _) = watch::channel(0);
        let inner = Arc::new(Inner {
            registry: RwLock::new(Registry::default()),
            sender: Mutex::new(Some(sender)),
            shutdown: CancellationToken::new(),
            changes,
            executor,
            max_workers: config.max_workers,
            max_tasks: config.max_tasks,
        });

        let queue: Queue = Arc::new(tokio::sync::Mutex::new(receiver));
        let workers = (0..config.max_workers)
            .map(|worker_id| tokio::spawn(worker_loop(worker_id, Arc::clone(&inner), Arc::clone(&queue))))
            .collect();

        info!(
            max_workers = config.max_workers,
            max_tasks = ?config.max_tasks,
            "Task scheduler started"
        );

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
        })
    }

    /// Worker pool size.
    #[must_use]
    pub fn max_workers(&self) -> usize {
        self.inner.max_workers
    }

    /// Whether submissions are closed.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.sender.lock().is_none()
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Submit a task with a generated id.
    ///
    /// # Errors
    ///
    /// Validation errors for bad input, [`OrchestratorError::Capacity`] when
    /// the registry is full, [`OrchestratorError::ShuttingDown`] after
    /// shutdown. Execution failures never surface here.
    pub fn submit(
        &self,
        kind: TaskKind,
        strategy_id: impl Into<String>,
        config: BacktestConfig,
    ) -> Result<String> {
        self.submit_request(TaskRequest::new(kind, strategy_id, config))
    }

    /// Submit a task under a caller-assigned id.
    ///
    /// # Errors
    ///
    /// As [`submit`](Self::submit), plus a validation error if the id is
    /// already registered.
    pub fn submit_with_id(
        &self,
        task_id: impl Into<String>,
        kind: TaskKind,
        strategy_id: impl Into<String>,
        config: BacktestConfig,
    ) -> Result<String> {
        self.submit_request(TaskRequest::new(kind, strategy_id, config).with_id(task_id))
    }

    /// Submit one request.
    ///
    /// # Errors
    ///
    /// As [`submit_with_id`](Self::submit_with_id).
    pub fn submit_request(&self, request: TaskRequest) -> Result<String> {
        let mut ids = self.submit_batch(vec![request])?;
        ids.pop()
            .ok_or_else(|| OrchestratorError::validation("empty submission"))
    }

    /// Submit several requests. All are validated before any is queued; on
    /// error nothing is registered.
    ///
    /// # Errors
    ///
    /// As [`submit_with_id`](Self::submit_with_id), for any request.
    pub fn submit_batch(&self, requests: Vec<TaskRequest>) -> Result<Vec<String>> {
        for request in &requests {
            request.validate()?;
        }

        let sender_guard = self.inner.sender.lock();
        let Some(sender) = sender_guard.as_ref() else {
            return Err(OrchestratorError::ShuttingDown);
        };
        let mut registry = self.inner.registry.write();

        if let Some(limit) = self.inner.max_tasks
            && registry.entries.len() + requests.len() > limit
        {
            return Err(OrchestratorError::Capacity { limit });
        }

        let mut ids = Vec::with_capacity(requests.len());
        for request in &requests {
            let task_id = request
                .task_id
                .clone()
                .unwrap_or_else(|| Uuid::new_v4().to_string());
            if registry.entries.contains_key(&task_id) || ids.contains(&task_id) {
                return Err(OrchestratorError::validation(format!(
                    "task id '{task_id}' is already registered"
                )));
            }
            ids.push(task_id);
        }

        for (request, task_id) in requests.into_iter().zip(&ids) {
            let kind = request.kind.label();
            info!(
                task_id = %task_id,
                strategy_id = %request.strategy_id,
                kind,
                "Task submitted"
            );
            record_task_submitted(kind);

            let entry = Entry {
                task: Task::pending(request, task_id.clone()),
                cancel: self.inner.shutdown.child_token(),
            };
            registry.entries.insert(task_id.clone(), entry);
            registry.order.push(task_id.clone());

            if sender.send(task_id.clone()).is_err() {
                // Every worker has exited. Ids already queued from this batch
                // are skipped by `begin` once their entries are gone.
                warn!(task_id = %task_id, "No workers available, rolling back batch");
                registry.remove_all(&ids);
                self.inner.publish_gauges(&registry);
                return Err(OrchestratorError::ShuttingDown);
            }
        }

        self.inner.publish_gauges(&registry);
        Ok(ids)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Snapshot of one task.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] for an unknown id.
    pub fn get_task(&self, task_id: &str) -> Result<Task> {
        self.inner
            .registry
            .read()
            .entries
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| OrchestratorError::not_found(task_id))
    }

    /// Consistent counts over the registry.
    #[must_use]
    pub fn get_statistics(&self) -> SchedulerStatistics {
        self.inner.registry.read().statistics(self.inner.max_workers)
    }

    /// Task snapshots in submission order, optionally filtered by status.
    #[must_use]
    pub fn list_tasks(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.inner
            .registry
            .read()
            .ordered()
            .filter(|task| status.is_none_or(|s| task.status == s))
            .cloned()
            .collect()
    }

    /// Drop terminal tasks from the registry. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        let mut registry = self.inner.registry.write();
        let before = registry.entries.len();
        registry.entries.retain(|_, entry| !entry.task.is_terminal());
        let Registry { entries, order } = &mut *registry;
        order.retain(|id| entries.contains_key(id));
        let removed = before - registry.entries.len();
        debug!(removed, "Cleared terminal tasks");
        removed
    }

    // -------------------------------------------------------------------------
    // Cancellation & Waiting
    // -------------------------------------------------------------------------

    /// Cancel a task. Pending tasks become CANCELLED immediately; running
    /// tasks have their process killed and become CANCELLED when the executor
    /// returns. Returns `false` if the task had already finished.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] for an unknown id.
    pub fn cancel_task(&self, task_id: &str) -> Result<bool> {
        let mut registry = self.inner.registry.write();
        let entry = registry
            .entries
            .get_mut(task_id)
            .ok_or_else(|| OrchestratorError::not_found(task_id))?;

        match entry.task.status {
            TaskStatus::Pending => {
                entry.cancel.cancel();
                entry.task.status = TaskStatus::Cancelled;
                entry.task.completed_at = Some(Utc::now());
                entry.task.error = Some("cancelled before start".to_string());
                record_task_finished(entry.task.kind.label(), TaskStatus::Cancelled.label());
                info!(task_id, "Pending task cancelled");
                self.inner.publish_gauges(&registry);
                drop(registry);
                self.inner.notify();
                Ok(true)
            }
            TaskStatus::Running => {
                entry.cancel.cancel();
                info!(task_id, "Cancellation requested for running task");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Wait until a task is terminal and return its final snapshot.
    ///
    /// # Errors
    ///
    /// [`OrchestratorError::NotFound`] for an unknown (or cleared) id.
    pub async fn wait_for(&self, task_id: &str) -> Result<Task> {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let task = self.get_task(task_id)?;
            if task.is_terminal() {
                return Ok(task);
            }
            if changes.changed().await.is_err() {
                return self.get_task(task_id);
            }
        }
    }

    /// Wait until nothing is pending or running.
    pub async fn wait_idle(&self) -> SchedulerStatistics {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let stats = self.get_statistics();
            if stats.is_idle() || changes.changed().await.is_err() {
                return stats;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Shutdown
    // -------------------------------------------------------------------------

    /// Stop accepting submissions.
    ///
    /// With `wait`, queued and running tasks run to completion and the
    /// workers are joined. Without it, pending tasks are cancelled and running
    /// processes are killed, and this returns without waiting; running tasks
    /// end CANCELLED once their executor returns (see [`wait_idle`](Self::wait_idle)).
    pub async fn shutdown(&self, wait: bool) {
        drop(self.inner.sender.lock().take());

        if !wait {
            self.inner.shutdown.cancel();
            let cancelled = self.inner.cancel_outstanding();
            info!(cancelled_pending = cancelled, "Scheduler shutting down, tasks cancelled");
            return;
        }

        info!("Scheduler shutting down, draining queue");
        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Worker ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        // Workers hold the inner state; without this they would idle forever.
        self.inner.shutdown.cancel();
    }
}
