//! Child process supervision.
//!
//! Runs one engine invocation to completion with a wall-clock timeout and a
//! cancellation token. On Unix the engine leads its own process group, so
//! helpers it forks (hyperopt workers, wrapper scripts) are signalled with it.
//! On timeout or cancellation the group gets SIGTERM, then SIGKILL once the
//! grace window has passed, and the leader is reaped before returning. Any
//! group members left after a normal exit are killed too, so no engine
//! process outlives its task. Output readers get the same grace window after
//! exit; anything still blocked after that is abandoned.

use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::command::EngineCommand;

/// Errors that prevent a process outcome from being observed.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Waiting on the child failed.
    #[error("failed to wait on engine process: {0}")]
    Wait(std::io::Error),
}

/// How a supervised run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The process exited on its own.
    Exited(ExitStatus),
    /// The timeout elapsed and the process was killed.
    TimedOut,
    /// Cancellation was requested and the process was killed.
    Cancelled,
}

/// Captured result of a supervised run.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// How the run ended.
    pub outcome: ProcessOutcome,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Time from spawn to exit (or kill).
    pub duration: Duration,
}

impl ProcessOutput {
    /// Whether the process exited with status 0.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, ProcessOutcome::Exited(status) if status.success())
    }

    /// Duration in whole milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

/// Run `command` until it exits, times out, or `cancel` fires.
///
/// # Errors
///
/// Returns [`ProcessError::Spawn`] when the program cannot be started and
/// [`ProcessError::Wait`] when the OS fails to report its exit.
pub async fn run_process(
    command: &EngineCommand,
    timeout: Duration,
    grace: Duration,
    cancel: &CancellationToken,
) -> Result<ProcessOutput, ProcessError> {
    info!(program = %command.program, args = ?command.args, "Spawning engine process");

    let started = Instant::now();
    let mut builder = Command::new(&command.program);
    builder
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    builder.process_group(0);
    let mut child = builder.spawn().map_err(|source| ProcessError::Spawn {
        program: command.program.clone(),
        source,
    })?;
    let mut group = ProcessGroup::of(&child);

    let stdout_reader = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_reader = tokio::spawn(read_stream(child.stderr.take()));

    let waited = tokio::select! {
        status = child.wait() => Waited::Exited(status),
        () = tokio::time::sleep(timeout) => Waited::TimedOut,
        () = cancel.cancelled() => Waited::Cancelled,
    };

    let outcome = match waited {
        Waited::Exited(status) => ProcessOutcome::Exited(status.map_err(ProcessError::Wait)?),
        Waited::TimedOut => {
            warn!(
                program = %command.program,
                timeout_secs = timeout.as_secs(),
                "Engine process timed out, killing"
            );
            terminate(&mut child, &mut group, grace).await;
            ProcessOutcome::TimedOut
        }
        Waited::Cancelled => {
            info!(program = %command.program, "Engine process cancelled, killing");
            terminate(&mut child, &mut group, grace).await;
            ProcessOutcome::Cancelled
        }
    };
    let duration = started.elapsed();
    // Stragglers from a normal exit would otherwise hold the pipes open.
    group.kill();

    let stdout = collect(stdout_reader, grace, "stdout").await;
    let stderr = collect(stderr_reader, grace, "stderr").await;

    if let ProcessOutcome::Exited(status) = outcome {
        info!(
            program = %command.program,
            exit_code = ?status.code(),
            duration_ms = duration.as_millis(),
            "Engine process exited"
        );
    }

    Ok(ProcessOutput {
        outcome,
        stdout,
        stderr,
        duration,
    })
}

/// SIGTERM the group, give it `grace` to exit, then SIGKILL the group and
/// reap the leader.
async fn terminate(child: &mut Child, group: &mut ProcessGroup, grace: Duration) {
    group.terminate();
    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        debug!(grace_ms = grace.as_millis(), "Engine ignored SIGTERM, escalating");
    }
    group.kill();
    if let Err(e) = child.kill().await {
        // Already exited and reaped.
        debug!(error = %e, "Kill after timeout/cancel failed");
    }
}

/// The engine's process group. Dropping it while armed kills the group, so
/// an aborted supervisor does not leave engine helpers behind.
#[derive(Debug)]
struct ProcessGroup {
    /// Group id (the leader's pid); `None` when the leader already exited.
    pgid: Option<i32>,
    armed: bool,
}

impl ProcessGroup {
    fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().and_then(|id| i32::try_from(id).ok()),
            armed: true,
        }
    }

    fn terminate(&self) {
        self.signal(GroupSignal::Terminate);
    }

    fn kill(&mut self) {
        if self.armed {
            self.signal(GroupSignal::Kill);
            self.armed = false;
        }
    }

    #[cfg(unix)]
    fn signal(&self, signal: GroupSignal) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pgid else {
            return;
        };
        let signal = match signal {
            GroupSignal::Terminate => Signal::SIGTERM,
            GroupSignal::Kill => Signal::SIGKILL,
        };
        match killpg(Pid::from_raw(pgid), signal) {
            Ok(()) => debug!(pgid, signal = ?signal, "Signalled engine process group"),
            // ESRCH: every member already exited.
            Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!(pgid, signal = ?signal, error = %e, "Failed to signal engine process group"),
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: GroupSignal) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[derive(Debug, Clone, Copy)]
enum GroupSignal {
    Terminate,
    Kill,
}

async fn read_stream<R>(stream: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream
        && let Err(e) = stream.read_to_end(&mut buf).await
    {
        debug!(error = %e, "Engine output stream closed with error");
    }
    buf
}

async fn collect(mut reader: JoinHandle<Vec<u8>>, grace: Duration, stream: &'static str) -> String {
    match tokio::time::timeout(grace, &mut reader).await {
        Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
        Ok(Err(e)) => {
            debug!(stream, error = %e, "Output reader task failed");
            String::new()
        }
        Err(_) => {
            reader.abort();
            warn!(stream, "Output reader did not finish within grace period");
            String::new()
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> EngineCommand {
        EngineCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    const GRACE: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_captures_output_and_exit_code() {
        let output = run_process(
            &shell("echo hello; echo oops >&2; exit 3"),
            Duration::from_secs(10),
            GRACE,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let ProcessOutcome::Exited(status) = output.outcome else {
            panic!("expected exit, got {:?}", output.outcome);
        };
        assert_eq!(status.code(), Some(3));
        assert!(!output.succeeded());
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let started = Instant::now();
        let output = run_process(
            &shell("exec sleep 30"),
            Duration::from_millis(200),
            GRACE,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(output.outcome, ProcessOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancel_kills_process() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let output = run_process(&shell("exec sleep 30"), Duration::from_secs(30), GRACE, &cancel)
            .await
            .unwrap();
        assert_eq!(output.outcome, ProcessOutcome::Cancelled);
    }

    /// Whether `pid` is a live (non-zombie) process.
    fn is_running(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .is_some_and(|state| state != "Z")
        })
    }

    async fn gone_within(pid: &str, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        !is_running(pid)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_timeout_kills_forked_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("helper.pid");
        let script = format!("sleep 37 & echo $! > '{}'; wait", pidfile.display());

        let output = run_process(
            &shell(&script),
            Duration::from_millis(300),
            Duration::from_millis(200),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(output.outcome, ProcessOutcome::TimedOut);

        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(
            gone_within(pid.trim(), Duration::from_secs(5)).await,
            "helper {} survived the timeout",
            pid.trim()
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_cancel_kills_helper_that_ignores_sigterm() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("helper.pid");
        let script = format!(
            "sh -c 'trap \"\" TERM; while :; do sleep 1; done' & echo $! > '{}'; wait",
            pidfile.display()
        );
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let output = run_process(&shell(&script), Duration::from_secs(30), Duration::from_millis(200), &cancel)
            .await
            .unwrap();
        assert_eq!(output.outcome, ProcessOutcome::Cancelled);

        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(gone_within(pid.trim(), Duration::from_secs(5)).await);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_normal_exit_reaps_background_helpers() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("helper.pid");
        let script = format!("sleep 37 >/dev/null 2>&1 & echo $! > '{}'; echo done", pidfile.display());

        let output = run_process(&shell(&script), Duration::from_secs(10), GRACE, &CancellationToken::new())
            .await
            .unwrap();
        assert!(output.succeeded());
        assert_eq!(output.stdout.trim(), "done");

        let pid = std::fs::read_to_string(&pidfile).unwrap();
        assert!(gone_within(pid.trim(), Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let command = EngineCommand {
            program: "/definitely/not/an/engine".to_string(),
            args: Vec::new(),
        };
        let Err(err) = run_process(&command, Duration::from_secs(1), GRACE, &CancellationToken::new()).await
        else {
            panic!("spawn should fail");
        };
        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert!(err.to_string().contains("/definitely/not/an/engine"));
    }
}
