//! Worker process supervision.
//!
//! [`ProcessSupervisor::spawn`] launches the worker and returns a
//! [`WorkerProcess`] handle. The handle exposes the pid, a blocking
//! [`wait`](WorkerProcess::wait) that yields a [`WorkerExit`], and a
//! [`KillSwitch`] that can be cloned out and triggered from any task.
//! Killing an already exited process is a no-op.

use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::command::WorkerCommand;

// ---------------------------------------------------------------------------
// Exit classification
// ---------------------------------------------------------------------------

/// How a worker process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    /// Exited with a non-zero code.
    Failed { code: i32 },
    /// Terminated by a signal (unix only).
    Signaled { signal: i32 },
}

impl WorkerExit {
    pub fn success(self) -> bool {
        self == Self::Success
    }
}

impl From<std::process::ExitStatus> for WorkerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            return Self::Success;
        }
        if let Some(code) = status.code() {
            return Self::Failed { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Self::Signaled { signal };
            }
        }
        Self::Failed { code: -1 }
    }
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "exited successfully"),
            Self::Failed { code } => write!(f, "exited with code {code}"),
            Self::Signaled { signal } => write!(f, "terminated by signal {signal}"),
        }
    }
}

/// Errors from spawning or waiting on a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The executable could not be started (missing binary, fork failure).
    #[error("failed to spawn worker '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Waiting for the process failed, or its monitor task went away.
    #[error("failed to wait for worker: {0}")]
    Wait(#[source] io::Error),
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cloneable trigger that asks the supervisor to terminate a worker.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch(CancellationToken);

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination. Idempotent, and harmless after exit.
    pub fn kill(&self) {
        self.0.cancel();
    }

    pub fn is_killed(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once [`kill`](Self::kill) has been called.
    pub async fn killed(&self) {
        self.0.cancelled().await;
    }
}

/// A running worker.
#[derive(Debug)]
pub struct WorkerProcess {
    pid: Option<u32>,
    kill: KillSwitch,
    exit: oneshot::Receiver<io::Result<WorkerExit>>,
}

impl WorkerProcess {
    /// Assemble a handle from its parts.
    ///
    /// `exit` must resolve once the process is gone; whoever owns the
    /// sending half is expected to watch `kill` and terminate the process
    /// when it fires.
    pub fn new(
        pid: Option<u32>,
        kill: KillSwitch,
        exit: oneshot::Receiver<io::Result<WorkerExit>>,
    ) -> Self {
        Self { pid, kill, exit }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill.clone()
    }

    pub fn kill(&self) {
        self.kill.kill();
    }

    /// Block until the process exits.
    pub async fn wait(self) -> Result<WorkerExit, WorkerError> {
        match self.exit.await {
            Ok(Ok(exit)) => Ok(exit),
            Ok(Err(e)) => Err(WorkerError::Wait(e)),
            Err(_) => Err(WorkerError::Wait(io::Error::other(
                "worker monitor exited without reporting a status",
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisors
// ---------------------------------------------------------------------------

/// Spawns workers. Implemented by [`TokioSupervisor`] in production and by
/// fakes in dispatcher tests.
pub trait ProcessSupervisor: Send + Sync {
    fn spawn(&self, command: &WorkerCommand) -> Result<WorkerProcess, WorkerError>;
}

/// How long a worker may take to exit after SIGTERM before it is killed.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Supervisor backed by `tokio::process`.
///
/// Each spawned child is owned by a monitor task that waits for exit and
/// reacts to the kill switch: SIGTERM first, SIGKILL once the grace period
/// runs out. Must be called from within a Tokio runtime.
#[derive(Debug, Clone, Copy)]
pub struct TokioSupervisor {
    kill_grace: Duration,
}

impl TokioSupervisor {
    pub fn with_kill_grace(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }
}

impl Default for TokioSupervisor {
    fn default() -> Self {
        Self::with_kill_grace(DEFAULT_KILL_GRACE)
    }
}

impl ProcessSupervisor for TokioSupervisor {
    fn spawn(&self, command: &WorkerCommand) -> Result<WorkerProcess, WorkerError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| WorkerError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let pid = child.id();
        let kill = KillSwitch::new();
        let monitor_kill = kill.clone();
        let (tx, rx) = oneshot::channel();
        let job_id = command.job_id.clone();
        let grace = self.kill_grace;

        tracing::info!(job_id = %job_id, pid, program = %command.program, "Worker spawned");

        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                () = monitor_kill.killed() => {
                    terminate(&mut child);
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(status) => status,
                        Err(_) => {
                            tracing::warn!(job_id = %job_id, pid, "Worker ignored SIGTERM, killing it");
                            let _ = child.start_kill();
                            child.wait().await
                        }
                    }
                }
            };
            let _ = tx.send(status.map(WorkerExit::from));
        });

        Ok(WorkerProcess::new(pid, kill, rx))
    }
}

/// Send SIGTERM so the worker can shut down its own children; fall back to
/// a hard kill if signalling fails.
#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and has no memory-safety
    // preconditions. The child has not been reaped yet, so the pid is ours.
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret != 0 {
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
