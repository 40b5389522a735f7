//! Process spawning and group termination.
//!
//! The simulator is spawned with `process_group(0)` so it becomes the
//! leader of a fresh process group; termination signals the whole group,
//! reaching any helper processes the simulator forks. Both output streams
//! are piped and drained by background tasks that forward lines to the
//! tracing sink (stdout at `info`, stderr at `error`) until end-of-file,
//! so a chatty simulator can never block episode progress on a full pipe.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{ProcessError, ProcessSpec};

/// Which output stream a drain task is reading.
#[derive(Debug, Clone, Copy)]
enum StreamKind {
    Stdout,
    Stderr,
}

/// A running simulator subprocess.
///
/// Owns the child handle and the two output-drain tasks. Termination is
/// idempotent and best-effort: it signals the process group without
/// waiting for the OS to reap anything.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: u32,
    name: String,
    terminated: bool,
    stdout_drain: Option<JoinHandle<()>>,
    stderr_drain: Option<JoinHandle<()>>,
}

/// Spawn a simulator process according to its specification.
///
/// # Errors
///
/// Returns [`ProcessError::SpawnFailed`] if the process cannot be started
/// and [`ProcessError::NoPid`] if the PID cannot be obtained afterwards.
pub fn spawn(spec: &ProcessSpec) -> Result<ProcessHandle, ProcessError> {
    let mut cmd = Command::new(&spec.program);

    cmd.args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false);

    #[cfg(unix)]
    cmd.process_group(0);

    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

    let pid = child.id().ok_or(ProcessError::NoPid)?;

    let stdout_drain = child
        .stdout
        .take()
        .map(|stream| drain_lines(stream, spec.name.clone(), StreamKind::Stdout));
    let stderr_drain = child
        .stderr
        .take()
        .map(|stream| drain_lines(stream, spec.name.clone(), StreamKind::Stderr));

    debug!(process = %spec.name, pid, "simulator process spawned");

    Ok(ProcessHandle {
        child,
        pid,
        name: spec.name.clone(),
        terminated: false,
        stdout_drain,
        stderr_drain,
    })
}

/// Forwards lines from a child stream to the tracing sink until EOF.
fn drain_lines<R>(stream: R, name: String, kind: StreamKind) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match kind {
                    StreamKind::Stdout => info!(process = %name, "{line}"),
                    StreamKind::Stderr => error!(process = %name, "{line}"),
                },
                Ok(None) => break,
                Err(err) => {
                    debug!(process = %name, %err, "output drain stopped");
                    break;
                }
            }
        }
    })
}

impl ProcessHandle {
    /// Returns the OS process ID (also the process-group ID).
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Non-blocking liveness probe.
    ///
    /// Polls the exit status without waiting; a process whose status
    /// cannot be queried is reported as not running.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Signals the whole process group with `SIGTERM`.
    ///
    /// Does not wait for the process to exit; a later episode start is
    /// allowed to proceed before the OS has reaped it. Calling this twice,
    /// or on a process that already exited, is a no-op. The output drains
    /// are abandoned here; they would otherwise end on their own at EOF.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if self.is_running() {
            self.signal_group();
        } else {
            debug!(process = %self.name, pid = self.pid, "process already exited");
        }

        if let Some(drain) = self.stdout_drain.take() {
            drain.abort();
        }
        if let Some(drain) = self.stderr_drain.take() {
            drain.abort();
        }
    }

    #[cfg(unix)]
    fn signal_group(&self) {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        #[allow(clippy::cast_possible_wrap)]
        let pgid = Pid::from_raw(self.pid as i32);
        match killpg(pgid, Signal::SIGTERM) {
            Ok(()) => debug!(process = %self.name, pid = self.pid, "SIGTERM sent to process group"),
            Err(Errno::ESRCH) => {
                debug!(process = %self.name, pid = self.pid, "process group already gone");
            }
            Err(err) => {
                warn!(process = %self.name, pid = self.pid, %err, "failed to signal process group");
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_group(&mut self) {
        // No process groups: fall back to killing the direct child.
        if let Err(err) = self.child.start_kill() {
            warn!(process = %self.name, pid = self.pid, %err, "failed to kill process");
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // Error paths in the driver may drop the handle without an explicit
        // teardown; make sure the group does not outlive us.
        self.terminate();
    }
}
