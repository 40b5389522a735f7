//! Simulator subprocess lifecycle.
//!
//! The external simulator runs as a subprocess rooted at a per-episode
//! working directory. This module spawns it detached into its own process
//! group (so the simulator and any children it forks can be signalled as a
//! unit), drains its output streams into the tracing sink, and provides
//! idempotent, best-effort group termination.

mod spawner;

use std::path::PathBuf;

use thiserror::Error;

pub use spawner::{spawn, ProcessHandle};

/// Errors from subprocess management.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The subprocess could not be started.
    #[error("failed to spawn simulator process: {0}")]
    SpawnFailed(String),

    /// The subprocess started but its PID could not be obtained.
    ///
    /// Without a PID there is no way to signal the process group later, so
    /// this is treated as a spawn failure.
    #[error("spawned simulator process has no accessible PID")]
    NoPid,
}

/// Specification of a subprocess to launch.
#[derive(Debug, Clone, Default)]
pub struct ProcessSpec {
    /// Short name used in log fields for the drained output.
    pub name: String,
    /// Program to execute (resolved via `PATH` if not absolute).
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
}

impl ProcessSpec {
    /// Creates a builder for a process specification.
    #[must_use]
    pub fn builder() -> ProcessSpecBuilder {
        ProcessSpecBuilder::default()
    }
}

/// Builder for [`ProcessSpec`].
#[derive(Debug, Default)]
pub struct ProcessSpecBuilder {
    spec: ProcessSpec,
}

impl ProcessSpecBuilder {
    /// Sets the log name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.spec.name = name.into();
        self
    }

    /// Sets the program to execute.
    #[must_use]
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.spec.program = program.into();
        self
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.spec.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.spec.cwd = Some(cwd.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.env.push((key.into(), value.into()));
        self
    }

    /// Finalizes the process spec.
    #[must_use]
    pub fn build(self) -> ProcessSpec {
        self.spec
    }
}
