//! Subprocess runner port - interface for executing verification commands.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::error::SwarmResult;

/// Specification of one subprocess invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandSpec {
    /// Program or shell command line
    pub command: String,
    /// Arguments; when empty the command is run through the shell
    pub args: Vec<String>,
    /// Working directory
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// Timeout in milliseconds; None means no timeout
    pub timeout_ms: Option<u64>,
}

impl CommandSpec {
    /// A shell command line, interpreted by `sh -c`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}

/// Captured output of a subprocess.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; None when the process was killed by a signal or timed out
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// True when the process was killed for exceeding its timeout
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Trait for subprocess execution.
///
/// A timeout must terminate the process (SIGTERM, then SIGKILL after a short
/// grace period) and report `timed_out = true`. A spawn error is surfaced as
/// an error, never swallowed.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Execute a command to completion, honouring its timeout.
    async fn run(&self, spec: CommandSpec) -> SwarmResult<CommandOutput>;
}
