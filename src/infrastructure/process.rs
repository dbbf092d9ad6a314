//! Tokio-backed subprocess runner.
//!
//! Commands run in their own process group so that a timeout can terminate
//! the whole tree: SIGTERM first, then SIGKILL after a short grace period.
//! Spawn errors surface as failures, never swallowed.

use async_trait::async_trait;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::ports::{CommandOutput, CommandSpec, ProcessRunner};

/// Grace period between SIGTERM and SIGKILL on timeout.
const KILL_GRACE: Duration = Duration::from_millis(500);

/// Subprocess runner built on `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn build_command(spec: &CommandSpec) -> Command {
        let mut command = if spec.args.is_empty() {
            // Bare command lines go through the shell
            let mut c = Command::new("sh");
            c.arg("-c").arg(&spec.command);
            c
        } else {
            let mut c = Command::new(&spec.command);
            c.args(&spec.args);
            c
        };
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }
        command.envs(&spec.env);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group so the whole tree dies on timeout
        #[cfg(unix)]
        command.process_group(0);
        command
    }

    /// Escalate termination: SIGTERM the group, wait out the grace period,
    /// then SIGKILL whatever is left.
    async fn terminate(child: &mut Child) {
        if let Some(pid) = child.id() {
            let pgid = Pid::from_raw(pid as i32);
            if let Err(e) = killpg(pgid, Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed; process may have exited");
            }
        }
        match tokio::time::timeout(KILL_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                warn!("Process ignored SIGTERM; sending SIGKILL");
                let _ = child.kill().await;
                let _ = child.wait().await;
            }
        }
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: CommandSpec) -> SwarmResult<CommandOutput> {
        let mut child =
            Self::build_command(&spec)
                .spawn()
                .map_err(|e| SwarmError::ProcessSpawn {
                    command: spec.command.clone(),
                    message: e.to_string(),
                })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            let mut buffer = String::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buffer).await;
            }
            buffer
        });
        let stderr_task = tokio::spawn(async move {
            let mut buffer = String::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_string(&mut buffer).await;
            }
            buffer
        });

        let (exit_code, timed_out) = match spec.timeout_ms {
            Some(ms) => {
                match tokio::time::timeout(Duration::from_millis(ms), child.wait()).await {
                    Ok(status) => {
                        let status = status.map_err(|e| SwarmError::ProcessSpawn {
                            command: spec.command.clone(),
                            message: e.to_string(),
                        })?;
                        (status.code(), false)
                    }
                    Err(_) => {
                        warn!(command = %spec.command, timeout_ms = ms, "Command timed out");
                        Self::terminate(&mut child).await;
                        (None, true)
                    }
                }
            }
            None => {
                let status = child.wait().await.map_err(|e| SwarmError::ProcessSpawn {
                    command: spec.command.clone(),
                    message: e.to_string(),
                })?;
                (status.code(), false)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        Ok(CommandOutput {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command_captures_stdout() {
        let runner = TokioProcessRunner::new();
        let output = runner
            .run(CommandSpec::shell("echo hello"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout.trim(), "hello");
        assert!(!output.timed_out);
        assert!(output.success());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let runner = TokioProcessRunner::new();
        let output = runner.run(CommandSpec::shell("exit 3")).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let runner = TokioProcessRunner::new();
        let output = runner
            .run(CommandSpec::shell("echo oops 1>&2"))
            .await
            .unwrap();
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_timeout_kills_and_flags() {
        let runner = TokioProcessRunner::new();
        let started = std::time::Instant::now();
        let output = runner
            .run(CommandSpec::shell("sleep 30").with_timeout_ms(100))
            .await
            .unwrap();
        assert!(output.timed_out);
        assert_eq!(output.exit_code, None);
        // Well under the sleep duration: the process was actually killed
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_spawn_error_surfaces() {
        let runner = TokioProcessRunner::new();
        let spec = CommandSpec {
            command: "/definitely/not/a/binary".to_string(),
            args: vec!["x".to_string()],
            ..CommandSpec::default()
        };
        let err = runner.run(spec).await.unwrap_err();
        assert_eq!(err.code(), "process-spawn");
    }

    #[tokio::test]
    async fn test_cwd_and_env_are_applied() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TokioProcessRunner::new();
        let output = runner
            .run(
                CommandSpec::shell("pwd && echo $MARKER")
                    .with_cwd(dir.path())
                    .with_env([("MARKER".to_string(), "present".to_string())].into()),
            )
            .await
            .unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert!(output.stdout.contains(canonical.to_str().unwrap()));
        assert!(output.stdout.contains("present"));
    }
}
