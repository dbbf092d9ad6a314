//! Mock collaborators for tests and offline runs.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Agent, Task};
use crate::domain::ports::{
    CommandOutput, CommandSpec, ProcessRunner, TaskOutcome, TaskRunner,
};

/// Scripted task runner.
///
/// By default every task succeeds after a configurable delay. Failures can
/// be scripted per task kind (a bounded number of times) or per agent
/// (always), and kinds can be made to hang until the scheduler's timeout
/// cancels them.
pub struct MockTaskRunner {
    delay: Duration,
    /// kind → queue of scripted error messages, consumed front first
    scripted_failures: Mutex<HashMap<String, VecDeque<String>>>,
    /// agents that fail every task
    failing_agents: Mutex<HashSet<Uuid>>,
    /// kinds that never return
    hanging_kinds: Mutex<HashSet<String>>,
    /// (task id, agent id) per invocation
    calls: Arc<Mutex<Vec<(Uuid, Uuid)>>>,
}

impl MockTaskRunner {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(10))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            scripted_failures: Mutex::new(HashMap::new()),
            failing_agents: Mutex::new(HashSet::new()),
            hanging_kinds: Mutex::new(HashSet::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Script the next `times` executions of `kind` to fail with `error`.
    pub fn fail_kind(&self, kind: impl Into<String>, times: usize, error: impl Into<String>) {
        let error = error.into();
        let mut scripted = self.scripted_failures.lock().unwrap();
        let queue = scripted.entry(kind.into()).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Make every execution on the given agent fail.
    pub fn fail_agent(&self, agent_id: Uuid) {
        self.failing_agents.lock().unwrap().insert(agent_id);
    }

    /// Make executions of the given kind hang until cancelled.
    pub fn hang_kind(&self, kind: impl Into<String>) {
        self.hanging_kinds.lock().unwrap().insert(kind.into());
    }

    /// Shared view of the invocation log.
    pub fn calls(&self) -> Arc<Mutex<Vec<(Uuid, Uuid)>>> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for MockTaskRunner {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn run(&self, task: &Task, agent: &Agent) -> SwarmResult<TaskOutcome> {
        self.calls.lock().unwrap().push((task.id, agent.id));

        if self.hanging_kinds.lock().unwrap().contains(&task.kind) {
            // Parked until the caller's timeout cancels this future
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        if self.failing_agents.lock().unwrap().contains(&agent.id) {
            return Err(SwarmError::RunnerFailed {
                task: task.id,
                message: format!("agent {} rejected the task", agent.name),
            });
        }
        let scripted = self
            .scripted_failures
            .lock()
            .unwrap()
            .get_mut(&task.kind)
            .and_then(VecDeque::pop_front);
        if let Some(error) = scripted {
            return Err(SwarmError::RunnerFailed {
                task: task.id,
                message: error,
            });
        }
        Ok(TaskOutcome::new(format!("completed {}", task.kind)))
    }
}

enum ScriptedBehavior {
    Exit(i32),
    Timeout,
    SpawnError(String),
}

/// Scripted subprocess runner for verification tests.
///
/// A default behavior applies to every command, with optional per-command
/// overrides matched by substring.
pub struct ScriptedProcessRunner {
    default: ScriptedBehavior,
    overrides: Vec<(String, i32)>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedProcessRunner {
    /// Every command exits with the given code.
    pub fn always_exit(code: i32) -> Self {
        Self {
            default: ScriptedBehavior::Exit(code),
            overrides: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command reports a timeout.
    pub fn always_timeout() -> Self {
        Self {
            default: ScriptedBehavior::Timeout,
            overrides: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every command fails to spawn.
    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            default: ScriptedBehavior::SpawnError(message.into()),
            overrides: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Commands containing `substring` exit with `code` instead of the
    /// default behavior.
    pub fn with_exit_for(mut self, substring: impl Into<String>, code: i32) -> Self {
        self.overrides.push((substring.into(), code));
        self
    }

    /// Shared view of executed command lines.
    pub fn call_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    async fn run(&self, spec: CommandSpec) -> SwarmResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.command.clone());

        for (substring, code) in &self.overrides {
            if spec.command.contains(substring) {
                return Ok(CommandOutput {
                    exit_code: Some(*code),
                    stdout: String::new(),
                    stderr: if *code == 0 {
                        String::new()
                    } else {
                        format!("scripted failure for '{}'", spec.command)
                    },
                    timed_out: false,
                });
            }
        }
        match &self.default {
            ScriptedBehavior::Exit(code) => Ok(CommandOutput {
                exit_code: Some(*code),
                stdout: String::new(),
                stderr: if *code == 0 {
                    String::new()
                } else {
                    format!("scripted failure for '{}'", spec.command)
                },
                timed_out: false,
            }),
            ScriptedBehavior::Timeout => Ok(CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: true,
            }),
            ScriptedBehavior::SpawnError(message) => Err(SwarmError::ProcessSpawn {
                command: spec.command,
                message: message.clone(),
            }),
        }
    }
}

/// Persistence backend that fails every operation; exercises the
/// any-success persistence policy.
#[derive(Debug, Default)]
pub struct FailingBackend;

#[async_trait]
impl crate::domain::ports::PersistenceBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn save(&self, _state: &crate::domain::models::UnifiedState) -> SwarmResult<()> {
        Err(self.error())
    }

    async fn load(&self) -> SwarmResult<Option<crate::domain::models::UnifiedState>> {
        Err(self.error())
    }

    async fn save_snapshot(
        &self,
        _snapshot: &crate::domain::models::StateSnapshot,
    ) -> SwarmResult<()> {
        Err(self.error())
    }

    async fn load_snapshot(
        &self,
        _id: &str,
    ) -> SwarmResult<Option<crate::domain::models::StateSnapshot>> {
        Err(self.error())
    }

    async fn list_snapshots(&self) -> SwarmResult<Vec<String>> {
        Err(self.error())
    }

    async fn delete_snapshot(&self, _id: &str) -> SwarmResult<()> {
        Err(self.error())
    }
}

impl FailingBackend {
    fn error(&self) -> SwarmError {
        SwarmError::Persistence {
            backend: "failing".to_string(),
            message: "injected failure".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::AgentType;

    #[tokio::test]
    async fn test_mock_runner_default_success() {
        let runner = MockTaskRunner::new();
        let task = Task::new("research", "x");
        let agent = Agent::new("a1", AgentType::Researcher);
        let outcome = runner.run(&task, &agent).await.unwrap();
        assert_eq!(outcome.output, "completed research");
        assert_eq!(runner.calls().lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_runner_scripted_failures_are_consumed() {
        let runner = MockTaskRunner::new();
        runner.fail_kind("implementation", 2, "flaky");
        let task = Task::new("implementation", "x");
        let agent = Agent::new("dev", AgentType::Developer);

        assert!(runner.run(&task, &agent).await.is_err());
        assert!(runner.run(&task, &agent).await.is_err());
        assert!(runner.run(&task, &agent).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_runner_failing_agent() {
        let runner = MockTaskRunner::new();
        let good = Agent::new("good", AgentType::Developer);
        let bad = Agent::new("bad", AgentType::Developer);
        runner.fail_agent(bad.id);
        let task = Task::new("implementation", "x");

        assert!(runner.run(&task, &bad).await.is_err());
        assert!(runner.run(&task, &good).await.is_ok());
    }

    #[tokio::test]
    async fn test_scripted_process_runner_overrides() {
        let runner = ScriptedProcessRunner::always_exit(0).with_exit_for("typecheck", 2);
        let ok = runner.run(CommandSpec::shell("npm test")).await.unwrap();
        assert_eq!(ok.exit_code, Some(0));
        let bad = runner
            .run(CommandSpec::shell("npm run typecheck"))
            .await
            .unwrap();
        assert_eq!(bad.exit_code, Some(2));
    }
}
