//! Task runner port - interface for the execution substrate.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{Agent, Task};

/// Output of a successfully executed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Result payload recorded on the task
    pub output: String,
}

impl TaskOutcome {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Trait for task execution backends.
///
/// The coordinator launches each assignment through this port and wraps the
/// call in the task's timeout; implementations must release resources
/// promptly when the future is dropped on cancellation.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Runner name for logs.
    fn name(&self) -> &'static str;

    /// Execute a task on the given agent to completion.
    async fn run(&self, task: &Task, agent: &Agent) -> SwarmResult<TaskOutcome>;
}
