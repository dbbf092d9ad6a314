//! Task domain model.
//!
//! Tasks are discrete units of work that agents execute. Within an objective
//! they form a DAG: a task never runs before all of its dependencies have
//! completed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};

/// Status of a task in the execution pipeline.
///
/// The observable sequence is strictly
/// `pending → running → (completed | failed | pending-for-retry)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for dependencies and an idle agent
    Pending,
    /// Assigned to an agent and executing
    Running,
    /// Finished successfully and passed verification
    Completed,
    /// Exhausted its retry budget
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            // Running → Pending is the retry path
            Self::Pending => &[Self::Running, Self::Failed],
            Self::Running => &[Self::Completed, Self::Failed, Self::Pending],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// A discrete unit of work with dependencies, priority, timeout, and a
/// retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// What kind of work this is (e.g. "research", "implementation");
    /// the scheduler matches it against agent types
    pub kind: String,
    /// Detailed description/prompt
    pub description: String,
    /// Owning objective (None for directly submitted tasks)
    pub objective_id: Option<Uuid>,
    /// Priority; higher is more urgent
    pub priority: u8,
    /// Task IDs this depends on
    pub dependencies: HashSet<Uuid>,
    /// Agent currently (or last) assigned
    pub assigned_to: Option<Uuid>,
    /// Current status
    pub status: TaskStatus,
    /// Output produced on success
    pub result: Option<String>,
    /// Last error message on failure
    pub error: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When execution started
    pub started_at: Option<DateTime<Utc>>,
    /// When reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
    /// Retry count so far; never exceeds `max_retries`
    pub retry_count: u32,
    /// Maximum retries
    pub max_retries: u32,
    /// Execution timeout in milliseconds, measured from `started_at`
    pub timeout_ms: u64,
}

impl Task {
    /// Create a new pending task.
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            description: description.into(),
            objective_id: None,
            priority: 1,
            dependencies: HashSet::new(),
            assigned_to: None,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            retry_count: 0,
            max_retries: 3,
            timeout_ms: 300_000,
        }
    }

    /// Set the owning objective.
    pub fn with_objective(mut self, objective_id: Uuid) -> Self {
        self.objective_id = Some(objective_id);
        self
    }

    /// Add a dependency. Self-references are ignored.
    pub fn with_dependency(mut self, task_id: Uuid) -> Self {
        if task_id != self.id {
            self.dependencies.insert(task_id);
        }
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the execution timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Check if task is terminal.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Transition to a new status, enforcing the state machine.
    pub fn transition_to(&mut self, new_status: TaskStatus) -> SwarmResult<()> {
        if !self.status.can_transition_to(new_status) {
            return Err(SwarmError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }
        self.status = new_status;
        match new_status {
            TaskStatus::Running => self.started_at = Some(Utc::now()),
            TaskStatus::Completed | TaskStatus::Failed => {
                self.completed_at = Some(Utc::now());
            }
            TaskStatus::Pending => {}
        }
        Ok(())
    }

    /// Mark the task running on the given agent.
    pub fn assign(&mut self, agent_id: Uuid) -> SwarmResult<()> {
        self.transition_to(TaskStatus::Running)?;
        self.assigned_to = Some(agent_id);
        Ok(())
    }

    /// Record a successful result and mark completed.
    pub fn complete(&mut self, result: impl Into<String>) -> SwarmResult<()> {
        self.transition_to(TaskStatus::Completed)?;
        self.result = Some(result.into());
        Ok(())
    }

    /// Whether another retry is available after a failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Record a failure. Returns to pending when the retry budget allows,
    /// otherwise transitions to failed. Returns the resulting status.
    pub fn record_failure(&mut self, error: impl Into<String>) -> SwarmResult<TaskStatus> {
        self.error = Some(error.into());
        if self.can_retry() {
            self.retry_count += 1;
            self.transition_to(TaskStatus::Pending)?;
            self.assigned_to = None;
            self.started_at = None;
        } else {
            self.transition_to(TaskStatus::Failed)?;
        }
        Ok(self.status)
    }

    /// How long the task has been running, if it is running.
    pub fn running_for(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        if self.status == TaskStatus::Running {
            self.started_at.map(|s| now - s)
        } else {
            None
        }
    }

    /// Check whether a running task has exceeded its timeout.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.running_for(now)
            .map(|d| d.num_milliseconds() >= self.timeout_ms as i64)
            .unwrap_or(false)
    }

    /// Validate task shape.
    pub fn validate(&self) -> SwarmResult<()> {
        if self.dependencies.contains(&self.id) {
            return Err(SwarmError::DependencyMissing {
                task: self.id,
                dependency: self.id,
            });
        }
        Ok(())
    }
}
