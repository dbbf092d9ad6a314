//! Agent domain model.
//!
//! Agents are workers with a type, a capability set, and performance
//! metrics. The scheduler binds at most one running task to an agent at a
//! time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};

/// Agent type classification, matched against task kinds during dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Researcher,
    Developer,
    Analyzer,
    Coordinator,
    Reviewer,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Researcher => "researcher",
            Self::Developer => "developer",
            Self::Analyzer => "analyzer",
            Self::Coordinator => "coordinator",
            Self::Reviewer => "reviewer",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "researcher" => Some(Self::Researcher),
            "developer" => Some(Self::Developer),
            "analyzer" => Some(Self::Analyzer),
            "coordinator" => Some(Self::Coordinator),
            "reviewer" => Some(Self::Reviewer),
            _ => None,
        }
    }

    /// Whether this agent type is the preferred match for a task kind.
    ///
    /// Matching is a type-family preference, not a hard requirement: the
    /// scheduler falls back to any idle agent when no family match exists.
    /// Coordinators match every kind.
    pub fn matches_kind(&self, kind: &str) -> bool {
        let kind = kind.to_lowercase();
        match self {
            Self::Coordinator => true,
            Self::Researcher => kind.contains("research"),
            Self::Developer => kind.contains("implement"),
            Self::Analyzer => kind.contains("analysis"),
            Self::Reviewer => kind.contains("review"),
        }
    }
}

/// Status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Available for assignment
    Idle,
    /// Executing its current task
    Busy,
    /// Marked unhealthy by the health check
    Failed,
    /// Retired from the pool
    Completed,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

/// Performance metrics for an agent.
///
/// `tasks_completed + tasks_failed` is monotonic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub total_duration_ms: u64,
    pub last_activity: DateTime<Utc>,
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            tasks_failed: 0,
            total_duration_ms: 0,
            last_activity: Utc::now(),
        }
    }
}

impl AgentMetrics {
    /// Success ratio used for agent selection: `completed / (failed + 1)`.
    pub fn success_ratio(&self) -> f64 {
        self.tasks_completed as f64 / (self.tasks_failed as f64 + 1.0)
    }
}

/// A worker in the swarm.
///
/// Invariant: `status == Busy ⇔ current_task.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Type used for task matching
    pub agent_type: AgentType,
    /// Current status
    pub status: AgentStatus,
    /// Declared capabilities
    pub capabilities: HashSet<String>,
    /// Task currently being executed, if busy
    pub current_task: Option<Uuid>,
    /// Performance metrics
    pub metrics: AgentMetrics,
}

impl Agent {
    /// Register a new idle agent.
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            agent_type,
            status: AgentStatus::Idle,
            capabilities: HashSet::new(),
            current_task: None,
            metrics: AgentMetrics::default(),
        }
    }

    /// Add a capability.
    pub fn with_capability(mut self, cap: impl Into<String>) -> Self {
        self.capabilities.insert(cap.into());
        self
    }

    /// Check if the agent is available for a new assignment.
    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    /// Assign a task. Reassigning a busy agent is a caller error and leaves
    /// state unchanged.
    pub fn assign(&mut self, task_id: Uuid) -> SwarmResult<()> {
        if let Some(current) = self.current_task {
            return Err(SwarmError::AgentBusy {
                agent: self.id,
                current_task: current,
            });
        }
        self.status = AgentStatus::Busy;
        self.current_task = Some(task_id);
        self.metrics.last_activity = Utc::now();
        Ok(())
    }

    /// Release the agent back to idle. Releasing an already-idle agent is a
    /// no-op (with a warning), never a crash.
    pub fn release(&mut self) {
        if self.current_task.is_none() {
            tracing::warn!(agent_id = %self.id, "Releasing agent that holds no task");
            return;
        }
        self.status = AgentStatus::Idle;
        self.current_task = None;
        self.metrics.last_activity = Utc::now();
    }

    /// Record a completed task and free the agent.
    pub fn record_success(&mut self, duration_ms: u64) {
        self.metrics.tasks_completed += 1;
        self.metrics.total_duration_ms += duration_ms;
        self.release();
    }

    /// Record a failed task and free the agent.
    pub fn record_failure(&mut self, duration_ms: u64) {
        self.metrics.tasks_failed += 1;
        self.metrics.total_duration_ms += duration_ms;
        self.release();
    }

    /// Load contribution for the work-stealer: busy = 1.0, idle = 0.0.
    pub fn load(&self) -> f64 {
        if self.status == AgentStatus::Busy {
            1.0
        } else {
            0.0
        }
    }
}
