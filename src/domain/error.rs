//! Domain error types for the swarm coordination core.
//!
//! Every failure carries a stable machine-readable code (see [`SwarmError::code`])
//! and a structured payload naming the entities involved. Retries are silent;
//! exhaustion is loud.

use thiserror::Error;
use uuid::Uuid;

use super::models::VerificationResult;

/// Result alias used throughout the core.
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Errors surfaced by the coordination core.
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Task with the given ID was not found in the state store
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// Agent with the given ID was not found in the state store
    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    /// Objective with the given ID was not found in the state store
    #[error("Objective not found: {0}")]
    ObjectiveNotFound(Uuid),

    /// Memory entry with the given ID was not found
    #[error("Memory entry not found: {0}")]
    EntryNotFound(Uuid),

    /// Knowledge base with the given ID was not found
    #[error("Knowledge base not found: {0}")]
    KnowledgeBaseNotFound(Uuid),

    /// Objective strategy string was not recognised
    #[error("Invalid strategy: {0}")]
    InvalidStrategy(String),

    /// An objective must decompose into at least one task
    #[error("Objective {0} has no tasks")]
    EmptyObjective(Uuid),

    /// A task references a dependency that does not exist within its objective
    #[error("Task {task} depends on unknown task {dependency}")]
    DependencyMissing { task: Uuid, dependency: Uuid },

    /// The dependency graph of an objective contains a cycle
    #[error("Objective {objective} has a dependency cycle through {path:?}")]
    DependencyCycle { objective: Uuid, path: Vec<Uuid> },

    /// Invalid task status transition attempted
    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Task execution exceeded its timeout
    #[error("Task {task} timed out after {timeout_ms}ms")]
    TaskTimeout { task: Uuid, timeout_ms: u64 },

    /// The injected task runner rejected execution
    #[error("Task runner failed for {task}: {message}")]
    RunnerFailed { task: Uuid, message: String },

    /// The circuit for an agent is open; dispatch must skip it
    #[error("Circuit open for agent {agent}")]
    CircuitOpen { agent: Uuid },

    /// Attempted to assign a task to an agent that is already busy
    #[error("Agent {agent} is busy with task {current_task}")]
    AgentBusy { agent: Uuid, current_task: Uuid },

    /// A bounded queue rejected an item because capacity was exhausted
    #[error("Queue capacity {capacity} exhausted, item evicted")]
    QueueCapacity { capacity: usize },

    /// Attempted to share or broadcast a private memory entry
    #[error("Memory entry {entry} is private and cannot be shared")]
    PrivateEntry { entry: Uuid },

    /// Verification enforcement failed for an agent
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// A subprocess could not be spawned
    #[error("Failed to spawn process '{command}': {message}")]
    ProcessSpawn { command: String, message: String },

    /// Every configured persistence backend failed the operation
    #[error("All {attempted} persistence backends failed: {last_error}")]
    PersistenceExhausted { attempted: usize, last_error: String },

    /// A single persistence backend operation failed
    #[error("Persistence backend '{backend}' failed: {message}")]
    Persistence { backend: String, message: String },

    /// Snapshot with the given ID was not found
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// The coordinator is draining and refuses new work
    #[error("Coordinator is shutting down")]
    ShuttingDown,
}

impl SwarmError {
    /// Stable machine-readable code for this failure.
    pub fn code(&self) -> &'static str {
        match self {
            Self::TaskNotFound(_) => "task-not-found",
            Self::AgentNotFound(_) => "agent-not-found",
            Self::ObjectiveNotFound(_) => "objective-not-found",
            Self::EntryNotFound(_) => "entry-not-found",
            Self::KnowledgeBaseNotFound(_) => "knowledge-base-not-found",
            Self::InvalidStrategy(_) => "invalid-strategy",
            Self::EmptyObjective(_) => "empty-objective",
            Self::DependencyMissing { .. } => "dependency-missing",
            Self::DependencyCycle { .. } => "dependency-cycle",
            Self::InvalidTransition { .. } => "invalid-transition",
            Self::TaskTimeout { .. } => "task-timeout",
            Self::RunnerFailed { .. } => "runner-failed",
            Self::CircuitOpen { .. } => "circuit-open",
            Self::AgentBusy { .. } => "agent-busy",
            Self::QueueCapacity { .. } => "queue-capacity",
            Self::PrivateEntry { .. } => "private-entry",
            Self::Verification(e) => {
                if e.status_missing {
                    "status-missing"
                } else {
                    "verification-failed"
                }
            }
            Self::ProcessSpawn { .. } => "process-spawn",
            Self::PersistenceExhausted { .. } => "persistence-exhausted",
            Self::Persistence { .. } => "persistence",
            Self::SnapshotNotFound(_) => "snapshot-not-found",
            Self::ShuttingDown => "shutting-down",
        }
    }

    /// Returns true if this error is transient and the operation could
    /// succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TaskTimeout { .. }
                | Self::RunnerFailed { .. }
                | Self::CircuitOpen { .. }
                | Self::Persistence { .. }
        )
    }
}

/// Distinguished verification enforcement failure.
///
/// Never recovered by the verifier itself; it propagates to the scheduler,
/// which routes the owning task (or objective) through its failure path.
#[derive(Error, Debug, Clone)]
#[error("Verification failed for agent {agent_id}: {} failing command(s), status_missing={status_missing}", failures.len())]
pub struct VerificationError {
    /// Agent whose verification failed.
    pub agent_id: Uuid,
    /// Results of the commands that did not match their expectation.
    pub failures: Vec<VerificationResult>,
    /// True when the status document was absent or unparseable.
    pub status_missing: bool,
}

impl VerificationError {
    /// Failure caused by a missing or malformed status document.
    pub fn missing_document(agent_id: Uuid) -> Self {
        Self {
            agent_id,
            failures: Vec::new(),
            status_missing: true,
        }
    }

    /// Failure caused by commands that did not match their expectation.
    pub fn failed_commands(agent_id: Uuid, failures: Vec<VerificationResult>) -> Self {
        Self {
            agent_id,
            failures,
            status_missing: false,
        }
    }
}
