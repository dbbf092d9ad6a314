//! Domain models for the swarm coordination core.

pub mod agent;
pub mod memory;
pub mod objective;
pub mod state;
pub mod task;
pub mod verification;

pub use agent::{Agent, AgentMetrics, AgentStatus, AgentType};
pub use memory::{
    EntryMetadata, EntryType, KnowledgeBase, KnowledgeBaseMetadata, MemoryEntry, MemoryQuery,
    Provenance, ShareLevel,
};
pub use objective::{Objective, ObjectiveStatus, Strategy};
pub use state::{
    HealthState, MemorySummary, MetricsState, OrchestrationState, SessionInfo, StateSnapshot,
    SwarmInfo, UnifiedState, SNAPSHOT_VERSION,
};
pub use task::{Task, TaskStatus};
pub use verification::{
    Expectation, StatusDocument, VerificationCommand, VerificationPreset, VerificationRequirement,
    VerificationResult,
};
