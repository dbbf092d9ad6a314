//! Swarmflow - multi-agent swarm coordination core.
//!
//! Plans an objective, decomposes it into a dependency graph of tasks,
//! binds tasks to a pool of heterogeneous agents, executes them under
//! concurrency and failure-tolerance policies, and verifies their output
//! before accepting completion:
//! - Bounded collections with LRU/LFU/FIFO eviction and pressure-driven
//!   cleanup
//! - Shared memory substrate with share levels, knowledge bases, and
//!   batched persistence
//! - Per-agent circuit breakers and advisory work stealing
//! - Dependency-gated dispatch with retry, timeout, and stuck-agent
//!   recovery
//! - A verification pipeline gating task and objective completion on
//!   external command outcomes and on-disk status documents
//! - A unified state store with change records, subscriptions, and
//!   snapshot/restore

pub mod collections;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export the types most callers need
pub use domain::error::{SwarmError, SwarmResult, VerificationError};
pub use domain::models::{
    Agent, AgentStatus, AgentType, MemoryEntry, MemoryQuery, Objective, ObjectiveStatus,
    ShareLevel, StateSnapshot, Strategy, Task, TaskStatus, UnifiedState,
};
pub use infrastructure::SwarmConfig;
pub use services::{
    CoordinatorConfig, EventBus, MemoryService, StateStore, SwarmCoordinator, SwarmEvent,
    VerificationPipeline,
};
