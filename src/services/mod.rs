//! Application services of the swarm coordination core.

pub mod batch_processor;
pub mod circuit_breaker;
pub mod coordinator;
pub mod decomposer;
pub mod dependency_resolver;
pub mod event_bus;
pub mod memory_service;
pub mod state_store;
pub mod verification;
pub mod work_stealer;

pub use batch_processor::{BatchConfig, BatchProcessor, OverflowHandler, ProcessFn};
pub use circuit_breaker::{
    CircuitBreakerConfig, CircuitBreakerService, CircuitState, CircuitStats,
};
pub use coordinator::{CoordinatorConfig, SwarmCoordinator};
pub use decomposer::{Decomposer, DecomposerDefaults};
pub use dependency_resolver::DependencyResolver;
pub use event_bus::{Event, EventBus, SequenceNumber, SwarmEvent};
pub use memory_service::{MemoryConfig, MemoryService, MemorySnapshot, MemoryStats};
pub use state_store::{ChangeRecord, StateAction, StateStore, StateSubscription};
pub use verification::{
    ObjectiveVerification, StatusWait, VerificationConfig, VerificationPipeline,
};
pub use work_stealer::{StealSuggestion, WorkStealer, DONOR_THRESHOLD, RECIPIENT_THRESHOLD};
