//! Shared harness for integration tests: a coordinator wired to in-memory
//! backends and the scripted mock runners, with fast timer intervals.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use swarmflow::domain::ports::ProcessRunner;
use swarmflow::infrastructure::{InMemoryBackend, MockTaskRunner, ScriptedProcessRunner};
use swarmflow::services::{
    CircuitBreakerConfig, CircuitBreakerService, CoordinatorConfig, EventBus, MemoryConfig,
    MemoryService, StateStore, SwarmCoordinator, VerificationConfig, VerificationPipeline,
    WorkStealer,
};
use swarmflow::TaskStatus;

pub struct TestSwarm {
    pub coordinator: Arc<SwarmCoordinator>,
    pub runner: Arc<MockTaskRunner>,
    pub events: EventBus,
    pub store: Arc<StateStore>,
    pub memory: Arc<MemoryService>,
}

pub struct TestSwarmOptions {
    pub coordinator: CoordinatorConfig,
    pub breaker: CircuitBreakerConfig,
    pub verification: VerificationConfig,
    pub process_runner: Arc<dyn ProcessRunner>,
}

impl Default for TestSwarmOptions {
    fn default() -> Self {
        Self {
            coordinator: fast_coordinator_config(),
            breaker: CircuitBreakerConfig::default(),
            verification: disabled_verification(),
            process_runner: Arc::new(ScriptedProcessRunner::always_exit(0)),
        }
    }
}

/// Timer intervals tight enough for tests, with a generous task timeout.
pub fn fast_coordinator_config() -> CoordinatorConfig {
    CoordinatorConfig {
        dispatch_interval: Duration::from_millis(10),
        health_check_interval: Duration::from_millis(50),
        rebalance_interval: Duration::from_millis(100),
        drain_timeout: Duration::from_secs(2),
        task_timeout_ms: 10_000,
        task_max_retries: 3,
    }
}

pub fn disabled_verification() -> VerificationConfig {
    VerificationConfig {
        enabled: false,
        ..VerificationConfig::default()
    }
}

pub fn build_swarm(options: TestSwarmOptions) -> TestSwarm {
    let events = EventBus::new(4096);
    let store = Arc::new(StateStore::new().with_backend(Arc::new(InMemoryBackend::new())));
    let memory = Arc::new(MemoryService::new(
        MemoryConfig::default(),
        Arc::new(InMemoryBackend::new()),
        events.clone(),
    ));
    let breaker = Arc::new(CircuitBreakerService::new(options.breaker));
    let stealer = Arc::new(WorkStealer::new());
    let verifier = Arc::new(VerificationPipeline::new(
        options.process_runner,
        options.verification,
    ));
    let runner = Arc::new(MockTaskRunner::with_delay(Duration::from_millis(10)));

    let coordinator = SwarmCoordinator::new(
        options.coordinator,
        Arc::clone(&store),
        Arc::clone(&memory),
        breaker,
        stealer,
        verifier,
        Arc::clone(&runner) as _,
        events.clone(),
    );
    TestSwarm {
        coordinator,
        runner,
        events,
        store,
        memory,
    }
}

pub fn default_swarm() -> TestSwarm {
    build_swarm(TestSwarmOptions::default())
}

/// Poll until every registered task is terminal.
pub async fn wait_all_tasks_terminal(store: &StateStore, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let tasks = store.list_tasks().await;
        if !tasks.is_empty() && tasks.iter().all(|t| t.status.is_terminal()) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "tasks did not all reach a terminal state: {:?}",
            tasks
                .iter()
                .map(|t| (t.kind.clone(), t.status))
                .collect::<Vec<_>>()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Poll until `count` tasks are completed.
pub async fn wait_completed_count(store: &StateStore, count: usize, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let completed = store
            .list_tasks()
            .await
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        if completed >= count {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {completed}/{count} tasks completed before timeout"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
