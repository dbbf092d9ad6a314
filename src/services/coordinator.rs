//! Swarm coordinator: objective intake, dependency-gated dispatch, and the
//! task completion/failure paths.
//!
//! A background dispatcher selects ready tasks (dependencies completed,
//! circuit not open on the candidate agent), binds each to the best idle
//! agent, and launches execution through the injected runner under the
//! task's timeout. Completion is gated on the verification pipeline; an
//! objective is accepted only after every participating agent re-verifies.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{
    Agent, AgentType, EntryMetadata, EntryType, Objective, ObjectiveStatus, ShareLevel, Strategy,
    SwarmInfo, Task, TaskStatus, VerificationCommand, VerificationPreset, VerificationRequirement,
};
use crate::domain::ports::TaskRunner;

use super::circuit_breaker::CircuitBreakerService;
use super::decomposer::{Decomposer, DecomposerDefaults};
use super::dependency_resolver::DependencyResolver;
use super::event_bus::{EventBus, SwarmEvent};
use super::memory_service::MemoryService;
use super::state_store::{StateAction, StateStore};
use super::verification::VerificationPipeline;
use super::work_stealer::WorkStealer;

/// Timer intervals and task defaults for the coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub dispatch_interval: Duration,
    pub health_check_interval: Duration,
    pub rebalance_interval: Duration,
    /// How long `stop()` lets in-flight tasks finish before failing the rest
    pub drain_timeout: Duration,
    /// Default execution timeout applied at decomposition
    pub task_timeout_ms: u64,
    /// Default retry budget applied at decomposition
    pub task_max_retries: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            dispatch_interval: Duration::from_millis(250),
            health_check_interval: Duration::from_secs(5),
            rebalance_interval: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            task_timeout_ms: 300_000,
            task_max_retries: 3,
        }
    }
}

/// The coordinator.
pub struct SwarmCoordinator {
    config: CoordinatorConfig,
    store: Arc<StateStore>,
    memory: Arc<MemoryService>,
    breaker: Arc<CircuitBreakerService>,
    stealer: Arc<WorkStealer>,
    verifier: Arc<VerificationPipeline>,
    runner: Arc<dyn TaskRunner>,
    events: EventBus,
    decomposer: Decomposer,
    resolver: DependencyResolver,
    accepting: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    inflight: Arc<RwLock<HashMap<Uuid, JoinHandle<()>>>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    verification_commands: RwLock<HashMap<Uuid, Vec<VerificationCommand>>>,
    /// Back-reference for spawning execution futures that outlive a call
    self_ref: Weak<SwarmCoordinator>,
}

impl SwarmCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: CoordinatorConfig,
        store: Arc<StateStore>,
        memory: Arc<MemoryService>,
        breaker: Arc<CircuitBreakerService>,
        stealer: Arc<WorkStealer>,
        verifier: Arc<VerificationPipeline>,
        runner: Arc<dyn TaskRunner>,
        events: EventBus,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new_cyclic(|self_ref| Self {
            config,
            store,
            memory,
            breaker,
            stealer,
            verifier,
            runner,
            events,
            decomposer: Decomposer::new(),
            resolver: DependencyResolver::new(),
            accepting: AtomicBool::new(true),
            shutdown_tx,
            inflight: Arc::new(RwLock::new(HashMap::new())),
            loops: Mutex::new(Vec::new()),
            verification_commands: RwLock::new(HashMap::new()),
            self_ref: self_ref.clone(),
        })
    }

    fn arc(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("coordinator dropped while in use")
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn memory(&self) -> &Arc<MemoryService> {
        &self.memory
    }

    /// Register an agent into the pool.
    pub async fn register_agent(&self, name: impl Into<String>, agent_type: AgentType) -> Uuid {
        let agent = Agent::new(name, agent_type);
        let id = agent.id;
        let name = agent.name.clone();
        self.store.dispatch(StateAction::UpsertAgent(agent)).await;
        self.memory.register_agent(id);
        self.events.emit(SwarmEvent::AgentRegistered {
            agent_id: id,
            name,
            agent_type: agent_type.as_str().to_string(),
        });
        id
    }

    /// Override the verification command set for an agent. Without an
    /// override, enabled verification applies the general preset.
    pub async fn set_verification_commands(
        &self,
        agent_id: Uuid,
        commands: Vec<VerificationCommand>,
    ) {
        self.verification_commands
            .write()
            .await
            .insert(agent_id, commands);
    }

    /// Create an objective: decompose it per its strategy and register the
    /// task graph. Returns the objective id.
    pub async fn create_objective(
        &self,
        description: impl Into<String>,
        strategy: Strategy,
    ) -> SwarmResult<Uuid> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SwarmError::ShuttingDown);
        }
        let mut objective = Objective::new(description, strategy);
        let defaults = DecomposerDefaults {
            max_retries: self.config.task_max_retries,
            timeout_ms: self.config.task_timeout_ms,
        };
        let tasks = self.decomposer.decompose(&objective, &defaults)?;
        if tasks.is_empty() {
            return Err(SwarmError::EmptyObjective(objective.id));
        }
        objective.tasks = tasks.iter().map(|t| t.id).collect();
        objective.start();

        let objective_id = objective.id;
        let task_count = tasks.len();
        let mut actions = vec![StateAction::UpsertObjective(objective)];
        actions.extend(tasks.into_iter().map(StateAction::UpsertTask));
        self.store.transaction(actions).await;

        self.events.emit(SwarmEvent::ObjectiveCreated {
            objective_id,
            strategy: strategy.as_str().to_string(),
            task_count,
        });
        self.events
            .emit(SwarmEvent::ObjectiveStarted { objective_id });
        info!(objective_id = %objective_id, strategy = strategy.as_str(), task_count,
              "Objective created");
        Ok(objective_id)
    }

    /// Create an objective from a strategy string (`invalid-strategy` when
    /// unrecognised).
    pub async fn create_objective_from_str(
        &self,
        description: impl Into<String>,
        strategy: &str,
    ) -> SwarmResult<Uuid> {
        let strategy = Strategy::parse_str(strategy)
            .ok_or_else(|| SwarmError::InvalidStrategy(strategy.to_string()))?;
        self.create_objective(description, strategy).await
    }

    /// Submit a standalone task outside any objective. Its dependencies
    /// must reference already-registered tasks.
    pub async fn submit_task(&self, task: Task) -> SwarmResult<Uuid> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(SwarmError::ShuttingDown);
        }
        task.validate()?;
        let known = self.store.get_state().await.tasks;
        for dep in &task.dependencies {
            if !known.contains_key(dep) {
                return Err(SwarmError::DependencyMissing {
                    task: task.id,
                    dependency: *dep,
                });
            }
        }
        let task_id = task.id;
        self.store.dispatch(StateAction::UpsertTask(task)).await;
        debug!(task_id = %task_id, "Task submitted");
        Ok(task_id)
    }

    /// Start the background dispatcher, health check, and rebalancer.
    pub async fn start(&self) {
        self.accepting.store(true, Ordering::SeqCst);
        let state = self.store.get_state().await;
        self.store
            .dispatch(StateAction::SetSwarmInfo(SwarmInfo {
                started_at: Some(Utc::now()),
                ..state.swarm
            }))
            .await;

        let mut loops = self.loops.lock().await;
        loops.push(self.spawn_loop(self.config.dispatch_interval, Tick::Dispatch));
        loops.push(self.spawn_loop(self.config.health_check_interval, Tick::Health));
        loops.push(self.spawn_loop(self.config.rebalance_interval, Tick::Rebalance));
        self.events.emit(SwarmEvent::CoordinatorStarted);
        info!("Coordinator started");
    }

    fn spawn_loop(&self, period: Duration, tick: Tick) -> JoinHandle<()> {
        let coordinator = self.arc();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut timer = interval(period);
            loop {
                tokio::select! {
                    _ = timer.tick() => match tick {
                        Tick::Dispatch => coordinator.dispatch_tick().await,
                        Tick::Health => coordinator.health_tick().await,
                        Tick::Rebalance => coordinator.rebalance_tick().await,
                    },
                    _ = shutdown_rx.recv() => break,
                }
            }
        })
    }

    /// One pass of the dispatcher: bind ready tasks to idle agents and
    /// launch them.
    pub async fn dispatch_tick(&self) {
        let state = self.store.get_state().await;

        let mut ready: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Pending
                    && self.resolver.dependencies_satisfied(t, &state.tasks)
            })
            .cloned()
            .collect();
        if ready.is_empty() {
            return;
        }
        // Highest priority first; FIFO within a priority class
        ready.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut idle: Vec<Agent> =
            state.agents.values().filter(|a| a.is_idle()).cloned().collect();
        // Agents with an open circuit are skipped this tick
        let mut allowed = Vec::new();
        for agent in idle.drain(..) {
            if self.breaker.can_execute(agent.id).await {
                allowed.push(agent);
            } else {
                debug!(agent_id = %agent.id, "Skipping agent: circuit open");
            }
        }

        for task in ready {
            if allowed.is_empty() {
                break;
            }
            let Some(agent_id) = select_agent(&task, &allowed) else {
                continue;
            };
            allowed.retain(|a| a.id != agent_id);
            if let Err(e) = self.assign_and_launch(task.id, agent_id).await {
                warn!(task_id = %task.id, agent_id = %agent_id, error = %e, "Assignment failed");
            }
        }
    }

    async fn assign_and_launch(&self, task_id: Uuid, agent_id: Uuid) -> SwarmResult<()> {
        let mut task = self
            .store
            .get_task(task_id)
            .await
            .ok_or(SwarmError::TaskNotFound(task_id))?;
        let mut agent = self
            .store
            .get_agent(agent_id)
            .await
            .ok_or(SwarmError::AgentNotFound(agent_id))?;

        agent.assign(task_id)?;
        task.assign(agent_id)?;

        let state = self.store.get_state().await;
        let mut metrics = state.metrics;
        metrics.tasks_dispatched += 1;
        self.store
            .transaction(vec![
                StateAction::UpsertTask(task.clone()),
                StateAction::UpsertAgent(agent.clone()),
                StateAction::SetMetrics(metrics),
            ])
            .await;
        self.events
            .emit(SwarmEvent::TaskAssigned { task_id, agent_id });
        debug!(task_id = %task_id, agent_id = %agent_id, kind = %task.kind, "Task assigned");

        let coordinator = self.arc();
        let timeout = Duration::from_millis(task.timeout_ms);
        let handle = tokio::spawn(async move {
            let result =
                tokio::time::timeout(timeout, coordinator.runner.run(&task, &agent)).await;
            match result {
                Ok(Ok(outcome)) => {
                    coordinator
                        .complete_task(task.id, agent.id, outcome.output)
                        .await;
                }
                Ok(Err(e)) => {
                    coordinator.fail_task(task.id, agent.id, e.to_string()).await;
                }
                Err(_) => {
                    let error = SwarmError::TaskTimeout {
                        task: task.id,
                        timeout_ms: task.timeout_ms,
                    };
                    coordinator
                        .fail_task(task.id, agent.id, error.to_string())
                        .await;
                }
            }
            coordinator.inflight.write().await.remove(&task.id);
        });
        self.inflight.write().await.insert(task_id, handle);
        Ok(())
    }

    /// Completion path: verification gate, then result recording.
    async fn complete_task(&self, task_id: Uuid, agent_id: Uuid, output: String) {
        // Verification gates acceptance; its failure routes to the failure
        // path like any runtime error
        if self.verifier.config().enabled {
            let requirement = self.requirement_for(agent_id).await;
            if let Err(e) = self.verifier.enforce_agent(&requirement).await {
                warn!(task_id = %task_id, agent_id = %agent_id, error = %e,
                      "Verification rejected task result");
                self.fail_task(task_id, agent_id, e.to_string()).await;
                return;
            }
        }

        let Some(mut task) = self.store.get_task(task_id).await else {
            return;
        };
        // The health check may already have recovered this task
        if task.status != TaskStatus::Running || task.assigned_to != Some(agent_id) {
            debug!(task_id = %task_id, "Stale completion ignored");
            return;
        }
        let duration_ms = task
            .started_at
            .map(|s| (Utc::now() - s).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        if task.complete(output.as_str()).is_err() {
            return;
        }

        let Some(mut agent) = self.store.get_agent(agent_id).await else {
            return;
        };
        agent.record_success(duration_ms);

        let state = self.store.get_state().await;
        let mut metrics = state.metrics;
        metrics.tasks_completed += 1;
        let objective_id = task.objective_id;
        self.store
            .transaction(vec![
                StateAction::UpsertTask(task.clone()),
                StateAction::UpsertAgent(agent),
                StateAction::SetMetrics(metrics),
            ])
            .await;

        self.memory.remember(
            agent_id,
            EntryType::Result,
            output,
            EntryMetadata {
                task_id: Some(task_id),
                objective_id,
                tags: vec!["task-result".to_string(), task.kind.clone()],
                priority: task.priority,
                share_level: ShareLevel::Team,
                provenance: None,
            },
        );
        self.breaker.record_success(agent_id).await;
        self.events.emit(SwarmEvent::TaskCompleted {
            task_id,
            agent_id,
            duration_ms,
        });
        info!(task_id = %task_id, agent_id = %agent_id, duration_ms, "Task completed");

        if let Some(objective_id) = objective_id {
            self.check_objective_completion(objective_id).await;
        }
    }

    /// Failure path: retry while the budget allows, otherwise fail
    /// terminally. Frees the agent and records the breaker failure either
    /// way.
    async fn fail_task(&self, task_id: Uuid, agent_id: Uuid, error: String) {
        let Some(mut task) = self.store.get_task(task_id).await else {
            return;
        };
        if task.status != TaskStatus::Running || task.assigned_to != Some(agent_id) {
            debug!(task_id = %task_id, "Stale failure ignored");
            return;
        }
        let duration_ms = task
            .started_at
            .map(|s| (Utc::now() - s).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        let Ok(resulting_status) = task.record_failure(error.as_str()) else {
            return;
        };

        let Some(mut agent) = self.store.get_agent(agent_id).await else {
            return;
        };
        agent.record_failure(duration_ms);

        let state = self.store.get_state().await;
        let mut metrics = state.metrics;
        match resulting_status {
            TaskStatus::Pending => metrics.tasks_retried += 1,
            _ => metrics.tasks_failed += 1,
        }
        let objective_id = task.objective_id;
        let retry_count = task.retry_count;
        self.store
            .transaction(vec![
                StateAction::UpsertTask(task),
                StateAction::UpsertAgent(agent),
                StateAction::SetMetrics(metrics),
            ])
            .await;
        self.breaker.record_failure(agent_id).await;

        match resulting_status {
            TaskStatus::Pending => {
                // Retries are silent
                debug!(task_id = %task_id, retry_count, error = %error, "Task will retry");
                self.events.emit(SwarmEvent::TaskRetry {
                    task_id,
                    retry_count,
                });
            }
            _ => {
                // Exhaustion is loud
                warn!(task_id = %task_id, error = %error, "Task failed terminally");
                self.events.emit(SwarmEvent::TaskFailed { task_id, error });
                if let Some(objective_id) = objective_id {
                    self.check_objective_completion(objective_id).await;
                }
            }
        }
    }

    /// When every task of the objective is terminal, re-verify every
    /// participating agent and settle the objective.
    ///
    /// A terminal task failure also cascades: pending tasks depending on a
    /// failed task (transitively) can never run and are failed here so the
    /// objective settles instead of hanging.
    async fn check_objective_completion(&self, objective_id: Uuid) {
        let Some(objective) = self.store.get_objective(objective_id).await else {
            return;
        };
        if objective.is_terminal() {
            return;
        }
        let mut tasks = self.store.tasks_for_objective(objective_id).await;
        if tasks.is_empty() {
            return;
        }
        self.cascade_dependency_failures(&mut tasks).await;
        if !tasks.iter().all(Task::is_terminal) {
            return;
        }

        let all_completed = tasks.iter().all(|t| t.status == TaskStatus::Completed);
        // Re-verification runs (and its record persists) whenever the
        // objective settles with participating agents
        let verification_status = self.verify_objective(objective_id, &tasks).await;
        let final_status = if all_completed && verification_status == ObjectiveStatus::Completed {
            ObjectiveStatus::Completed
        } else {
            ObjectiveStatus::Failed
        };
        self.settle_objective(objective, final_status).await;
    }

    /// Fail pending tasks whose dependencies (transitively) include a
    /// terminally failed task.
    async fn cascade_dependency_failures(&self, tasks: &mut [Task]) {
        let mut failed: HashSet<Uuid> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| t.id)
            .collect();
        if failed.is_empty() {
            return;
        }

        let mut actions = Vec::new();
        loop {
            let mut changed = false;
            for task in tasks.iter_mut() {
                if task.status == TaskStatus::Pending
                    && task.dependencies.iter().any(|d| failed.contains(d))
                {
                    task.error = Some("dependency failed".to_string());
                    if task.transition_to(TaskStatus::Failed).is_ok() {
                        failed.insert(task.id);
                        changed = true;
                        debug!(task_id = %task.id, "Task failed: dependency failed");
                        actions.push(StateAction::UpsertTask(task.clone()));
                        self.events.emit(SwarmEvent::TaskFailed {
                            task_id: task.id,
                            error: "dependency failed".to_string(),
                        });
                    }
                }
            }
            if !changed {
                break;
            }
        }
        if !actions.is_empty() {
            self.store.transaction(actions).await;
        }
    }

    async fn verify_objective(&self, objective_id: Uuid, tasks: &[Task]) -> ObjectiveStatus {
        if !self.verifier.config().enabled {
            return ObjectiveStatus::Completed;
        }
        let mut requirements = Vec::new();
        let mut seen = HashSet::new();
        for task in tasks {
            if let Some(agent_id) = task.assigned_to {
                if seen.insert(agent_id) {
                    requirements.push(self.requirement_for(agent_id).await);
                }
            }
        }
        let outcome = self
            .verifier
            .enforce_objective(objective_id, &requirements)
            .await;

        // Persist the enforcement record for later inspection
        let content = serde_json::json!({
            "objective_id": objective_id,
            "total_agents": outcome.total_agents,
            "successful_agents": outcome.successful_agents,
        })
        .to_string();
        let reporter = outcome
            .failures
            .first()
            .map(|f| f.agent_id)
            .or_else(|| tasks.iter().find_map(|t| t.assigned_to))
            .unwrap_or_else(Uuid::nil);
        self.memory.remember(
            reporter,
            EntryType::Result,
            content,
            EntryMetadata {
                objective_id: Some(objective_id),
                tags: vec!["objective-verification".to_string()],
                share_level: ShareLevel::Team,
                ..EntryMetadata::default()
            },
        );

        if outcome.all_passed() {
            ObjectiveStatus::Completed
        } else {
            warn!(objective_id = %objective_id,
                  successful = outcome.successful_agents,
                  total = outcome.total_agents,
                  "Objective verification failed");
            ObjectiveStatus::Failed
        }
    }

    async fn settle_objective(&self, mut objective: Objective, status: ObjectiveStatus) {
        objective.finish(status);
        let objective_id = objective.id;

        let state = self.store.get_state().await;
        let mut metrics = state.metrics;
        match status {
            ObjectiveStatus::Completed => metrics.objectives_completed += 1,
            _ => metrics.objectives_failed += 1,
        }
        self.store
            .transaction(vec![
                StateAction::UpsertObjective(objective),
                StateAction::SetMetrics(metrics),
            ])
            .await;

        match status {
            ObjectiveStatus::Completed => {
                info!(objective_id = %objective_id, "Objective completed");
                self.events
                    .emit(SwarmEvent::ObjectiveCompleted { objective_id });
            }
            _ => {
                warn!(objective_id = %objective_id, "Objective failed");
                self.events.emit(SwarmEvent::ObjectiveFailed {
                    objective_id,
                    reason: "tasks failed or verification rejected".to_string(),
                });
            }
        }
    }

    async fn requirement_for(&self, agent_id: Uuid) -> VerificationRequirement {
        let commands = self
            .verification_commands
            .read()
            .await
            .get(&agent_id)
            .cloned()
            .unwrap_or_else(|| VerificationPreset::General.commands());
        VerificationRequirement::new(agent_id, commands)
    }

    /// Health check: recover agents stuck past their task's timeout.
    pub async fn health_tick(&self) {
        let now = Utc::now();
        let state = self.store.get_state().await;
        let mut recovered = Vec::new();

        for agent in state.agents.values() {
            let Some(task_id) = agent.current_task else {
                continue;
            };
            let Some(task) = state.tasks.get(&task_id) else {
                continue;
            };
            if task.is_overdue(now) {
                warn!(agent_id = %agent.id, task_id = %task_id,
                      "Agent stuck past task timeout; recovering");
                if let Some(handle) = self.inflight.write().await.remove(&task_id) {
                    handle.abort();
                }
                let error = SwarmError::TaskTimeout {
                    task: task_id,
                    timeout_ms: task.timeout_ms,
                };
                self.fail_task(task_id, agent.id, error.to_string()).await;
                recovered.push(agent.id);
            }
        }

        let mut health = state.health;
        health.healthy = recovered.is_empty();
        health.last_check_at = Some(now);
        health.recovered_agents = recovered;
        self.store.dispatch(StateAction::SetHealth(health)).await;
    }

    /// Rebalancer: feed agent loads to the work stealer and surface its
    /// suggestions. Advisory only.
    pub async fn rebalance_tick(&self) {
        let state = self.store.get_state().await;
        let loads: HashMap<Uuid, f64> = state.agents.values().map(|a| (a.id, a.load())).collect();
        self.stealer.replace_loads(loads).await;

        let suggestions = self.stealer.suggest().await;
        if !suggestions.is_empty() {
            let message = suggestions
                .iter()
                .map(|s| format!("{} -> {}", s.from, s.to))
                .collect::<Vec<_>>()
                .join(", ");
            info!(suggestions = %message, "Load imbalance detected");
            self.events.emit(SwarmEvent::MonitorAlert {
                message: format!("work-stealing suggestions: {message}"),
            });
        }
    }

    /// Drain and stop: refuse new objectives, stop timers, let in-flight
    /// tasks finish (up to the drain timeout), fail whatever remains, and
    /// persist final state.
    pub async fn stop(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        for handle in self.loops.lock().await.drain(..) {
            handle.abort();
        }

        let deadline = tokio::time::Instant::now() + self.config.drain_timeout;
        loop {
            let all_done = self
                .inflight
                .read()
                .await
                .values()
                .all(JoinHandle::is_finished);
            if all_done {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("Drain deadline reached with tasks still in flight");
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Abort stragglers and fail every non-terminal task
        for (_, handle) in self.inflight.write().await.drain() {
            handle.abort();
        }
        let state = self.store.get_state().await;
        let mut failed_count = 0u32;
        let mut actions = Vec::new();
        for task in state.tasks.values() {
            if !task.is_terminal() {
                let mut task = task.clone();
                task.error = Some("coordinator shutdown".to_string());
                if task.transition_to(TaskStatus::Failed).is_ok() {
                    failed_count += 1;
                    actions.push(StateAction::UpsertTask(task));
                }
            }
        }
        for objective in state.objectives.values() {
            if !objective.is_terminal() {
                let mut objective = objective.clone();
                objective.finish(ObjectiveStatus::Failed);
                actions.push(StateAction::UpsertObjective(objective));
            }
        }
        for agent in state.agents.values() {
            if !agent.is_idle() {
                let mut agent = agent.clone();
                agent.release();
                actions.push(StateAction::UpsertAgent(agent));
            }
        }
        actions.push(StateAction::SetSwarmInfo(SwarmInfo {
            stopped_at: Some(Utc::now()),
            ..state.swarm
        }));
        self.store.transaction(actions).await;

        self.memory.sync().await;
        if let Err(e) = self.store.persist().await {
            warn!(error = %e, "Final state persistence failed");
        }
        self.events.emit(SwarmEvent::CoordinatorCleanup {
            pending_failed: failed_count,
        });
        self.events.emit(SwarmEvent::CoordinatorStopped);
        info!(failed_count, "Coordinator stopped");
    }

    /// Poll until the objective reaches a terminal status.
    pub async fn wait_for_objective(
        &self,
        objective_id: Uuid,
        timeout: Duration,
    ) -> SwarmResult<ObjectiveStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let objective = self
                .store
                .get_objective(objective_id)
                .await
                .ok_or(SwarmError::ObjectiveNotFound(objective_id))?;
            if objective.is_terminal() {
                return Ok(objective.status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SwarmError::TaskTimeout {
                    task: objective_id,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Which periodic loop a spawned timer drives.
#[derive(Debug, Clone, Copy)]
enum Tick {
    Dispatch,
    Health,
    Rebalance,
}

/// Pick the best agent for a task.
///
/// Type-family matches are preferred; with no match, any idle agent
/// qualifies. Within the pool the highest `completed / (failed + 1)` ratio
/// wins, ties broken by the oldest `last_activity`.
fn select_agent(task: &Task, candidates: &[Agent]) -> Option<Uuid> {
    let matching: Vec<&Agent> = candidates
        .iter()
        .filter(|a| a.agent_type.matches_kind(&task.kind))
        .collect();
    let pool: Vec<&Agent> = if matching.is_empty() {
        candidates.iter().collect()
    } else {
        matching
    };
    pool.into_iter()
        .max_by(|a, b| {
            a.metrics
                .success_ratio()
                .partial_cmp(&b.metrics.success_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
                // Older activity wins a tie, so reverse the time ordering
                .then(b.metrics.last_activity.cmp(&a.metrics.last_activity))
        })
        .map(|a| a.id)
}
