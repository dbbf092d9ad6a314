//! Unified state store.
//!
//! Single source of truth for agents, tasks, objectives, and sessions.
//! Every write goes through [`StateStore::dispatch`] (or a transaction),
//! produces a change record, and is observed by path-scoped subscribers in
//! dispatch order. No subscriber ever sees a partial transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{
    Agent, HealthState, MemorySummary, MetricsState, Objective, OrchestrationState, SessionInfo,
    StateSnapshot, SwarmInfo, Task, UnifiedState,
};
use crate::domain::ports::PersistenceBackend;

/// An atomic write against the unified state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateAction {
    UpsertAgent(Agent),
    RemoveAgent(Uuid),
    UpsertTask(Task),
    RemoveTask(Uuid),
    UpsertObjective(Objective),
    RemoveObjective(Uuid),
    UpsertSession(SessionInfo),
    SetSwarmInfo(SwarmInfo),
    SetMemorySummary(MemorySummary),
    SetOrchestration(OrchestrationState),
    SetHealth(HealthState),
    SetMetrics(MetricsState),
    SetConfig(serde_json::Value),
}

impl StateAction {
    /// Action name recorded on change records.
    pub fn name(&self) -> &'static str {
        match self {
            Self::UpsertAgent(_) => "upsert_agent",
            Self::RemoveAgent(_) => "remove_agent",
            Self::UpsertTask(_) => "upsert_task",
            Self::RemoveTask(_) => "remove_task",
            Self::UpsertObjective(_) => "upsert_objective",
            Self::RemoveObjective(_) => "remove_objective",
            Self::UpsertSession(_) => "upsert_session",
            Self::SetSwarmInfo(_) => "set_swarm_info",
            Self::SetMemorySummary(_) => "set_memory_summary",
            Self::SetOrchestration(_) => "set_orchestration",
            Self::SetHealth(_) => "set_health",
            Self::SetMetrics(_) => "set_metrics",
            Self::SetConfig(_) => "set_config",
        }
    }
}

/// Record of one observed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Action name (see [`StateAction::name`])
    pub action: String,
    /// Dotted path of the changed subtree, e.g. `tasks.<uuid>`
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<serde_json::Value>,
}

/// A path-scoped subscription to change records.
pub struct StateSubscription {
    prefix: String,
    rx: broadcast::Receiver<ChangeRecord>,
}

impl StateSubscription {
    /// Receive the next change under the subscribed path, in dispatch order.
    pub async fn recv(&mut self) -> Option<ChangeRecord> {
        loop {
            match self.rx.recv().await {
                Ok(record) if path_matches(&self.prefix, &record.path) => return Some(record),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "State subscriber lagged; changes dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Drain matching changes that are already buffered without waiting.
    pub fn drain(&mut self) -> Vec<ChangeRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            if path_matches(&self.prefix, &record.path) {
                records.push(record);
            }
        }
        records
    }
}

fn path_matches(prefix: &str, path: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || (path.len() > prefix.len()
            && path.starts_with(prefix)
            && path.as_bytes()[prefix.len()] == b'.')
}

/// The state store.
pub struct StateStore {
    state: RwLock<UnifiedState>,
    changes: broadcast::Sender<ChangeRecord>,
    backends: Vec<Arc<dyn PersistenceBackend>>,
    /// Index into `backends`: loads try this one first
    primary: usize,
}

impl StateStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(4096);
        Self {
            state: RwLock::new(UnifiedState::default()),
            changes,
            backends: Vec::new(),
            primary: 0,
        }
    }

    /// Register a persistence backend. The first registered is the primary
    /// unless [`with_primary`](Self::with_primary) says otherwise.
    pub fn with_backend(mut self, backend: Arc<dyn PersistenceBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Designate the primary backend by registration index.
    pub fn with_primary(mut self, index: usize) -> Self {
        self.primary = index;
        self
    }

    /// Read-only view of the full state.
    pub async fn get_state(&self) -> UnifiedState {
        self.state.read().await.clone()
    }

    /// Apply one write atomically. Returns its change record.
    pub async fn dispatch(&self, action: StateAction) -> ChangeRecord {
        let record = {
            let mut state = self.state.write().await;
            apply(&mut state, action)
        };
        let _ = self.changes.send(record.clone());
        record
    }

    /// Apply a group of writes atomically. Subscribers observe either none
    /// or all of the records, in order.
    pub async fn transaction(&self, actions: Vec<StateAction>) -> Vec<ChangeRecord> {
        let records: Vec<ChangeRecord> = {
            let mut state = self.state.write().await;
            actions
                .into_iter()
                .map(|action| apply(&mut state, action))
                .collect()
        };
        for record in &records {
            let _ = self.changes.send(record.clone());
        }
        records
    }

    /// Subscribe to changes under a dotted path ("" for everything).
    pub fn subscribe(&self, path: impl Into<String>) -> StateSubscription {
        StateSubscription {
            prefix: path.into(),
            rx: self.changes.subscribe(),
        }
    }

    /// Capture a snapshot of the full state.
    pub async fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::capture(self.get_state().await)
    }

    /// Replace the entire state graph from a snapshot.
    pub async fn restore(&self, snapshot: StateSnapshot) {
        let record = {
            let mut state = self.state.write().await;
            let previous = serde_json::to_value(&*state).ok();
            *state = snapshot.state;
            ChangeRecord {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                action: "restore".to_string(),
                path: String::new(),
                previous,
                next: serde_json::to_value(&*state).ok(),
            }
        };
        let _ = self.changes.send(record);
    }

    /// Persist the current state to every backend.
    ///
    /// Succeeds (with a logged warning) when at least one backend accepts
    /// the write; fails with `persistence-exhausted` only when all do.
    pub async fn persist(&self) -> SwarmResult<()> {
        if self.backends.is_empty() {
            debug!("No persistence backends configured; persist is a no-op");
            return Ok(());
        }
        let state = self.get_state().await;
        let mut succeeded = 0usize;
        let mut last_error = String::new();
        for backend in &self.backends {
            match backend.save(&state).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "State save failed on backend");
                    last_error = e.to_string();
                }
            }
        }
        if succeeded == 0 {
            return Err(SwarmError::PersistenceExhausted {
                attempted: self.backends.len(),
                last_error,
            });
        }
        Ok(())
    }

    /// Load state, trying the primary backend first and falling back to the
    /// others in registration order.
    pub async fn load(&self) -> SwarmResult<bool> {
        for backend in self.backend_order() {
            match backend.load().await {
                Ok(Some(state)) => {
                    self.restore(StateSnapshot::capture(state)).await;
                    return Ok(true);
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "State load failed on backend");
                }
            }
        }
        Ok(false)
    }

    /// Persist a snapshot to every backend (any-success semantics).
    pub async fn save_snapshot(&self, snapshot: &StateSnapshot) -> SwarmResult<()> {
        if self.backends.is_empty() {
            return Ok(());
        }
        let mut succeeded = 0usize;
        let mut last_error = String::new();
        for backend in &self.backends {
            match backend.save_snapshot(snapshot).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Snapshot save failed on backend");
                    last_error = e.to_string();
                }
            }
        }
        if succeeded == 0 {
            return Err(SwarmError::PersistenceExhausted {
                attempted: self.backends.len(),
                last_error,
            });
        }
        Ok(())
    }

    /// Load a snapshot by id, primary first.
    pub async fn load_snapshot(&self, id: &str) -> SwarmResult<Option<StateSnapshot>> {
        for backend in self.backend_order() {
            match backend.load_snapshot(id).await {
                Ok(Some(snapshot)) => return Ok(Some(snapshot)),
                Ok(None) => continue,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Snapshot load failed on backend");
                }
            }
        }
        Ok(None)
    }

    fn backend_order(&self) -> impl Iterator<Item = &Arc<dyn PersistenceBackend>> {
        let primary = self.backends.get(self.primary);
        primary.into_iter().chain(
            self.backends
                .iter()
                .enumerate()
                .filter(move |(i, _)| *i != self.primary)
                .map(|(_, b)| b),
        )
    }

    // Convenience getters used throughout the scheduler.

    pub async fn get_task(&self, id: Uuid) -> Option<Task> {
        self.state.read().await.tasks.get(&id).cloned()
    }

    pub async fn get_agent(&self, id: Uuid) -> Option<Agent> {
        self.state.read().await.agents.get(&id).cloned()
    }

    pub async fn get_objective(&self, id: Uuid) -> Option<Objective> {
        self.state.read().await.objectives.get(&id).cloned()
    }

    pub async fn list_tasks(&self) -> Vec<Task> {
        self.state.read().await.tasks.values().cloned().collect()
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        self.state.read().await.agents.values().cloned().collect()
    }

    pub async fn list_objectives(&self) -> Vec<Objective> {
        self.state.read().await.objectives.values().cloned().collect()
    }

    pub async fn tasks_for_objective(&self, objective_id: Uuid) -> Vec<Task> {
        self.state
            .read()
            .await
            .tasks
            .values()
            .filter(|t| t.objective_id == Some(objective_id))
            .cloned()
            .collect()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

fn record(
    action: &StateAction,
    path: String,
    previous: Option<serde_json::Value>,
    next: Option<serde_json::Value>,
) -> ChangeRecord {
    ChangeRecord {
        id: Uuid::new_v4(),
        timestamp: Utc::now(),
        action: action.name().to_string(),
        path,
        previous,
        next,
    }
}

fn apply(state: &mut UnifiedState, action: StateAction) -> ChangeRecord {
    match &action {
        StateAction::UpsertAgent(agent) => {
            let path = format!("agents.{}", agent.id);
            let previous = state.agents.get(&agent.id).and_then(|a| serde_json::to_value(a).ok());
            let next = serde_json::to_value(agent).ok();
            state.agents.insert(agent.id, agent.clone());
            record(&action, path, previous, next)
        }
        StateAction::RemoveAgent(id) => {
            let previous = state.agents.remove(id).and_then(|a| serde_json::to_value(a).ok());
            record(&action, format!("agents.{id}"), previous, None)
        }
        StateAction::UpsertTask(task) => {
            let path = format!("tasks.{}", task.id);
            let previous = state.tasks.get(&task.id).and_then(|t| serde_json::to_value(t).ok());
            let next = serde_json::to_value(task).ok();
            state.tasks.insert(task.id, task.clone());
            record(&action, path, previous, next)
        }
        StateAction::RemoveTask(id) => {
            let previous = state.tasks.remove(id).and_then(|t| serde_json::to_value(t).ok());
            record(&action, format!("tasks.{id}"), previous, None)
        }
        StateAction::UpsertObjective(objective) => {
            let path = format!("objectives.{}", objective.id);
            let previous = state
                .objectives
                .get(&objective.id)
                .and_then(|o| serde_json::to_value(o).ok());
            let next = serde_json::to_value(objective).ok();
            state.objectives.insert(objective.id, objective.clone());
            record(&action, path, previous, next)
        }
        StateAction::RemoveObjective(id) => {
            let previous = state
                .objectives
                .remove(id)
                .and_then(|o| serde_json::to_value(o).ok());
            record(&action, format!("objectives.{id}"), previous, None)
        }
        StateAction::UpsertSession(session) => {
            let path = format!("sessions.{}", session.id);
            let previous = state
                .sessions
                .get(&session.id)
                .and_then(|s| serde_json::to_value(s).ok());
            let next = serde_json::to_value(session).ok();
            state.sessions.insert(session.id, session.clone());
            record(&action, path, previous, next)
        }
        StateAction::SetSwarmInfo(info) => {
            let previous = serde_json::to_value(&state.swarm).ok();
            state.swarm = info.clone();
            record(&action, "swarm".to_string(), previous, serde_json::to_value(info).ok())
        }
        StateAction::SetMemorySummary(summary) => {
            let previous = serde_json::to_value(&state.memory).ok();
            state.memory = summary.clone();
            record(&action, "memory".to_string(), previous, serde_json::to_value(summary).ok())
        }
        StateAction::SetOrchestration(orchestration) => {
            let previous = serde_json::to_value(&state.orchestration).ok();
            state.orchestration = orchestration.clone();
            record(
                &action,
                "orchestration".to_string(),
                previous,
                serde_json::to_value(orchestration).ok(),
            )
        }
        StateAction::SetHealth(health) => {
            let previous = serde_json::to_value(&state.health).ok();
            state.health = health.clone();
            record(&action, "health".to_string(), previous, serde_json::to_value(health).ok())
        }
        StateAction::SetMetrics(metrics) => {
            let previous = serde_json::to_value(&state.metrics).ok();
            state.metrics = metrics.clone();
            record(&action, "metrics".to_string(), previous, serde_json::to_value(metrics).ok())
        }
        StateAction::SetConfig(config) => {
            let previous = Some(state.config.clone());
            state.config = config.clone();
            record(&action, "config".to_string(), previous, Some(config.clone()))
        }
    }
}
