//! Unified state model.
//!
//! The state store (C7) is the single source of truth for agents, tasks,
//! objectives, and sessions. Everything here serializes cleanly so snapshots
//! restore with identical semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::agent::Agent;
use super::objective::Objective;
use super::task::Task;

/// Snapshot format version written into every snapshot.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Identity and lifecycle of the swarm itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwarmInfo {
    /// Swarm name
    pub name: String,
    /// When the coordinator started
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the coordinator stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<DateTime<Utc>>,
}

/// A coordinator session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub label: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionInfo {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }
}

/// Summary view of the memory substrate, maintained by the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub entry_count: usize,
    pub knowledge_base_count: usize,
    pub evicted_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
}

/// Dispatcher bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationState {
    /// Whether new objectives are being accepted
    pub accepting: bool,
    /// Tasks currently in flight
    pub inflight: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_dispatch_at: Option<DateTime<Utc>>,
}

/// Health-check bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    pub healthy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<DateTime<Utc>>,
    /// Agents recovered after running past the task timeout
    #[serde(default)]
    pub recovered_agents: Vec<Uuid>,
}

/// Counters accumulated over the coordinator's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsState {
    pub tasks_dispatched: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub tasks_retried: u64,
    pub objectives_completed: u64,
    pub objectives_failed: u64,
}

/// The full unified state held by the state store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnifiedState {
    pub swarm: SwarmInfo,
    pub agents: HashMap<Uuid, Agent>,
    pub tasks: HashMap<Uuid, Task>,
    pub objectives: HashMap<Uuid, Objective>,
    pub sessions: HashMap<Uuid, SessionInfo>,
    pub memory: MemorySummary,
    pub orchestration: OrchestrationState,
    pub health: HealthState,
    pub metrics: MetricsState,
    /// Effective configuration, stored for inspection and snapshots
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A timestamped immutable dump of the entire core state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Snapshot identifier, usable as a filename stem
    pub id: String,
    /// When taken
    pub timestamp: DateTime<Utc>,
    /// The full state
    pub state: UnifiedState,
    /// Format version
    pub version: u32,
}

impl StateSnapshot {
    /// Capture a snapshot of the given state.
    pub fn capture(state: UnifiedState) -> Self {
        let timestamp = Utc::now();
        Self {
            id: format!("snapshot-{}", timestamp.format("%Y%m%dT%H%M%S%.3f")),
            timestamp,
            state,
            version: SNAPSHOT_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentType, Strategy};

    #[test]
    fn test_snapshot_round_trip() {
        let mut state = UnifiedState::default();
        let agent = Agent::new("a1", AgentType::Researcher);
        let task = Task::new("research", "survey");
        let objective = Objective::new("goal", Strategy::Research);
        state.agents.insert(agent.id, agent);
        state.tasks.insert(task.id, task);
        state.objectives.insert(objective.id, objective);
        state.metrics.tasks_completed = 7;

        let snapshot = StateSnapshot::capture(state.clone());
        let json = serde_json::to_string_pretty(&snapshot).unwrap();
        let restored: StateSnapshot = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.state, state);
        assert_eq!(restored.version, SNAPSHOT_VERSION);
    }

    #[test]
    fn test_snapshot_id_is_filename_safe() {
        let snapshot = StateSnapshot::capture(UnifiedState::default());
        assert!(snapshot.id.starts_with("snapshot-"));
        assert!(!snapshot.id.contains('/'));
        assert!(!snapshot.id.contains(' '));
    }
}
