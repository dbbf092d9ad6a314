//! Event bus for coordinator event streaming.
//!
//! Broadcast-based with monotonic sequence numbering. Emission never blocks:
//! slow or absent subscribers (logging, metrics, other out-of-process sinks)
//! can lag or drop without stalling the coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Monotonically increasing sequence number assigned by the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event envelope carried on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub payload: SwarmEvent,
}

impl Event {
    /// Stable `category:name` code for this event.
    pub fn kind(&self) -> &'static str {
        self.payload.kind()
    }
}

/// Everything the coordinator emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SwarmEvent {
    CoordinatorStarted,
    CoordinatorStopped,
    CoordinatorCleanup {
        pending_failed: u32,
    },

    ObjectiveCreated {
        objective_id: Uuid,
        strategy: String,
        task_count: usize,
    },
    ObjectiveStarted {
        objective_id: Uuid,
    },
    ObjectiveCompleted {
        objective_id: Uuid,
    },
    ObjectiveFailed {
        objective_id: Uuid,
        reason: String,
    },

    TaskAssigned {
        task_id: Uuid,
        agent_id: Uuid,
    },
    TaskCompleted {
        task_id: Uuid,
        agent_id: Uuid,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    TaskRetry {
        task_id: Uuid,
        retry_count: u32,
    },

    AgentRegistered {
        agent_id: Uuid,
        name: String,
        agent_type: String,
    },
    AgentMessage {
        from: Uuid,
        to: Uuid,
        entry_id: Uuid,
    },

    MemoryAdded {
        entry_id: Uuid,
        agent_id: Uuid,
    },
    MemoryShared {
        original_id: Uuid,
        entry_id: Uuid,
        target: Uuid,
    },
    MemoryCleaned {
        removed: usize,
    },
    MemorySynced {
        persisted: usize,
    },
    MemoryEvicted {
        entry_id: Uuid,
        agent_id: Uuid,
    },

    MonitorAlert {
        message: String,
    },
}

impl SwarmEvent {
    /// Stable `category:name` code, part of the external surface.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CoordinatorStarted => "coordinator:started",
            Self::CoordinatorStopped => "coordinator:stopped",
            Self::CoordinatorCleanup { .. } => "coordinator:cleanup",
            Self::ObjectiveCreated { .. } => "objective:created",
            Self::ObjectiveStarted { .. } => "objective:started",
            Self::ObjectiveCompleted { .. } => "objective:completed",
            Self::ObjectiveFailed { .. } => "objective:failed",
            Self::TaskAssigned { .. } => "task:assigned",
            Self::TaskCompleted { .. } => "task:completed",
            Self::TaskFailed { .. } => "task:failed",
            Self::TaskRetry { .. } => "task:retry",
            Self::AgentRegistered { .. } => "agent:registered",
            Self::AgentMessage { .. } => "agent:message",
            Self::MemoryAdded { .. } => "memory:added",
            Self::MemoryShared { .. } => "memory:shared",
            Self::MemoryCleaned { .. } => "memory:cleaned",
            Self::MemorySynced { .. } => "memory:synced",
            Self::MemoryEvicted { .. } => "memory:evicted",
            Self::MonitorAlert { .. } => "monitor:alert",
        }
    }
}

/// Broadcast bus handing sequence-stamped events to any number of
/// subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
    sequence: Arc<AtomicU64>,
}

impl EventBus {
    /// Create a bus with the given subscriber buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Emit an event. Never blocks; the event is dropped when nobody is
    /// subscribed.
    pub fn emit(&self, payload: SwarmEvent) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            sequence: SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst)),
            timestamp: Utc::now(),
            payload,
        };
        tracing::debug!(kind = event.kind(), sequence = %event.sequence, "Event emitted");
        let _ = self.sender.send(event.clone());
        event
    }

    /// Subscribe to the stream. A receiver that lags beyond the buffer
    /// capacity loses the oldest events, never stalling the emitter.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_carry_monotonic_sequence() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(SwarmEvent::CoordinatorStarted);
        bus.emit(SwarmEvent::CoordinatorStopped);

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.sequence > first.sequence);
        assert_eq!(first.kind(), "coordinator:started");
        assert_eq!(second.kind(), "coordinator:stopped");
    }

    #[test]
    fn test_emit_without_subscribers_does_not_block_or_panic() {
        let bus = EventBus::new(4);
        for _ in 0..100 {
            bus.emit(SwarmEvent::MonitorAlert {
                message: "load high".to_string(),
            });
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_same_events() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let task_id = Uuid::new_v4();
        let agent_id = Uuid::new_v4();
        bus.emit(SwarmEvent::TaskAssigned { task_id, agent_id });

        let ea = a.recv().await.unwrap();
        let eb = b.recv().await.unwrap();
        assert_eq!(ea.id, eb.id);
        assert_eq!(ea.kind(), "task:assigned");
    }

    #[test]
    fn test_kind_codes() {
        let id = Uuid::new_v4();
        assert_eq!(
            SwarmEvent::TaskRetry {
                task_id: id,
                retry_count: 1
            }
            .kind(),
            "task:retry"
        );
        assert_eq!(
            SwarmEvent::MemoryEvicted {
                entry_id: id,
                agent_id: id
            }
            .kind(),
            "memory:evicted"
        );
        assert_eq!(
            SwarmEvent::ObjectiveFailed {
                objective_id: id,
                reason: "x".into()
            }
            .kind(),
            "objective:failed"
        );
    }
}
