//! Bounded collections: size-capped maps, sets, and queues with eviction,
//! plus the memory-pressure monitor that drives cleanup under load.
//!
//! Overflow never fails; it evicts. Concurrent access is the caller's
//! responsibility.

pub mod bounded_map;
pub mod bounded_queue;
pub mod bounded_set;
pub mod pressure;

pub use bounded_map::BoundedMap;
pub use bounded_queue::{BoundedQueue, OverflowPolicy};
pub use bounded_set::BoundedSet;
pub use pressure::{CleanupCallback, PressureConfig, PressureMonitor};

/// Which item a full collection sacrifices on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Least recently used
    Lru,
    /// Least frequently used
    Lfu,
    /// Oldest inserted
    Fifo,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::Lru
    }
}
