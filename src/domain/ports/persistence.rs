//! Persistence ports - interfaces for the key-value and state backends.

use async_trait::async_trait;

use crate::domain::error::SwarmResult;
use crate::domain::models::{StateSnapshot, UnifiedState};

/// Key-value backend used by the memory substrate's batched writes.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Backend name for logs and error payloads.
    fn name(&self) -> &'static str;

    /// Upsert a value under a key.
    async fn put(&self, key: &str, value: serde_json::Value) -> SwarmResult<()>;

    /// Fetch a value by key.
    async fn get(&self, key: &str) -> SwarmResult<Option<serde_json::Value>>;

    /// Remove a key. Removing an absent key is a no-op.
    async fn remove(&self, key: &str) -> SwarmResult<()>;
}

/// State backend used by the state store for saves, loads, and snapshots.
///
/// Filesystem implementations serialize richer types (timestamps, maps,
/// sets) with serde type tags so that restoration preserves semantics.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Backend name for logs and error payloads.
    fn name(&self) -> &'static str;

    /// Persist the full unified state.
    async fn save(&self, state: &UnifiedState) -> SwarmResult<()>;

    /// Load the most recently saved state, if any.
    async fn load(&self) -> SwarmResult<Option<UnifiedState>>;

    /// Persist a snapshot, one per file under a conventional directory.
    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> SwarmResult<()>;

    /// Load a snapshot by id.
    async fn load_snapshot(&self, id: &str) -> SwarmResult<Option<StateSnapshot>>;

    /// List stored snapshot ids, newest first.
    async fn list_snapshots(&self) -> SwarmResult<Vec<String>>;

    /// Delete a snapshot by id. Deleting an absent snapshot is a no-op.
    async fn delete_snapshot(&self, id: &str) -> SwarmResult<()>;
}
