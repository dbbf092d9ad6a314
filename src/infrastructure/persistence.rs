//! Persistence backends.
//!
//! The filesystem backend writes pretty JSON: state at `state.json`,
//! key-value records under `kv/`, snapshots one-per-file under
//! `snapshots/`. Timestamps serialize as RFC 3339 and maps key by uuid
//! string, so a restored state preserves semantics. The in-memory backend
//! serves tests and ephemeral runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{StateSnapshot, UnifiedState};
use crate::domain::ports::{KeyValueBackend, PersistenceBackend};

/// Filesystem-backed persistence rooted at a base directory.
#[derive(Debug, Clone)]
pub struct FsBackend {
    base_dir: PathBuf,
}

impl FsBackend {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    fn kv_path(&self, key: &str) -> PathBuf {
        // Keys may contain namespace separators; flatten them for the fs
        let sanitized: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '-' } else { c })
            .collect();
        self.base_dir.join("kv").join(format!("{sanitized}.json"))
    }

    fn snapshot_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        self.snapshot_dir().join(format!("{id}.json"))
    }

    fn error(&self, path: &Path, e: impl std::fmt::Display) -> SwarmError {
        SwarmError::Persistence {
            backend: "fs".to_string(),
            message: format!("{}: {e}", path.display()),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> SwarmResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.error(path, e))?;
        }
        let json = serde_json::to_string_pretty(value).map_err(|e| self.error(path, e))?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| self.error(path, e))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &Path,
    ) -> SwarmResult<Option<T>> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| self.error(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.error(path, e)),
        }
    }
}

#[async_trait]
impl KeyValueBackend for FsBackend {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> SwarmResult<()> {
        self.write_json(&self.kv_path(key), &value).await
    }

    async fn get(&self, key: &str) -> SwarmResult<Option<serde_json::Value>> {
        self.read_json(&self.kv_path(key)).await
    }

    async fn remove(&self, key: &str) -> SwarmResult<()> {
        match tokio::fs::remove_file(self.kv_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(&self.kv_path(key), e)),
        }
    }
}

#[async_trait]
impl PersistenceBackend for FsBackend {
    fn name(&self) -> &'static str {
        "fs"
    }

    async fn save(&self, state: &UnifiedState) -> SwarmResult<()> {
        debug!(path = %self.state_path().display(), "Saving state");
        self.write_json(&self.state_path(), state).await
    }

    async fn load(&self) -> SwarmResult<Option<UnifiedState>> {
        self.read_json(&self.state_path()).await
    }

    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> SwarmResult<()> {
        self.write_json(&self.snapshot_path(&snapshot.id), snapshot)
            .await
    }

    async fn load_snapshot(&self, id: &str) -> SwarmResult<Option<StateSnapshot>> {
        self.read_json(&self.snapshot_path(id)).await
    }

    async fn list_snapshots(&self) -> SwarmResult<Vec<String>> {
        let dir = self.snapshot_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(&dir, e)),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| self.error(&dir, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        // Snapshot ids embed their timestamp, so lexical order is temporal
        ids.sort();
        ids.reverse();
        Ok(ids)
    }

    async fn delete_snapshot(&self, id: &str) -> SwarmResult<()> {
        match tokio::fs::remove_file(self.snapshot_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.error(&self.snapshot_path(id), e)),
        }
    }
}

/// In-memory backend for tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    kv: Mutex<HashMap<String, serde_json::Value>>,
    state: Mutex<Option<UnifiedState>>,
    snapshots: Mutex<HashMap<String, StateSnapshot>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored key-value records.
    pub fn kv_len(&self) -> usize {
        self.kv.lock().expect("kv lock poisoned").len()
    }
}

#[async_trait]
impl KeyValueBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn put(&self, key: &str, value: serde_json::Value) -> SwarmResult<()> {
        self.kv
            .lock()
            .expect("kv lock poisoned")
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> SwarmResult<Option<serde_json::Value>> {
        Ok(self.kv.lock().expect("kv lock poisoned").get(key).cloned())
    }

    async fn remove(&self, key: &str) -> SwarmResult<()> {
        self.kv.lock().expect("kv lock poisoned").remove(key);
        Ok(())
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn save(&self, state: &UnifiedState) -> SwarmResult<()> {
        *self.state.lock().expect("state lock poisoned") = Some(state.clone());
        Ok(())
    }

    async fn load(&self) -> SwarmResult<Option<UnifiedState>> {
        Ok(self.state.lock().expect("state lock poisoned").clone())
    }

    async fn save_snapshot(&self, snapshot: &StateSnapshot) -> SwarmResult<()> {
        self.snapshots
            .lock()
            .expect("snapshot lock poisoned")
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load_snapshot(&self, id: &str) -> SwarmResult<Option<StateSnapshot>> {
        Ok(self
            .snapshots
            .lock()
            .expect("snapshot lock poisoned")
            .get(id)
            .cloned())
    }

    async fn list_snapshots(&self) -> SwarmResult<Vec<String>> {
        let mut ids: Vec<String> = self
            .snapshots
            .lock()
            .expect("snapshot lock poisoned")
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids.reverse();
        Ok(ids)
    }

    async fn delete_snapshot(&self, id: &str) -> SwarmResult<()> {
        self.snapshots
            .lock()
            .expect("snapshot lock poisoned")
            .remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Agent, AgentType, Task};

    #[tokio::test]
    async fn test_fs_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        assert!(backend.load().await.unwrap().is_none());

        let mut state = UnifiedState::default();
        let agent = Agent::new("a1", AgentType::Researcher);
        let task = Task::new("research", "x");
        state.agents.insert(agent.id, agent);
        state.tasks.insert(task.id, task);

        backend.save(&state).await.unwrap();
        let loaded = backend.load().await.unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[tokio::test]
    async fn test_fs_snapshot_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        let s1 = StateSnapshot::capture(UnifiedState::default());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let s2 = StateSnapshot::capture(UnifiedState::default());

        backend.save_snapshot(&s1).await.unwrap();
        backend.save_snapshot(&s2).await.unwrap();

        let ids = backend.list_snapshots().await.unwrap();
        assert_eq!(ids.len(), 2);
        // Newest first
        assert_eq!(ids[0], s2.id);

        let loaded = backend.load_snapshot(&s1.id).await.unwrap().unwrap();
        assert_eq!(loaded, s1);

        backend.delete_snapshot(&s1.id).await.unwrap();
        assert!(backend.load_snapshot(&s1.id).await.unwrap().is_none());
        // Deleting again is a no-op
        backend.delete_snapshot(&s1.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_fs_kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());

        backend
            .put("memory/abc", serde_json::json!({"content": "x"}))
            .await
            .unwrap();
        let value = backend.get("memory/abc").await.unwrap().unwrap();
        assert_eq!(value["content"], "x");

        backend.remove("memory/abc").await.unwrap();
        assert!(backend.get("memory/abc").await.unwrap().is_none());
        backend.remove("memory/abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_fs_state_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FsBackend::new(dir.path());
        backend.save(&UnifiedState::default()).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join("state.json"))
            .await
            .unwrap();
        assert!(raw.contains('\n'));
    }

    #[tokio::test]
    async fn test_in_memory_backend() {
        let backend = InMemoryBackend::new();
        backend.put("k", serde_json::json!(1)).await.unwrap();
        assert_eq!(backend.kv_len(), 1);
        assert_eq!(backend.get("k").await.unwrap(), Some(serde_json::json!(1)));

        let snapshot = StateSnapshot::capture(UnifiedState::default());
        backend.save_snapshot(&snapshot).await.unwrap();
        assert_eq!(backend.list_snapshots().await.unwrap(), vec![snapshot.id.clone()]);
    }
}
