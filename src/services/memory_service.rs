//! Shared memory substrate.
//!
//! A namespaced store over bounded collections: per-agent and cross-agent
//! entries with share levels, knowledge bases, batched persistence through
//! the key-value backend, and pressure-driven truncation. Reads hit the
//! in-memory view; writes are enqueued through the batch processor.

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::collections::{BoundedMap, BoundedSet, EvictionPolicy};
use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{
    EntryMetadata, EntryType, KnowledgeBase, MemoryEntry, MemoryQuery,
};
use crate::domain::ports::KeyValueBackend;

use super::batch_processor::{BatchConfig, BatchProcessor, ProcessFn};
use super::event_bus::{EventBus, SwarmEvent};

/// Configuration for the memory substrate.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Cap on total entries
    pub max_entries: usize,
    /// Cap on entries indexed per agent
    pub max_entries_per_agent: usize,
    /// Fraction of `max_entries` retained after pressure cleanup
    pub high_water_mark: f64,
    /// Knowledge-base entry lists are trimmed to this suffix under pressure
    pub kb_trim_suffix: usize,
    /// Eviction policy for the entry map
    pub eviction: EvictionPolicy,
    /// Batching for persistence writes
    pub batch: BatchConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            max_entries_per_agent: 1_000,
            high_water_mark: 0.7,
            kb_trim_suffix: 100,
            eviction: EvictionPolicy::Lru,
            batch: BatchConfig::default(),
        }
    }
}

/// Aggregate statistics over the substrate.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub entry_count: usize,
    pub agent_count: usize,
    pub knowledge_base_count: usize,
    pub evicted_total: u64,
    pub by_type: HashMap<String, usize>,
}

/// Point-in-time dump of the substrate, optionally scoped to one agent.
#[derive(Debug, Clone, Serialize)]
pub struct MemorySnapshot {
    pub taken_at: chrono::DateTime<Utc>,
    pub entries: Vec<MemoryEntry>,
    pub knowledge_bases: Vec<KnowledgeBase>,
}

struct MemoryState {
    entries: BoundedMap<Uuid, MemoryEntry>,
    agent_index: HashMap<Uuid, BoundedSet<Uuid>>,
    knowledge_bases: HashMap<Uuid, KnowledgeBase>,
    known_agents: Vec<Uuid>,
    evicted_total: u64,
}

/// The memory substrate service.
///
/// Interior state sits behind a plain mutex: every critical section is
/// short and never awaits, so contention stays negligible while the
/// pressure-monitor callback can run cleanup synchronously.
pub struct MemoryService {
    config: MemoryConfig,
    state: Mutex<MemoryState>,
    events: EventBus,
    persist: BatchProcessor<(String, serde_json::Value), ()>,
}

impl MemoryService {
    /// Create a substrate persisting through the given backend.
    pub fn new(config: MemoryConfig, backend: Arc<dyn KeyValueBackend>, events: EventBus) -> Self {
        let sync_events = events.clone();
        let process: ProcessFn<(String, serde_json::Value), ()> = Arc::new(move |batch| {
            let backend = Arc::clone(&backend);
            let events = sync_events.clone();
            Box::pin(async move {
                let count = batch.len();
                for (key, value) in batch {
                    backend
                        .put(&key, value)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                events.emit(SwarmEvent::MemorySynced { persisted: count });
                Ok(vec![(); count])
            })
        });
        let persist = BatchProcessor::spawn(config.batch.clone(), process);

        Self {
            state: Mutex::new(MemoryState {
                entries: BoundedMap::new(config.max_entries, config.eviction),
                agent_index: HashMap::new(),
                knowledge_bases: HashMap::new(),
                known_agents: Vec::new(),
                evicted_total: 0,
            }),
            config,
            events,
            persist,
        }
    }

    /// Make an agent known to the substrate (used as the default broadcast
    /// audience).
    pub fn register_agent(&self, agent_id: Uuid) {
        let mut state = self.lock();
        if !state.known_agents.contains(&agent_id) {
            state.known_agents.push(agent_id);
        }
    }

    /// Store a new entry for an agent. Returns the entry id.
    pub fn remember(
        &self,
        agent_id: Uuid,
        entry_type: EntryType,
        content: impl Into<String>,
        metadata: EntryMetadata,
    ) -> Uuid {
        let entry = MemoryEntry::new(agent_id, entry_type, content).with_metadata(metadata);
        let id = entry.id;
        self.insert_entry(entry);
        self.events.emit(SwarmEvent::MemoryAdded {
            entry_id: id,
            agent_id,
        });
        id
    }

    /// Fetch one entry by id, bumping its recency.
    pub fn get(&self, entry_id: Uuid) -> Option<MemoryEntry> {
        self.lock().entries.get(&entry_id).cloned()
    }

    /// Query entries. Results are ordered newest-first and optionally
    /// limited.
    pub fn recall(&self, query: &MemoryQuery) -> Vec<MemoryEntry> {
        let state = self.lock();
        let mut hits: Vec<MemoryEntry> = state
            .entries
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        hits
    }

    /// Share an entry with a target agent.
    ///
    /// Produces a fresh entry owned by the target; the original is never
    /// mutated. Sharing to self is allowed and still produces a distinct
    /// entry. Sharing a private entry is a caller error.
    pub fn share(&self, entry_id: Uuid, target: Uuid) -> SwarmResult<Uuid> {
        let original = self
            .get(entry_id)
            .ok_or(SwarmError::EntryNotFound(entry_id))?;
        if !original.metadata.share_level.is_shareable() {
            return Err(SwarmError::PrivateEntry { entry: entry_id });
        }

        let copy = original.share_to(target);
        let copy_id = copy.id;
        let is_message = copy.entry_type == EntryType::Communication;
        self.insert_entry(copy);
        self.events.emit(SwarmEvent::MemoryShared {
            original_id: entry_id,
            entry_id: copy_id,
            target,
        });
        if is_message {
            self.events.emit(SwarmEvent::AgentMessage {
                from: original.agent_id,
                to: target,
                entry_id: copy_id,
            });
        }
        Ok(copy_id)
    }

    /// Broadcast an entry to the given targets, or to every other known
    /// agent when targets are omitted. Returns the ids of the copies.
    pub fn broadcast(&self, entry_id: Uuid, targets: Option<Vec<Uuid>>) -> SwarmResult<Vec<Uuid>> {
        let original = self
            .get(entry_id)
            .ok_or(SwarmError::EntryNotFound(entry_id))?;
        if !original.metadata.share_level.is_shareable() {
            return Err(SwarmError::PrivateEntry { entry: entry_id });
        }

        let targets = targets.unwrap_or_else(|| {
            self.lock()
                .known_agents
                .iter()
                .copied()
                .filter(|a| *a != original.agent_id)
                .collect()
        });

        targets
            .into_iter()
            .map(|target| self.share(entry_id, target))
            .collect()
    }

    /// Create a knowledge base. Returns its id.
    pub fn create_knowledge_base(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        domain: impl Into<String>,
        expertise: Vec<String>,
    ) -> Uuid {
        let kb = KnowledgeBase::new(name, description, domain, expertise);
        let id = kb.id;
        self.lock().knowledge_bases.insert(id, kb);
        id
    }

    /// Attach an entry to a knowledge base when its tags overlap the base's
    /// expertise. Returns whether it was attached.
    pub fn update_knowledge_base(&self, kb_id: Uuid, entry_id: Uuid) -> SwarmResult<bool> {
        let mut state = self.lock();
        let entry = state
            .entries
            .peek(&entry_id)
            .ok_or(SwarmError::EntryNotFound(entry_id))?
            .clone();
        let kb = state
            .knowledge_bases
            .get_mut(&kb_id)
            .ok_or(SwarmError::KnowledgeBaseNotFound(kb_id))?;
        if kb.accepts_tags(&entry.metadata.tags) {
            kb.attach(entry_id, entry.agent_id);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Search knowledge-base entries by content text, optionally filtered by
    /// domain and expertise label.
    pub fn search_knowledge(
        &self,
        text: &str,
        domain: Option<&str>,
        expertise: Option<&str>,
    ) -> Vec<MemoryEntry> {
        let state = self.lock();
        let needle = text.to_lowercase();
        let mut hits = Vec::new();
        for kb in state.knowledge_bases.values() {
            if let Some(domain) = domain {
                if !kb.metadata.domain.eq_ignore_ascii_case(domain) {
                    continue;
                }
            }
            if let Some(expertise) = expertise {
                let wanted = expertise.to_lowercase();
                if !kb
                    .metadata
                    .expertise
                    .iter()
                    .any(|e| e.to_lowercase().contains(&wanted))
                {
                    continue;
                }
            }
            for entry_id in &kb.entries {
                if let Some(entry) = state.entries.peek(entry_id) {
                    if entry.content.to_lowercase().contains(&needle)
                        && !hits.iter().any(|e: &MemoryEntry| e.id == entry.id)
                    {
                        hits.push(entry.clone());
                    }
                }
            }
        }
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits
    }

    /// Dump entries (and all knowledge bases), optionally scoped to one
    /// agent.
    pub fn snapshot(&self, agent_id: Option<Uuid>) -> MemorySnapshot {
        let state = self.lock();
        let entries = state
            .entries
            .values()
            .filter(|e| agent_id.map_or(true, |a| e.agent_id == a))
            .cloned()
            .collect();
        MemorySnapshot {
            taken_at: Utc::now(),
            entries,
            knowledge_bases: state.knowledge_bases.values().cloned().collect(),
        }
    }

    /// Remove entries, scoped to one agent or everything. Returns how many
    /// were removed.
    pub fn clear(&self, agent_id: Option<Uuid>) -> usize {
        let mut state = self.lock();
        let removed = match agent_id {
            Some(agent) => {
                let ids: Vec<Uuid> = state
                    .entries
                    .iter()
                    .filter(|(_, e)| e.agent_id == agent)
                    .map(|(id, _)| *id)
                    .collect();
                for id in &ids {
                    state.entries.remove(id);
                }
                state.agent_index.remove(&agent);
                ids.len()
            }
            None => {
                let count = state.entries.len();
                state.entries.clear();
                state.agent_index.clear();
                count
            }
        };
        drop(state);
        if removed > 0 {
            self.events.emit(SwarmEvent::MemoryCleaned { removed });
        }
        removed
    }

    /// Aggregate statistics.
    pub fn stats(&self) -> MemoryStats {
        let state = self.lock();
        let mut by_type: HashMap<String, usize> = HashMap::new();
        for entry in state.entries.values() {
            *by_type
                .entry(entry.entry_type.as_str().to_string())
                .or_default() += 1;
        }
        MemoryStats {
            entry_count: state.entries.len(),
            agent_count: state.agent_index.len(),
            knowledge_base_count: state.knowledge_bases.len(),
            evicted_total: state.evicted_total,
            by_type,
        }
    }

    /// Pressure cleanup: truncate to the high-water-mark fraction and trim
    /// knowledge-base entry lists to a bounded suffix. Never fails.
    pub fn cleanup_to_high_water(&self) {
        let target = (self.config.max_entries as f64 * self.config.high_water_mark) as usize;
        let evicted = {
            let mut state = self.lock();
            let evicted = state.entries.evict_to(target);
            for (id, entry) in &evicted {
                let agent = entry.agent_id;
                if let Some(index) = state.agent_index.get_mut(&agent) {
                    index.remove(id);
                }
            }
            state.evicted_total += evicted.len() as u64;
            for kb in state.knowledge_bases.values_mut() {
                kb.trim_to_suffix(self.config.kb_trim_suffix);
            }
            evicted
        };
        for (id, entry) in &evicted {
            self.events.emit(SwarmEvent::MemoryEvicted {
                entry_id: *id,
                agent_id: entry.agent_id,
            });
        }
        if !evicted.is_empty() {
            self.events.emit(SwarmEvent::MemoryCleaned {
                removed: evicted.len(),
            });
        }
    }

    /// Flush pending persistence writes.
    pub async fn sync(&self) {
        self.persist.flush_all().await;
    }

    /// Whether the persistence pipeline is idle.
    pub fn is_sync_idle(&self) -> bool {
        self.persist.is_idle()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory state lock poisoned")
    }

    /// Insert an entry, maintaining the agent index, knowledge bases, and
    /// eviction bookkeeping, and enqueue its persistence write.
    fn insert_entry(&self, entry: MemoryEntry) {
        let id = entry.id;
        let agent_id = entry.agent_id;
        let key = format!("memory/{id}");
        let value = serde_json::to_value(&entry).unwrap_or(serde_json::Value::Null);

        let evicted = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let evicted = state.entries.insert(id, entry.clone());
            if let Some((evicted_id, evicted_entry)) = &evicted {
                let owner = evicted_entry.agent_id;
                if let Some(index) = state.agent_index.get_mut(&owner) {
                    index.remove(evicted_id);
                }
                state.evicted_total += 1;
            }

            let per_agent_cap = self.config.max_entries_per_agent;
            let index = state
                .agent_index
                .entry(agent_id)
                .or_insert_with(|| BoundedSet::new(per_agent_cap, EvictionPolicy::Fifo));
            if let Some(displaced) = index.insert(id) {
                // The per-agent cap also retires the displaced entry itself
                state.entries.remove(&displaced);
                state.evicted_total += 1;
            }

            // Attach to every knowledge base whose expertise overlaps
            for kb in state.knowledge_bases.values_mut() {
                if kb.accepts_tags(&entry.metadata.tags) {
                    kb.attach(id, agent_id);
                }
            }
            evicted
        };

        if let Some((evicted_id, evicted_entry)) = evicted {
            self.events.emit(SwarmEvent::MemoryEvicted {
                entry_id: evicted_id,
                agent_id: evicted_entry.agent_id,
            });
        }

        // Fire-and-forget: the batch processor owns retries and reporting
        let _ = self.persist.submit((key, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ShareLevel;
    use crate::infrastructure::persistence::InMemoryBackend;

    fn service() -> (Arc<MemoryService>, EventBus) {
        service_with(MemoryConfig::default())
    }

    fn service_with(config: MemoryConfig) -> (Arc<MemoryService>, EventBus) {
        let events = EventBus::new(256);
        let backend = Arc::new(InMemoryBackend::new());
        (
            Arc::new(MemoryService::new(config, backend, events.clone())),
            events,
        )
    }

    fn meta_with_tags(tags: &[&str]) -> EntryMetadata {
        EntryMetadata {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..EntryMetadata::default()
        }
    }

    #[tokio::test]
    async fn test_remember_and_recall() {
        let (memory, _) = service();
        let agent = Uuid::new_v4();
        let id = memory.remember(agent, EntryType::Result, "finding", EntryMetadata::default());

        let hits = memory.recall(&MemoryQuery::new().for_agent(agent));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, id);
        assert_eq!(hits[0].content, "finding");
    }

    #[tokio::test]
    async fn test_recall_is_newest_first_and_limited() {
        let (memory, _) = service();
        let agent = Uuid::new_v4();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(memory.remember(
                agent,
                EntryType::Knowledge,
                format!("entry {i}"),
                EntryMetadata::default(),
            ));
        }

        let hits = memory.recall(&MemoryQuery::new().for_agent(agent).limit(2));
        assert_eq!(hits.len(), 2);
        // Newest first: the last remembered entry leads
        assert_eq!(hits[0].id, *ids.last().unwrap());
    }

    #[tokio::test]
    async fn test_share_preserves_original() {
        let (memory, _) = service();
        let owner = Uuid::new_v4();
        let target = Uuid::new_v4();
        let original = memory.remember(owner, EntryType::Result, "data", EntryMetadata::default());

        let copy = memory.share(original, target).unwrap();
        assert_ne!(copy, original);

        let copy_entry = memory.get(copy).unwrap();
        assert_eq!(copy_entry.agent_id, target);
        let provenance = copy_entry.metadata.provenance.unwrap();
        assert_eq!(provenance.original_id, original);
        assert_eq!(provenance.shared_from, owner);

        // Original untouched
        let original_entry = memory.get(original).unwrap();
        assert_eq!(original_entry.agent_id, owner);
        assert!(original_entry.metadata.provenance.is_none());
    }

    #[tokio::test]
    async fn test_private_entries_cannot_be_shared_or_broadcast() {
        let (memory, _) = service();
        let owner = Uuid::new_v4();
        let id = memory.remember(
            owner,
            EntryType::State,
            "secret",
            EntryMetadata {
                share_level: ShareLevel::Private,
                ..EntryMetadata::default()
            },
        );

        let err = memory.share(id, Uuid::new_v4()).unwrap_err();
        assert_eq!(err.code(), "private-entry");
        let err = memory.broadcast(id, None).unwrap_err();
        assert_eq!(err.code(), "private-entry");

        // Invariant: no copy of a private entry exists
        let all = memory.recall(&MemoryQuery::new());
        assert!(all
            .iter()
            .all(|e| e.metadata.provenance.as_ref().map(|p| p.original_id) != Some(id)));
    }

    #[tokio::test]
    async fn test_share_to_self_is_distinct() {
        let (memory, _) = service();
        let owner = Uuid::new_v4();
        let id = memory.remember(owner, EntryType::Knowledge, "note", EntryMetadata::default());
        let copy = memory.share(id, owner).unwrap();
        assert_ne!(copy, id);
        assert_eq!(memory.get(copy).unwrap().agent_id, owner);
    }

    #[tokio::test]
    async fn test_broadcast_defaults_to_other_known_agents() {
        let (memory, _) = service();
        let owner = Uuid::new_v4();
        let peer_a = Uuid::new_v4();
        let peer_b = Uuid::new_v4();
        for agent in [owner, peer_a, peer_b] {
            memory.register_agent(agent);
        }

        let id = memory.remember(owner, EntryType::Result, "shared", EntryMetadata::default());
        let copies = memory.broadcast(id, None).unwrap();
        assert_eq!(copies.len(), 2);

        let owners: Vec<Uuid> = copies
            .iter()
            .map(|c| memory.get(*c).unwrap().agent_id)
            .collect();
        assert!(owners.contains(&peer_a));
        assert!(owners.contains(&peer_b));
        assert!(!owners.contains(&owner));
    }

    #[tokio::test]
    async fn test_eviction_emits_events_in_insertion_order() {
        let (memory, events) = service_with(MemoryConfig {
            max_entries: 10,
            ..MemoryConfig::default()
        });
        let mut rx = events.subscribe();
        let agent = Uuid::new_v4();

        let mut ids = Vec::new();
        for i in 0..15 {
            ids.push(memory.remember(
                agent,
                EntryType::Knowledge,
                format!("entry {i}"),
                EntryMetadata {
                    priority: 1,
                    ..EntryMetadata::default()
                },
            ));
        }

        // The 10 most recent survive
        let stats = memory.stats();
        assert_eq!(stats.entry_count, 10);
        assert_eq!(stats.evicted_total, 5);
        for id in &ids[5..] {
            assert!(memory.get(*id).is_some());
        }
        for id in &ids[..5] {
            assert!(memory.get(*id).is_none());
        }

        // Exactly 5 memory:evicted events, in insertion order
        let mut evicted = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let SwarmEvent::MemoryEvicted { entry_id, .. } = event.payload {
                evicted.push(entry_id);
            }
        }
        assert_eq!(evicted, ids[..5].to_vec());
    }

    #[tokio::test]
    async fn test_knowledge_base_attachment_on_remember() {
        let (memory, _) = service();
        let agent = Uuid::new_v4();
        let kb = memory.create_knowledge_base(
            "rust-kb",
            "Rust lore",
            "systems",
            vec!["rust".to_string()],
        );

        memory.remember(agent, EntryType::Knowledge, "ownership rules", meta_with_tags(&["Rust-lang"]));
        memory.remember(agent, EntryType::Knowledge, "gc tuning", meta_with_tags(&["java"]));

        let hits = memory.search_knowledge("ownership", Some("systems"), None);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].content.contains("ownership"));

        let miss = memory.search_knowledge("gc tuning", None, None);
        assert!(miss.is_empty());

        // Explicit attachment respects the tag-overlap rule
        let unrelated = memory.remember(agent, EntryType::Knowledge, "x", meta_with_tags(&["cooking"]));
        assert!(!memory.update_knowledge_base(kb, unrelated).unwrap());
    }

    #[tokio::test]
    async fn test_search_knowledge_filters_by_expertise() {
        let (memory, _) = service();
        let agent = Uuid::new_v4();
        memory.create_knowledge_base("a", "", "domain-a", vec!["tokio".to_string()]);
        memory.remember(agent, EntryType::Knowledge, "tokio select loops", meta_with_tags(&["tokio"]));

        assert_eq!(memory.search_knowledge("select", None, Some("tokio")).len(), 1);
        assert!(memory.search_knowledge("select", None, Some("rayon")).is_empty());
        assert!(memory.search_knowledge("select", Some("other"), None).is_empty());
    }

    #[tokio::test]
    async fn test_clear_scoped_and_full() {
        let (memory, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        memory.remember(a, EntryType::State, "sa", EntryMetadata::default());
        memory.remember(b, EntryType::State, "sb", EntryMetadata::default());

        assert_eq!(memory.clear(Some(a)), 1);
        assert_eq!(memory.recall(&MemoryQuery::new()).len(), 1);
        assert_eq!(memory.clear(None), 1);
        assert_eq!(memory.stats().entry_count, 0);
    }

    #[tokio::test]
    async fn test_pressure_cleanup_truncates_to_high_water() {
        let (memory, _) = service_with(MemoryConfig {
            max_entries: 10,
            high_water_mark: 0.5,
            kb_trim_suffix: 2,
            ..MemoryConfig::default()
        });
        let agent = Uuid::new_v4();
        memory.create_knowledge_base("kb", "", "dom", vec!["tag".to_string()]);
        for i in 0..10 {
            memory.remember(agent, EntryType::Knowledge, format!("e{i}"), meta_with_tags(&["tag"]));
        }

        memory.cleanup_to_high_water();
        let stats = memory.stats();
        assert_eq!(stats.entry_count, 5);

        let snapshot = memory.snapshot(None);
        assert!(snapshot.knowledge_bases[0].entries.len() <= 2);
    }

    #[tokio::test]
    async fn test_snapshot_scoping() {
        let (memory, _) = service();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        memory.remember(a, EntryType::Result, "ra", EntryMetadata::default());
        memory.remember(b, EntryType::Result, "rb", EntryMetadata::default());

        assert_eq!(memory.snapshot(Some(a)).entries.len(), 1);
        assert_eq!(memory.snapshot(None).entries.len(), 2);
    }

    #[tokio::test]
    async fn test_pressure_monitor_drives_cleanup() {
        use crate::collections::{PressureConfig, PressureMonitor};

        let (memory, _) = service_with(MemoryConfig {
            max_entries: 10,
            high_water_mark: 0.5,
            ..MemoryConfig::default()
        });
        let agent = Uuid::new_v4();
        for i in 0..10 {
            memory.remember(agent, EntryType::State, format!("e{i}"), EntryMetadata::default());
        }

        // A 1-byte threshold forces pressure on any machine
        let monitor = PressureMonitor::new(PressureConfig {
            max_bytes: 1,
            check_interval: std::time::Duration::from_secs(60),
        });
        let cleanup_target = Arc::clone(&memory);
        monitor.register_cleanup(Box::new(move || cleanup_target.cleanup_to_high_water()));

        assert!(monitor.check_now());
        assert_eq!(memory.stats().entry_count, 5);
    }

    #[tokio::test]
    async fn test_communication_share_emits_agent_message() {
        let (memory, events) = service();
        let mut rx = events.subscribe();
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();

        let id = memory.remember(from, EntryType::Communication, "ping", EntryMetadata::default());
        let copy = memory.share(id, to).unwrap();

        let mut saw_message = false;
        while let Ok(event) = rx.try_recv() {
            if let SwarmEvent::AgentMessage {
                from: f,
                to: t,
                entry_id,
            } = event.payload
            {
                assert_eq!(f, from);
                assert_eq!(t, to);
                assert_eq!(entry_id, copy);
                saw_message = true;
            }
        }
        assert!(saw_message);
    }

    #[tokio::test]
    async fn test_sync_persists_through_backend() {
        let events = EventBus::new(64);
        let backend = Arc::new(InMemoryBackend::new());
        let memory = MemoryService::new(MemoryConfig::default(), Arc::clone(&backend) as _, events);
        let agent = Uuid::new_v4();

        let id = memory.remember(agent, EntryType::Result, "persisted", EntryMetadata::default());
        memory.sync().await;
        assert!(memory.is_sync_idle());

        let stored = backend.get(&format!("memory/{id}")).await.unwrap();
        assert!(stored.is_some());
    }
}
