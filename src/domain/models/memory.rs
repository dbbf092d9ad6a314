//! Memory domain model.
//!
//! Memory entries are the shared substrate agents use to exchange results
//! and knowledge. Sharing never mutates the original: it produces a fresh
//! entry owned by the target agent, linked back through provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Type of memory content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Curated knowledge, candidate for knowledge bases
    Knowledge,
    /// Output of a completed task
    Result,
    /// Agent-internal state
    State,
    /// Agent-to-agent message
    Communication,
    /// Recorded failure
    Error,
}

impl Default for EntryType {
    fn default() -> Self {
        Self::Knowledge
    }
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Result => "result",
            Self::State => "state",
            Self::Communication => "communication",
            Self::Error => "error",
        }
    }
}

/// Visibility class for a memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareLevel {
    /// Never shared or broadcast
    Private,
    /// Shareable within the swarm
    Team,
    /// Shareable anywhere
    Public,
}

impl Default for ShareLevel {
    fn default() -> Self {
        Self::Team
    }
}

impl ShareLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Team => "team",
            Self::Public => "public",
        }
    }

    /// Whether entries at this level may be copied to another agent.
    pub fn is_shareable(&self) -> bool {
        !matches!(self, Self::Private)
    }
}

/// Provenance of a shared entry, linking back to its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Entry this one was copied from
    pub original_id: Uuid,
    /// Agent that owned the original
    pub shared_from: Uuid,
    /// Agent that received the copy
    pub shared_to: Uuid,
    /// When the share happened
    pub shared_at: DateTime<Utc>,
}

/// Metadata attached to a memory entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Associated task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    /// Associated objective
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_id: Option<Uuid>,
    /// Tags for categorisation and knowledge-base attachment
    #[serde(default)]
    pub tags: Vec<String>,
    /// Priority for retention decisions
    #[serde(default)]
    pub priority: u8,
    /// Visibility class
    #[serde(default)]
    pub share_level: ShareLevel,
    /// Set when this entry was produced by a share or broadcast
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

/// An entry in the shared memory substrate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier
    pub id: Uuid,
    /// Owning agent
    pub agent_id: Uuid,
    /// Content type
    pub entry_type: EntryType,
    /// Content payload
    pub content: String,
    /// When created
    pub timestamp: DateTime<Utc>,
    /// Metadata
    pub metadata: EntryMetadata,
}

impl MemoryEntry {
    /// Create a new entry owned by `agent_id`.
    pub fn new(agent_id: Uuid, entry_type: EntryType, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            agent_id,
            entry_type,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: EntryMetadata::default(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.metadata.tags.push(tag.into());
        self
    }

    /// Set the share level.
    pub fn with_share_level(mut self, level: ShareLevel) -> Self {
        self.metadata.share_level = level;
        self
    }

    /// Produce the shared copy of this entry for `target`.
    ///
    /// The copy is a fresh entry owned by the target agent; the original is
    /// left untouched. Callers must check shareability first.
    pub fn share_to(&self, target: Uuid) -> Self {
        let mut copy = self.clone();
        copy.id = Uuid::new_v4();
        copy.agent_id = target;
        copy.timestamp = Utc::now();
        copy.metadata.provenance = Some(Provenance {
            original_id: self.id,
            shared_from: self.agent_id,
            shared_to: target,
            shared_at: copy.timestamp,
        });
        copy
    }
}

/// Knowledge-base metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseMetadata {
    /// Domain label (e.g. "distributed-systems")
    pub domain: String,
    /// Expertise tags matched against entry tags
    pub expertise: Vec<String>,
    /// Agents that contributed entries
    pub contributors: HashSet<Uuid>,
    /// When last updated
    pub last_updated: DateTime<Utc>,
}

/// A curated, domain-tagged bundle of memory entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Unique identifier
    pub id: Uuid,
    /// Name
    pub name: String,
    /// Description
    pub description: String,
    /// Attached entries, in attachment order
    pub entries: Vec<Uuid>,
    /// Metadata
    pub metadata: KnowledgeBaseMetadata,
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        domain: impl Into<String>,
        expertise: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            entries: Vec::new(),
            metadata: KnowledgeBaseMetadata {
                domain: domain.into(),
                expertise,
                contributors: HashSet::new(),
                last_updated: Utc::now(),
            },
        }
    }

    /// Whether an entry with the given tags belongs in this knowledge base.
    ///
    /// An entry is attached when any tag overlaps any expertise label as a
    /// case-insensitive substring, in either direction.
    pub fn accepts_tags(&self, tags: &[String]) -> bool {
        tags.iter().any(|tag| {
            let tag = tag.to_lowercase();
            self.metadata.expertise.iter().any(|exp| {
                let exp = exp.to_lowercase();
                tag.contains(&exp) || exp.contains(&tag)
            })
        })
    }

    /// Attach an entry, recording its contributor.
    pub fn attach(&mut self, entry_id: Uuid, contributor: Uuid) {
        if !self.entries.contains(&entry_id) {
            self.entries.push(entry_id);
            self.metadata.contributors.insert(contributor);
            self.metadata.last_updated = Utc::now();
        }
    }

    /// Trim the entry list to its most recent `keep` entries.
    pub fn trim_to_suffix(&mut self, keep: usize) {
        if self.entries.len() > keep {
            let excess = self.entries.len() - keep;
            self.entries.drain(..excess);
            self.metadata.last_updated = Utc::now();
        }
    }
}

/// Query specification for memory recall.
///
/// All populated filters must match; results are ordered newest-first.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Owning agent filter
    pub agent_id: Option<Uuid>,
    /// Entry type filter
    pub entry_type: Option<EntryType>,
    /// Associated task filter
    pub task_id: Option<Uuid>,
    /// Associated objective filter
    pub objective_id: Option<Uuid>,
    /// Tag overlap filter (any match)
    pub tags: Vec<String>,
    /// Lower bound on timestamp (inclusive)
    pub since: Option<DateTime<Utc>>,
    /// Upper bound on timestamp (inclusive)
    pub until: Option<DateTime<Utc>>,
    /// Share-level filter
    pub share_level: Option<ShareLevel>,
    /// Maximum results
    pub limit: Option<usize>,
}

impl MemoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_agent(mut self, agent_id: Uuid) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn of_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn for_objective(mut self, objective_id: Uuid) -> Self {
        self.objective_id = Some(objective_id);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn since(mut self, ts: DateTime<Utc>) -> Self {
        self.since = Some(ts);
        self
    }

    pub fn until(mut self, ts: DateTime<Utc>) -> Self {
        self.until = Some(ts);
        self
    }

    pub fn at_level(mut self, level: ShareLevel) -> Self {
        self.share_level = Some(level);
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Whether an entry satisfies every populated filter.
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(agent) = self.agent_id {
            if entry.agent_id != agent {
                return false;
            }
        }
        if let Some(ty) = self.entry_type {
            if entry.entry_type != ty {
                return false;
            }
        }
        if let Some(task) = self.task_id {
            if entry.metadata.task_id != Some(task) {
                return false;
            }
        }
        if let Some(objective) = self.objective_id {
            if entry.metadata.objective_id != Some(objective) {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let overlap = self
                .tags
                .iter()
                .any(|t| entry.metadata.tags.iter().any(|e| e.eq_ignore_ascii_case(t)));
            if !overlap {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        if let Some(level) = self.share_level {
            if entry.metadata.share_level != level {
                return false;
            }
        }
        true
    }
}
