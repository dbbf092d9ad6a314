//! Objective domain model.
//!
//! An objective is a user-level goal that the scheduler decomposes into a
//! dependency graph of tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decomposition strategy for an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Linear exploration → planning → execution → validation → completion pipeline
    Auto,
    /// Research → analysis → synthesis pipeline
    Research,
    /// Planning, implementation, testing, documentation, review
    Development,
    /// Data collection → pattern analysis → reporting pipeline
    Analysis,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Auto
    }
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Research => "research",
            Self::Development => "development",
            Self::Analysis => "analysis",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "research" => Some(Self::Research),
            "development" => Some(Self::Development),
            "analysis" => Some(Self::Analysis),
            _ => None,
        }
    }
}

/// Status of an objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    /// Tasks are being decomposed and registered
    Planning,
    /// Tasks are dispatching and executing
    Executing,
    /// Every task completed and verification passed
    Completed,
    /// At least one task failed terminally or verification rejected the result
    Failed,
}

impl Default for ObjectiveStatus {
    fn default() -> Self {
        Self::Planning
    }
}

impl ObjectiveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A user-level goal decomposed into tasks.
///
/// Created and mutated only by the scheduler; destroyed by retention policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Unique identifier
    pub id: Uuid,
    /// Human-readable description of the goal
    pub description: String,
    /// Decomposition strategy
    pub strategy: Strategy,
    /// Tasks belonging to this objective, in decomposition order
    pub tasks: Vec<Uuid>,
    /// Current status
    pub status: ObjectiveStatus,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl Objective {
    /// Create a new objective in planning state.
    pub fn new(description: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            strategy,
            tasks: Vec::new(),
            status: ObjectiveStatus::Planning,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Mark the objective as executing.
    pub fn start(&mut self) {
        self.status = ObjectiveStatus::Executing;
    }

    /// Mark the objective terminal.
    pub fn finish(&mut self, status: ObjectiveStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Check if the objective has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for s in ["auto", "research", "development", "analysis"] {
            let strategy = Strategy::parse_str(s).unwrap();
            assert_eq!(strategy.as_str(), s);
        }
        assert!(Strategy::parse_str("chaos").is_none());
    }

    #[test]
    fn test_objective_lifecycle() {
        let mut objective = Objective::new("survey X", Strategy::Research);
        assert_eq!(objective.status, ObjectiveStatus::Planning);
        assert!(objective.completed_at.is_none());

        objective.start();
        assert_eq!(objective.status, ObjectiveStatus::Executing);
        assert!(!objective.is_terminal());

        objective.finish(ObjectiveStatus::Completed);
        assert!(objective.is_terminal());
        assert!(objective.completed_at.is_some());
    }
}
