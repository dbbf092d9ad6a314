//! Objective decomposition.
//!
//! Each strategy maps to a fixed template of tasks with declared
//! intra-objective dependencies. Task kinds are an observable part of the
//! external surface, so the templates are spelled out literally here.

use uuid::Uuid;

use crate::domain::error::SwarmResult;
use crate::domain::models::{Objective, Strategy, Task};

use super::dependency_resolver::DependencyResolver;

/// Per-task defaults applied during decomposition.
#[derive(Debug, Clone)]
pub struct DecomposerDefaults {
    pub max_retries: u32,
    pub timeout_ms: u64,
}

impl Default for DecomposerDefaults {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout_ms: 300_000,
        }
    }
}

/// One entry of a strategy template: kind, priority, and the indices of the
/// template entries it depends on.
struct TemplateEntry {
    kind: &'static str,
    priority: u8,
    depends_on: &'static [usize],
}

/// Linear exploration pipeline (canonical `auto` template).
const AUTO: &[TemplateEntry] = &[
    TemplateEntry { kind: "exploration", priority: 1, depends_on: &[] },
    TemplateEntry { kind: "planning", priority: 2, depends_on: &[0] },
    TemplateEntry { kind: "execution", priority: 3, depends_on: &[1] },
    TemplateEntry { kind: "validation", priority: 4, depends_on: &[2] },
    TemplateEntry { kind: "completion", priority: 5, depends_on: &[3] },
];

const RESEARCH: &[TemplateEntry] = &[
    TemplateEntry { kind: "research", priority: 1, depends_on: &[] },
    TemplateEntry { kind: "analysis", priority: 2, depends_on: &[0] },
    TemplateEntry { kind: "synthesis", priority: 3, depends_on: &[1] },
];

const DEVELOPMENT: &[TemplateEntry] = &[
    TemplateEntry { kind: "planning", priority: 1, depends_on: &[] },
    TemplateEntry { kind: "implementation", priority: 2, depends_on: &[0] },
    TemplateEntry { kind: "testing", priority: 3, depends_on: &[1] },
    TemplateEntry { kind: "documentation", priority: 3, depends_on: &[1] },
    TemplateEntry { kind: "review", priority: 4, depends_on: &[2, 3] },
];

const ANALYSIS: &[TemplateEntry] = &[
    TemplateEntry { kind: "data-collection", priority: 1, depends_on: &[] },
    TemplateEntry { kind: "pattern-analysis", priority: 2, depends_on: &[0] },
    TemplateEntry { kind: "reporting", priority: 3, depends_on: &[1] },
];

/// Decomposes objectives into task graphs.
#[derive(Debug, Clone, Default)]
pub struct Decomposer {
    resolver: DependencyResolver,
}

impl Decomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decompose an objective into its strategy's task template.
    ///
    /// The produced graph is validated (dependencies exist, no cycles)
    /// before being returned; a template violation is a fatal decomposition
    /// error, not something to guess around.
    pub fn decompose(
        &self,
        objective: &Objective,
        defaults: &DecomposerDefaults,
    ) -> SwarmResult<Vec<Task>> {
        let template = match objective.strategy {
            Strategy::Auto => AUTO,
            Strategy::Research => RESEARCH,
            Strategy::Development => DEVELOPMENT,
            Strategy::Analysis => ANALYSIS,
        };

        let ids: Vec<Uuid> = template.iter().map(|_| Uuid::new_v4()).collect();
        let tasks: Vec<Task> = template
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let mut task = Task::new(
                    entry.kind,
                    format!("{} for objective: {}", entry.kind, objective.description),
                )
                .with_objective(objective.id)
                .with_priority(entry.priority)
                .with_max_retries(defaults.max_retries)
                .with_timeout_ms(defaults.timeout_ms);
                task.id = ids[index];
                for &dep_index in entry.depends_on {
                    task.dependencies.insert(ids[dep_index]);
                }
                task
            })
            .collect();

        self.resolver.validate_dependencies(objective.id, &tasks)?;
        Ok(tasks)
    }
}
