//! Dependency resolution over an objective's task graph.
//!
//! Validates that every dependency exists within the objective and that the
//! graph is acyclic. Violations are fatal at decomposition time; the
//! resolver never guesses intent.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::domain::error::{SwarmError, SwarmResult};
use crate::domain::models::{Task, TaskStatus};

/// Service for validating task dependency graphs.
#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

fn detect_cycle_util(
    node: Uuid,
    graph: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
    rec_stack: &mut HashSet<Uuid>,
    path: &mut Vec<Uuid>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(&node) {
        for &neighbor in neighbors {
            if !visited.contains(&neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(&neighbor) {
                if let Some(cycle_start) = path.iter().position(|&id| id == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(&node);
    path.pop();
    false
}

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Validate that every dependency of every task exists in the set and
    /// that no task depends on itself.
    pub fn validate_dependencies(&self, objective: Uuid, tasks: &[Task]) -> SwarmResult<()> {
        let known: HashSet<Uuid> = tasks.iter().map(|t| t.id).collect();
        for task in tasks {
            for &dep in &task.dependencies {
                if dep == task.id {
                    return Err(SwarmError::DependencyMissing {
                        task: task.id,
                        dependency: dep,
                    });
                }
                if !known.contains(&dep) {
                    return Err(SwarmError::DependencyMissing {
                        task: task.id,
                        dependency: dep,
                    });
                }
            }
        }
        if let Some(path) = self.detect_cycle(tasks) {
            return Err(SwarmError::DependencyCycle { objective, path });
        }
        Ok(())
    }

    /// Detect a dependency cycle; returns the offending path when found.
    pub fn detect_cycle(&self, tasks: &[Task]) -> Option<Vec<Uuid>> {
        let mut graph: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for task in tasks {
            graph
                .entry(task.id)
                .or_default()
                .extend(task.dependencies.iter().copied());
        }

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for task_id in graph.keys() {
            if !visited.contains(task_id)
                && detect_cycle_util(*task_id, &graph, &mut visited, &mut rec_stack, &mut path)
            {
                return Some(path);
            }
        }
        None
    }

    /// Topologically sort tasks (dependencies before dependents) using
    /// Kahn's algorithm.
    pub fn topological_sort(&self, tasks: &[Task]) -> SwarmResult<Vec<Task>> {
        if let Some(path) = self.detect_cycle(tasks) {
            let objective = tasks
                .first()
                .and_then(|t| t.objective_id)
                .unwrap_or_else(Uuid::nil);
            return Err(SwarmError::DependencyCycle { objective, path });
        }

        let mut task_map: HashMap<Uuid, Task> = tasks.iter().map(|t| (t.id, t.clone())).collect();
        let mut in_degree: HashMap<Uuid, usize> = HashMap::new();
        let mut dependents: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        for task in tasks {
            in_degree.entry(task.id).or_insert(0);
            for &dep in &task.dependencies {
                dependents.entry(dep).or_default().push(task.id);
                *in_degree.entry(task.id).or_insert(0) += 1;
            }
        }

        let mut queue: Vec<Uuid> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut sorted = Vec::new();

        while let Some(node_id) = queue.pop() {
            if let Some(task) = task_map.remove(&node_id) {
                sorted.push(task);
            }
            if let Some(children) = dependents.get(&node_id) {
                for &child in children {
                    if let Some(degree) = in_degree.get_mut(&child) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push(child);
                        }
                    }
                }
            }
        }

        if sorted.len() != tasks.len() {
            let objective = tasks
                .first()
                .and_then(|t| t.objective_id)
                .unwrap_or_else(Uuid::nil);
            return Err(SwarmError::DependencyCycle {
                objective,
                path: task_map.into_keys().collect(),
            });
        }
        Ok(sorted)
    }

    /// Whether every dependency of the task is completed.
    pub fn dependencies_satisfied(&self, task: &Task, all: &HashMap<Uuid, Task>) -> bool {
        task.dependencies.iter().all(|dep| {
            all.get(dep)
                .map(|t| t.status == TaskStatus::Completed)
                .unwrap_or(false)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_deps(deps: &[Uuid]) -> Task {
        let mut task = Task::new("research", "test");
        for &dep in deps {
            task.dependencies.insert(dep);
        }
        task
    }

    #[test]
    fn test_validate_dependencies_success() {
        let resolver = DependencyResolver::new();
        let a = task_with_deps(&[]);
        let b = task_with_deps(&[a.id]);
        assert!(resolver
            .validate_dependencies(Uuid::new_v4(), &[a, b])
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let resolver = DependencyResolver::new();
        let ghost = Uuid::new_v4();
        let a = task_with_deps(&[ghost]);
        let err = resolver
            .validate_dependencies(Uuid::new_v4(), &[a])
            .unwrap_err();
        assert!(matches!(err, SwarmError::DependencyMissing { dependency, .. } if dependency == ghost));
    }

    #[test]
    fn test_detect_two_node_cycle() {
        let resolver = DependencyResolver::new();
        let mut a = task_with_deps(&[]);
        let mut b = task_with_deps(&[]);
        a.dependencies.insert(b.id);
        b.dependencies.insert(a.id);

        let cycle = resolver.detect_cycle(&[a.clone(), b.clone()]).unwrap();
        assert!(cycle.contains(&a.id) || cycle.contains(&b.id));

        let err = resolver
            .validate_dependencies(Uuid::new_v4(), &[a, b])
            .unwrap_err();
        assert_eq!(err.code(), "dependency-cycle");
    }

    #[test]
    fn test_no_cycle_in_chain() {
        let resolver = DependencyResolver::new();
        let a = task_with_deps(&[]);
        let b = task_with_deps(&[a.id]);
        let c = task_with_deps(&[b.id]);
        assert!(resolver.detect_cycle(&[a, b, c]).is_none());
    }

    #[test]
    fn test_topological_sort_respects_dependencies() {
        let resolver = DependencyResolver::new();
        let a = task_with_deps(&[]);
        let b = task_with_deps(&[a.id]);
        let c = task_with_deps(&[a.id, b.id]);
        let tasks = vec![c.clone(), a.clone(), b.clone()];

        let sorted = resolver.topological_sort(&tasks).unwrap();
        let position = |id: Uuid| sorted.iter().position(|t| t.id == id).unwrap();
        assert!(position(a.id) < position(b.id));
        assert!(position(b.id) < position(c.id));
    }

    #[test]
    fn test_topological_sort_rejects_cycle() {
        let resolver = DependencyResolver::new();
        let mut a = task_with_deps(&[]);
        let mut b = task_with_deps(&[]);
        a.dependencies.insert(b.id);
        b.dependencies.insert(a.id);
        assert!(resolver.topological_sort(&[a, b]).is_err());
    }

    #[test]
    fn test_dependencies_satisfied() {
        let resolver = DependencyResolver::new();
        let mut dep = task_with_deps(&[]);
        let task = task_with_deps(&[dep.id]);

        let mut all = HashMap::new();
        all.insert(dep.id, dep.clone());
        assert!(!resolver.dependencies_satisfied(&task, &all));

        dep.assign(Uuid::new_v4()).unwrap();
        dep.complete("done").unwrap();
        all.insert(dep.id, dep);
        assert!(resolver.dependencies_satisfied(&task, &all));
    }

    #[test]
    fn test_dependency_on_missing_task_is_unsatisfied() {
        let resolver = DependencyResolver::new();
        let task = task_with_deps(&[Uuid::new_v4()]);
        assert!(!resolver.dependencies_satisfied(&task, &HashMap::new()));
    }
}
