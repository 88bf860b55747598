use std::collections::{BTreeSet, HashSet};

use sleuth_core::error::{Result, SleuthError};
use sleuth_core::types::{Task, TaskId};

/// Ordered, validated set of tasks.
///
/// Plan order is kept and used only to break ties between runnable tasks.
/// Dangling dependency ids and cycles are accepted: such tasks simply never
/// become runnable.
#[derive(Debug, Clone, Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
}

impl TaskGraph {
    /// Build a graph, rejecting duplicate ids and tasks that depend on
    /// themselves.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        let mut seen = HashSet::new();
        for task in &tasks {
            if !seen.insert(&task.id) {
                return Err(SleuthError::DuplicateTaskId(task.id.to_string()));
            }
            if task.depends_on.contains(&task.id) {
                return Err(SleuthError::SelfDependency(task.id.to_string()));
            }
        }
        Ok(Self { tasks })
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    /// Tasks not yet completed whose dependencies are all completed, in
    /// plan order.
    pub fn runnable(&self, completed: &BTreeSet<TaskId>) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| !completed.contains(&t.id))
            .filter(|t| t.depends_on.iter().all(|dep| completed.contains(dep)))
            .collect()
    }

    /// Ids of tasks that are not in `completed`, in plan order.
    pub fn unreached(&self, completed: &BTreeSet<TaskId>) -> Vec<TaskId> {
        self.tasks
            .iter()
            .filter(|t| !completed.contains(&t.id))
            .map(|t| t.id.clone())
            .collect()
    }

    /// `(task, missing dependency)` pairs for dependencies that name no task
    /// in the plan.
    pub fn dangling_dependencies(&self) -> Vec<(TaskId, TaskId)> {
        self.tasks
            .iter()
            .flat_map(|t| {
                t.depends_on
                    .iter()
                    .filter(|dep| !self.contains(dep))
                    .map(move |dep| (t.id.clone(), dep.clone()))
            })
            .collect()
    }
}
