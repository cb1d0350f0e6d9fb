//! Structural view of a task set definition: dependency adjacency, layering
//! and cycle detection. Built once when a definition is published; a
//! definition that fails to build is never instantiated.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::models::definition::{TaskDefinition, TaskKey};

#[derive(Debug, Error)]
pub enum TaskGraphError {
    #[error("Duplicate task id '{0}'")]
    DuplicateTask(TaskKey),
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: TaskKey, dependency: TaskKey },
    #[error("Dependency cycle among tasks: {remaining:?}")]
    Cycle { remaining: Vec<TaskKey> },
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Task ids in declaration order; the tie-break for layer emission.
    order: Vec<TaskKey>,
    dependencies: HashMap<TaskKey, Vec<TaskKey>>,
    dependents: HashMap<TaskKey, Vec<TaskKey>>,
    layers: Vec<Vec<TaskKey>>,
}

impl TaskGraph {
    /// Build adjacency and in-degree maps, rejecting duplicate ids, unknown
    /// dependencies and cycles.
    ///
    /// Cycles are detected by iterative peeling: repeatedly remove every
    /// zero-in-degree task; if a pass removes nothing while tasks remain,
    /// the remaining set is reported in the error.
    pub fn build(tasks: &[TaskDefinition]) -> Result<TaskGraph, TaskGraphError> {
        let mut order = Vec::with_capacity(tasks.len());
        let mut dependencies: HashMap<TaskKey, Vec<TaskKey>> = HashMap::new();
        for task in tasks {
            if dependencies.contains_key(&task.id) {
                return Err(TaskGraphError::DuplicateTask(task.id.clone()));
            }
            dependencies.insert(task.id.clone(), task.depends_on.clone());
            order.push(task.id.clone());
        }

        let mut dependents: HashMap<TaskKey, Vec<TaskKey>> =
            order.iter().map(|k| (k.clone(), Vec::new())).collect();
        for task in tasks {
            for dep in &task.depends_on {
                match dependents.get_mut(dep) {
                    Some(list) => list.push(task.id.clone()),
                    None => {
                        return Err(TaskGraphError::UnknownDependency {
                            task: task.id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                }
            }
        }

        let mut in_degree: HashMap<TaskKey, usize> = order
            .iter()
            .map(|k| (k.clone(), dependencies.get(k).map_or(0, |d| d.len())))
            .collect();
        let mut remaining: HashSet<TaskKey> = order.iter().cloned().collect();
        let mut layers = Vec::new();

        while !remaining.is_empty() {
            let layer: Vec<TaskKey> = order
                .iter()
                .filter(|k| remaining.contains(*k) && in_degree.get(*k) == Some(&0))
                .cloned()
                .collect();

            if layer.is_empty() {
                let stuck: Vec<TaskKey> = order
                    .iter()
                    .filter(|k| remaining.contains(*k))
                    .cloned()
                    .collect();
                return Err(TaskGraphError::Cycle { remaining: stuck });
            }

            for key in &layer {
                remaining.remove(key);
                if let Some(downstream) = dependents.get(key) {
                    for dependent in downstream.clone() {
                        if let Some(degree) = in_degree.get_mut(&dependent) {
                            *degree = degree.saturating_sub(1);
                        }
                    }
                }
            }
            layers.push(layer);
        }

        Ok(TaskGraph {
            order,
            dependencies,
            dependents,
            layers,
        })
    }

    /// Layers in dependency order: every task's dependencies lie in a
    /// strictly earlier layer. Within a layer, declaration order.
    pub fn layers(&self) -> &[Vec<TaskKey>] {
        &self.layers
    }

    pub fn tasks(&self) -> &[TaskKey] {
        &self.order
    }

    pub fn dependencies_of(&self, key: &str) -> &[TaskKey] {
        self.dependencies.get(key).map_or(&[], |d| d.as_slice())
    }

    pub fn dependents_of(&self, key: &str) -> &[TaskKey] {
        self.dependents.get(key).map_or(&[], |d| d.as_slice())
    }
}
