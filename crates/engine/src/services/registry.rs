//! Authoring-time registry of task set definitions.
//!
//! Publishing validates the dependency DAG and every delta, so a definition
//! that would fail at runtime is unregisterable. A definition becomes
//! immutable once instantiated: later edits produce a new version, while
//! running instances keep the version they were created from.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::condition::TaskCondition;
use crate::models::definition::{
    CreateTaskSetDefinition, TaskDefinition, TaskKey, TaskSetDefinition, UpdateTaskSetDefinition,
};
use crate::models::delta::TaskDelta;
use crate::models::reference::NodeReference;
use crate::services::task_graph::TaskGraph;

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("Task set definition not found: {0}")]
    NotFound(Uuid),
    #[error("Task set definition has no tasks")]
    Empty,
    #[error("Task '{task}': {reason}")]
    InvalidDelta { task: TaskKey, reason: String },
}

/// A validated definition plus its prebuilt structural graph.
pub struct PublishedDefinition {
    pub definition: Arc<TaskSetDefinition>,
    pub graph: Arc<TaskGraph>,
    instantiated: AtomicBool,
}

impl PublishedDefinition {
    pub fn is_instantiated(&self) -> bool {
        self.instantiated.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_instantiated(&self) {
        self.instantiated.store(true, Ordering::Relaxed);
    }
}

#[derive(Clone, Default)]
pub struct DefinitionRegistry {
    definitions: Arc<DashMap<Uuid, Arc<PublishedDefinition>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a new definition at version 1.
    pub fn publish(
        &self,
        data: CreateTaskSetDefinition,
    ) -> Result<Arc<TaskSetDefinition>, EngineError> {
        let now = Utc::now();
        let definition = TaskSetDefinition {
            id: Uuid::new_v4(),
            name: data.name,
            description: data.description,
            version: 1,
            root_node_type: data.root_node_type,
            tags: data.tags.unwrap_or_default(),
            tasks: data.tasks,
            created_by: data.created_by,
            created_at: now,
            updated_at: now,
        };
        let published = Arc::new(validate(definition)?);
        let handle = published.definition.clone();
        info!(
            definition_id = %handle.id,
            name = %handle.name,
            tasks = handle.tasks.len(),
            "task set definition published"
        );
        self.definitions.insert(handle.id, published);
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<PublishedDefinition>, DefinitionError> {
        self.definitions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(DefinitionError::NotFound(id))
    }

    pub fn list(&self) -> Vec<Arc<TaskSetDefinition>> {
        self.definitions
            .iter()
            .map(|entry| entry.value().definition.clone())
            .collect()
    }

    /// Apply edits. An instantiated definition is immutable: the edit lands
    /// as `version + 1`, replacing the registry entry while running
    /// instances keep the version they pinned at creation.
    pub fn update(
        &self,
        id: Uuid,
        data: UpdateTaskSetDefinition,
    ) -> Result<Arc<TaskSetDefinition>, EngineError> {
        let published = self.get(id)?;
        let mut definition = (*published.definition).clone();

        if let Some(name) = data.name {
            definition.name = name;
        }
        if let Some(description) = data.description {
            definition.description = Some(description);
        }
        if let Some(root_node_type) = data.root_node_type {
            definition.root_node_type = Some(root_node_type);
        }
        if let Some(tags) = data.tags {
            definition.tags = tags;
        }
        if let Some(tasks) = data.tasks {
            definition.tasks = tasks;
        }
        if published.is_instantiated() {
            definition.version += 1;
        }
        definition.updated_at = Utc::now();

        let published = Arc::new(validate(definition)?);
        let handle = published.definition.clone();
        info!(
            definition_id = %handle.id,
            version = handle.version,
            "task set definition updated"
        );
        self.definitions.insert(id, published);
        Ok(handle)
    }

    /// Dependency layering for DAG renderers.
    pub fn layers(&self, id: Uuid) -> Result<Vec<Vec<TaskKey>>, DefinitionError> {
        let published = self.get(id)?;
        Ok(published.graph.layers().to_vec())
    }
}

fn validate(definition: TaskSetDefinition) -> Result<PublishedDefinition, EngineError> {
    if definition.tasks.is_empty() {
        return Err(DefinitionError::Empty.into());
    }
    let graph = TaskGraph::build(&definition.tasks)?;
    for task in &definition.tasks {
        validate_task(task)?;
    }
    Ok(PublishedDefinition {
        definition: Arc::new(definition),
        graph: Arc::new(graph),
        instantiated: AtomicBool::new(false),
    })
}

fn validate_task(task: &TaskDefinition) -> Result<(), DefinitionError> {
    let invalid = |reason: String| DefinitionError::InvalidDelta {
        task: task.id.clone(),
        reason,
    };

    match &task.delta {
        TaskDelta::Compound {
            steps,
            output_step_key,
        } => {
            if steps.is_empty() {
                return Err(invalid("compound delta has no steps".to_string()));
            }
            let mut seen: Vec<&str> = Vec::new();
            for step in steps {
                if seen.contains(&step.key.as_str()) {
                    return Err(invalid(format!("duplicate step key '{}'", step.key)));
                }
                // Step outputs may only point at earlier steps: threading is
                // a strictly-ordered accumulation, never a general graph.
                for reference in step.delta.references() {
                    if let NodeReference::StepOutput { step_key } = reference {
                        if !seen.contains(&step_key.as_str()) {
                            return Err(invalid(format!(
                                "step '{}' references step output '{}' which is not an earlier step",
                                step.key, step_key
                            )));
                        }
                    }
                }
                seen.push(&step.key);
            }
            if let Some(output_key) = output_step_key {
                if !seen.contains(&output_key.as_str()) {
                    return Err(invalid(format!(
                        "output step key '{output_key}' names no step"
                    )));
                }
            }
        }
        atomic => {
            if let Some(atomic) = atomic.as_atomic() {
                for reference in atomic.references() {
                    if matches!(reference, NodeReference::StepOutput { .. }) {
                        return Err(invalid(
                            "step output reference outside a compound delta".to_string(),
                        ));
                    }
                }
            }
        }
    }

    if let Some(condition) = &task.condition {
        if condition
            .references()
            .iter()
            .any(|r| matches!(r, NodeReference::StepOutput { .. }))
        {
            return Err(invalid(
                "condition may not reference step outputs".to_string(),
            ));
        }
        if matches!(condition, TaskCondition::Expression { expression } if expression.trim().is_empty())
        {
            return Err(invalid("empty condition expression".to_string()));
        }
    }

    Ok(())
}
