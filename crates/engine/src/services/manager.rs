//! TaskSet instance manager.
//!
//! Orchestrates running instantiations of task set definitions against a
//! graph scope. Every mutating operation on an instance holds that
//! instance's lock for its full duration, so concurrent completions of
//! sibling tasks cannot race on the recompute pass or on the applier's reads.
//! Different instances proceed fully in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use graph::models::NodeId;
use graph::store::GraphStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::EngineError;
use crate::models::definition::{AssigneeType, TaskKey};
use crate::models::delta::DeltaSummary;
use crate::models::instance::{
    InstanceError, TaskAssignment, TaskInstance, TaskInstanceStatus, TaskSetInstance,
    TaskSetInstanceStatus, TaskSetInstanceWithProgress,
};
use crate::services::applier;
use crate::services::registry::{DefinitionRegistry, PublishedDefinition};
use crate::services::resolver::ResolveCtx;
use crate::services::state;

/// Assignment details for an explicit task start.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(export)]
pub struct StartTask {
    pub assignee_type: Option<AssigneeType>,
    pub assignee_id: Option<String>,
    pub assigned_by: Option<String>,
}

/// Operator skip override. `force` also skips a task that is still pending.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(export)]
pub struct SkipTask {
    #[serde(default)]
    pub force: bool,
    pub reason: Option<String>,
}

/// What a successful completion did.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct CompleteTaskOutcome {
    pub task: TaskInstance,
    pub summary: DeltaSummary,
    pub newly_available: Vec<TaskKey>,
    pub instance_completed: bool,
}

/// An instance plus the definition version it pinned at creation.
struct InstanceSlot {
    instance: TaskSetInstance,
    published: Arc<PublishedDefinition>,
}

#[derive(Clone)]
pub struct TaskSetManager {
    store: Arc<dyn GraphStore>,
    definitions: DefinitionRegistry,
    instances: Arc<DashMap<Uuid, Arc<Mutex<InstanceSlot>>>>,
}

impl TaskSetManager {
    pub fn new(store: Arc<dyn GraphStore>, definitions: DefinitionRegistry) -> Self {
        Self {
            store,
            definitions,
            instances: Arc::new(DashMap::new()),
        }
    }

    pub fn definitions(&self) -> &DefinitionRegistry {
        &self.definitions
    }

    /// Instantiate a definition against a scope. Validates the root node
    /// against the definition's `root_node_type`, creates every task
    /// instance as pending, and runs the initial recompute before returning.
    pub async fn create_instance(
        &self,
        definition_id: Uuid,
        workflow_id: Uuid,
        root_node_id: Option<NodeId>,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        let published = self.definitions.get(definition_id)?;
        let definition = published.definition.clone();

        if let Some(expected_type) = &definition.root_node_type {
            let root = root_node_id
                .ok_or_else(|| InstanceError::RootNodeRequired(expected_type.clone()))?;
            let node = self.store.get_node(root).await?;
            if node.workflow_id != workflow_id {
                return Err(InstanceError::RootNodeWorkflowMismatch { node_id: root }.into());
            }
            if node.node_type != *expected_type {
                return Err(InstanceError::RootNodeTypeMismatch {
                    node_id: root,
                    actual: node.node_type,
                    expected: expected_type.clone(),
                }
                .into());
            }
        } else if let Some(root) = root_node_id {
            let node = self.store.get_node(root).await?;
            if node.workflow_id != workflow_id {
                return Err(InstanceError::RootNodeWorkflowMismatch { node_id: root }.into());
            }
        }

        let now = Utc::now();
        let instance_id = Uuid::new_v4();
        let tasks = definition
            .tasks
            .iter()
            .map(|task_def| TaskInstance {
                id: Uuid::new_v4(),
                task_set_instance_id: instance_id,
                task_definition_id: task_def.id.clone(),
                status: TaskInstanceStatus::Pending,
                assignment: None,
                started_at: None,
                completed_at: None,
                output_node_id: None,
                notes: None,
            })
            .collect();
        let mut instance = TaskSetInstance {
            id: instance_id,
            workflow_id,
            task_set_definition_id: definition.id,
            definition_version: definition.version,
            root_node_id,
            status: TaskSetInstanceStatus::Active,
            tasks,
            created_at: now,
            updated_at: now,
        };

        state::recompute(&mut instance, &definition, &published.graph, self.store.as_ref()).await;
        published.mark_instantiated();
        info!(
            instance_id = %instance_id,
            definition_id = %definition.id,
            version = definition.version,
            "task set instance created"
        );

        let snapshot = TaskSetInstanceWithProgress::from(instance.clone());
        self.instances.insert(
            instance_id,
            Arc::new(Mutex::new(InstanceSlot {
                instance,
                published,
            })),
        );
        Ok(snapshot)
    }

    /// Explicitly start an available task, recording the assignment.
    pub async fn start_task(
        &self,
        instance_id: Uuid,
        task_key: &str,
        request: Option<StartTask>,
    ) -> Result<TaskInstance, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let mut guard = slot_arc.lock().await;
        let slot = &mut *guard;
        ensure_active(&slot.instance)?;

        let definition = slot.published.definition.clone();
        let task_def = definition
            .task(task_key)
            .ok_or_else(|| InstanceError::TaskNotFound(task_key.to_string()))?;
        let current = self.task_status(&slot.instance, task_key)?;
        if current != TaskInstanceStatus::Available {
            return Err(InstanceError::InvalidTransition {
                task: task_key.to_string(),
                from: current,
                to: TaskInstanceStatus::InProgress,
            }
            .into());
        }

        let request = request.unwrap_or_default();
        let now = Utc::now();
        if let Some(task) = slot.instance.task_mut(task_key) {
            task.status = TaskInstanceStatus::InProgress;
            task.started_at = Some(now);
            task.assignment = Some(TaskAssignment {
                assignee_type: request
                    .assignee_type
                    .unwrap_or_else(|| task_def.default_assignee_type.clone()),
                assignee_id: request.assignee_id,
                assigned_at: now,
                assigned_by: request.assigned_by,
            });
        }
        slot.instance.updated_at = now;
        info!(instance_id = %instance_id, task = %task_key, "task started");

        self.task_snapshot(&slot.instance, task_key)
    }

    /// Complete a task: apply its delta, then recompute the whole instance.
    ///
    /// Direct completion from `available` is allowed (fire-and-forget tasks
    /// without an explicit start) as well as from `in_progress`. On applier
    /// failure the task keeps its current status and the error surfaces to
    /// the caller.
    pub async fn complete_task(
        &self,
        instance_id: Uuid,
        task_key: &str,
        completion_values: Option<HashMap<String, Value>>,
    ) -> Result<CompleteTaskOutcome, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let mut guard = slot_arc.lock().await;
        let slot = &mut *guard;
        ensure_active(&slot.instance)?;

        let published = slot.published.clone();
        let definition = published.definition.clone();
        let task_def = definition
            .task(task_key)
            .ok_or_else(|| InstanceError::TaskNotFound(task_key.to_string()))?;
        let current = self.task_status(&slot.instance, task_key)?;
        if !matches!(
            current,
            TaskInstanceStatus::Available | TaskInstanceStatus::InProgress
        ) {
            return Err(InstanceError::InvalidTransition {
                task: task_key.to_string(),
                from: current,
                to: TaskInstanceStatus::Completed,
            }
            .into());
        }

        let task_outputs = slot.instance.task_outputs();
        let ctx = ResolveCtx {
            store: self.store.as_ref(),
            workflow_id: slot.instance.workflow_id,
            root_node_id: slot.instance.root_node_id,
            task_outputs: &task_outputs,
            step_outputs: None,
        };
        let applied = applier::apply(&task_def.delta, &ctx, completion_values.as_ref()).await?;

        let now = Utc::now();
        if let Some(task) = slot.instance.task_mut(task_key) {
            task.status = TaskInstanceStatus::Completed;
            task.completed_at = Some(now);
            if task.started_at.is_none() {
                task.started_at = Some(now);
            }
            if task_def.output_node_key.is_some() {
                task.output_node_id = applied.output_node_id;
            }
        }
        slot.instance.updated_at = now;
        info!(
            instance_id = %instance_id,
            task = %task_key,
            nodes_created = applied.summary.nodes_created,
            nodes_updated = applied.summary.nodes_updated,
            edges_created = applied.summary.edges_created,
            "task completed"
        );

        let recomputed = state::recompute(
            &mut slot.instance,
            &definition,
            &published.graph,
            self.store.as_ref(),
        )
        .await;

        let task = slot
            .instance
            .task(task_key)
            .cloned()
            .ok_or_else(|| InstanceError::TaskNotFound(task_key.to_string()))?;
        Ok(CompleteTaskOutcome {
            task,
            summary: applied.summary,
            newly_available: recomputed.newly_available,
            instance_completed: recomputed.instance_completed,
        })
    }

    /// Operator skip override.
    pub async fn skip_task(
        &self,
        instance_id: Uuid,
        task_key: &str,
        request: SkipTask,
    ) -> Result<TaskInstance, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let mut guard = slot_arc.lock().await;
        let slot = &mut *guard;
        ensure_active(&slot.instance)?;

        let current = self.task_status(&slot.instance, task_key)?;
        let allowed = matches!(
            current,
            TaskInstanceStatus::Available | TaskInstanceStatus::InProgress
        ) || (current == TaskInstanceStatus::Pending && request.force);
        if !allowed {
            return Err(InstanceError::InvalidTransition {
                task: task_key.to_string(),
                from: current,
                to: TaskInstanceStatus::Skipped,
            }
            .into());
        }

        let now = Utc::now();
        if let Some(task) = slot.instance.task_mut(task_key) {
            task.status = TaskInstanceStatus::Skipped;
            if request.reason.is_some() {
                task.notes = request.reason.clone();
            }
        }
        slot.instance.updated_at = now;
        info!(instance_id = %instance_id, task = %task_key, forced = request.force, "task skipped");

        let published = slot.published.clone();
        state::recompute(
            &mut slot.instance,
            &published.definition,
            &published.graph,
            self.store.as_ref(),
        )
        .await;

        self.task_snapshot(&slot.instance, task_key)
    }

    /// Re-evaluate every condition and dependency edge against current graph
    /// state, without any explicit task action. Safe to call at any time;
    /// purely recomputation.
    pub async fn refresh(
        &self,
        instance_id: Uuid,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let mut guard = slot_arc.lock().await;
        let slot = &mut *guard;
        ensure_active(&slot.instance)?;

        let published = slot.published.clone();
        state::recompute(
            &mut slot.instance,
            &published.definition,
            &published.graph,
            self.store.as_ref(),
        )
        .await;
        Ok(TaskSetInstanceWithProgress::from(slot.instance.clone()))
    }

    /// Freeze status recomputation until resumed.
    pub async fn pause(
        &self,
        instance_id: Uuid,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        self.transition_instance(instance_id, TaskSetInstanceStatus::Paused, false)
            .await
    }

    /// Reactivate a paused instance; recomputes immediately since the graph
    /// may have changed while frozen.
    pub async fn resume(
        &self,
        instance_id: Uuid,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        self.transition_instance(instance_id, TaskSetInstanceStatus::Active, true)
            .await
    }

    /// Cancel an instance. Prevents new operations; an operation already in
    /// flight is never interrupted.
    pub async fn cancel(
        &self,
        instance_id: Uuid,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        self.transition_instance(instance_id, TaskSetInstanceStatus::Cancelled, false)
            .await
    }

    pub async fn get_instance(
        &self,
        instance_id: Uuid,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let guard = slot_arc.lock().await;
        Ok(TaskSetInstanceWithProgress::from(guard.instance.clone()))
    }

    pub async fn list_instances(
        &self,
        workflow_id: Option<Uuid>,
    ) -> Vec<TaskSetInstanceWithProgress> {
        let slots: Vec<Arc<Mutex<InstanceSlot>>> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut snapshots = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot.lock().await;
            if workflow_id.is_none_or(|w| guard.instance.workflow_id == w) {
                snapshots.push(TaskSetInstanceWithProgress::from(guard.instance.clone()));
            }
        }
        snapshots
    }

    async fn transition_instance(
        &self,
        instance_id: Uuid,
        next: TaskSetInstanceStatus,
        recompute: bool,
    ) -> Result<TaskSetInstanceWithProgress, EngineError> {
        let slot_arc = self.slot(instance_id)?;
        let mut guard = slot_arc.lock().await;
        let slot = &mut *guard;

        if !slot.instance.status.can_transition_to(&next) {
            return Err(InstanceError::InvalidStatusTransition {
                from: slot.instance.status.clone(),
                to: next,
            }
            .into());
        }
        info!(
            instance_id = %instance_id,
            from = %slot.instance.status,
            to = %next,
            "instance status transition"
        );
        slot.instance.status = next;
        slot.instance.updated_at = Utc::now();

        if recompute {
            let published = slot.published.clone();
            state::recompute(
                &mut slot.instance,
                &published.definition,
                &published.graph,
                self.store.as_ref(),
            )
            .await;
        }
        Ok(TaskSetInstanceWithProgress::from(slot.instance.clone()))
    }

    fn slot(&self, instance_id: Uuid) -> Result<Arc<Mutex<InstanceSlot>>, InstanceError> {
        self.instances
            .get(&instance_id)
            .map(|entry| entry.value().clone())
            .ok_or(InstanceError::InstanceNotFound(instance_id))
    }

    fn task_status(
        &self,
        instance: &TaskSetInstance,
        task_key: &str,
    ) -> Result<TaskInstanceStatus, InstanceError> {
        instance
            .task(task_key)
            .map(|t| t.status.clone())
            .ok_or_else(|| InstanceError::TaskNotFound(task_key.to_string()))
    }

    fn task_snapshot(
        &self,
        instance: &TaskSetInstance,
        task_key: &str,
    ) -> Result<TaskInstance, EngineError> {
        instance
            .task(task_key)
            .cloned()
            .ok_or_else(|| InstanceError::TaskNotFound(task_key.to_string()).into())
    }
}

fn ensure_active(instance: &TaskSetInstance) -> Result<(), InstanceError> {
    if instance.status == TaskSetInstanceStatus::Active {
        Ok(())
    } else {
        Err(InstanceError::InstanceNotActive {
            id: instance.id,
            status: instance.status.clone(),
        })
    }
}
