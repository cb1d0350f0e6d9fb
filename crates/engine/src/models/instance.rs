use std::collections::HashMap;

use chrono::{DateTime, Utc};
use graph::models::NodeId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

use super::definition::{AssigneeType, TaskKey};

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("Task set instance not found: {0}")]
    InstanceNotFound(Uuid),
    #[error("Task '{0}' not found in instance")]
    TaskNotFound(TaskKey),
    #[error("Invalid transition for task '{task}': {from} -> {to}")]
    InvalidTransition {
        task: TaskKey,
        from: TaskInstanceStatus,
        to: TaskInstanceStatus,
    },
    #[error("Instance {id} is not active (status: {status})")]
    InstanceNotActive {
        id: Uuid,
        status: TaskSetInstanceStatus,
    },
    #[error("Invalid instance status transition: {from} -> {to}")]
    InvalidStatusTransition {
        from: TaskSetInstanceStatus,
        to: TaskSetInstanceStatus,
    },
    #[error("Definition expects a root node of type '{0}'")]
    RootNodeRequired(String),
    #[error("Root node {node_id} has type '{actual}', expected '{expected}'")]
    RootNodeTypeMismatch {
        node_id: NodeId,
        actual: String,
        expected: String,
    },
    #[error("Root node {node_id} belongs to a different workflow")]
    RootNodeWorkflowMismatch { node_id: NodeId },
}

/// Runtime status of one task instance.
///
/// `pending -> available -> in_progress -> completed`, with `skipped` as the
/// alternate terminal and `blocked` reserved for structurally broken
/// dependencies awaiting operator intervention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceStatus {
    Pending,
    Available,
    InProgress,
    Completed,
    Skipped,
    Blocked,
}

impl TaskInstanceStatus {
    /// Terminal states are never left again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskInstanceStatus::Completed | TaskInstanceStatus::Skipped)
    }

    /// Whether a dependency in this state counts as resolved for dependents.
    pub fn satisfies_dependency(&self) -> bool {
        self.is_terminal()
    }
}

impl std::fmt::Display for TaskInstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskInstanceStatus::Pending => write!(f, "pending"),
            TaskInstanceStatus::Available => write!(f, "available"),
            TaskInstanceStatus::InProgress => write!(f, "in_progress"),
            TaskInstanceStatus::Completed => write!(f, "completed"),
            TaskInstanceStatus::Skipped => write!(f, "skipped"),
            TaskInstanceStatus::Blocked => write!(f, "blocked"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskAssignment {
    pub assignee_type: AssigneeType,
    pub assignee_id: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub assigned_by: Option<String>,
}

/// Runtime record for one task within a task set instance.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskInstance {
    pub id: Uuid,
    pub task_set_instance_id: Uuid,
    pub task_definition_id: TaskKey,
    pub status: TaskInstanceStatus,
    pub assignment: Option<TaskAssignment>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Set on completion when the task's delta produced or targeted a node
    /// and the definition declared an `output_node_key`.
    pub output_node_id: Option<NodeId>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum TaskSetInstanceStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl TaskSetInstanceStatus {
    /// Valid management transitions. `Completed` is only reached through full
    /// completion during recompute, never by an external status write, and
    /// `completed`/`cancelled` are never left.
    pub fn can_transition_to(&self, next: &TaskSetInstanceStatus) -> bool {
        use TaskSetInstanceStatus::*;
        matches!(
            (self, next),
            (Active, Paused) | (Paused, Active) | (Active, Cancelled) | (Paused, Cancelled)
        )
    }
}

impl std::fmt::Display for TaskSetInstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskSetInstanceStatus::Active => write!(f, "active"),
            TaskSetInstanceStatus::Completed => write!(f, "completed"),
            TaskSetInstanceStatus::Paused => write!(f, "paused"),
            TaskSetInstanceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One running execution of a task set definition against a graph scope.
/// Owns its task instances exclusively; graph entities are only referenced
/// by id.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskSetInstance {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub task_set_definition_id: Uuid,
    pub definition_version: i64,
    /// None means the instance runs globally over the whole workflow graph.
    pub root_node_id: Option<NodeId>,
    pub status: TaskSetInstanceStatus,
    pub tasks: Vec<TaskInstance>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSetInstance {
    pub fn task(&self, key: &str) -> Option<&TaskInstance> {
        self.tasks.iter().find(|t| t.task_definition_id == key)
    }

    pub fn task_mut(&mut self, key: &str) -> Option<&mut TaskInstance> {
        self.tasks.iter_mut().find(|t| t.task_definition_id == key)
    }

    /// Outputs of completed tasks, keyed by task definition id. Input to
    /// `task_output` reference resolution.
    pub fn task_outputs(&self) -> HashMap<TaskKey, NodeId> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskInstanceStatus::Completed)
            .filter_map(|t| {
                t.output_node_id
                    .map(|node_id| (t.task_definition_id.clone(), node_id))
            })
            .collect()
    }

    pub fn completed_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskInstanceStatus::Completed)
            .count()
    }

    pub fn available_tasks(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskInstanceStatus::Available)
            .count()
    }
}

/// Instance snapshot with derived counters, the shape renderers consume.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskSetInstanceWithProgress {
    #[serde(flatten)]
    #[ts(flatten)]
    pub instance: TaskSetInstance,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub available_tasks: usize,
}

impl From<TaskSetInstance> for TaskSetInstanceWithProgress {
    fn from(instance: TaskSetInstance) -> Self {
        let total_tasks = instance.tasks.len();
        let completed_tasks = instance.completed_tasks();
        let available_tasks = instance.available_tasks();
        Self {
            instance,
            total_tasks,
            completed_tasks,
            available_tasks,
        }
    }
}

impl std::ops::Deref for TaskSetInstanceWithProgress {
    type Target = TaskSetInstance;
    fn deref(&self) -> &Self::Target {
        &self.instance
    }
}
