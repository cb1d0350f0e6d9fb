use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::condition::TaskCondition;
use super::delta::TaskDelta;

/// Author-chosen task id, unique within one task set definition.
pub type TaskKey = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum AssigneeType {
    User,
    Agent,
    Unassigned,
}

impl Default for AssigneeType {
    fn default() -> Self {
        Self::Unassigned
    }
}

impl std::fmt::Display for AssigneeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssigneeType::User => write!(f, "user"),
            AssigneeType::Agent => write!(f, "agent"),
            AssigneeType::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// A single task template: the expected delta plus its dependency edges.
/// Static and immutable once its definition is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskDefinition {
    pub id: TaskKey,
    pub name: String,
    pub description: Option<String>,
    pub delta: TaskDelta,
    /// Ids of tasks that must reach a terminal state before this one unlocks.
    /// Must form a DAG within the definition.
    #[serde(default)]
    pub depends_on: Vec<TaskKey>,
    /// Evaluated once dependencies are satisfied; false means the task is
    /// skipped instead of made available.
    pub condition: Option<TaskCondition>,
    #[serde(default)]
    pub default_assignee_type: AssigneeType,
    /// Name under which this task's resulting node id is exposed to later
    /// tasks' `task_output` references.
    pub output_node_key: Option<String>,
}

/// Named, versioned collection of task definitions. Immutable after the first
/// instance is created; edits then produce a new version.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskSetDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    /// If set, every instance must be scoped to a root node of this type.
    pub root_node_type: Option<String>,
    pub tags: Vec<String>,
    pub tasks: Vec<TaskDefinition>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskSetDefinition {
    pub fn task(&self, key: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == key)
    }

    /// Tasks with no dependencies, in declaration order.
    pub fn entry_task_ids(&self) -> Vec<TaskKey> {
        self.tasks
            .iter()
            .filter(|t| t.depends_on.is_empty())
            .map(|t| t.id.clone())
            .collect()
    }

    /// Tasks no other task depends on, in declaration order.
    pub fn terminal_task_ids(&self) -> Vec<TaskKey> {
        self.tasks
            .iter()
            .filter(|t| !self.tasks.iter().any(|other| other.depends_on.contains(&t.id)))
            .map(|t| t.id.clone())
            .collect()
    }
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct CreateTaskSetDefinition {
    pub name: String,
    pub description: Option<String>,
    pub root_node_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tasks: Vec<TaskDefinition>,
    pub created_by: String,
}

#[derive(Debug, Deserialize, TS)]
#[ts(export)]
pub struct UpdateTaskSetDefinition {
    pub name: Option<String>,
    pub description: Option<String>,
    pub root_node_type: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tasks: Option<Vec<TaskDefinition>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::delta::TaskDelta;

    fn create_node_task(id: &str, depends_on: &[&str]) -> TaskDefinition {
        TaskDefinition {
            id: id.to_string(),
            name: id.to_string(),
            description: None,
            delta: TaskDelta::CreateNode {
                node_type: "Sample".to_string(),
                initial_values: None,
                initial_status: None,
            },
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            condition: None,
            default_assignee_type: AssigneeType::default(),
            output_node_key: None,
        }
    }

    #[test]
    fn entry_and_terminal_tasks_follow_declaration_order() {
        let definition = TaskSetDefinition {
            id: Uuid::new_v4(),
            name: "demo".to_string(),
            description: None,
            version: 1,
            root_node_type: None,
            tags: Vec::new(),
            tasks: vec![
                create_node_task("a", &[]),
                create_node_task("b", &["a"]),
                create_node_task("c", &["a"]),
                create_node_task("d", &[]),
            ],
            created_by: "tests".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(definition.entry_task_ids(), vec!["a", "d"]);
        assert_eq!(definition.terminal_task_ids(), vec!["b", "c", "d"]);
        assert!(definition.task("b").is_some());
        assert!(definition.task("missing").is_none());
    }
}
