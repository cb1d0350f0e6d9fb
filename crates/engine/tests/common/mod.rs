use std::sync::Arc;

use engine::models::condition::TaskCondition;
use engine::models::definition::{AssigneeType, CreateTaskSetDefinition, TaskDefinition};
use engine::models::delta::TaskDelta;
use engine::services::manager::TaskSetManager;
use engine::services::registry::DefinitionRegistry;
use graph::MemoryGraph;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("engine=debug,graph=debug")
        .with_test_writer()
        .try_init();
}

pub fn manager(store: &MemoryGraph) -> TaskSetManager {
    TaskSetManager::new(Arc::new(store.clone()), DefinitionRegistry::new())
}

pub fn definition(tasks: Vec<TaskDefinition>) -> CreateTaskSetDefinition {
    CreateTaskSetDefinition {
        name: "test set".to_string(),
        description: None,
        root_node_type: None,
        tags: None,
        tasks,
        created_by: "tests".to_string(),
    }
}

pub fn task(id: &str, depends_on: &[&str], delta: TaskDelta) -> TaskDefinition {
    TaskDefinition {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        delta,
        depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
        condition: None,
        default_assignee_type: AssigneeType::default(),
        output_node_key: None,
    }
}

pub fn conditional_task(
    id: &str,
    depends_on: &[&str],
    delta: TaskDelta,
    condition: TaskCondition,
) -> TaskDefinition {
    TaskDefinition {
        condition: Some(condition),
        ..task(id, depends_on, delta)
    }
}

pub fn create_node_delta(node_type: &str) -> TaskDelta {
    TaskDelta::CreateNode {
        node_type: node_type.to_string(),
        initial_values: None,
        initial_status: None,
    }
}
