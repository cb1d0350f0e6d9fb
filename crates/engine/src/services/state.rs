//! Derived task status recomputation.
//!
//! Walks the dependency layers top-down after every state-changing event and
//! applies the pending-task transition rules. Explicit transitions
//! (start/complete/skip) live in the manager; only derived ones happen here.
//! Recomputation is idempotent: re-running it on an unchanged graph and
//! instance yields identical statuses.

use std::collections::HashMap;

use chrono::Utc;
use graph::store::GraphStore;
use tracing::{debug, warn};

use crate::models::definition::{TaskKey, TaskSetDefinition};
use crate::models::instance::{TaskInstanceStatus, TaskSetInstance, TaskSetInstanceStatus};
use crate::services::condition;
use crate::services::resolver::ResolveCtx;
use crate::services::task_graph::TaskGraph;

#[derive(Debug, Default)]
pub struct RecomputeOutcome {
    pub changed: bool,
    pub newly_available: Vec<TaskKey>,
    pub newly_skipped: Vec<TaskKey>,
    pub newly_blocked: Vec<TaskKey>,
    /// True when this pass moved the instance to `completed`.
    pub instance_completed: bool,
}

pub async fn recompute(
    instance: &mut TaskSetInstance,
    definition: &TaskSetDefinition,
    graph: &TaskGraph,
    store: &dyn GraphStore,
) -> RecomputeOutcome {
    let mut outcome = RecomputeOutcome::default();
    let task_outputs = instance.task_outputs();

    // Live status view so a transition in layer N is visible to layer N+1
    // within the same pass (a skip cascades immediately).
    let mut statuses: HashMap<TaskKey, TaskInstanceStatus> = instance
        .tasks
        .iter()
        .map(|t| (t.task_definition_id.clone(), t.status.clone()))
        .collect();

    for layer in graph.layers() {
        for key in layer {
            let Some(task_def) = definition.task(key) else {
                continue;
            };
            if statuses.get(key) != Some(&TaskInstanceStatus::Pending) {
                continue;
            }

            let mut missing_dependency = false;
            let mut all_satisfied = true;
            for dep in &task_def.depends_on {
                match statuses.get(dep) {
                    Some(status) if status.satisfies_dependency() => {}
                    Some(_) => all_satisfied = false,
                    None => missing_dependency = true,
                }
            }

            if missing_dependency {
                warn!(
                    instance_id = %instance.id,
                    task = %key,
                    "dependency has no task instance; holding task blocked"
                );
                set_status(instance, key, TaskInstanceStatus::Blocked, &mut statuses);
                outcome.newly_blocked.push(key.clone());
                outcome.changed = true;
                continue;
            }
            if !all_satisfied {
                continue;
            }

            let next = match &task_def.condition {
                None => TaskInstanceStatus::Available,
                Some(cond) => {
                    let ctx = ResolveCtx {
                        store,
                        workflow_id: instance.workflow_id,
                        root_node_id: instance.root_node_id,
                        task_outputs: &task_outputs,
                        step_outputs: None,
                    };
                    match condition::evaluate(cond, &ctx).await {
                        Ok(true) => TaskInstanceStatus::Available,
                        Ok(false) => TaskInstanceStatus::Skipped,
                        Err(err) => {
                            // Fail-safe policy: a broken condition skips the
                            // task rather than stalling the whole DAG.
                            warn!(
                                instance_id = %instance.id,
                                task = %key,
                                error = %err,
                                "condition evaluation failed; treating as false"
                            );
                            TaskInstanceStatus::Skipped
                        }
                    }
                }
            };

            match next {
                TaskInstanceStatus::Available => outcome.newly_available.push(key.clone()),
                TaskInstanceStatus::Skipped => outcome.newly_skipped.push(key.clone()),
                _ => {}
            }
            set_status(instance, key, next, &mut statuses);
            outcome.changed = true;
        }
    }

    let all_terminal = instance.tasks.iter().all(|t| t.status.is_terminal());
    if all_terminal
        && !instance.tasks.is_empty()
        && instance.status == TaskSetInstanceStatus::Active
    {
        instance.status = TaskSetInstanceStatus::Completed;
        outcome.instance_completed = true;
        outcome.changed = true;
        debug!(instance_id = %instance.id, "all tasks terminal; instance completed");
    }

    if outcome.changed {
        instance.updated_at = Utc::now();
    }
    outcome
}

fn set_status(
    instance: &mut TaskSetInstance,
    key: &str,
    next: TaskInstanceStatus,
    statuses: &mut HashMap<TaskKey, TaskInstanceStatus>,
) {
    if let Some(task) = instance.task_mut(key) {
        task.status = next.clone();
        statuses.insert(key.to_string(), next);
    }
}
