//! Status lifecycle properties: idempotent recomputation, dependency
//! monotonicity, terminal stability, and pause/cancel gating.

mod common;

use common::{create_node_delta, definition, init_tracing, manager, task};
use engine::EngineError;
use engine::models::instance::{InstanceError, TaskInstanceStatus, TaskSetInstanceStatus};
use engine::services::manager::SkipTask;
use graph::MemoryGraph;
use uuid::Uuid;

fn statuses(
    snapshot: &engine::models::instance::TaskSetInstanceWithProgress,
) -> Vec<(String, TaskInstanceStatus)> {
    snapshot
        .tasks
        .iter()
        .map(|t| (t.task_definition_id.clone(), t.status.clone()))
        .collect()
}

#[tokio::test]
async fn refresh_is_idempotent() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine.definitions().publish(definition(vec![
        task("a", &[], create_node_delta("Sample")),
        task("b", &["a"], create_node_delta("Report")),
        task("c", &["a", "b"], create_node_delta("Review")),
    ]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    engine.complete_task(instance.id, "a", None).await?;
    let first = engine.refresh(instance.id).await?;
    let second = engine.refresh(instance.id).await?;
    assert_eq!(statuses(&first), statuses(&second));
    Ok(())
}

#[tokio::test]
async fn dependents_never_unlock_before_their_dependencies() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine.definitions().publish(definition(vec![
        task("a", &[], create_node_delta("Sample")),
        task("b", &["a"], create_node_delta("Report")),
    ]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    // Dependency available: dependent stays pending.
    let snapshot = engine.refresh(instance.id).await?;
    assert_eq!(
        snapshot.task("b").unwrap().status,
        TaskInstanceStatus::Pending
    );

    // Dependency in progress: still pending, and completing the dependent
    // directly is an invalid transition.
    engine.start_task(instance.id, "a", None).await?;
    let snapshot = engine.refresh(instance.id).await?;
    assert_eq!(
        snapshot.task("b").unwrap().status,
        TaskInstanceStatus::Pending
    );
    let err = engine.complete_task(instance.id, "b", None).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::InvalidTransition { .. })
    ));

    engine.complete_task(instance.id, "a", None).await?;
    let snapshot = engine.refresh(instance.id).await?;
    assert_eq!(
        snapshot.task("b").unwrap().status,
        TaskInstanceStatus::Available
    );
    Ok(())
}

#[tokio::test]
async fn terminal_tasks_never_change_again() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine.definitions().publish(definition(vec![
        task("a", &[], create_node_delta("Sample")),
        task("b", &[], create_node_delta("Report")),
        task("tail", &["a", "b"], create_node_delta("Review")),
    ]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    engine.complete_task(instance.id, "a", None).await?;
    engine
        .skip_task(instance.id, "b", SkipTask::default())
        .await?;

    // Completed and skipped are terminal: restart, re-skip and re-complete
    // all fail, and refresh leaves them alone.
    for key in ["a", "b"] {
        let err = engine.start_task(instance.id, key, None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Instance(InstanceError::InvalidTransition { .. })
        ));
        let err = engine
            .skip_task(instance.id, key, SkipTask { force: true, reason: None })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Instance(InstanceError::InvalidTransition { .. })
        ));
    }
    let snapshot = engine.refresh(instance.id).await?;
    assert_eq!(
        snapshot.task("a").unwrap().status,
        TaskInstanceStatus::Completed
    );
    assert_eq!(
        snapshot.task("b").unwrap().status,
        TaskInstanceStatus::Skipped
    );
    // A skipped dependency still satisfies its dependents.
    assert_eq!(
        snapshot.task("tail").unwrap().status,
        TaskInstanceStatus::Available
    );
    Ok(())
}

#[tokio::test]
async fn skipping_a_pending_task_requires_force() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine.definitions().publish(definition(vec![
        task("a", &[], create_node_delta("Sample")),
        task("b", &["a"], create_node_delta("Report")),
    ]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    let err = engine
        .skip_task(instance.id, "b", SkipTask::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::InvalidTransition { .. })
    ));

    let skipped = engine
        .skip_task(
            instance.id,
            "b",
            SkipTask {
                force: true,
                reason: Some("not needed for this run".to_string()),
            },
        )
        .await?;
    assert_eq!(skipped.status, TaskInstanceStatus::Skipped);
    assert_eq!(skipped.notes.as_deref(), Some("not needed for this run"));
    Ok(())
}

#[tokio::test]
async fn paused_and_cancelled_instances_reject_operations() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine.definitions().publish(definition(vec![
        task("a", &[], create_node_delta("Sample")),
        task("b", &["a"], create_node_delta("Report")),
    ]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    let paused = engine.pause(instance.id).await?;
    assert_eq!(paused.status, TaskSetInstanceStatus::Paused);

    for result in [
        engine.start_task(instance.id, "a", None).await.map(|_| ()),
        engine
            .complete_task(instance.id, "a", None)
            .await
            .map(|_| ()),
        engine
            .skip_task(instance.id, "a", SkipTask::default())
            .await
            .map(|_| ()),
        engine.refresh(instance.id).await.map(|_| ()),
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Instance(InstanceError::InstanceNotActive { .. })
        ));
    }

    // Pausing twice is an invalid status transition.
    let err = engine.pause(instance.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::InvalidStatusTransition { .. })
    ));

    let resumed = engine.resume(instance.id).await?;
    assert_eq!(resumed.status, TaskSetInstanceStatus::Active);
    engine.complete_task(instance.id, "a", None).await?;

    let cancelled = engine.cancel(instance.id).await?;
    assert_eq!(cancelled.status, TaskSetInstanceStatus::Cancelled);
    let err = engine.resume(instance.id).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::InvalidStatusTransition { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn tasks_may_complete_directly_from_available() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let def = engine
        .definitions()
        .publish(definition(vec![task("a", &[], create_node_delta("Sample"))]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;

    // Fire-and-forget: no explicit start.
    let completed = engine.complete_task(instance.id, "a", None).await?;
    assert_eq!(completed.task.status, TaskInstanceStatus::Completed);
    assert!(completed.task.started_at.is_some());
    assert!(completed.instance_completed);
    Ok(())
}

#[tokio::test]
async fn unknown_instances_and_tasks_are_typed_errors() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_id = Uuid::new_v4();

    let err = engine.refresh(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::InstanceNotFound(_))
    ));

    let def = engine
        .definitions()
        .publish(definition(vec![task("a", &[], create_node_delta("Sample"))]))?;
    let instance = engine.create_instance(def.id, workflow_id, None).await?;
    let err = engine
        .start_task(instance.id, "ghost", None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Instance(InstanceError::TaskNotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn instances_list_by_workflow_scope() -> anyhow::Result<()> {
    init_tracing();
    let store = MemoryGraph::new();
    let engine = manager(&store);
    let workflow_a = Uuid::new_v4();
    let workflow_b = Uuid::new_v4();

    let def = engine
        .definitions()
        .publish(definition(vec![task("a", &[], create_node_delta("Sample"))]))?;
    engine.create_instance(def.id, workflow_a, None).await?;
    engine.create_instance(def.id, workflow_a, None).await?;
    engine.create_instance(def.id, workflow_b, None).await?;

    assert_eq!(engine.list_instances(None).await.len(), 3);
    assert_eq!(engine.list_instances(Some(workflow_a)).await.len(), 2);
    assert_eq!(engine.list_instances(Some(workflow_b)).await.len(), 1);
    Ok(())
}
