//! Node reference resolution: turns a [`NodeReference`] into exactly one node
//! id given store access, the instance's task outputs, and (inside a compound
//! delta) the in-flight step outputs.

use std::collections::HashMap;

use graph::models::NodeId;
use graph::store::{GraphError, GraphStore};
use thiserror::Error;
use uuid::Uuid;

use crate::models::definition::TaskKey;
use crate::models::reference::NodeReference;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Graph node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("No completed task output named '{0}'")]
    TaskOutputMissing(TaskKey),
    #[error("Query for node type '{node_type}' matched {matched} nodes; exactly one required")]
    AmbiguousReference { node_type: String, matched: usize },
    #[error("Step output '{0}' is not available here")]
    StepOutputUnavailable(String),
    #[error(transparent)]
    Graph(GraphError),
}

/// Everything a reference resolution can draw on.
pub struct ResolveCtx<'a> {
    pub store: &'a dyn GraphStore,
    pub workflow_id: Uuid,
    pub root_node_id: Option<NodeId>,
    pub task_outputs: &'a HashMap<TaskKey, NodeId>,
    /// Present only while a compound delta is being applied.
    pub step_outputs: Option<&'a HashMap<String, NodeId>>,
}

impl<'a> ResolveCtx<'a> {
    /// The same context with the given in-flight step outputs.
    pub fn with_step_outputs<'b>(
        &self,
        step_outputs: &'b HashMap<String, NodeId>,
    ) -> ResolveCtx<'b>
    where
        'a: 'b,
    {
        ResolveCtx {
            store: self.store,
            workflow_id: self.workflow_id,
            root_node_id: self.root_node_id,
            task_outputs: self.task_outputs,
            step_outputs: Some(step_outputs),
        }
    }
}

/// Resolve a reference to exactly one node id. Empty or ambiguous resolution
/// is an error, never a silent miss.
pub async fn resolve(
    reference: &NodeReference,
    ctx: &ResolveCtx<'_>,
) -> Result<NodeId, ResolveError> {
    match reference {
        NodeReference::Id { node_id } => match ctx.store.get_node(*node_id).await {
            Ok(node) => Ok(node.id),
            Err(GraphError::NodeNotFound(id)) => Err(ResolveError::NodeNotFound(id)),
            Err(other) => Err(ResolveError::Graph(other)),
        },
        NodeReference::TaskOutput { task_id } => ctx
            .task_outputs
            .get(task_id)
            .copied()
            .ok_or_else(|| ResolveError::TaskOutputMissing(task_id.clone())),
        NodeReference::Query {
            node_type,
            filters,
            status,
        } => {
            let matched = ctx
                .store
                .query_nodes(ctx.workflow_id, node_type, filters, status.as_deref())
                .await
                .map_err(ResolveError::Graph)?;
            match matched.as_slice() {
                [single] => Ok(*single),
                _ => Err(ResolveError::AmbiguousReference {
                    node_type: node_type.clone(),
                    matched: matched.len(),
                }),
            }
        }
        NodeReference::StepOutput { step_key } => ctx
            .step_outputs
            .and_then(|outputs| outputs.get(step_key))
            .copied()
            .ok_or_else(|| ResolveError::StepOutputUnavailable(step_key.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::MemoryGraph;
    use serde_json::json;

    fn ctx<'a>(
        store: &'a MemoryGraph,
        workflow_id: Uuid,
        task_outputs: &'a HashMap<TaskKey, NodeId>,
    ) -> ResolveCtx<'a> {
        ResolveCtx {
            store,
            workflow_id,
            root_node_id: None,
            task_outputs,
            step_outputs: None,
        }
    }

    #[tokio::test]
    async fn literal_id_must_exist() {
        let store = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let outputs = HashMap::new();
        let ctx = ctx(&store, workflow_id, &outputs);

        let missing = Uuid::new_v4();
        let err = resolve(&NodeReference::Id { node_id: missing }, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::NodeNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn task_output_lookup_hits_the_outputs_map() {
        let store = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let node_id = Uuid::new_v4();
        let mut outputs = HashMap::new();
        outputs.insert("create_sample".to_string(), node_id);
        let ctx = ctx(&store, workflow_id, &outputs);

        let resolved = resolve(
            &NodeReference::TaskOutput {
                task_id: "create_sample".to_string(),
            },
            &ctx,
        )
        .await
        .unwrap();
        assert_eq!(resolved, node_id);

        let err = resolve(
            &NodeReference::TaskOutput {
                task_id: "other".to_string(),
            },
            &ctx,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ResolveError::TaskOutputMissing(_)));
    }

    #[tokio::test]
    async fn query_requires_exactly_one_match() {
        let store = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let outputs = HashMap::new();

        let reference = NodeReference::Query {
            node_type: "Sample".to_string(),
            filters: vec![],
            status: None,
        };

        // Zero matches is ambiguous too.
        let err = resolve(&reference, &ctx(&store, workflow_id, &outputs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AmbiguousReference { matched: 0, .. }
        ));

        let only = store
            .create_node(workflow_id, "Sample", HashMap::new(), None)
            .await
            .unwrap();
        let resolved = resolve(&reference, &ctx(&store, workflow_id, &outputs))
            .await
            .unwrap();
        assert_eq!(resolved, only);

        store
            .create_node(workflow_id, "Sample", HashMap::new(), None)
            .await
            .unwrap();
        let err = resolve(&reference, &ctx(&store, workflow_id, &outputs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AmbiguousReference { matched: 2, .. }
        ));
    }

    #[tokio::test]
    async fn query_filters_narrow_to_one() {
        let store = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let outputs = HashMap::new();

        let mut fields = HashMap::new();
        fields.insert("name".to_string(), json!("alpha"));
        let alpha = store
            .create_node(workflow_id, "Sample", fields, None)
            .await
            .unwrap();
        let mut fields = HashMap::new();
        fields.insert("name".to_string(), json!("beta"));
        store
            .create_node(workflow_id, "Sample", fields, None)
            .await
            .unwrap();

        let reference = NodeReference::Query {
            node_type: "Sample".to_string(),
            filters: vec![graph::models::NodeFilter {
                field_key: "name".to_string(),
                value: json!("alpha"),
            }],
            status: None,
        };
        let resolved = resolve(&reference, &ctx(&store, workflow_id, &outputs))
            .await
            .unwrap();
        assert_eq!(resolved, alpha);
    }

    #[tokio::test]
    async fn step_output_is_only_valid_inside_a_compound() {
        let store = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let outputs = HashMap::new();
        let base = ctx(&store, workflow_id, &outputs);

        let reference = NodeReference::StepOutput {
            step_key: "sample".to_string(),
        };
        let err = resolve(&reference, &base).await.unwrap_err();
        assert!(matches!(err, ResolveError::StepOutputUnavailable(_)));

        let node_id = Uuid::new_v4();
        let mut steps = HashMap::new();
        steps.insert("sample".to_string(), node_id);
        let resolved = resolve(&reference, &base.with_step_outputs(&steps))
            .await
            .unwrap();
        assert_eq!(resolved, node_id);
    }
}
