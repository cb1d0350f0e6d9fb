//! Delta application: the only place the engine mutates the graph store.
//!
//! Compound deltas execute their steps in declared order, threading a
//! step-output map forward. A failing step fails the whole delta with the
//! step identified; already-applied mutations are not rolled back here —
//! batch atomicity is the store's transaction boundary.

use std::collections::HashMap;

use graph::models::NodeId;
use graph::store::GraphError;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::models::delta::{AtomicDelta, DeltaSummary, TaskDelta};
use crate::services::resolver::{self, ResolveCtx, ResolveError};

#[derive(Debug, Error)]
pub enum DeltaError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("Status precondition failed for node {node_id}: expected one of {expected:?}, found {actual:?}")]
    PreconditionFailed {
        node_id: NodeId,
        expected: Vec<String>,
        actual: Option<String>,
    },
    #[error("No completion value supplied for field '{field_key}'")]
    MissingFieldValue { field_key: String },
    #[error("Compound step {step_index} ('{step_key}') failed: {source}")]
    StepFailed {
        step_index: usize,
        step_key: String,
        #[source]
        source: Box<DeltaError>,
    },
}

/// Result of applying one task delta.
#[derive(Debug)]
pub struct DeltaOutcome {
    pub summary: DeltaSummary,
    /// The node this delta produced or targeted: the created node for
    /// `create_node`, the resolved target for updates, the
    /// `output_step_key` step's node for compounds.
    pub output_node_id: Option<NodeId>,
}

/// Apply a task delta against the graph store and report concrete effect
/// counts. `completion_values` is the completion-time payload, merged over a
/// create delta's own `initial_values` and sourcing `update_node_field`
/// writes.
pub async fn apply(
    delta: &TaskDelta,
    ctx: &ResolveCtx<'_>,
    completion_values: Option<&HashMap<String, Value>>,
) -> Result<DeltaOutcome, DeltaError> {
    let mut summary = DeltaSummary::default();

    match delta {
        TaskDelta::Compound {
            steps,
            output_step_key,
        } => {
            let mut step_outputs: HashMap<String, NodeId> = HashMap::new();
            for (step_index, step) in steps.iter().enumerate() {
                let step_ctx = ctx.with_step_outputs(&step_outputs);
                match apply_atomic(&step.delta, &step_ctx, completion_values, &mut summary).await {
                    Ok(Some(node_id)) => {
                        step_outputs.insert(step.key.clone(), node_id);
                    }
                    Ok(None) => {}
                    Err(source) => {
                        return Err(DeltaError::StepFailed {
                            step_index,
                            step_key: step.key.clone(),
                            source: Box::new(source),
                        });
                    }
                }
            }
            let output_node_id = output_step_key
                .as_ref()
                .and_then(|key| step_outputs.get(key))
                .copied();
            Ok(DeltaOutcome {
                summary,
                output_node_id,
            })
        }
        TaskDelta::CreateNode { .. }
        | TaskDelta::UpdateNodeStatus { .. }
        | TaskDelta::UpdateNodeField { .. }
        | TaskDelta::CreateEdge { .. } => {
            // as_atomic is total for the non-compound variants.
            let Some(atomic) = delta.as_atomic() else {
                unreachable!("compound is handled above")
            };
            let output_node_id =
                apply_atomic(&atomic, ctx, completion_values, &mut summary).await?;
            Ok(DeltaOutcome {
                summary,
                output_node_id,
            })
        }
    }
}

async fn apply_atomic(
    delta: &AtomicDelta,
    ctx: &ResolveCtx<'_>,
    completion_values: Option<&HashMap<String, Value>>,
    summary: &mut DeltaSummary,
) -> Result<Option<NodeId>, DeltaError> {
    match delta {
        AtomicDelta::CreateNode {
            node_type,
            initial_values,
            initial_status,
        } => {
            let mut values = initial_values.clone().unwrap_or_default();
            if let Some(supplied) = completion_values {
                for (key, value) in supplied {
                    values.insert(key.clone(), value.clone());
                }
            }
            let node_id = ctx
                .store
                .create_node(ctx.workflow_id, node_type, values, initial_status.clone())
                .await?;
            summary.nodes_created += 1;
            Ok(Some(node_id))
        }
        AtomicDelta::UpdateNodeStatus {
            target_node,
            from_status,
            to_status,
        } => {
            let node_id = resolver::resolve(target_node, ctx).await?;
            if let Some(expected) = from_status {
                let actual = ctx.store.get_status(node_id).await?;
                let matches = actual.as_deref().is_some_and(|s| expected.contains(s));
                if !matches {
                    return Err(DeltaError::PreconditionFailed {
                        node_id,
                        expected: expected.to_vec(),
                        actual,
                    });
                }
            }
            ctx.store.set_status(node_id, to_status).await?;
            summary.nodes_updated += 1;
            Ok(Some(node_id))
        }
        AtomicDelta::UpdateNodeField {
            target_node,
            field_key,
            expected_value,
        } => {
            let node_id = resolver::resolve(target_node, ctx).await?;
            let value = completion_values
                .and_then(|supplied| supplied.get(field_key))
                .cloned()
                .ok_or_else(|| DeltaError::MissingFieldValue {
                    field_key: field_key.clone(),
                })?;
            // expected_value is advisory: a mismatch with the current value
            // is logged, not fatal.
            if let Some(expected) = expected_value {
                let node = ctx.store.get_node(node_id).await?;
                if node.field(field_key) != Some(expected) {
                    warn!(
                        node_id = %node_id,
                        field_key = %field_key,
                        "field value differs from the delta's expected value"
                    );
                }
            }
            ctx.store.set_field(node_id, field_key, value).await?;
            summary.nodes_updated += 1;
            Ok(Some(node_id))
        }
        AtomicDelta::CreateEdge {
            edge_type,
            from_node,
            to_node,
        } => {
            let from = resolver::resolve(from_node, ctx).await?;
            let to = resolver::resolve(to_node, ctx).await?;
            ctx.store
                .create_edge(ctx.workflow_id, edge_type, from, to)
                .await?;
            summary.edges_created += 1;
            Ok(None)
        }
    }
}
