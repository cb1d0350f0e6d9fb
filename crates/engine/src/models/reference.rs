use graph::models::{NodeFilter, NodeId};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::definition::TaskKey;

/// Late-bound pointer to a graph node, resolved at evaluation time.
///
/// A reference must resolve to exactly one node; empty or ambiguous
/// resolution is an error, never silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "ref_type", rename_all = "snake_case")]
pub enum NodeReference {
    /// A literal node id.
    Id { node_id: NodeId },
    /// The node produced by a prior task that declared an `output_node_key`.
    TaskOutput { task_id: TaskKey },
    /// The single node of `node_type` matching every filter.
    Query {
        node_type: String,
        #[serde(default)]
        filters: Vec<NodeFilter>,
        status: Option<String>,
    },
    /// The node produced by an earlier step of the same compound delta.
    /// Only valid while a compound delta is being applied.
    StepOutput { step_key: String },
}
