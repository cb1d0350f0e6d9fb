use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::reference::NodeReference;

/// One or many acceptable status values, matching the
/// `from_status: string | string[]` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
pub enum StatusSet {
    One(String),
    Many(Vec<String>),
}

impl StatusSet {
    pub fn contains(&self, status: &str) -> bool {
        match self {
            StatusSet::One(s) => s == status,
            StatusSet::Many(set) => set.iter().any(|s| s == status),
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StatusSet::One(s) => vec![s.clone()],
            StatusSet::Many(set) => set.clone(),
        }
    }
}

/// An expected mutation of the property graph, the unit a task represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "delta_type", rename_all = "snake_case")]
pub enum TaskDelta {
    CreateNode {
        node_type: String,
        #[serde(default)]
        #[ts(type = "Record<string, unknown> | null")]
        initial_values: Option<HashMap<String, Value>>,
        initial_status: Option<String>,
    },
    UpdateNodeStatus {
        target_node: NodeReference,
        from_status: Option<StatusSet>,
        to_status: String,
    },
    UpdateNodeField {
        target_node: NodeReference,
        field_key: String,
        #[ts(type = "unknown")]
        expected_value: Option<Value>,
    },
    CreateEdge {
        edge_type: String,
        from_node: NodeReference,
        to_node: NodeReference,
    },
    /// An ordered bundle of atomic deltas applied as one logical unit.
    /// `output_step_key` designates which step's resulting node becomes the
    /// compound's own output.
    Compound {
        steps: Vec<CompoundStep>,
        output_step_key: Option<String>,
    },
}

impl TaskDelta {
    /// The atomic form of this delta, if it is not a compound.
    pub fn as_atomic(&self) -> Option<AtomicDelta> {
        match self {
            TaskDelta::CreateNode {
                node_type,
                initial_values,
                initial_status,
            } => Some(AtomicDelta::CreateNode {
                node_type: node_type.clone(),
                initial_values: initial_values.clone(),
                initial_status: initial_status.clone(),
            }),
            TaskDelta::UpdateNodeStatus {
                target_node,
                from_status,
                to_status,
            } => Some(AtomicDelta::UpdateNodeStatus {
                target_node: target_node.clone(),
                from_status: from_status.clone(),
                to_status: to_status.clone(),
            }),
            TaskDelta::UpdateNodeField {
                target_node,
                field_key,
                expected_value,
            } => Some(AtomicDelta::UpdateNodeField {
                target_node: target_node.clone(),
                field_key: field_key.clone(),
                expected_value: expected_value.clone(),
            }),
            TaskDelta::CreateEdge {
                edge_type,
                from_node,
                to_node,
            } => Some(AtomicDelta::CreateEdge {
                edge_type: edge_type.clone(),
                from_node: from_node.clone(),
                to_node: to_node.clone(),
            }),
            TaskDelta::Compound { .. } => None,
        }
    }
}

/// The non-compound delta forms. Keeping compounds out of this type makes
/// nested compounds unrepresentable: step threading is a strictly-ordered
/// accumulation, never a general graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "delta_type", rename_all = "snake_case")]
pub enum AtomicDelta {
    CreateNode {
        node_type: String,
        #[serde(default)]
        #[ts(type = "Record<string, unknown> | null")]
        initial_values: Option<HashMap<String, Value>>,
        initial_status: Option<String>,
    },
    UpdateNodeStatus {
        target_node: NodeReference,
        from_status: Option<StatusSet>,
        to_status: String,
    },
    UpdateNodeField {
        target_node: NodeReference,
        field_key: String,
        #[ts(type = "unknown")]
        expected_value: Option<Value>,
    },
    CreateEdge {
        edge_type: String,
        from_node: NodeReference,
        to_node: NodeReference,
    },
}

impl AtomicDelta {
    /// Every node reference this delta resolves when applied.
    pub fn references(&self) -> Vec<&NodeReference> {
        match self {
            AtomicDelta::CreateNode { .. } => Vec::new(),
            AtomicDelta::UpdateNodeStatus { target_node, .. }
            | AtomicDelta::UpdateNodeField { target_node, .. } => vec![target_node],
            AtomicDelta::CreateEdge {
                from_node, to_node, ..
            } => vec![from_node, to_node],
        }
    }
}

/// One step of a compound delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompoundStep {
    pub key: String,
    pub label: Option<String>,
    pub delta: AtomicDelta,
}

/// Concrete effect counts reported after a delta is applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeltaSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    pub edges_created: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delta_round_trips_through_tagged_json() {
        let raw = json!({
            "delta_type": "update_node_status",
            "target_node": { "ref_type": "task_output", "task_id": "create_sample" },
            "from_status": ["Draft", "Review"],
            "to_status": "Active"
        });
        let delta: TaskDelta = serde_json::from_value(raw).unwrap();
        match &delta {
            TaskDelta::UpdateNodeStatus { from_status, .. } => {
                let from = from_status.as_ref().unwrap();
                assert!(from.contains("Draft"));
                assert!(!from.contains("Active"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn status_set_accepts_single_string() {
        let set: StatusSet = serde_json::from_value(json!("Draft")).unwrap();
        assert!(set.contains("Draft"));
        assert_eq!(set.to_vec(), vec!["Draft".to_string()]);
    }

    #[test]
    fn compound_steps_deserialize_with_atomic_deltas() {
        let raw = json!({
            "delta_type": "compound",
            "steps": [
                { "key": "sample", "label": null, "delta": { "delta_type": "create_node", "node_type": "Sample", "initial_status": "Draft" } },
                { "key": "link", "label": "Link to batch", "delta": {
                    "delta_type": "create_edge",
                    "edge_type": "belongs_to",
                    "from_node": { "ref_type": "step_output", "step_key": "sample" },
                    "to_node": { "ref_type": "query", "node_type": "Batch", "filters": [], "status": null }
                } }
            ],
            "output_step_key": "sample"
        });
        let delta: TaskDelta = serde_json::from_value(raw).unwrap();
        let TaskDelta::Compound {
            steps,
            output_step_key,
        } = &delta
        else {
            panic!("expected compound");
        };
        assert_eq!(steps.len(), 2);
        assert_eq!(output_step_key.as_deref(), Some("sample"));
        assert!(delta.as_atomic().is_none());
    }
}
