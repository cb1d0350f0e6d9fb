use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use super::reference::NodeReference;

/// Comparison operator for `field_value` conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    IsSet,
    IsNotSet,
}

impl std::fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConditionOperator::Eq => write!(f, "eq"),
            ConditionOperator::Neq => write!(f, "neq"),
            ConditionOperator::Gt => write!(f, "gt"),
            ConditionOperator::Gte => write!(f, "gte"),
            ConditionOperator::Lt => write!(f, "lt"),
            ConditionOperator::Lte => write!(f, "lte"),
            ConditionOperator::Contains => write!(f, "contains"),
            ConditionOperator::IsSet => write!(f, "is_set"),
            ConditionOperator::IsNotSet => write!(f, "is_not_set"),
        }
    }
}

/// Predicate over current graph state, evaluated once a task's dependencies
/// are satisfied. Conditions are pure reads; they never mutate the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum TaskCondition {
    /// The referenced node's status is one of the expected values.
    NodeStatus {
        node: NodeReference,
        expected: Vec<String>,
    },
    /// A field on the referenced node compares true under the operator.
    FieldValue {
        node: NodeReference,
        field_key: String,
        operator: ConditionOperator,
        #[serde(default)]
        #[ts(type = "unknown")]
        value: Option<Value>,
    },
    /// An edge of the given type exists between two resolved nodes.
    EdgeExists {
        edge_type: String,
        from_node: NodeReference,
        to_node: NodeReference,
    },
    /// Boolean expression over the instance's root node, e.g.
    /// `status == "Active"` or `metadata.priority >= 3`.
    Expression { expression: String },
}

impl TaskCondition {
    /// Every node reference this condition resolves when evaluated.
    pub fn references(&self) -> Vec<&NodeReference> {
        match self {
            TaskCondition::NodeStatus { node, .. } | TaskCondition::FieldValue { node, .. } => {
                vec![node]
            }
            TaskCondition::EdgeExists {
                from_node, to_node, ..
            } => vec![from_node, to_node],
            TaskCondition::Expression { .. } => Vec::new(),
        }
    }
}
