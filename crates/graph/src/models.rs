use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type EdgeId = Uuid;

/// A node in the property graph: typed, optionally statused, with a free-form
/// field map.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GraphNode {
    pub id: NodeId,
    pub workflow_id: Uuid,
    pub node_type: String,
    pub status: Option<String>,
    #[ts(type = "Record<string, unknown>")]
    pub fields: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GraphNode {
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A typed, directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub workflow_id: Uuid,
    pub edge_type: String,
    pub from_node_id: NodeId,
    pub to_node_id: NodeId,
    pub created_at: DateTime<Utc>,
}

/// Equality predicate on a node field, used by `query_nodes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NodeFilter {
    pub field_key: String,
    #[ts(type = "unknown")]
    pub value: Value,
}

impl NodeFilter {
    pub fn matches(&self, node: &GraphNode) -> bool {
        node.fields.get(&self.field_key) == Some(&self.value)
    }
}
