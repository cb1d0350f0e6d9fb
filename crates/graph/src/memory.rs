//! In-memory graph store.
//!
//! Reference [`GraphStore`] backend used by local deployments and tests.
//! Nodes keep insertion order so query results are deterministic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{EdgeId, GraphEdge, GraphNode, NodeFilter, NodeId};
use crate::store::{GraphError, GraphStore};

#[derive(Default)]
struct GraphState {
    nodes: HashMap<NodeId, GraphNode>,
    /// Node ids in creation order, for deterministic queries.
    node_order: Vec<NodeId>,
    edges: Vec<GraphEdge>,
}

#[derive(Clone, Default)]
pub struct MemoryGraph {
    state: Arc<RwLock<GraphState>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every edge in a workflow, for inspection and tests.
    pub async fn edges(&self, workflow_id: Uuid) -> Vec<GraphEdge> {
        let state = self.state.read().await;
        state
            .edges
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }

    pub async fn node_count(&self) -> usize {
        self.state.read().await.nodes.len()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn create_node(
        &self,
        workflow_id: Uuid,
        node_type: &str,
        initial_values: HashMap<String, Value>,
        initial_status: Option<String>,
    ) -> Result<NodeId, GraphError> {
        let mut state = self.state.write().await;
        let id = Uuid::new_v4();
        let now = Utc::now();
        state.nodes.insert(
            id,
            GraphNode {
                id,
                workflow_id,
                node_type: node_type.to_string(),
                status: initial_status,
                fields: initial_values,
                created_at: now,
                updated_at: now,
            },
        );
        state.node_order.push(id);
        debug!(node_id = %id, node_type = %node_type, "node created");
        Ok(id)
    }

    async fn set_status(&self, node_id: NodeId, status: &str) -> Result<(), GraphError> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.status = Some(status.to_string());
        node.updated_at = Utc::now();
        Ok(())
    }

    async fn set_field(&self, node_id: NodeId, key: &str, value: Value) -> Result<(), GraphError> {
        let mut state = self.state.write().await;
        let node = state
            .nodes
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.fields.insert(key.to_string(), value);
        node.updated_at = Utc::now();
        Ok(())
    }

    async fn create_edge(
        &self,
        workflow_id: Uuid,
        edge_type: &str,
        from_node_id: NodeId,
        to_node_id: NodeId,
    ) -> Result<EdgeId, GraphError> {
        let mut state = self.state.write().await;
        if !state.nodes.contains_key(&from_node_id) {
            return Err(GraphError::EdgeEndpointMissing(from_node_id));
        }
        if !state.nodes.contains_key(&to_node_id) {
            return Err(GraphError::EdgeEndpointMissing(to_node_id));
        }
        let id = Uuid::new_v4();
        state.edges.push(GraphEdge {
            id,
            workflow_id,
            edge_type: edge_type.to_string(),
            from_node_id,
            to_node_id,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn query_nodes(
        &self,
        workflow_id: Uuid,
        node_type: &str,
        filters: &[NodeFilter],
        status: Option<&str>,
    ) -> Result<Vec<NodeId>, GraphError> {
        let state = self.state.read().await;
        let mut matched = Vec::new();
        for id in &state.node_order {
            let Some(node) = state.nodes.get(id) else {
                continue;
            };
            if node.workflow_id != workflow_id || node.node_type != node_type {
                continue;
            }
            if let Some(expected) = status {
                if node.status.as_deref() != Some(expected) {
                    continue;
                }
            }
            if filters.iter().all(|f| f.matches(node)) {
                matched.push(*id);
            }
        }
        Ok(matched)
    }

    async fn get_node(&self, node_id: NodeId) -> Result<GraphNode, GraphError> {
        let state = self.state.read().await;
        state
            .nodes
            .get(&node_id)
            .cloned()
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    async fn get_status(&self, node_id: NodeId) -> Result<Option<String>, GraphError> {
        let state = self.state.read().await;
        state
            .nodes
            .get(&node_id)
            .map(|n| n.status.clone())
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    async fn edge_exists(
        &self,
        workflow_id: Uuid,
        edge_type: &str,
        from_node_id: NodeId,
        to_node_id: NodeId,
    ) -> Result<bool, GraphError> {
        let state = self.state.read().await;
        Ok(state.edges.iter().any(|e| {
            e.workflow_id == workflow_id
                && e.edge_type == edge_type
                && e.from_node_id == from_node_id
                && e.to_node_id == to_node_id
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_and_read_back_a_node() {
        let graph = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();

        let mut fields = HashMap::new();
        fields.insert("name".to_string(), json!("Sample 1"));
        let id = graph
            .create_node(workflow_id, "Sample", fields, Some("Draft".to_string()))
            .await
            .unwrap();

        let node = graph.get_node(id).await.unwrap();
        assert_eq!(node.node_type, "Sample");
        assert_eq!(node.status.as_deref(), Some("Draft"));
        assert_eq!(node.field("name"), Some(&json!("Sample 1")));
    }

    #[tokio::test]
    async fn missing_node_is_a_typed_error() {
        let graph = MemoryGraph::new();
        let err = graph.get_node(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, GraphError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn query_respects_type_filters_and_status() {
        let graph = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();

        let mut fields = HashMap::new();
        fields.insert("batch".to_string(), json!(1));
        let a = graph
            .create_node(workflow_id, "Sample", fields.clone(), Some("Active".into()))
            .await
            .unwrap();
        let _b = graph
            .create_node(workflow_id, "Sample", fields.clone(), Some("Draft".into()))
            .await
            .unwrap();
        let _c = graph
            .create_node(workflow_id, "Report", fields, Some("Active".into()))
            .await
            .unwrap();

        let filters = vec![NodeFilter {
            field_key: "batch".to_string(),
            value: json!(1),
        }];
        let matched = graph
            .query_nodes(workflow_id, "Sample", &filters, Some("Active"))
            .await
            .unwrap();
        assert_eq!(matched, vec![a]);
    }

    #[tokio::test]
    async fn query_returns_nodes_in_creation_order() {
        let graph = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();

        let first = graph
            .create_node(workflow_id, "Sample", HashMap::new(), None)
            .await
            .unwrap();
        let second = graph
            .create_node(workflow_id, "Sample", HashMap::new(), None)
            .await
            .unwrap();

        let matched = graph
            .query_nodes(workflow_id, "Sample", &[], None)
            .await
            .unwrap();
        assert_eq!(matched, vec![first, second]);
    }

    #[tokio::test]
    async fn edges_require_existing_endpoints() {
        let graph = MemoryGraph::new();
        let workflow_id = Uuid::new_v4();
        let a = graph
            .create_node(workflow_id, "Sample", HashMap::new(), None)
            .await
            .unwrap();

        let err = graph
            .create_edge(workflow_id, "derived_from", a, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::EdgeEndpointMissing(_)));

        let b = graph
            .create_node(workflow_id, "Report", HashMap::new(), None)
            .await
            .unwrap();
        graph
            .create_edge(workflow_id, "derived_from", a, b)
            .await
            .unwrap();
        assert!(
            graph
                .edge_exists(workflow_id, "derived_from", a, b)
                .await
                .unwrap()
        );
        assert!(
            !graph
                .edge_exists(workflow_id, "derived_from", b, a)
                .await
                .unwrap()
        );
    }
}
