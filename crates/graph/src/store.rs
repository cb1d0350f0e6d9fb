use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{EdgeId, GraphNode, NodeFilter, NodeId};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Graph node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Edge endpoint not found: {0}")]
    EdgeEndpointMissing(NodeId),
    #[error("Graph storage error: {0}")]
    Storage(String),
}

/// Contract the task engine consumes. Backends must surface a missing node as
/// [`GraphError::NodeNotFound`], never as a silently-accepted null.
///
/// Mutating operations are expected to be atomic per call; batch atomicity
/// (e.g. around a compound delta) is the caller's transaction boundary.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn create_node(
        &self,
        workflow_id: Uuid,
        node_type: &str,
        initial_values: HashMap<String, Value>,
        initial_status: Option<String>,
    ) -> Result<NodeId, GraphError>;

    async fn set_status(&self, node_id: NodeId, status: &str) -> Result<(), GraphError>;

    async fn set_field(&self, node_id: NodeId, key: &str, value: Value)
    -> Result<(), GraphError>;

    async fn create_edge(
        &self,
        workflow_id: Uuid,
        edge_type: &str,
        from_node_id: NodeId,
        to_node_id: NodeId,
    ) -> Result<EdgeId, GraphError>;

    /// Ids of all nodes of `node_type` in the workflow matching every filter,
    /// in creation order.
    async fn query_nodes(
        &self,
        workflow_id: Uuid,
        node_type: &str,
        filters: &[NodeFilter],
        status: Option<&str>,
    ) -> Result<Vec<NodeId>, GraphError>;

    async fn get_node(&self, node_id: NodeId) -> Result<GraphNode, GraphError>;

    async fn get_status(&self, node_id: NodeId) -> Result<Option<String>, GraphError>;

    async fn edge_exists(
        &self,
        workflow_id: Uuid,
        edge_type: &str,
        from_node_id: NodeId,
        to_node_id: NodeId,
    ) -> Result<bool, GraphError>;
}
