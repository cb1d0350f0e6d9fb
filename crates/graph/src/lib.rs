//! Property-graph substrate for the task execution engine.
//!
//! The engine never owns graph entities; it consumes the [`GraphStore`]
//! contract and references nodes by id. [`MemoryGraph`] is the reference
//! store used by local deployments and tests.

pub mod memory;
pub mod models;
pub mod store;

pub use memory::MemoryGraph;
pub use models::{EdgeId, GraphEdge, GraphNode, NodeFilter, NodeId};
pub use store::{GraphError, GraphStore};
