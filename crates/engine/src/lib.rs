//! Task Execution Engine
//!
//! A dependency-aware task DAG that tracks expected mutations ("deltas") to a
//! property graph, computes which tasks are unlockable, and applies graph
//! mutations when a task completes. The graph store itself is an external
//! collaborator (see the `graph` crate); this engine only holds task state and
//! node references.

pub mod error;
pub mod models;
pub mod services;

pub use error::EngineError;
pub use services::manager::TaskSetManager;
pub use services::registry::DefinitionRegistry;
