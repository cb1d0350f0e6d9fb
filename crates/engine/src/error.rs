use graph::GraphError;
use thiserror::Error;

use crate::models::instance::InstanceError;
use crate::services::applier::DeltaError;
use crate::services::condition::ConditionError;
use crate::services::registry::DefinitionError;
use crate::services::resolver::ResolveError;
use crate::services::task_graph::TaskGraphError;

/// Aggregate error surfaced by the engine's public operations.
///
/// Structural errors (`TaskGraph`, `Definition`) fail at authoring time and
/// never at runtime. Runtime errors are scoped to the single task operation
/// that raised them; they leave the rest of the instance untouched.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    TaskGraph(#[from] TaskGraphError),
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error(transparent)]
    Delta(#[from] DeltaError),
    #[error(transparent)]
    Instance(#[from] InstanceError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
