pub mod condition;
pub mod definition;
pub mod delta;
pub mod instance;
pub mod reference;

pub use condition::{ConditionOperator, TaskCondition};
pub use definition::{
    AssigneeType, CreateTaskSetDefinition, TaskDefinition, TaskKey, TaskSetDefinition,
    UpdateTaskSetDefinition,
};
pub use delta::{AtomicDelta, CompoundStep, DeltaSummary, StatusSet, TaskDelta};
pub use instance::{
    InstanceError, TaskAssignment, TaskInstance, TaskInstanceStatus, TaskSetInstance,
    TaskSetInstanceStatus, TaskSetInstanceWithProgress,
};
pub use reference::NodeReference;
