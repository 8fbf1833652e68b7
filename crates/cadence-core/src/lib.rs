pub mod config;
pub mod error;
pub mod testing;
pub mod workflow;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use workflow::{
    Context, ExecutionStatus, StepKind, StepStatus, TriggerEvent, TriggerKind, WorkflowDefinition,
    WorkflowExecution, WorkflowStep, WorkflowStepExecution,
};
