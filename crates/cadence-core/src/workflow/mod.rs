mod action;
mod collaborators;
mod context;
mod definition;
mod events;
pub mod expression;
mod state;
mod step;
mod store;
mod suspend;

pub use action::{ActionHandler, ActionKind};
pub use collaborators::{
    BoxFuture, DeliveryResult, EntityStore, NewNote, NewTask, NoteStore, NotificationChannel,
    NotificationTransport, TaskStore,
};
pub use context::{keys, Context};
pub use definition::{TriggerConditions, TriggerKind, WorkflowDefinition};
pub use events::TriggerEvent;
pub use state::{ExecutionStatus, WorkflowExecution, WorkflowStepExecution};
pub use step::{
    optional_str, require_str, StepConfig, StepKind, StepOutcome, StepStatus, WorkflowStep,
};
pub use store::{DefinitionStore, ExecutionStore};
pub use suspend::{DelaySpec, DelayUnit};
