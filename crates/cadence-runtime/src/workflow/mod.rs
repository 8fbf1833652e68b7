mod actions;
mod coordinator;
mod dispatcher;
mod executor;
mod http;
mod memory_store;
mod pg_store;
mod registry;
mod scheduler;

pub use actions::{
    AddNoteHandler, AssignOwnerHandler, CreateTaskHandler, SendNotificationHandler,
    UpdateEntityStatusHandler,
};
pub use coordinator::{rebuild_context, ExecutionCoordinator, ResumeOutcome};
pub use dispatcher::{DispatchReport, TriggerDispatcher};
pub use executor::StepExecutor;
pub use http::HttpCollaborators;
pub use memory_store::{MemoryDefinitionStore, MemoryExecutionStore};
pub use pg_store::{PgDefinitionStore, PgExecutionStore};
pub use registry::{ActionRegistry, Collaborators};
pub use scheduler::{DelayPoller, DelayPollerConfig, TickReport};
