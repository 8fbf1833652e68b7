pub mod db;
pub mod migrations;
pub mod workflow;

pub use db::Database;
pub use migrations::{Migration, MigrationRunner};
pub use workflow::{
    ActionRegistry, Collaborators, DelayPoller, DelayPollerConfig, DispatchReport,
    ExecutionCoordinator, HttpCollaborators, MemoryDefinitionStore, MemoryExecutionStore,
    PgDefinitionStore, PgExecutionStore, ResumeOutcome, StepExecutor, TickReport,
    TriggerDispatcher,
};
