//! Persistence contracts for definitions and executions.
//!
//! The engine only talks to storage through these traits, so an execution
//! suspended by one process can be resumed by another as long as both point
//! at the same durable store.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::collaborators::BoxFuture;
use super::definition::{TriggerKind, WorkflowDefinition};
use super::state::{WorkflowExecution, WorkflowStepExecution};
use super::step::WorkflowStep;
use crate::error::Result;

/// Source of workflow definitions and their steps.
pub trait DefinitionStore: Send + Sync {
    /// Active definitions listening for `trigger`.
    fn list_active_definitions(
        &self,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Vec<WorkflowDefinition>>>;

    fn get_definition(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowDefinition>>>;

    /// Steps of a definition, ordered by `order`.
    fn get_steps(&self, workflow_id: Uuid) -> BoxFuture<'_, Result<Vec<WorkflowStep>>>;

    /// Insert or update a definition. Once steps are attached, a save that
    /// changes anything but `active` fails with a validation error.
    fn save_definition<'a>(&'a self, definition: &'a WorkflowDefinition)
        -> BoxFuture<'a, Result<()>>;

    /// Attach a step. Fails with a validation error when `order` is already taken.
    fn add_step<'a>(&'a self, step: &'a WorkflowStep) -> BoxFuture<'a, Result<()>>;

    /// The only mutation allowed on a definition once it has steps.
    fn set_active(&self, id: Uuid, active: bool) -> BoxFuture<'_, Result<()>>;
}

/// Durable record of executions and their step attempts.
pub trait ExecutionStore: Send + Sync {
    fn create_execution<'a>(&'a self, execution: &'a WorkflowExecution)
        -> BoxFuture<'a, Result<()>>;

    fn get_execution(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowExecution>>>;

    /// Persist a terminal status. Returns `false` without writing when the
    /// stored execution is no longer running.
    fn finish_execution<'a>(&'a self, execution: &'a WorkflowExecution)
        -> BoxFuture<'a, Result<bool>>;

    fn create_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>>;

    fn update_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>>;

    /// Step attempts of an execution, ordered by step order then start time.
    fn list_step_executions(
        &self,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>>;

    /// Atomically move a due Delay step from Pending to Completed.
    ///
    /// Returns `false` if the step was not pending, not yet due, or already
    /// claimed by someone else.
    fn claim_delay_step(
        &self,
        step_execution_id: Uuid,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Pending Delay steps due at `now` whose execution is still running,
    /// oldest wake time first.
    fn find_due_delay_steps(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>>;

    /// Steps still marked running that started at or before `cutoff`, whose
    /// execution is still running. Left behind when a process dies mid-step.
    fn find_stale_running_steps(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>>;
}
