//! In-memory definition and execution stores.
//!
//! Used by tests and by embedders that do not need executions to survive a
//! restart. Semantics match the Postgres stores, including the guarded
//! terminal-state write and the atomic delay claim.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use cadence_core::error::{CadenceError, Result};
use cadence_core::workflow::{
    BoxFuture, DefinitionStore, ExecutionStatus, ExecutionStore, StepStatus, TriggerKind,
    WorkflowDefinition, WorkflowExecution, WorkflowStep, WorkflowStepExecution,
};

#[derive(Default)]
pub struct MemoryDefinitionStore {
    definitions: RwLock<HashMap<Uuid, WorkflowDefinition>>,
    steps: RwLock<HashMap<Uuid, Vec<WorkflowStep>>>,
}

impl MemoryDefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DefinitionStore for MemoryDefinitionStore {
    fn list_active_definitions(
        &self,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Vec<WorkflowDefinition>>> {
        Box::pin(async move {
            let definitions = self.definitions.read().await;
            let mut matching: Vec<WorkflowDefinition> = definitions
                .values()
                .filter(|d| d.active && d.trigger == trigger)
                .cloned()
                .collect();
            matching.sort_by_key(|d| d.created_at);
            Ok(matching)
        })
    }

    fn get_definition(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowDefinition>>> {
        Box::pin(async move { Ok(self.definitions.read().await.get(&id).cloned()) })
    }

    fn get_steps(&self, workflow_id: Uuid) -> BoxFuture<'_, Result<Vec<WorkflowStep>>> {
        Box::pin(async move {
            Ok(self
                .steps
                .read()
                .await
                .get(&workflow_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn save_definition<'a>(
        &'a self,
        definition: &'a WorkflowDefinition,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut definitions = self.definitions.write().await;
            if let Some(stored) = definitions.get(&definition.id) {
                let has_steps = self
                    .steps
                    .read()
                    .await
                    .get(&definition.id)
                    .map(|steps| !steps.is_empty())
                    .unwrap_or(false);
                if has_steps && stored.is_reshaped_by(definition) {
                    return Err(CadenceError::Validation(format!(
                        "workflow {} has steps; only 'active' can change",
                        definition.id
                    )));
                }
            }
            definitions.insert(definition.id, definition.clone());
            Ok(())
        })
    }

    fn add_step<'a>(&'a self, step: &'a WorkflowStep) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.definitions.read().await.contains_key(&step.workflow_id) {
                return Err(CadenceError::NotFound(format!(
                    "workflow {}",
                    step.workflow_id
                )));
            }

            let mut steps = self.steps.write().await;
            let existing = steps.entry(step.workflow_id).or_default();
            if existing.iter().any(|s| s.order == step.order) {
                return Err(CadenceError::Validation(format!(
                    "order: {} is already taken in workflow {}",
                    step.order, step.workflow_id
                )));
            }
            existing.push(step.clone());
            existing.sort_by_key(|s| s.order);
            Ok(())
        })
    }

    fn set_active(&self, id: Uuid, active: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            match self.definitions.write().await.get_mut(&id) {
                Some(definition) => {
                    definition.active = active;
                    Ok(())
                }
                None => Err(CadenceError::NotFound(format!("workflow {}", id))),
            }
        })
    }
}

#[derive(Default)]
pub struct MemoryExecutionStore {
    executions: RwLock<HashMap<Uuid, WorkflowExecution>>,
    step_executions: RwLock<Vec<WorkflowStepExecution>>,
}

impl MemoryExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step attempt across all executions, in creation order.
    pub async fn all_step_executions(&self) -> Vec<WorkflowStepExecution> {
        self.step_executions.read().await.clone()
    }

    /// Every execution, oldest first.
    pub async fn all_executions(&self) -> Vec<WorkflowExecution> {
        let mut executions: Vec<WorkflowExecution> =
            self.executions.read().await.values().cloned().collect();
        executions.sort_by_key(|e| e.started_at);
        executions
    }
}

impl ExecutionStore for MemoryExecutionStore {
    fn create_execution<'a>(
        &'a self,
        execution: &'a WorkflowExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut executions = self.executions.write().await;
            if executions.contains_key(&execution.id) {
                return Err(CadenceError::Validation(format!(
                    "execution {} already exists",
                    execution.id
                )));
            }
            executions.insert(execution.id, execution.clone());
            Ok(())
        })
    }

    fn get_execution(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowExecution>>> {
        Box::pin(async move { Ok(self.executions.read().await.get(&id).cloned()) })
    }

    fn finish_execution<'a>(
        &'a self,
        execution: &'a WorkflowExecution,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut executions = self.executions.write().await;
            let stored = executions
                .get_mut(&execution.id)
                .ok_or_else(|| CadenceError::NotFound(format!("execution {}", execution.id)))?;

            if stored.status != ExecutionStatus::Running {
                return Ok(false);
            }
            stored.status = execution.status;
            stored.completed_at = execution.completed_at;
            stored.error = execution.error.clone();
            Ok(true)
        })
    }

    fn create_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self
                .executions
                .read()
                .await
                .contains_key(&record.execution_id)
            {
                return Err(CadenceError::NotFound(format!(
                    "execution {}",
                    record.execution_id
                )));
            }
            self.step_executions.write().await.push(record.clone());
            Ok(())
        })
    }

    fn update_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut records = self.step_executions.write().await;
            match records.iter_mut().find(|r| r.id == record.id) {
                Some(stored) => {
                    *stored = record.clone();
                    Ok(())
                }
                None => Err(CadenceError::NotFound(format!(
                    "step execution {}",
                    record.id
                ))),
            }
        })
    }

    fn list_step_executions(
        &self,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let mut records: Vec<WorkflowStepExecution> = self
                .step_executions
                .read()
                .await
                .iter()
                .filter(|r| r.execution_id == execution_id)
                .cloned()
                .collect();
            records.sort_by_key(|r| (r.step_order, r.started_at));
            Ok(records)
        })
    }

    fn claim_delay_step(
        &self,
        step_execution_id: Uuid,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let mut records = self.step_executions.write().await;
            match records
                .iter_mut()
                .find(|r| r.id == step_execution_id && r.is_due(now))
            {
                Some(record) => {
                    record.status = StepStatus::Completed;
                    record.completed_at = Some(now);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn find_due_delay_steps(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let executions = self.executions.read().await;
            let mut due: Vec<WorkflowStepExecution> = self
                .step_executions
                .read()
                .await
                .iter()
                .filter(|r| r.is_due(now))
                .filter(|r| {
                    executions
                        .get(&r.execution_id)
                        .map(|e| e.status == ExecutionStatus::Running)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            due.sort_by_key(|r| r.scheduled_resume_at);
            due.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
            Ok(due)
        })
    }

    fn find_stale_running_steps(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let executions = self.executions.read().await;
            let mut stale: Vec<WorkflowStepExecution> = self
                .step_executions
                .read()
                .await
                .iter()
                .filter(|r| r.is_stale(cutoff))
                .filter(|r| {
                    executions
                        .get(&r.execution_id)
                        .map(|e| e.status == ExecutionStatus::Running)
                        .unwrap_or(false)
                })
                .cloned()
                .collect();
            stale.sort_by_key(|r| r.started_at);
            stale.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
            Ok(stale)
        })
    }
}
