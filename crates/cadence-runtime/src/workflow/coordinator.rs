use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cadence_core::config::EngineConfig;
use cadence_core::error::{CadenceError, Result};
use cadence_core::workflow::{
    Context, DefinitionStore, ExecutionStatus, ExecutionStore, StepKind, StepStatus,
    WorkflowExecution, WorkflowStep, WorkflowStepExecution,
};

use super::executor::StepExecutor;

const INTERRUPTED: &str = "interrupted before completion";

/// What a call to [`ExecutionCoordinator::resume`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// The delay was claimed and the remaining steps ran.
    Resumed(WorkflowExecution),
    /// A step was left running by a previous process; the execution was failed.
    Interrupted(WorkflowExecution),
    /// The execution is no longer running.
    NotRunning(ExecutionStatus),
    /// The suspended step's wake time has not been reached.
    NotDue(Option<DateTime<Utc>>),
    /// Another worker claimed the delay step first.
    AlreadyClaimed,
    /// The execution has no suspended step.
    NothingPending,
}

/// Owns the lifecycle of workflow executions.
///
/// Steps of one execution run strictly in order: a step execution record is
/// only created once the previous one has reached a terminal status.
pub struct ExecutionCoordinator {
    definitions: Arc<dyn DefinitionStore>,
    executions: Arc<dyn ExecutionStore>,
    executor: Arc<StepExecutor>,
    condition_short_circuit: bool,
}

impl ExecutionCoordinator {
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        executor: Arc<StepExecutor>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            definitions,
            executions,
            executor,
            condition_short_circuit: config.condition_short_circuit,
        }
    }

    /// Start an execution of `definition_id` and run it until it completes,
    /// fails or suspends on a Delay step.
    pub async fn start(&self, definition_id: Uuid, context: Context) -> Result<WorkflowExecution> {
        let definition = self
            .definitions
            .get_definition(definition_id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("workflow {}", definition_id)))?;

        if !definition.active {
            return Err(CadenceError::Validation(format!(
                "workflow '{}' is inactive",
                definition.name
            )));
        }

        let steps = self.ordered_steps(definition_id).await?;

        let mut execution = WorkflowExecution::new(definition_id, context);
        self.executions.create_execution(&execution).await?;

        tracing::info!(
            execution_id = %execution.id,
            workflow = %definition.name,
            steps = steps.len(),
            "Workflow execution started"
        );

        let context = execution.context.clone();
        self.advance(&mut execution, &steps, context).await?;
        Ok(execution)
    }

    /// Continue an execution suspended on a Delay step.
    pub async fn resume(&self, execution_id: Uuid) -> Result<ResumeOutcome> {
        let mut execution = self.status(execution_id).await?;

        if execution.status != ExecutionStatus::Running {
            tracing::info!(
                execution_id = %execution_id,
                status = execution.status.as_str(),
                "Skipping resume of finished execution"
            );
            return Ok(ResumeOutcome::NotRunning(execution.status));
        }

        let records = self.executions.list_step_executions(execution_id).await?;

        if let Some(orphan) = records.iter().find(|r| r.status == StepStatus::Running) {
            let mut orphan = orphan.clone();
            tracing::warn!(
                execution_id = %execution_id,
                step = %orphan.step_title,
                "Found step left running, failing execution"
            );
            orphan.fail(INTERRUPTED);
            self.executions.update_step_execution(&orphan).await?;
            execution.fail(failure_message(&orphan.step_title, INTERRUPTED))?;
            self.finish(&mut execution).await?;
            return Ok(ResumeOutcome::Interrupted(execution));
        }

        let Some(pending) = records.iter().find(|r| r.status == StepStatus::Pending) else {
            tracing::warn!(execution_id = %execution_id, "Running execution has no suspended step");
            return Ok(ResumeOutcome::NothingPending);
        };

        let now = Utc::now();
        if !pending.is_due(now) {
            tracing::debug!(
                execution_id = %execution_id,
                resume_at = ?pending.scheduled_resume_at,
                "Delay not yet due"
            );
            return Ok(ResumeOutcome::NotDue(pending.scheduled_resume_at));
        }

        if !self.executions.claim_delay_step(pending.id, now).await? {
            tracing::debug!(execution_id = %execution_id, "Delay step already claimed");
            return Ok(ResumeOutcome::AlreadyClaimed);
        }

        tracing::info!(
            execution_id = %execution_id,
            step = %pending.step_title,
            "Resuming workflow after delay"
        );

        let context = rebuild_context(&execution.context, &records);
        let remaining: Vec<WorkflowStep> = self
            .ordered_steps(execution.workflow_id)
            .await?
            .into_iter()
            .filter(|step| step.order > pending.step_order)
            .collect();

        self.advance(&mut execution, &remaining, context).await?;
        Ok(ResumeOutcome::Resumed(execution))
    }

    /// Current execution record.
    pub async fn status(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        self.executions
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| CadenceError::NotFound(format!("execution {}", execution_id)))
    }

    /// Step attempts of an execution in step order.
    pub async fn history(&self, execution_id: Uuid) -> Result<Vec<WorkflowStepExecution>> {
        self.executions.list_step_executions(execution_id).await
    }

    async fn ordered_steps(&self, definition_id: Uuid) -> Result<Vec<WorkflowStep>> {
        let mut steps = self.definitions.get_steps(definition_id).await?;
        steps.sort_by_key(|step| step.order);
        Ok(steps)
    }

    /// Run `steps` in order against `context`.
    async fn advance(
        &self,
        execution: &mut WorkflowExecution,
        steps: &[WorkflowStep],
        mut context: Context,
    ) -> Result<()> {
        for step in steps {
            let mut record = WorkflowStepExecution::start(execution.id, step);
            self.executions.create_step_execution(&record).await?;

            let outcome = self.executor.run_step(step, &context).await;

            if !outcome.success {
                let cause = outcome.error_message();
                record.fail(cause.clone());
                self.executions.update_step_execution(&record).await?;

                execution.fail(failure_message(&step.title, &cause))?;
                self.finish(execution).await?;
                return Ok(());
            }

            if let (StepKind::Delay, Some(resume_at)) = (step.kind, outcome.resume_at) {
                record.suspend(resume_at, outcome.data);
                self.executions.update_step_execution(&record).await?;
                tracing::info!(
                    execution_id = %execution.id,
                    step = %step.title,
                    resume_at = %resume_at,
                    "Workflow suspended"
                );
                return Ok(());
            }

            context = context.overlay(&outcome.context_updates);
            record.complete(outcome.data, outcome.context_updates);
            self.executions.update_step_execution(&record).await?;
            tracing::debug!(execution_id = %execution.id, step = %step.title, "Step completed");

            if !outcome.should_continue && self.condition_short_circuit {
                tracing::info!(
                    execution_id = %execution.id,
                    step = %step.title,
                    "Condition not met, ending execution early"
                );
                break;
            }
        }

        execution.complete()?;
        self.finish(execution).await
    }

    /// Persist a terminal status. When the stored execution was already
    /// finished elsewhere, `execution` is replaced with the stored record.
    async fn finish(&self, execution: &mut WorkflowExecution) -> Result<()> {
        if !self.executions.finish_execution(execution).await? {
            tracing::warn!(
                execution_id = %execution.id,
                "Execution was already finished by someone else"
            );
            *execution = self.status(execution.id).await?;
            return Ok(());
        }

        match execution.status {
            ExecutionStatus::Failed => tracing::warn!(
                execution_id = %execution.id,
                error = execution.error.as_deref().unwrap_or_default(),
                "Workflow execution failed"
            ),
            _ => tracing::info!(execution_id = %execution.id, "Workflow execution completed"),
        }
        Ok(())
    }
}

fn failure_message(step_title: &str, cause: &str) -> String {
    format!("step '{}' failed: {}", step_title, cause)
}

/// Start snapshot overlaid with the updates of completed steps, in step order.
pub fn rebuild_context(snapshot: &Context, records: &[WorkflowStepExecution]) -> Context {
    let mut completed: Vec<&WorkflowStepExecution> = records
        .iter()
        .filter(|r| r.status == StepStatus::Completed)
        .collect();
    completed.sort_by_key(|r| (r.step_order, r.started_at));

    completed
        .into_iter()
        .fold(snapshot.clone(), |ctx, r| ctx.overlay(&r.context_updates))
}
