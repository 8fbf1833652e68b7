use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::context::Context;
use super::step::{StepStatus, WorkflowStep};
use crate::error::{CadenceError, Result};

/// Execution status. Moves Running -> Completed | Failed and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are running, or a Delay step is waiting to be resumed.
    Running,
    /// Every step completed, or a condition ended the execution early.
    Completed,
    /// A step failed.
    Failed,
}

impl ExecutionStatus {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if the execution is terminal (no longer running).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for ExecutionStatus {
    type Err = CadenceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CadenceError::Validation(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// One run of a workflow definition against a triggering context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    /// Snapshot captured at start, read-only afterwards.
    pub context: Context,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl WorkflowExecution {
    /// Create a running execution.
    pub fn new(workflow_id: Uuid, context: Context) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            status: ExecutionStatus::Running,
            context,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Mark as completed.
    pub fn complete(&mut self) -> Result<()> {
        self.finish(ExecutionStatus::Completed, None)
    }

    /// Mark as failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.finish(ExecutionStatus::Failed, Some(error.into()))
    }

    fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CadenceError::InvalidState(format!(
                "execution {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

/// Audit record of one step attempt within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStepExecution {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub step_id: Uuid,
    pub step_order: i32,
    pub step_title: String,
    pub status: StepStatus,
    pub result: Option<Value>,
    /// Context keys this step updated, applied to later steps.
    #[serde(default)]
    pub context_updates: Map<String, Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wake time, Delay steps only.
    pub scheduled_resume_at: Option<DateTime<Utc>>,
}

impl WorkflowStepExecution {
    /// Create a record for a step that is starting now.
    pub fn start(execution_id: Uuid, step: &WorkflowStep) -> Self {
        Self {
            id: Uuid::new_v4(),
            execution_id,
            step_id: step.id,
            step_order: step.order,
            step_title: step.title.clone(),
            status: StepStatus::Running,
            result: None,
            context_updates: Map::new(),
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            scheduled_resume_at: None,
        }
    }

    /// Mark as completed.
    pub fn complete(&mut self, result: Option<Value>, context_updates: Map<String, Value>) {
        self.status = StepStatus::Completed;
        self.result = result;
        self.context_updates = context_updates;
        self.completed_at = Some(Utc::now());
    }

    /// Mark as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
    }

    /// Park a Delay step until `resume_at`.
    pub fn suspend(&mut self, resume_at: DateTime<Utc>, result: Option<Value>) {
        self.status = StepStatus::Pending;
        self.result = result;
        self.scheduled_resume_at = Some(resume_at);
    }

    /// Whether this is a suspended step whose wake time has passed.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == StepStatus::Pending
            && self.scheduled_resume_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Whether this step has been running since before `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == StepStatus::Running && self.started_at <= cutoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::step::StepKind;
    use chrono::Duration;

    #[test]
    fn test_execution_creation() {
        let workflow_id = Uuid::new_v4();
        let execution = WorkflowExecution::new(workflow_id, Context::new().with("entityId", 42));
        assert_eq!(execution.workflow_id, workflow_id);
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.completed_at.is_none());
    }

    #[test]
    fn test_execution_status_is_monotonic() {
        let mut execution = WorkflowExecution::new(Uuid::new_v4(), Context::new());

        execution.fail("step 'x' failed: boom").unwrap();
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.completed_at.is_some());

        assert!(execution.complete().is_err());
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.error.as_deref(), Some("step 'x' failed: boom"));
    }

    #[test]
    fn test_execution_status_conversion() {
        assert_eq!(ExecutionStatus::Running.as_str(), "running");
        assert_eq!(
            "completed".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Completed
        );
        assert!("waiting".parse::<ExecutionStatus>().is_err());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_step_execution_lifecycle() {
        let step = WorkflowStep::new(Uuid::new_v4(), 1, "Create task", StepKind::Action);
        let mut record = WorkflowStepExecution::start(Uuid::new_v4(), &step);

        assert_eq!(record.status, StepStatus::Running);
        assert_eq!(record.step_order, 1);
        assert_eq!(record.step_title, "Create task");

        let mut updates = Map::new();
        updates.insert("taskId".into(), serde_json::json!("t-1"));
        record.complete(Some(serde_json::json!({"taskId": "t-1"})), updates);

        assert_eq!(record.status, StepStatus::Completed);
        assert!(record.completed_at.is_some());
        assert_eq!(record.context_updates.len(), 1);
    }

    #[test]
    fn test_delay_suspension() {
        let step = WorkflowStep::new(Uuid::new_v4(), 2, "Wait", StepKind::Delay);
        let mut record = WorkflowStepExecution::start(Uuid::new_v4(), &step);
        let now = Utc::now();

        record.suspend(now + Duration::hours(2), None);
        assert_eq!(record.status, StepStatus::Pending);
        assert!(!record.is_due(now));
        assert!(record.is_due(now + Duration::hours(2)));

        record.fail("stopped");
        assert!(!record.is_due(now + Duration::hours(3)));
    }

    #[test]
    fn test_stale_only_while_running() {
        let step = WorkflowStep::new(Uuid::new_v4(), 1, "Notify", StepKind::Action);
        let mut record = WorkflowStepExecution::start(Uuid::new_v4(), &step);
        let later = record.started_at + Duration::minutes(20);

        assert!(!record.is_stale(record.started_at - Duration::seconds(1)));
        assert!(record.is_stale(later));

        record.complete(None, Default::default());
        assert!(!record.is_stale(later));
    }
}
