use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CadenceError;

/// Kind-specific step configuration, interpreted only by the matching executor branch.
pub type StepConfig = Map<String, Value>;

/// What a step does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Perform a side effect through an action handler.
    Action,
    /// Evaluate an expression against the context.
    Condition,
    /// Suspend the execution until a wake time.
    Delay,
    /// Send an in-app notification.
    Notification,
}

impl StepKind {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::Notification => "notification",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepKind {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "action" => Ok(Self::Action),
            "condition" => Ok(Self::Condition),
            "delay" => Ok(Self::Delay),
            "notification" => Ok(Self::Notification),
            other => Err(CadenceError::Validation(format!(
                "unknown step kind '{}'",
                other
            ))),
        }
    }
}

/// One step of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Position in the sequence, unique within the definition.
    pub order: i32,
    pub title: String,
    pub kind: StepKind,
    #[serde(default)]
    pub config: StepConfig,
}

impl WorkflowStep {
    /// Create a step with an empty configuration.
    pub fn new(workflow_id: Uuid, order: i32, title: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            order,
            title: title.into(),
            kind,
            config: StepConfig::new(),
        }
    }

    /// Set a configuration value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }
}

/// Per-attempt step status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Delay step waiting for its wake time.
    Pending,
    /// Step currently running.
    Running,
    /// Step completed successfully.
    Completed,
    /// Step failed.
    Failed,
}

impl StepStatus {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the step attempt has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for StepStatus {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CadenceError::Validation(format!(
                "unknown step status '{}'",
                other
            ))),
        }
    }
}

/// Result of running one step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub success: bool,
    /// Result payload recorded on the step execution.
    pub data: Option<Value>,
    pub error: Option<String>,
    /// False when a condition did not hold.
    pub should_continue: bool,
    /// Context keys the step asks to update for later steps.
    pub context_updates: Map<String, Value>,
    /// Wake time, set by Delay steps.
    pub resume_at: Option<DateTime<Utc>>,
}

impl StepOutcome {
    /// Successful outcome with a result payload.
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            should_continue: true,
            ..Default::default()
        }
    }

    /// Failed outcome.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            should_continue: false,
            ..Default::default()
        }
    }

    /// Record a context update.
    pub fn with_update(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_updates.insert(key.into(), value.into());
        self
    }

    /// Set whether later steps should run.
    pub fn with_continue(mut self, should_continue: bool) -> Self {
        self.should_continue = should_continue;
        self
    }

    /// Mark the outcome as a suspension until `at`.
    pub fn suspended_until(mut self, at: DateTime<Utc>) -> Self {
        self.resume_at = Some(at);
        self
    }

    /// Error text, or a generic message when a handler failed without one.
    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| "step failed without an error message".to_string())
    }
}

/// Read a required, non-blank string from a step configuration.
pub fn require_str<'a>(config: &'a StepConfig, key: &str) -> Result<&'a str, String> {
    optional_str(config, key).ok_or_else(|| format!("missing required config '{}'", key))
}

/// Read an optional string, treating blank values as absent.
pub fn optional_str<'a>(config: &'a StepConfig, key: &str) -> Option<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_status_conversion() {
        assert_eq!(StepStatus::Pending.as_str(), "pending");
        assert_eq!(StepStatus::Running.as_str(), "running");
        assert_eq!(StepStatus::Completed.as_str(), "completed");
        assert_eq!(StepStatus::Failed.as_str(), "failed");

        assert_eq!("pending".parse::<StepStatus>().unwrap(), StepStatus::Pending);
        assert_eq!("completed".parse::<StepStatus>().unwrap(), StepStatus::Completed);
        assert!("skipped".parse::<StepStatus>().is_err());
    }

    #[test]
    fn test_step_status_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
    }

    #[test]
    fn test_step_kind_parse() {
        assert_eq!("Delay".parse::<StepKind>().unwrap(), StepKind::Delay);
        assert_eq!("notification".parse::<StepKind>().unwrap(), StepKind::Notification);
        assert!("webhook".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_step_builder() {
        let workflow_id = Uuid::new_v4();
        let step = WorkflowStep::new(workflow_id, 1, "Wait two hours", StepKind::Delay)
            .with("duration", 2)
            .with("unit", "hours");

        assert_eq!(step.workflow_id, workflow_id);
        assert_eq!(step.config.get("duration"), Some(&json!(2)));
        assert_eq!(step.kind, StepKind::Delay);
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = StepOutcome::ok(json!({"taskId": "t1"})).with_update("taskId", "t1");
        assert!(ok.success);
        assert!(ok.should_continue);
        assert_eq!(ok.context_updates.get("taskId"), Some(&json!("t1")));

        let failed = StepOutcome::failed("boom");
        assert!(!failed.success);
        assert_eq!(failed.error_message(), "boom");
        assert!(StepOutcome::default().error_message().contains("without an error"));
    }

    #[test]
    fn test_config_helpers() {
        let mut config = StepConfig::new();
        config.insert("title".into(), json!("Call candidate"));
        config.insert("blank".into(), json!("  "));
        config.insert("number".into(), json!(3));

        assert_eq!(require_str(&config, "title"), Ok("Call candidate"));
        assert!(require_str(&config, "blank").is_err());
        assert!(require_str(&config, "number").is_err());
        assert_eq!(optional_str(&config, "missing"), None);
    }
}
