use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::Context;
use super::expression;
use crate::error::CadenceError;

/// Domain event kinds that can start a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// A record (candidate, user, deal) was created.
    EntityCreated,
    /// A record moved between pipeline stages.
    StageChanged,
    /// An activity (interview, training session) was completed.
    ActivityCompleted,
}

impl TriggerKind {
    /// Convert to string for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityCreated => "entity_created",
            Self::StageChanged => "stage_changed",
            Self::ActivityCompleted => "activity_completed",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "entity_created" | "EntityCreated" => Ok(Self::EntityCreated),
            "stage_changed" | "StageChanged" => Ok(Self::StageChanged),
            "activity_completed" | "ActivityCompleted" => Ok(Self::ActivityCompleted),
            other => Err(CadenceError::Validation(format!(
                "unknown trigger kind '{}'",
                other
            ))),
        }
    }
}

/// Optional filter narrowing which events start a workflow.
///
/// Every populated field must match; an empty filter matches every event of
/// the definition's trigger kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConditions {
    /// Stage the entity must be leaving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_stage: Option<String>,
    /// Stage the entity must be entering.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_stage: Option<String>,
    /// Condition expression evaluated against the initial context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
}

impl TriggerConditions {
    /// Whether no filter is configured.
    pub fn is_empty(&self) -> bool {
        self.from_stage.is_none() && self.to_stage.is_none() && self.expression.is_none()
    }

    /// Check the filter against the context an execution would start with.
    ///
    /// An expression that fails to evaluate never matches.
    pub fn matches(&self, context: &Context) -> bool {
        if let Some(expected) = &self.from_stage {
            if context.from_stage() != Some(expected.as_str()) {
                return false;
            }
        }

        if let Some(expected) = &self.to_stage {
            if context.to_stage() != Some(expected.as_str()) {
                return false;
            }
        }

        match &self.expression {
            Some(expr) => expression::is_satisfied(expr, context),
            None => true,
        }
    }
}

/// A named workflow and the trigger that activates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub trigger: TriggerKind,
    #[serde(default)]
    pub conditions: TriggerConditions,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create a new active definition with no trigger conditions.
    pub fn new(name: impl Into<String>, trigger: TriggerKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            trigger,
            conditions: TriggerConditions::default(),
            active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the trigger conditions.
    pub fn with_conditions(mut self, conditions: TriggerConditions) -> Self {
        self.conditions = conditions;
        self
    }

    /// Only start when the entity moves into `stage`.
    pub fn when_entering(mut self, stage: impl Into<String>) -> Self {
        self.conditions.to_stage = Some(stage.into());
        self
    }

    /// Only start when the entity leaves `stage`.
    pub fn when_leaving(mut self, stage: impl Into<String>) -> Self {
        self.conditions.from_stage = Some(stage.into());
        self
    }

    /// Create the definition in the inactive state.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Whether `other` differs from this definition in anything but `active`.
    ///
    /// Once steps are attached only the `active` flag may change.
    pub fn is_reshaped_by(&self, other: &WorkflowDefinition) -> bool {
        self.name != other.name
            || self.trigger != other.trigger
            || self.conditions != other.conditions
    }
}
