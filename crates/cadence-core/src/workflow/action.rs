use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::collaborators::BoxFuture;
use super::context::Context;
use super::step::{StepConfig, StepOutcome};
use crate::error::CadenceError;

/// Kinds of side effect an Action step can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendNotification,
    UpdateEntityStatus,
    AssignOwner,
    CreateTask,
    AddNote,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        Self::SendNotification,
        Self::UpdateEntityStatus,
        Self::AssignOwner,
        Self::CreateTask,
        Self::AddNote,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendNotification => "send_notification",
            Self::UpdateEntityStatus => "update_entity_status",
            Self::AssignOwner => "assign_owner",
            Self::CreateTask => "create_task",
            Self::AddNote => "add_note",
        }
    }

    fn pascal_name(&self) -> &'static str {
        match self {
            Self::SendNotification => "SendNotification",
            Self::UpdateEntityStatus => "UpdateEntityStatus",
            Self::AssignOwner => "AssignOwner",
            Self::CreateTask => "CreateTask",
            Self::AddNote => "AddNote",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = CadenceError;

    /// Accepts `snake_case` and `PascalCase` names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s || kind.pascal_name() == s)
            .ok_or_else(|| CadenceError::Validation(format!("unknown action kind '{}'", s)))
    }
}

/// Performs one kind of action.
///
/// Handlers validate their configuration before any write and report every
/// problem through [`StepOutcome::failed`].
pub trait ActionHandler: Send + Sync {
    fn handle<'a>(&'a self, config: &'a StepConfig, context: &'a Context)
        -> BoxFuture<'a, StepOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_parse() {
        assert_eq!(
            "CreateTask".parse::<ActionKind>().unwrap(),
            ActionKind::CreateTask
        );
        assert_eq!(
            "update_entity_status".parse::<ActionKind>().unwrap(),
            ActionKind::UpdateEntityStatus
        );
        assert!("DeleteEverything".parse::<ActionKind>().is_err());
        assert!("create-task".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_as_str_round_trip() {
        for kind in ActionKind::ALL {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
    }
}
