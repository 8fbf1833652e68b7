use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CadenceError, Result};

/// Boxed future returned by collaborator methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Record store for the entities workflows run against (candidates, leads, ...).
///
/// Each call must be consistent on its own; the engine never batches writes.
pub trait EntityStore: Send + Sync {
    /// Load an entity snapshot. `Ok(None)` when the entity does not exist.
    fn get_entity(&self, entity_id: &str) -> BoxFuture<'_, Result<Option<Value>>>;

    /// Set the entity's status label.
    fn update_entity_status(&self, entity_id: &str, status: &str) -> BoxFuture<'_, Result<()>>;

    /// Assign the entity to an owner.
    fn assign_owner(&self, entity_id: &str, owner_id: &str) -> BoxFuture<'_, Result<()>>;
}

/// A task to create through the [`TaskStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<String>,
    pub related_entity_id: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Task store.
pub trait TaskStore: Send + Sync {
    /// Create a task and return its identifier.
    fn create_task(&self, task: NewTask) -> BoxFuture<'_, Result<String>>;
}

/// A note to attach to an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    pub entity_id: String,
    pub author_id: String,
    pub content: String,
    pub kind: String,
}

/// Note store.
pub trait NoteStore: Send + Sync {
    fn add_note(&self, note: NewNote) -> BoxFuture<'_, Result<()>>;
}

/// Delivery channel for a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Templated email.
    Email,
    /// In-app notification shown to a platform user.
    InApp,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::InApp => "in_app",
        }
    }
}

impl fmt::Display for NotificationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationChannel {
    type Err = CadenceError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "email" => Ok(Self::Email),
            "in_app" => Ok(Self::InApp),
            other => Err(CadenceError::Validation(format!(
                "unknown notification channel '{}'",
                other
            ))),
        }
    }
}

/// Outcome of a notification send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub success: bool,
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Notification and email transport.
///
/// Implementations report every problem through [`DeliveryResult`] rather
/// than an error or a panic.
pub trait NotificationTransport: Send + Sync {
    fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        data: &Value,
    ) -> BoxFuture<'_, DeliveryResult>;
}
