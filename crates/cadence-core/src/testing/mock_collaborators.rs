//! Mock collaborators for testing workflow executions.
//!
//! Each mock records the calls it receives so tests can verify side effects
//! without a host platform. Failure toggles make a mock report errors the
//! way a real store or transport would.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{CadenceError, Result};
use crate::workflow::{
    BoxFuture, DeliveryResult, EntityStore, NewNote, NewTask, NoteStore, NotificationChannel,
    NotificationTransport, TaskStore,
};

/// Record of a write made through [`MockEntityStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntityWrite {
    Status { entity_id: String, status: String },
    Owner { entity_id: String, owner_id: String },
}

/// In-memory entity store.
///
/// # Example
///
/// ```ignore
/// let entities = MockEntityStore::new().with_entity("42", json!({"email": "ada@example.com"}));
/// // ... run a workflow ...
/// entities.assert_status("42", "contacted");
/// ```
#[derive(Default)]
pub struct MockEntityStore {
    entities: RwLock<HashMap<String, Value>>,
    writes: RwLock<Vec<EntityWrite>>,
    fail_writes: RwLock<Option<String>>,
}

impl MockEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an entity.
    pub fn with_entity(self, entity_id: impl Into<String>, entity: Value) -> Self {
        self.insert_entity(entity_id, entity);
        self
    }

    /// Seed an entity on a shared store.
    pub fn insert_entity(&self, entity_id: impl Into<String>, entity: Value) {
        self.entities
            .write()
            .unwrap()
            .insert(entity_id.into(), entity);
    }

    /// Make every following write fail with `message`.
    pub fn fail_writes(&self, message: impl Into<String>) {
        *self.fail_writes.write().unwrap() = Some(message.into());
    }

    pub fn entity(&self, entity_id: &str) -> Option<Value> {
        self.entities.read().unwrap().get(entity_id).cloned()
    }

    pub fn writes(&self) -> Vec<EntityWrite> {
        self.writes.read().unwrap().clone()
    }

    /// Assert that the entity's status was set to `status`.
    pub fn assert_status(&self, entity_id: &str, status: &str) {
        let writes = self.writes.read().unwrap();
        let found = writes.iter().any(|w| {
            matches!(w, EntityWrite::Status { entity_id: id, status: s } if id == entity_id && s == status)
        });
        assert!(
            found,
            "Expected entity '{}' to get status '{}'. Writes: {:?}",
            entity_id, status, *writes
        );
    }

    /// Assert that the entity was assigned to `owner_id`.
    pub fn assert_owner(&self, entity_id: &str, owner_id: &str) {
        let writes = self.writes.read().unwrap();
        let found = writes.iter().any(|w| {
            matches!(w, EntityWrite::Owner { entity_id: id, owner_id: o } if id == entity_id && o == owner_id)
        });
        assert!(
            found,
            "Expected entity '{}' to be assigned to '{}'. Writes: {:?}",
            entity_id, owner_id, *writes
        );
    }

    /// Assert that no writes happened.
    pub fn assert_untouched(&self) {
        let writes = self.writes.read().unwrap();
        assert!(writes.is_empty(), "Expected no entity writes, found {:?}", *writes);
    }

    fn record(&self, write: EntityWrite) -> Result<()> {
        if let Some(message) = self.fail_writes.read().unwrap().clone() {
            return Err(CadenceError::Collaborator(message));
        }

        let mut entities = self.entities.write().unwrap();
        match &write {
            EntityWrite::Status { entity_id, status } => {
                if let Some(Value::Object(fields)) = entities.get_mut(entity_id) {
                    fields.insert("status".into(), Value::String(status.clone()));
                }
            }
            EntityWrite::Owner {
                entity_id,
                owner_id,
            } => {
                if let Some(Value::Object(fields)) = entities.get_mut(entity_id) {
                    fields.insert("ownerId".into(), Value::String(owner_id.clone()));
                }
            }
        }
        drop(entities);

        self.writes.write().unwrap().push(write);
        Ok(())
    }
}

impl EntityStore for MockEntityStore {
    fn get_entity(&self, entity_id: &str) -> BoxFuture<'_, Result<Option<Value>>> {
        let entity = self.entity(entity_id);
        Box::pin(async move { Ok(entity) })
    }

    fn update_entity_status(&self, entity_id: &str, status: &str) -> BoxFuture<'_, Result<()>> {
        let result = self.record(EntityWrite::Status {
            entity_id: entity_id.to_string(),
            status: status.to_string(),
        });
        Box::pin(async move { result })
    }

    fn assign_owner(&self, entity_id: &str, owner_id: &str) -> BoxFuture<'_, Result<()>> {
        let result = self.record(EntityWrite::Owner {
            entity_id: entity_id.to_string(),
            owner_id: owner_id.to_string(),
        });
        Box::pin(async move { result })
    }
}

/// Record of a task created through [`MockTaskStore`].
#[derive(Debug, Clone)]
pub struct CreatedTask {
    pub id: String,
    pub task: NewTask,
    pub created_at: DateTime<Utc>,
}

/// Task store that hands out sequential ids (`task-1`, `task-2`, ...).
#[derive(Default)]
pub struct MockTaskStore {
    tasks: RwLock<Vec<CreatedTask>>,
    fail_with: RwLock<Option<String>>,
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.write().unwrap() = Some(message.into());
    }

    pub fn created_tasks(&self) -> Vec<CreatedTask> {
        self.tasks.read().unwrap().clone()
    }

    /// Assert that a task with `title` was created.
    pub fn assert_created(&self, title: &str) {
        let tasks = self.tasks.read().unwrap();
        assert!(
            tasks.iter().any(|t| t.task.title == title),
            "Expected task '{}' to be created. Created: {:?}",
            title,
            tasks.iter().map(|t| &t.task.title).collect::<Vec<_>>()
        );
    }

    /// Assert the number of tasks created.
    pub fn assert_count(&self, expected: usize) {
        let count = self.tasks.read().unwrap().len();
        assert_eq!(
            count, expected,
            "Expected {} tasks to be created, but found {}",
            expected, count
        );
    }
}

impl TaskStore for MockTaskStore {
    fn create_task(&self, task: NewTask) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Some(message) = self.fail_with.read().unwrap().clone() {
                return Err(CadenceError::Collaborator(message));
            }

            let mut tasks = self.tasks.write().unwrap();
            let id = format!("task-{}", tasks.len() + 1);
            tasks.push(CreatedTask {
                id: id.clone(),
                task,
                created_at: Utc::now(),
            });
            Ok(id)
        })
    }
}

/// Note store that keeps notes in memory.
#[derive(Default)]
pub struct MockNoteStore {
    notes: RwLock<Vec<NewNote>>,
}

impl MockNoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notes(&self) -> Vec<NewNote> {
        self.notes.read().unwrap().clone()
    }

    /// Assert that a note containing `text` was added to the entity.
    pub fn assert_note(&self, entity_id: &str, text: &str) {
        let notes = self.notes.read().unwrap();
        assert!(
            notes
                .iter()
                .any(|n| n.entity_id == entity_id && n.content.contains(text)),
            "Expected a note on '{}' containing '{}'. Notes: {:?}",
            entity_id,
            text,
            *notes
        );
    }
}

impl NoteStore for MockNoteStore {
    fn add_note(&self, note: NewNote) -> BoxFuture<'_, Result<()>> {
        self.notes.write().unwrap().push(note);
        Box::pin(async { Ok(()) })
    }
}

/// Record of a notification handed to [`MockNotificationTransport`].
#[derive(Debug, Clone)]
pub struct SentNotification {
    pub channel: NotificationChannel,
    pub recipient: String,
    pub data: Value,
    pub sent_at: DateTime<Utc>,
}

/// Notification transport that records every send.
///
/// # Example
///
/// ```ignore
/// let transport = MockNotificationTransport::new();
/// // ... run a workflow ...
/// transport.assert_send_count(1);
/// transport.assert_sent_with("ada@example.com", |data| data["template"] == "welcome");
/// ```
#[derive(Default)]
pub struct MockNotificationTransport {
    sent: RwLock<Vec<SentNotification>>,
    fail_with: RwLock<Option<String>>,
}

impl MockNotificationTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send report a delivery failure.
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.fail_with.write().unwrap() = Some(message.into());
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.read().unwrap().clone()
    }

    pub fn assert_sent_to(&self, recipient: &str) {
        let sent = self.sent.read().unwrap();
        assert!(
            sent.iter().any(|n| n.recipient == recipient),
            "Expected a notification to '{}'. Recipients: {:?}",
            recipient,
            sent.iter().map(|n| &n.recipient).collect::<Vec<_>>()
        );
    }

    pub fn assert_sent_with<F>(&self, recipient: &str, predicate: F)
    where
        F: Fn(&Value) -> bool,
    {
        let sent = self.sent.read().unwrap();
        assert!(
            sent.iter()
                .any(|n| n.recipient == recipient && predicate(&n.data)),
            "Expected a notification to '{}' with matching data",
            recipient
        );
    }

    pub fn assert_send_count(&self, expected: usize) {
        let count = self.sent.read().unwrap().len();
        assert_eq!(
            count, expected,
            "Expected {} notifications, but found {}",
            expected, count
        );
    }

    pub fn assert_nothing_sent(&self) {
        self.assert_send_count(0);
    }
}

impl NotificationTransport for MockNotificationTransport {
    fn send(
        &self,
        channel: NotificationChannel,
        recipient: &str,
        data: &Value,
    ) -> BoxFuture<'_, DeliveryResult> {
        let notification = SentNotification {
            channel,
            recipient: recipient.to_string(),
            data: data.clone(),
            sent_at: Utc::now(),
        };

        Box::pin(async move {
            if let Some(message) = self.fail_with.read().unwrap().clone() {
                return DeliveryResult::failed(message);
            }
            self.sent.write().unwrap().push(notification);
            DeliveryResult::delivered()
        })
    }
}
