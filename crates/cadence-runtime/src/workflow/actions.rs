//! Built-in action handlers.
//!
//! Every handler reads and validates its whole configuration first and only
//! then writes through its collaborator, so a misconfigured step never leaves
//! a partial side effect behind.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use cadence_core::workflow::{
    optional_str, require_str, ActionHandler, BoxFuture, Context, EntityStore, NewNote, NewTask,
    NoteStore, NotificationChannel, NotificationTransport, StepConfig, StepOutcome, TaskStore,
};

const DEFAULT_TEMPLATE: &str = "generic";
const DEFAULT_NOTE_KIND: &str = "general";

fn require_entity_id(context: &Context) -> Result<String, String> {
    context
        .entity_id()
        .ok_or_else(|| "context is missing 'entityId'".to_string())
}

/// How a notification finds its recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    /// The `email` field of the context entity.
    EntityEmail,
    /// A fixed recipient from the step configuration.
    Explicit(String),
}

impl Target {
    fn from_config(config: &StepConfig) -> Result<Self, String> {
        match require_str(config, "target")? {
            "entity_email" => Ok(Self::EntityEmail),
            "explicit" => require_str(config, "recipient").map(|r| Self::Explicit(r.to_string())),
            other => Err(format!(
                "unknown notification target '{}', expected 'entity_email' or 'explicit'",
                other
            )),
        }
    }
}

/// Sends a templated email.
pub struct SendNotificationHandler {
    entities: Arc<dyn EntityStore>,
    transport: Arc<dyn NotificationTransport>,
}

impl SendNotificationHandler {
    pub fn new(entities: Arc<dyn EntityStore>, transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            entities,
            transport,
        }
    }

    async fn resolve_recipient(&self, target: Target, context: &Context) -> Result<String, String> {
        let entity_id = match target {
            Target::Explicit(recipient) => return Ok(recipient),
            Target::EntityEmail => require_entity_id(context)?,
        };

        let entity = self
            .entities
            .get_entity(&entity_id)
            .await
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("entity '{}' not found", entity_id))?;

        entity
            .get("email")
            .and_then(Value::as_str)
            .filter(|email| !email.trim().is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("entity '{}' has no email address", entity_id))
    }

    async fn run(&self, config: &StepConfig, context: &Context) -> Result<StepOutcome, String> {
        let target = Target::from_config(config)?;
        let template = optional_str(config, "template").unwrap_or(DEFAULT_TEMPLATE);
        let data = config.get("data").cloned().unwrap_or(Value::Null);

        let recipient = self.resolve_recipient(target, context).await?;
        let payload = json!({
            "template": template,
            "data": data,
            "entityId": context.entity_id(),
        });

        let delivery = self
            .transport
            .send(NotificationChannel::Email, &recipient, &payload)
            .await;
        if !delivery.success {
            return Err(delivery
                .error
                .unwrap_or_else(|| format!("delivery to '{}' failed", recipient)));
        }

        Ok(StepOutcome::ok(json!({
            "recipient": recipient,
            "template": template,
        })))
    }
}

impl ActionHandler for SendNotificationHandler {
    fn handle<'a>(
        &'a self,
        config: &'a StepConfig,
        context: &'a Context,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            self.run(config, context)
                .await
                .unwrap_or_else(StepOutcome::failed)
        })
    }
}

/// Sets the status label of the context entity.
pub struct UpdateEntityStatusHandler {
    entities: Arc<dyn EntityStore>,
}

impl UpdateEntityStatusHandler {
    pub fn new(entities: Arc<dyn EntityStore>) -> Self {
        Self { entities }
    }
}

impl ActionHandler for UpdateEntityStatusHandler {
    fn handle<'a>(
        &'a self,
        config: &'a StepConfig,
        context: &'a Context,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let (entity_id, status) = match require_entity_id(context)
                .and_then(|id| require_str(config, "status").map(|s| (id, s)))
            {
                Ok(valid) => valid,
                Err(e) => return StepOutcome::failed(e),
            };

            match self.entities.update_entity_status(&entity_id, status).await {
                Ok(()) => StepOutcome::ok(json!({"entityId": entity_id, "status": status}))
                    .with_update("entityStatus", status),
                Err(e) => StepOutcome::failed(e.to_string()),
            }
        })
    }
}

/// Assigns the context entity to an owner.
pub struct AssignOwnerHandler {
    entities: Arc<dyn EntityStore>,
}

impl AssignOwnerHandler {
    pub fn new(entities: Arc<dyn EntityStore>) -> Self {
        Self { entities }
    }
}

impl ActionHandler for AssignOwnerHandler {
    fn handle<'a>(
        &'a self,
        config: &'a StepConfig,
        context: &'a Context,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let (entity_id, owner_id) = match require_entity_id(context)
                .and_then(|id| require_str(config, "ownerId").map(|o| (id, o)))
            {
                Ok(valid) => valid,
                Err(e) => return StepOutcome::failed(e),
            };

            match self.entities.assign_owner(&entity_id, owner_id).await {
                Ok(()) => StepOutcome::ok(json!({"entityId": entity_id, "ownerId": owner_id}))
                    .with_update("ownerId", owner_id),
                Err(e) => StepOutcome::failed(e.to_string()),
            }
        })
    }
}

/// Creates a follow-up task related to the context entity.
pub struct CreateTaskHandler {
    tasks: Arc<dyn TaskStore>,
}

impl CreateTaskHandler {
    pub fn new(tasks: Arc<dyn TaskStore>) -> Self {
        Self { tasks }
    }

    fn build_task(config: &StepConfig, context: &Context) -> Result<NewTask, String> {
        let title = require_str(config, "title")?;
        let due_in_days = match config.get("dueInDays") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => Some(
                n.as_i64()
                    .filter(|d| (0..=3650).contains(d))
                    .ok_or_else(|| {
                        format!(
                            "'dueInDays' must be a whole number of days between 0 and 3650, got {}",
                            n
                        )
                    })?,
            ),
            Some(other) => return Err(format!("'dueInDays' must be a number, got {}", other)),
        };

        Ok(NewTask {
            title: title.to_string(),
            description: optional_str(config, "description").map(str::to_string),
            assignee_id: optional_str(config, "assigneeId")
                .map(str::to_string)
                .or_else(|| context.actor_id()),
            related_entity_id: context.entity_id(),
            due_date: due_in_days.map(|days| Utc::now() + Duration::days(days)),
        })
    }
}

impl ActionHandler for CreateTaskHandler {
    fn handle<'a>(
        &'a self,
        config: &'a StepConfig,
        context: &'a Context,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let task = match Self::build_task(config, context) {
                Ok(task) => task,
                Err(e) => return StepOutcome::failed(e),
            };
            let title = task.title.clone();

            match self.tasks.create_task(task).await {
                Ok(task_id) => StepOutcome::ok(json!({"taskId": task_id, "title": title}))
                    .with_update("taskId", task_id),
                Err(e) => StepOutcome::failed(e.to_string()),
            }
        })
    }
}

/// Attaches a note to the context entity.
pub struct AddNoteHandler {
    notes: Arc<dyn NoteStore>,
    system_actor_id: String,
}

impl AddNoteHandler {
    pub fn new(notes: Arc<dyn NoteStore>, system_actor_id: impl Into<String>) -> Self {
        Self {
            notes,
            system_actor_id: system_actor_id.into(),
        }
    }

    fn build_note(&self, config: &StepConfig, context: &Context) -> Result<NewNote, String> {
        let content = require_str(config, "content")?;
        let entity_id = require_entity_id(context)?;

        Ok(NewNote {
            entity_id,
            author_id: context
                .actor_id()
                .unwrap_or_else(|| self.system_actor_id.clone()),
            content: content.to_string(),
            kind: optional_str(config, "kind")
                .unwrap_or(DEFAULT_NOTE_KIND)
                .to_string(),
        })
    }
}

impl ActionHandler for AddNoteHandler {
    fn handle<'a>(
        &'a self,
        config: &'a StepConfig,
        context: &'a Context,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let note = match self.build_note(config, context) {
                Ok(note) => note,
                Err(e) => return StepOutcome::failed(e),
            };
            let summary = json!({
                "entityId": note.entity_id,
                "authorId": note.author_id,
                "kind": note.kind,
            });

            match self.notes.add_note(note).await {
                Ok(()) => StepOutcome::ok(summary),
                Err(e) => StepOutcome::failed(e.to_string()),
            }
        })
    }
}
