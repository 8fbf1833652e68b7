use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::workflow::{
    ActionHandler, ActionKind, EntityStore, NoteStore, NotificationTransport, TaskStore,
};

use super::actions::{
    AddNoteHandler, AssignOwnerHandler, CreateTaskHandler, SendNotificationHandler,
    UpdateEntityStatusHandler,
};

/// Host platform services the built-in handlers write through.
#[derive(Clone)]
pub struct Collaborators {
    pub entities: Arc<dyn EntityStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub notes: Arc<dyn NoteStore>,
    pub notifications: Arc<dyn NotificationTransport>,
}

impl Collaborators {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        tasks: Arc<dyn TaskStore>,
        notes: Arc<dyn NoteStore>,
        notifications: Arc<dyn NotificationTransport>,
    ) -> Self {
        Self {
            entities,
            tasks,
            notes,
            notifications,
        }
    }

    /// Use one service for every contract.
    pub fn shared<T>(service: Arc<T>) -> Self
    where
        T: EntityStore + TaskStore + NoteStore + NotificationTransport + 'static,
    {
        Self {
            entities: service.clone(),
            tasks: service.clone(),
            notes: service.clone(),
            notifications: service,
        }
    }
}

/// Maps each action kind to the handler that performs it.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with a built-in handler for every action kind.
    ///
    /// `system_actor_id` authors notes when an event has no acting user.
    pub fn with_builtin(collaborators: &Collaborators, system_actor_id: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(
            ActionKind::SendNotification,
            Arc::new(SendNotificationHandler::new(
                collaborators.entities.clone(),
                collaborators.notifications.clone(),
            )),
        );
        registry.register(
            ActionKind::UpdateEntityStatus,
            Arc::new(UpdateEntityStatusHandler::new(collaborators.entities.clone())),
        );
        registry.register(
            ActionKind::AssignOwner,
            Arc::new(AssignOwnerHandler::new(collaborators.entities.clone())),
        );
        registry.register(
            ActionKind::CreateTask,
            Arc::new(CreateTaskHandler::new(collaborators.tasks.clone())),
        );
        registry.register(
            ActionKind::AddNote,
            Arc::new(AddNoteHandler::new(
                collaborators.notes.clone(),
                system_actor_id,
            )),
        );
        registry
    }

    /// Register a handler, replacing any existing one for `kind`.
    pub fn register(&mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) {
        if self.handlers.insert(kind, handler).is_some() {
            tracing::debug!(action = %kind, "Replaced action handler");
        }
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&kind)
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::testing::{
        MockEntityStore, MockNoteStore, MockNotificationTransport, MockTaskStore,
    };
    use cadence_core::workflow::{BoxFuture, Context, StepConfig, StepOutcome};
    use serde_json::json;

    struct FixedHandler;

    impl ActionHandler for FixedHandler {
        fn handle<'a>(
            &'a self,
            _config: &'a StepConfig,
            _context: &'a Context,
        ) -> BoxFuture<'a, StepOutcome> {
            Box::pin(async { StepOutcome::ok(json!({"custom": true})) })
        }
    }

    fn collaborators() -> Collaborators {
        Collaborators::new(
            Arc::new(MockEntityStore::new()),
            Arc::new(MockTaskStore::new()),
            Arc::new(MockNoteStore::new()),
            Arc::new(MockNotificationTransport::new()),
        )
    }

    #[test]
    fn test_builtin_covers_every_kind() {
        let registry = ActionRegistry::with_builtin(&collaborators(), "system");
        assert_eq!(registry.len(), ActionKind::ALL.len());
        for kind in ActionKind::ALL {
            assert!(registry.contains(kind), "missing handler for {}", kind);
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = ActionRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(ActionKind::AddNote).is_none());
    }

    #[tokio::test]
    async fn test_register_replaces_builtin() {
        let mut registry = ActionRegistry::with_builtin(&collaborators(), "system");
        registry.register(ActionKind::CreateTask, Arc::new(FixedHandler));

        let handler = registry.get(ActionKind::CreateTask).unwrap();
        let outcome = handler.handle(&StepConfig::new(), &Context::new()).await;
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!({"custom": true})));
        assert_eq!(registry.len(), ActionKind::ALL.len());
    }
}
