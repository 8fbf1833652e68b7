use std::sync::Arc;

use uuid::Uuid;

use cadence_core::workflow::{DefinitionStore, EntityStore, TriggerEvent, WorkflowExecution};
use cadence_core::Result;

use super::coordinator::ExecutionCoordinator;

/// What happened to one dispatched event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Active definitions whose conditions matched.
    pub matched: usize,
    /// Executions started, in definition order.
    pub started: Vec<WorkflowExecution>,
    /// Definitions that matched but could not be started.
    pub failed: Vec<(Uuid, String)>,
}

/// Turns domain events into workflow executions.
pub struct TriggerDispatcher {
    definitions: Arc<dyn DefinitionStore>,
    coordinator: Arc<ExecutionCoordinator>,
    entities: Option<Arc<dyn EntityStore>>,
}

impl TriggerDispatcher {
    /// Create a dispatcher. Without an entity store the initial context
    /// carries no entity snapshot.
    pub fn new(
        definitions: Arc<dyn DefinitionStore>,
        coordinator: Arc<ExecutionCoordinator>,
        entities: Option<Arc<dyn EntityStore>>,
    ) -> Self {
        Self {
            definitions,
            coordinator,
            entities,
        }
    }

    /// Start every active workflow whose trigger matches the event.
    ///
    /// Errors only when the definitions cannot be listed. A definition that
    /// fails to start is recorded in the report and the rest still start.
    pub async fn on_event(&self, event: &TriggerEvent) -> Result<DispatchReport> {
        let definitions = self.definitions.list_active_definitions(event.kind).await?;
        let mut report = DispatchReport::default();
        if definitions.is_empty() {
            tracing::debug!(trigger = %event.kind, "No active workflows for trigger");
            return Ok(report);
        }

        let context = event.to_context(self.load_entity(&event.entity_id).await);

        for definition in definitions {
            if !definition.conditions.matches(&context) {
                tracing::debug!(
                    workflow = %definition.name,
                    entity_id = %event.entity_id,
                    "Trigger conditions not met"
                );
                continue;
            }
            report.matched += 1;

            match self.coordinator.start(definition.id, context.clone()).await {
                Ok(execution) => report.started.push(execution),
                Err(e) => {
                    tracing::error!(
                        workflow = %definition.name,
                        workflow_id = %definition.id,
                        error = %e,
                        "Failed to start workflow"
                    );
                    report.failed.push((definition.id, e.to_string()));
                }
            }
        }

        tracing::info!(
            trigger = %event.kind,
            entity_id = %event.entity_id,
            matched = report.matched,
            started = report.started.len(),
            failed = report.failed.len(),
            "Dispatched trigger event"
        );
        Ok(report)
    }

    async fn load_entity(&self, entity_id: &str) -> Option<serde_json::Value> {
        let entities = self.entities.as_ref()?;
        match entities.get_entity(entity_id).await {
            Ok(entity) => entity,
            Err(e) => {
                tracing::warn!(
                    entity_id = %entity_id,
                    error = %e,
                    "Could not load entity snapshot"
                );
                None
            }
        }
    }
}
