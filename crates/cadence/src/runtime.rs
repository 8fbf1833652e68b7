//! Cadence - workflow automation engine
//!
//! Wires the engine together from configuration:
//! - PostgreSQL definition and execution stores
//! - HTTP collaborators for the host platform
//! - Action registry, step executor and execution coordinator
//! - Trigger dispatcher and delay poller

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use cadence_core::config::CadenceConfig;
use cadence_core::error::{CadenceError, Result};
use cadence_core::workflow::{ActionHandler, ActionKind, DefinitionStore, ExecutionStore};
use cadence_runtime::migrations::{load_migrations_from_dir, Migration, MigrationRunner};
use cadence_runtime::workflow::{
    ActionRegistry, Collaborators, DelayPoller, DelayPollerConfig, ExecutionCoordinator,
    HttpCollaborators, PgDefinitionStore, PgExecutionStore, StepExecutor, TriggerDispatcher,
};
use cadence_runtime::Database;

/// Prelude module for common imports.
pub mod prelude {
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;

    pub use cadence_core::config::CadenceConfig;
    pub use cadence_core::error::{CadenceError, Result};
    pub use cadence_core::workflow::{
        ActionHandler, ActionKind, BoxFuture, Context, StepConfig, StepKind, StepOutcome,
        TriggerEvent, TriggerKind, WorkflowDefinition, WorkflowStep,
    };

    pub use crate::{Cadence, CadenceBuilder, Engine};
}

/// The assembled engine components.
pub struct Engine {
    definitions: Arc<dyn DefinitionStore>,
    coordinator: Arc<ExecutionCoordinator>,
    dispatcher: Arc<TriggerDispatcher>,
    poller: Arc<DelayPoller>,
}

impl Engine {
    /// Assemble the engine over the given stores and collaborators.
    ///
    /// `overrides` replace the built-in handler for their action kind.
    pub fn assemble(
        config: &CadenceConfig,
        definitions: Arc<dyn DefinitionStore>,
        executions: Arc<dyn ExecutionStore>,
        collaborators: &Collaborators,
        overrides: Vec<(ActionKind, Arc<dyn ActionHandler>)>,
    ) -> Self {
        let mut registry =
            ActionRegistry::with_builtin(collaborators, config.engine.system_actor_id.clone());
        for (kind, handler) in overrides {
            registry.register(kind, handler);
        }

        let executor = Arc::new(StepExecutor::new(
            Arc::new(registry),
            collaborators.notifications.clone(),
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            definitions.clone(),
            executions.clone(),
            executor,
            &config.engine,
        ));
        let dispatcher = Arc::new(TriggerDispatcher::new(
            definitions.clone(),
            coordinator.clone(),
            Some(collaborators.entities.clone()),
        ));
        let poller = Arc::new(DelayPoller::new(
            executions,
            coordinator.clone(),
            DelayPollerConfig::from(&config.poller),
        ));

        Self {
            definitions,
            coordinator,
            dispatcher,
            poller,
        }
    }

    pub fn definitions(&self) -> &Arc<dyn DefinitionStore> {
        &self.definitions
    }

    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    pub fn dispatcher(&self) -> &Arc<TriggerDispatcher> {
        &self.dispatcher
    }

    pub fn poller(&self) -> &Arc<DelayPoller> {
        &self.poller
    }
}

/// The Cadence runtime.
pub struct Cadence {
    config: CadenceConfig,
    migrations_dir: Option<PathBuf>,
    extra_migrations: Vec<Migration>,
    overrides: Vec<(ActionKind, Arc<dyn ActionHandler>)>,
}

impl Cadence {
    /// Create a new builder for configuring Cadence.
    pub fn builder() -> CadenceBuilder {
        CadenceBuilder::new()
    }

    pub fn config(&self) -> &CadenceConfig {
        &self.config
    }

    /// Connect to the database and the host platform and assemble the engine.
    pub async fn connect(&self) -> Result<(Database, Engine)> {
        let db = Database::from_config(&self.config.database).await?;
        let pool = db.pool().clone();

        let http = Arc::new(HttpCollaborators::new(&self.config.collaborators)?);
        let engine = Engine::assemble(
            &self.config,
            Arc::new(PgDefinitionStore::new(pool.clone())),
            Arc::new(PgExecutionStore::new(pool)),
            &Collaborators::shared(http),
            self.overrides.clone(),
        );

        tracing::info!(
            base_url = %self.config.collaborators.base_url,
            "Connected to database and collaborators"
        );
        Ok((db, engine))
    }

    /// Apply the built-in schema and any extra migrations.
    pub async fn migrate(&self, db: &Database) -> Result<Vec<String>> {
        let mut migrations = match &self.migrations_dir {
            Some(dir) => load_migrations_from_dir(dir)?,
            None => Vec::new(),
        };
        migrations.extend(self.extra_migrations.clone());

        let applied = MigrationRunner::new(db.pool().clone()).run(migrations).await?;
        for name in &applied {
            tracing::info!(migration = %name, "Migration applied");
        }
        Ok(applied)
    }

    /// Run the engine until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        tracing::info!(project = %self.config.project.name, "Cadence starting");

        let (db, engine) = self.connect().await?;
        self.migrate(&db).await?;

        let shutdown = CancellationToken::new();
        let poller_handle = if self.config.poller.enabled {
            let poller = engine.poller().clone();
            let token = shutdown.clone();
            Some(tokio::spawn(async move { poller.run(token).await }))
        } else {
            tracing::info!("Delay poller disabled");
            None
        };

        tracing::info!("Cadence started");

        tokio::signal::ctrl_c()
            .await
            .map_err(|e| CadenceError::Internal(format!("failed to listen for Ctrl-C: {}", e)))?;
        tracing::info!("Received shutdown signal");

        shutdown.cancel();
        if let Some(handle) = poller_handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Delay poller task ended abnormally");
            }
        }

        db.close().await;
        tracing::info!("Cadence stopped");
        Ok(())
    }
}

/// Builder for configuring the Cadence runtime.
#[derive(Default)]
pub struct CadenceBuilder {
    config: Option<CadenceConfig>,
    migrations_dir: Option<PathBuf>,
    extra_migrations: Vec<Migration>,
    overrides: Vec<(ActionKind, Arc<dyn ActionHandler>)>,
}

impl CadenceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    pub fn config(mut self, config: CadenceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Directory of extra `NNNN_name.sql` migrations.
    ///
    /// Defaults to `database.migrations_dir` from the configuration.
    pub fn migrations_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.migrations_dir = Some(path.into());
        self
    }

    /// Add a migration programmatically.
    pub fn migration(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.extra_migrations.push(Migration::new(name, sql));
        self
    }

    /// Replace the built-in handler for an action kind.
    pub fn action(mut self, kind: ActionKind, handler: Arc<dyn ActionHandler>) -> Self {
        self.overrides.push((kind, handler));
        self
    }

    /// Build the Cadence runtime.
    pub fn build(self) -> Result<Cadence> {
        let config = self
            .config
            .ok_or_else(|| CadenceError::Config("Configuration is required".to_string()))?;

        let migrations_dir = self
            .migrations_dir
            .or_else(|| config.database.migrations_dir.as_ref().map(PathBuf::from));

        Ok(Cadence {
            config,
            migrations_dir,
            extra_migrations: self.extra_migrations,
            overrides: self.overrides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::testing::{
        MockEntityStore, MockNoteStore, MockNotificationTransport, MockTaskStore,
    };
    use cadence_core::workflow::{
        BoxFuture, Context, StepConfig, StepKind, StepOutcome, TriggerEvent, TriggerKind,
        WorkflowDefinition, WorkflowStep,
    };
    use cadence_core::ExecutionStatus;
    use cadence_runtime::workflow::{MemoryDefinitionStore, MemoryExecutionStore};
    use serde_json::json;

    struct StaticTask;

    impl ActionHandler for StaticTask {
        fn handle<'a>(
            &'a self,
            _config: &'a StepConfig,
            _context: &'a Context,
        ) -> BoxFuture<'a, StepOutcome> {
            Box::pin(async { StepOutcome::ok(json!({"handledBy": "override"})) })
        }
    }

    fn collaborators(tasks: Arc<MockTaskStore>) -> Collaborators {
        Collaborators::new(
            Arc::new(MockEntityStore::new()),
            tasks,
            Arc::new(MockNoteStore::new()),
            Arc::new(MockNotificationTransport::new()),
        )
    }

    #[test]
    fn test_builder_requires_config() {
        assert!(CadenceBuilder::new().build().is_err());
    }

    #[test]
    fn test_builder_takes_migrations_dir_from_config() {
        let mut config = CadenceConfig::default_with_database_url("postgres://localhost/test");
        config.database.migrations_dir = Some("sql".into());

        let cadence = CadenceBuilder::new().config(config.clone()).build().unwrap();
        assert_eq!(cadence.migrations_dir, Some(PathBuf::from("sql")));

        let cadence = CadenceBuilder::new()
            .config(config)
            .migrations_dir("custom")
            .migration("0100_seed", "SELECT 1")
            .build()
            .unwrap();
        assert_eq!(cadence.migrations_dir, Some(PathBuf::from("custom")));
        assert_eq!(cadence.extra_migrations.len(), 1);
    }

    #[tokio::test]
    async fn test_assembled_engine_dispatches_events() {
        let config = CadenceConfig::default_with_database_url("postgres://localhost/test");
        let definitions = Arc::new(MemoryDefinitionStore::new());
        let tasks = Arc::new(MockTaskStore::new());
        let engine = Engine::assemble(
            &config,
            definitions.clone(),
            Arc::new(MemoryExecutionStore::new()),
            &collaborators(tasks.clone()),
            Vec::new(),
        );

        let definition = WorkflowDefinition::new("Welcome", TriggerKind::EntityCreated);
        definitions.save_definition(&definition).await.unwrap();
        definitions
            .add_step(
                &WorkflowStep::new(definition.id, 1, "Call", StepKind::Action)
                    .with("action", "create_task")
                    .with("title", "Welcome call"),
            )
            .await
            .unwrap();

        let report = engine
            .dispatcher()
            .on_event(&TriggerEvent::entity_created("cand-7"))
            .await
            .unwrap();

        assert_eq!(report.started.len(), 1);
        assert_eq!(report.started[0].status, ExecutionStatus::Completed);
        tasks.assert_created("Welcome call");
        assert_eq!(engine.poller().tick().await.unwrap().due, 0);
    }

    #[tokio::test]
    async fn test_override_replaces_builtin_handler() {
        let config = CadenceConfig::default_with_database_url("postgres://localhost/test");
        let definitions = Arc::new(MemoryDefinitionStore::new());
        let tasks = Arc::new(MockTaskStore::new());
        let engine = Engine::assemble(
            &config,
            definitions.clone(),
            Arc::new(MemoryExecutionStore::new()),
            &collaborators(tasks.clone()),
            vec![(ActionKind::CreateTask, Arc::new(StaticTask) as Arc<dyn ActionHandler>)],
        );

        let definition = WorkflowDefinition::new("Welcome", TriggerKind::EntityCreated);
        definitions.save_definition(&definition).await.unwrap();
        definitions
            .add_step(
                &WorkflowStep::new(definition.id, 1, "Call", StepKind::Action)
                    .with("action", "create_task")
                    .with("title", "Welcome call"),
            )
            .await
            .unwrap();

        let execution = engine
            .coordinator()
            .start(definition.id, Context::new())
            .await
            .unwrap();
        let history = engine.coordinator().history(execution.id).await.unwrap();

        assert_eq!(history[0].result, Some(json!({"handledBy": "override"})));
        tasks.assert_count(0);
    }
}
