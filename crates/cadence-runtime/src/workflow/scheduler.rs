use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;
use tokio_util::sync::CancellationToken;

use cadence_core::config::PollerConfig;
use cadence_core::workflow::ExecutionStore;
use cadence_core::Result;

use super::coordinator::{ExecutionCoordinator, ResumeOutcome};

/// Configuration for the delay poller.
#[derive(Debug, Clone)]
pub struct DelayPollerConfig {
    /// How often to look for due Delay steps.
    pub poll_interval: Duration,
    /// Maximum due steps handled per tick.
    pub batch_size: i64,
    /// Age after which a step still marked running is failed as interrupted.
    pub stale_after: Duration,
}

impl Default for DelayPollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 100,
            stale_after: Duration::from_secs(900),
        }
    }
}

impl From<&PollerConfig> for DelayPollerConfig {
    fn from(config: &PollerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            batch_size: config.batch_size,
            stale_after: config.stale_after(),
        }
    }
}

/// Counts from one poller tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Due Delay steps found.
    pub due: usize,
    /// Steps found stuck in running past `stale_after`.
    pub stale: usize,
    /// Executions resumed (including ones failed as interrupted).
    pub resumed: usize,
    /// Executions left alone: finished, not due or claimed elsewhere.
    pub skipped: usize,
    /// Resumes that returned an error.
    pub failed: usize,
}

/// Wakes executions whose Delay step has come due.
///
/// Nothing sleeps for the length of a delay: the wake time is persisted and
/// this poller hands due executions back to the coordinator. Executions with
/// a step stuck in running are handed back too, and the coordinator fails
/// them as interrupted.
pub struct DelayPoller {
    executions: Arc<dyn ExecutionStore>,
    coordinator: Arc<ExecutionCoordinator>,
    config: DelayPollerConfig,
}

impl DelayPoller {
    pub fn new(
        executions: Arc<dyn ExecutionStore>,
        coordinator: Arc<ExecutionCoordinator>,
        config: DelayPollerConfig,
    ) -> Self {
        Self {
            executions,
            coordinator,
            config,
        }
    }

    /// Run the poller until shutdown.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);

        tracing::info!(
            poll_interval = ?self.config.poll_interval,
            batch_size = self.config.batch_size,
            "Delay poller started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Failed to look up due delay steps");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Delay poller shutting down");
                    break;
                }
            }
        }
    }

    /// Resume every execution with a due Delay step or a stale running step.
    ///
    /// Only the lookups can fail the tick; a failing resume is logged and the
    /// remaining executions are still processed.
    pub async fn tick(&self) -> Result<TickReport> {
        let now = Utc::now();
        let due = self
            .executions
            .find_due_delay_steps(now, self.config.batch_size)
            .await?;

        let stale = match ChronoDuration::from_std(self.config.stale_after)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        {
            Some(cutoff) => {
                self.executions
                    .find_stale_running_steps(cutoff, self.config.batch_size)
                    .await?
            }
            None => Vec::new(),
        };

        let mut report = TickReport {
            due: due.len(),
            stale: stale.len(),
            ..Default::default()
        };
        if due.is_empty() && stale.is_empty() {
            return Ok(report);
        }
        tracing::debug!(
            due = due.len(),
            stale = stale.len(),
            "Processing delay and stale steps"
        );

        let mut seen = HashSet::new();
        for record in stale.iter().chain(due.iter()) {
            if seen.insert(record.execution_id) {
                self.resume_into(record.execution_id, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn resume_into(&self, execution_id: Uuid, report: &mut TickReport) {
        match self.coordinator.resume(execution_id).await {
            Ok(ResumeOutcome::Resumed(_)) | Ok(ResumeOutcome::Interrupted(_)) => {
                report.resumed += 1;
            }
            Ok(outcome) => {
                tracing::info!(
                    execution_id = %execution_id,
                    outcome = ?outcome,
                    "Skipped execution"
                );
                report.skipped += 1;
            }
            Err(e) => {
                tracing::error!(
                    execution_id = %execution_id,
                    error = %e,
                    "Failed to resume workflow"
                );
                report.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    use cadence_core::config::EngineConfig;
    use cadence_core::error::CadenceError;
    use cadence_core::testing::{
        MockEntityStore, MockNoteStore, MockNotificationTransport, MockTaskStore,
    };
    use cadence_core::workflow::{
        BoxFuture, Context, DefinitionStore, ExecutionStatus, StepKind, StepStatus, TriggerKind,
        WorkflowDefinition, WorkflowExecution, WorkflowStep, WorkflowStepExecution,
    };

    use crate::workflow::executor::StepExecutor;
    use crate::workflow::memory_store::{MemoryDefinitionStore, MemoryExecutionStore};
    use crate::workflow::registry::{ActionRegistry, Collaborators};

    /// Memory store that errors when claiming selected step executions.
    struct FlakyClaims {
        inner: Arc<MemoryExecutionStore>,
        broken: std::sync::RwLock<HashSet<Uuid>>,
    }

    impl ExecutionStore for FlakyClaims {
        fn create_execution<'a>(&'a self, e: &'a WorkflowExecution) -> BoxFuture<'a, Result<()>> {
            self.inner.create_execution(e)
        }

        fn get_execution(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowExecution>>> {
            self.inner.get_execution(id)
        }

        fn finish_execution<'a>(&'a self, e: &'a WorkflowExecution) -> BoxFuture<'a, Result<bool>> {
            self.inner.finish_execution(e)
        }

        fn create_step_execution<'a>(
            &'a self,
            r: &'a WorkflowStepExecution,
        ) -> BoxFuture<'a, Result<()>> {
            self.inner.create_step_execution(r)
        }

        fn update_step_execution<'a>(
            &'a self,
            r: &'a WorkflowStepExecution,
        ) -> BoxFuture<'a, Result<()>> {
            self.inner.update_step_execution(r)
        }

        fn list_step_executions(
            &self,
            execution_id: Uuid,
        ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
            self.inner.list_step_executions(execution_id)
        }

        fn claim_delay_step(&self, id: Uuid, now: DateTime<Utc>) -> BoxFuture<'_, Result<bool>> {
            if self.broken.read().unwrap().contains(&id) {
                return Box::pin(async move {
                    Err(CadenceError::Database(format!("claim of {} timed out", id)))
                });
            }
            self.inner.claim_delay_step(id, now)
        }

        fn find_due_delay_steps(
            &self,
            now: DateTime<Utc>,
            limit: i64,
        ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
            self.inner.find_due_delay_steps(now, limit)
        }

        fn find_stale_running_steps(
            &self,
            cutoff: DateTime<Utc>,
            limit: i64,
        ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
            self.inner.find_stale_running_steps(cutoff, limit)
        }
    }

    struct Harness {
        poller: DelayPoller,
        store: Arc<FlakyClaims>,
        coordinator: Arc<ExecutionCoordinator>,
        definitions: Arc<MemoryDefinitionStore>,
        tasks: Arc<MockTaskStore>,
    }

    fn harness() -> Harness {
        let definitions = Arc::new(MemoryDefinitionStore::new());
        let store = Arc::new(FlakyClaims {
            inner: Arc::new(MemoryExecutionStore::new()),
            broken: std::sync::RwLock::new(HashSet::new()),
        });
        let tasks = Arc::new(MockTaskStore::new());
        let transport = Arc::new(MockNotificationTransport::new());
        let collaborators = Collaborators::new(
            Arc::new(MockEntityStore::new()),
            tasks.clone(),
            Arc::new(MockNoteStore::new()),
            transport.clone(),
        );
        let executor = Arc::new(StepExecutor::new(
            Arc::new(ActionRegistry::with_builtin(&collaborators, "system")),
            transport,
        ));
        let coordinator = Arc::new(ExecutionCoordinator::new(
            definitions.clone(),
            store.clone(),
            executor,
            &EngineConfig::default(),
        ));
        let poller = DelayPoller::new(
            store.clone(),
            coordinator.clone(),
            DelayPollerConfig::default(),
        );

        Harness {
            poller,
            store,
            coordinator,
            definitions,
            tasks,
        }
    }

    async fn two_hour_workflow(h: &Harness) -> Uuid {
        let definition = WorkflowDefinition::new("Follow up", TriggerKind::EntityCreated);
        h.definitions.save_definition(&definition).await.unwrap();
        let steps = [
            WorkflowStep::new(definition.id, 1, "Wait", StepKind::Delay)
                .with("duration", 2)
                .with("unit", "hours"),
            WorkflowStep::new(definition.id, 2, "Follow up", StepKind::Action)
                .with("action", "CreateTask")
                .with("title", "Follow up with candidate"),
        ];
        for step in &steps {
            h.definitions.add_step(step).await.unwrap();
        }
        definition.id
    }

    /// Move the suspended step's wake time into the past, as if the delay elapsed.
    async fn elapse_delay(h: &Harness, execution_id: Uuid) -> Uuid {
        let mut pending = h.coordinator.history(execution_id).await.unwrap().remove(0);
        assert_eq!(pending.status, StepStatus::Pending);
        pending.scheduled_resume_at = Some(Utc::now() - ChronoDuration::minutes(1));
        h.store.update_step_execution(&pending).await.unwrap();
        pending.id
    }

    #[test]
    fn test_poller_config_default() {
        let config = DelayPollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.stale_after, Duration::from_secs(900));

        let from = DelayPollerConfig::from(&PollerConfig {
            poll_interval_secs: 0,
            ..Default::default()
        });
        assert_eq!(from.poll_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_tick_before_due_does_nothing() {
        let h = harness();
        let id = two_hour_workflow(&h).await;
        let execution = h.coordinator.start(id, Context::new()).await.unwrap();

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report, TickReport::default());

        let history = h.coordinator.history(execution.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, StepStatus::Pending);
        h.tasks.assert_count(0);
    }

    #[tokio::test]
    async fn test_tick_after_due_resumes_and_proceeds() {
        let h = harness();
        let id = two_hour_workflow(&h).await;
        let execution = h.coordinator.start(id, Context::new()).await.unwrap();
        elapse_delay(&h, execution.id).await;

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.resumed, 1);

        let stored = h.coordinator.status(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
        h.tasks.assert_created("Follow up with candidate");

        // Nothing left to do on the next tick.
        assert_eq!(h.poller.tick().await.unwrap().due, 0);
        h.tasks.assert_count(1);
    }

    #[tokio::test]
    async fn test_failing_resume_does_not_stop_tick() {
        let h = harness();
        let id = two_hour_workflow(&h).await;
        let first = h.coordinator.start(id, Context::new()).await.unwrap();
        let second = h.coordinator.start(id, Context::new()).await.unwrap();

        let broken = elapse_delay(&h, first.id).await;
        elapse_delay(&h, second.id).await;
        h.store.broken.write().unwrap().insert(broken);

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.resumed, 1);

        let first = h.coordinator.status(first.id).await.unwrap();
        let second = h.coordinator.status(second.id).await.unwrap();
        assert_eq!(first.status, ExecutionStatus::Running);
        assert_eq!(second.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_tick_fails_execution_with_stale_running_step() {
        let h = harness();
        let id = two_hour_workflow(&h).await;
        let steps = h.definitions.get_steps(id).await.unwrap();

        // A process died while running the first step.
        let execution = WorkflowExecution::new(id, Context::new());
        h.store.create_execution(&execution).await.unwrap();
        let mut orphan = WorkflowStepExecution::start(execution.id, &steps[1]);
        orphan.started_at = Utc::now() - ChronoDuration::hours(1);
        h.store.create_step_execution(&orphan).await.unwrap();

        let report = h.poller.tick().await.unwrap();
        assert_eq!(report.stale, 1);
        assert_eq!(report.resumed, 1);

        let stored = h.coordinator.status(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Failed);
        assert_eq!(
            stored.error.as_deref(),
            Some("step 'Follow up' failed: interrupted before completion")
        );
        let history = h.coordinator.history(execution.id).await.unwrap();
        assert_eq!(history[0].status, StepStatus::Failed);
        h.tasks.assert_count(0);

        assert_eq!(h.poller.tick().await.unwrap(), TickReport::default());
    }

    #[tokio::test]
    async fn test_tick_leaves_recent_running_step_alone() {
        let h = harness();
        let id = two_hour_workflow(&h).await;
        let steps = h.definitions.get_steps(id).await.unwrap();

        let execution = WorkflowExecution::new(id, Context::new());
        h.store.create_execution(&execution).await.unwrap();
        let in_flight = WorkflowStepExecution::start(execution.id, &steps[1]);
        h.store.create_step_execution(&in_flight).await.unwrap();

        assert_eq!(h.poller.tick().await.unwrap(), TickReport::default());
        let stored = h.coordinator.status(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let h = harness();
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), h.poller.run(shutdown))
            .await
            .unwrap();
    }
}
