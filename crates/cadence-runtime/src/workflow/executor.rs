use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use cadence_core::workflow::{
    expression, require_str, ActionKind, Context, DelaySpec, NotificationChannel,
    NotificationTransport, StepKind, StepOutcome, WorkflowStep,
};

use super::registry::ActionRegistry;

/// Runs exactly one step and reports its outcome.
///
/// Never returns an error: every problem, from bad configuration to a
/// collaborator outage, becomes a failed [`StepOutcome`].
pub struct StepExecutor {
    registry: Arc<ActionRegistry>,
    notifications: Arc<dyn NotificationTransport>,
}

impl StepExecutor {
    pub fn new(registry: Arc<ActionRegistry>, notifications: Arc<dyn NotificationTransport>) -> Self {
        Self {
            registry,
            notifications,
        }
    }

    pub async fn run_step(&self, step: &WorkflowStep, context: &Context) -> StepOutcome {
        let outcome = match step.kind {
            StepKind::Action => self.run_action(step, context).await,
            StepKind::Condition => Self::run_condition(step, context),
            StepKind::Delay => Self::run_delay(step),
            StepKind::Notification => self.run_notification(step, context).await,
        };

        if !outcome.success {
            tracing::debug!(
                step = %step.title,
                kind = %step.kind,
                error = outcome.error.as_deref().unwrap_or_default(),
                "Step failed"
            );
        }
        outcome
    }

    async fn run_action(&self, step: &WorkflowStep, context: &Context) -> StepOutcome {
        let kind = match require_str(&step.config, "action") {
            Ok(name) => match name.parse::<ActionKind>() {
                Ok(kind) => kind,
                Err(e) => return StepOutcome::failed(e.to_string()),
            },
            Err(e) => return StepOutcome::failed(e),
        };

        match self.registry.get(kind) {
            Some(handler) => handler.handle(&step.config, context).await,
            None => StepOutcome::failed(format!("no handler registered for action '{}'", kind)),
        }
    }

    fn run_condition(step: &WorkflowStep, context: &Context) -> StepOutcome {
        let expr = match require_str(&step.config, "expression") {
            Ok(expr) => expr,
            Err(e) => return StepOutcome::failed(e),
        };

        match expression::evaluate(expr, context) {
            Ok(result) => {
                StepOutcome::ok(json!({"expression": expr, "result": result})).with_continue(result)
            }
            Err(e) => StepOutcome::failed(e.to_string()),
        }
    }

    fn run_delay(step: &WorkflowStep) -> StepOutcome {
        match DelaySpec::from_config(&step.config) {
            Ok(spec) => {
                let resume_at = spec.wake_at(Utc::now());
                StepOutcome::ok(json!({
                    "duration": spec.amount,
                    "unit": spec.unit,
                    "resumeAt": resume_at,
                }))
                .suspended_until(resume_at)
            }
            Err(e) => StepOutcome::failed(e),
        }
    }

    async fn run_notification(&self, step: &WorkflowStep, context: &Context) -> StepOutcome {
        let (title, message) = match require_str(&step.config, "title")
            .and_then(|t| require_str(&step.config, "message").map(|m| (t, m)))
        {
            Ok(parts) => parts,
            Err(e) => return StepOutcome::failed(e),
        };

        let recipient = match require_str(&step.config, "recipient")
            .ok()
            .map(str::to_string)
            .or_else(|| context.actor_id())
        {
            Some(recipient) => recipient,
            None => {
                return StepOutcome::failed(
                    "notification has no 'recipient' and the context has no actor",
                )
            }
        };

        let payload = json!({
            "title": title,
            "message": message,
            "entityId": context.entity_id(),
        });
        let delivery = self
            .notifications
            .send(NotificationChannel::InApp, &recipient, &payload)
            .await;

        if delivery.success {
            StepOutcome::ok(json!({"recipient": recipient, "title": title}))
        } else {
            StepOutcome::failed(
                delivery
                    .error
                    .unwrap_or_else(|| format!("notification to '{}' was not delivered", recipient)),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::testing::{
        MockEntityStore, MockNoteStore, MockNotificationTransport, MockTaskStore,
    };
    use cadence_core::workflow::keys;
    use chrono::Duration;
    use uuid::Uuid;

    use crate::workflow::registry::Collaborators;

    struct Fixture {
        executor: StepExecutor,
        transport: Arc<MockNotificationTransport>,
        tasks: Arc<MockTaskStore>,
    }

    fn fixture() -> Fixture {
        let transport = Arc::new(MockNotificationTransport::new());
        let tasks = Arc::new(MockTaskStore::new());
        let collaborators = Collaborators::new(
            Arc::new(MockEntityStore::new()),
            tasks.clone(),
            Arc::new(MockNoteStore::new()),
            transport.clone(),
        );
        let registry = Arc::new(ActionRegistry::with_builtin(&collaborators, "system"));
        Fixture {
            executor: StepExecutor::new(registry, transport.clone()),
            transport,
            tasks,
        }
    }

    fn step(kind: StepKind) -> WorkflowStep {
        WorkflowStep::new(Uuid::new_v4(), 1, "step", kind)
    }

    #[tokio::test]
    async fn test_action_dispatches_to_handler() {
        let f = fixture();
        let step = step(StepKind::Action)
            .with("action", "CreateTask")
            .with("title", "Call candidate");

        let outcome = f.executor.run_step(&step, &Context::new()).await;

        assert!(outcome.success);
        f.tasks.assert_created("Call candidate");
    }

    #[tokio::test]
    async fn test_unknown_action_fails() {
        let f = fixture();
        let outcome = f
            .executor
            .run_step(&step(StepKind::Action).with("action", "LaunchRocket"), &Context::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error_message().contains("unknown action kind"));

        let outcome = f.executor.run_step(&step(StepKind::Action), &Context::new()).await;
        assert!(outcome.error_message().contains("'action'"));
    }

    #[tokio::test]
    async fn test_unregistered_action_fails() {
        let executor = StepExecutor::new(
            Arc::new(ActionRegistry::new()),
            Arc::new(MockNotificationTransport::new()),
        );
        let outcome = executor
            .run_step(&step(StepKind::Action).with("action", "add_note"), &Context::new())
            .await;
        assert!(outcome.error_message().contains("no handler registered"));
    }

    #[tokio::test]
    async fn test_condition_sets_should_continue() {
        let f = fixture();
        let ctx = Context::new().with("score", 90);

        let pass = f
            .executor
            .run_step(&step(StepKind::Condition).with("expression", "context.score > 80"), &ctx)
            .await;
        assert!(pass.success);
        assert!(pass.should_continue);

        let fail = f
            .executor
            .run_step(&step(StepKind::Condition).with("expression", "context.score > 95"), &ctx)
            .await;
        assert!(fail.success);
        assert!(!fail.should_continue);
        assert_eq!(fail.data.unwrap()["result"], false);
    }

    #[tokio::test]
    async fn test_unsafe_condition_fails_step() {
        let f = fixture();
        let outcome = f
            .executor
            .run_step(
                &step(StepKind::Condition).with("expression", "process.exit(1); true"),
                &Context::new(),
            )
            .await;
        assert!(!outcome.success);
        assert!(!outcome.should_continue);
        assert!(outcome.error_message().contains("disallowed character"));
    }

    #[tokio::test]
    async fn test_delay_reports_resume_time() {
        let f = fixture();
        let before = Utc::now();
        let outcome = f
            .executor
            .run_step(
                &step(StepKind::Delay).with("duration", 2).with("unit", "hours"),
                &Context::new(),
            )
            .await;

        assert!(outcome.success);
        assert!(outcome.should_continue);
        let resume_at = outcome.resume_at.unwrap();
        assert!(resume_at >= before + Duration::hours(2));
        assert!(resume_at <= Utc::now() + Duration::hours(2));
    }

    #[tokio::test]
    async fn test_invalid_delay_fails() {
        let f = fixture();
        let outcome = f
            .executor
            .run_step(&step(StepKind::Delay).with("duration", "abc"), &Context::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.resume_at.is_none());
    }

    #[tokio::test]
    async fn test_notification_falls_back_to_actor() {
        let f = fixture();
        let ctx = Context::new().with(keys::ACTOR_ID, "recruiter-1");
        let outcome = f
            .executor
            .run_step(
                &step(StepKind::Notification)
                    .with("title", "New candidate")
                    .with("message", "Ada applied"),
                &ctx,
            )
            .await;

        assert!(outcome.success);
        f.transport
            .assert_sent_with("recruiter-1", |data| data["title"] == "New candidate");
        assert_eq!(f.transport.sent()[0].channel, NotificationChannel::InApp);
    }

    #[tokio::test]
    async fn test_notification_validation() {
        let f = fixture();
        let outcome = f
            .executor
            .run_step(&step(StepKind::Notification).with("title", "x"), &Context::new())
            .await;
        assert!(outcome.error_message().contains("'message'"));

        let outcome = f
            .executor
            .run_step(
                &step(StepKind::Notification).with("title", "x").with("message", "y"),
                &Context::new(),
            )
            .await;
        assert!(outcome.error_message().contains("no 'recipient'"));
        f.transport.assert_nothing_sent();
    }

    #[tokio::test]
    async fn test_notification_transport_failure() {
        let f = fixture();
        f.transport.fail_with("queue full");
        let outcome = f
            .executor
            .run_step(
                &step(StepKind::Notification)
                    .with("title", "x")
                    .with("message", "y")
                    .with("recipient", "u1"),
                &Context::new(),
            )
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_message(), "queue full");
    }
}
