use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use cadence_core::workflow::{
    BoxFuture, Context, DefinitionStore, ExecutionStore, TriggerConditions, TriggerKind,
    WorkflowDefinition, WorkflowExecution, WorkflowStep, WorkflowStepExecution,
};
use cadence_core::{CadenceError, Result};

const STEP_EXECUTION_COLUMNS: &str = r#"
    se.id, se.execution_id, se.step_id, se.step_order, se.step_title, se.status,
    se.result, se.context_updates, se.error, se.started_at, se.completed_at,
    se.scheduled_resume_at
"#;

fn db_err(e: sqlx::Error) -> CadenceError {
    CadenceError::Database(e.to_string())
}

fn object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn definition_from_row(row: &PgRow) -> Result<WorkflowDefinition> {
    let conditions: Option<Value> = row.get("conditions");
    let conditions = match conditions {
        Some(value) => serde_json::from_value(value)?,
        None => TriggerConditions::default(),
    };

    Ok(WorkflowDefinition {
        id: row.get("id"),
        name: row.get("name"),
        trigger: row.get::<String, _>("trigger_kind").parse()?,
        conditions,
        active: row.get("active"),
        created_at: row.get("created_at"),
    })
}

fn step_from_row(row: &PgRow) -> Result<WorkflowStep> {
    Ok(WorkflowStep {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        order: row.get("step_order"),
        title: row.get("title"),
        kind: row.get::<String, _>("kind").parse()?,
        config: object(row.get("config")),
    })
}

fn execution_from_row(row: &PgRow) -> Result<WorkflowExecution> {
    Ok(WorkflowExecution {
        id: row.get("id"),
        workflow_id: row.get("workflow_id"),
        status: row.get::<String, _>("status").parse()?,
        context: Context::from_value(row.get("context")),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        error: row.get("error"),
    })
}

fn step_execution_from_row(row: &PgRow) -> Result<WorkflowStepExecution> {
    Ok(WorkflowStepExecution {
        id: row.get("id"),
        execution_id: row.get("execution_id"),
        step_id: row.get("step_id"),
        step_order: row.get("step_order"),
        step_title: row.get("step_title"),
        status: row.get::<String, _>("status").parse()?,
        result: row.get("result"),
        context_updates: object(row.get("context_updates")),
        error: row.get("error"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        scheduled_resume_at: row.get("scheduled_resume_at"),
    })
}

/// Workflow definitions stored in `cadence_workflows` and `cadence_workflow_steps`.
pub struct PgDefinitionStore {
    pool: PgPool,
}

impl PgDefinitionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl DefinitionStore for PgDefinitionStore {
    fn list_active_definitions(
        &self,
        trigger: TriggerKind,
    ) -> BoxFuture<'_, Result<Vec<WorkflowDefinition>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT id, name, trigger_kind, conditions, active, created_at
                FROM cadence_workflows
                WHERE trigger_kind = $1 AND active = TRUE
                ORDER BY created_at ASC
                "#,
            )
            .bind(trigger.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            rows.iter().map(definition_from_row).collect()
        })
    }

    fn get_definition(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowDefinition>>> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                SELECT id, name, trigger_kind, conditions, active, created_at
                FROM cadence_workflows
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.as_ref().map(definition_from_row).transpose()
        })
    }

    fn get_steps(&self, workflow_id: Uuid) -> BoxFuture<'_, Result<Vec<WorkflowStep>>> {
        Box::pin(async move {
            let rows = sqlx::query(
                r#"
                SELECT id, workflow_id, step_order, title, kind, config
                FROM cadence_workflow_steps
                WHERE workflow_id = $1
                ORDER BY step_order ASC
                "#,
            )
            .bind(workflow_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            rows.iter().map(step_from_row).collect()
        })
    }

    fn save_definition<'a>(
        &'a self,
        definition: &'a WorkflowDefinition,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let conditions = serde_json::to_value(&definition.conditions)?;

            let result = sqlx::query(
                r#"
                INSERT INTO cadence_workflows (id, name, trigger_kind, conditions, active, created_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    name = EXCLUDED.name,
                    trigger_kind = EXCLUDED.trigger_kind,
                    conditions = EXCLUDED.conditions,
                    active = EXCLUDED.active
                WHERE NOT EXISTS (
                        SELECT 1 FROM cadence_workflow_steps s
                        WHERE s.workflow_id = cadence_workflows.id
                    )
                   OR (cadence_workflows.name = EXCLUDED.name
                       AND cadence_workflows.trigger_kind = EXCLUDED.trigger_kind
                       AND cadence_workflows.conditions = EXCLUDED.conditions)
                "#,
            )
            .bind(definition.id)
            .bind(&definition.name)
            .bind(definition.trigger.as_str())
            .bind(&conditions)
            .bind(definition.active)
            .bind(definition.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(CadenceError::Validation(format!(
                    "workflow {} has steps; only 'active' can change",
                    definition.id
                )));
            }

            tracing::debug!(workflow_id = %definition.id, name = %definition.name, "Saved workflow");
            Ok(())
        })
    }

    fn add_step<'a>(&'a self, step: &'a WorkflowStep) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                INSERT INTO cadence_workflow_steps (id, workflow_id, step_order, title, kind, config)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(step.id)
            .bind(step.workflow_id)
            .bind(step.order)
            .bind(&step.title)
            .bind(step.kind.as_str())
            .bind(Value::Object(step.config.clone()))
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    Err(CadenceError::Validation(format!(
                        "workflow {} already has a step at order {}",
                        step.workflow_id, step.order
                    )))
                }
                Err(sqlx::Error::Database(e)) if e.is_foreign_key_violation() => {
                    Err(CadenceError::NotFound(format!("workflow {}", step.workflow_id)))
                }
                Err(e) => Err(db_err(e)),
            }
        })
    }

    fn set_active(&self, id: Uuid, active: bool) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let result = sqlx::query("UPDATE cadence_workflows SET active = $2 WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(CadenceError::NotFound(format!("workflow {}", id)));
            }
            Ok(())
        })
    }
}

/// Execution history stored in `cadence_executions` and `cadence_step_executions`.
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ExecutionStore for PgExecutionStore {
    fn create_execution<'a>(
        &'a self,
        execution: &'a WorkflowExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO cadence_executions (
                    id, workflow_id, status, context, started_at, completed_at, error
                ) VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(execution.id)
            .bind(execution.workflow_id)
            .bind(execution.status.as_str())
            .bind(execution.context.to_value())
            .bind(execution.started_at)
            .bind(execution.completed_at)
            .bind(&execution.error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(())
        })
    }

    fn get_execution(&self, id: Uuid) -> BoxFuture<'_, Result<Option<WorkflowExecution>>> {
        Box::pin(async move {
            let row = sqlx::query(
                r#"
                SELECT id, workflow_id, status, context, started_at, completed_at, error
                FROM cadence_executions
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            row.as_ref().map(execution_from_row).transpose()
        })
    }

    fn finish_execution<'a>(
        &'a self,
        execution: &'a WorkflowExecution,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            // Terminal rows are never rewritten.
            let result = sqlx::query(
                r#"
                UPDATE cadence_executions
                SET status = $2, completed_at = $3, error = $4
                WHERE id = $1 AND status = 'running'
                "#,
            )
            .bind(execution.id)
            .bind(execution.status.as_str())
            .bind(execution.completed_at)
            .bind(&execution.error)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn create_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            sqlx::query(
                r#"
                INSERT INTO cadence_step_executions (
                    id, execution_id, step_id, step_order, step_title, status,
                    result, context_updates, error, started_at, completed_at,
                    scheduled_resume_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(record.id)
            .bind(record.execution_id)
            .bind(record.step_id)
            .bind(record.step_order)
            .bind(&record.step_title)
            .bind(record.status.as_str())
            .bind(&record.result)
            .bind(Value::Object(record.context_updates.clone()))
            .bind(&record.error)
            .bind(record.started_at)
            .bind(record.completed_at)
            .bind(record.scheduled_resume_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(())
        })
    }

    fn update_step_execution<'a>(
        &'a self,
        record: &'a WorkflowStepExecution,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE cadence_step_executions
                SET status = $2, result = $3, context_updates = $4, error = $5,
                    completed_at = $6, scheduled_resume_at = $7
                WHERE id = $1
                "#,
            )
            .bind(record.id)
            .bind(record.status.as_str())
            .bind(&record.result)
            .bind(Value::Object(record.context_updates.clone()))
            .bind(&record.error)
            .bind(record.completed_at)
            .bind(record.scheduled_resume_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(CadenceError::NotFound(format!("step execution {}", record.id)));
            }
            Ok(())
        })
    }

    fn list_step_executions(
        &self,
        execution_id: Uuid,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let sql = format!(
                r#"
                SELECT {}
                FROM cadence_step_executions se
                WHERE se.execution_id = $1
                ORDER BY se.step_order ASC, se.started_at ASC
                "#,
                STEP_EXECUTION_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(execution_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            rows.iter().map(step_execution_from_row).collect()
        })
    }

    fn claim_delay_step(&self, id: Uuid, now: DateTime<Utc>) -> BoxFuture<'_, Result<bool>> {
        Box::pin(async move {
            let result = sqlx::query(
                r#"
                UPDATE cadence_step_executions
                SET status = 'completed', completed_at = $2
                WHERE id = $1
                  AND status = 'pending'
                  AND scheduled_resume_at <= $2
                "#,
            )
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            Ok(result.rows_affected() == 1)
        })
    }

    fn find_due_delay_steps(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let sql = format!(
                r#"
                SELECT {}
                FROM cadence_step_executions se
                JOIN cadence_executions e ON e.id = se.execution_id
                WHERE se.status = 'pending'
                  AND se.scheduled_resume_at <= $1
                  AND e.status = 'running'
                ORDER BY se.scheduled_resume_at ASC
                LIMIT $2
                "#,
                STEP_EXECUTION_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(now)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            rows.iter().map(step_execution_from_row).collect()
        })
    }

    fn find_stale_running_steps(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> BoxFuture<'_, Result<Vec<WorkflowStepExecution>>> {
        Box::pin(async move {
            let sql = format!(
                r#"
                SELECT {}
                FROM cadence_step_executions se
                JOIN cadence_executions e ON e.id = se.execution_id
                WHERE se.status = 'running'
                  AND se.started_at <= $1
                  AND e.status = 'running'
                ORDER BY se.started_at ASC
                LIMIT $2
                "#,
                STEP_EXECUTION_COLUMNS
            );
            let rows = sqlx::query(&sql)
                .bind(cutoff)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

            rows.iter().map(step_execution_from_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_ignores_non_objects() {
        assert!(object(None).is_empty());
        assert!(object(Some(json!([1, 2]))).is_empty());
        assert!(object(Some(Value::Null)).is_empty());

        let map = object(Some(json!({"taskId": "t-1"})));
        assert_eq!(map["taskId"], "t-1");
    }

    #[test]
    fn test_step_columns_are_qualified() {
        for column in STEP_EXECUTION_COLUMNS.split(',') {
            assert!(column.trim().starts_with("se."), "unqualified column {}", column);
        }
    }
}
