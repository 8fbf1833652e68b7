//! Built-in schema, embedded from `migrations/` at the crate root and tracked
//! in `cadence_migrations` like any other migration.

use super::runner::Migration;

const CADENCE_INTERNAL_SQL: &str = include_str!("../../migrations/0000_cadence_internal.sql");

/// Built-in migrations, applied before any extra ones.
pub fn builtin_migrations() -> Vec<Migration> {
    vec![Migration::new("0000_cadence_internal", CADENCE_INTERNAL_SQL)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_migrations() {
        let migrations = builtin_migrations();
        assert_eq!(migrations.len(), 1);
        assert_eq!(migrations[0].name, "0000_cadence_internal");
    }

    #[test]
    fn test_schema_defines_all_tables() {
        let sql = &builtin_migrations()[0].sql;

        assert!(sql.contains("CREATE TABLE IF NOT EXISTS cadence_workflows"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS cadence_workflow_steps"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS cadence_executions"));
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS cadence_step_executions"));
        assert!(sql.contains("UNIQUE (workflow_id, step_order)"));
    }
}
