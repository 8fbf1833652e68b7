//! Schema migrations, applied under a PostgreSQL advisory lock so that
//! several engine processes starting together apply each migration once.

use std::collections::HashSet;
use std::path::Path;

use sqlx::PgPool;
use tracing::{debug, info, warn};

use cadence_core::error::{CadenceError, Result};

/// Advisory lock key ("CADENCE" in ASCII).
const MIGRATION_LOCK_ID: i64 = 0x43_4144_454E_4345;

/// A named SQL script.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name, e.g. `0000_cadence_internal`.
    pub name: String,
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Applies the built-in schema followed by any extra migrations.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every pending migration and return the names applied.
    pub async fn run(&self, extra: Vec<Migration>) -> Result<Vec<String>> {
        self.acquire_lock().await?;

        let result = self.apply_pending(extra).await;

        if let Err(e) = self.release_lock().await {
            warn!(error = %e, "Failed to release migration lock");
        }

        result
    }

    async fn apply_pending(&self, extra: Vec<Migration>) -> Result<Vec<String>> {
        self.ensure_migrations_table().await?;

        let applied = self.applied_migrations().await?;
        debug!(count = applied.len(), "Found applied migrations");

        let mut newly_applied = Vec::new();
        for migration in super::builtin::builtin_migrations().into_iter().chain(extra) {
            if applied.contains(&migration.name) {
                continue;
            }
            self.apply(&migration).await?;
            newly_applied.push(migration.name);
        }

        if newly_applied.is_empty() {
            info!("Schema is up to date");
        }
        Ok(newly_applied)
    }

    async fn acquire_lock(&self) -> Result<()> {
        debug!("Acquiring migration lock");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CadenceError::Database(format!("Failed to acquire migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                CadenceError::Database(format!("Failed to release migration lock: {}", e))
            })?;
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cadence_migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| {
            CadenceError::Database(format!("Failed to create migrations table: {}", e))
        })?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM cadence_migrations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                CadenceError::Database(format!("Failed to read applied migrations: {}", e))
            })?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Run one migration and record it, all in one transaction.
    async fn apply(&self, migration: &Migration) -> Result<()> {
        info!(migration = %migration.name, "Applying migration");

        let failed = |e: sqlx::Error| {
            CadenceError::Database(format!(
                "Failed to apply migration '{}': {}",
                migration.name, e
            ))
        };

        let mut tx = self.pool.begin().await.map_err(failed)?;

        for statement in split_sql_statements(&migration.sql) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(failed)?;
        }

        sqlx::query("INSERT INTO cadence_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        tx.commit().await.map_err(failed)?;
        Ok(())
    }
}

/// Split a script into statements.
///
/// Semicolons inside single-quoted strings, `--` comments and dollar-quoted
/// bodies (`$$ ... $$`, `$tag$ ... $tag$`) do not end a statement.
/// Comment-only fragments are dropped.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut dollar_tag: Option<String> = None;
    let mut in_string = false;
    let mut in_comment = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if in_comment {
            in_comment = c != '\n';
            continue;
        }
        if in_string {
            in_string = c != '\'';
            continue;
        }

        match c {
            '$' => {
                let mut tag = String::from("$");
                while let Some(&next) = chars.peek() {
                    if next == '$' {
                        tag.push(next);
                        current.push(next);
                        chars.next();
                        break;
                    } else if next.is_alphanumeric() || next == '_' {
                        tag.push(next);
                        current.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if tag.len() >= 2 && tag.ends_with('$') {
                    match &dollar_tag {
                        Some(open) if *open == tag => dollar_tag = None,
                        Some(_) => {}
                        None => dollar_tag = Some(tag),
                    }
                }
            }
            _ if dollar_tag.is_some() => {}
            '\'' => in_string = true,
            '-' if chars.peek() == Some(&'-') => in_comment = true,
            ';' => {
                push_statement(&mut statements, &current);
                current.clear();
            }
            _ => {}
        }
    }

    push_statement(&mut statements, &current);
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw.trim().trim_end_matches(';').trim();
    let only_comments = stmt.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with("--")
    });
    if !only_comments {
        statements.push(stmt.to_string());
    }
}

/// Load extra migrations (`NNNN_name.sql`) from a directory, sorted by name.
///
/// A missing directory yields no migrations.
pub fn load_migrations_from_dir(dir: &Path) -> Result<Vec<Migration>> {
    if !dir.exists() {
        debug!(dir = ?dir, "Migrations directory does not exist");
        return Ok(Vec::new());
    }

    let mut migrations = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "sql").unwrap_or(false) {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    CadenceError::Config(format!("Invalid migration filename: {:?}", path))
                })?
                .to_string();
            let sql = std::fs::read_to_string(&path)?;
            migrations.push(Migration::new(name, sql));
        }
    }

    migrations.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(count = migrations.len(), "Loaded extra migrations");
    Ok(migrations)
}
