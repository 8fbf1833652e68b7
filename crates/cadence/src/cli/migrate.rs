use anyhow::Result;
use clap::Parser;
use console::style;

use cadence_core::config::CadenceConfig;

use crate::runtime::Cadence;

/// Apply the built-in schema and any extra migrations.
#[derive(Parser)]
pub struct MigrateCommand {
    /// Directory of extra migrations (overrides `database.migrations_dir`).
    #[arg(short, long)]
    pub migrations_dir: Option<String>,
}

impl MigrateCommand {
    pub async fn execute(self, config: CadenceConfig) -> Result<()> {
        let mut builder = Cadence::builder().config(config);
        if let Some(dir) = &self.migrations_dir {
            builder = builder.migrations_dir(dir);
        }
        let cadence = builder.build()?;

        let db = cadence_runtime::Database::from_config(&cadence.config().database).await?;

        println!();
        println!("  {} Migrations", style("Cadence").bold().cyan());
        println!();

        let applied = cadence.migrate(&db).await?;
        db.close().await;

        if applied.is_empty() {
            println!("  {} Schema is up to date", style("ℹ").blue());
        } else {
            for name in &applied {
                println!("  {} Applied {}", style("✓").green(), name);
            }
        }
        println!();
        Ok(())
    }
}
