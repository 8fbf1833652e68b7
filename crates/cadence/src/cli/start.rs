use anyhow::Result;
use clap::Parser;
use console::style;
use uuid::Uuid;

use cadence_core::config::CadenceConfig;
use cadence_core::workflow::Context;

use crate::runtime::Cadence;

/// Start a workflow directly, bypassing trigger matching.
#[derive(Parser)]
pub struct StartCommand {
    /// Workflow definition id.
    #[arg(short, long)]
    pub workflow: Uuid,

    /// Initial context as a JSON object.
    #[arg(long)]
    pub context: Option<String>,
}

impl StartCommand {
    fn initial_context(&self) -> Result<Context> {
        match &self.context {
            None => Ok(Context::new()),
            Some(raw) => match serde_json::from_str(raw)? {
                value @ serde_json::Value::Object(_) => Ok(Context::from_value(value)),
                _ => anyhow::bail!("--context must be a JSON object"),
            },
        }
    }

    pub async fn execute(self, config: CadenceConfig) -> Result<()> {
        let context = self.initial_context()?;
        let cadence = Cadence::builder().config(config).build()?;
        let (db, engine) = cadence.connect().await?;

        let result = engine.coordinator().start(self.workflow, context).await;
        db.close().await;
        let execution = result?;

        println!();
        println!(
            "  {} Execution {} is {}",
            style("✓").green(),
            execution.id,
            style(execution.status.as_str()).bold()
        );
        if let Some(error) = &execution.error {
            println!("  {} {}", style("✗").red(), error);
        }
        println!();
        Ok(())
    }
}
