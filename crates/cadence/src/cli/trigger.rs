use anyhow::Result;
use clap::Parser;
use console::style;

use cadence_core::config::CadenceConfig;
use cadence_core::workflow::{TriggerEvent, TriggerKind};

use crate::runtime::Cadence;

/// Dispatch one trigger event.
#[derive(Parser)]
pub struct TriggerCommand {
    /// Trigger kind (`entity_created`, `stage_changed`, ...).
    #[arg(short, long)]
    pub kind: TriggerKind,

    /// Entity the event is about.
    #[arg(long)]
    pub entity_id: String,

    /// User who caused the event.
    #[arg(long)]
    pub actor_id: Option<String>,

    /// Stage the entity left.
    #[arg(long)]
    pub from_stage: Option<String>,

    /// Stage the entity entered.
    #[arg(long)]
    pub to_stage: Option<String>,

    /// Extra payload as a JSON object.
    #[arg(long)]
    pub data: Option<String>,
}

impl TriggerCommand {
    fn event(&self) -> Result<TriggerEvent> {
        let mut event = TriggerEvent::new(self.kind, self.entity_id.clone());
        event.actor_id = self.actor_id.clone();
        event.from_stage = self.from_stage.clone();
        event.to_stage = self.to_stage.clone();

        if let Some(raw) = &self.data {
            match serde_json::from_str(raw)? {
                serde_json::Value::Object(data) => event.data = data,
                _ => anyhow::bail!("--data must be a JSON object"),
            }
        }
        Ok(event)
    }

    pub async fn execute(self, config: CadenceConfig) -> Result<()> {
        let event = self.event()?;
        let cadence = Cadence::builder().config(config).build()?;
        let (db, engine) = cadence.connect().await?;

        let report = engine.dispatcher().on_event(&event).await;
        db.close().await;
        let report = report?;

        println!();
        println!(
            "  {} {} matched, {} started, {} failed",
            style("ℹ").blue(),
            report.matched,
            report.started.len(),
            report.failed.len()
        );
        for execution in &report.started {
            println!(
                "  {} {} {}",
                style("✓").green(),
                execution.id,
                style(execution.status.as_str()).dim()
            );
        }
        for (workflow_id, error) in &report.failed {
            println!("  {} {} {}", style("✗").red(), workflow_id, error);
        }
        println!();
        Ok(())
    }
}
