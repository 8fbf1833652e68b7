use anyhow::Result;
use clap::Parser;
use console::style;
use uuid::Uuid;

use cadence_core::config::CadenceConfig;
use cadence_core::workflow::StepStatus;

use crate::runtime::Cadence;

/// Show an execution and its step history.
#[derive(Parser)]
pub struct StatusCommand {
    /// Execution id.
    pub execution_id: Uuid,
}

impl StatusCommand {
    pub async fn execute(self, config: CadenceConfig) -> Result<()> {
        let cadence = Cadence::builder().config(config).build()?;
        let (db, engine) = cadence.connect().await?;

        let lookup = async {
            let execution = engine.coordinator().status(self.execution_id).await?;
            let history = engine.coordinator().history(self.execution_id).await?;
            Ok::<_, cadence_core::CadenceError>((execution, history))
        }
        .await;
        db.close().await;
        let (execution, history) = lookup?;

        println!();
        println!(
            "  {} {} ({})",
            style("Execution").bold(),
            execution.id,
            style(execution.status.as_str()).cyan()
        );
        println!(
            "  {} started {}",
            style("→").dim(),
            execution.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(completed_at) = execution.completed_at {
            println!(
                "  {} finished {}",
                style("→").dim(),
                completed_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        if let Some(error) = &execution.error {
            println!("  {} {}", style("✗").red(), error);
        }
        println!();

        for record in &history {
            let marker = match record.status {
                StepStatus::Completed => style("✓").green(),
                StepStatus::Failed => style("✗").red(),
                StepStatus::Pending => style("○").yellow(),
                _ => style("→").dim(),
            };
            print!(
                "    {} {:>3} {}",
                marker,
                record.step_order,
                style(&record.step_title).cyan()
            );
            if let Some(resume_at) = record.scheduled_resume_at {
                if record.status == StepStatus::Pending {
                    print!(" (resumes {})", resume_at.format("%Y-%m-%d %H:%M:%S"));
                }
            }
            if let Some(error) = &record.error {
                print!(" {}", style(error).red());
            }
            println!();
        }
        println!();
        Ok(())
    }
}
