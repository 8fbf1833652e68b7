use anyhow::Result;
use clap::Parser;
use console::style;

use cadence_core::config::CadenceConfig;

use crate::runtime::Cadence;

/// Resume due delay steps once, then exit.
#[derive(Parser)]
pub struct TickCommand {}

impl TickCommand {
    pub async fn execute(self, config: CadenceConfig) -> Result<()> {
        let cadence = Cadence::builder().config(config).build()?;
        let (db, engine) = cadence.connect().await?;

        let report = engine.poller().tick().await;
        db.close().await;
        let report = report?;

        println!(
            "  {} {} due, {} stale, {} resumed, {} skipped, {} failed",
            style("ℹ").blue(),
            report.due,
            report.stale,
            report.resumed,
            report.skipped,
            report.failed
        );
        Ok(())
    }
}
