use anyhow::Result;
use clap::Parser;
use console::style;

use cadence_core::config::CadenceConfig;

use crate::runtime::Cadence;

/// Run the engine.
#[derive(Parser)]
pub struct RunCommand {
    /// Do not start the delay poller (overrides config).
    #[arg(long)]
    pub no_poller: bool,
}

impl RunCommand {
    pub async fn execute(self, mut config: CadenceConfig) -> Result<()> {
        if self.no_poller {
            config.poller.enabled = false;
        }

        println!();
        println!(
            "  {} v{}",
            style("Cadence").bold().cyan(),
            env!("CARGO_PKG_VERSION")
        );
        println!(
            "  {} Collaborators at {}",
            style("→").dim(),
            style(&config.collaborators.base_url).cyan()
        );
        if config.poller.enabled {
            println!(
                "  {} Polling for due delays every {}s",
                style("→").dim(),
                config.poller.poll_interval().as_secs()
            );
        }
        println!();

        let cadence = Cadence::builder().config(config).build()?;
        cadence.run().await?;

        println!("\n  {} Stopped", style("✓").green());
        Ok(())
    }
}
