mod migrate;
mod run;
mod start;
mod status;
mod tick;
mod trigger;

pub use migrate::MigrateCommand;
pub use run::RunCommand;
pub use start::StartCommand;
pub use status::StatusCommand;
pub use tick::TickCommand;
pub use trigger::TriggerCommand;

use std::path::Path;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cadence_core::config::{CadenceConfig, LoggingConfig};

/// Cadence - workflow automation engine
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path.
    #[arg(short, long, default_value = "cadence.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine and the delay poller until Ctrl-C.
    Run(RunCommand),

    /// Apply database migrations.
    Migrate(MigrateCommand),

    /// Dispatch one trigger event.
    Trigger(TriggerCommand),

    /// Start a workflow directly.
    Start(StartCommand),

    /// Show an execution and its step history.
    Status(StatusCommand),

    /// Resume due delay steps once.
    Tick(TickCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        dotenvy::dotenv().ok();

        let config = load_config(&self.config)?;
        init_tracing(&config.observability.logging);

        match self.command {
            Commands::Run(cmd) => cmd.execute(config).await,
            Commands::Migrate(cmd) => cmd.execute(config).await,
            Commands::Trigger(cmd) => cmd.execute(config).await,
            Commands::Start(cmd) => cmd.execute(config).await,
            Commands::Status(cmd) => cmd.execute(config).await,
            Commands::Tick(cmd) => cmd.execute(config).await,
        }
    }
}

fn load_config(path: &str) -> Result<CadenceConfig> {
    if !Path::new(path).exists() {
        anyhow::bail!("Configuration file not found: {}", path);
    }
    Ok(CadenceConfig::from_file(path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.as_str()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if logging.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
