use anyhow::Result;
use clap::{Parser, Subcommand};

use gridwatch::config::AppConfig;
use gridwatch::logger;
use gridwatch::service::Service;

#[derive(Parser)]
#[command(name = "gridwatch", version, about = "Live NFL snapshot and halftime export service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full service: poll loop, halftime trigger, retention sweep, API server
    Run,
    /// Run a single scoreboard poll and exit
    Poll,
    /// Run a single halftime trigger pass and exit
    Trigger,
    /// Run a single retention sweep and exit
    Cleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, secrets) = AppConfig::load()?;

    logger::init_logging(&config.monitoring)?;

    tracing::info!(
        poll_interval_s = config.service.poll_interval_seconds,
        trigger_interval_s = config.service.trigger_interval_seconds,
        "gridwatch starting"
    );

    let service = Service::new(config, secrets).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => service.run().await,
        Command::Poll => service.poll_once().await,
        Command::Trigger => {
            let outcome = service.trigger_once().await?;
            tracing::info!(
                processed = outcome.processed,
                deferred = outcome.deferred,
                skipped = outcome.skipped,
                "Trigger pass finished"
            );
            Ok(())
        }
        Command::Cleanup => {
            let deleted = service.sweep_once().await?;
            tracing::info!(deleted, "Cleanup finished");
            Ok(())
        }
    }
}
