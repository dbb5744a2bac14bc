//! sqlmeter - Workload simulator for query and connection-pool metrics.

mod config;
mod simulate;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{Cli, Command};
use simulate::Simulation;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sqlmeter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Simulate(args) => {
            let config = args.into_config()?;

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                pools = ?config.pools,
                pool_size = config.pool_size,
                workers = config.workers,
                queries_per_worker = config.queries_per_worker,
                "starting simulation"
            );

            let simulation = Simulation::new(config)?;

            // Set up graceful shutdown
            let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

            let shutdown_tx_clone = shutdown_tx.clone();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for ctrl+c");
                    return;
                }
                tracing::info!("received shutdown signal");
                let _ = shutdown_tx_clone.send(());
            });

            let report = simulation.run(shutdown_tx).await?;
            println!("{}", report.exposition);
        }
    }

    Ok(())
}
