//! Freight API
//!
//! HTTP service and CLI around the Brazil/Paraguay freight quote engine.

use clap::{Parser, Subcommand};
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_freight::QuoteRequest;
use eyre::{Result, WrapErr};
use std::path::PathBuf;
use tracing::info;

mod config;
mod openapi;
mod server;
mod state;

use config::Config;

#[derive(Parser)]
#[command(name = "freight_api")]
#[command(about = "Freight quotes and crossing point recommendation between Brazil and Paraguay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,

    /// Quote a single request and print the result
    Quote {
        /// JSON file holding a quote request
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the current exchange rates
    Rates,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install color-eyre first for colored error output (before any fallible operations)
    install_color_eyre();

    let cli = Cli::parse();

    // Load configuration from environment variables
    let config = Config::from_env()?;
    init_tracing(&config.environment);

    let service = state::build_service(&config)?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            observability::init_metrics();
            let router = server::build_router(service, &config)?;

            info!(
                name = %config.app.name,
                version = %config.app.version,
                environment = ?config.environment,
                "Starting freight API"
            );
            server::serve(router, &config.server).await?;
            info!("Freight API shutdown complete");
        }

        Commands::Quote { input } => {
            let raw = tokio::fs::read_to_string(&input)
                .await
                .wrap_err_with(|| format!("Failed to read {}", input.display()))?;
            let request: QuoteRequest = serde_json::from_str(&raw)
                .wrap_err_with(|| format!("{} is not a valid quote request", input.display()))?;

            let quote = service.calculate_freight(request).await?;
            println!("{}", serde_json::to_string_pretty(&quote)?);
        }

        Commands::Rates => {
            let snapshot = service.exchange_rates().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
    }

    Ok(())
}
