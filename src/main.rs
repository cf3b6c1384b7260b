//! Plan Store - Main Server
//!
//! HTTP API over the Redis-backed plan store, plus operator commands.

use anyhow::Result;
use clap::{Parser, Subcommand};
use plan_store::{AppState, Config};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "plan-store")]
#[command(about = "Plan aggregate store with ETag concurrency control")]
#[command(version)]
struct Cli {
    /// Path to the YAML config file (defaults to ./config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Re-publish every stored plan so the search index converges on the store
    Reindex,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,plan_store=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::from_yaml_and_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server_port = port;
            }
            plan_store::start_server(config).await
        }
        Commands::Reindex => run_reindex(config).await,
    }
}

async fn run_reindex(config: Config) -> Result<()> {
    let state = AppState::new(config).await?;
    let Some(nats) = state.nats.clone() else {
        anyhow::bail!("Reindex needs a reachable NATS server");
    };

    let published = state.plan_manager().reindex().await?;
    nats.flush().await?;

    tracing::info!("Reindex complete: {} plans re-published", published);
    Ok(())
}
