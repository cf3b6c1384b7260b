//! Plan Indexer Binary
//!
//! Consumes plan change messages from NATS and projects them into the
//! Elasticsearch join index. Run several instances to share the load: they
//! join one queue group and each message is delivered to a single member.
//!
//! # Usage
//!
//! ```bash
//! # Settings from ./config.yaml and the environment
//! ./plan-indexer
//!
//! # Another config file, one setting overridden on the command line
//! ./plan-indexer --config /etc/plan-store.yaml --index plans_v2
//!
//! # Legacy id-only deletes
//! ELASTICSEARCH_ROUTE_DELETES=false ./plan-indexer
//!
//! # With debug logging
//! RUST_LOG=debug ./plan-indexer
//! ```

use anyhow::Result;
use clap::Parser;
use futures::StreamExt;
use plan_store::events::{connect_nats, subscribe_queue};
use plan_store::index::{ElasticClient, IndexProjector};
use plan_store::Config;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Search index projection consumer for plan-store
///
/// Settings come from the shared config file and environment; flags given
/// here override them.
#[derive(Parser, Debug)]
#[command(name = "plan-indexer")]
#[command(about = "Projects plan change messages into the search index")]
#[command(version)]
struct Args {
    /// Path to the YAML config file (defaults to ./config.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// NATS server URL
    #[arg(long)]
    nats_url: Option<String>,

    /// Subject carrying plan change messages
    #[arg(long)]
    subject: Option<String>,

    /// Queue group shared by all indexer instances
    #[arg(long)]
    queue_group: Option<String>,

    /// Elasticsearch URL
    #[arg(long)]
    elasticsearch_url: Option<String>,

    /// Target index name
    #[arg(long)]
    index: Option<String>,

    /// Basic auth username
    #[arg(long)]
    username: Option<String>,

    /// Basic auth password
    #[arg(long)]
    password: Option<String>,

    /// Send the parent's routing value with deletes
    #[arg(long, action = clap::ArgAction::Set)]
    route_deletes: Option<bool>,
}

impl Args {
    /// Apply the flags that were given on top of `config`
    fn apply(self, mut config: Config) -> Config {
        if let Some(url) = self.nats_url {
            config.nats_url = url;
        }
        if let Some(subject) = self.subject {
            config.nats_subject = subject;
        }
        if let Some(group) = self.queue_group {
            config.nats_queue_group = group;
        }
        if let Some(url) = self.elasticsearch_url {
            config.elasticsearch_url = url;
        }
        if let Some(index) = self.index {
            config.elasticsearch_index = index;
        }
        if self.username.is_some() {
            config.elasticsearch_username = self.username;
        }
        if self.password.is_some() {
            config.elasticsearch_password = self.password;
        }
        if let Some(route) = self.route_deletes {
            config.route_deletes = route;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("plan_store=info".parse()?))
        .init();

    let args = Args::parse();
    let config = Config::from_yaml_and_env(args.config.as_deref())?;
    let config = args.apply(config);

    info!("Starting plan indexer");
    info!(
        "NATS: {} ({} / {})",
        config.nats_url, config.nats_subject, config.nats_queue_group
    );
    info!(
        "Elasticsearch: {} (index {}, routed deletes: {})",
        config.elasticsearch_url, config.elasticsearch_index, config.route_deletes
    );

    let es = ElasticClient::new(
        &config.elasticsearch_url,
        config.elasticsearch_index.clone(),
        config.elasticsearch_username.clone(),
        config.elasticsearch_password.clone(),
    )?;
    let projector = IndexProjector::new(Arc::new(es), config.route_deletes);

    if let Err(e) = projector.prepare().await {
        error!("Failed to prepare index {}: {}", config.elasticsearch_index, e);
        return Err(e.into());
    }

    let client = connect_nats(&config.nats_url).await?;
    let subscriber =
        subscribe_queue(&client, &config.nats_subject, &config.nats_queue_group).await?;

    let messages = subscriber
        .map(|message| message.payload)
        .take_until(plan_store::shutdown_signal());
    let projected = projector.run(messages).await;

    info!("Plan indexer stopped after {} messages", projected);
    Ok(())
}
