//! Plan Store
//!
//! A key-value backed store for Plan aggregates with:
//! - Redis persistence, one key per entity plus ETag side-keys
//! - ETag optimistic concurrency (If-Match / If-None-Match)
//! - JSON merge-patch and cascade delete
//! - NATS change queue feeding an Elasticsearch join-index projection

pub mod api;
pub mod events;
pub mod index;
pub mod plan;
pub mod store;

#[cfg(test)]
pub(crate) mod test_helpers;

use anyhow::{Context, Result};
use events::{EventBus, EventPublisher, NatsPublisher};
use plan::PlanManager;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use store::{AggregateStore, KeyValueStore};

// ============================================================================
// YAML config structs (deserialization targets)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerYamlConfig,
    pub redis: RedisYamlConfig,
    pub nats: NatsYamlConfig,
    pub elasticsearch: ElasticsearchYamlConfig,
}

/// Server configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerYamlConfig {
    pub port: u16,
}

impl Default for ServerYamlConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Redis configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisYamlConfig {
    pub url: String,
}

impl Default for RedisYamlConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
        }
    }
}

/// NATS configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsYamlConfig {
    pub url: String,
    pub subject: String,
    /// Queue group shared by all `plan-indexer` instances
    pub queue_group: String,
}

impl Default for NatsYamlConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".into(),
            subject: "plans_queue".into(),
            queue_group: "plans_indexer".into(),
        }
    }
}

/// Elasticsearch configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElasticsearchYamlConfig {
    pub url: String,
    pub index: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Send the owning parent's routing on delete (false = legacy id-only deletes)
    pub route_deletes: bool,
}

impl Default for ElasticsearchYamlConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".into(),
            index: "plans".into(),
            username: None,
            password: None,
            route_deletes: true,
        }
    }
}

// ============================================================================
// Runtime config (what the application actually uses)
// ============================================================================

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub redis_url: String,
    pub nats_url: String,
    pub nats_subject: String,
    pub nats_queue_group: String,
    pub elasticsearch_url: String,
    pub elasticsearch_index: String,
    pub elasticsearch_username: Option<String>,
    pub elasticsearch_password: Option<String>,
    pub route_deletes: bool,
}

impl Config {
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. If the file doesn't
    /// exist, falls back to pure env var / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);

        Ok(Self {
            server_port: std::env::var("SERVER_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(yaml.server.port),
            redis_url: std::env::var("REDIS_URL").unwrap_or(yaml.redis.url),
            nats_url: std::env::var("NATS_URL").unwrap_or(yaml.nats.url),
            nats_subject: std::env::var("NATS_SUBJECT").unwrap_or(yaml.nats.subject),
            nats_queue_group: std::env::var("NATS_QUEUE_GROUP").unwrap_or(yaml.nats.queue_group),
            elasticsearch_url: std::env::var("ELASTICSEARCH_URL").unwrap_or(yaml.elasticsearch.url),
            elasticsearch_index: std::env::var("ELASTICSEARCH_INDEX")
                .unwrap_or(yaml.elasticsearch.index),
            elasticsearch_username: std::env::var("ELASTICSEARCH_USERNAME")
                .ok()
                .or(yaml.elasticsearch.username),
            elasticsearch_password: std::env::var("ELASTICSEARCH_PASSWORD")
                .ok()
                .or(yaml.elasticsearch.password),
            route_deletes: std::env::var("ELASTICSEARCH_ROUTE_DELETES")
                .ok()
                .and_then(|s| parse_flag(&s))
                .unwrap_or(yaml.elasticsearch.route_deletes),
        })
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub publisher: Arc<dyn EventPublisher>,
    /// Set when the publisher is NATS-backed, so shutdown can flush it
    pub nats: Option<NatsPublisher>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect to Redis and NATS.
    ///
    /// An unreachable NATS server is not fatal: changes go to an in-process
    /// bus instead and the index must be re-driven with `reindex` later.
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(store::RedisStore::connect(&config.redis_url).await?);

        let (publisher, nats): (Arc<dyn EventPublisher>, Option<NatsPublisher>) =
            match events::connect_nats(&config.nats_url).await {
                Ok(client) => {
                    let publisher = NatsPublisher::new(client, config.nats_subject.clone());
                    (Arc::new(publisher.clone()), Some(publisher))
                }
                Err(e) => {
                    tracing::warn!(
                        nats_url = %config.nats_url,
                        error = %e,
                        "NATS unavailable, plan changes will not reach the index"
                    );
                    (Arc::new(EventBus::default()), None)
                }
            };

        Ok(Self {
            store,
            publisher,
            nats,
            config: Arc::new(config),
        })
    }

    /// Write-path facade over the connected backends
    pub fn plan_manager(&self) -> PlanManager {
        PlanManager::new(AggregateStore::new(self.store.clone()), self.publisher.clone())
    }

    /// State for the HTTP router
    pub fn server_state(&self) -> api::handlers::PlanState {
        Arc::new(api::handlers::ServerState {
            plans: self.plan_manager(),
            store: self.store.clone(),
        })
    }
}

/// Run the HTTP server until Ctrl+C, then flush pending queue messages.
pub async fn start_server(config: Config) -> Result<()> {
    let port = config.server_port;
    let state = AppState::new(config).await?;
    let app = api::create_router(state.server_state());

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Plan store listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(nats) = &state.nats {
        if let Err(e) = nats.flush().await {
            tracing::warn!(error = %e, "Failed to flush NATS on shutdown");
        }
    }
    tracing::info!("Plan store shut down");
    Ok(())
}

/// Resolves on Ctrl+C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
