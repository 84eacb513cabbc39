//! # Webhook Relay Service
//!
//! Binary entry point for the webhook relay.
//!
//! This executable:
//! - Loads configuration from files and environment
//! - Initializes logging
//! - Wires the stores, processor, dispatcher, and outbox drainer
//! - Starts the HTTP intake server from relay-api

mod sink;

use relay_api::{start_server, AppState, ServiceConfig};
use relay_core::adapters::{InMemoryMessageStore, InMemoryWebhookStore};
use relay_core::delivery::Drainer;
use relay_core::pipeline::WebhookProcessor;
use relay_core::router::RoutingConfig;
use relay_core::{ChannelRouter, GithubGraphqlClient, RetryPolicy, TaskDispatcher};
use sink::DiscordRestSink;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Configuration comes first: the logging filter's default level lives
    // in it. Config failures report on stderr because the subscriber is
    // not installed yet.
    let service_config = load_config();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| service_config.logging.filter_directives().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting webhook relay service");

    // -------------------------------------------------------------------------
    // Routing tables
    //
    // A missing routing file is tolerated: the service starts with empty
    // tables and suppresses everything except internal webhooks, which is
    // the safe behavior when the tables have not been deployed yet. An
    // unreadable or invalid file is a hard error because it means the
    // operator configured routing and got it wrong.
    // -------------------------------------------------------------------------
    let routing = match &service_config.routing.file {
        Some(path) => match RoutingConfig::load_from_file(Path::new(path)) {
            Ok(routing) => {
                info!(
                    path = %path,
                    projects = routing.projects.len(),
                    groups = routing.groups.len(),
                    "Loaded routing tables"
                );
                routing
            }
            Err(e) => {
                error!(path = %path, error = %e, "Failed to load routing tables; aborting");
                std::process::exit(3);
            }
        },
        None => {
            warn!(
                "No routing file configured; all GitHub and Zammad \
                 notifications will be suppressed"
            );
            RoutingConfig::default()
        }
    };

    // -------------------------------------------------------------------------
    // Wire the pipeline
    // -------------------------------------------------------------------------
    let webhooks = Arc::new(InMemoryWebhookStore::new());
    let messages = Arc::new(InMemoryMessageStore::new());

    let mut github_client = match GithubGraphqlClient::new(&service_config.github.token) {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build GitHub client; aborting");
            std::process::exit(3);
        }
    };
    if let Some(endpoint) = &service_config.github.graphql_endpoint {
        github_client = github_client.with_endpoint(endpoint.clone());
    }

    let processor = Arc::new(WebhookProcessor::new(
        webhooks.clone(),
        messages.clone(),
        Arc::new(github_client),
        ChannelRouter::new(routing),
    ));

    let (dispatcher, _dispatch_worker) =
        TaskDispatcher::start(processor, RetryPolicy::exponential());

    // -------------------------------------------------------------------------
    // Outbox drainer
    // -------------------------------------------------------------------------
    let discord_sink = match DiscordRestSink::new(&service_config.discord.bot_token) {
        Ok(sink) => sink,
        Err(e) => {
            error!(error = %e, "Failed to build Discord sink; aborting");
            std::process::exit(3);
        }
    };
    let discord_sink = match &service_config.discord.api_base {
        Some(base) => discord_sink.with_api_base(base.clone()),
        None => discord_sink,
    };

    let drainer = Drainer::new(
        messages,
        Arc::new(discord_sink),
        service_config.delivery.drainer_config(),
    );
    tokio::spawn(drainer.run());

    // -------------------------------------------------------------------------
    // HTTP server
    // -------------------------------------------------------------------------
    let state = AppState::new(
        service_config.security.webhook_secrets(),
        webhooks,
        dispatcher,
    );

    if let Err(e) = start_server(&service_config.server.host, service_config.server.port, state)
        .await
    {
        error!(error = %e, "HTTP server failed");
        std::process::exit(1);
    }

    info!("Webhook relay service stopped");
    Ok(())
}

/// Load and validate the service configuration, exiting with status 3 on
/// any failure.
///
/// Sources (applied in order — later sources override earlier ones):
///  1. /etc/webhook-relay/service.yaml      — system-wide defaults
///  2. ./config/service.yaml                — deployment-local override
///  3. Path given by RELAY_CONFIG_FILE env  — operator-specified file
///  4. Environment variables prefixed RELAY__ (double-underscore
///     separator), e.g. RELAY__SERVER__PORT=9090 sets server.port
///
/// Every field carries a serde default, so absent files still produce a
/// config; validation then decides whether that config is runnable
/// (secrets and API tokens have no defaults).
fn load_config() -> ServiceConfig {
    let mut config_builder = config::Config::builder()
        .add_source(
            config::File::with_name("/etc/webhook-relay/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        )
        .add_source(
            config::File::with_name("config/service")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

    if let Ok(explicit_path) = std::env::var("RELAY_CONFIG_FILE") {
        if !explicit_path.is_empty() {
            config_builder = config_builder.add_source(
                config::File::with_name(&explicit_path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }
    }

    let config = match config_builder
        .add_source(config::Environment::with_prefix("RELAY").separator("__"))
        .build()
    {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to build configuration; aborting: {e}");
            std::process::exit(3);
        }
    };

    let service_config: ServiceConfig = match config.try_deserialize() {
        Ok(sc) => sc,
        Err(e) => {
            eprintln!(
                "Could not deserialize service configuration; aborting. \
                 Fix the configuration and restart: {e}"
            );
            std::process::exit(3);
        }
    };

    if let Err(e) = service_config.validate() {
        eprintln!("Service configuration is invalid; aborting: {e}");
        std::process::exit(3);
    }

    service_config
}
