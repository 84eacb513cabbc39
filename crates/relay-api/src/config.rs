//! Configuration types for the HTTP service.
//!
//! Every field carries a serde default so an unconfigured environment
//! still deserializes; `validate` is what decides whether the result is
//! actually runnable (secrets and tokens have no sensible defaults).

use relay_core::signature::WebhookSecrets;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceConfig {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Webhook authentication secrets
    #[serde(default)]
    pub security: SecurityConfig,

    /// GitHub API access
    #[serde(default)]
    pub github: GithubApiConfig,

    /// Discord delivery settings
    #[serde(default)]
    pub discord: DiscordConfig,

    /// Outbox drainer timing
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Routing table source
    #[serde(default)]
    pub routing: RoutingSourceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

/// Webhook authentication secrets, one per intake endpoint.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct SecurityConfig {
    /// Bearer-style token expected on internal webhooks
    #[serde(default)]
    pub internal_token: String,

    /// HMAC-SHA256 secret shared with GitHub
    #[serde(default)]
    pub github_webhook_secret: String,

    /// HMAC-SHA1 secret shared with Zammad
    #[serde(default)]
    pub zammad_webhook_secret: String,
}

impl SecurityConfig {
    pub fn webhook_secrets(&self) -> WebhookSecrets {
        WebhookSecrets {
            internal_token: self.internal_token.clone(),
            github_secret: self.github_webhook_secret.clone(),
            zammad_secret: self.zammad_webhook_secret.clone(),
        }
    }
}

// Secrets must never reach logs through a Debug render of the config.
impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("internal_token", &"***")
            .field("github_webhook_secret", &"***")
            .field("zammad_webhook_secret", &"***")
            .finish()
    }
}

/// GitHub GraphQL API access configuration
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct GithubApiConfig {
    /// Token used for project item enrichment queries
    #[serde(default)]
    pub token: String,

    /// Override for the GraphQL endpoint; the public API when absent
    #[serde(default)]
    pub graphql_endpoint: Option<String>,
}

impl std::fmt::Debug for GithubApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubApiConfig")
            .field("token", &"***")
            .field("graphql_endpoint", &self.graphql_endpoint)
            .finish()
    }
}

/// Discord REST delivery configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token used for channel resolution and sends
    pub bot_token: String,

    /// Override for the REST API base; the public API when absent
    pub api_base: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: None,
        }
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"***")
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Outbox drainer timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Seconds between outbox sweeps
    pub poll_interval_seconds: u64,

    /// Budget in seconds for a single send
    pub send_timeout_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            send_timeout_seconds: 10,
        }
    }
}

impl DeliveryConfig {
    pub fn drainer_config(&self) -> relay_core::delivery::DrainerConfig {
        relay_core::delivery::DrainerConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
            send_timeout: Duration::from_secs(self.send_timeout_seconds),
        }
    }
}

/// Where the routing tables come from.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingSourceConfig {
    /// Path to a YAML or JSON routing file. When absent the service runs
    /// with empty tables and suppresses everything except internal
    /// webhooks.
    #[serde(default)]
    pub file: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Filter directives for the service's own crates at the configured
    /// level, used when RUST_LOG is unset.
    pub fn filter_directives(&self) -> String {
        format!(
            "relay_service={level},relay_api={level},relay_core={level},tower_http=debug",
            level = self.level
        )
    }
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
#[error("Invalid configuration: {errors:?}")]
pub struct ConfigValidationError {
    pub errors: Vec<String>,
}

impl ServiceConfig {
    /// Validate the configuration for running the real service.
    ///
    /// # Errors
    ///
    /// Collects every problem rather than stopping at the first, so an
    /// operator fixes a broken deployment in one pass.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.security.internal_token.is_empty() {
            errors.push("security.internal_token is required".to_string());
        }
        if self.security.github_webhook_secret.is_empty() {
            errors.push("security.github_webhook_secret is required".to_string());
        }
        if self.security.zammad_webhook_secret.is_empty() {
            errors.push("security.zammad_webhook_secret is required".to_string());
        }
        if self.github.token.is_empty() {
            errors.push("github.token is required".to_string());
        }
        if self.discord.bot_token.is_empty() {
            errors.push("discord.bot_token is required".to_string());
        }
        if self.delivery.poll_interval_seconds == 0 {
            errors.push("delivery.poll_interval_seconds must be non-zero".to_string());
        }

        if !errors.is_empty() {
            return Err(ConfigValidationError { errors });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
