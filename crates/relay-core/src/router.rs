//! # Channel Router Module
//!
//! Decides which Discord channel a notification goes to, or that it goes
//! nowhere. Routing tables are plain data loaded at startup and injected
//! into the router, so the decision function itself is pure and the tables
//! are auditable configuration rather than code.
//!
//! Suppression is an explicit outcome, not an error: unknown projects and
//! groups intentionally produce no notification, and callers must still
//! mark the originating webhook as processed.

use crate::pipeline::RouteKey;
use crate::DiscordChannel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// ============================================================================
// Routing Configuration
// ============================================================================

/// The routing tables, as loaded from configuration.
///
/// `repositories` exists for open source repositories we may want to route
/// separately from project boards; it is consulted after the project table
/// and is empty in the current deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Destination for all internal webhooks.
    pub internal_channel: DiscordChannel,

    /// GitHub project id to channel.
    #[serde(default)]
    pub projects: HashMap<String, DiscordChannel>,

    /// GitHub repository id to channel, consulted when the project table
    /// has no entry.
    #[serde(default)]
    pub repositories: HashMap<String, DiscordChannel>,

    /// Zammad group name to channel.
    #[serde(default)]
    pub groups: HashMap<String, DiscordChannel>,
}

impl Default for RoutingConfig {
    /// Empty tables with the internal channel pointed at a placeholder.
    /// Everything except internal webhooks gets suppressed.
    fn default() -> Self {
        Self {
            internal_channel: DiscordChannel::new("0", "placeholder"),
            projects: HashMap::new(),
            repositories: HashMap::new(),
            groups: HashMap::new(),
        }
    }
}

impl RoutingConfig {
    /// Load routing tables from a YAML or JSON file, by extension.
    ///
    /// # Errors
    ///
    /// - [`RoutingConfigError::FileNotFound`] when the file is missing
    /// - [`RoutingConfigError::ParseError`] on unreadable or invalid content
    /// - [`RoutingConfigError::ValidationError`] on structural problems
    pub fn load_from_file(path: &Path) -> Result<Self, RoutingConfigError> {
        if !path.exists() {
            return Err(RoutingConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let contents =
            std::fs::read_to_string(path).map_err(|e| RoutingConfigError::ParseError {
                message: format!("Failed to read file: {}", e),
            })?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: RoutingConfig = match extension.to_lowercase().as_str() {
            "yaml" | "yml" => {
                serde_yaml::from_str(&contents).map_err(|e| RoutingConfigError::ParseError {
                    message: format!("Invalid YAML: {}", e),
                })?
            }
            "json" => {
                serde_json::from_str(&contents).map_err(|e| RoutingConfigError::ParseError {
                    message: format!("Invalid JSON: {}", e),
                })?
            }
            _ => serde_json::from_str(&contents)
                .or_else(|_| serde_yaml::from_str(&contents))
                .map_err(|e| RoutingConfigError::ParseError {
                    message: format!("Failed to parse as JSON or YAML: {}", e),
                })?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the tables: every channel needs a non-empty id and name.
    pub fn validate(&self) -> Result<(), RoutingConfigError> {
        let mut errors = Vec::new();

        let mut check = |context: String, channel: &DiscordChannel| {
            if channel.id.is_empty() {
                errors.push(format!("{}: channel id is empty", context));
            }
            if channel.name.is_empty() {
                errors.push(format!("{}: channel name is empty", context));
            }
        };

        check("internal_channel".to_string(), &self.internal_channel);
        for (key, channel) in &self.projects {
            check(format!("projects[{}]", key), channel);
        }
        for (key, channel) in &self.repositories {
            check(format!("repositories[{}]", key), channel);
        }
        for (key, channel) in &self.groups {
            check(format!("groups[{}]", key), channel);
        }

        if !errors.is_empty() {
            return Err(RoutingConfigError::ValidationError { errors });
        }

        Ok(())
    }
}

/// Errors loading or validating routing configuration.
#[derive(Debug, thiserror::Error)]
pub enum RoutingConfigError {
    #[error("Routing configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Failed to parse routing configuration: {message}")]
    ParseError { message: String },

    #[error("Invalid routing configuration: {errors:?}")]
    ValidationError { errors: Vec<String> },
}

// ============================================================================
// Routing Decision
// ============================================================================

/// Outcome of routing one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Queue the message for this channel.
    Deliver(DiscordChannel),

    /// Intentionally send nothing. Distinct from an error: the webhook is
    /// still marked processed.
    Suppress,
}

impl RoutingDecision {
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppress)
    }
}

/// Pure routing function over the injected tables.
#[derive(Debug, Clone)]
pub struct ChannelRouter {
    config: RoutingConfig,
}

impl ChannelRouter {
    pub fn new(config: RoutingConfig) -> Self {
        Self { config }
    }

    /// Map a routing key to a destination channel or suppression.
    ///
    /// The key variant encodes the source, so a GitHub key can never be
    /// looked up in the Zammad table. Project keys fall back to the
    /// repository table before suppressing.
    pub fn route(&self, key: &RouteKey) -> RoutingDecision {
        match key {
            RouteKey::Internal => {
                // All internal messages go to the one configured channel.
                RoutingDecision::Deliver(self.config.internal_channel.clone())
            }

            RouteKey::Project {
                project_id,
                repository_id,
            } => {
                if let Some(channel) = self.config.projects.get(project_id) {
                    return RoutingDecision::Deliver(channel.clone());
                }

                if let Some(repo_id) = repository_id {
                    if let Some(channel) = self.config.repositories.get(repo_id) {
                        return RoutingDecision::Deliver(channel.clone());
                    }
                }

                RoutingDecision::Suppress
            }

            RouteKey::Group(name) => match self.config.groups.get(name) {
                Some(channel) => RoutingDecision::Deliver(channel.clone()),
                None => RoutingDecision::Suppress,
            },
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
