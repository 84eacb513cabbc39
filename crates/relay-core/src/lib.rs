//! # Relay Core
//!
//! Domain logic for the webhook-relay notification pipeline.
//!
//! This crate receives webhooks that have already been accepted at the HTTP
//! boundary, turns them into human-readable Discord notifications, routes
//! them to the right channel, and queues them for asynchronous delivery.
//!
//! ## Architecture
//!
//! The pipeline is a staged sequence over a persisted [`store::Webhook`]
//! record:
//!
//! 1. Signature verification at the boundary ([`signature`])
//! 2. Persist the raw webhook ([`store`])
//! 3. Enrich and parse per source ([`github`], [`zammad`])
//! 4. Route to a channel or suppress ([`router`])
//! 5. Queue the rendered message ([`store::MessageStore`])
//! 6. Drain the outbox to the chat sink ([`delivery`])
//!
//! Persistence and the chat runtime are abstracted behind traits; in-memory
//! adapters live in [`adapters`] and concrete infrastructure is injected by
//! the service binary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub use uuid::Uuid;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Unique identifier for a stored webhook record.
///
/// UUIDv4, generated at creation time. This is the value returned to the
/// webhook sender as `guid` and the unit of idempotent processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookId(Uuid);

impl WebhookId {
    /// Generate a new unique webhook ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for WebhookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WebhookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WebhookId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = s.parse::<Uuid>().map_err(|_| ParseError::InvalidFormat {
            expected: "UUID format".to_string(),
            actual: s.to_string(),
        })?;
        Ok(Self(uuid))
    }
}

/// Unique identifier for a queued outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a new unique message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Webhook Sources
// ============================================================================

/// Origin of an inbound webhook.
///
/// This is a closed enum: a webhook record can only ever be created through
/// one of the known endpoints, so "unknown source" is unrepresentable past
/// the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookSource {
    /// Internal trigger, authenticated with a shared token.
    Internal,
    /// GitHub project/issue webhooks.
    Github,
    /// Zammad helpdesk trigger webhooks.
    Zammad,
}

impl WebhookSource {
    /// Stable string form, used in logs and stored records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Github => "github",
            Self::Zammad => "zammad",
        }
    }

    /// Lowercased prefix of the inbound headers captured into webhook meta.
    ///
    /// Internal webhooks carry no interesting headers beyond the token, so
    /// nothing is captured for them.
    pub fn meta_header_prefix(&self) -> Option<&'static str> {
        match self {
            Self::Internal => None,
            Self::Github => Some("x-github"),
            Self::Zammad => Some("x-zammad"),
        }
    }
}

impl fmt::Display for WebhookSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WebhookSource {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "internal" => Ok(Self::Internal),
            "github" => Ok(Self::Github),
            "zammad" => Ok(Self::Zammad),
            _ => Err(ParseError::InvalidFormat {
                expected: "internal, github, or zammad".to_string(),
                actual: s.to_string(),
            }),
        }
    }
}

// ============================================================================
// Channel Types
// ============================================================================

/// A Discord channel as the router knows it.
///
/// The id stays a string even though Discord snowflakes are numeric; the
/// sink casts when it talks to the API. The name is captured alongside the
/// id so queued messages keep the name that was valid at scheduling time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscordChannel {
    pub id: String,
    pub name: String,
}

impl DiscordChannel {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DiscordChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.name, self.id)
    }
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Configuration for retry behavior on transient failures.
///
/// Used by the task dispatcher when reprocessing a webhook after an
/// upstream API failure. Delays grow exponentially up to `max_delay`, with
/// deterministic hash-based jitter to avoid synchronized retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
}

impl RetryPolicy {
    /// Create exponential backoff retry policy.
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }

    /// Create fixed delay retry policy.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: 5,
            base_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
            jitter_enabled: false,
        }
    }

    /// Policy that never retries, useful in tests.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_enabled: false,
        }
    }

    /// Calculate delay before the given attempt number (1-based).
    ///
    /// Attempt 0 and 1 get no delay; attempt `n` waits
    /// `base * multiplier^(n-1)` capped at `max_delay`, with ±25% jitter
    /// when enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let mut delay = self.base_delay.as_millis() as f64;
        for _ in 2..attempt {
            delay *= self.backoff_multiplier;
        }

        if self.jitter_enabled {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};

            let mut hasher = DefaultHasher::new();
            attempt.hash(&mut hasher);
            let hash = hasher.finish();

            // ±25% jitter
            let jitter_factor = 0.75 + (hash % 500) as f64 / 1000.0;
            delay *= jitter_factor;
        }

        let delay_ms = delay.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

// ============================================================================
// Parse Errors
// ============================================================================

/// Error type for string parsing failures on identifier types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid format: expected {expected}, got '{actual}'")]
    InvalidFormat { expected: String, actual: String },
}

// ============================================================================
// Module declarations
// ============================================================================

/// Webhook and outbox records plus the persistence traits.
pub mod store;

/// In-memory store adapters for development and tests.
pub mod adapters;

/// Per-source webhook signature verification.
pub mod signature;

/// GitHub integration: enrichment fetcher and projects_v2_item parsing.
pub mod github;

/// Zammad integration: payload models and action classification.
pub mod zammad;

/// Channel routing tables and the routing decision function.
pub mod router;

/// The per-webhook processing pipeline.
pub mod pipeline;

/// Asynchronous task dispatcher with retry.
pub mod dispatch;

/// Outbox drainer and the chat sink boundary.
pub mod delivery;

/// Factories for recurring scheduled messages.
pub mod scheduled;

// Re-export key types for convenience
pub use delivery::{ChatSink, Drainer, DrainerConfig, SinkChannel, SinkError};
pub use dispatch::{DispatchError, TaskDispatcher};
pub use github::{GithubError, GithubGraphqlClient, ProjectItemFetcher};
pub use pipeline::{NotificationEvent, PipelineError, ProcessingOutcome, RouteKey, WebhookProcessor};
pub use router::{ChannelRouter, RoutingConfig, RoutingDecision};
pub use signature::{SignatureError, WebhookSecrets};
pub use store::{DiscordMessage, MessageStore, NewWebhook, StoreError, Webhook, WebhookStore};
pub use zammad::{TicketAction, ZammadError};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
