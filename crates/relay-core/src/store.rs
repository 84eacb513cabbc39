//! # Record Store Module
//!
//! The two persisted record types of the pipeline and the trait seams that
//! abstract their storage.
//!
//! A [`Webhook`] row is written once per accepted inbound request and then
//! mutated by the processing pipeline (event classification, enrichment
//! result, completion marker). A [`DiscordMessage`] row is the outbox entry
//! for one rendered notification, mutated exactly once when the drainer
//! marks it sent. Neither record is ever deleted by the pipeline.

use crate::{DiscordChannel, MessageId, WebhookId, WebhookSource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Records
// ============================================================================

/// One inbound webhook, as persisted before asynchronous processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: WebhookId,
    pub source: WebhookSource,

    /// Classification string set by the prep/enrichment step, for example
    /// `projects_v2_item.edited` or a Zammad action tag. Empty until then.
    pub event: String,

    /// The verified signature header value, stored for audit.
    pub signature: String,

    /// Selected inbound headers (source-specific prefix filter, lowercased
    /// keys).
    pub meta: HashMap<String, String>,

    /// Raw decoded JSON payload. Immutable after creation.
    pub content: serde_json::Value,

    /// Enrichment result. Empty object until enrichment runs; parsers that
    /// need it must fail fast while it is empty.
    pub extra: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,

    /// Set once the pipeline finished with this record, whether it produced
    /// a message, was suppressed, or was skipped as unsupported. Non-null
    /// means a naive retry of the same task must not reprocess it.
    pub processed_at: Option<DateTime<Utc>>,
}

impl Webhook {
    /// Whether the enrichment step has populated `extra` yet.
    pub fn is_enriched(&self) -> bool {
        match &self.extra {
            serde_json::Value::Object(map) => !map.is_empty(),
            serde_json::Value::Null => false,
            _ => true,
        }
    }
}

/// Input for creating a webhook record.
///
/// `event` starts empty and `extra` starts as an empty object; both are
/// filled in by the processing pipeline, not at the boundary.
#[derive(Debug, Clone)]
pub struct NewWebhook {
    pub source: WebhookSource,
    pub signature: String,
    pub meta: HashMap<String, String>,
    pub content: serde_json::Value,
}

impl NewWebhook {
    pub fn new(source: WebhookSource, content: serde_json::Value) -> Self {
        Self {
            source,
            signature: String::new(),
            meta: HashMap::new(),
            content,
        }
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_meta(mut self, meta: HashMap<String, String>) -> Self {
        self.meta = meta;
        self
    }
}

/// One queued Discord notification (the delivery-queue outbox row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordMessage {
    pub id: MessageId,

    /// Destination channel id, kept as a string; the sink casts as needed.
    pub channel_id: String,

    /// Channel name at the time the message was queued. Not re-resolved at
    /// send time: a renamed channel keeps the name valid when queued.
    pub channel_name: String,

    /// Fully rendered message text.
    pub content: String,

    pub created_at: DateTime<Utc>,

    /// Null while the message is pending; stamped by the drainer on send.
    pub sent_at: Option<DateTime<Utc>>,
}

impl DiscordMessage {
    pub fn is_pending(&self) -> bool {
        self.sent_at.is_none()
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from the record stores.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Record not found: {id}")]
    NotFound { id: String },

    #[error("Store backend failure: {message}")]
    Backend { message: String },
}

impl StoreError {
    /// A missing record is a programming or data defect, never retryable;
    /// backend failures may clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::Backend { .. } => true,
        }
    }
}

// ============================================================================
// Store Traits
// ============================================================================

/// Persistence boundary for webhook records.
///
/// The pipeline only needs create/get/save; retention, cleanup, and
/// querying for operators are deployment concerns outside this trait.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Persist a freshly accepted webhook with `event = ""`, `extra = {}`
    /// and `processed_at = None`.
    async fn create(&self, new: NewWebhook) -> Result<Webhook, StoreError>;

    /// Load a webhook by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when no record with that id exists.
    async fn get(&self, id: WebhookId) -> Result<Webhook, StoreError>;

    /// Persist mutations to `event`, `extra` and `processed_at`.
    ///
    /// Implementations bump `modified_at`; `content`, `meta`, `signature`
    /// and `created_at` are immutable after creation.
    async fn save(&self, webhook: &Webhook) -> Result<(), StoreError>;
}

/// Persistence boundary for the delivery-queue outbox.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert a pending message for the given channel. `sent_at` starts
    /// null.
    async fn enqueue(
        &self,
        channel: &DiscordChannel,
        content: String,
    ) -> Result<DiscordMessage, StoreError>;

    /// Snapshot of all pending messages, oldest first.
    ///
    /// Rows inserted while a drain sweep is running are picked up by the
    /// next sweep, not necessarily the current one.
    async fn pending(&self) -> Result<Vec<DiscordMessage>, StoreError>;

    /// Stamp a message as sent. The transition is one-directional.
    async fn mark_sent(&self, id: MessageId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
