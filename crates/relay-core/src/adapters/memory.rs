//! # In-Memory Store Implementations
//!
//! Thread-safe in-memory adapters for [`WebhookStore`] and [`MessageStore`].
//! Used in tests and single-process development deployments; state does not
//! survive a restart.

use crate::store::{
    DiscordMessage, MessageStore, NewWebhook, StoreError, Webhook, WebhookStore,
};
use crate::{DiscordChannel, MessageId, WebhookId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// InMemoryWebhookStore
// ============================================================================

/// Thread-safe in-memory webhook store.
///
/// Uses an async RwLock around a HashMap; clones share the same state.
#[derive(Clone, Default)]
pub struct InMemoryWebhookStore {
    records: Arc<RwLock<HashMap<WebhookId, Webhook>>>,
}

impl InMemoryWebhookStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, for assertions in tests.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl WebhookStore for InMemoryWebhookStore {
    async fn create(&self, new: NewWebhook) -> Result<Webhook, StoreError> {
        let now = Utc::now();
        let webhook = Webhook {
            id: WebhookId::new(),
            source: new.source,
            event: String::new(),
            signature: new.signature,
            meta: new.meta,
            content: new.content,
            extra: serde_json::Value::Object(serde_json::Map::new()),
            created_at: now,
            modified_at: now,
            processed_at: None,
        };

        self.records
            .write()
            .await
            .insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    async fn get(&self, id: WebhookId) -> Result<Webhook, StoreError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })
    }

    async fn save(&self, webhook: &Webhook) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let stored = records
            .get_mut(&webhook.id)
            .ok_or_else(|| StoreError::NotFound {
                id: webhook.id.to_string(),
            })?;

        // Only the mutable fields are taken from the caller's copy.
        stored.event = webhook.event.clone();
        stored.extra = webhook.extra.clone();
        stored.processed_at = webhook.processed_at;
        stored.modified_at = Utc::now();
        Ok(())
    }
}

// ============================================================================
// InMemoryMessageStore
// ============================================================================

/// Thread-safe in-memory outbox store.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    messages: Arc<RwLock<Vec<DiscordMessage>>>,
}

impl InMemoryMessageStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages regardless of state, for assertions in tests.
    pub async fn all(&self) -> Vec<DiscordMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn enqueue(
        &self,
        channel: &DiscordChannel,
        content: String,
    ) -> Result<DiscordMessage, StoreError> {
        let message = DiscordMessage {
            id: MessageId::new(),
            channel_id: channel.id.clone(),
            channel_name: channel.name.clone(),
            content,
            created_at: Utc::now(),
            sent_at: None,
        };

        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn pending(&self) -> Result<Vec<DiscordMessage>, StoreError> {
        let messages = self.messages.read().await;
        let mut pending: Vec<DiscordMessage> = messages
            .iter()
            .filter(|m| m.is_pending())
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        Ok(pending)
    }

    async fn mark_sent(&self, id: MessageId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut messages = self.messages.write().await;
        let message = messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;

        message.sent_at = Some(at);
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
