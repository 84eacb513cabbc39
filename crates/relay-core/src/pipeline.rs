//! # Processing Pipeline Module
//!
//! Turns one stored webhook into zero or one queued Discord messages:
//! load, per-source prep and parse, route, enqueue, mark processed. All
//! steps within one webhook are strictly sequential; independent webhooks
//! may be processed concurrently because each owns its own record and
//! outbox row.
//!
//! The processor is invoked by the task dispatcher outside the HTTP
//! request/response cycle, so a slow enrichment call never delays the
//! response to the webhook sender.

use crate::github::{self, GithubError, ProjectItemFetcher, ProjectV2ItemEvent};
use crate::router::{ChannelRouter, RoutingDecision};
use crate::store::{MessageStore, StoreError, Webhook, WebhookStore};
use crate::zammad::{self, ZammadError};
use crate::{MessageId, WebhookId, WebhookSource};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

// ============================================================================
// Notification Event
// ============================================================================

/// Value used by the router to pick a destination. The variant encodes the
/// source, so mismatched lookups are unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteKey {
    /// Internal webhooks always go to the fixed ops/test channel.
    Internal,

    /// GitHub notifications route by project id, falling back to the
    /// repository table.
    Project {
        project_id: String,
        repository_id: Option<String>,
    },

    /// Zammad notifications route by group name.
    Group(String),
}

/// A normalized notification: display text plus routing key. Transient —
/// produced by a parser, consumed by the router, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    pub text: String,
    pub route: RouteKey,
}

// ============================================================================
// Errors and Outcomes
// ============================================================================

/// Errors escaping the processing pipeline.
///
/// Everything propagates to the dispatcher so its retry/failure tracking
/// sees it; the only swallowed paths are the two designed skips
/// (unsupported GitHub event type, suppressed routing), which are
/// outcomes, not errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Github(#[from] GithubError),

    #[error(transparent)]
    Zammad(#[from] ZammadError),
}

impl PipelineError {
    /// Whether the dispatcher should retry this webhook.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            Self::Github(e) => e.is_transient(),
            // Zammad processing is local and deterministic; a failure is a
            // payload or logic defect and will repeat identically.
            Self::Zammad(_) => false,
        }
    }
}

/// How processing one webhook ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// A message was queued for delivery.
    Queued {
        message_id: MessageId,
        channel_name: String,
    },

    /// Routing decided this notification goes nowhere. Still processed.
    Suppressed,

    /// The event type is one this pipeline will never handle. The record
    /// is marked processed so it is not retried forever.
    SkippedUnsupportedEvent { event: String },

    /// The record had already been processed by an earlier attempt.
    AlreadyProcessed,
}

// ============================================================================
// Webhook Processor
// ============================================================================

/// The glue object owning one pass over a webhook record.
pub struct WebhookProcessor {
    webhooks: Arc<dyn WebhookStore>,
    messages: Arc<dyn MessageStore>,
    fetcher: Arc<dyn ProjectItemFetcher>,
    router: ChannelRouter,
}

impl WebhookProcessor {
    pub fn new(
        webhooks: Arc<dyn WebhookStore>,
        messages: Arc<dyn MessageStore>,
        fetcher: Arc<dyn ProjectItemFetcher>,
        router: ChannelRouter,
    ) -> Self {
        Self {
            webhooks,
            messages,
            fetcher,
            router,
        }
    }

    /// Process one webhook end to end.
    ///
    /// Idempotent against task-level retries: a record whose
    /// `processed_at` is already set is left untouched.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for a missing record is fatal (a defect,
    /// not retried). Upstream API failures are transient and surface to
    /// the dispatcher's retry loop.
    pub async fn process(&self, id: WebhookId) -> Result<ProcessingOutcome, PipelineError> {
        let mut webhook = self.webhooks.get(id).await?;

        if webhook.processed_at.is_some() {
            debug!(webhook_id = %id, "Webhook already processed; skipping");
            return Ok(ProcessingOutcome::AlreadyProcessed);
        }

        let notification = match webhook.source {
            WebhookSource::Internal => self.parse_internal(&webhook),

            WebhookSource::Github => {
                match github::prep_github_webhook(self.fetcher.as_ref(), &mut webhook).await {
                    Ok(()) => {}
                    Err(GithubError::UnsupportedEvent { event }) => {
                        // This event type is never going to be supported.
                        // Mark the record processed so it does not stay
                        // retry-eligible forever.
                        info!(
                            webhook_id = %id,
                            event = %event,
                            "Unsupported GitHub event type; skipping"
                        );
                        webhook.event = event.clone();
                        webhook.processed_at = Some(Utc::now());
                        self.webhooks.save(&webhook).await?;
                        return Ok(ProcessingOutcome::SkippedUnsupportedEvent { event });
                    }
                    Err(e) => return Err(e.into()),
                }
                self.webhooks.save(&webhook).await?;

                let parsed = ProjectV2ItemEvent::from_webhook(&webhook)?;
                NotificationEvent {
                    text: format!("GitHub: {}", parsed.to_discord_message()),
                    route: RouteKey::Project {
                        project_id: parsed.project_id().to_string(),
                        repository_id: parsed.repository_id(),
                    },
                }
            }

            WebhookSource::Zammad => {
                zammad::prep_zammad_webhook(&mut webhook)?;
                self.webhooks.save(&webhook).await?;

                let parsed = zammad::parse_zammad_webhook(&webhook)?;
                NotificationEvent {
                    text: format!("Zammad: {}", parsed.message),
                    route: RouteKey::Group(parsed.group),
                }
            }
        };

        let outcome = match self.router.route(&notification.route) {
            RoutingDecision::Suppress => {
                info!(
                    webhook_id = %id,
                    source = %webhook.source,
                    "Notification suppressed by routing"
                );
                ProcessingOutcome::Suppressed
            }

            RoutingDecision::Deliver(channel) => {
                let message = self
                    .messages
                    .enqueue(&channel, notification.text)
                    .await?;

                info!(
                    webhook_id = %id,
                    message_id = %message.id,
                    channel = %channel,
                    "Notification queued for delivery"
                );

                ProcessingOutcome::Queued {
                    message_id: message.id,
                    channel_name: channel.name,
                }
            }
        };

        webhook.processed_at = Some(Utc::now());
        self.webhooks.save(&webhook).await?;

        Ok(outcome)
    }

    /// Internal webhooks are trivial: echo the payload to the ops channel.
    fn parse_internal(&self, webhook: &Webhook) -> NotificationEvent {
        NotificationEvent {
            text: format!("Webhook content: {}", webhook.content),
            route: RouteKey::Internal,
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
