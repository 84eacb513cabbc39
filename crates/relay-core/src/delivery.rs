//! # Delivery Module
//!
//! Drains the outbox: every sweep loads the pending messages, resolves
//! each destination through the chat sink, sends, and stamps `sent_at`.
//! Rows are processed independently — an unresolvable channel or a failed
//! send leaves that row pending and moves on, so one bad destination never
//! blocks the queue.
//!
//! Delivery is at-least-once: a crash between send and stamp re-sends on
//! the next sweep. That is the accepted trade-off; the rows themselves
//! carry no retry state.

use crate::store::{MessageStore, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

// ============================================================================
// Chat Sink Boundary
// ============================================================================

/// A resolved destination channel as the sink sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkChannel {
    pub id: String,
    pub name: Option<String>,
}

/// Errors from the chat sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Chat sink request failed: {message}")]
    Request { message: String },

    #[error("Chat sink rejected the message: {status} - {body}")]
    Rejected { status: u16, body: String },
}

/// The delivery boundary: whatever actually talks to Discord.
///
/// `resolve_channel` returning `None` means the channel does not exist (or
/// is not visible to the bot); the drainer leaves such messages pending
/// rather than dropping them, so a fixed permission or a corrected routing
/// table delivers them later.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn resolve_channel(&self, channel_id: &str) -> Result<Option<SinkChannel>, SinkError>;

    async fn send(&self, channel: &SinkChannel, content: &str) -> Result<(), SinkError>;
}

// ============================================================================
// Drainer
// ============================================================================

/// Timing knobs for the drainer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainerConfig {
    /// Pause between sweeps.
    pub poll_interval: Duration,

    /// Budget for a single send, so one stuck call cannot stall the sweep.
    pub send_timeout: Duration,
}

impl Default for DrainerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            send_timeout: Duration::from_secs(10),
        }
    }
}

/// Summary of one sweep, for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Periodic single-consumer drainer over the outbox.
pub struct Drainer {
    messages: Arc<dyn MessageStore>,
    sink: Arc<dyn ChatSink>,
    config: DrainerConfig,
}

impl Drainer {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        sink: Arc<dyn ChatSink>,
        config: DrainerConfig,
    ) -> Self {
        Self {
            messages,
            sink,
            config,
        }
    }

    /// Run sweeps forever at the configured interval.
    ///
    /// Rows inserted while a sweep is in flight are picked up on the next
    /// one; the sweep works off a snapshot.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        // The first tick fires immediately; that is fine, it just drains
        // whatever accumulated before startup.
        loop {
            ticker.tick().await;
            debug!("Polling outbox for pending messages");
            match self.sweep().await {
                Ok(stats) if stats.sent + stats.skipped + stats.failed > 0 => {
                    info!(
                        sent = stats.sent,
                        skipped = stats.skipped,
                        failed = stats.failed,
                        "Outbox sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Outbox sweep failed to load pending messages"),
            }
        }
    }

    /// Deliver every currently-pending message once, oldest first.
    ///
    /// # Errors
    ///
    /// Only a store failure loading the pending snapshot errors the sweep;
    /// per-message failures are counted and logged, never propagated.
    pub async fn sweep(&self) -> Result<SweepStats, StoreError> {
        let pending = self.messages.pending().await?;
        let mut stats = SweepStats::default();

        for message in pending {
            let channel = match self.sink.resolve_channel(&message.channel_id).await {
                Ok(Some(channel)) => channel,
                Ok(None) => {
                    warn!(
                        message_id = %message.id,
                        channel_id = %message.channel_id,
                        channel_name = %message.channel_name,
                        "Channel does not exist; leaving message pending"
                    );
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        message_id = %message.id,
                        channel_id = %message.channel_id,
                        error = %e,
                        "Failed to resolve channel; leaving message pending"
                    );
                    stats.failed += 1;
                    continue;
                }
            };

            let send = tokio::time::timeout(
                self.config.send_timeout,
                self.sink.send(&channel, &message.content),
            )
            .await;

            match send {
                Ok(Ok(())) => match self.messages.mark_sent(message.id, Utc::now()).await {
                    Ok(()) => stats.sent += 1,
                    Err(e) => {
                        // The send already happened; a failed stamp means a
                        // duplicate on the next sweep, which at-least-once
                        // delivery accepts. It must not abort the sweep.
                        warn!(
                            message_id = %message.id,
                            channel_id = %message.channel_id,
                            error = %e,
                            "Sent but failed to stamp sent_at; row stays pending"
                        );
                        stats.failed += 1;
                    }
                },
                Ok(Err(e)) => {
                    warn!(
                        message_id = %message.id,
                        channel_id = %message.channel_id,
                        error = %e,
                        "Send failed; message stays pending for the next sweep"
                    );
                    stats.failed += 1;
                }
                Err(_) => {
                    warn!(
                        message_id = %message.id,
                        channel_id = %message.channel_id,
                        timeout_ms = self.config.send_timeout.as_millis() as u64,
                        "Send timed out; message stays pending for the next sweep"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;
