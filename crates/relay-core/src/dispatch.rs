//! # Task Dispatch Module
//!
//! Decouples webhook acceptance from webhook processing: the HTTP handler
//! enqueues a webhook id and returns immediately, a worker task drains the
//! queue and runs the pipeline with bounded retry for transient failures.
//!
//! The queue is in-process (tokio mpsc); the worker spawns one task per
//! enqueued id, so a webhook sleeping out a retry backoff never delays the
//! ones behind it. The pipeline itself is idempotent against re-enqueueing
//! the same record.

use crate::pipeline::{ProcessingOutcome, WebhookProcessor};
use crate::{RetryPolicy, WebhookId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

// ============================================================================
// Errors
// ============================================================================

/// Errors from enqueueing work.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The worker has shut down and the queue is closed.
    #[error("Dispatcher is not running")]
    Closed,
}

// ============================================================================
// Task Dispatcher
// ============================================================================

/// Handle for scheduling webhook processing outside the request cycle.
///
/// Cheap to clone; all clones feed the same worker.
#[derive(Clone)]
pub struct TaskDispatcher {
    tx: mpsc::UnboundedSender<WebhookId>,
}

impl TaskDispatcher {
    /// Start the dispatcher worker and return the handle pair.
    ///
    /// Each enqueued id gets its own task, so one webhook waiting out a
    /// retry backoff does not hold up the rest of the queue. The worker
    /// runs until every sender handle is dropped, then waits for the
    /// in-flight tasks and exits.
    pub fn start(
        processor: Arc<WebhookProcessor>,
        retry_policy: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<WebhookId>();

        let worker = tokio::spawn(async move {
            let mut in_flight: JoinSet<()> = JoinSet::new();
            while let Some(webhook_id) = rx.recv().await {
                let processor = Arc::clone(&processor);
                let policy = retry_policy.clone();
                in_flight.spawn(async move {
                    process_with_retry(processor.as_ref(), webhook_id, &policy).await;
                });
                // Reap completed tasks so the set does not grow unbounded.
                while in_flight.try_join_next().is_some() {}
            }
            while in_flight.join_next().await.is_some() {}
            info!("Task dispatcher worker shutting down");
        });

        (Self { tx }, worker)
    }

    /// Schedule a webhook for asynchronous processing.
    pub fn enqueue(&self, id: WebhookId) -> Result<(), DispatchError> {
        self.tx.send(id).map_err(|_| DispatchError::Closed)
    }
}

/// Run one webhook through the pipeline, retrying transient failures with
/// backoff up to the policy's attempt bound.
///
/// Permanent failures and exhausted retries are logged at error level;
/// that log stream is the operator's task-result inspection surface.
async fn process_with_retry(
    processor: &WebhookProcessor,
    webhook_id: WebhookId,
    policy: &RetryPolicy,
) {
    let mut attempt: u32 = 1;

    loop {
        match processor.process(webhook_id).await {
            Ok(outcome) => {
                log_outcome(webhook_id, &outcome);
                return;
            }

            Err(error) if error.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.calculate_delay(attempt + 1);
                warn!(
                    webhook_id = %webhook_id,
                    error = %error,
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient processing failure; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }

            Err(error) => {
                error!(
                    webhook_id = %webhook_id,
                    error = %error,
                    attempts = attempt,
                    transient = error.is_transient(),
                    "Webhook processing failed"
                );
                return;
            }
        }
    }
}

fn log_outcome(webhook_id: WebhookId, outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Queued {
            message_id,
            channel_name,
        } => {
            info!(
                webhook_id = %webhook_id,
                message_id = %message_id,
                channel_name = %channel_name,
                "Webhook processed; message queued"
            );
        }
        ProcessingOutcome::Suppressed => {
            info!(webhook_id = %webhook_id, "Webhook processed; suppressed");
        }
        ProcessingOutcome::SkippedUnsupportedEvent { event } => {
            info!(
                webhook_id = %webhook_id,
                event = %event,
                "Webhook skipped; unsupported event type"
            );
        }
        ProcessingOutcome::AlreadyProcessed => {
            info!(webhook_id = %webhook_id, "Webhook was already processed");
        }
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
