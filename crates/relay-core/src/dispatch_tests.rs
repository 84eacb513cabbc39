//! Tests for the task dispatcher and its retry loop.

use super::*;
use crate::adapters::{InMemoryMessageStore, InMemoryWebhookStore};
use crate::github::{GithubError, ProjectItemFetcher};
use crate::pipeline::WebhookProcessor;
use crate::router::{ChannelRouter, RoutingConfig};
use crate::store::{NewWebhook, WebhookStore};
use crate::{DiscordChannel, WebhookSource};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Fixture
// ============================================================================

/// Fetcher that fails with a transient API error a fixed number of times
/// before succeeding, counting every call.
struct FlakyFetcher {
    failures_before_success: usize,
    calls: AtomicUsize,
    permanent: bool,
}

impl FlakyFetcher {
    fn failing_times(n: usize) -> Self {
        Self {
            failures_before_success: n,
            calls: AtomicUsize::new(0),
            permanent: false,
        }
    }

    fn always_permanent() -> Self {
        Self {
            failures_before_success: usize::MAX,
            calls: AtomicUsize::new(0),
            permanent: true,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ProjectItemFetcher for FlakyFetcher {
    async fn fetch_project_item(&self, _item_id: &str) -> Result<serde_json::Value, GithubError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.permanent {
            return Err(GithubError::NotEnriched);
        }
        if call < self.failures_before_success {
            return Err(GithubError::Api {
                status: 502,
                body: "bad gateway".to_string(),
            });
        }
        Ok(json!({
            "id": "PVTI_item1",
            "project": {
                "id": "PVT_board",
                "title": "Board",
                "url": "https://github.com/orgs/test/projects/1"
            },
            "content": {
                "__typename": "Issue",
                "id": "I_issue1",
                "title": "Test Issue",
                "url": "https://github.com/test-issue"
            }
        }))
    }
}

struct Fixture {
    webhooks: Arc<InMemoryWebhookStore>,
    fetcher: Arc<FlakyFetcher>,
    processor: Arc<WebhookProcessor>,
}

fn fixture(fetcher: FlakyFetcher) -> Fixture {
    let webhooks = Arc::new(InMemoryWebhookStore::new());
    let messages = Arc::new(InMemoryMessageStore::new());
    let fetcher = Arc::new(fetcher);

    let mut config = RoutingConfig {
        internal_channel: DiscordChannel::new("111", "internal-alerts"),
        ..Default::default()
    };
    config
        .projects
        .insert("PVT_board".to_string(), DiscordChannel::new("222", "board"));

    let processor = Arc::new(WebhookProcessor::new(
        webhooks.clone(),
        messages,
        fetcher.clone(),
        ChannelRouter::new(config),
    ));

    Fixture {
        webhooks,
        fetcher,
        processor,
    }
}

async fn create_github_webhook(webhooks: &InMemoryWebhookStore) -> crate::WebhookId {
    let mut meta = HashMap::new();
    meta.insert("x-github-event".to_string(), "projects_v2_item".to_string());
    let webhook = webhooks
        .create(
            NewWebhook::new(
                WebhookSource::Github,
                json!({
                    "action": "created",
                    "projects_v2_item": {"node_id": "PVTI_item1"},
                    "sender": {
                        "login": "testuser",
                        "html_url": "https://github.com/testuser"
                    }
                }),
            )
            .with_meta(meta),
        )
        .await
        .unwrap();
    webhook.id
}

async fn create_internal_webhook(webhooks: &InMemoryWebhookStore) -> crate::WebhookId {
    let webhook = webhooks
        .create(NewWebhook::new(
            WebhookSource::Internal,
            json!({"random": "content"}),
        ))
        .await
        .unwrap();
    webhook.id
}

/// Poll until the record is marked processed or the deadline passes.
async fn wait_until_processed(webhooks: &InMemoryWebhookStore, id: crate::WebhookId) -> bool {
    for _ in 0..200 {
        if let Ok(webhook) = webhooks.get(id).await {
            if webhook.processed_at.is_some() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        ..RetryPolicy::fixed(Duration::from_millis(1))
    }
}

// ============================================================================
// Tests
// ============================================================================

mod dispatcher_tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueued_webhook_is_processed_asynchronously() {
        let f = fixture(FlakyFetcher::failing_times(0));
        let id = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(1));
        dispatcher.enqueue(id).unwrap();

        assert!(wait_until_processed(&f.webhooks, id).await);

        drop(dispatcher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried_until_success() {
        let f = fixture(FlakyFetcher::failing_times(2));
        let id = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(5));
        dispatcher.enqueue(id).unwrap();

        assert!(wait_until_processed(&f.webhooks, id).await);
        assert_eq!(f.fetcher.calls(), 3);

        drop(dispatcher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_retries_stop_at_attempt_bound() {
        let f = fixture(FlakyFetcher::failing_times(usize::MAX));
        let id = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(3));
        dispatcher.enqueue(id).unwrap();

        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(f.fetcher.calls(), 3);
        let webhook = f.webhooks.get(id).await.unwrap();
        assert!(webhook.processed_at.is_none());
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let f = fixture(FlakyFetcher::always_permanent());
        let id = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(5));
        dispatcher.enqueue(id).unwrap();

        drop(dispatcher);
        worker.await.unwrap();

        assert_eq!(f.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_retrying_webhook_does_not_block_later_ones() {
        let f = fixture(FlakyFetcher::failing_times(usize::MAX));
        let stuck = create_github_webhook(&f.webhooks).await;
        let quick = create_internal_webhook(&f.webhooks).await;

        // Long backoff: the stuck webhook sleeps between attempts for far
        // longer than the poll deadline below.
        let slow_retries = RetryPolicy {
            max_attempts: 5,
            ..RetryPolicy::fixed(Duration::from_secs(30))
        };
        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), slow_retries);
        dispatcher.enqueue(stuck).unwrap();
        dispatcher.enqueue(quick).unwrap();

        assert!(wait_until_processed(&f.webhooks, quick).await);
        assert!(f.webhooks.get(stuck).await.unwrap().processed_at.is_none());

        worker.abort();
    }

    #[tokio::test]
    async fn test_queue_drains_before_worker_exits() {
        let f = fixture(FlakyFetcher::failing_times(0));
        let first = create_github_webhook(&f.webhooks).await;
        let second = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(1));
        dispatcher.enqueue(first).unwrap();
        dispatcher.enqueue(second).unwrap();
        drop(dispatcher);

        worker.await.unwrap();

        assert!(f.webhooks.get(first).await.unwrap().processed_at.is_some());
        assert!(f.webhooks.get(second).await.unwrap().processed_at.is_some());
    }

    #[tokio::test]
    async fn test_enqueue_after_worker_shutdown_is_closed() {
        let f = fixture(FlakyFetcher::failing_times(0));
        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(1));

        worker.abort();
        let _ = worker.await;

        let result = dispatcher.enqueue(crate::WebhookId::new());
        assert!(matches!(result, Err(DispatchError::Closed)));
    }

    #[tokio::test]
    async fn test_clones_feed_the_same_worker() {
        let f = fixture(FlakyFetcher::failing_times(0));
        let id = create_github_webhook(&f.webhooks).await;

        let (dispatcher, worker) = TaskDispatcher::start(f.processor.clone(), fast_retries(1));
        let clone = dispatcher.clone();
        clone.enqueue(id).unwrap();

        assert!(wait_until_processed(&f.webhooks, id).await);

        drop(dispatcher);
        drop(clone);
        worker.await.unwrap();
    }
}
