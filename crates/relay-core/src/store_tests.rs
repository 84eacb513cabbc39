//! Tests for record types and store contracts.

use super::*;
use serde_json::json;

fn sample_webhook() -> Webhook {
    let now = Utc::now();
    Webhook {
        id: WebhookId::new(),
        source: WebhookSource::Internal,
        event: String::new(),
        signature: String::new(),
        meta: HashMap::new(),
        content: json!({"random": "content"}),
        extra: json!({}),
        created_at: now,
        modified_at: now,
        processed_at: None,
    }
}

#[test]
fn test_fresh_webhook_is_not_enriched() {
    let webhook = sample_webhook();
    assert!(!webhook.is_enriched());
}

#[test]
fn test_webhook_with_extra_is_enriched() {
    let mut webhook = sample_webhook();
    webhook.extra = json!({"group": "Helpdesk"});
    assert!(webhook.is_enriched());
}

#[test]
fn test_null_extra_counts_as_not_enriched() {
    let mut webhook = sample_webhook();
    webhook.extra = serde_json::Value::Null;
    assert!(!webhook.is_enriched());
}

#[test]
fn test_new_webhook_builder_sets_fields() {
    let mut meta = HashMap::new();
    meta.insert("x-github-event".to_string(), "projects_v2_item".to_string());

    let new = NewWebhook::new(WebhookSource::Github, json!({"action": "edited"}))
        .with_signature("sha256=abc")
        .with_meta(meta.clone());

    assert_eq!(new.source, WebhookSource::Github);
    assert_eq!(new.signature, "sha256=abc");
    assert_eq!(new.meta, meta);
}

#[test]
fn test_message_pending_state_follows_sent_at() {
    let mut message = DiscordMessage {
        id: MessageId::new(),
        channel_id: "123".to_string(),
        channel_name: "test".to_string(),
        content: "hello".to_string(),
        created_at: Utc::now(),
        sent_at: None,
    };
    assert!(message.is_pending());

    message.sent_at = Some(Utc::now());
    assert!(!message.is_pending());
}

#[test]
fn test_store_error_transience() {
    let not_found = StoreError::NotFound {
        id: "abc".to_string(),
    };
    assert!(!not_found.is_transient());

    let backend = StoreError::Backend {
        message: "connection reset".to_string(),
    };
    assert!(backend.is_transient());
}

#[test]
fn test_webhook_serde_round_trip() {
    let webhook = sample_webhook();
    let encoded = serde_json::to_string(&webhook).unwrap();
    let decoded: Webhook = serde_json::from_str(&encoded).unwrap();
    assert_eq!(webhook, decoded);
}
