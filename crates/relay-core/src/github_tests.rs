//! Tests for GitHub webhook enrichment and parsing.

use super::*;
use crate::store::Webhook;
use crate::WebhookSource;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;

// ============================================================================
// Helpers
// ============================================================================

fn github_meta() -> HashMap<String, String> {
    let mut meta = HashMap::new();
    meta.insert("x-github-event".to_string(), "projects_v2_item".to_string());
    meta
}

fn github_webhook(content: serde_json::Value) -> Webhook {
    let now = Utc::now();
    Webhook {
        id: crate::WebhookId::new(),
        source: WebhookSource::Github,
        event: String::new(),
        signature: "sha256=test".to_string(),
        meta: github_meta(),
        content,
        extra: json!({}),
        created_at: now,
        modified_at: now,
        processed_at: None,
    }
}

fn edited_item_content() -> serde_json::Value {
    json!({
        "action": "edited",
        "projects_v2_item": {"node_id": "PVTI_item1"},
        "sender": {
            "login": "testuser",
            "html_url": "https://github.com/testuser"
        },
        "changes": {
            "field_value": {
                "field_name": "Status",
                "field_type": "single_select",
                "from": {"name": "To Do"},
                "to": {"name": "In Progress"}
            }
        }
    })
}

fn issue_node() -> serde_json::Value {
    json!({
        "id": "PVTI_item1",
        "project": {
            "id": "PVT_project1",
            "title": "Test Project",
            "url": "https://github.com/orgs/test/projects/1"
        },
        "content": {
            "__typename": "Issue",
            "id": "I_issue1",
            "title": "Test Issue",
            "url": "https://github.com/test-issue"
        }
    })
}

/// Fetcher returning a canned node without any network.
struct StubFetcher {
    node: serde_json::Value,
}

#[async_trait::async_trait]
impl ProjectItemFetcher for StubFetcher {
    async fn fetch_project_item(&self, _item_id: &str) -> Result<serde_json::Value, GithubError> {
        Ok(self.node.clone())
    }
}

// ============================================================================
// Enrichment (prep) tests
// ============================================================================

mod prep_tests {
    use super::*;

    #[tokio::test]
    async fn test_prep_sets_event_and_extra() {
        let fetcher = StubFetcher { node: issue_node() };
        let mut webhook = github_webhook(edited_item_content());

        prep_github_webhook(&fetcher, &mut webhook).await.unwrap();

        assert_eq!(webhook.event, "projects_v2_item.edited");
        assert_eq!(webhook.extra, issue_node());
    }

    #[tokio::test]
    async fn test_prep_unsupported_event_type_is_rejected() {
        let fetcher = StubFetcher { node: issue_node() };
        let mut webhook = github_webhook(edited_item_content());
        webhook
            .meta
            .insert("x-github-event".to_string(), "push".to_string());

        let result = prep_github_webhook(&fetcher, &mut webhook).await;
        assert!(matches!(
            result,
            Err(GithubError::UnsupportedEvent { event }) if event == "push"
        ));
        // Nothing recorded on the webhook for a skipped event.
        assert_eq!(webhook.event, "");
        assert!(!webhook.is_enriched());
    }

    #[tokio::test]
    async fn test_prep_missing_node_id_is_malformed() {
        let fetcher = StubFetcher { node: issue_node() };
        let mut webhook = github_webhook(json!({"action": "edited"}));

        let result = prep_github_webhook(&fetcher, &mut webhook).await;
        assert!(matches!(result, Err(GithubError::MissingField { .. })));
    }

    #[tokio::test]
    async fn test_prep_is_idempotent() {
        let fetcher = StubFetcher { node: issue_node() };
        let mut webhook = github_webhook(edited_item_content());

        prep_github_webhook(&fetcher, &mut webhook).await.unwrap();
        let first_message = ProjectV2ItemEvent::from_webhook(&webhook)
            .unwrap()
            .to_discord_message();

        // Second prep overwrites extra with equivalent data.
        prep_github_webhook(&fetcher, &mut webhook).await.unwrap();
        let second_message = ProjectV2ItemEvent::from_webhook(&webhook)
            .unwrap()
            .to_discord_message();

        assert_eq!(first_message, second_message);
    }
}

// ============================================================================
// GraphQL client tests
// ============================================================================

mod graphql_client_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_returns_data_node() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("authorization", "Bearer test-token"))
            .and(body_partial_json(json!({
                "variables": {"itemId": "PVTI_item1"}
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"node": issue_node()}})),
            )
            .mount(&server)
            .await;

        let client = GithubGraphqlClient::new("test-token")
            .unwrap()
            .with_endpoint(format!("{}/graphql", server.uri()));

        let node = client.fetch_project_item("PVTI_item1").await.unwrap();
        assert_eq!(node, issue_node());
    }

    #[tokio::test]
    async fn test_fetch_non_success_status_is_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = GithubGraphqlClient::new("test-token")
            .unwrap()
            .with_endpoint(server.uri());

        let result = client.fetch_project_item("PVTI_item1").await;
        match result {
            Err(GithubError::Api { status, body }) => {
                assert_eq!(status, 502);
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_missing_node_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
            .mount(&server)
            .await;

        let client = GithubGraphqlClient::new("test-token")
            .unwrap()
            .with_endpoint(server.uri());

        let result = client.fetch_project_item("PVTI_item1").await;
        assert!(matches!(result, Err(GithubError::MissingField { .. })));
    }

    #[test]
    fn test_api_errors_are_transient() {
        assert!(GithubError::Api {
            status: 500,
            body: String::new()
        }
        .is_transient());
        assert!(!GithubError::NotEnriched.is_transient());
        assert!(!GithubError::UnsupportedEvent {
            event: "push".to_string()
        }
        .is_transient());
    }
}

// ============================================================================
// Parsing and rendering tests
// ============================================================================

mod parse_tests {
    use super::*;

    fn enriched_webhook(content: serde_json::Value, node: serde_json::Value) -> Webhook {
        let mut webhook = github_webhook(content);
        let action = webhook.content["action"].as_str().unwrap().to_string();
        webhook.event = format!("projects_v2_item.{}", action);
        webhook.extra = node;
        webhook
    }

    #[test]
    fn test_parse_before_enrichment_fails_fast() {
        let mut webhook = github_webhook(edited_item_content());
        webhook.event = "projects_v2_item.edited".to_string();

        let result = ProjectV2ItemEvent::from_webhook(&webhook);
        assert!(matches!(result, Err(GithubError::NotEnriched)));
    }

    #[test]
    fn test_single_select_change_renders_full_message() {
        let webhook = enriched_webhook(edited_item_content(), issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert_eq!(
            event.to_discord_message(),
            "[@testuser](https://github.com/testuser) changed **Status** of \
             **[Test Issue](https://github.com/test-issue)** from **To Do** to **In Progress**"
        );
    }

    #[test]
    fn test_date_change_keeps_date_portion_only() {
        let mut content = edited_item_content();
        content["changes"]["field_value"] = json!({
            "field_name": "Due date",
            "field_type": "date",
            "from": "2025-05-01T00:00:00Z",
            "to": null
        });
        let webhook = enriched_webhook(content, issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert!(event
            .to_discord_message()
            .contains("from **2025-05-01** to **None**"));
    }

    #[test]
    fn test_unknown_field_type_renders_none_on_both_sides() {
        let mut content = edited_item_content();
        content["changes"]["field_value"] = json!({
            "field_name": "Iteration",
            "field_type": "iteration",
            "from": {"title": "Sprint 1"},
            "to": {"title": "Sprint 2"}
        });
        let webhook = enriched_webhook(content, issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert!(event
            .to_discord_message()
            .contains("from **None** to **None**"));
    }

    #[test]
    fn test_absent_changes_renders_short_message() {
        let mut content = edited_item_content();
        content.as_object_mut().unwrap().remove("changes");
        content["action"] = json!("created");
        let webhook = enriched_webhook(content, issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert_eq!(
            event.to_discord_message(),
            "[@testuser](https://github.com/testuser) created \
             [Test Issue](https://github.com/test-issue)"
        );
    }

    #[test]
    fn test_edited_action_displays_as_changed_others_verbatim() {
        let webhook = enriched_webhook(edited_item_content(), issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();
        assert_eq!(event.short_action(), "changed");

        let mut content = edited_item_content();
        content["action"] = json!("archived");
        let webhook = enriched_webhook(content, issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();
        assert_eq!(event.short_action(), "archived");
    }

    #[test]
    fn test_draft_issue_renders_bare_title() {
        let mut node = issue_node();
        node["content"] = json!({
            "__typename": "DraftIssue",
            "id": "DI_1",
            "title": "Draft idea"
        });
        let mut content = edited_item_content();
        content.as_object_mut().unwrap().remove("changes");
        let webhook = enriched_webhook(content, node);
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert_eq!(
            event.to_discord_message(),
            "[@testuser](https://github.com/testuser) changed Draft idea"
        );
    }

    #[test]
    fn test_unknown_content_typename_is_unsupported() {
        let mut node = issue_node();
        node["content"] = json!({
            "__typename": "PullRequest",
            "id": "PR_1",
            "title": "Some PR"
        });
        let webhook = enriched_webhook(edited_item_content(), node);

        let result = ProjectV2ItemEvent::from_webhook(&webhook);
        assert!(matches!(
            result,
            Err(GithubError::UnsupportedContentType { typename }) if typename == "PullRequest"
        ));
    }

    #[test]
    fn test_routing_key_is_project_id_with_no_repository_fallback_value() {
        let webhook = enriched_webhook(edited_item_content(), issue_node());
        let event = ProjectV2ItemEvent::from_webhook(&webhook).unwrap();

        assert_eq!(event.project_id(), "PVT_project1");
        assert_eq!(event.repository_id(), None);
    }
}
