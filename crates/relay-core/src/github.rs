//! # GitHub Integration Module
//!
//! GitHub's `projects_v2_item` webhook is a thin pointer: it carries the
//! changed item's node id and an action, but not the title or URL needed
//! for a readable notification. Processing therefore splits into two
//! stages:
//!
//! 1. **Enrichment** ([`prep_github_webhook`]) — fetch the referenced
//!    project item through the GraphQL API and record the result on the
//!    webhook (`event` classification plus `extra`).
//! 2. **Parsing** ([`ProjectV2ItemEvent::from_webhook`]) — build a typed
//!    view over content + extra and render the Discord message. The typed
//!    view can only be constructed from an enriched webhook, so parsing
//!    before enrichment fails fast instead of producing wrong output.

use crate::store::Webhook;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default GraphQL endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com/graphql";

/// The one webhook event type currently supported for enrichment.
pub const SUPPORTED_EVENT: &str = "projects_v2_item";

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Query for the project item a `projects_v2_item` webhook points at.
const PROJECT_ITEM_DETAILS_QUERY: &str = r#"
query($itemId: ID!) {
  node(id: $itemId) {
    ... on ProjectV2Item {
      id
      project {
          id
          title
          url
      }
      content {
        __typename
        ... on DraftIssue {
          id
          title
        }
        ... on Issue {
          id
          title
          url
        }
      }
    }
  }
}
"#;

// ============================================================================
// Errors
// ============================================================================

/// Errors from GitHub webhook enrichment and parsing.
#[derive(Debug, thiserror::Error)]
pub enum GithubError {
    /// Event type this integration does not handle. Intentional skip, never
    /// a retry candidate.
    #[error("Event `{event}` not supported")]
    UnsupportedEvent { event: String },

    /// Non-success response from the GraphQL API. Retryable.
    #[error("GitHub API error: {status} - {body}")]
    Api { status: u16, body: String },

    /// Network-level failure talking to the API (includes timeouts).
    /// Retryable.
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Parsing was attempted before enrichment populated `extra`.
    #[error("Webhook is not enriched yet; run prep_github_webhook first")]
    NotEnriched,

    /// Project item content of a kind the renderer does not know.
    #[error("Content type `{typename}` is not supported")]
    UnsupportedContentType { typename: String },

    /// Structurally unusable payload or enrichment result.
    #[error("Missing or malformed field: {field}")]
    MissingField { field: String },
}

impl GithubError {
    /// Upstream failures may clear up on retry; everything else is a
    /// property of the payload and will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Api { .. } | Self::Request(_))
    }
}

// ============================================================================
// Payload Models
// ============================================================================

/// The parent project of an enriched item, used for routing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubProject {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// The user that triggered the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubSender {
    pub login: String,
    pub html_url: String,
}

impl GithubSender {
    /// Markdown link form used in messages: `[@login](html_url)`.
    fn as_discord_message(&self) -> String {
        format!("[@{}]({})", self.login, self.html_url)
    }
}

/// The item a project entry points at, discriminated by GraphQL typename.
///
/// Draft issues have no URL of their own, so they render as bare text
/// while full issues render as a link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum GithubItem {
    Issue { id: String, title: String, url: String },
    DraftIssue { id: String, title: String },
}

impl GithubItem {
    /// Parse from the `content` object of an enrichment result.
    ///
    /// # Errors
    ///
    /// [`GithubError::UnsupportedContentType`] for typenames other than
    /// `Issue` and `DraftIssue`, [`GithubError::MissingField`] when the
    /// discriminator or a variant field is absent.
    fn from_value(value: &serde_json::Value) -> Result<Self, GithubError> {
        let typename = value
            .get("__typename")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GithubError::MissingField {
                field: "extra.content.__typename".to_string(),
            })?;

        match typename {
            "Issue" | "DraftIssue" => serde_json::from_value(value.clone()).map_err(|_| {
                GithubError::MissingField {
                    field: "extra.content".to_string(),
                }
            }),
            other => Err(GithubError::UnsupportedContentType {
                typename: other.to_string(),
            }),
        }
    }

    fn as_discord_message(&self) -> String {
        match self {
            Self::Issue { title, url, .. } => format!("[{}]({})", title, url),
            Self::DraftIssue { title, .. } => title.clone(),
        }
    }
}

// ============================================================================
// Enrichment Fetcher
// ============================================================================

/// Boundary for the secondary API call that resolves a project item node id
/// into the full object.
#[async_trait]
pub trait ProjectItemFetcher: Send + Sync {
    /// Fetch the project item details for a node id.
    ///
    /// Returns the raw `data.node` object; interpretation is the parser's
    /// job so that unsupported content types surface at parse time, not
    /// here.
    async fn fetch_project_item(&self, item_id: &str) -> Result<serde_json::Value, GithubError>;
}

/// [`ProjectItemFetcher`] backed by the GitHub GraphQL API.
pub struct GithubGraphqlClient {
    http: reqwest::Client,
    endpoint: String,
    token: String,
}

impl GithubGraphqlClient {
    /// Build a client with a bearer token against the public API endpoint.
    ///
    /// All requests carry a bounded timeout so enrichment can never stall
    /// the pipeline indefinitely.
    pub fn new(token: impl Into<String>) -> Result<Self, GithubError> {
        let http = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: GITHUB_API_URL.to_string(),
            token: token.into(),
        })
    }

    /// Point the client at a different endpoint. Used by tests.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl std::fmt::Debug for GithubGraphqlClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubGraphqlClient")
            .field("endpoint", &self.endpoint)
            .field("token", &"<REDACTED>")
            .finish()
    }
}

#[async_trait]
impl ProjectItemFetcher for GithubGraphqlClient {
    async fn fetch_project_item(&self, item_id: &str) -> Result<serde_json::Value, GithubError> {
        let payload = serde_json::json!({
            "query": PROJECT_ITEM_DETAILS_QUERY,
            "variables": { "itemId": item_id },
        });

        debug!(item_id = %item_id, "Fetching project item details");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GithubError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let mut body: serde_json::Value = response.json().await?;
        let node = body
            .get_mut("data")
            .and_then(|d| d.get_mut("node"))
            .map(serde_json::Value::take)
            .ok_or_else(|| GithubError::MissingField {
                field: "data.node".to_string(),
            })?;

        Ok(node)
    }
}

// ============================================================================
// Enrichment (prep)
// ============================================================================

/// Download the extra data that is missing from the webhook but needed for
/// rendering and routing, and record it on the webhook.
///
/// Sets `webhook.event` to `{event_type}.{action}` and `webhook.extra` to
/// the fetched node. The caller persists the mutated record. Safe to run
/// twice: a retry re-fetches and overwrites `extra` with equivalent data.
///
/// # Errors
///
/// [`GithubError::UnsupportedEvent`] for event types other than
/// `projects_v2_item` — callers treat this as "skip, do not retry".
/// [`GithubError::Api`] / [`GithubError::Request`] for upstream failures,
/// which are retryable.
pub async fn prep_github_webhook(
    fetcher: &dyn ProjectItemFetcher,
    webhook: &mut Webhook,
) -> Result<(), GithubError> {
    let event = webhook
        .meta
        .get("x-github-event")
        .ok_or_else(|| GithubError::MissingField {
            field: "meta.x-github-event".to_string(),
        })?
        .clone();

    if event != SUPPORTED_EVENT {
        return Err(GithubError::UnsupportedEvent { event });
    }

    let node_id = webhook
        .content
        .get("projects_v2_item")
        .and_then(|item| item.get("node_id"))
        .and_then(|id| id.as_str())
        .ok_or_else(|| GithubError::MissingField {
            field: "projects_v2_item.node_id".to_string(),
        })?;

    let action = webhook
        .content
        .get("action")
        .and_then(|a| a.as_str())
        .ok_or_else(|| GithubError::MissingField {
            field: "action".to_string(),
        })?;

    let node = fetcher.fetch_project_item(node_id).await?;

    webhook.event = format!("{}.{}", event, action);
    webhook.extra = node;
    Ok(())
}

// ============================================================================
// Typed Event View
// ============================================================================

/// A change to one project field, already formatted for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: String,
    pub from: String,
    pub to: String,
}

impl FieldChange {
    /// Extract the field change from the raw payload, if any.
    ///
    /// Some webhooks simply carry no `changes` key; that renders as a
    /// message without a change clause. Dates keep only the date portion of
    /// the ISO timestamp, single-select values use their option name, and
    /// anything else (or a null side) renders as the literal `None`.
    fn from_content(content: &serde_json::Value) -> Result<Option<Self>, GithubError> {
        let Some(changes) = content.get("changes") else {
            return Ok(None);
        };

        let fv = changes
            .get("field_value")
            .ok_or_else(|| GithubError::MissingField {
                field: "changes.field_value".to_string(),
            })?;

        let field = fv
            .get("field_name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GithubError::MissingField {
                field: "changes.field_value.field_name".to_string(),
            })?
            .to_string();

        let field_type = fv
            .get("field_type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GithubError::MissingField {
                field: "changes.field_value.field_type".to_string(),
            })?;

        let (from, to) = match field_type {
            "date" => (date_part(fv.get("from")), date_part(fv.get("to"))),
            "single_select" => (select_name(fv.get("from")), select_name(fv.get("to"))),
            _ => ("None".to_string(), "None".to_string()),
        };

        Ok(Some(Self { field, from, to }))
    }
}

/// The date portion of an ISO datetime, or the literal `None`.
fn date_part(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.split('T').next().unwrap_or(s).to_string())
        .unwrap_or_else(|| "None".to_string())
}

/// The `name` of a single-select option, or the literal `None`.
fn select_name(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(|v| v.get("name"))
        .and_then(|n| n.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "None".to_string())
}

/// Typed view over an enriched `projects_v2_item` webhook.
///
/// Constructible only once enrichment has populated `extra`, which makes
/// the prep-before-parse precondition part of the type rather than a
/// runtime presence check scattered through rendering code.
#[derive(Debug, Clone)]
pub struct ProjectV2ItemEvent {
    action: String,
    sender: GithubSender,
    change: Option<FieldChange>,
    project: GithubProject,
    item: GithubItem,
}

impl ProjectV2ItemEvent {
    /// Build the typed view from a stored webhook.
    ///
    /// # Errors
    ///
    /// [`GithubError::NotEnriched`] when `extra` is still empty — the
    /// caller must run [`prep_github_webhook`] first. Structural problems
    /// in content or extra surface as [`GithubError::MissingField`] or
    /// [`GithubError::UnsupportedContentType`].
    pub fn from_webhook(webhook: &Webhook) -> Result<Self, GithubError> {
        if !webhook.is_enriched() {
            return Err(GithubError::NotEnriched);
        }

        let (event_type, action) =
            webhook
                .event
                .split_once('.')
                .ok_or_else(|| GithubError::MissingField {
                    field: "event".to_string(),
                })?;
        if event_type != SUPPORTED_EVENT {
            return Err(GithubError::UnsupportedEvent {
                event: event_type.to_string(),
            });
        }

        let sender_value =
            webhook
                .content
                .get("sender")
                .ok_or_else(|| GithubError::MissingField {
                    field: "sender".to_string(),
                })?;
        let sender: GithubSender = serde_json::from_value(sender_value.clone())
            .map_err(|_| GithubError::MissingField {
                field: "sender".to_string(),
            })?;

        let change = FieldChange::from_content(&webhook.content)?;

        let project_value =
            webhook
                .extra
                .get("project")
                .ok_or_else(|| GithubError::MissingField {
                    field: "extra.project".to_string(),
                })?;
        let project: GithubProject = serde_json::from_value(project_value.clone())
            .map_err(|_| GithubError::MissingField {
                field: "extra.project".to_string(),
            })?;

        let content_value =
            webhook
                .extra
                .get("content")
                .ok_or_else(|| GithubError::MissingField {
                    field: "extra.content".to_string(),
                })?;
        let item = GithubItem::from_value(content_value)?;

        Ok(Self {
            action: action.to_string(),
            sender,
            change,
            project,
            item,
        })
    }

    /// The short display verb for the stored action.
    ///
    /// `edited` reads badly in a sentence, so it becomes `changed`; other
    /// actions pass through verbatim.
    pub fn short_action(&self) -> &str {
        match self.action.as_str() {
            "edited" => "changed",
            other => other,
        }
    }

    /// Project id used as the routing key.
    pub fn project_id(&self) -> &str {
        &self.project.id
    }

    /// Repository id fallback for routing. Project items are not tied to a
    /// repository in the payloads we receive, so this is currently always
    /// `None`.
    pub fn repository_id(&self) -> Option<String> {
        None
    }

    /// Render the notification text.
    pub fn to_discord_message(&self) -> String {
        let sender = self.sender.as_discord_message();
        let object = self.item.as_discord_message();

        match &self.change {
            Some(change) => format!(
                "{} {} **{}** of **{}** from **{}** to **{}**",
                sender,
                self.short_action(),
                change.field,
                object,
                change.from,
                change.to,
            ),
            None => format!("{} {} {}", sender, self.short_action(), object),
        }
    }
}

#[cfg(test)]
#[path = "github_tests.rs"]
mod tests;
