//! # Zammad Integration Module
//!
//! Zammad trigger webhooks send the full ticket object without saying what
//! happened, so the action is inferred from the payload instead of read
//! from it. The inference is an ordered rule table: the first matching
//! predicate wins, and the order is load-bearing (see
//! [`CLASSIFICATION_RULES`]).
//!
//! Unlike GitHub, the payload is self-contained, so the prep step is a
//! purely local computation that records the classification result on the
//! webhook for replay-safe parsing.

use crate::store::Webhook;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ticket deep-link template; the ticket id is appended.
const TICKET_URL_BASE: &str = "https://servicedesk.europython.eu/#ticket/zoom/";

// ============================================================================
// Errors
// ============================================================================

/// Errors from Zammad webhook classification and parsing.
#[derive(Debug, thiserror::Error)]
pub enum ZammadError {
    /// Payload does not match the expected ticket/article shape.
    #[error("Malformed Zammad payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// No classification rule matched. The rules are exhaustive over the
    /// payload shapes Zammad produces, so hitting this is a defect signal,
    /// not a retry candidate.
    #[error("Unsupported scenario")]
    UnsupportedScenario,

    /// Parsing was attempted before the prep step recorded its result.
    #[error("Webhook is not prepped yet; run prep_zammad_webhook first")]
    NotReady,

    /// Prep result on the record is missing an expected field.
    #[error("Missing field in prepped webhook: {field}")]
    MissingField { field: String },
}

// ============================================================================
// Payload Models
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZammadGroup {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZammadUser {
    pub firstname: String,
    pub lastname: String,
}

/// The ticket object. Always present in a trigger webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZammadTicket {
    pub id: i64,
    pub group: ZammadGroup,
    pub title: String,
    pub owner: ZammadUser,
    pub state: String,
    pub number: String,
    pub customer: ZammadUser,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: ZammadUser,
    pub article_ids: Vec<i64>,
}

/// The newest article, when the triggering change produced one. A pure
/// state change (for example closing a ticket) carries no article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZammadArticle {
    pub sender: String,
    pub internal: bool,
    pub ticket_id: i64,
    pub created_at: DateTime<Utc>,
    pub created_by: ZammadUser,
    pub subject: String,
}

/// A decoded trigger webhook payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZammadEvent {
    pub ticket: ZammadTicket,
    pub article: Option<ZammadArticle>,
}

impl ZammadEvent {
    /// Decode the raw webhook content.
    pub fn from_content(content: &serde_json::Value) -> Result<Self, ZammadError> {
        Ok(serde_json::from_value(content.clone())?)
    }

    /// Deep link to the ticket in the service desk UI.
    pub fn ticket_url(&self) -> String {
        format!("{}{}", TICKET_URL_BASE, self.ticket.id)
    }

    /// First name of whoever made the change, used as the message sender.
    pub fn updated_by(&self) -> &str {
        &self.ticket.updated_by.firstname
    }

    /// Group name, used as the routing key.
    pub fn group(&self) -> &str {
        &self.ticket.group.name
    }
}

// ============================================================================
// Action Classification
// ============================================================================

/// What happened to the ticket, as inferred from the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketAction {
    NewTicketCreated,
    NewInternalNote,
    NewMessageInThread,
    RepliedInThread,
    UpdatedTicket,
}

impl TicketAction {
    /// Stable tag stored in `webhook.event` and `webhook.extra`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewTicketCreated => "new_ticket_created",
            Self::NewInternalNote => "new_internal_note",
            Self::NewMessageInThread => "new_message_in_thread",
            Self::RepliedInThread => "replied_in_thread",
            Self::UpdatedTicket => "updated_ticket",
        }
    }

    /// The verb phrase used in the rendered message.
    pub fn verb(&self) -> &'static str {
        match self {
            Self::NewTicketCreated => "created new ticket",
            Self::NewInternalNote => "created internal note",
            Self::NewMessageInThread => "sent a new message",
            Self::RepliedInThread => "replied to a ticket",
            Self::UpdatedTicket => "updated ticket",
        }
    }
}

impl std::fmt::Display for TicketAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Predicate = fn(&ZammadEvent) -> bool;

/// Ordered classification rules; the first matching predicate wins.
///
/// The order encodes a deliberate ambiguity: a customer's first message
/// both creates the ticket and would match the customer-sender rule, but
/// rule 1 fires first because the ticket has exactly one article id at
/// that moment. The same message arriving later in the thread (more
/// article ids) falls through to the sender rules.
pub const CLASSIFICATION_RULES: &[(Predicate, TicketAction)] = &[
    (has_first_article, TicketAction::NewTicketCreated),
    (has_internal_note, TicketAction::NewInternalNote),
    (has_customer_message, TicketAction::NewMessageInThread),
    (has_agent_reply, TicketAction::RepliedInThread),
    (has_no_article, TicketAction::UpdatedTicket),
];

fn has_first_article(event: &ZammadEvent) -> bool {
    event.article.is_some() && event.ticket.article_ids.len() == 1
}

fn has_internal_note(event: &ZammadEvent) -> bool {
    event.article.as_ref().is_some_and(|a| a.internal)
}

fn has_customer_message(event: &ZammadEvent) -> bool {
    event.article.as_ref().is_some_and(|a| a.sender == "Customer")
}

fn has_agent_reply(event: &ZammadEvent) -> bool {
    event.article.as_ref().is_some_and(|a| a.sender == "Agent")
}

fn has_no_article(event: &ZammadEvent) -> bool {
    event.article.is_none()
}

/// Classify a decoded event into a [`TicketAction`].
///
/// # Errors
///
/// [`ZammadError::UnsupportedScenario`] when no rule matches. The rules
/// are exhaustive over article presence and the sender values Zammad
/// emits, so this path should be unreachable; it exists to turn a silent
/// misclassification into a loud failure.
pub fn classify(event: &ZammadEvent) -> Result<TicketAction, ZammadError> {
    CLASSIFICATION_RULES
        .iter()
        .find(|(predicate, _)| predicate(event))
        .map(|(_, action)| *action)
        .ok_or(ZammadError::UnsupportedScenario)
}

// ============================================================================
// Rendering and Prep
// ============================================================================

/// Render the notification text for a classified event.
pub fn render_message(event: &ZammadEvent, action: TicketAction) -> String {
    format!(
        "{}: {} {} {}",
        event.group(),
        event.updated_by(),
        action.verb(),
        event.ticket_url(),
    )
}

/// Classify the webhook and record the result for later pickup.
///
/// Sets `webhook.event` to the action tag and `webhook.extra` to
/// `{group, sender, action, message}`. Analogous to GitHub enrichment but
/// synchronous and local, because the Zammad payload is self-contained.
/// The caller persists the mutated record.
pub fn prep_zammad_webhook(webhook: &mut Webhook) -> Result<(), ZammadError> {
    let event = ZammadEvent::from_content(&webhook.content)?;
    let action = classify(&event)?;
    let message = render_message(&event, action);

    webhook.event = action.as_str().to_string();
    webhook.extra = serde_json::json!({
        "group": event.group(),
        "sender": event.updated_by(),
        "action": action.as_str(),
        "message": message,
    });
    Ok(())
}

/// The prep result as the pipeline consumes it: rendered message text plus
/// the group routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZammadNotification {
    pub group: String,
    pub message: String,
}

/// Read the prep result back off a webhook.
///
/// # Errors
///
/// [`ZammadError::NotReady`] when `extra` is still empty — the caller must
/// run [`prep_zammad_webhook`] first.
pub fn parse_zammad_webhook(webhook: &Webhook) -> Result<ZammadNotification, ZammadError> {
    if !webhook.is_enriched() {
        return Err(ZammadError::NotReady);
    }

    let group = webhook
        .extra
        .get("group")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ZammadError::MissingField {
            field: "group".to_string(),
        })?
        .to_string();

    let message = webhook
        .extra
        .get("message")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ZammadError::MissingField {
            field: "message".to_string(),
        })?
        .to_string();

    Ok(ZammadNotification { group, message })
}

#[cfg(test)]
#[path = "zammad_tests.rs"]
mod tests;
