//! Factory functions for recurring scheduled messages.
//!
//! A factory renders a named announcement into outbox content for a
//! configured channel; the caller enqueues the result like any other
//! notification and the drainer delivers it with the next batch.

use crate::store::{DiscordMessage, MessageStore, StoreError};
use crate::DiscordChannel;

/// Known factory names, in registry order.
pub const FACTORY_NAMES: &[&str] = &["standup"];

/// Render the weekly standup prompt.
fn standup_message(board_role_id: &str) -> String {
    format!(
        "## Happy Monday <@&{board_role_id}>!\n\n\
         Let's keep everyone in the loop :)\n\n\
         (1) What you worked on last week\n\
         (2) What are you planning to work on this week\n\
         (3) Are there any blockers or where could you use some help?"
    )
}

/// Errors from scheduled message creation.
#[derive(Debug, thiserror::Error)]
pub enum ScheduledMessageError {
    #[error("Unknown scheduled message factory: {name}")]
    UnknownFactory { name: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Build and enqueue the scheduled message for `name`.
///
/// # Errors
///
/// [`ScheduledMessageError::UnknownFactory`] for names outside
/// [`FACTORY_NAMES`].
pub async fn enqueue_scheduled_message(
    store: &dyn MessageStore,
    name: &str,
    channel: &DiscordChannel,
    board_role_id: &str,
) -> Result<DiscordMessage, ScheduledMessageError> {
    let content = match name {
        "standup" => standup_message(board_role_id),
        other => {
            return Err(ScheduledMessageError::UnknownFactory {
                name: other.to_string(),
            })
        }
    };

    Ok(store.enqueue(channel, content).await?)
}

#[cfg(test)]
#[path = "scheduled_tests.rs"]
mod tests;
