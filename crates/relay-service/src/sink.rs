//! Discord REST delivery sink.
//!
//! Implements [`ChatSink`] against the Discord HTTP API with a bot token.
//! Channel resolution is a GET on the channel object; a 404 means the
//! channel is gone or invisible to the bot and maps to `None` so the
//! drainer leaves the row pending instead of erroring.

use async_trait::async_trait;
use relay_core::delivery::{ChatSink, SinkChannel, SinkError};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Suppresses link-preview embeds on sent messages, keeping channel
/// notifications compact.
const MESSAGE_FLAG_SUPPRESS_EMBEDS: u32 = 4;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ChannelObject {
    id: String,
    name: Option<String>,
}

/// [`ChatSink`] backed by the Discord REST API.
pub struct DiscordRestSink {
    client: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl DiscordRestSink {
    pub fn new(bot_token: impl Into<String>) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Request {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            bot_token: bot_token.into(),
            api_base: DISCORD_API_BASE.to_string(),
        })
    }

    /// Point the sink at a different API base, for tests.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

#[async_trait]
impl ChatSink for DiscordRestSink {
    async fn resolve_channel(&self, channel_id: &str) -> Result<Option<SinkChannel>, SinkError> {
        let url = format!("{}/channels/{}", self.api_base, channel_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| SinkError::Request {
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let channel: ChannelObject = response.json().await.map_err(|e| SinkError::Request {
            message: format!("Malformed channel object: {}", e),
        })?;

        debug!(channel_id = %channel.id, "Resolved Discord channel");

        Ok(Some(SinkChannel {
            id: channel.id,
            name: channel.name,
        }))
    }

    async fn send(&self, channel: &SinkChannel, content: &str) -> Result<(), SinkError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel.id);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .json(&serde_json::json!({
                "content": content,
                "flags": MESSAGE_FLAG_SUPPRESS_EMBEDS,
            }))
            .send()
            .await
            .map_err(|e| SinkError::Request {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "sink_tests.rs"]
mod tests;
