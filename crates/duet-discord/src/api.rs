//! Minimal Discord REST client: just the four endpoints duet needs.

use crate::error::{DiscordError, DiscordResult};
use chrono::{DateTime, Utc};
use duet_proto::{BotUser, ChannelId, ChatMessage, MessageId, MessageReference, UserId};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tracing::debug;

/// First millisecond of 2015, the zero point of Discord snowflakes.
pub const DISCORD_EPOCH_MS: i64 = 1_420_070_400_000;

/// Largest page `GET /channels/{id}/messages` will return.
pub const MAX_PAGE: u8 = 100;

/// The smallest snowflake that could have been created at `at`.
///
/// Used as an `after` cursor so polling starts from "now" instead of
/// replaying channel history.
pub fn snowflake_at(at: DateTime<Utc>) -> u64 {
    let since_epoch = (at.timestamp_millis() - DISCORD_EPOCH_MS).max(0);
    (since_epoch as u64) << 22
}

fn de_snowflake<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(serde::de::Error::custom)
}

fn de_opt_snowflake<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)?
        .map(|raw| raw.parse().map_err(serde::de::Error::custom))
        .transpose()
}

/// A user object as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    #[serde(deserialize_with = "de_snowflake")]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub bot: bool,
}

impl From<ApiUser> for BotUser {
    fn from(user: ApiUser) -> Self {
        BotUser::new(UserId(user.id), user.global_name.unwrap_or(user.username))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ApiMessageReference {
    #[serde(default, deserialize_with = "de_opt_snowflake")]
    message_id: Option<u64>,
}

/// A message object as returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiMessage {
    #[serde(deserialize_with = "de_snowflake")]
    pub id: u64,
    #[serde(deserialize_with = "de_snowflake")]
    pub channel_id: u64,
    pub author: ApiUser,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    message_reference: Option<ApiMessageReference>,
    /// Present (possibly null) on replies.
    #[serde(default)]
    referenced_message: Option<Box<ApiMessage>>,
}

impl From<ApiMessage> for ChatMessage {
    fn from(msg: ApiMessage) -> Self {
        let reference = msg.message_reference.map(|r| MessageReference {
            message_id: r.message_id.map(MessageId),
            resolved: msg
                .referenced_message
                .map(|target| Box::new(ChatMessage::from(*target))),
        });

        ChatMessage {
            id: MessageId(msg.id),
            channel_id: ChannelId(msg.channel_id),
            author: msg.author.into(),
            content: msg.content,
            sent_at: msg.timestamp,
            reference,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
    /// With `enforce_nonce`, Discord returns the existing message instead of
    /// posting a second one when the same nonce arrives again.
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<&'a str>,
    enforce_nonce: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_reference: Option<OutgoingReference>,
    allowed_mentions: AllowedMentions,
}

#[derive(Debug, Serialize)]
struct OutgoingReference {
    message_id: String,
    fail_if_not_exists: bool,
}

#[derive(Debug, Serialize)]
struct AllowedMentions {
    parse: [&'static str; 0],
    replied_user: bool,
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

/// Maps a non-success response to an error.
///
/// `channel` is the channel the request targeted, used to turn a 404 into
/// [`DiscordError::ChannelNotFound`].
pub(crate) fn error_for_status(status: StatusCode, body: &str, channel: Option<u64>) -> DiscordError {
    match (status.as_u16(), channel) {
        (code @ (401 | 403), _) => DiscordError::Unauthorized { status: code },
        (404, Some(id)) => DiscordError::ChannelNotFound(id),
        (429, _) => {
            let secs = serde_json::from_str::<RateLimitBody>(body)
                .map(|b| b.retry_after)
                .unwrap_or(1.0);
            DiscordError::RateLimited {
                retry_after: Duration::from_secs_f64(secs.max(0.0)),
            }
        }
        (code, _) => DiscordError::Api {
            status: code,
            body: body.to_string(),
        },
    }
}

/// Authenticated REST client for one bot token.
#[derive(Debug, Clone)]
pub struct DiscordHttp {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordHttp {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> DiscordResult<Self> {
        let token = token.into();

        let mut auth =
            HeaderValue::from_str(&format!("Bot {token}")).map_err(|_| DiscordError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!(
                "DiscordBot (https://github.com/duet-rs/duet, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            )),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    /// The bot token, masked for logging.
    pub fn token_masked(&self) -> String {
        if self.token.len() > 8 {
            format!(
                "{}...{}",
                &self.token[..4],
                &self.token[self.token.len() - 4..]
            )
        } else {
            "****".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn check(
        response: reqwest::Response,
        channel: Option<u64>,
    ) -> DiscordResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_for_status(status, &body, channel))
    }

    /// `GET /users/@me`
    pub async fn current_user(&self) -> DiscordResult<ApiUser> {
        let response = self.client.get(self.url("/users/@me")).send().await?;
        let response = Self::check(response, None).await?;
        Ok(serde_json::from_str(&response.text().await?)?)
    }

    /// `GET /channels/{channel}/messages?after=..`, oldest first.
    pub async fn messages_after(
        &self,
        channel: u64,
        after: u64,
        limit: u8,
    ) -> DiscordResult<Vec<ApiMessage>> {
        let response = self
            .client
            .get(self.url(&format!("/channels/{channel}/messages")))
            .query(&[
                ("after", after.to_string()),
                ("limit", limit.min(MAX_PAGE).to_string()),
            ])
            .send()
            .await?;
        let response = Self::check(response, Some(channel)).await?;
        let mut messages: Vec<ApiMessage> = serde_json::from_str(&response.text().await?)?;
        // The API returns newest first.
        messages.sort_by_key(|m| m.id);
        Ok(messages)
    }

    /// Newest message in the channel, if it has any.
    pub async fn latest_message(&self, channel: u64) -> DiscordResult<Option<ApiMessage>> {
        let response = self
            .client
            .get(self.url(&format!("/channels/{channel}/messages")))
            .query(&[("limit", "1")])
            .send()
            .await?;
        let response = Self::check(response, Some(channel)).await?;
        let messages: Vec<ApiMessage> = serde_json::from_str(&response.text().await?)?;
        Ok(messages.into_iter().max_by_key(|m| m.id))
    }

    /// `POST /channels/{channel}/typing`
    pub async fn trigger_typing(&self, channel: u64) -> DiscordResult<()> {
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel}/typing")))
            .send()
            .await?;
        Self::check(response, Some(channel)).await?;
        Ok(())
    }

    /// `POST /channels/{channel}/messages`, threaded under `reply_to` when given.
    ///
    /// Repeating a call with the same `nonce` never posts twice.
    pub async fn create_message(
        &self,
        channel: u64,
        content: &str,
        reply_to: Option<u64>,
        nonce: Option<&str>,
    ) -> DiscordResult<ApiMessage> {
        let body = CreateMessage {
            content,
            nonce,
            enforce_nonce: nonce.is_some(),
            message_reference: reply_to.map(|id| OutgoingReference {
                message_id: id.to_string(),
                fail_if_not_exists: false,
            }),
            allowed_mentions: AllowedMentions {
                parse: [],
                replied_user: true,
            },
        };

        debug!(channel, reply_to = ?reply_to, len = content.len(), "Creating Discord message");
        let response = self
            .client
            .post(self.url(&format!("/channels/{channel}/messages")))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response, Some(channel)).await?;
        Ok(serde_json::from_str(&response.text().await?)?)
    }
}
