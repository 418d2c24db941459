//! # duet-discord
//!
//! Discord transport for duet.
//!
//! Talks to the Discord REST API with a bot token: the watched channel is
//! polled for new messages, and replies are posted as threaded replies
//! (`message_reference`). No gateway connection is opened.

mod api;
mod error;
mod service;

pub use api::{ApiMessage, ApiUser, DISCORD_EPOCH_MS, DiscordHttp, snowflake_at};
pub use error::{DiscordError, DiscordResult};
pub use service::{BASE_RETRY_DELAY, DiscordTransport, MAX_SEND_RETRIES, retry_with_backoff};
