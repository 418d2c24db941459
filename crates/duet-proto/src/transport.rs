//! The seam between duet's reply loop and a concrete chat service.

use crate::{BotUser, ChannelId, ChatMessage, MessageId, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A chat service connection bound to one identity.
///
/// Implementations must be usable from several tasks at once: the listener
/// task drives [`listen`](ChatTransport::listen) while the agent task sends.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Short name used in log lines (e.g. "discord").
    fn name(&self) -> &str;

    /// Authenticates and returns the account this transport acts as.
    async fn login(&self) -> Result<BotUser>;

    /// Delivers every new message in the watched channel to `tx`, oldest first.
    ///
    /// Returns `Ok(())` once `tx` is closed. Transient failures are handled
    /// internally; only unrecoverable ones are returned.
    async fn listen(&self, tx: mpsc::Sender<ChatMessage>) -> Result<()>;

    /// Shows the "is typing" indicator in `channel`.
    async fn trigger_typing(&self, channel: ChannelId) -> Result<()>;

    /// Posts `content` to `channel`, threaded under `reply_to` when given.
    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> Result<ChatMessage>;
}
