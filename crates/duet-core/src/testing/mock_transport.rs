//! In-memory chat channel shared by any number of mock transports.
//!
//! Every message sent through a [`MockTransport`] is stored on the
//! [`MockChannel`] and broadcast to all transports attached to it, including
//! the sender, just as a real channel echoes a bot's own messages back.

use async_trait::async_trait;
use duet_proto::{
    BotUser, ChannelId, ChatMessage, ChatTransport, Error, MessageId, MessageReference, Result,
    UserId,
};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

const BROADCAST_CAPACITY: usize = 1024;
const FIRST_MESSAGE_ID: u64 = 1_000;

#[derive(Debug)]
struct ChannelState {
    messages: Vec<ChatMessage>,
    typing: Vec<UserId>,
    next_id: u64,
    fail_sends: bool,
    /// Sends fail once the channel holds this many messages.
    fail_after: Option<usize>,
}

impl ChannelState {
    fn sends_fail(&self) -> bool {
        self.fail_sends || self.fail_after.is_some_and(|n| self.messages.len() >= n)
    }
}

/// A shared in-memory channel.
#[derive(Debug, Clone)]
pub struct MockChannel {
    id: ChannelId,
    state: Arc<Mutex<ChannelState>>,
    events: broadcast::Sender<ChatMessage>,
}

impl MockChannel {
    pub fn new(id: ChannelId) -> Self {
        let (events, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            id,
            state: Arc::new(Mutex::new(ChannelState {
                messages: Vec::new(),
                typing: Vec::new(),
                next_id: FIRST_MESSAGE_ID,
                fail_sends: false,
                fail_after: None,
            })),
            events,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// All messages posted so far, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.state.lock().unwrap().messages.clone()
    }

    /// Users that triggered the typing indicator, in order.
    pub fn typing_events(&self) -> Vec<UserId> {
        self.state.lock().unwrap().typing.clone()
    }

    /// Makes every subsequent send fail (or succeed again).
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    /// Lets sends through until the channel holds `count` messages, then fails them.
    pub fn fail_sends_after(&self, count: usize) {
        self.state.lock().unwrap().fail_after = Some(count);
    }

    /// Posts a message as `author`, bypassing any transport.
    ///
    /// Used to simulate people in the channel.
    pub fn inject(
        &self,
        author: BotUser,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> ChatMessage {
        let msg = {
            let mut state = self.state.lock().unwrap();
            let id = MessageId(state.next_id);
            state.next_id += 1;

            let reference = reply_to.map(|target_id| {
                let target = state.messages.iter().find(|m| m.id == target_id).cloned();
                match target {
                    Some(mut target) => {
                        // Platforms resolve one level deep only.
                        if let Some(r) = target.reference.as_mut() {
                            r.resolved = None;
                        }
                        MessageReference::resolved(target)
                    }
                    None => MessageReference::unresolved(target_id),
                }
            });

            let msg = ChatMessage {
                id,
                channel_id: self.id,
                author,
                content: content.to_string(),
                sent_at: Some(chrono::Utc::now()),
                reference,
            };
            state.messages.push(msg.clone());
            msg
        };

        // No subscribers is fine: nobody is listening yet.
        let _ = self.events.send(msg.clone());
        msg
    }
}

/// A [`ChatTransport`] bound to one user on a [`MockChannel`].
#[derive(Debug)]
pub struct MockTransport {
    channel: MockChannel,
    user: BotUser,
    // Subscribed at construction so nothing sent before `listen` starts is missed.
    pending_rx: Mutex<Option<broadcast::Receiver<ChatMessage>>>,
}

impl MockTransport {
    pub fn new(channel: &MockChannel, user: BotUser) -> Self {
        Self {
            pending_rx: Mutex::new(Some(channel.events.subscribe())),
            channel: channel.clone(),
            user,
        }
    }

    pub fn user(&self) -> &BotUser {
        &self.user
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    async fn login(&self) -> Result<BotUser> {
        Ok(self.user.clone())
    }

    async fn listen(&self, tx: mpsc::Sender<ChatMessage>) -> Result<()> {
        let taken = self.pending_rx.lock().unwrap().take();
        let mut rx = taken.unwrap_or_else(|| self.channel.events.subscribe());

        loop {
            tokio::select! {
                () = tx.closed() => return Ok(()),
                event = rx.recv() => match event {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            return Ok(());
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(user = %self.user.id, skipped, "Mock listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Closed),
                },
            }
        }
    }

    async fn trigger_typing(&self, channel: ChannelId) -> Result<()> {
        if channel != self.channel.id {
            return Err(Error::ChannelNotFound(channel));
        }
        self.channel.state.lock().unwrap().typing.push(self.user.id);
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
        reply_to: Option<MessageId>,
    ) -> Result<ChatMessage> {
        if channel != self.channel.id {
            return Err(Error::ChannelNotFound(channel));
        }
        if self.channel.state.lock().unwrap().sends_fail() {
            return Err(Error::Transport("mock send failure".to_string()));
        }
        Ok(self.channel.inject(self.user.clone(), content, reply_to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reply_resolves_target() {
        let channel = MockChannel::new(ChannelId(1));
        let alice = MockTransport::new(&channel, BotUser::new(10, "alice"));
        let bob = MockTransport::new(&channel, BotUser::new(20, "bob"));

        let first = alice.send_message(ChannelId(1), "hi", None).await.unwrap();
        let reply = bob
            .send_message(ChannelId(1), "hello", Some(first.id))
            .await
            .unwrap();

        assert_eq!(reply.replied_to_author(), Some(UserId(10)));
        assert_eq!(channel.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_listener_sees_messages_sent_before_listen() {
        let channel = MockChannel::new(ChannelId(1));
        let watcher = Arc::new(MockTransport::new(&channel, BotUser::new(10, "watcher")));
        channel.inject(BotUser::new(99, "human"), "early", None);

        let (tx, mut rx) = mpsc::channel(8);
        let listener = {
            let watcher = Arc::clone(&watcher);
            tokio::spawn(async move { watcher.listen(tx).await })
        };

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.content, "early");

        drop(rx);
        listener.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_wrong_channel_rejected() {
        let channel = MockChannel::new(ChannelId(1));
        let t = MockTransport::new(&channel, BotUser::new(10, "x"));
        let err = t.send_message(ChannelId(2), "x", None).await.unwrap_err();
        assert!(matches!(err, Error::ChannelNotFound(ChannelId(2))));
    }
}
