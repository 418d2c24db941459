//! Platform-neutral chat message model.

use crate::{ChannelId, MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The account a transport is logged in as, or the author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotUser {
    pub id: UserId,
    pub name: String,
}

impl BotUser {
    pub fn new(id: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A message observed in, or sent to, a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author: BotUser,
    pub content: String,

    /// When the platform recorded the message, if it told us.
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,

    /// Present when this message is a reply to another message.
    #[serde(default)]
    pub reference: Option<MessageReference>,
}

impl ChatMessage {
    /// Returns true if this message replies to another message.
    pub fn is_reply(&self) -> bool {
        self.reference.is_some()
    }

    /// Returns the author of the replied-to message, when the platform resolved it.
    pub fn replied_to_author(&self) -> Option<UserId> {
        self.reference
            .as_ref()
            .and_then(|r| r.resolved.as_deref())
            .map(|m| m.author.id)
    }
}

/// Link from a reply to the message it answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReference {
    /// Id of the replied-to message. Absent for some system messages.
    pub message_id: Option<MessageId>,

    /// The replied-to message itself, when delivered alongside the reply.
    #[serde(default)]
    pub resolved: Option<Box<ChatMessage>>,
}

impl MessageReference {
    /// A reference whose target was delivered alongside the reply.
    pub fn resolved(target: ChatMessage) -> Self {
        Self {
            message_id: Some(target.id),
            resolved: Some(Box::new(target)),
        }
    }

    /// A reference that only carries the target id.
    pub fn unresolved(message_id: MessageId) -> Self {
        Self {
            message_id: Some(message_id),
            resolved: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u64, author: u64, reference: Option<MessageReference>) -> ChatMessage {
        ChatMessage {
            id: MessageId(id),
            channel_id: ChannelId(1),
            author: BotUser::new(author, format!("user-{author}")),
            content: "hi".to_string(),
            sent_at: None,
            reference,
        }
    }

    #[test]
    fn test_plain_message_is_not_a_reply() {
        let msg = message(1, 10, None);
        assert!(!msg.is_reply());
        assert_eq!(msg.replied_to_author(), None);
    }

    #[test]
    fn test_resolved_reply_exposes_target_author() {
        let target = message(1, 10, None);
        let reply = message(2, 20, Some(MessageReference::resolved(target)));
        assert!(reply.is_reply());
        assert_eq!(reply.replied_to_author(), Some(UserId(10)));
    }

    #[test]
    fn test_unresolved_reply_has_no_target_author() {
        let reply = message(2, 20, Some(MessageReference::unresolved(MessageId(1))));
        assert!(reply.is_reply());
        assert_eq!(reply.replied_to_author(), None);
    }
}
