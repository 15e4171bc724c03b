use serde::{Deserialize, Serialize};

use atbot_core::types::{ChannelId, MessageId, MessageTs, UserId};

/// A plain user message received from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub channel: ChannelId,
    pub ts: MessageTs,
    /// Author of the message.
    pub user: UserId,
    /// Message text exactly as delivered (platform escaping intact).
    pub text: String,
}

impl ChatMessage {
    pub fn id(&self) -> MessageId {
        MessageId {
            channel: self.channel.clone(),
            ts: self.ts.clone(),
        }
    }
}

/// Notification that an existing message's text changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEdit {
    pub channel: ChannelId,
    /// Timestamp of the *original* message, i.e. the edited message's identity.
    pub ts: MessageTs,
    /// Author of the original message.
    pub user: UserId,
    /// Who performed the edit. Usually the author.
    pub editor: UserId,
    /// New full text of the message.
    pub text: String,
}

impl MessageEdit {
    pub fn id(&self) -> MessageId {
        MessageId {
            channel: self.channel.clone(),
            ts: self.ts.clone(),
        }
    }

    /// View the edited message as if it had been posted with its new text.
    pub fn as_message(&self) -> ChatMessage {
        ChatMessage {
            channel: self.channel.clone(),
            ts: self.ts.clone(),
            user: self.user.clone(),
            text: self.text.clone(),
        }
    }
}

/// Every inbound event the bot reacts to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum InboundEvent {
    Message(ChatMessage),
    Edited(MessageEdit),
    Deleted { message: MessageId },
    MemberJoined { channel: ChannelId, user: UserId },
    MemberLeft { channel: ChannelId, user: UserId },
}
