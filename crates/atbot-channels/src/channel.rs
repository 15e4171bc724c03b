use async_trait::async_trait;

use atbot_core::types::{ChannelId, MessageId, MessageTs, UserId};

use crate::error::ChannelError;

/// Outbound half of a chat platform: everything the bot can do to the
/// conversation it is attached to.
///
/// Every call is a request/response round trip that may fail transiently.
/// Callers treat failures as best-effort: they are logged, never retried.
///
/// Implementations must be `Send + Sync` so one transport can be shared by
/// every event-processing task behind an `Arc`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Post a new message and return its timestamp.
    async fn post_message(&self, channel: &ChannelId, text: &str)
        -> Result<MessageTs, ChannelError>;

    /// Replace the text of a message the bot posted earlier.
    async fn update_message(&self, message: &MessageId, text: &str) -> Result<(), ChannelError>;

    /// Add an emoji reaction (by name, without colons) to a message.
    async fn add_reaction(&self, message: &MessageId, emoji: &str) -> Result<(), ChannelError>;

    /// Remove a reaction the bot added earlier.
    async fn remove_reaction(&self, message: &MessageId, emoji: &str)
        -> Result<(), ChannelError>;

    /// Open (or look up) the direct-message conversation with `user`.
    async fn open_im(&self, user: &UserId) -> Result<ChannelId, ChannelError>;

    /// Stable link to a specific message, for cross-destination notices.
    fn archive_url(&self, message: &MessageId) -> String;
}
