//! Events API payload decoding.
//!
//! Only the subset of event shapes the bot acts on is modelled; everything
//! else decodes to "nothing to do".

use serde::Deserialize;
use tracing::debug;

use atbot_channels::types::{ChatMessage, InboundEvent, MessageEdit};
use atbot_core::types::{MessageId, UserId};

use crate::error::SlackError;

/// What an Events API request asks of us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackRequest {
    /// Endpoint ownership check; echo the challenge back.
    UrlVerification { challenge: String },
    Event(InboundEvent),
    /// A well-formed request the bot has no interest in.
    Ignored,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope {
    UrlVerification { challenge: String },
    EventCallback { event: RawEvent },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    subtype: Option<String>,
    channel: Option<String>,
    user: Option<String>,
    text: Option<String>,
    ts: Option<String>,
    bot_id: Option<String>,
    message: Option<RawMessage>,
    previous_message: Option<RawMessage>,
    deleted_ts: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    user: Option<String>,
    text: Option<String>,
    ts: Option<String>,
    bot_id: Option<String>,
    edited: Option<RawEdited>,
}

#[derive(Deserialize)]
struct RawEdited {
    user: Option<String>,
}

/// Decode a raw Events API body. Messages from bots (including this one)
/// are ignored.
pub fn decode_request(body: &[u8], bot_user: &UserId) -> Result<SlackRequest, SlackError> {
    let envelope: Envelope = serde_json::from_slice(body)?;
    Ok(match envelope {
        Envelope::UrlVerification { challenge } => SlackRequest::UrlVerification { challenge },
        Envelope::EventCallback { event } => match decode_event(event, bot_user) {
            Some(event) => SlackRequest::Event(event),
            None => SlackRequest::Ignored,
        },
        Envelope::Other => SlackRequest::Ignored,
    })
}

fn decode_event(raw: RawEvent, bot_user: &UserId) -> Option<InboundEvent> {
    let from_bot = |user: &Option<String>, bot_id: &Option<String>| {
        bot_id.is_some() || user.as_deref() == Some(bot_user.as_str())
    };

    match raw.kind.as_str() {
        "message" => match raw.subtype.as_deref() {
            None => {
                if from_bot(&raw.user, &raw.bot_id) {
                    return None;
                }
                Some(InboundEvent::Message(ChatMessage {
                    channel: raw.channel?.into(),
                    ts: raw.ts?.into(),
                    user: raw.user?.into(),
                    text: raw.text.unwrap_or_default(),
                }))
            }
            Some("message_changed") => {
                let current = raw.message?;
                if from_bot(&current.user, &current.bot_id) {
                    return None;
                }
                // Unfurls and attachment changes arrive as edits with the same text.
                if let Some(previous) = &raw.previous_message {
                    if previous.text == current.text {
                        debug!("message_changed without a text change");
                        return None;
                    }
                }
                let user = current.user?;
                let editor = current
                    .edited
                    .and_then(|e| e.user)
                    .unwrap_or_else(|| user.clone());
                Some(InboundEvent::Edited(MessageEdit {
                    channel: raw.channel?.into(),
                    ts: current.ts?.into(),
                    user: user.into(),
                    editor: editor.into(),
                    text: current.text.unwrap_or_default(),
                }))
            }
            Some("message_deleted") => Some(InboundEvent::Deleted {
                message: MessageId::new(raw.channel?, raw.deleted_ts?),
            }),
            Some(other) => {
                debug!(subtype = other, "ignoring message subtype");
                None
            }
        },
        "member_joined_channel" => Some(InboundEvent::MemberJoined {
            channel: raw.channel?.into(),
            user: raw.user?.into(),
        }),
        "member_left_channel" => Some(InboundEvent::MemberLeft {
            channel: raw.channel?.into(),
            user: raw.user?.into(),
        }),
        other => {
            debug!(kind = other, "ignoring event type");
            None
        }
    }
}
