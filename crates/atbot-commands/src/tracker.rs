use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::warn;

use atbot_channels::types::{ChatMessage, MessageEdit};
use atbot_core::types::MessageId;

use crate::parser::ParsedIntent;
use crate::reactions::ReactionEffect;
use crate::result::{CommandArguments, CommandResult};

/// A reply the bot posted, remembered so it can be updated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentReply {
    pub message: MessageId,
    pub text: String,
}

/// Everything known about one addressed message.
#[derive(Debug)]
pub struct TrackedCommand {
    pub created_at: DateTime<Utc>,
    pub original: ChatMessage,
    pub latest_edit: Option<MessageEdit>,
    pub intent: ParsedIntent,
    /// The current text is a command (as opposed to a greeting).
    pub found_command: bool,
    pub args: Option<CommandArguments>,
    pub result: Option<CommandResult>,
    pub was_undone: bool,
    /// Reactions the bot believes are currently on the message.
    pub reactions: Vec<ReactionEffect>,
    pub channel_reply: Option<SentReply>,
    pub private_reply: Option<SentReply>,
    pub private_log_reply: Option<SentReply>,
    pub log_reply: Option<SentReply>,
}

impl TrackedCommand {
    pub fn new(original: ChatMessage, intent: ParsedIntent, created_at: DateTime<Utc>) -> Self {
        Self {
            created_at,
            original,
            latest_edit: None,
            intent,
            found_command: false,
            args: None,
            result: None,
            was_undone: false,
            reactions: Vec::new(),
            channel_reply: None,
            private_reply: None,
            private_log_reply: None,
            log_reply: None,
        }
    }
}

/// Shared handle to one entry. Holding its lock serializes processing of
/// that message.
pub type EntryHandle = Arc<tokio::sync::Mutex<TrackedCommand>>;

struct Slot {
    created_at: DateTime<Utc>,
    entry: EntryHandle,
}

/// Map from message identity to its tracked state.
///
/// The map lock is held only for the map operation itself, never across an
/// await; per-message work happens under the entry's own async lock.
#[derive(Default)]
pub struct CommandTracker {
    entries: Mutex<HashMap<MessageId, Slot>>,
}

impl CommandTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> MutexGuard<'_, HashMap<MessageId, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn lookup(&self, key: &MessageId) -> Option<EntryHandle> {
        self.map().get(key).map(|slot| Arc::clone(&slot.entry))
    }

    /// Publish an entry. Callers normally lock the entry first so that a
    /// concurrent edit waits for initial processing to finish.
    pub fn insert(&self, key: MessageId, entry: EntryHandle, created_at: DateTime<Utc>) {
        let previous = self.map().insert(key.clone(), Slot { created_at, entry });
        if previous.is_some() {
            warn!(message = %key, "replaced an existing tracked command");
        }
    }

    pub fn remove(&self, key: &MessageId) -> Option<EntryHandle> {
        self.map().remove(key).map(|slot| slot.entry)
    }

    /// Drop every entry created before `now - retention`. Returns how many
    /// were removed.
    pub fn sweep(&self, retention: TimeDelta, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let mut map = self.map();
        let before = map.len();
        map.retain(|_, slot| slot.created_at >= cutoff);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atbot_core::types::UserId;

    fn entry(ts: &str, at: DateTime<Utc>) -> (MessageId, EntryHandle) {
        let msg = ChatMessage {
            channel: "C1".into(),
            ts: ts.into(),
            user: UserId::from("U1"),
            text: "<@UBOT> echo hi".into(),
        };
        let id = msg.id();
        let handle = Arc::new(tokio::sync::Mutex::new(TrackedCommand::new(
            msg,
            ParsedIntent::default(),
            at,
        )));
        (id, handle)
    }

    #[test]
    fn lookup_returns_the_same_entry() {
        let tracker = CommandTracker::new();
        let now = Utc::now();
        let (id, handle) = entry("1.0001", now);
        tracker.insert(id.clone(), Arc::clone(&handle), now);

        let found = tracker.lookup(&id).unwrap();
        assert!(Arc::ptr_eq(&found, &handle));
        assert!(tracker.lookup(&MessageId::new("C1", "9.9")).is_none());
    }

    #[test]
    fn remove_forgets_entry() {
        let tracker = CommandTracker::new();
        let now = Utc::now();
        let (id, handle) = entry("1.0001", now);
        tracker.insert(id.clone(), handle, now);
        assert!(tracker.remove(&id).is_some());
        assert!(tracker.is_empty());
        assert!(tracker.remove(&id).is_none());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let tracker = CommandTracker::new();
        let now = Utc::now();
        let retention = TimeDelta::hours(2);

        let (old_id, old) = entry("1.0001", now - TimeDelta::hours(3));
        let (new_id, new) = entry("2.0001", now - TimeDelta::minutes(10));
        tracker.insert(old_id.clone(), old, now - TimeDelta::hours(3));
        tracker.insert(new_id.clone(), new, now - TimeDelta::minutes(10));

        assert_eq!(tracker.sweep(retention, now), 1);
        assert!(tracker.lookup(&old_id).is_none());
        assert!(tracker.lookup(&new_id).is_some());
        assert_eq!(tracker.sweep(retention, now), 0);
    }

    #[tokio::test]
    async fn sweep_does_not_wait_for_locked_entries() {
        let tracker = CommandTracker::new();
        let now = Utc::now();
        let (id, handle) = entry("1.0001", now - TimeDelta::hours(5));
        tracker.insert(id.clone(), Arc::clone(&handle), now - TimeDelta::hours(5));

        let _guard = handle.lock().await;
        assert_eq!(tracker.sweep(TimeDelta::hours(2), now), 1);
        assert_eq!(tracker.len(), 0);
    }
}
