//! Emoji reaction bookkeeping.
//!
//! The bot keeps its own view of which reactions it has placed. Moving to a
//! new state is a diff against that view; every add and remove runs as its
//! own task and failures are only logged.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use atbot_channels::ChatTransport;
use atbot_core::types::MessageId;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReactionEffect {
    pub message: MessageId,
    pub emoji: String,
}

impl ReactionEffect {
    pub fn new(message: MessageId, emoji: impl Into<String>) -> Self {
        Self {
            message,
            emoji: emoji.into(),
        }
    }
}

/// Changes needed to move from one reaction set to another.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReactionDiff {
    pub remove: Vec<ReactionEffect>,
    pub add: Vec<ReactionEffect>,
}

impl ReactionDiff {
    pub fn compute(current: &[ReactionEffect], desired: &[ReactionEffect]) -> Self {
        let current_set: HashSet<&ReactionEffect> = current.iter().collect();
        let desired_set: HashSet<&ReactionEffect> = desired.iter().collect();

        let remove = current
            .iter()
            .filter(|r| !desired_set.contains(r))
            .cloned()
            .collect();
        let add = desired
            .iter()
            .filter(|r| !current_set.contains(r))
            .cloned()
            .collect();
        Self { remove, add }
    }

    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.add.is_empty()
    }
}

/// Bring the message's reactions to `desired` and record it as current.
///
/// Requests are spawned on `tasks`; the caller waits on the tracker when it
/// needs them to have landed. Entries with an empty emoji name are skipped.
pub fn reconcile(
    transport: &Arc<dyn ChatTransport>,
    tasks: &TaskTracker,
    current: &mut Vec<ReactionEffect>,
    desired: Vec<ReactionEffect>,
) {
    let mut seen = HashSet::new();
    let desired: Vec<ReactionEffect> = desired
        .into_iter()
        .filter(|r| !r.emoji.is_empty() && seen.insert(r.clone()))
        .collect();

    let diff = ReactionDiff::compute(current, &desired);
    if !diff.is_empty() {
        debug!(
            remove = diff.remove.len(),
            add = diff.add.len(),
            "reconciling reactions"
        );
    }

    for reaction in diff.remove {
        let transport = Arc::clone(transport);
        tasks.spawn(async move {
            if let Err(e) = transport
                .remove_reaction(&reaction.message, &reaction.emoji)
                .await
            {
                warn!(message = %reaction.message, emoji = %reaction.emoji, error = %e, "failed to remove reaction");
            }
        });
    }
    for reaction in diff.add {
        let transport = Arc::clone(transport);
        tasks.spawn(async move {
            if let Err(e) = transport
                .add_reaction(&reaction.message, &reaction.emoji)
                .await
            {
                warn!(message = %reaction.message, emoji = %reaction.emoji, error = %e, "failed to add reaction");
            }
        });
    }

    *current = desired;
}
