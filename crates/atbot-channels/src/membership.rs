//! Channel membership actor.
//!
//! One worker task owns the only copy of the `channel → user → joined` map.
//! Every read and write is a request on an mpsc queue answered through a
//! oneshot reply slot, so requests are applied strictly in queue order and
//! the map itself needs no lock.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use atbot_core::types::{ChannelId, UserId};

use crate::error::ChannelError;

/// Request queue depth. Senders wait when the worker falls behind.
const QUEUE_DEPTH: usize = 256;

type MembershipMap = HashMap<ChannelId, HashMap<UserId, bool>>;

enum MembershipRequest {
    Check {
        user: UserId,
        channels: Vec<ChannelId>,
        reply: oneshot::Sender<HashMap<ChannelId, bool>>,
    },
    Set {
        user: UserId,
        channel: ChannelId,
        joined: bool,
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable handle to the membership worker.
///
/// The worker stops once every handle has been dropped.
#[derive(Clone)]
pub struct MembershipHandle {
    tx: mpsc::Sender<MembershipRequest>,
}

impl MembershipHandle {
    /// Spawn the worker on the current runtime and return a handle to it.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let worker = tokio::spawn(membership_worker(rx, MembershipMap::new()));
        (Self { tx }, worker)
    }

    /// Report, for each of `channels`, whether `user` is currently a member.
    /// Unknown channels and users report `false`.
    pub async fn user_in_channels(
        &self,
        user: &UserId,
        channels: &[ChannelId],
    ) -> Result<HashMap<ChannelId, bool>, ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MembershipRequest::Check {
                user: user.clone(),
                channels: channels.to_vec(),
                reply,
            })
            .await
            .map_err(|_| ChannelError::WorkerGone)?;
        rx.await.map_err(|_| ChannelError::WorkerGone)
    }

    /// Convenience for a single-channel check.
    pub async fn is_member(&self, user: &UserId, channel: &ChannelId) -> Result<bool, ChannelError> {
        let found = self
            .user_in_channels(user, std::slice::from_ref(channel))
            .await?;
        Ok(found.get(channel).copied().unwrap_or(false))
    }

    /// Record that `user` joined (`true`) or left (`false`) `channel`.
    ///
    /// Returns once the worker has applied the change, so a check issued
    /// afterwards by any caller observes it.
    pub async fn set_membership(
        &self,
        user: &UserId,
        channel: &ChannelId,
        joined: bool,
    ) -> Result<(), ChannelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(MembershipRequest::Set {
                user: user.clone(),
                channel: channel.clone(),
                joined,
                reply,
            })
            .await
            .map_err(|_| ChannelError::WorkerGone)?;
        rx.await.map_err(|_| ChannelError::WorkerGone)
    }
}

async fn membership_worker(mut rx: mpsc::Receiver<MembershipRequest>, mut members: MembershipMap) {
    while let Some(req) = rx.recv().await {
        match req {
            MembershipRequest::Check {
                user,
                channels,
                reply,
            } => {
                let result = channels
                    .into_iter()
                    .map(|ch| {
                        let joined = members
                            .get(&ch)
                            .and_then(|users| users.get(&user))
                            .copied()
                            .unwrap_or(false);
                        (ch, joined)
                    })
                    .collect();
                // Caller may have given up waiting; nothing to do then.
                let _ = reply.send(result);
            }
            MembershipRequest::Set {
                user,
                channel,
                joined,
                reply,
            } => {
                debug!(channel = %channel, user = %user, joined, "membership changed");
                members.entry(channel).or_default().insert(user, joined);
                let _ = reply.send(());
            }
        }
    }
    debug!("membership worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_user_is_not_a_member() {
        let (handle, _worker) = MembershipHandle::spawn();
        let found = handle
            .is_member(&UserId::from("U1"), &ChannelId::from("C1"))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn join_then_leave_is_observed_in_order() {
        let (handle, _worker) = MembershipHandle::spawn();
        let user = UserId::from("U1");
        let general = ChannelId::from("CGENERAL");
        let random = ChannelId::from("CRANDOM");

        handle.set_membership(&user, &general, true).await.unwrap();
        handle.set_membership(&user, &random, true).await.unwrap();
        handle.set_membership(&user, &random, false).await.unwrap();

        let found = handle
            .user_in_channels(&user, &[general.clone(), random.clone()])
            .await
            .unwrap();
        assert_eq!(found.get(&general), Some(&true));
        assert_eq!(found.get(&random), Some(&false));
    }

    #[tokio::test]
    async fn concurrent_writers_are_all_applied() {
        let (handle, _worker) = MembershipHandle::spawn();
        let channel = ChannelId::from("C1");

        let mut tasks = Vec::new();
        for i in 0..32 {
            let handle = handle.clone();
            let channel = channel.clone();
            tasks.push(tokio::spawn(async move {
                let user = UserId::from(format!("U{i}"));
                handle.set_membership(&user, &channel, true).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        for i in 0..32 {
            let user = UserId::from(format!("U{i}"));
            assert!(handle.is_member(&user, &channel).await.unwrap());
        }
    }

    #[tokio::test]
    async fn worker_exits_when_all_handles_dropped() {
        let (handle, worker) = MembershipHandle::spawn();
        drop(handle);
        worker.await.unwrap();
    }
}
