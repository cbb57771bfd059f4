//! Who is online, and on which sockets.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use linkwire_core::{ChannelId, UserId};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::channel::{ClientChannel, PushOutcome};
use crate::delivery::{DeliveryFailure, DeliveryReport, FailureReason, LiveDelivery};

/// Result of [`PresenceRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// The channel was added.
    Registered,
    /// The channel was already registered for this user; nothing changed.
    AlreadyRegistered,
}

/// A channel removed by [`PresenceRegistry::sweep`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Eviction {
    /// Owner of the channel.
    pub user_id: UserId,
    /// The evicted channel.
    pub channel_id: ChannelId,
}

/// In-memory map of users to their live channels.
///
/// Each user's channel set sits behind its own shard lock, so registrations
/// for different users never contend. No lock is held across an await.
#[derive(Default)]
pub struct PresenceRegistry {
    users: DashMap<UserId, HashMap<ChannelId, Arc<ClientChannel>>>,
}

impl PresenceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel for `user`. Registering the same channel id twice is a
    /// no-op.
    pub fn register(&self, user: &UserId, channel: Arc<ClientChannel>) -> Registration {
        let mut channels = self.users.entry(user.clone()).or_default();
        match channels.entry(channel.id.clone()) {
            Entry::Occupied(_) => Registration::AlreadyRegistered,
            Entry::Vacant(slot) => {
                debug!(user_id = %user, channel_id = %channel.id, "channel registered");
                let _ = slot.insert(channel);
                Registration::Registered
            }
        }
    }

    /// Remove a channel. Users left with no channels are dropped.
    pub fn unregister(&self, user: &UserId, channel_id: &ChannelId) -> Option<Arc<ClientChannel>> {
        let removed = {
            let mut channels = self.users.get_mut(user)?;
            channels.remove(channel_id)
        };
        let _ = self.users.remove_if(user, |_, channels| channels.is_empty());
        if removed.is_some() {
            debug!(user_id = %user, channel_id = %channel_id, "channel unregistered");
        }
        removed
    }

    /// Snapshot of a user's live channels.
    pub fn channels_for(&self, user: &UserId) -> Vec<Arc<ClientChannel>> {
        self.users
            .get(user)
            .map(|channels| channels.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `user` has at least one live channel.
    pub fn is_online(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    /// Count a failed push against a channel. Returns the new failure count,
    /// or `None` if the channel is no longer registered.
    pub fn mark_suspect(&self, user: &UserId, channel_id: &ChannelId) -> Option<u32> {
        let channel = self.users.get(user)?.get(channel_id).cloned()?;
        Some(channel.record_failure())
    }

    /// Evict channels that are closed, have not been heard from within
    /// `stale_after`, or reached `max_failures` consecutive failed pushes.
    /// Evicted channels are closed so their sessions end.
    pub fn sweep(&self, stale_after: Duration, max_failures: u32) -> Vec<Eviction> {
        let mut evicted = Vec::new();
        self.users.retain(|user, channels| {
            channels.retain(|id, channel| {
                let dead = channel.is_closed()
                    || channel.last_seen_elapsed() > stale_after
                    || channel.failure_count() >= max_failures;
                if dead {
                    channel.close();
                    evicted.push(Eviction {
                        user_id: user.clone(),
                        channel_id: id.clone(),
                    });
                }
                !dead
            });
            !channels.is_empty()
        });
        evicted
    }

    /// Live channels across all users.
    pub fn connection_count(&self) -> usize {
        self.users.iter().map(|entry| entry.value().len()).sum()
    }

    /// Users with at least one live channel.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Run [`PresenceRegistry::sweep`] every `every` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        stale_after: Duration,
        max_failures: u32,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // first tick completes immediately
            let _ = ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let evicted = registry.sweep(stale_after, max_failures);
                        if !evicted.is_empty() {
                            info!(evicted = evicted.len(), "presence sweep evicted channels");
                            metrics::counter!(crate::metrics::PRESENCE_EVICTIONS_TOTAL)
                                .increment(evicted.len() as u64);
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
        })
    }
}

#[async_trait]
impl LiveDelivery for PresenceRegistry {
    async fn deliver(
        &self,
        user: &UserId,
        frames: &[Arc<String>],
        timeout: Duration,
    ) -> DeliveryReport {
        let channels = self.channels_for(user);
        let pushes = channels.iter().map(|channel| async move {
            for frame in frames {
                let outcome = channel.push(Arc::clone(frame), timeout).await;
                if outcome != PushOutcome::Delivered {
                    return (channel, outcome);
                }
            }
            (channel, PushOutcome::Delivered)
        });
        let outcomes = join_all(pushes).await;

        let mut report = DeliveryReport {
            attempted: channels.len(),
            ..DeliveryReport::default()
        };
        for (channel, outcome) in outcomes {
            let reason = match outcome {
                PushOutcome::Delivered => {
                    report.delivered += 1;
                    continue;
                }
                PushOutcome::Closed => {
                    let _ = self.unregister(user, &channel.id);
                    FailureReason::Closed
                }
                PushOutcome::TimedOut => {
                    let _ = self.mark_suspect(user, &channel.id);
                    FailureReason::TimedOut
                }
            };
            report.failures.push(DeliveryFailure {
                channel_id: channel.id.clone(),
                reason,
            });
        }
        report
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel(buffer: usize) -> (Arc<ClientChannel>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Arc::new(ClientChannel::new(ChannelId::new(), tx)), rx)
    }

    fn frames(texts: &[&str]) -> Vec<Arc<String>> {
        texts.iter().map(|t| Arc::new((*t).to_string())).collect()
    }

    #[test]
    fn register_is_idempotent() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (ch, _rx) = channel(4);
        assert_eq!(reg.register(&alice, ch.clone()), Registration::Registered);
        assert_eq!(reg.register(&alice, ch), Registration::AlreadyRegistered);
        assert_eq!(reg.connection_count(), 1);
        assert_eq!(reg.user_count(), 1);
    }

    #[test]
    fn multiple_channels_per_user() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (a, _ra) = channel(4);
        let (b, _rb) = channel(4);
        let _ = reg.register(&alice, a);
        let _ = reg.register(&alice, b);
        assert_eq!(reg.channels_for(&alice).len(), 2);
        assert_eq!(reg.user_count(), 1);
    }

    #[test]
    fn unregister_last_channel_drops_user() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (ch, _rx) = channel(4);
        let id = ch.id.clone();
        let _ = reg.register(&alice, ch);
        assert!(reg.is_online(&alice));
        assert!(reg.unregister(&alice, &id).is_some());
        assert!(!reg.is_online(&alice));
        assert!(reg.unregister(&alice, &id).is_none());
    }

    #[test]
    fn channels_for_unknown_user_is_empty() {
        let reg = PresenceRegistry::new();
        assert!(reg.channels_for(&UserId::from("nobody")).is_empty());
    }

    #[test]
    fn mark_suspect_counts_failures() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (ch, _rx) = channel(4);
        let id = ch.id.clone();
        let _ = reg.register(&alice, ch);
        assert_eq!(reg.mark_suspect(&alice, &id), Some(1));
        assert_eq!(reg.mark_suspect(&alice, &id), Some(2));
        assert_eq!(reg.mark_suspect(&alice, &ChannelId::new()), None);
    }

    #[test]
    fn sweep_evicts_failing_and_closed_channels() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        let (healthy, _r1) = channel(4);
        let (failing, _r2) = channel(4);
        let (gone, r3) = channel(4);
        drop(r3);
        let failing_ref = failing.clone();
        let _ = reg.register(&alice, healthy);
        let _ = reg.register(&alice, failing.clone());
        let _ = reg.register(&bob, gone);
        let _ = failing.record_failure();
        let _ = failing.record_failure();

        let evicted = reg.sweep(Duration::from_secs(60), 2);
        assert_eq!(evicted.len(), 2);
        assert!(failing_ref.is_closed());
        assert_eq!(reg.connection_count(), 1);
        assert!(!reg.is_online(&bob));
    }

    #[test]
    fn sweep_evicts_stale_channels() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (ch, _rx) = channel(4);
        let _ = reg.register(&alice, ch);
        std::thread::sleep(Duration::from_millis(20));
        let evicted = reg.sweep(Duration::from_millis(5), 10);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].user_id, alice);
        assert_eq!(reg.user_count(), 0);
    }

    #[tokio::test]
    async fn deliver_reaches_every_channel() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (a, mut ra) = channel(4);
        let (b, mut rb) = channel(4);
        let _ = reg.register(&alice, a);
        let _ = reg.register(&alice, b);

        let report = reg
            .deliver(&alice, &frames(&["one", "two"]), Duration::from_millis(100))
            .await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 2);
        assert!(report.failures.is_empty());
        for rx in [&mut ra, &mut rb] {
            assert_eq!(&*rx.recv().await.unwrap(), "one");
            assert_eq!(&*rx.recv().await.unwrap(), "two");
        }
    }

    #[tokio::test]
    async fn deliver_to_offline_user_attempts_nothing() {
        let reg = PresenceRegistry::new();
        let report = reg
            .deliver(&UserId::from("ghost"), &frames(&["x"]), Duration::from_millis(10))
            .await;
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn closed_channel_is_unregistered_on_delivery() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (live, _r1) = channel(4);
        let (dead, r2) = channel(4);
        drop(r2);
        let dead_id = dead.id.clone();
        let _ = reg.register(&alice, live);
        let _ = reg.register(&alice, dead);

        let report = reg.deliver(&alice, &frames(&["x"]), Duration::from_millis(50)).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].channel_id, dead_id);
        assert_eq!(report.failures[0].reason, FailureReason::Closed);
        assert_eq!(reg.connection_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_channel_is_marked_suspect() {
        let reg = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (slow, _rx) = channel(1);
        assert!(slow.send(Arc::new("fill".into())));
        let _ = reg.register(&alice, slow.clone());

        let report = reg.deliver(&alice, &frames(&["x"]), Duration::from_millis(100)).await;
        assert!(!report.any_delivered());
        assert_eq!(report.failures[0].reason, FailureReason::TimedOut);
        assert_eq!(slow.failure_count(), 1);
        assert!(reg.is_online(&alice));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_stops_on_cancel() {
        let reg = Arc::new(PresenceRegistry::new());
        let cancel = CancellationToken::new();
        let handle = reg.spawn_sweeper(
            Duration::from_millis(10),
            Duration::from_secs(60),
            3,
            cancel.clone(),
        );
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
