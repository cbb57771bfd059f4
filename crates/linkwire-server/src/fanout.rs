//! Event fanout: persist a notification, then push it live.
//!
//! The notification is always written first so a user with no open channel
//! still finds it in the inbox, and so it can be replayed when a channel
//! registers later. Live pushes are best effort and never fail a publish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use linkwire_core::{ConnectionEvent, NotificationId, UserId};
use linkwire_store::{NotificationRecord, NotificationStore};
use metrics::counter;
use tracing::{debug, instrument, warn};

use crate::delivery::{DeliveryReport, LiveDelivery};
use crate::metrics::{
    FANOUT_DELIVERY_FAILURES_TOTAL, FANOUT_EVENTS_TOTAL, FANOUT_PERSIST_FAILURES_TOTAL,
    NOTIFICATIONS_REPLAYED_TOTAL,
};
use crate::presence::{ClientChannel, PushOutcome};
use crate::websocket::messages;

/// What happened to one published event.
#[derive(Clone, Debug)]
pub struct FanoutReport {
    /// Id of the notification built for the event.
    pub notification_id: NotificationId,
    /// Whether the notification reached the store.
    pub persisted: bool,
    /// Live push results.
    pub delivery: DeliveryReport,
    /// Whether the notification was flagged delivered.
    pub marked_delivered: bool,
}

/// An event whose inbox entry has been written, waiting for its live push.
#[derive(Clone, Debug)]
pub struct PersistedEvent {
    event: ConnectionEvent,
    record: NotificationRecord,
    persisted: bool,
}

impl PersistedEvent {
    /// Who the event is for.
    pub fn recipient(&self) -> &UserId {
        &self.event.recipient
    }
}

/// Turns connection events into inbox entries and live frames.
pub struct EventFanout {
    notifications: Arc<dyn NotificationStore>,
    delivery: Arc<dyn LiveDelivery>,
    push_timeout: Duration,
}

impl EventFanout {
    /// Create a fanout writing to `notifications` and pushing through `delivery`.
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        delivery: Arc<dyn LiveDelivery>,
        push_timeout: Duration,
    ) -> Self {
        Self {
            notifications,
            delivery,
            push_timeout,
        }
    }

    /// Persist and push one event to its recipient.
    pub async fn publish(&self, event: &ConnectionEvent) -> FanoutReport {
        let persisted = self.persist(event.clone());
        self.push(persisted).await
    }

    /// Write the inbox entry for `event`. A store failure is logged and
    /// carried along; the live push still goes out.
    #[instrument(skip_all, fields(recipient = %event.recipient, kind = %event.kind))]
    pub fn persist(&self, event: ConnectionEvent) -> PersistedEvent {
        let record = NotificationRecord::for_event(&event, Utc::now());
        let persisted = match self.notifications.append(&record) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "failed to persist notification");
                counter!(FANOUT_PERSIST_FAILURES_TOTAL).increment(1);
                false
            }
        };
        PersistedEvent {
            event,
            record,
            persisted,
        }
    }

    /// Push a persisted event to the recipient's live channels and flag the
    /// inbox entry delivered if any channel took it.
    ///
    /// `new_notification` is only sent for an entry that reached the store,
    /// so a client never holds an id it cannot mark read.
    #[instrument(skip_all, fields(recipient = %persisted.event.recipient, kind = %persisted.event.kind))]
    pub async fn push(&self, persisted: PersistedEvent) -> FanoutReport {
        let PersistedEvent {
            event,
            record,
            persisted,
        } = persisted;

        let mut frames: Vec<Arc<String>> = Vec::with_capacity(2);
        frames.extend(messages::connection_update(&event));
        if persisted {
            frames.extend(messages::new_notification(&record));
        }

        let delivery = self
            .delivery
            .deliver(&event.recipient, &frames, self.push_timeout)
            .await;
        for failure in &delivery.failures {
            warn!(
                channel_id = %failure.channel_id,
                reason = failure.reason.as_str(),
                "live push failed"
            );
            counter!(FANOUT_DELIVERY_FAILURES_TOTAL, "reason" => failure.reason.as_str())
                .increment(1);
        }

        let mut marked_delivered = false;
        if persisted && delivery.any_delivered() {
            match self.notifications.mark_delivered(std::slice::from_ref(&record.id)) {
                Ok(changed) => marked_delivered = changed > 0,
                Err(e) => warn!(error = %e, "failed to mark notification delivered"),
            }
        }

        counter!(FANOUT_EVENTS_TOTAL, "kind" => event.kind.as_str()).increment(1);
        debug!(
            channels = delivery.attempted,
            delivered = delivery.delivered,
            persisted,
            "event published"
        );

        FanoutReport {
            notification_id: record.id,
            persisted,
            delivery,
            marked_delivered,
        }
    }

    /// Push up to `limit` undelivered notifications, oldest first, to a newly
    /// registered channel and flag the pushed ones delivered. Stops at the
    /// first push that fails. Returns how many were pushed.
    #[instrument(skip_all, fields(user_id = %user, channel_id = %channel.id))]
    pub async fn replay_backlog(&self, user: &UserId, channel: &ClientChannel, limit: u32) -> usize {
        let backlog = match self.notifications.undelivered(user, limit) {
            Ok(backlog) => backlog,
            Err(e) => {
                warn!(error = %e, "failed to load notification backlog");
                return 0;
            }
        };

        let mut pushed = Vec::with_capacity(backlog.len());
        for record in backlog {
            let Some(frame) = messages::new_notification(&record) else {
                continue;
            };
            if channel.push(frame, self.push_timeout).await != PushOutcome::Delivered {
                break;
            }
            pushed.push(record.id);
        }

        if !pushed.is_empty() {
            if let Err(e) = self.notifications.mark_delivered(&pushed) {
                warn!(error = %e, "failed to mark replayed notifications delivered");
            }
            counter!(NOTIFICATIONS_REPLAYED_TOTAL).increment(pushed.len() as u64);
            debug!(replayed = pushed.len(), "notification backlog replayed");
        }
        pushed.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use linkwire_core::{ChannelId, ConnectionEventKind, ProfileSummary, ViewerStatus};
    use linkwire_store::{NotificationQuery, SqliteStore, StoreError};
    use serde_json::Value;
    use tokio::sync::mpsc;

    use crate::presence::PresenceRegistry;

    fn event(recipient: &str, counterpart: &str) -> ConnectionEvent {
        ConnectionEvent {
            kind: ConnectionEventKind::Requested,
            recipient: UserId::from(recipient),
            counterpart: UserId::from(counterpart),
            actor: UserId::from(counterpart),
            status: ViewerStatus::PendingReceived,
            connection_count: 0,
            pair_version: 1,
            counterpart_profile: ProfileSummary::bare(&UserId::from(counterpart)),
        }
    }

    fn setup() -> (Arc<SqliteStore>, Arc<PresenceRegistry>, EventFanout) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let presence = Arc::new(PresenceRegistry::new());
        let fanout = EventFanout::new(store.clone(), presence.clone(), Duration::from_millis(200));
        (store, presence, fanout)
    }

    fn live_channel(
        presence: &PresenceRegistry,
        user: &str,
    ) -> (Arc<ClientChannel>, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(16);
        let channel = Arc::new(ClientChannel::new(ChannelId::new(), tx));
        let _ = presence.register(&UserId::from(user), channel.clone());
        (channel, rx)
    }

    fn frame_type(frame: &str) -> String {
        let v: Value = serde_json::from_str(frame).unwrap();
        v["type"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn offline_recipient_gets_exactly_one_undelivered_record() {
        let (store, _presence, fanout) = setup();
        let bob = UserId::from("bob");

        let report = fanout.publish(&event("bob", "alice")).await;
        assert!(report.persisted);
        assert_eq!(report.delivery.attempted, 0);
        assert!(!report.marked_delivered);

        let inbox = store.list(&bob, &NotificationQuery::default()).unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(!inbox[0].delivered);
        assert_eq!(store.undelivered(&bob, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn two_channels_both_receive_and_one_record_is_stored() {
        let (store, presence, fanout) = setup();
        let (_c1, mut rx1) = live_channel(&presence, "bob");
        let (_c2, mut rx2) = live_channel(&presence, "bob");

        let report = fanout.publish(&event("bob", "alice")).await;
        assert_eq!(report.delivery.attempted, 2);
        assert_eq!(report.delivery.delivered, 2);
        assert!(report.marked_delivered);

        for rx in [&mut rx1, &mut rx2] {
            assert_eq!(frame_type(&rx.recv().await.unwrap()), messages::CONNECTION_UPDATE);
            assert_eq!(frame_type(&rx.recv().await.unwrap()), messages::NEW_NOTIFICATION);
        }

        let inbox = store
            .list(&UserId::from("bob"), &NotificationQuery::default())
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert!(inbox[0].delivered);
    }

    #[tokio::test]
    async fn other_users_channels_are_untouched() {
        let (_store, presence, fanout) = setup();
        let (_c, mut carol_rx) = live_channel(&presence, "carol");
        let _ = fanout.publish(&event("bob", "alice")).await;
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_channel_does_not_fail_publish() {
        let (_store, presence, fanout) = setup();
        let (_c, rx) = live_channel(&presence, "bob");
        drop(rx);
        let report = fanout.publish(&event("bob", "alice")).await;
        assert!(report.persisted);
        assert_eq!(report.delivery.failures.len(), 1);
        assert!(!report.marked_delivered);
        assert_eq!(presence.connection_count(), 0);
    }

    struct BrokenInbox;

    impl NotificationStore for BrokenInbox {
        fn append(&self, _: &NotificationRecord) -> linkwire_store::Result<()> {
            Err(StoreError::Corrupt("disk gone".into()))
        }
        fn mark_delivered(&self, _: &[NotificationId]) -> linkwire_store::Result<usize> {
            Err(StoreError::Corrupt("disk gone".into()))
        }
        fn undelivered(&self, _: &UserId, _: u32) -> linkwire_store::Result<Vec<NotificationRecord>> {
            Err(StoreError::Corrupt("disk gone".into()))
        }
        fn list(
            &self,
            _: &UserId,
            _: &NotificationQuery,
        ) -> linkwire_store::Result<Vec<NotificationRecord>> {
            Ok(Vec::new())
        }
        fn unread_count(&self, _: &UserId) -> linkwire_store::Result<u64> {
            Ok(0)
        }
        fn mark_read(&self, _: &UserId, _: &NotificationId) -> linkwire_store::Result<bool> {
            Ok(false)
        }
        fn mark_all_read(&self, _: &UserId) -> linkwire_store::Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn persistence_failure_still_pushes_live() {
        let presence = Arc::new(PresenceRegistry::new());
        let fanout = EventFanout::new(
            Arc::new(BrokenInbox),
            presence.clone(),
            Duration::from_millis(200),
        );
        let (_c, mut rx) = live_channel(&presence, "bob");

        let report = fanout.publish(&event("bob", "alice")).await;
        assert!(!report.persisted);
        assert_eq!(report.delivery.delivered, 1);
        assert!(!report.marked_delivered);
        assert_eq!(frame_type(&rx.recv().await.unwrap()), messages::CONNECTION_UPDATE);
        // no notification frame for an entry that was never stored
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn persist_then_push_later() {
        let (store, presence, fanout) = setup();
        let bob = UserId::from("bob");
        let pending = fanout.persist(event("bob", "alice"));
        assert_eq!(pending.recipient(), &bob);
        assert_eq!(store.undelivered(&bob, 10).unwrap().len(), 1);

        let (_c, mut rx) = live_channel(&presence, "bob");
        let report = fanout.push(pending).await;
        assert!(report.marked_delivered);
        assert_eq!(frame_type(&rx.recv().await.unwrap()), messages::CONNECTION_UPDATE);
        assert_eq!(frame_type(&rx.recv().await.unwrap()), messages::NEW_NOTIFICATION);
        assert!(store.undelivered(&bob, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn backlog_is_replayed_oldest_first_and_marked() {
        let (store, presence, fanout) = setup();
        let bob = UserId::from("bob");
        let first = fanout.publish(&event("bob", "alice")).await;
        let second = fanout.publish(&event("bob", "carol")).await;

        let (channel, mut rx) = live_channel(&presence, "bob");
        let replayed = fanout.replay_backlog(&bob, &channel, 100).await;
        assert_eq!(replayed, 2);

        let ids: Vec<String> = (0..2)
            .map(|_| {
                let v: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
                v["data"]["id"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(ids, [first.notification_id.to_string(), second.notification_id.to_string()]);
        assert!(store.undelivered(&bob, 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn replay_respects_limit() {
        let (store, presence, fanout) = setup();
        let bob = UserId::from("bob");
        for other in ["a", "c", "d"] {
            let _ = fanout.publish(&event("bob", other)).await;
        }
        let (channel, _rx) = live_channel(&presence, "bob");
        assert_eq!(fanout.replay_backlog(&bob, &channel, 2).await, 2);
        assert_eq!(store.undelivered(&bob, 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replay_with_broken_store_is_zero() {
        let presence = Arc::new(PresenceRegistry::new());
        let fanout = EventFanout::new(Arc::new(BrokenInbox), presence.clone(), Duration::from_millis(50));
        let (channel, _rx) = live_channel(&presence, "bob");
        assert_eq!(fanout.replay_backlog(&UserId::from("bob"), &channel, 10).await, 0);
    }
}
