//! Persisted notification records.

use chrono::{DateTime, Utc};
use linkwire_core::{ConnectionEvent, NotificationId, NotificationKind, PairKey, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in a user's notification inbox.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    /// Time-ordered id.
    pub id: NotificationId,
    /// Inbox owner.
    pub recipient_id: UserId,
    /// The other participant of the pair.
    pub sender_id: UserId,
    /// Notification type.
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Sender summary and message.
    pub payload: Value,
    /// Pair the notification is about.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<PairKey>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Pushed to at least one live channel, or replayed on registration.
    pub delivered: bool,
    /// When the recipient read it.
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    /// Build the inbox entry for an event addressed to `event.recipient`.
    #[must_use]
    pub fn for_event(event: &ConnectionEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: NotificationId::new(),
            recipient_id: event.recipient.clone(),
            sender_id: event.counterpart.clone(),
            kind: event.kind.notification_kind(),
            payload: event.payload(),
            pair: Some(PairKey::new(&event.recipient, &event.counterpart)),
            created_at: now,
            delivered: false,
            read_at: None,
        }
    }

    /// Whether the recipient has read it.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }
}

/// Inbox listing options.
#[derive(Clone, Copy, Debug)]
pub struct NotificationQuery {
    /// Only entries without `read_at`.
    pub unread_only: bool,
    /// Maximum entries, newest first.
    pub limit: u32,
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            unread_only: false,
            limit: 50,
        }
    }
}
