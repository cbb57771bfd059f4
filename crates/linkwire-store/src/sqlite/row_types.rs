//! Raw database row shapes and their conversion to domain types.
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision in UTC,
//! which sorts lexicographically in time order.

use chrono::{DateTime, SecondsFormat, Utc};
use linkwire_core::{
    ConnectionRecord, ConnectionStatus, NotificationId, NotificationKind, PairKey, UserId,
};

use crate::errors::{Result, StoreError};
use crate::types::NotificationRecord;

/// Raw row from the `connections` table.
#[derive(Clone, Debug)]
pub struct ConnectionRow {
    /// Smaller participant id.
    pub participant_low: String,
    /// Larger participant id.
    pub participant_high: String,
    /// `NONE` / `PENDING` / `CONNECTED`.
    pub status: String,
    /// Requester while pending.
    pub requested_by: Option<String>,
    /// RFC 3339.
    pub created_at: String,
    /// RFC 3339.
    pub updated_at: String,
    /// Optimistic concurrency counter.
    pub version: i64,
}

impl ConnectionRow {
    /// Flatten a domain record.
    pub fn from_record(record: &ConnectionRecord) -> Result<Self> {
        Ok(Self {
            participant_low: record.pair.low().to_string(),
            participant_high: record.pair.high().to_string(),
            status: record.status.as_db_str().to_string(),
            requested_by: record.requested_by.as_ref().map(ToString::to_string),
            created_at: format_ts(record.created_at),
            updated_at: format_ts(record.updated_at),
            version: to_i64(record.version)?,
        })
    }

    /// Rebuild the domain record.
    pub fn into_record(self) -> Result<ConnectionRecord> {
        let status = ConnectionStatus::from_db_str(&self.status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown status {:?}", self.status)))?;
        Ok(ConnectionRecord {
            pair: PairKey::new(
                &UserId::from(self.participant_low),
                &UserId::from(self.participant_high),
            ),
            status,
            requested_by: self.requested_by.map(UserId::from),
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            version: to_u64(self.version)?,
        })
    }
}

/// Raw row from the `notifications` table.
#[derive(Clone, Debug)]
pub struct NotificationRow {
    /// Notification id.
    pub id: String,
    /// Recipient.
    pub recipient_id: String,
    /// Counterpart from the recipient's point of view.
    pub sender_id: String,
    /// Notification type string.
    pub kind: String,
    /// JSON payload text.
    pub payload: String,
    /// Pair reference, low side.
    pub pair_low: Option<String>,
    /// Pair reference, high side.
    pub pair_high: Option<String>,
    /// RFC 3339.
    pub created_at: String,
    /// Pushed to at least one live channel.
    pub delivered: bool,
    /// RFC 3339, null while unread.
    pub read_at: Option<String>,
}

impl NotificationRow {
    /// Flatten a domain record.
    pub fn from_record(record: &NotificationRecord) -> Result<Self> {
        Ok(Self {
            id: record.id.to_string(),
            recipient_id: record.recipient_id.to_string(),
            sender_id: record.sender_id.to_string(),
            kind: record.kind.as_str().to_string(),
            payload: serde_json::to_string(&record.payload)?,
            pair_low: record.pair.as_ref().map(|p| p.low().to_string()),
            pair_high: record.pair.as_ref().map(|p| p.high().to_string()),
            created_at: format_ts(record.created_at),
            delivered: record.delivered,
            read_at: record.read_at.map(format_ts),
        })
    }

    /// Rebuild the domain record.
    pub fn into_record(self) -> Result<NotificationRecord> {
        let kind = NotificationKind::parse(&self.kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown notification type {:?}", self.kind)))?;
        let pair = match (self.pair_low, self.pair_high) {
            (Some(low), Some(high)) => Some(PairKey::new(&UserId::from(low), &UserId::from(high))),
            _ => None,
        };
        Ok(NotificationRecord {
            id: NotificationId::from(self.id),
            recipient_id: UserId::from(self.recipient_id),
            sender_id: UserId::from(self.sender_id),
            kind,
            payload: serde_json::from_str(&self.payload)?,
            pair,
            created_at: parse_ts(&self.created_at)?,
            delivered: self.delivered,
            read_at: self.read_at.as_deref().map(parse_ts).transpose()?,
        })
    }
}

/// Format a timestamp for storage.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp.
pub fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("bad timestamp {s:?}: {e}")))
}

/// Convert a counter for storage.
pub fn to_i64(v: u64) -> Result<i64> {
    i64::try_from(v).map_err(|_| StoreError::Corrupt(format!("counter {v} out of range")))
}

/// Convert a stored counter back.
pub fn to_u64(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| StoreError::Corrupt(format!("negative counter {v}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
