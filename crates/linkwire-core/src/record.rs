//! Persistent state of one unordered pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PairKey, UserId};
use crate::state_machine::{ConnectionStatus, Transition};

/// The single record kept for an unordered pair of users.
///
/// `version` starts at 1 when the record is first written and increases by
/// exactly one on every committed change. A record in `None` status is kept
/// as a tombstone; readers treat it the same as an absent record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Canonical pair key.
    pub pair: PairKey,
    /// Current status.
    pub status: ConnectionStatus,
    /// Requester, present only while `Pending`.
    pub requested_by: Option<UserId>,
    /// First write.
    pub created_at: DateTime<Utc>,
    /// Last committed write.
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency counter.
    pub version: u64,
}

impl ConnectionRecord {
    /// Build the first record for a pair from a committed transition.
    #[must_use]
    pub fn first(pair: PairKey, transition: &Transition, now: DateTime<Utc>) -> Self {
        Self {
            pair,
            status: transition.status,
            requested_by: transition.requested_by.clone(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Build the successor of this record. The version is bumped here; the
    /// store only accepts it if `self.version` is still current.
    #[must_use]
    pub fn successor(&self, transition: &Transition, now: DateTime<Utc>) -> Self {
        Self {
            pair: self.pair.clone(),
            status: transition.status,
            requested_by: transition.requested_by.clone(),
            created_at: self.created_at,
            updated_at: now,
            version: self.version + 1,
        }
    }

    /// Whether `user` sent the pending request.
    #[must_use]
    pub fn requested_by_user(&self, user: &UserId) -> bool {
        self.status == ConnectionStatus::Pending && self.requested_by.as_ref() == Some(user)
    }
}
