//! Read-only views used by clients to resynchronize after a missed push or a
//! timed-out action.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use linkwire_core::{ConnectionRecord, ConnectionStatus, PairKey, UserId, ViewerStatus};
use linkwire_store::ConnectionStore;
use serde::Serialize;

use crate::errors::Result;

/// One entry of a connection list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedUser {
    /// The other participant.
    pub user_id: UserId,
    /// When the pair last changed.
    pub since: DateTime<Utc>,
}

/// `{users, count}`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UserList {
    /// Most recently changed first.
    pub users: Vec<ListedUser>,
    /// `users.len()`
    pub count: usize,
}

impl UserList {
    fn from_records<'a>(user: &UserId, records: impl IntoIterator<Item = &'a ConnectionRecord>) -> Self {
        let users: Vec<ListedUser> = records
            .into_iter()
            .filter_map(|r| {
                r.pair.other(user).map(|other| ListedUser {
                    user_id: other.clone(),
                    since: r.updated_at,
                })
            })
            .collect();
        Self {
            count: users.len(),
            users,
        }
    }
}

/// Status and list lookups straight from the store.
pub struct ReconciliationEndpoint {
    connections: Arc<dyn ConnectionStore>,
}

impl ReconciliationEndpoint {
    /// Create an endpoint reading from `connections`.
    pub fn new(connections: Arc<dyn ConnectionStore>) -> Self {
        Self { connections }
    }

    /// How `viewer` currently relates to `other`.
    pub fn status_of(&self, viewer: &UserId, other: &UserId) -> Result<ViewerStatus> {
        if viewer == other {
            return Ok(ViewerStatus::IsSelf);
        }
        let record = self.connections.get(&PairKey::new(viewer, other))?;
        Ok(ViewerStatus::of(record.as_ref(), viewer, other))
    }

    /// Every user `viewer` is connected with or has a pending request with,
    /// mapped to the viewer's side of it. Users with no relationship are
    /// absent.
    pub fn all_statuses(&self, viewer: &UserId) -> Result<BTreeMap<UserId, ViewerStatus>> {
        let mut statuses = BTreeMap::new();
        for status in [ConnectionStatus::Connected, ConnectionStatus::Pending] {
            for record in self.connections.list_for_user(viewer, status)? {
                if let Some(other) = record.pair.other(viewer) {
                    let _ = statuses.insert(
                        other.clone(),
                        ViewerStatus::of(Some(&record), viewer, other),
                    );
                }
            }
        }
        Ok(statuses)
    }

    /// Users `user` is connected with.
    pub fn connections(&self, user: &UserId) -> Result<UserList> {
        let records = self.connections.list_for_user(user, ConnectionStatus::Connected)?;
        Ok(UserList::from_records(user, &records))
    }

    /// Pending requests other users sent to `user`.
    pub fn incoming_requests(&self, user: &UserId) -> Result<UserList> {
        let records = self.connections.list_for_user(user, ConnectionStatus::Pending)?;
        Ok(UserList::from_records(
            user,
            records.iter().filter(|r| !r.requested_by_user(user)),
        ))
    }

    /// Pending requests `user` sent.
    pub fn outgoing_requests(&self, user: &UserId) -> Result<UserList> {
        let records = self.connections.list_for_user(user, ConnectionStatus::Pending)?;
        Ok(UserList::from_records(
            user,
            records.iter().filter(|r| r.requested_by_user(user)),
        ))
    }
}
