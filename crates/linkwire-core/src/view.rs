//! Relationship status as seen by one of the participants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::UserId;
use crate::record::ConnectionRecord;
use crate::state_machine::ConnectionStatus;

/// Status of a pair from the viewer's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStatus {
    /// No relationship.
    None,
    /// The viewer sent a request that is still pending.
    PendingSent,
    /// The other user sent a request the viewer has not answered.
    PendingReceived,
    /// Connected.
    Connected,
    /// Viewer and other are the same user.
    IsSelf,
}

impl ViewerStatus {
    /// Derive the viewer's status from a stored snapshot. An absent record and
    /// a `None` tombstone are the same thing.
    #[must_use]
    pub fn of(record: Option<&ConnectionRecord>, viewer: &UserId, other: &UserId) -> Self {
        if viewer == other {
            return Self::IsSelf;
        }
        let Some(record) = record else {
            return Self::None;
        };
        Self::from_parts(record.status, record.requested_by.as_ref(), viewer)
    }

    /// Same as [`ViewerStatus::of`] but from loose fields, used after a
    /// transition before the record is reloaded.
    #[must_use]
    pub fn from_parts(
        status: ConnectionStatus,
        requested_by: Option<&UserId>,
        viewer: &UserId,
    ) -> Self {
        match status {
            ConnectionStatus::None => Self::None,
            ConnectionStatus::Connected => Self::Connected,
            ConnectionStatus::Pending if requested_by == Some(viewer) => Self::PendingSent,
            ConnectionStatus::Pending => Self::PendingReceived,
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PendingSent => "pending_sent",
            Self::PendingReceived => "pending_received",
            Self::Connected => "connected",
            Self::IsSelf => "is_self",
        }
    }
}

impl fmt::Display for ViewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
