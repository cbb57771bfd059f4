//! Connection events and the notification kinds they persist as.
//!
//! A committed transition produces one [`ConnectionEvent`] per participant.
//! Each event is phrased from its recipient's point of view: `counterpart` is
//! always the *other* user, and `status` is the recipient's own
//! [`ViewerStatus`] after the change.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::ids::UserId;
use crate::view::ViewerStatus;

/// What happened to the pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEventKind {
    /// A request was sent.
    Requested,
    /// A request was accepted (including a mutual request).
    Accepted,
    /// A request was declined.
    Rejected,
    /// A request was withdrawn by its sender.
    Cancelled,
    /// An established connection was removed.
    Removed,
}

impl ConnectionEventKind {
    /// Value of the `type` field in `connection_update` frames.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Removed => "removed",
        }
    }

    /// Notification kind persisted for this event.
    #[must_use]
    pub fn notification_kind(self) -> NotificationKind {
        match self {
            Self::Requested => NotificationKind::ConnectionRequest,
            Self::Accepted => NotificationKind::ConnectionAccepted,
            Self::Rejected => NotificationKind::ConnectionRejected,
            Self::Cancelled => NotificationKind::ConnectionCancelled,
            Self::Removed => NotificationKind::ConnectionRemoved,
        }
    }
}

impl fmt::Display for ConnectionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted notification type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    /// `CONNECTION_REQUEST`
    ConnectionRequest,
    /// `CONNECTION_ACCEPTED`
    ConnectionAccepted,
    /// `CONNECTION_REJECTED`
    ConnectionRejected,
    /// `CONNECTION_REMOVED`
    ConnectionRemoved,
    /// `CONNECTION_CANCELLED`
    ConnectionCancelled,
}

impl NotificationKind {
    /// Database / wire representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionRequest => "CONNECTION_REQUEST",
            Self::ConnectionAccepted => "CONNECTION_ACCEPTED",
            Self::ConnectionRejected => "CONNECTION_REJECTED",
            Self::ConnectionRemoved => "CONNECTION_REMOVED",
            Self::ConnectionCancelled => "CONNECTION_CANCELLED",
        }
    }

    /// Parse the database representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CONNECTION_REQUEST" => Some(Self::ConnectionRequest),
            "CONNECTION_ACCEPTED" => Some(Self::ConnectionAccepted),
            "CONNECTION_REJECTED" => Some(Self::ConnectionRejected),
            "CONNECTION_REMOVED" => Some(Self::ConnectionRemoved),
            "CONNECTION_CANCELLED" => Some(Self::ConnectionCancelled),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque profile data supplied by the profile directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    /// Profile owner.
    pub user_id: UserId,
    /// Name to show in messages.
    pub display_name: String,
    /// Avatar URL, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ProfileSummary {
    /// A summary that only knows the id.
    #[must_use]
    pub fn bare(user_id: &UserId) -> Self {
        Self {
            user_id: user_id.clone(),
            display_name: user_id.to_string(),
            avatar_url: None,
        }
    }
}

/// A committed change, addressed to one participant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionEvent {
    /// What happened.
    pub kind: ConnectionEventKind,
    /// Who receives this event.
    pub recipient: UserId,
    /// The other participant.
    pub counterpart: UserId,
    /// Who performed the action.
    pub actor: UserId,
    /// Recipient's status after the change.
    pub status: ViewerStatus,
    /// Recipient's connected-count after the change.
    pub connection_count: u64,
    /// Record version the change committed as.
    pub pair_version: u64,
    /// Profile of the counterpart, for display.
    pub counterpart_profile: ProfileSummary,
}

impl ConnectionEvent {
    /// Whether the recipient is the one who acted.
    #[must_use]
    pub fn is_echo(&self) -> bool {
        self.recipient == self.actor
    }

    /// Human-readable message for the recipient.
    #[must_use]
    pub fn message(&self) -> String {
        let name = &self.counterpart_profile.display_name;
        if self.is_echo() {
            match self.kind {
                ConnectionEventKind::Requested => format!("Connection request sent to {name}"),
                ConnectionEventKind::Accepted => format!("You are now connected with {name}"),
                ConnectionEventKind::Rejected => {
                    format!("Connection request from {name} rejected")
                }
                ConnectionEventKind::Cancelled => {
                    format!("Connection request to {name} cancelled")
                }
                ConnectionEventKind::Removed => format!("Disconnected from {name}"),
            }
        } else {
            match self.kind {
                ConnectionEventKind::Requested => format!("{name} sent you a connection request"),
                ConnectionEventKind::Accepted => {
                    format!("{name} accepted your connection request.")
                }
                ConnectionEventKind::Rejected => {
                    format!("{name} declined your connection request.")
                }
                ConnectionEventKind::Cancelled => {
                    format!("{name} withdrew their connection request.")
                }
                ConnectionEventKind::Removed => {
                    format!("{name} has removed the connection with you.")
                }
            }
        }
    }

    /// JSON payload stored with the notification.
    #[must_use]
    pub fn payload(&self) -> Value {
        json!({
            "event": self.kind.as_str(),
            "message": self.message(),
            "sender": self.counterpart_profile,
            "actorId": self.actor,
            "status": self.status,
            "connectionCount": self.connection_count,
            "version": self.pair_version,
        })
    }
}
