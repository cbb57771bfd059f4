//! Live channel frames.
//!
//! Every server frame is an envelope `{"type", "timestamp", "data"}`. Client
//! frames are flat objects tagged by `type`.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use linkwire_core::{ChannelId, ConnectionEvent, UserId};
use linkwire_store::NotificationRecord;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// Sent once right after the socket is accepted.
pub const CONNECTION_ESTABLISHED: &str = "connection.established";
/// Acknowledges `registerUser`.
pub const REGISTERED: &str = "registered";
/// A pair involving the user changed.
pub const CONNECTION_UPDATE: &str = "connection_update";
/// A notification was added to the user's inbox.
pub const NEW_NOTIFICATION: &str = "new_notification";
/// Reply to a client `ping`.
pub const PONG: &str = "pong";
/// A client frame was rejected.
pub const ERROR: &str = "error";

/// Frames a client may send.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Attach this socket to the user's presence entry.
    #[serde(rename = "registerUser", rename_all = "camelCase")]
    RegisterUser {
        /// Must equal the authenticated user.
        user_id: UserId,
    },
    /// Application-level keepalive.
    #[serde(rename = "ping")]
    Ping,
}

#[derive(Serialize)]
struct Envelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: String,
    data: T,
}

/// Serialize an envelope. Serialization failures are logged and yield `None`.
pub fn frame<T: Serialize>(kind: &str, data: T) -> Option<Arc<String>> {
    let envelope = Envelope {
        kind,
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        data,
    };
    match serde_json::to_string(&envelope) {
        Ok(text) => Some(Arc::new(text)),
        Err(e) => {
            warn!(frame_type = kind, error = %e, "failed to serialize frame");
            None
        }
    }
}

/// `connection.established {channelId}`
pub fn established(channel_id: &ChannelId) -> Option<Arc<String>> {
    frame(CONNECTION_ESTABLISHED, json!({ "channelId": channel_id }))
}

/// `registered {userId, channelId, replayed}`
pub fn registered(user_id: &UserId, channel_id: &ChannelId, replayed: usize) -> Option<Arc<String>> {
    frame(
        REGISTERED,
        json!({ "userId": user_id, "channelId": channel_id, "replayed": replayed }),
    )
}

/// `connection_update` for the event's recipient.
pub fn connection_update(event: &ConnectionEvent) -> Option<Arc<String>> {
    frame(
        CONNECTION_UPDATE,
        json!({
            "type": event.kind,
            "fromUserId": event.counterpart,
            "actorId": event.actor,
            "connectionCount": event.connection_count,
            "status": event.status,
            "version": event.pair_version,
            "message": event.message(),
        }),
    )
}

/// `new_notification` carrying the full record.
pub fn new_notification(record: &NotificationRecord) -> Option<Arc<String>> {
    frame(NEW_NOTIFICATION, record)
}

/// `pong`
pub fn pong() -> Option<Arc<String>> {
    frame(PONG, json!({}))
}

/// `error {code, message}`
pub fn error(code: &str, message: &str) -> Option<Arc<String>> {
    frame(ERROR, json!({ "code": code, "message": message }))
}
