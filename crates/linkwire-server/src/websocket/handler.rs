//! WebSocket upgrade and client frame dispatch.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::response::{IntoResponse, Response};
use linkwire_core::UserId;
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::messages::{self, ClientMessage};
use super::session::run_ws_session;
use crate::errors;
use crate::http::auth::AuthUser;
use crate::http::error::ApiError;
use crate::metrics::WS_REJECTED_TOTAL;
use crate::presence::{ClientChannel, Registration};
use crate::server::AppState;

/// `GET /ws`: upgrade an authenticated caller to a live channel.
///
/// Every open socket holds a session slot from upgrade until it closes,
/// whether or not it ever sends `registerUser`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
) -> Response {
    let Ok(slot) = Arc::clone(&state.session_slots).try_acquire_owned() else {
        warn!(
            user_id = %user,
            max = state.config.max_connections,
            "max connections reached, rejecting socket"
        );
        counter!(WS_REJECTED_TOTAL).increment(1);
        return ApiError::Unavailable("too many live connections".into()).into_response();
    };
    let shutdown = Arc::clone(&state.shutdown);
    ws.on_upgrade(move |socket| {
        shutdown.track_session(async move {
            let _slot = slot;
            run_ws_session(socket, user, state).await;
        })
    })
}

/// Handle one text frame from a client and return the reply, if any.
///
/// `registerUser` attaches the channel to the caller's presence entry and
/// replays the undelivered backlog before the acknowledgement is returned, so
/// the client sees replayed notifications ahead of `registered`.
#[instrument(skip_all, fields(user_id = %user, channel_id = %channel.id))]
pub async fn handle_client_message(
    text: &str,
    user: &UserId,
    channel: &Arc<ClientChannel>,
    state: &AppState,
) -> Option<Arc<String>> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "invalid client frame");
            return messages::error(errors::INVALID_REQUEST, &format!("invalid frame: {e}"));
        }
    };

    match message {
        ClientMessage::Ping => messages::pong(),
        ClientMessage::RegisterUser { user_id } => {
            if &user_id != user {
                warn!(claimed = %user_id, "registerUser for a different user");
                return messages::error(
                    errors::UNAUTHORIZED,
                    "registerUser must name the authenticated user",
                );
            }
            let replayed = match state.presence.register(user, Arc::clone(channel)) {
                Registration::Registered => {
                    state
                        .fanout
                        .replay_backlog(user, channel, state.config.replay_limit)
                        .await
                }
                Registration::AlreadyRegistered => 0,
            };
            messages::registered(user, &channel.id, replayed)
        }
    }
}
