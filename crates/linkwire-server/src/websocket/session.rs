//! One live channel, from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use linkwire_core::{ChannelId, UserId};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use super::handler::handle_client_message;
use super::messages;
use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL, WS_HEARTBEAT_TIMEOUTS_TOTAL,
};
use crate::presence::{ClientChannel, HeartbeatResult, PushOutcome, run_heartbeat};
use crate::server::AppState;

/// How long the writer gets to flush a close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Run a live channel for `user`.
///
/// 1. Queues `connection.established` with the channel id
/// 2. Forwards queued frames to the socket and pings every heartbeat interval
/// 3. Dispatches client frames; `registerUser` makes the channel reachable
/// 4. Ends on client close, heartbeat timeout, eviction or shutdown
/// 5. Unregisters the channel
#[instrument(skip_all, fields(user_id = %user, channel_id))]
pub async fn run_ws_session(ws: WebSocket, user: UserId, state: AppState) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let channel_id = ChannelId::new();
    let _ = tracing::Span::current().record("channel_id", channel_id.as_str());
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(state.config.channel_buffer.max(1));
    let channel = Arc::new(ClientChannel::new(channel_id, send_tx));

    info!("client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    if let Some(frame) = messages::established(&channel.id) {
        let _ = channel.send(frame);
    }

    let ping_every = state.config.heartbeat_interval();
    let writer_channel = Arc::clone(&channel);
    let mut outbound = tokio::spawn(async move {
        let mut ping = tokio::time::interval(ping_every);
        // first tick completes immediately
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_channel.closed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let heartbeat = run_heartbeat(
        Arc::clone(&channel),
        state.config.heartbeat_interval(),
        state.config.heartbeat_timeout(),
        state.shutdown.child_token(),
    );
    tokio::pin!(heartbeat);

    let reason = loop {
        tokio::select! {
            msg = ws_rx.next() => {
                let Some(Ok(msg)) = msg else { break "disconnected" };
                channel.mark_alive();
                let text = match msg {
                    Message::Text(t) => t.as_str().to_owned(),
                    Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                        Ok(s) => s,
                        Err(_) => {
                            debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                            continue;
                        }
                    },
                    Message::Close(_) => break "client_close",
                    Message::Ping(_) | Message::Pong(_) => continue,
                };
                if let Some(reply) = handle_client_message(&text, &user, &channel, &state).await {
                    let _ = queue_reply(&channel, reply, state.config.push_timeout()).await;
                }
            }
            result = &mut heartbeat => match result {
                HeartbeatResult::TimedOut => {
                    warn!(
                        silent_for = ?channel.last_seen_elapsed(),
                        "client unresponsive, disconnecting"
                    );
                    counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
                    break "heartbeat_timeout";
                }
                HeartbeatResult::Cancelled => break "shutdown",
            },
            () = channel.closed() => break "evicted",
        }
    };

    let _ = state.presence.unregister(&user, &channel.id);
    channel.close();
    if tokio::time::timeout(CLOSE_GRACE, &mut outbound).await.is_err() {
        outbound.abort();
    }

    info!(reason, dropped = channel.drop_count(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL, "reason" => reason).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(channel.connected_at.elapsed().as_secs_f64());
}

/// Queue the reply to a client frame, waiting up to `timeout` for room left
/// by a backlog replay that just filled the buffer.
async fn queue_reply(channel: &ClientChannel, reply: Arc<String>, timeout: Duration) -> bool {
    match channel.push(reply, timeout).await {
        PushOutcome::Delivered => true,
        outcome => {
            debug!(?outcome, "failed to queue reply");
            false
        }
    }
}
