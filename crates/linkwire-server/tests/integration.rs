//! End-to-end tests against a real listener with HTTP and WebSocket clients.

#![allow(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use linkwire_core::UserId;
use linkwire_server::{LinkwireServer, OpenDirectory, ServerConfig};
use linkwire_store::SqliteStore;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    server: Arc<LinkwireServer>,
    base: String,
    ws_url: String,
    handle: tokio::task::JoinHandle<()>,
}

async fn boot_with(config: ServerConfig) -> TestServer {
    let store = Arc::new(SqliteStore::in_memory().unwrap());
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .build_recorder()
        .handle();
    let server = Arc::new(LinkwireServer::new(
        config,
        store,
        Arc::new(OpenDirectory),
        metrics_handle,
    ));
    let (addr, handle) = server.listen().await.unwrap();
    TestServer {
        server,
        base: format!("http://{addr}"),
        ws_url: format!("ws://{addr}/ws"),
        handle,
    }
}

async fn boot() -> TestServer {
    boot_with(ServerConfig::default()).await
}

async fn try_connect(url: &str, user: &str) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request().unwrap();
    let _ = request
        .headers_mut()
        .insert("x-user-id", user.parse().unwrap());
    connect_async(request).await.map(|(ws, _)| ws)
}

/// Next JSON frame, skipping control frames.
async fn next_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("ws error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Connect, consume `connection.established`, register and consume the ack.
async fn connect_registered(url: &str, user: &str) -> (WsStream, Value) {
    let mut ws = try_connect(url, user).await.unwrap();
    let hello = next_json(&mut ws).await;
    assert_eq!(hello["type"], "connection.established");
    assert!(hello["data"]["channelId"].is_string());

    let register = json!({ "type": "registerUser", "userId": user }).to_string();
    ws.send(Message::Text(register.into())).await.unwrap();
    let mut replayed = Vec::new();
    loop {
        let frame = next_json(&mut ws).await;
        if frame["type"] == "registered" {
            assert_eq!(frame["data"]["replayed"], replayed.len());
            return (ws, json!(replayed));
        }
        replayed.push(frame);
    }
}

async fn post(base: &str, path: &str, user: &str, body: Value) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .post(format!("{base}{path}"))
        .header("x-user-id", user)
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

async fn get(base: &str, path: &str, user: &str) -> (u16, Value) {
    let resp = reqwest::Client::new()
        .get(format!("{base}{path}"))
        .header("x-user-id", user)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap_or(Value::Null))
}

#[tokio::test]
async fn request_and_accept_reach_both_live_channels() {
    let t = boot().await;
    let (mut alice, _) = connect_registered(&t.ws_url, "alice").await;
    let (mut bob, _) = connect_registered(&t.ws_url, "bob").await;

    let (status, body) = post(
        &t.base,
        "/connections/request",
        "alice",
        json!({ "targetUserId": "bob" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "pending");

    let update = next_json(&mut bob).await;
    assert_eq!(update["type"], "connection_update");
    assert_eq!(update["data"]["type"], "requested");
    assert_eq!(update["data"]["fromUserId"], "alice");
    assert_eq!(update["data"]["status"], "pending_received");
    assert_eq!(update["data"]["version"], 1);
    let note = next_json(&mut bob).await;
    assert_eq!(note["type"], "new_notification");
    assert_eq!(note["data"]["type"], "CONNECTION_REQUEST");
    assert_eq!(note["data"]["senderId"], "alice");

    // the actor's own channels see the change too
    let echo = next_json(&mut alice).await;
    assert_eq!(echo["data"]["status"], "pending_sent");
    let _ = next_json(&mut alice).await;

    let (status, body) = post(
        &t.base,
        "/connections/accept",
        "bob",
        json!({ "requestFromUserId": "alice" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "connected");
    assert_eq!(body["version"], 2);

    let accepted = next_json(&mut alice).await;
    assert_eq!(accepted["data"]["type"], "accepted");
    assert_eq!(accepted["data"]["status"], "connected");
    assert_eq!(accepted["data"]["connectionCount"], 1);

    let (_, status) = get(&t.base, "/connections/status/alice", "bob").await;
    assert_eq!(status["status"], "connected");

    // pushed notifications are flagged delivered
    let (_, inbox) = get(&t.base, "/notifications", "bob").await;
    let entries = inbox["notifications"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|n| n["delivered"] == true));
}

#[tokio::test]
async fn offline_notifications_replay_on_register() {
    let t = boot().await;
    let (status, _) = post(
        &t.base,
        "/connections/request",
        "alice",
        json!({ "targetUserId": "carol" }),
    )
    .await;
    assert_eq!(status, 200);

    let (_, replayed) = connect_registered(&t.ws_url, "carol").await;
    let replayed = replayed.as_array().unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0]["type"], "new_notification");
    assert_eq!(replayed[0]["data"]["senderId"], "alice");

    // a second device replays nothing: the backlog was marked delivered
    let (_, again) = connect_registered(&t.ws_url, "carol").await;
    assert!(again.as_array().unwrap().is_empty());
    assert_eq!(t.server.presence().channels_for(&UserId::from("carol")).len(), 2);
}

#[tokio::test]
async fn missing_identity_is_rejected() {
    let t = boot().await;
    let resp = reqwest::get(format!("{}/connections", t.base)).await.unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let err = connect_async(t.ws_url.as_str()).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn ping_frame_gets_pong() {
    let t = boot().await;
    let (mut ws, _) = connect_registered(&t.ws_url, "dave").await;
    ws.send(Message::Text(json!({ "type": "ping" }).to_string().into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "pong");

    ws.send(Message::Text("{\"type\":\"bogus\"}".into()))
        .await
        .unwrap();
    let err = next_json(&mut ws).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["data"]["code"], "InvalidRequest");
}

#[tokio::test]
async fn closing_socket_unregisters_channel() {
    let t = boot().await;
    let (mut ws, _) = connect_registered(&t.ws_url, "erin").await;
    let erin = UserId::from("erin");
    assert!(t.server.presence().is_online(&erin));

    ws.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while t.server.presence().is_online(&erin) {
        assert!(tokio::time::Instant::now() < deadline, "channel never unregistered");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn silent_client_is_dropped_by_heartbeat() {
    let t = boot_with(ServerConfig {
        heartbeat_interval_ms: 50,
        heartbeat_timeout_ms: 150,
        sweep_interval_ms: 50,
        ..ServerConfig::default()
    })
    .await;
    // registered, then never read again so pings go unanswered
    let (_ws, _) = connect_registered(&t.ws_url, "frank").await;
    let frank = UserId::from("frank");

    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while t.server.presence().is_online(&frank) {
        assert!(tokio::time::Instant::now() < deadline, "silent client never dropped");
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn connection_limit_rejects_extra_sockets() {
    let t = boot_with(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    let (_alice, _) = connect_registered(&t.ws_url, "alice").await;
    assert!(try_connect(&t.ws_url, "bob").await.is_err());
}

#[tokio::test]
async fn unregistered_sockets_count_toward_limit() {
    let t = boot_with(ServerConfig {
        max_connections: 1,
        ..ServerConfig::default()
    })
    .await;
    // connected but never sends registerUser
    let mut idle = try_connect(&t.ws_url, "ivan").await.unwrap();
    assert_eq!(next_json(&mut idle).await["type"], "connection.established");
    assert!(try_connect(&t.ws_url, "judy").await.is_err());

    // closing the idle socket frees its slot
    idle.close(None).await.unwrap();
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        match try_connect(&t.ws_url, "judy").await {
            Ok(_) => break,
            Err(_) => {
                assert!(tokio::time::Instant::now() < deadline, "slot never released");
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }
    }
}

#[tokio::test]
async fn status_map_after_live_request() {
    let t = boot().await;
    let (mut bob, _) = connect_registered(&t.ws_url, "bob").await;
    let (status, _) = post(
        &t.base,
        "/connections/request",
        "alice",
        json!({ "targetUserId": "bob" }),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(next_json(&mut bob).await["type"], "connection_update");

    let (status, body) = get(&t.base, "/connections/status", "bob").await;
    assert_eq!(status, 200);
    assert_eq!(body["connections"]["alice"], "pending_received");
}

#[tokio::test]
async fn health_reports_live_channels() {
    let t = boot().await;
    let (_ws, _) = connect_registered(&t.ws_url, "gina").await;
    let body: Value = reqwest::get(format!("{}/health", t.base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    assert_eq!(body["online_users"], 1);
}

#[tokio::test]
async fn graceful_shutdown_closes_sessions() {
    let t = boot().await;
    let (mut ws, _) = connect_registered(&t.ws_url, "hank").await;

    t.server.shutdown().shutdown();
    timeout(TIMEOUT, t.handle).await.unwrap().unwrap();

    // the session ends: either a close frame or the stream finishes
    let ended = timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    assert!(!t.server.presence().is_online(&UserId::from("hank")));
}
