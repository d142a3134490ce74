use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use syncroom_core::time::{now_ms, now_secs};
use syncroom_server::build_app;
use syncroom_server::config::{AuthFileConfig, ServerConfig};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub const TEST_SECRET: &str = "integration-secret";

pub struct TestServer {
    pub addr: SocketAddr,
    _server: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Start a test server with authentication disabled.
    pub async fn spawn() -> Self {
        Self::from_config(ServerConfig::default()).await
    }

    /// Start a test server with a JWT secret and role requirements.
    pub async fn with_auth(host_roles: &[&str], invite_roles: &[&str]) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                secret: Some(TEST_SECRET.to_string()),
                host_roles: host_roles.iter().map(|s| s.to_string()).collect(),
                invite_roles: invite_roles.iter().map(|s| s.to_string()).collect(),
                ..AuthFileConfig::default()
            },
            ..ServerConfig::default()
        };
        Self::from_config(config).await
    }

    async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            _server: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub async fn ws_connect(url: &str) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    stream
}

/// Send one envelope as a text frame.
pub async fn send_msg(stream: &mut WsStream, kind: &str, room: &str, client: &str, payload: Value) {
    let msg = json!({
        "type": kind,
        "room": room,
        "client": client,
        "payload": payload,
        "ts": now_ms(),
    });
    stream
        .send(Message::Text(msg.to_string().into()))
        .await
        .unwrap();
}

/// Read the next text frame as JSON (5s timeout).
pub async fn recv_msg(stream: &mut WsStream) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return serde_json::from_str(text.as_str()).unwrap();
                },
                Some(Ok(Message::Close(_))) => panic!("WebSocket closed unexpectedly"),
                Some(Err(e)) => panic!("WebSocket error: {e}"),
                None => panic!("WebSocket stream ended"),
                _ => continue,
            }
        }
    })
    .await
    .expect("Timed out waiting for frame")
}

/// Read the next frame and assert its type.
pub async fn expect_type(stream: &mut WsStream, expected: &str) -> Value {
    let msg = recv_msg(stream).await;
    assert_eq!(msg["type"], expected, "unexpected frame: {msg}");
    msg
}

/// Read frames until one of the expected type arrives, tolerating
/// interleaved broadcasts.
pub async fn wait_for_type(stream: &mut WsStream, expected: &str) -> Value {
    for _ in 0..10 {
        let msg = recv_msg(stream).await;
        if msg["type"] == expected {
            return msg;
        }
    }
    panic!("never received a {expected} frame");
}

/// Create a room and consume the creator's `room_state` +
/// `participants_update`. Returns the `room_state` frame.
pub async fn create_room(stream: &mut WsStream, room: &str, client: &str, options: Value) -> Value {
    send_msg(
        stream,
        "create_room",
        room,
        client,
        json!({"media_url": "demo", "start_pos": 0, "name": client, "options": options}),
    )
    .await;
    let state = expect_type(stream, "room_state").await;
    expect_type(stream, "participants_update").await;
    state
}

/// Join a room and consume the joiner's `room_state` +
/// `participants_update`. Returns the `room_state` frame.
pub async fn join_room(stream: &mut WsStream, room: &str, client: &str) -> Value {
    send_msg(stream, "join_room", room, client, json!({"name": client})).await;
    let state = expect_type(stream, "room_state").await;
    expect_type(stream, "participants_update").await;
    state
}

/// Sign a token with the test secret.
pub fn make_token(claims: Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn future_exp() -> u64 {
    now_secs() + 3600
}

/// An expiry far enough in the past to clear validation leeway.
pub fn past_exp() -> u64 {
    now_secs() - 600
}
