use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use syncroom_core::{Envelope, MessageKind, PlayState, now_ms};

use crate::Args;
use crate::error::AdapterError;
use crate::mpv::{MpvIpc, MpvMessage, PlayerSignal};
use crate::sync::{RemoteDirective, SyncBridge};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Interval between keepalive pings on the session channel.
const PING_INTERVAL: Duration = Duration::from_secs(3);

struct Session {
    room: String,
    client_id: String,
    bridge: SyncBridge,
    ws_tx: WsSink,
}

/// Bridge one mpv instance and one session channel until either side
/// closes or a shutdown signal arrives.
pub async fn run(args: Args) -> Result<(), AdapterError> {
    let client_id = args
        .client_id
        .clone()
        .unwrap_or_else(|| format!("mpv-{}", uuid::Uuid::new_v4()));

    let mut mpv = MpvIpc::connect(&args.mpv_socket).await?;
    mpv.observe_property(1, "pause").await?;
    mpv.observe_property(2, "time-pos").await?;
    tracing::info!(socket = %args.mpv_socket, "Player IPC connected");

    let (stream, _) = connect_async(args.ws.as_str()).await?;
    let (ws_tx, mut ws_rx) = stream.split();

    let mut session = Session {
        room: args.room.clone(),
        client_id,
        bridge: SyncBridge::new(args.host),
        ws_tx,
    };

    if args.host {
        session.create_room(&args).await?;
    } else {
        session.join_room(&args).await?;
    }
    tracing::info!(
        room = %session.room,
        client = %session.client_id,
        host = args.host,
        "Session announced"
    );

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.tick().await; // the first tick fires immediately
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                return Ok(());
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    session.handle_frame(text.as_str(), &mut mpv).await?;
                },
                Some(Ok(Message::Close(_))) | None => return Err(AdapterError::SessionClosed),
                Some(Ok(_)) => {},
                Some(Err(e)) => return Err(AdapterError::Session(e)),
            },
            event = mpv.recv() => {
                let msg = event?;
                session.handle_player(msg).await?;
            },
            _ = ping.tick() => session.send_ping().await?,
        }
    }
}

impl Session {
    async fn send(&mut self, kind: MessageKind, payload: Value) -> Result<(), AdapterError> {
        let env = Envelope::client(kind, Some(&self.room), Some(&self.client_id), payload);
        let text = serde_json::to_string(&env)?;
        self.ws_tx
            .send(Message::Text(text.into()))
            .await
            .map_err(AdapterError::Session)
    }

    async fn create_room(&mut self, args: &Args) -> Result<(), AdapterError> {
        let payload = json!({
            "media_url": args.media_url,
            "start_pos": self.bridge.last_time_pos().unwrap_or(0.0),
            "name": args.name,
            "auth_token": args.auth_token,
            "options": {"free_play": false},
        });
        self.send(MessageKind::CreateRoom, payload).await
    }

    async fn join_room(&mut self, args: &Args) -> Result<(), AdapterError> {
        let payload = json!({
            "name": args.name,
            "auth_token": args.auth_token,
            "invite_token": args.invite_token,
        });
        self.send(MessageKind::JoinRoom, payload).await
    }

    async fn send_ping(&mut self) -> Result<(), AdapterError> {
        self.send(MessageKind::Ping, json!({"client_ts": now_ms()}))
            .await
    }

    async fn handle_frame(&mut self, text: &str, mpv: &mut MpvIpc) -> Result<(), AdapterError> {
        let Ok(env) = serde_json::from_str::<Envelope>(text) else {
            tracing::debug!("Dropping unparseable frame");
            return Ok(());
        };
        if env.room.as_deref() != Some(self.room.as_str()) {
            return Ok(());
        }
        match env.message_kind() {
            Some(MessageKind::Pong) => {
                if let Some(client_ts) = env.payload.get("client_ts").and_then(Value::as_i64) {
                    tracing::info!(rtt_ms = now_ms() - client_ts, "pong");
                }
            },
            Some(
                kind @ (MessageKind::RoomState
                | MessageKind::PlayerEvent
                | MessageKind::StateUpdate),
            ) => {
                if let Some(directive) = RemoteDirective::from_payload(kind, &env.payload) {
                    self.apply_remote(directive, mpv).await?;
                }
            },
            Some(MessageKind::Error) => {
                tracing::warn!(payload = %env.payload, "Server reported an error");
            },
            _ => {},
        }
        Ok(())
    }

    /// Apply a remote directive to the player, opening the suppression
    /// window for each property touched.
    async fn apply_remote(
        &mut self,
        directive: RemoteDirective,
        mpv: &mut MpvIpc,
    ) -> Result<(), AdapterError> {
        if let Some(position) = directive.position {
            self.bridge.suppress(now_ms());
            mpv.set_property("time-pos", json!(position)).await?;
        }
        match directive.play {
            Some(PlayState::Playing) => {
                self.bridge.suppress(now_ms());
                mpv.set_property("pause", json!(false)).await?;
            },
            Some(PlayState::Paused) => {
                self.bridge.suppress(now_ms());
                mpv.set_property("pause", json!(true)).await?;
            },
            None => {},
        }
        Ok(())
    }

    async fn handle_player(&mut self, msg: MpvMessage) -> Result<(), AdapterError> {
        if let Some(err) = &msg.error
            && err != "success"
        {
            tracing::warn!(request_id = ?msg.request_id, error = %err, "Player command failed");
        }
        let now = now_ms();
        let event = match msg.signal() {
            Some(PlayerSignal::PauseChanged(paused)) => self.bridge.on_pause_change(paused, now),
            Some(PlayerSignal::TimePos(pos)) => self.bridge.on_time_pos(pos, now),
            Some(PlayerSignal::Seek) => self.bridge.on_player_seek(now),
            None => None,
        };
        if let Some(event) = event {
            tracing::debug!(action = event.action.as_str(), position = event.position, "Emitting player event");
            self.send(
                MessageKind::PlayerEvent,
                json!({"action": event.action.as_str(), "position": event.position}),
            )
            .await?;
        }
        Ok(())
    }
}
