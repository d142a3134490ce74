use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use syncroom_core::{
    CreateInvitePayload, CreateRoomPayload, Envelope, ErrorCode, ErrorPayload, JoinRoomPayload,
    MessageKind, PingPayload, PlayerEventPayload, StateUpdatePayload,
};

use crate::rooms::{ClientSender, ConnId, Departure};
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<String>();
    spawn_writer(ws_sender, rx);

    let conn_id = state.rooms.write().await.allocate_conn();
    tracing::debug!(conn_id, "Channel connected");

    read_loop(ws_receiver, &state, conn_id, &tx).await;

    // Channel gone. Run the cleanup path exactly once; host failover and
    // its notifications happen under the same write lock, so no other
    // message can be broadcast in between.
    let mut rooms = state.rooms.write().await;
    match rooms.disconnect(conn_id) {
        Some(Departure::HostChanged {
            room_id, new_host, ..
        }) => {
            rooms.broadcast_message(
                &room_id,
                MessageKind::HostChange,
                Some(&new_host),
                json!({"host_id": new_host}),
                None,
            );
            if let Some(update) = rooms.room(&room_id).map(|r| r.participants_payload()) {
                rooms.broadcast_message(
                    &room_id,
                    MessageKind::ParticipantsUpdate,
                    Some(&new_host),
                    to_value(&update),
                    None,
                );
            }
        },
        Some(Departure::Left { room_id, client_id }) => {
            rooms.broadcast_message(
                &room_id,
                MessageKind::ClientLeft,
                Some(&client_id),
                json!({}),
                None,
            );
            if let Some(update) = rooms.room(&room_id).map(|r| r.participants_payload()) {
                rooms.broadcast_message(
                    &room_id,
                    MessageKind::ParticipantsUpdate,
                    Some(&client_id),
                    to_value(&update),
                    None,
                );
            }
            tracing::info!(client = %client_id, room = %room_id, "Participant disconnected");
        },
        Some(Departure::RoomClosed { room_id, client_id }) => {
            tracing::info!(client = %client_id, room = %room_id, "Participant disconnected");
        },
        None => tracing::debug!(conn_id, "Channel closed before joining a room"),
    }
}

fn spawn_writer(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<String>,
) {
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });
}

async fn read_loop(
    mut ws_receiver: SplitStream<WebSocket>,
    state: &AppState,
    conn_id: ConnId,
    tx: &ClientSender,
) {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        let env: Envelope = match serde_json::from_str(text.as_str()) {
            Ok(env) => env,
            Err(_) => {
                send_error_raw(tx, ErrorCode::BadJson, "invalid JSON", None, None);
                continue;
            },
        };
        dispatch(state, conn_id, tx, env).await;
    }
}

async fn dispatch(state: &AppState, conn_id: ConnId, tx: &ClientSender, env: Envelope) {
    match env.message_kind() {
        Some(MessageKind::CreateRoom) => handle_create_room(state, conn_id, tx, env).await,
        Some(MessageKind::JoinRoom) => handle_join_room(state, conn_id, tx, env).await,
        Some(MessageKind::PlayerEvent) => handle_player_event(state, tx, env).await,
        Some(MessageKind::StateUpdate) => handle_state_update(state, tx, env).await,
        Some(MessageKind::ForceResync) => handle_force_resync(state, tx, env).await,
        Some(MessageKind::CreateInvite) => handle_create_invite(state, tx, env).await,
        Some(MessageKind::Ping) => handle_ping(tx, &env),
        _ => {
            let msg = format!("unknown message type: {}", env.kind);
            send_error(tx, ErrorCode::UnknownType, &msg, &env);
        },
    }
}

async fn handle_create_room(state: &AppState, conn_id: ConnId, tx: &ClientSender, env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };
    let Ok(payload) = parse_payload::<CreateRoomPayload>(&env.payload) else {
        send_error(tx, ErrorCode::BadRequest, "malformed create_room payload", &env);
        return;
    };

    if let Err(err) = state.auth.authorize_host(payload.auth_token.as_deref()) {
        send_error(tx, err.code(), &err.to_string(), &env);
        return;
    }

    let mut rooms = state.rooms.write().await;
    let created = rooms.create_room(
        &room_id,
        &client_id,
        conn_id,
        payload.name,
        payload.media_url,
        payload.start_pos.unwrap_or(0.0),
        payload.options.unwrap_or_default(),
        tx.clone(),
    );
    if created.is_err() {
        send_error(tx, ErrorCode::RoomExists, "room already exists", &env);
        return;
    }

    let Some((state_payload, update)) = rooms
        .room(&room_id)
        .map(|r| (r.room_state_payload(), r.participants_payload()))
    else {
        return;
    };
    send_message(
        tx,
        MessageKind::RoomState,
        Some(&room_id),
        Some(&client_id),
        to_value(&state_payload),
    );
    rooms.broadcast_message(
        &room_id,
        MessageKind::ParticipantsUpdate,
        Some(&client_id),
        to_value(&update),
        None,
    );
    tracing::info!(room = %room_id, host = %client_id, "Room created");
}

async fn handle_join_room(state: &AppState, conn_id: ConnId, tx: &ClientSender, env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };
    let Ok(payload) = parse_payload::<JoinRoomPayload>(&env.payload) else {
        send_error(tx, ErrorCode::BadRequest, "malformed join_room payload", &env);
        return;
    };

    let mut rooms = state.rooms.write().await;
    if !rooms.room_exists(&room_id) {
        send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
        return;
    }
    if let Err(err) = state.auth.authorize_join(
        &room_id,
        payload.auth_token.as_deref(),
        payload.invite_token.as_deref(),
    ) {
        send_error(tx, err.code(), &err.to_string(), &env);
        return;
    }

    if rooms
        .join_room(&room_id, &client_id, conn_id, payload.name.clone(), tx.clone())
        .is_err()
    {
        send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
        return;
    }

    let Some((state_payload, update)) = rooms
        .room(&room_id)
        .map(|r| (r.room_state_payload(), r.participants_payload()))
    else {
        return;
    };
    send_message(
        tx,
        MessageKind::RoomState,
        Some(&room_id),
        Some(&client_id),
        to_value(&state_payload),
    );
    rooms.broadcast_message(
        &room_id,
        MessageKind::ClientJoined,
        Some(&client_id),
        json!({"name": payload.name}),
        Some(&client_id),
    );
    rooms.broadcast_message(
        &room_id,
        MessageKind::ParticipantsUpdate,
        Some(&client_id),
        to_value(&update),
        None,
    );
    tracing::info!(room = %room_id, client = %client_id, "Participant joined");
}

async fn handle_player_event(state: &AppState, tx: &ClientSender, mut env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };
    let Ok(payload) = parse_payload::<PlayerEventPayload>(&env.payload) else {
        send_error(tx, ErrorCode::BadRequest, "malformed player_event payload", &env);
        return;
    };

    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.room(&room_id) else {
        send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
        return;
    };
    if !room.is_host(&client_id) && !room.free_play() {
        send_error(tx, ErrorCode::NotHost, "only host can send player events", &env);
        return;
    }

    rooms.apply_player_event(&room_id, payload.action.as_deref(), payload.position);
    rooms.relay(&room_id, &mut env);
}

async fn handle_state_update(state: &AppState, tx: &ClientSender, mut env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };
    let Ok(payload) = parse_payload::<StateUpdatePayload>(&env.payload) else {
        send_error(tx, ErrorCode::BadRequest, "malformed state_update payload", &env);
        return;
    };

    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.room(&room_id) else {
        send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
        return;
    };
    // Non-host updates are relayed as an opaque side-channel but never
    // touch authoritative state.
    if room.is_host(&client_id) {
        rooms.apply_state_update(&room_id, payload.position, payload.play_state);
    }
    rooms.relay(&room_id, &mut env);
}

async fn handle_force_resync(state: &AppState, tx: &ClientSender, mut env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };

    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.room(&room_id) else {
        send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
        return;
    };
    if !room.is_host(&client_id) {
        send_error(tx, ErrorCode::NotHost, "only host can resync", &env);
        return;
    }
    rooms.relay(&room_id, &mut env);
}

async fn handle_create_invite(state: &AppState, tx: &ClientSender, env: Envelope) {
    let (Some(room_id), Some(client_id)) = (env.room.clone(), env.client.clone()) else {
        send_error(tx, ErrorCode::BadRequest, "room and client are required", &env);
        return;
    };
    let Ok(payload) = parse_payload::<CreateInvitePayload>(&env.payload) else {
        send_error(tx, ErrorCode::BadRequest, "malformed create_invite payload", &env);
        return;
    };

    {
        let rooms = state.rooms.read().await;
        let Some(room) = rooms.room(&room_id) else {
            send_error(tx, ErrorCode::RoomMissing, "room not found", &env);
            return;
        };
        if !room.is_host(&client_id) {
            send_error(tx, ErrorCode::NotHost, "only host can create invites", &env);
            return;
        }
    }

    if let Err(err) = state
        .auth
        .authorize_invite_issuer(payload.auth_token.as_deref())
    {
        send_error(tx, err.code(), &err.to_string(), &env);
        return;
    }
    match state
        .auth
        .issue_invite(&room_id, payload.expires_in.map(Duration::from_secs))
    {
        Ok(invite) => {
            tracing::info!(room = %room_id, host = %client_id, "Invite issued over channel");
            send_message(
                tx,
                MessageKind::InviteCreated,
                Some(&room_id),
                Some(&client_id),
                json!({"invite_token": invite.token, "expires_at": invite.expires_at}),
            );
        },
        Err(err) => send_error(tx, err.code(), &err.to_string(), &env),
    }
}

fn handle_ping(tx: &ClientSender, env: &Envelope) {
    let payload = parse_payload::<PingPayload>(&env.payload).unwrap_or_default();
    send_message(
        tx,
        MessageKind::Pong,
        env.room.as_deref(),
        env.client.as_deref(),
        json!({"client_ts": payload.client_ts}),
    );
}

/// Missing payloads act like empty objects, as senders routinely omit
/// them.
fn parse_payload<T: DeserializeOwned + Default>(payload: &Value) -> Result<T, serde_json::Error> {
    if payload.is_null() {
        Ok(T::default())
    } else {
        serde_json::from_value(payload.clone())
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_default()
}

fn send_message(
    tx: &ClientSender,
    kind: MessageKind,
    room: Option<&str>,
    client: Option<&str>,
    payload: Value,
) {
    let env = Envelope::server(kind, room, client, payload);
    if let Ok(text) = serde_json::to_string(&env) {
        let _ = tx.send(text);
    }
}

fn send_error(tx: &ClientSender, code: ErrorCode, message: &str, env: &Envelope) {
    send_error_raw(tx, code, message, env.room.as_deref(), env.client.as_deref());
}

fn send_error_raw(
    tx: &ClientSender,
    code: ErrorCode,
    message: &str,
    room: Option<&str>,
    client: Option<&str>,
) {
    let payload = to_value(&ErrorPayload {
        code,
        message: message.to_string(),
    });
    send_message(tx, MessageKind::Error, room, client, payload);
}
