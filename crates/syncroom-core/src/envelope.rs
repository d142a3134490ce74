use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::time::now_ms;

/// Discriminator for the envelope `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    // Client -> Server
    CreateRoom,
    JoinRoom,
    PlayerEvent,
    StateUpdate,
    ForceResync,
    CreateInvite,
    Ping,

    // Server -> Client
    RoomState,
    ParticipantsUpdate,
    ClientJoined,
    ClientLeft,
    HostChange,
    InviteCreated,
    Pong,
    Error,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateRoom => "create_room",
            Self::JoinRoom => "join_room",
            Self::PlayerEvent => "player_event",
            Self::StateUpdate => "state_update",
            Self::ForceResync => "force_resync",
            Self::CreateInvite => "create_invite",
            Self::Ping => "ping",
            Self::RoomState => "room_state",
            Self::ParticipantsUpdate => "participants_update",
            Self::ClientJoined => "client_joined",
            Self::ClientLeft => "client_left",
            Self::HostChange => "host_change",
            Self::InviteCreated => "invite_created",
            Self::Pong => "pong",
            Self::Error => "error",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        Some(match s {
            "create_room" => Self::CreateRoom,
            "join_room" => Self::JoinRoom,
            "player_event" => Self::PlayerEvent,
            "state_update" => Self::StateUpdate,
            "force_resync" => Self::ForceResync,
            "create_invite" => Self::CreateInvite,
            "ping" => Self::Ping,
            "room_state" => Self::RoomState,
            "participants_update" => Self::ParticipantsUpdate,
            "client_joined" => Self::ClientJoined,
            "client_left" => Self::ClientLeft,
            "host_change" => Self::HostChange,
            "invite_created" => Self::InviteCreated,
            "pong" => Self::Pong,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

/// One frame on the session channel.
///
/// `ts` is the sender's wall clock in milliseconds. `server_ts` is present
/// on everything the server originates or relays, stamped freshly on each
/// broadcast. Unknown payload fields ride along untouched because the
/// payload is stored as raw JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_ts: Option<i64>,
}

impl Envelope {
    /// A server-originated message; both `ts` and `server_ts` carry the
    /// server clock.
    pub fn server(
        kind: MessageKind,
        room: Option<&str>,
        client: Option<&str>,
        payload: Value,
    ) -> Self {
        let now = now_ms();
        Self {
            kind: kind.as_str().to_owned(),
            room: room.map(str::to_owned),
            client: client.map(str::to_owned),
            payload,
            ts: Some(now),
            server_ts: Some(now),
        }
    }

    /// A client-originated message; `server_ts` is left for the server.
    pub fn client(
        kind: MessageKind,
        room: Option<&str>,
        client: Option<&str>,
        payload: Value,
    ) -> Self {
        Self {
            kind: kind.as_str().to_owned(),
            room: room.map(str::to_owned),
            client: client.map(str::to_owned),
            payload,
            ts: Some(now_ms()),
            server_ts: None,
        }
    }

    pub fn message_kind(&self) -> Option<MessageKind> {
        MessageKind::from_str_opt(&self.kind)
    }

    /// Re-stamp `server_ts` with the current server clock, as done on
    /// every relay.
    pub fn stamp_server_ts(&mut self) {
        self.server_ts = Some(now_ms());
    }
}
