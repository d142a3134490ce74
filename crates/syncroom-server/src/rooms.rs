use std::collections::HashMap;

use indexmap::IndexMap;
use serde_json::Value;
use tokio::sync::mpsc;

use syncroom_core::{
    Envelope, MessageKind, ParticipantInfo, ParticipantsPayload, PlayState, PlaybackState,
    RoomOptions, RoomStatePayload,
};

/// Identifies one connected channel for the lifetime of its socket.
pub type ConnId = u64;

/// Per-participant sender feeding the connection's writer task with
/// serialized frames. Sends never block; a failed send means the peer's
/// writer is gone.
pub type ClientSender = mpsc::UnboundedSender<String>;

pub struct Participant {
    pub client_id: String,
    pub name: Option<String>,
    conn_id: ConnId,
    sender: ClientSender,
}

pub struct Room {
    room_id: String,
    host_id: String,
    media_url: Option<String>,
    options: RoomOptions,
    state: PlaybackState,
    /// Insertion-ordered: host failover promotes the earliest joiner.
    clients: IndexMap<String, Participant>,
}

impl Room {
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub fn is_host(&self, client_id: &str) -> bool {
        self.host_id == client_id
    }

    pub fn free_play(&self) -> bool {
        self.options.free_play
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn participant_count(&self) -> usize {
        self.clients.len()
    }

    fn participants(&self) -> Vec<ParticipantInfo> {
        self.clients
            .values()
            .map(|p| ParticipantInfo {
                client_id: p.client_id.clone(),
                name: p.name.clone(),
                is_host: p.client_id == self.host_id,
            })
            .collect()
    }

    pub fn room_state_payload(&self) -> RoomStatePayload {
        RoomStatePayload {
            room: self.room_id.clone(),
            host_id: self.host_id.clone(),
            media_url: self.media_url.clone(),
            options: self.options.clone(),
            state: self.state,
            participants: self.participants(),
            participant_count: self.clients.len(),
        }
    }

    pub fn participants_payload(&self) -> ParticipantsPayload {
        ParticipantsPayload {
            participants: self.participants(),
            participant_count: self.clients.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    RoomExists,
    RoomMissing,
}

/// How a clean disconnect resolved, for the caller to turn into
/// notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The last participant left; the room is gone.
    RoomClosed { room_id: String, client_id: String },
    /// The host left and authority moved to the earliest joiner.
    HostChanged {
        room_id: String,
        client_id: String,
        new_host: String,
    },
    /// A non-host participant left.
    Left { room_id: String, client_id: String },
}

struct ConnBinding {
    room_id: String,
    client_id: String,
}

/// Process-wide room state: the room map plus the channel index used for
/// disconnect cleanup. Lives behind `Arc<RwLock<..>>`; all sends below
/// are non-suspending channel pushes, so holding the lock across a
/// broadcast never holds it across socket I/O.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    connections: HashMap<ConnId, ConnBinding>,
    next_conn_id: ConnId,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_conn(&mut self) -> ConnId {
        self.next_conn_id += 1;
        self.next_conn_id
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_room(
        &mut self,
        room_id: &str,
        client_id: &str,
        conn_id: ConnId,
        name: Option<String>,
        media_url: Option<String>,
        start_pos: f64,
        options: RoomOptions,
        sender: ClientSender,
    ) -> Result<(), RegistryError> {
        if self.rooms.contains_key(room_id) {
            return Err(RegistryError::RoomExists);
        }
        let mut clients = IndexMap::new();
        clients.insert(
            client_id.to_owned(),
            Participant {
                client_id: client_id.to_owned(),
                name,
                conn_id,
                sender,
            },
        );
        self.rooms.insert(
            room_id.to_owned(),
            Room {
                room_id: room_id.to_owned(),
                host_id: client_id.to_owned(),
                media_url,
                options,
                state: PlaybackState {
                    position: start_pos,
                    play_state: PlayState::Paused,
                },
                clients,
            },
        );
        self.connections.insert(
            conn_id,
            ConnBinding {
                room_id: room_id.to_owned(),
                client_id: client_id.to_owned(),
            },
        );
        Ok(())
    }

    pub fn join_room(
        &mut self,
        room_id: &str,
        client_id: &str,
        conn_id: ConnId,
        name: Option<String>,
        sender: ClientSender,
    ) -> Result<(), RegistryError> {
        let room = self
            .rooms
            .get_mut(room_id)
            .ok_or(RegistryError::RoomMissing)?;
        room.clients.insert(
            client_id.to_owned(),
            Participant {
                client_id: client_id.to_owned(),
                name,
                conn_id,
                sender,
            },
        );
        self.connections.insert(
            conn_id,
            ConnBinding {
                room_id: room_id.to_owned(),
                client_id: client_id.to_owned(),
            },
        );
        Ok(())
    }

    /// Apply a player event to room state. `play`/`pause` toggle the
    /// play state; any carried position overwrites the position, even
    /// for a seek while paused. Unknown actions leave the play state
    /// alone.
    pub fn apply_player_event(
        &mut self,
        room_id: &str,
        action: Option<&str>,
        position: Option<f64>,
    ) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            match action {
                Some("play") => room.state.play_state = PlayState::Playing,
                Some("pause") => room.state.play_state = PlayState::Paused,
                _ => {},
            }
            if let Some(pos) = position {
                room.state.position = pos;
            }
        }
    }

    /// Apply a host `state_update`.
    pub fn apply_state_update(
        &mut self,
        room_id: &str,
        position: Option<f64>,
        play_state: Option<PlayState>,
    ) {
        if let Some(room) = self.rooms.get_mut(room_id) {
            if let Some(pos) = position {
                room.state.position = pos;
            }
            if let Some(ps) = play_state {
                room.state.play_state = ps;
            }
        }
    }

    /// Deliver a serialized message to every participant except
    /// `exclude`. Failed channels are collected during the loop and
    /// evicted afterwards; eviction never reassigns host authority (a
    /// dead host stays `host_id` until its socket formally disconnects).
    pub fn broadcast(&mut self, room_id: &str, env: &Envelope, exclude: Option<&str>) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };
        let Ok(text) = serde_json::to_string(env) else {
            return;
        };
        let mut dead: Vec<String> = Vec::new();
        for (client_id, participant) in &room.clients {
            if exclude.is_some_and(|ex| ex == client_id.as_str()) {
                continue;
            }
            if participant.sender.send(text.clone()).is_err() {
                dead.push(client_id.clone());
            }
        }
        for client_id in dead {
            tracing::debug!(
                client = %client_id, room = %room_id,
                "Evicting participant with closed channel"
            );
            room.clients.shift_remove(&client_id);
        }
        if room.clients.is_empty() {
            tracing::info!(room = %room_id, "All channels gone, room closed");
            self.rooms.remove(room_id);
        }
    }

    /// Build a server-originated message and broadcast it.
    pub fn broadcast_message(
        &mut self,
        room_id: &str,
        kind: MessageKind,
        client: Option<&str>,
        payload: Value,
        exclude: Option<&str>,
    ) {
        let env = Envelope::server(kind, Some(room_id), client, payload);
        self.broadcast(room_id, &env, exclude);
    }

    /// Relay an inbound envelope to the whole room with a fresh
    /// `server_ts`.
    pub fn relay(&mut self, room_id: &str, env: &mut Envelope) {
        env.stamp_server_ts();
        self.broadcast(room_id, env, None);
    }

    /// Clean-disconnect path. Runs at most once per connection: the
    /// binding is consumed. Host failover (earliest joiner promoted)
    /// happens here and only here.
    pub fn disconnect(&mut self, conn_id: ConnId) -> Option<Departure> {
        let binding = self.connections.remove(&conn_id)?;
        let room = self.rooms.get_mut(&binding.room_id)?;
        // A duplicate client id may have replaced this participant;
        // only remove the entry if it still belongs to this connection.
        if room
            .clients
            .get(&binding.client_id)
            .is_some_and(|p| p.conn_id == conn_id)
        {
            room.clients.shift_remove(&binding.client_id);
        }
        if room.clients.is_empty() {
            self.rooms.remove(&binding.room_id);
            tracing::info!(room = %binding.room_id, "Last participant left, room closed");
            return Some(Departure::RoomClosed {
                room_id: binding.room_id,
                client_id: binding.client_id,
            });
        }
        if room.host_id == binding.client_id {
            let new_host = room.clients.keys().next().cloned()?;
            room.host_id = new_host.clone();
            tracing::info!(
                room = %binding.room_id, new_host = %new_host,
                "Host disconnected, authority reassigned"
            );
            return Some(Departure::HostChanged {
                room_id: binding.room_id,
                client_id: binding.client_id,
                new_host,
            });
        }
        Some(Departure::Left {
            room_id: binding.room_id,
            client_id: binding.client_id,
        })
    }
}
