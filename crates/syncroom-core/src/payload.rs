use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Whether the room's media is currently advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
}

/// Authoritative per-room playback state.
///
/// `position` moves only when an event carries one; play/pause toggles
/// leave it alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub position: f64,
    pub play_state: PlayState,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            position: 0.0,
            play_state: PlayState::Paused,
        }
    }
}

/// Room configuration supplied at creation. Keys the server does not
/// recognize are preserved and echoed back in `room_state`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoomOptions {
    #[serde(default)]
    pub free_play: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Error codes carried in `error` frames and HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    BadJson,
    UnknownType,
    RoomExists,
    RoomMissing,
    NotHost,
    AuthRequired,
    AuthFailed,
    TokenExpired,
    TokenInvalid,
    InviteRequired,
    InviteInvalid,
    InviteRoomMismatch,
    Forbidden,
    InviteDisabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRoomPayload {
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub start_pos: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub options: Option<RoomOptions>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub invite_token: Option<String>,
}

/// Payload of a `player_event`. The action stays a free-form string:
/// unknown actions are relayed untouched and only `play`/`pause`/`seek`
/// mutate room state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerEventPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub position: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StateUpdatePayload {
    #[serde(default)]
    pub position: Option<f64>,
    #[serde(default, deserialize_with = "lenient_play_state")]
    pub play_state: Option<PlayState>,
}

/// Accept only recognized play states; anything else is treated as
/// absent rather than failing the whole payload, since the frame is
/// still relayed verbatim.
fn lenient_play_state<'de, D>(deserializer: D) -> Result<Option<PlayState>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingPayload {
    #[serde(default)]
    pub client_ts: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateInvitePayload {
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// One participant as reported in `room_state` / `participants_update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub client_id: String,
    pub name: Option<String>,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomStatePayload {
    pub room: String,
    pub host_id: String,
    pub media_url: Option<String>,
    pub options: RoomOptions,
    pub state: PlaybackState,
    pub participants: Vec<ParticipantInfo>,
    pub participant_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantsPayload {
    pub participants: Vec<ParticipantInfo>,
    pub participant_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn play_state_wire_names() {
        assert_eq!(serde_json::to_value(PlayState::Playing).unwrap(), json!("playing"));
        assert_eq!(serde_json::to_value(PlayState::Paused).unwrap(), json!("paused"));
    }

    #[test]
    fn error_codes_use_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::InviteRoomMismatch).unwrap(),
            json!("invite_room_mismatch")
        );
        assert_eq!(serde_json::to_value(ErrorCode::BadJson).unwrap(), json!("bad_json"));
    }

    #[test]
    fn room_options_preserve_unknown_keys() {
        let opts: RoomOptions =
            serde_json::from_value(json!({"free_play": true, "subtitles": "en"})).unwrap();
        assert!(opts.free_play);
        let back = serde_json::to_value(&opts).unwrap();
        assert_eq!(back["subtitles"], json!("en"));
    }

    #[test]
    fn start_pos_accepts_integers() {
        let p: CreateRoomPayload = serde_json::from_value(json!({"start_pos": 0})).unwrap();
        assert_eq!(p.start_pos, Some(0.0));
    }

    #[test]
    fn state_update_ignores_unrecognized_play_state() {
        let p: StateUpdatePayload =
            serde_json::from_value(json!({"position": 3.0, "play_state": "buffering"})).unwrap();
        assert_eq!(p.position, Some(3.0));
        assert_eq!(p.play_state, None);

        let p: StateUpdatePayload =
            serde_json::from_value(json!({"play_state": "playing"})).unwrap();
        assert_eq!(p.play_state, Some(PlayState::Playing));
    }
}
