use serde_json::Value;

use syncroom_core::{MessageKind, PlayState};

/// How long local player telemetry is muted after applying a remote
/// directive. Breaks the loop where applying a remote seek would echo
/// the player's own seek back into the room.
pub const SUPPRESS_WINDOW_MS: i64 = 400;

/// Position jumps larger than this read as a seek rather than normal
/// playback progress.
pub const SEEK_THRESHOLD_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerAction {
    Play,
    Pause,
    Seek,
}

impl PlayerAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek => "seek",
        }
    }
}

/// An outbound `player_event` the bridge wants to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEvent {
    pub action: PlayerAction,
    pub position: f64,
}

/// Feedback-suppression state machine between the local player and the
/// room. Only hosts emit; observers track position silently. Accessed
/// from a single cooperative task, so a plain deadline scalar suffices.
pub struct SyncBridge {
    host: bool,
    suppress_until_ms: i64,
    last_time_pos: Option<f64>,
}

impl SyncBridge {
    pub fn new(host: bool) -> Self {
        Self {
            host,
            suppress_until_ms: 0,
            last_time_pos: None,
        }
    }

    pub fn last_time_pos(&self) -> Option<f64> {
        self.last_time_pos
    }

    /// Open the suppression window; called whenever a remote directive
    /// is applied to the player.
    pub fn suppress(&mut self, now_ms: i64) {
        self.suppress_until_ms = now_ms + SUPPRESS_WINDOW_MS;
    }

    fn may_emit(&self, now_ms: i64) -> bool {
        self.host && now_ms > self.suppress_until_ms
    }

    /// The player's pause property flipped.
    pub fn on_pause_change(&mut self, paused: bool, now_ms: i64) -> Option<OutboundEvent> {
        if !self.may_emit(now_ms) {
            return None;
        }
        Some(OutboundEvent {
            action: if paused {
                PlayerAction::Pause
            } else {
                PlayerAction::Play
            },
            position: self.last_time_pos.unwrap_or(0.0),
        })
    }

    /// The player reported a new time position (`None` while idle).
    /// Emits a seek when the jump from the last known position exceeds
    /// the threshold; the last position is remembered either way.
    pub fn on_time_pos(&mut self, pos: Option<f64>, now_ms: i64) -> Option<OutboundEvent> {
        let Some(pos) = pos else {
            return None;
        };
        let event = match self.last_time_pos {
            Some(last) if self.may_emit(now_ms) && (pos - last).abs() > SEEK_THRESHOLD_SECS => {
                Some(OutboundEvent {
                    action: PlayerAction::Seek,
                    position: pos,
                })
            },
            _ => None,
        };
        self.last_time_pos = Some(pos);
        event
    }

    /// The player raised an explicit seek event. Reported at the last
    /// known position; the matching `time-pos` change follows on its
    /// own.
    pub fn on_player_seek(&mut self, now_ms: i64) -> Option<OutboundEvent> {
        if !self.may_emit(now_ms) {
            return None;
        }
        self.last_time_pos.map(|position| OutboundEvent {
            action: PlayerAction::Seek,
            position,
        })
    }
}

/// What a server frame asks the local player to do.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RemoteDirective {
    pub position: Option<f64>,
    pub play: Option<PlayState>,
}

impl RemoteDirective {
    /// Extract the player-facing parts of a `room_state`,
    /// `player_event`, or `state_update` payload.
    pub fn from_payload(kind: MessageKind, payload: &Value) -> Option<Self> {
        match kind {
            MessageKind::RoomState => payload.get("state").map(Self::from_state_fields),
            MessageKind::StateUpdate => Some(Self::from_state_fields(payload)),
            MessageKind::PlayerEvent => {
                let play = match payload.get("action").and_then(Value::as_str) {
                    Some("play") => Some(PlayState::Playing),
                    Some("pause") => Some(PlayState::Paused),
                    _ => None,
                };
                Some(Self {
                    position: payload.get("position").and_then(Value::as_f64),
                    play,
                })
            },
            _ => None,
        }
    }

    fn from_state_fields(fields: &Value) -> Self {
        let play = match fields.get("play_state").and_then(Value::as_str) {
            Some("playing") => Some(PlayState::Playing),
            Some("paused") => Some(PlayState::Paused),
            _ => None,
        };
        Self {
            position: fields.get("position").and_then(Value::as_f64),
            play,
        }
    }
}
