//! Wire protocol shared by the syncroom server and the player adapter.
//!
//! Every frame on the session channel is a JSON object with the same
//! envelope shape; payloads vary per message kind and are kept as raw
//! JSON so relayed frames survive round-trips with fields the server
//! does not model.

pub mod envelope;
pub mod payload;
pub mod time;

pub use envelope::{Envelope, MessageKind};
pub use payload::{
    CreateInvitePayload, CreateRoomPayload, ErrorCode, ErrorPayload, JoinRoomPayload,
    ParticipantInfo, ParticipantsPayload, PingPayload, PlayState, PlaybackState,
    PlayerEventPayload, RoomOptions, RoomStatePayload, StateUpdatePayload,
};
pub use time::now_ms;
