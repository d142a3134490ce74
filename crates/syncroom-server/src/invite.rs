use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

use syncroom_core::ErrorCode;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InviteRequest {
    pub room: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct InviteResponse {
    pub invite_token: String,
    pub expires_at: u64,
}

/// Mint a room-scoped invite for a bearer-authenticated principal.
pub async fn create_invite(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    state.auth.authorize_invite_issuer(bearer_token(&headers))?;

    if !state.rooms.read().await.room_exists(&req.room) {
        return Err(ApiError::not_found(ErrorCode::RoomMissing, "room not found"));
    }

    let invite = state
        .auth
        .issue_invite(&req.room, req.expires_in.map(Duration::from_secs))?;
    tracing::info!(room = %req.room, expires_at = invite.expires_at, "Invite issued");
    Ok(Json(InviteResponse {
        invite_token: invite.token,
        expires_at: invite.expires_at,
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
