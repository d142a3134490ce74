use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub rooms: usize,
}

/// Liveness check reporting the number of active rooms.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let rooms = state.rooms.read().await.room_count();
    Json(HealthResponse { status: "ok", rooms })
}
