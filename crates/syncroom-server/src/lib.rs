pub mod auth;
pub mod config;
pub mod error;
pub mod health;
pub mod invite;
pub mod rooms;
pub mod state;
pub mod ws;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;

use config::ServerConfig;
use state::AppState;

/// Build the Axum router and application state from a config.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let state = AppState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Plain HTTP endpoints get a request timeout; the session channel
    // lives on /ws and must not.
    let http_routes = Router::new()
        .route("/health", axum::routing::get(health::health_check))
        .route("/invite", axum::routing::post(invite::create_invite))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ));

    let app = Router::new()
        .route("/ws", axum::routing::get(ws::ws_handler))
        .merge(http_routes)
        .layer(cors)
        .with_state(state.clone());

    (app, state)
}
