use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::rooms::RoomRegistry;

pub type SharedRoomRegistry = Arc<RwLock<RoomRegistry>>;

#[derive(Clone)]
pub struct AppState {
    pub rooms: SharedRoomRegistry,
    pub auth: Arc<AuthConfig>,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let auth = AuthConfig::new(&config.auth);
        Self {
            rooms: Arc::new(RwLock::new(RoomRegistry::new())),
            auth: Arc::new(auth),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}
